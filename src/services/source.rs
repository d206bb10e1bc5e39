// src/services/source.rs

//! Source adapters.
//!
//! [`SourceAdapter`] is the uniform contract the orchestrator calls.
//! [`ProfiledSource`] is the single implementation used in production: a
//! declarative [`SourceProfile`] decides the query, endpoint, confidence and
//! extraction strategy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{EnrichedFragment, ExtractionStrategy, JsonFields, SourceId, SourceProfile};
use crate::pipeline::anti_detection::{AntiDetectionPolicy, RandomSource};
use crate::services::cache::ResponseCache;
use crate::services::extract::{Extractor, Signals};
use crate::utils::http::fetch_text;
use crate::utils::{collapse_whitespace, encode_component, fill_template};

const ACCEPT_LANGUAGE_VALUE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";

/// Uniform contract for every upstream.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> &SourceId;

    fn name(&self) -> &str;

    /// Look up one gym.
    ///
    /// `Ok(None)` means the upstream answered but had nothing usable;
    /// errors are reserved for failed calls.
    async fn search(&self, name: &str, address: Option<&str>) -> Result<Option<EnrichedFragment>>;

    /// Result of an earlier identical lookup, if one is still cached.
    fn cached(&self, _name: &str, _address: Option<&str>) -> Option<Option<EnrichedFragment>> {
        None
    }
}

/// Shared collaborators injected into every source.
#[derive(Clone)]
pub struct SourceContext {
    pub client: Client,
    pub policy: Arc<AntiDetectionPolicy>,
    pub rng: Arc<RandomSource>,
    pub cache: Arc<ResponseCache>,
}

/// Adapter driven entirely by a [`SourceProfile`].
pub struct ProfiledSource {
    profile: SourceProfile,
    extractor: Extractor,
    api_key: Option<String>,
    ctx: SourceContext,
}

impl ProfiledSource {
    /// Build an adapter, resolving its API key from the environment.
    pub fn new(profile: SourceProfile, ctx: SourceContext) -> Result<Self> {
        let api_key = match &profile.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                AppError::config(format!(
                    "source '{}' needs environment variable {var}",
                    profile.id
                ))
            })?),
            None => None,
        };
        Self::with_api_key(profile, ctx, api_key)
    }

    /// Build an adapter with an explicit API key.
    pub fn with_api_key(
        profile: SourceProfile,
        ctx: SourceContext,
        api_key: Option<String>,
    ) -> Result<Self> {
        if let ExtractionStrategy::Html {
            scope_selector: Some(selector),
        } = &profile.extraction
        {
            parse_selector(selector)?;
        }
        let extractor = Extractor::new(profile.facility_keywords.clone())?;

        Ok(Self {
            profile,
            extractor,
            api_key,
            ctx,
        })
    }

    /// Fill the profile's query template.
    pub fn build_query(&self, name: &str, address: Option<&str>) -> String {
        collapse_whitespace(&fill_template(
            &self.profile.query_template,
            &[("name", name), ("address", address.unwrap_or(""))],
        ))
    }

    /// Fill the endpoint template with the encoded query and key.
    pub fn build_url(&self, query: &str) -> Result<String> {
        let query = encode_component(query);
        let key = self.api_key.as_deref().map(encode_component).unwrap_or_default();
        let url = fill_template(&self.profile.endpoint, &[("query", &query), ("api_key", &key)]);
        Ok(url::Url::parse(&url)?.to_string())
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let policy = &self.ctx.policy;
        let (user_agent, referer) = self.ctx.rng.with(|rng| {
            (
                policy.user_agent(rng).map(str::to_string),
                policy.referer(rng).map(str::to_string),
            )
        });

        let mut request = self
            .ctx
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE);
        if let Some(user_agent) = user_agent {
            request = request.header(USER_AGENT, user_agent);
        }
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        if let Some(secs) = self.profile.timeout_secs {
            request = request.timeout(Duration::from_secs(secs));
        }
        if let (Some(header), Some(key)) = (&self.profile.api_key_header, &self.api_key) {
            let prefix = self.profile.api_key_prefix.as_deref().unwrap_or("");
            request = request.header(header.as_str(), format!("{prefix}{key}"));
        }
        request
    }

    /// Turn a response body into a fragment, or `None` when it has no signal.
    pub fn parse(
        &self,
        body: &str,
        name: &str,
        address: Option<&str>,
    ) -> Result<Option<EnrichedFragment>> {
        let fallback_address = address.unwrap_or("").to_string();

        match &self.profile.extraction {
            ExtractionStrategy::Html { scope_selector } => {
                let text = html_text(body, scope_selector.as_deref())?;
                let signals = self.extractor.extract(&text);
                Ok(self.fragment(signals, name.to_string(), fallback_address))
            }
            ExtractionStrategy::Json { root, fields } => {
                let value: Value = serde_json::from_str(body)?;
                let item = if root.is_empty() {
                    Some(&value)
                } else {
                    value.pointer(root)
                };
                let Some(item) = item else {
                    return Ok(None);
                };
                self.parse_json_item(item, fields, name, fallback_address)
            }
        }
    }

    fn parse_json_item(
        &self,
        item: &Value,
        fields: &JsonFields,
        name: &str,
        fallback_address: String,
    ) -> Result<Option<EnrichedFragment>> {
        let field = |pointer: &Option<String>| {
            pointer
                .as_deref()
                .and_then(|p| item.pointer(p))
                .and_then(json_scalar)
        };

        let mut strings = Vec::new();
        collect_strings(item, &mut strings);
        let mut signals = self.extractor.extract(&strings.join("\n"));

        if let Some(phone) = field(&fields.phone).and_then(|p| self.extractor.phone(&p)) {
            signals.phone = Some(phone);
        }
        if let Some(rating) = field(&fields.rating).and_then(|r| r.parse::<f64>().ok()) {
            signals.rating = Some(rating);
        }
        if let Some(count) = field(&fields.review_count).and_then(|c| parse_count(&c)) {
            signals.review_count = Some(count);
        }
        if let Some(price) = field(&fields.price).and_then(|p| parse_count(&p)) {
            signals.price = Some(price);
        }

        let name = field(&fields.name).unwrap_or_else(|| name.to_string());
        let address = field(&fields.address).unwrap_or(fallback_address);
        Ok(self.fragment(signals, name, address))
    }

    fn fragment(&self, signals: Signals, name: String, address: String) -> Option<EnrichedFragment> {
        if signals.is_empty() {
            return None;
        }
        Some(EnrichedFragment {
            name,
            address,
            phone: signals.phone,
            open_hour: signals.open_hour,
            close_hour: signals.close_hour,
            price: signals.price,
            rating: signals.rating,
            review_count: signals.review_count,
            facilities: signals.facilities,
            source: self.profile.id.clone(),
            confidence: self.profile.confidence,
        })
    }
}

#[async_trait]
impl SourceAdapter for ProfiledSource {
    fn id(&self) -> &SourceId {
        &self.profile.id
    }

    fn name(&self) -> &str {
        &self.profile.name
    }

    /// Always contacts the upstream; the result is stored for [`Self::cached`].
    async fn search(&self, name: &str, address: Option<&str>) -> Result<Option<EnrichedFragment>> {
        let query = self.build_query(name, address);
        if query.is_empty() {
            return Ok(None);
        }

        let url = self.build_url(&query)?;
        let body = fetch_text(self.request(&url)).await?;
        let fragment = self.parse(&body, name, address)?;

        log::debug!(
            "[{}] '{}' → {}",
            self.profile.id,
            query,
            if fragment.is_some() { "signal" } else { "no signal" }
        );
        let key = ResponseCache::key(self.profile.id.as_str(), &query);
        self.ctx.cache.insert(key, fragment.clone());
        Ok(fragment)
    }

    fn cached(&self, name: &str, address: Option<&str>) -> Option<Option<EnrichedFragment>> {
        let query = self.build_query(name, address);
        if query.is_empty() {
            return None;
        }
        let hit = self.ctx.cache.get(&ResponseCache::key(self.profile.id.as_str(), &query))?;
        log::debug!("[{}] cache hit for '{}'", self.profile.id, query);
        Some(hit)
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Visible text of the scoped elements, or of the whole document.
fn html_text(body: &str, scope: Option<&str>) -> Result<String> {
    let document = Html::parse_document(body);

    if let Some(scope) = scope {
        let selector = parse_selector(scope)?;
        let parts: Vec<String> = document
            .select(&selector)
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .collect();
        if !parts.is_empty() {
            return Ok(parts.join("\n"));
        }
    }

    Ok(document.root_element().text().collect::<Vec<_>>().join(" "))
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn parse_count(text: &str) -> Option<u32> {
    text.replace(',', "").trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::{SourceKind, default_facility_keywords};

    fn context() -> SourceContext {
        SourceContext {
            client: Client::new(),
            policy: Arc::new(AntiDetectionPolicy::default()),
            rng: Arc::new(RandomSource::seeded(1)),
            cache: Arc::new(ResponseCache::new(Duration::from_secs(60))),
        }
    }

    fn html_profile(server: &MockServer) -> SourceProfile {
        SourceProfile {
            id: "web".into(),
            name: "Web Search".into(),
            kind: SourceKind::WebSearch,
            enabled: true,
            priority: 1,
            endpoint: format!("{}/search?q={{query}}", server.uri()),
            query_template: "{name} {address}".into(),
            confidence: 0.6,
            extraction: ExtractionStrategy::Html {
                scope_selector: Some("#main_pack".into()),
            },
            facility_keywords: default_facility_keywords(),
            api_key_env: None,
            api_key_header: None,
            api_key_prefix: None,
            timeout_secs: None,
            resilience: None,
        }
    }

    fn json_profile(server: &MockServer) -> SourceProfile {
        SourceProfile {
            id: "place".into(),
            name: "Place API".into(),
            kind: SourceKind::PlaceApi,
            endpoint: format!("{}/v2/local?query={{query}}", server.uri()),
            confidence: 0.85,
            extraction: ExtractionStrategy::Json {
                root: "/documents/0".into(),
                fields: JsonFields {
                    name: Some("/place_name".into()),
                    address: Some("/road_address_name".into()),
                    phone: Some("/phone".into()),
                    rating: Some("/rating".into()),
                    ..JsonFields::default()
                },
            },
            api_key_header: Some("Authorization".into()),
            api_key_prefix: Some("KakaoAK ".into()),
            ..html_profile(server)
        }
    }

    const GYM_PAGE: &str = r#"<html><body>
        <div id="main_pack">
            <p>강남 피트니스 영업시간 06:00 ~ 23:00</p>
            <p>전화 02-555-1234</p>
            <p>샤워 가능 · PT · GX · 월 5만원</p>
        </div>
        <div class="ad">평점 1.0</div>
    </body></html>"#;

    #[tokio::test]
    async fn test_html_source_extracts_fragment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "강남 피트니스 서울시 강남구"))
            .and(header_exists("user-agent"))
            .and(header_exists("referer"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GYM_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let source = ProfiledSource::new(html_profile(&server), context()).unwrap();
        let fragment = source
            .search("강남 피트니스", Some("서울시 강남구"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fragment.source, SourceId::from("web"));
        assert_eq!(fragment.confidence, 0.6);
        assert_eq!(fragment.phone.as_deref(), Some("02-555-1234"));
        assert_eq!(fragment.open_hour.map(|t| t.to_string()).as_deref(), Some("06:00"));
        assert_eq!(fragment.close_hour.map(|t| t.to_string()).as_deref(), Some("23:00"));
        assert_eq!(fragment.price, Some(50_000));
        assert_eq!(fragment.rating, None);
        assert!(fragment.facilities.contains("샤워시설"));
        assert!(fragment.facilities.contains("PT"));
        assert!(fragment.facilities.contains("GX"));
        assert_eq!(fragment.address, "서울시 강남구");
    }

    #[tokio::test]
    async fn test_forbidden_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let source = ProfiledSource::new(html_profile(&server), context()).unwrap();
        let error = source.search("강남 피트니스", None).await.unwrap_err();
        assert_eq!(error.status_code(), Some(403));
        assert!(AntiDetectionPolicy::is_blocked(&error));
    }

    #[tokio::test]
    async fn test_no_signal_is_cached_as_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><div id=\"main_pack\">검색 결과가 없습니다</div></body></html>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = ProfiledSource::new(html_profile(&server), context()).unwrap();
        assert_eq!(source.cached("없는 체육관", None), None);
        assert!(source.search("없는 체육관", None).await.unwrap().is_none());
        assert_eq!(source.cached("없는 체육관", None), Some(None));
        assert_eq!(source.cached("다른 체육관", None), None);
    }

    #[tokio::test]
    async fn test_json_source_uses_structured_fields() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "documents": [{
                "place_name": "강남 피트니스 본점",
                "road_address_name": "서울 강남구 테헤란로 1",
                "phone": "02-555-1234",
                "rating": 4.6,
                "category_name": "스포츠,레저 > 헬스클럽 > 24시간"
            }]
        });
        Mock::given(method("GET"))
            .and(path("/v2/local"))
            .and(header("authorization", "KakaoAK secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let source = ProfiledSource::with_api_key(
            json_profile(&server),
            context(),
            Some("secret".into()),
        )
        .unwrap();
        let fragment = source
            .search("강남 피트니스", Some("서울시 강남구"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fragment.name, "강남 피트니스 본점");
        assert_eq!(fragment.address, "서울 강남구 테헤란로 1");
        assert_eq!(fragment.phone.as_deref(), Some("02-555-1234"));
        assert_eq!(fragment.rating, Some(4.6));
        assert!(fragment.facilities.contains("24시간"));
        assert_eq!(fragment.confidence, 0.85);
    }

    #[tokio::test]
    async fn test_unparseable_json_phone_is_dropped_alone() {
        let server = MockServer::start().await;
        let source = ProfiledSource::with_api_key(json_profile(&server), context(), None).unwrap();
        let body = serde_json::json!({
            "documents": [{
                "place_name": "강남 피트니스",
                "phone": "전화 문의",
                "rating": "4.3"
            }]
        })
        .to_string();

        let fragment = source.parse(&body, "강남 피트니스", None).unwrap().unwrap();
        assert_eq!(fragment.phone, None);
        assert_eq!(fragment.rating, Some(4.3));
        assert!(crate::pipeline::DataValidator::new().check(&fragment).is_ok());
    }

    #[tokio::test]
    async fn test_json_source_without_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"documents": []})),
            )
            .mount(&server)
            .await;

        let source =
            ProfiledSource::with_api_key(json_profile(&server), context(), Some("k".into()))
                .unwrap();
        assert!(source.search("강남 피트니스", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_and_url_building() {
        let server = MockServer::start().await;
        let profile = SourceProfile {
            query_template: "{name} {address} 헬스장".into(),
            endpoint: format!("{}/search?q={{query}}&key={{api_key}}", server.uri()),
            ..html_profile(&server)
        };
        let source = ProfiledSource::with_api_key(profile, context(), Some("a/b".into())).unwrap();

        assert_eq!(source.build_query("강남 피트니스", None), "강남 피트니스 헬스장");
        let url = source.build_url("짐 1").unwrap();
        assert!(url.ends_with("/search?q=%EC%A7%90+1&key=a%2Fb"), "{url}");
    }

    #[test]
    fn test_missing_api_key_fails_construction() {
        let profile = SourceProfile {
            api_key_env: Some("ENRICHER_TEST_KEY_THAT_IS_NEVER_SET".into()),
            ..default_html_profile()
        };
        assert!(matches!(
            ProfiledSource::new(profile, context()),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_scope_selector_fails_construction() {
        let profile = SourceProfile {
            extraction: ExtractionStrategy::Html {
                scope_selector: Some("[[invalid".into()),
            },
            ..default_html_profile()
        };
        assert!(ProfiledSource::new(profile, context()).is_err());
    }

    fn default_html_profile() -> SourceProfile {
        crate::models::default_sources()
            .into_iter()
            .find(|s| s.id.as_str() == "naver_search")
            .unwrap()
    }
}
