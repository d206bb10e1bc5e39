//! Declarative source profiles.
//!
//! Every upstream is described by data: endpoint template, query template,
//! base confidence, keyword vocabulary and extraction strategy. Adding a
//! source is a config change, not a new type.

use serde::{Deserialize, Serialize};

use crate::models::{ResilienceConfig, SourceId};

/// Broad category of an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    WebSearch,
    Blog,
    Cafe,
    PlaceApi,
    OpenData,
}

/// Maps a keyword found in page text to a facility tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityKeyword {
    /// Keyword to search for in response text
    pub keyword: String,

    /// Normalized facility tag
    pub tag: String,
}

impl FacilityKeyword {
    pub fn new(keyword: &str, tag: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            tag: tag.to_string(),
        }
    }
}

/// JSON pointers to structured fields inside one result object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonFields {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub review_count: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}

/// How a response body is turned into searchable text and fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Parse HTML and scan the text of `scope_selector` matches (or the whole body).
    Html {
        #[serde(default)]
        scope_selector: Option<String>,
    },
    /// Parse JSON, read `fields` below `root`, scan remaining strings as text.
    Json {
        #[serde(default)]
        root: String,
        #[serde(default)]
        fields: JsonFields,
    },
}

/// Configuration of one upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProfile {
    /// Stable identifier used in fragments, logs and health output
    pub id: SourceId,

    /// Human-readable name
    pub name: String,

    pub kind: SourceKind,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Lower runs first
    pub priority: u32,

    /// URL template with `{query}` and optional `{api_key}` placeholders
    pub endpoint: String,

    /// Query template with `{name}` and `{address}` placeholders
    #[serde(default = "defaults::query_template")]
    pub query_template: String,

    /// Base confidence assigned to fragments from this source
    pub confidence: f64,

    pub extraction: ExtractionStrategy,

    #[serde(default = "default_facility_keywords")]
    pub facility_keywords: Vec<FacilityKeyword>,

    /// Environment variable holding the API key, if the source needs one
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Header carrying the API key (e.g. `Authorization`)
    #[serde(default)]
    pub api_key_header: Option<String>,

    /// Prefix prepended to the key in the header (e.g. `KakaoAK `)
    #[serde(default)]
    pub api_key_prefix: Option<String>,

    /// Overrides `crawler.timeout_secs`
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Overrides the global `[resilience]` block
    #[serde(default)]
    pub resilience: Option<ResilienceConfig>,
}

mod defaults {
    pub fn enabled() -> bool {
        true
    }
    pub fn query_template() -> String {
        "{name} {address}".into()
    }
}

/// Facility vocabulary shared by the built-in sources.
pub fn default_facility_keywords() -> Vec<FacilityKeyword> {
    [
        ("24시간", "24시간"),
        ("24시", "24시간"),
        ("연중무휴", "24시간"),
        ("샤워", "샤워시설"),
        ("주차", "주차"),
        ("PT", "PT"),
        ("퍼스널", "PT"),
        ("GX", "GX"),
        ("그룹운동", "GX"),
        ("사우나", "사우나"),
        ("락커", "락커"),
        ("사물함", "락커"),
        ("운동복", "운동복"),
        ("수건", "수건"),
        ("인바디", "인바디"),
        ("요가", "요가"),
        ("필라테스", "필라테스"),
        ("스피닝", "스피닝"),
        ("크로스핏", "크로스핏"),
        ("수영장", "수영장"),
        ("골프", "골프"),
    ]
    .into_iter()
    .map(|(keyword, tag)| FacilityKeyword::new(keyword, tag))
    .collect()
}

/// Community sources mention amenities in looser wording.
fn community_facility_keywords() -> Vec<FacilityKeyword> {
    let mut keywords = default_facility_keywords();
    keywords.extend([
        FacilityKeyword::new("샤워실", "샤워시설"),
        FacilityKeyword::new("무료주차", "주차"),
        FacilityKeyword::new("개인락커", "락커"),
        FacilityKeyword::new("1:1", "PT"),
    ]);
    keywords
}

/// Built-in sources, most reliable first.
pub fn default_sources() -> Vec<SourceProfile> {
    vec![
        SourceProfile {
            id: "kakao_place".into(),
            name: "Kakao Local".into(),
            kind: SourceKind::PlaceApi,
            enabled: true,
            priority: 10,
            endpoint: "https://dapi.kakao.com/v2/local/search/keyword.json?query={query}&size=1"
                .into(),
            query_template: "{name} {address}".into(),
            confidence: 0.85,
            extraction: ExtractionStrategy::Json {
                root: "/documents/0".into(),
                fields: JsonFields {
                    name: Some("/place_name".into()),
                    address: Some("/road_address_name".into()),
                    phone: Some("/phone".into()),
                    ..JsonFields::default()
                },
            },
            facility_keywords: default_facility_keywords(),
            api_key_env: Some("KAKAO_REST_API_KEY".into()),
            api_key_header: Some("Authorization".into()),
            api_key_prefix: Some("KakaoAK ".into()),
            timeout_secs: None,
            resilience: None,
        },
        SourceProfile {
            id: "public_data".into(),
            name: "Public Sports Facility Data".into(),
            kind: SourceKind::OpenData,
            enabled: true,
            priority: 20,
            endpoint: "https://apis.data.go.kr/B551014/SRVC_API_SFMS_FACI/TODZ_API_SFMS_FACI?serviceKey={api_key}&resultType=json&numOfRows=1&faci_nm={query}".into(),
            query_template: "{name}".into(),
            confidence: 0.8,
            extraction: ExtractionStrategy::Json {
                root: "/response/body/items/item/0".into(),
                fields: JsonFields {
                    name: Some("/faci_nm".into()),
                    address: Some("/faci_road_addr".into()),
                    phone: Some("/faci_tel_no".into()),
                    ..JsonFields::default()
                },
            },
            facility_keywords: default_facility_keywords(),
            api_key_env: Some("PUBLIC_DATA_SERVICE_KEY".into()),
            api_key_header: None,
            api_key_prefix: None,
            timeout_secs: Some(15),
            resilience: None,
        },
        SourceProfile {
            id: "naver_search".into(),
            name: "Naver Search".into(),
            kind: SourceKind::WebSearch,
            enabled: true,
            priority: 30,
            endpoint: "https://search.naver.com/search.naver?query={query}".into(),
            query_template: "{name} {address} 헬스장".into(),
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
        },
        SourceProfile {
            id: "naver_blog".into(),
            name: "Naver Blog".into(),
            kind: SourceKind::Blog,
            enabled: true,
            priority: 40,
            endpoint: "https://search.naver.com/search.naver?where=blog&query={query}".into(),
            query_template: "{name} 후기".into(),
            confidence: 0.5,
            extraction: ExtractionStrategy::Html {
                scope_selector: Some(".api_txt_lines, .total_area".into()),
            },
            facility_keywords: community_facility_keywords(),
            api_key_env: None,
            api_key_header: None,
            api_key_prefix: None,
            timeout_secs: None,
            resilience: None,
        },
        SourceProfile {
            id: "daum_cafe".into(),
            name: "Daum Cafe".into(),
            kind: SourceKind::Cafe,
            enabled: true,
            priority: 50,
            endpoint: "https://search.daum.net/search?w=cafe&q={query}".into(),
            query_template: "{name} {address}".into(),
            confidence: 0.4,
            extraction: ExtractionStrategy::Html {
                scope_selector: None,
            },
            facility_keywords: community_facility_keywords(),
            api_key_env: None,
            api_key_header: None,
            api_key_prefix: None,
            timeout_secs: None,
            resilience: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sources_are_ordered_by_reliability() {
        let sources = default_sources();
        assert_eq!(sources.len(), 5);
        for pair in sources.windows(2) {
            assert!(pair[0].priority < pair[1].priority);
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn extraction_strategy_is_tagged() {
        let strategy: ExtractionStrategy =
            toml::from_str("kind = \"html\"\nscope_selector = \"#main\"").unwrap();
        assert_eq!(
            strategy,
            ExtractionStrategy::Html {
                scope_selector: Some("#main".into())
            }
        );

        let strategy: ExtractionStrategy =
            toml::from_str("kind = \"json\"\nroot = \"/items/0\"\n[fields]\nphone = \"/tel\"")
                .unwrap();
        match strategy {
            ExtractionStrategy::Json { root, fields } => {
                assert_eq!(root, "/items/0");
                assert_eq!(fields.phone.as_deref(), Some("/tel"));
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn community_vocabulary_extends_default() {
        let base = default_facility_keywords();
        let community = community_facility_keywords();
        assert!(community.len() > base.len());
        assert!(community.iter().any(|k| k.keyword == "샤워실"));
    }
}
