// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::RequestBuilder;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
///
/// Identity headers are set per request, so the client carries none.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Send a request and return the body of a successful response.
///
/// Non-2xx statuses become [`AppError::Status`] so callers can classify them.
pub async fn fetch_text(request: RequestBuilder) -> Result<String> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response.text().await?)
}
