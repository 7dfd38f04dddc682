use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

/// Shared HTTP client for every upstream API.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("cointrack/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// GETs `url` and decodes the JSON body. Non-2xx statuses and bodies that do
/// not match `T` are errors; the raw body is logged when decoding fails.
pub async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    debug!(url, "Requesting");
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request error for URL: {url}"))?
        .error_for_status()
        .with_context(|| format!("Unexpected status from {url}"))?;

    let body = response
        .text()
        .await
        .context("Failed to get response text")?;

    match serde_json::from_str(&body) {
        Ok(data) => Ok(data),
        Err(e) => {
            error!(error = ?e, response = %body, url, "Failed to parse response");
            Err(e).with_context(|| format!("Failed to parse response from {url}"))
        }
    }
}
