//! HTTP helpers shared by the upstream adapters.
//!
//! These send exactly one request and classify the outcome into a
//! [`SourceError`]; retrying is the `SourceClient`'s job.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::SourceError;

/// Maximum length of the response body preview included in error messages.
const BODY_PREVIEW_LEN: usize = 200;

/// Client with the headers NWS asks for and a hard per-request timeout.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Misconfigured(format!("http client: {e}")))
}

/// GET `url` and decode the body as JSON.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, SourceError> {
    let text = get_text_with_accept(client, url, "application/geo+json, application/json").await?;
    decode_json(url, &text)
}

/// Decode a JSON body, reporting shape mismatches as `UpstreamSchema`.
pub fn decode_json<T: DeserializeOwned>(label: &str, text: &str) -> Result<T, SourceError> {
    serde_json::from_str(text).map_err(|e| {
        SourceError::UpstreamSchema(format!("{label}: {e}; body: {}", preview(text)))
    })
}

/// GET `url` and return the body as text.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, SourceError> {
    get_text_with_accept(client, url, "*/*").await
}

async fn get_text_with_accept(
    client: &reqwest::Client,
    url: &str,
    accept: &str,
) -> Result<String, SourceError> {
    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, accept)
        .send()
        .await?;
    classify_status(resp.status())?;
    Ok(resp.text().await?)
}

/// 429 → rate limited, 5xx → transient, other 4xx → permanent.
pub fn classify_status(status: reqwest::StatusCode) -> Result<(), SourceError> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(SourceError::RateLimited);
    }
    if status.is_server_error() {
        return Err(SourceError::Transient(format!("HTTP {status}")));
    }
    if status.is_client_error() {
        return Err(SourceError::Http {
            status: status.as_u16(),
        });
    }
    Ok(())
}

pub(crate) fn preview(text: &str) -> String {
    if text.chars().count() > BODY_PREVIEW_LEN {
        let cut: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn statuses_classify_like_the_retry_contract() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Err(SourceError::RateLimited)
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Err(SourceError::Transient(_))
        ));
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            Err(SourceError::Http { status: 404 })
        );
        assert_eq!(classify_status(StatusCode::OK), Ok(()));
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), BODY_PREVIEW_LEN + 3);
    }
}
