//! Fetch HTML for URL-sourced conversions.

use crate::error::ConvertError;
use reqwest::Url;
use std::time::Duration;
use tracing::{info, warn};

/// Browser user agent; some sites refuse unknown clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Parse `url`, accepting only `http` and `https`.
pub fn parse_http_url(url: &str) -> Result<Url, ConvertError> {
    let invalid = || ConvertError::InvalidUrl {
        url: url.to_string(),
    };
    let parsed = Url::parse(url.trim()).map_err(|_| invalid())?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(invalid()),
    }
}

/// GET `url` and return the body decoded to text (charset from the
/// `Content-Type` header, UTF-8 otherwise).
pub async fn fetch_html(url: &Url, timeout_secs: u64) -> Result<String, ConvertError> {
    info!("Downloading HTML from: {}", url);

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ConvertError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(map_err)?;

    let response = client.get(url.clone()).send().await.map_err(map_err)?;

    let status = response.status();
    if !status.is_success() {
        warn!("Failed to download {}: HTTP {}", url, status);
        return Err(ConvertError::DownloadStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await.map_err(map_err)?;
    info!("Downloaded HTML content: {} characters", body.chars().count());
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(parse_http_url("https://example.com/page").is_ok());
        assert!(parse_http_url("  http://example.com  ").is_ok());
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        for bad in ["ftp://example.com/x", "file:///etc/passwd", "not a url", "", "https://"] {
            assert!(
                matches!(parse_http_url(bad), Err(ConvertError::InvalidUrl { .. })),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let url = parse_http_url("http://127.0.0.1:9/").unwrap();
        let err = fetch_html(&url, 5).await.unwrap_err();
        assert!(matches!(
            err,
            ConvertError::DownloadFailed { .. } | ConvertError::DownloadTimeout { .. }
        ));
        assert_eq!(err.title(), "Failed to download HTML from URL");
    }
}
