// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP transport for catalogs, artifacts, and icons.

use std::time::Duration;

use async_trait::async_trait;
use tome_config::model::ExtensionsConfig;
use tome_core::{TomeError, Transport};
use tracing::debug;

/// [`Transport`] over a shared reqwest client.
///
/// Non-2xx responses and bodies larger than `max_bytes` are `Network` errors.
pub struct HttpTransport {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpTransport {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, TomeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tome/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TomeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, max_bytes })
    }

    pub fn from_config(config: &ExtensionsConfig) -> Result<Self, TomeError> {
        Self::new(
            Duration::from_secs(config.download_timeout_secs),
            config.max_artifact_bytes,
        )
    }
}

fn network_err(url: &str, e: reqwest::Error) -> TomeError {
    let message = if e.is_timeout() {
        format!("request timed out: {e}")
    } else {
        format!("request failed: {e}")
    };
    TomeError::Network {
        url: url.to_string(),
        message,
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TomeError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| network_err(url, e))?;

        let too_large = || TomeError::Network {
            url: url.to_string(),
            message: format!("response exceeds {} bytes", self.max_bytes),
            source: None,
        };
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| network_err(url, e))? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = body.len(), "fetched");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(max_bytes: u64) -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5), max_bytes).unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.min.json"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"[]".to_vec()))
            .mount(&server)
            .await;

        let body = transport(1024)
            .fetch(&format!("{}/index.min.json", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"[]");
    }

    #[tokio::test]
    async fn error_status_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = transport(1024)
            .fetch(&format!("{}/artifacts/x.tar.gz", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, TomeError::Network { .. }));
        assert_eq!(err.http_status(), 502);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
            .mount(&server)
            .await;

        let err = transport(1024)
            .fetch(&format!("{}/big", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let slow = HttpTransport::new(Duration::from_millis(50), 1024).unwrap();
        let err = slow.fetch(&format!("{}/slow", server.uri())).await.unwrap_err();
        assert!(matches!(err, TomeError::Network { .. }));
    }
}
