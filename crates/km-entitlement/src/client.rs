//! The entitlement service HTTP client, per §4.6.

use km_core::{PluginManifest, RetryConfig, Subscription};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info_span, Instrument};

use crate::error::{EntitlementError, EntitlementResult};

/// A thin HTTP client bound to one API key and one entitlement service host.
///
/// The bearer token is held only in memory for the lifetime of this client
/// and never appears in a log line; every request is wrapped in a span
/// naming the operation and target host instead.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    subscription: Subscription,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    url: String,
}

impl Client {
    /// Build a client for `base_url`, authenticating with `api_key`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry: RetryConfig::http(),
        }
    }

    fn bearer(&self) -> reqwest::header::HeaderValue {
        let mut header = reqwest::header::HeaderValue::try_from(format!("Bearer {}", self.api_key))
            .expect("api key must be a valid header value");
        header.set_sensitive(true);
        header
    }

    fn host(&self) -> &str {
        self.base_url
            .split("://")
            .nth(1)
            .unwrap_or(&self.base_url)
    }

    /// `GET /api/subscription/status`: validate the API key and resolve its
    /// subscription.
    pub async fn validate_key(&self) -> EntitlementResult<Subscription> {
        let span = info_span!("validate_key", host = self.host());
        async {
            let url = format!("{}/api/subscription/status", self.base_url);
            let outcome = km_core::retry(
                &self.retry,
                |attempt| {
                    if attempt > 0 {
                        debug!(attempt, "retrying validate_key");
                    }
                    self.get_status(&url)
                },
                EntitlementError::is_retryable,
            )
            .await;

            outcome.into_result(EntitlementError::ServiceUnavailable(
                "aborted".to_owned(),
            ))
        }
        .instrument(span)
        .await
    }

    async fn get_status(&self, url: &str) -> EntitlementResult<Subscription> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| EntitlementError::ServiceUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(EntitlementError::InvalidApiKey)
            }
            status if status.is_server_error() => {
                Err(EntitlementError::ServiceUnavailable(status.to_string()))
            }
            status if !status.is_success() => {
                Err(EntitlementError::MalformedResponse(format!(
                    "unexpected status {status}"
                )))
            }
            _ => {
                let body: StatusResponse = response
                    .json()
                    .await
                    .map_err(|e| EntitlementError::MalformedResponse(e.to_string()))?;
                Ok(body.subscription)
            }
        }
    }

    /// `GET /api/plugins/available?platform=<os-arch>`: the plugins this
    /// key is entitled to on the caller's platform.
    pub async fn list_entitled_plugins(
        &self,
        platform: &str,
    ) -> EntitlementResult<Vec<PluginManifest>> {
        let span = info_span!("list_entitled_plugins", host = self.host(), platform);
        async {
            let url = format!(
                "{}/api/plugins/available?platform={platform}",
                self.base_url
            );
            let outcome = km_core::retry(
                &self.retry,
                |attempt| {
                    if attempt > 0 {
                        debug!(attempt, "retrying list_entitled_plugins");
                    }
                    self.get_available(&url)
                },
                EntitlementError::is_retryable,
            )
            .await;

            outcome.into_result(EntitlementError::ServiceUnavailable(
                "aborted".to_owned(),
            ))
        }
        .instrument(span)
        .await
    }

    async fn get_available(&self, url: &str) -> EntitlementResult<Vec<PluginManifest>> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| EntitlementError::ServiceUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(EntitlementError::InvalidApiKey)
            }
            status if status.is_server_error() => {
                Err(EntitlementError::ServiceUnavailable(status.to_string()))
            }
            _ => response
                .json()
                .await
                .map_err(|e| EntitlementError::MalformedResponse(e.to_string())),
        }
    }

    /// `POST /api/plugins/download {name, platform}`, follow the returned
    /// URL, and verify the bytes against `manifest` before returning them.
    ///
    /// A checksum mismatch is retried like a transient network fault (a
    /// corrupted transfer is often not reproducible); once retries are
    /// exhausted the mismatch is surfaced as a hard failure.
    pub async fn download_plugin(
        &self,
        manifest: &PluginManifest,
        platform: &str,
    ) -> EntitlementResult<Vec<u8>> {
        let span = info_span!("download_plugin", host = self.host(), plugin = manifest.name);
        async {
            let outcome = km_core::retry(
                &self.retry,
                |attempt| {
                    if attempt > 0 {
                        debug!(attempt, plugin = manifest.name, "retrying download_plugin");
                    }
                    self.fetch_and_verify(manifest, platform)
                },
                EntitlementError::is_retryable,
            )
            .await;

            outcome.into_result(EntitlementError::ServiceUnavailable(
                "aborted".to_owned(),
            ))
        }
        .instrument(span)
        .await
    }

    async fn fetch_and_verify(
        &self,
        manifest: &PluginManifest,
        platform: &str,
    ) -> EntitlementResult<Vec<u8>> {
        let request_url = format!("{}/api/plugins/download", self.base_url);
        let download = self
            .http
            .post(&request_url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .json(&serde_json::json!({ "name": manifest.name, "platform": platform }))
            .send()
            .await
            .map_err(|e| EntitlementError::ServiceUnavailable(e.to_string()))?;

        let location: DownloadResponse = match download.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(EntitlementError::InvalidApiKey)
            }
            status if status.is_server_error() => {
                return Err(EntitlementError::ServiceUnavailable(status.to_string()))
            }
            _ => download
                .json()
                .await
                .map_err(|e| EntitlementError::MalformedResponse(e.to_string()))?,
        };

        let response = self
            .http
            .get(&location.url)
            .send()
            .await
            .map_err(|e| EntitlementError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EntitlementError::ServiceUnavailable(
                response.status().to_string(),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EntitlementError::ServiceUnavailable(e.to_string()))?
            .to_vec();

        km_crypto::verify_checksum(&bytes, &manifest.checksum)?;

        if let Some(signature) = manifest.signature.as_deref() {
            let anchor = km_crypto::TrustAnchor::embedded();
            anchor.verify(&bytes, signature)?;
        }

        Ok(bytes)
    }
}

impl EntitlementError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            EntitlementError::ServiceUnavailable(_) | EntitlementError::Verification(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_strips_scheme() {
        let client = Client::new("https://api.kilometers.ai", "km_test_key");
        assert_eq!(client.host(), "api.kilometers.ai");
    }

    #[test]
    fn bearer_header_is_sensitive() {
        let client = Client::new("https://api.kilometers.ai", "km_test_key");
        assert!(client.bearer().is_sensitive());
    }

    #[test]
    fn retryable_kinds() {
        assert!(EntitlementError::ServiceUnavailable("x".into()).is_retryable());
        assert!(!EntitlementError::InvalidApiKey.is_retryable());
    }
}
