//! HTTP client for the attestation authority

use super::{AttestationProvider, AttestationResponse};
use crate::config::AttestationConfig;
use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use ethers::types::H256;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Attestation authority REST client
#[derive(Clone, Debug)]
pub struct IrisAttestationClient {
    http: reqwest::Client,
    base_url: String,
}

impl IrisAttestationClient {
    pub fn new(config: &AttestationConfig) -> BridgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| BridgeError::Config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn attestation_url(&self, message_hash: H256) -> String {
        format!("{}/v1/attestations/{:?}", self.base_url, message_hash)
    }
}

#[async_trait]
impl AttestationProvider for IrisAttestationClient {
    async fn get_attestation(
        &self,
        message_hash: H256,
    ) -> BridgeResult<Option<AttestationResponse>> {
        let url = self.attestation_url(message_hash);
        let response = self.http.get(&url).send().await.map_err(|e| {
            BridgeError::AttestationServiceError(format!("request to {} failed: {}", url, e))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Attestation for {:?} not found", message_hash);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::AttestationServiceError(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        response
            .json::<AttestationResponse>()
            .await
            .map(Some)
            .map_err(|e| BridgeError::AttestationServiceError(format!("unreadable response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::attestation_config;
    use crate::types::AttestationStatus;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::{json, Value};

    async fn attestation(Path(hash): Path<String>) -> Result<Json<Value>, StatusCode> {
        if hash.ends_with("01") {
            Ok(Json(json!({"status": "complete", "attestation": "0xfeed"})))
        } else if hash.ends_with("02") {
            Err(StatusCode::NOT_FOUND)
        } else {
            Err(StatusCode::TOO_MANY_REQUESTS)
        }
    }

    async fn serve() -> String {
        let app = Router::new().route("/v1/attestations/:hash", get(attestation));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_status_codes_map_to_outcomes() {
        let mut config = attestation_config(1_000, 10, 60);
        config.api_url = serve().await;
        let client = IrisAttestationClient::new(&config).unwrap();

        let found = client
            .get_attestation(H256::from_low_u64_be(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, AttestationStatus::Complete);
        assert_eq!(found.attestation.as_deref(), Some("0xfeed"));

        assert!(client
            .get_attestation(H256::from_low_u64_be(2))
            .await
            .unwrap()
            .is_none());

        assert!(matches!(
            client.get_attestation(H256::from_low_u64_be(3)).await,
            Err(BridgeError::AttestationServiceError(_))
        ));
    }

    #[test]
    fn test_url_uses_prefixed_hash() {
        let client = IrisAttestationClient::new(&attestation_config(1_000, 10, 60)).unwrap();
        assert_eq!(
            client.attestation_url(H256::from_low_u64_be(1)),
            format!("http://attestation.test/v1/attestations/0x{}01", "0".repeat(62))
        );
    }
}
