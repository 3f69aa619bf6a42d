use super::{join_endpoint, truncate_body};
use async_trait::async_trait;
use pixbridge_sdk::signature::{
    SIGNER_HMAC_HEADER, SIGNER_NONCE_HEADER, SIGNER_TIMESTAMP_HEADER, SignerHeaders,
};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signer is not configured")]
    NotConfigured,
    #[error("signer request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("signer rejected transfer (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("signer response carried no transaction id")]
    MissingTxId,
    #[error("failed to encode transfer request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Body of `POST /hd/transfer`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub derivation_index: i32,
    pub to: String,
    /// Decimal token amount as a string.
    pub amount: String,
    pub token_contract: String,
    /// The signer broadcasts at most one transaction per key.
    pub idempotency_key: String,
}

/// External service holding the HD seed and broadcasting token transfers.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Returns the broadcast transaction id.
    async fn transfer(&self, request: &TransferRequest) -> Result<String, SignerError>;
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    #[serde(default)]
    tx_id: Option<String>,
    #[serde(default)]
    tx_hash: Option<String>,
}

pub struct HdSignerClient {
    endpoint: Url,
    secret: Vec<u8>,
    http_client: reqwest::Client,
}

impl HdSignerClient {
    pub fn new(base_url: &Url, secret: impl Into<Vec<u8>>, timeout: Duration) -> Result<Self, SignerError> {
        let endpoint = join_endpoint(base_url, "hd/transfer").map_err(|_| SignerError::NotConfigured)?;
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            secret: secret.into(),
            http_client,
        })
    }
}

#[async_trait]
impl Signer for HdSignerClient {
    #[tracing::instrument(skip_all, err, name = "Signer:Transfer", fields(key = %request.idempotency_key))]
    async fn transfer(&self, request: &TransferRequest) -> Result<String, SignerError> {
        // the MAC covers these exact bytes, so serialize once and send them as-is
        let body = serde_json::to_vec(request)?;
        let headers = SignerHeaders::sign(&self.secret, &body);
        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNER_TIMESTAMP_HEADER, headers.timestamp.to_string())
            .header(SIGNER_NONCE_HEADER, headers.nonce)
            .header(SIGNER_HMAC_HEADER, headers.hmac)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SignerError::Rejected {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }
        let parsed: TransferResponse = response.json().await?;
        parsed
            .tx_id
            .or(parsed.tx_hash)
            .filter(|id| !id.is_empty())
            .ok_or(SignerError::MissingTxId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_request_wire_shape() {
        let request = TransferRequest {
            derivation_index: 7,
            to: "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into(),
            amount: "18.1".into(),
            token_contract: "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf".into(),
            idempotency_key: "buy-1".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "derivationIndex": 7,
                "to": "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t",
                "amount": "18.1",
                "tokenContract": "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf",
                "idempotencyKey": "buy-1"
            })
        );
    }

    #[test]
    fn accepts_either_tx_field() {
        let a: TransferResponse = serde_json::from_str(r#"{"txId":"a"}"#).unwrap();
        let b: TransferResponse = serde_json::from_str(r#"{"txHash":"b"}"#).unwrap();
        assert_eq!(a.tx_id.as_deref(), Some("a"));
        assert_eq!(b.tx_hash.as_deref(), Some("b"));
    }
}
