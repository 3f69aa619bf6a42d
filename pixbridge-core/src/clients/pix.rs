use super::{join_endpoint, truncate_body};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PixError {
    #[error("PIX provider request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("PIX provider rejected payout (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid PIX provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("order has no PIX key")]
    MissingKey,
}

/// One outgoing PIX payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixPayout {
    /// Our order id; the provider echoes it back in webhooks.
    pub reference: Uuid,
    pub amount_brl: Decimal,
    pub key: String,
    pub payer_tax_id: Option<String>,
    pub description: String,
}

/// External PIX payment provider.
#[async_trait]
pub trait PixProvider: Send + Sync {
    /// Returns the provider's reference id for the payment.
    async fn send_payout(&self, payout: &PixPayout) -> Result<String, PixError>;
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct InstantPaymentRequest<'a> {
    tx_id: String,
    value: PaymentValue,
    payer: Payer<'a>,
    key: &'a str,
    description: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct PaymentValue {
    currency: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct Payer<'a> {
    name: &'a str,
    tax_id: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct InstantPaymentResponse {
    #[serde(default)]
    id: Option<String>,
}

/// PagBank instant-payments API.
pub struct PagBankClient {
    endpoint: Url,
    token: String,
    http_client: reqwest::Client,
}

impl PagBankClient {
    pub fn new(base_url: &Url, token: String) -> Result<Self, PixError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            endpoint: join_endpoint(base_url, "instant-payments")?,
            token,
            http_client,
        })
    }
}

#[async_trait]
impl PixProvider for PagBankClient {
    #[tracing::instrument(skip_all, err, name = "Pix:SendPayout", fields(order_id = %payout.reference))]
    async fn send_payout(&self, payout: &PixPayout) -> Result<String, PixError> {
        let body = InstantPaymentRequest {
            tx_id: payout.reference.to_string(),
            value: PaymentValue {
                currency: "BRL",
                amount: payout.amount_brl,
            },
            payer: Payer {
                name: "Cliente",
                tax_id: payout.payer_tax_id.as_deref().unwrap_or("00000000000"),
            },
            key: &payout.key,
            description: &payout.description,
        };
        let response = self
            .http_client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PixError::Rejected {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }
        let parsed: InstantPaymentResponse = response.json().await?;
        Ok(parsed
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("pagbank-{}", payout.reference)))
    }
}
