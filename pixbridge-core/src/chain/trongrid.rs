use super::address::normalize_tron_address;
use super::{ChainClient, ChainError, TransferEvent, TransferPage};
use crate::clients::join_endpoint;
use crate::entities::Network;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";
const PAGE_LIMIT: &str = "200";

/// TronGrid HTTP client (full node + event API).
#[derive(Debug, Clone)]
pub struct TronGridClient {
    base_url: Url,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl TronGridClient {
    pub fn new(base_url: Url, api_key: Option<String>) -> Result<Self, ChainError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            base_url,
            api_key,
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChainError> {
        join_endpoint(&self.base_url, path)
            .map_err(|e| ChainError::Parse(format!("invalid endpoint {path}: {e}")))
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ChainError> {
        let response = self.with_key(request).send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ChainError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if !response.status().is_success() {
            return Err(ChainError::Api {
                message: format!("HTTP {}", response.status()),
            });
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, serde::Deserialize)]
struct NowBlock {
    block_header: BlockHeader,
}

#[derive(Debug, serde::Deserialize)]
struct BlockHeader {
    raw_data: RawBlockData,
}

#[derive(Debug, serde::Deserialize)]
struct RawBlockData {
    number: i64,
}

#[derive(Debug, serde::Deserialize)]
struct EventsResponse {
    #[serde(default)]
    data: Vec<EventItem>,
    #[serde(default)]
    meta: Option<EventsMeta>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct EventsMeta {
    #[serde(default)]
    fingerprint: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct EventItem {
    transaction_id: String,
    block_number: i64,
    result: TransferResult,
}

#[derive(Debug, serde::Deserialize)]
struct TransferResult {
    to: String,
    value: String,
}

#[derive(Debug, serde::Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    data: Vec<AccountItem>,
}

#[derive(Debug, serde::Deserialize)]
struct AccountItem {
    #[serde(default)]
    balance: u64,
}

impl EventsResponse {
    fn into_page(self) -> Result<TransferPage, ChainError> {
        if self.success == Some(false) {
            return Err(ChainError::Api {
                message: self.error.unwrap_or_else(|| "event query failed".into()),
            });
        }
        let events = self
            .data
            .into_iter()
            .filter_map(|item| match normalize_tron_address(&item.result.to) {
                Ok(to) => Some(TransferEvent {
                    tx_id: item.transaction_id,
                    block_number: item.block_number,
                    to,
                    raw_value: item.result.value,
                }),
                Err(e) => {
                    // one malformed log must not stall the block
                    warn!(
                        tx_id = %item.transaction_id,
                        to = %item.result.to,
                        error = %e,
                        "Dropping transfer with unparsable destination"
                    );
                    None
                }
            })
            .collect();
        let next = self
            .meta
            .and_then(|m| m.fingerprint)
            .filter(|f| !f.is_empty());
        Ok(TransferPage { events, next })
    }
}

#[async_trait]
impl ChainClient for TronGridClient {
    fn network(&self) -> Network {
        Network::Tron
    }

    async fn latest_block(&self) -> Result<i64, ChainError> {
        let url = self.endpoint("wallet/getnowblock")?;
        let block: NowBlock = self.send(self.http_client.post(url)).await?;
        Ok(block.block_header.raw_data.number)
    }

    async fn transfer_events(
        &self,
        contract: &str,
        block: i64,
        page: Option<&str>,
    ) -> Result<TransferPage, ChainError> {
        let url = self.endpoint(&format!("v1/contracts/{contract}/events"))?;
        let block_number = block.to_string();
        let mut query = vec![
            ("event_name", "Transfer"),
            ("block_number", block_number.as_str()),
            ("only_confirmed", "true"),
            ("order_by", "block_timestamp,asc"),
            ("limit", PAGE_LIMIT),
        ];
        if let Some(fingerprint) = page {
            query.push(("fingerprint", fingerprint));
        }
        debug!(block, has_fingerprint = page.is_some(), "Fetching TRC-20 transfer events");
        let response: EventsResponse = self.send(self.http_client.get(url).query(&query)).await?;
        response.into_page()
    }

    async fn native_balance(&self, address: &str) -> Result<u64, ChainError> {
        let url = self.endpoint(&format!("v1/accounts/{address}"))?;
        let response: AccountsResponse = self.send(self.http_client.get(url)).await?;
        // unactivated accounts come back with no data
        Ok(response.data.first().map_or(0, |a| a.balance))
    }
}
