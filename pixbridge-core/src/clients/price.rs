use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const COINGECKO_USDT_BRL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=tether&vs_currencies=brl";

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("price response carried no USDT/BRL quote")]
    MissingQuote,
    #[error("rate must be positive, got {0}")]
    NonPositive(Decimal),
    #[error("rate is not representable: {0}")]
    Unrepresentable(String),
}

/// Where the USDT/BRL rate comes from.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_brl(&self) -> Result<Decimal, PriceError>;
}

#[derive(Debug, serde::Deserialize)]
struct SimplePrice {
    tether: Option<BrlQuote>,
}

#[derive(Debug, serde::Deserialize)]
struct BrlQuote {
    brl: Option<f64>,
}

fn parse_quote(body: SimplePrice) -> Result<Decimal, PriceError> {
    let brl = body
        .tether
        .and_then(|q| q.brl)
        .ok_or(PriceError::MissingQuote)?;
    let rate = Decimal::try_from(brl)
        .map_err(|e| PriceError::Unrepresentable(e.to_string()))?
        .round_dp(8)
        .normalize();
    if rate <= Decimal::ZERO {
        return Err(PriceError::NonPositive(rate));
    }
    Ok(rate)
}

/// CoinGecko `simple/price` endpoint.
pub struct CoinGeckoSource {
    url: Url,
    http_client: reqwest::Client,
}

impl CoinGeckoSource {
    pub fn new(url: Url) -> Result<Self, PriceError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { url, http_client })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    #[tracing::instrument(skip_all, err, name = "Price:FetchBrl")]
    async fn fetch_brl(&self) -> Result<Decimal, PriceError> {
        let body: SimplePrice = self
            .http_client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_quote(body)
    }
}
