//! HTTP clients for the external collaborators: the HD signer, the PIX
//! provider and the price source. Each sits behind a trait so processors
//! can run against fakes.

pub mod pix;
pub mod price;
pub mod signer;

pub use pix::{PagBankClient, PixError, PixPayout, PixProvider};
pub use price::{CoinGeckoSource, PriceError, PriceSource};
pub use signer::{HdSignerClient, Signer, SignerError, TransferRequest};

/// Cap error bodies carried into logs and ledger entries.
pub(crate) fn truncate_body(body: String) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

/// Join `path` below `base`, keeping any path prefix `base` already has.
pub(crate) fn join_endpoint(base: &url::Url, path: &str) -> Result<url::Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let prefixed = format!("{}/", base.path());
        base.set_path(&prefixed);
    }
    base.join(path)
}
