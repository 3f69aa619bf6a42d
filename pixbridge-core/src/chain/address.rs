//! TRON address encoding and per-order deposit address derivation.
//!
//! A TRON address is `0x41 ++ keccak256(uncompressed_pubkey[1..])[12..]`,
//! shown as base58check. Deposit addresses are non-hardened children of one
//! extended public key, so no secret is needed to hand them out.

use crate::entities::Network;
use bip32::{ChildNumber, XPub};
use sha3::{Digest, Keccak256};
use std::str::FromStr;
use thiserror::Error;

pub const TRON_ADDRESS_PREFIX: u8 = 0x41;
const TRON_ADDRESS_LEN: usize = 21;

#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("extended public key is not configured")]
    MissingXpub,
    #[error("invalid extended public key: {0}")]
    InvalidXpub(bip32::Error),
    #[error("failed to derive child {index}: {source}")]
    Derivation { index: u32, source: bip32::Error },
    #[error("derivation index {0} is out of range")]
    InvalidIndex(i32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex address")]
    InvalidHex,
    #[error("invalid base58check address")]
    InvalidBase58,
    #[error("not a TRON address")]
    WrongPrefix,
}

/// Base58check-encode a 21-byte `0x41`-prefixed payload.
fn encode_tron(payload: &[u8]) -> String {
    bs58::encode(payload).with_check().into_string()
}

pub fn is_valid_tron_address(address: &str) -> bool {
    tron_base58_to_bytes(address).is_ok()
}

fn tron_base58_to_bytes(address: &str) -> Result<Vec<u8>, AddressError> {
    let bytes = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|_| AddressError::InvalidBase58)?;
    if bytes.len() != TRON_ADDRESS_LEN || bytes[0] != TRON_ADDRESS_PREFIX {
        return Err(AddressError::WrongPrefix);
    }
    Ok(bytes)
}

/// Lowercase `41…` hex form of a base58 address.
pub fn tron_base58_to_hex(address: &str) -> Result<String, AddressError> {
    tron_base58_to_bytes(address).map(hex::encode)
}

/// Accepts `41…` (42 chars) or EVM-style `0x…`/bare 40-char hex, as
/// returned by TronGrid event results.
pub fn tron_hex_to_base58(hex_address: &str) -> Result<String, AddressError> {
    let trimmed = hex_address.trim_start_matches("0x");
    let bytes = hex::decode(trimmed).map_err(|_| AddressError::InvalidHex)?;
    let payload = match bytes.len() {
        20 => {
            let mut payload = Vec::with_capacity(TRON_ADDRESS_LEN);
            payload.push(TRON_ADDRESS_PREFIX);
            payload.extend_from_slice(&bytes);
            payload
        }
        TRON_ADDRESS_LEN if bytes[0] == TRON_ADDRESS_PREFIX => bytes,
        TRON_ADDRESS_LEN => return Err(AddressError::WrongPrefix),
        _ => return Err(AddressError::InvalidHex),
    };
    Ok(encode_tron(&payload))
}

/// Normalize whatever form an address arrives in to base58.
pub fn normalize_tron_address(address: &str) -> Result<String, AddressError> {
    if is_valid_tron_address(address) {
        Ok(address.to_string())
    } else {
        tron_hex_to_base58(address)
    }
}

pub fn tron_address_from_public_key(key: &k256::ecdsa::VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut payload = Vec::with_capacity(TRON_ADDRESS_LEN);
    payload.push(TRON_ADDRESS_PREFIX);
    payload.extend_from_slice(&hash[12..]);
    encode_tron(&payload)
}

/// Derives one deposit address per order from the configured xpub.
#[derive(Clone)]
pub struct AddressAllocator {
    xpub: Option<XPub>,
}

impl std::fmt::Debug for AddressAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressAllocator")
            .field("configured", &self.xpub.is_some())
            .finish()
    }
}

impl AddressAllocator {
    /// An unparsable key is a configuration error; an absent one only fails
    /// once an address is actually requested.
    pub fn new(xpub: Option<&str>) -> Result<Self, AllocatorError> {
        let xpub = xpub
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(XPub::from_str)
            .transpose()
            .map_err(AllocatorError::InvalidXpub)?;
        Ok(Self { xpub })
    }

    pub fn is_configured(&self) -> bool {
        self.xpub.is_some()
    }

    /// Pure function of (xpub, index).
    pub fn derive(&self, network: Network, index: i32) -> Result<String, AllocatorError> {
        let xpub = self.xpub.as_ref().ok_or(AllocatorError::MissingXpub)?;
        let index_u32 = u32::try_from(index).map_err(|_| AllocatorError::InvalidIndex(index))?;
        let child_number = ChildNumber::new(index_u32, false)
            .map_err(|_| AllocatorError::InvalidIndex(index))?;
        let child = xpub
            .derive_child(child_number)
            .map_err(|source| AllocatorError::Derivation {
                index: index_u32,
                source,
            })?;
        match network {
            Network::Tron => Ok(tron_address_from_public_key(child.public_key())),
        }
    }
}
