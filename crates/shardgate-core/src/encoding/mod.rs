//! Injected capabilities: address codec, hasher and marshaller.
//!
//! The core never hardcodes an address format or hash function; processors
//! receive these as trait objects at construction time. The defaults here
//! cover the common deployment: hex public keys, SHA-256, JSON marshalling.

use num_bigint::BigUint;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::ProcessError;

/// Converts between the textual address representation used on the wire and
/// raw public-key bytes.
pub trait AddressCodec: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ProcessError::InvalidAddress`] when the input is not a
    /// valid address.
    fn decode(&self, address: &str) -> Result<Vec<u8>, ProcessError>;

    fn encode(&self, bytes: &[u8]) -> String;
}

/// Hex address codec, optionally enforcing a fixed public-key length.
pub struct HexAddressCodec {
    expected_len: Option<usize>,
}

impl HexAddressCodec {
    /// Codec that requires decoded keys of exactly `len` bytes.
    #[must_use]
    pub fn strict(len: usize) -> Self {
        Self { expected_len: Some(len) }
    }

    /// Codec that accepts any even-length hex string.
    #[must_use]
    pub fn lenient() -> Self {
        Self { expected_len: None }
    }
}

impl AddressCodec for HexAddressCodec {
    fn decode(&self, address: &str) -> Result<Vec<u8>, ProcessError> {
        let bytes =
            hex::decode(address).map_err(|e| ProcessError::InvalidAddress(e.to_string()))?;

        if let Some(expected) = self.expected_len {
            if bytes.len() != expected {
                return Err(ProcessError::InvalidAddress(format!(
                    "expected {expected} address bytes, got {}",
                    bytes.len()
                )));
            }
        }

        Ok(bytes)
    }

    fn encode(&self, bytes: &[u8]) -> String {
        hex::encode(bytes)
    }
}

/// Computes a digest over opaque bytes.
pub trait Hasher: Send + Sync {
    fn hash(&self, data: &[u8]) -> Vec<u8>;
}

/// SHA-256 hasher.
#[derive(Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }
}

/// The protocol-level transaction form used for hash computation: raw bytes
/// for addresses, chain id and data, normalized decimal for the value.
///
/// Field order is fixed by this declaration, so marshalling is deterministic
/// regardless of how the wire transaction was assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalTransaction {
    pub nonce: u64,
    pub value: String,
    pub receiver: Vec<u8>,
    pub sender: Vec<u8>,
    #[serde(rename = "gasPrice")]
    pub gas_price: u64,
    #[serde(rename = "gasLimit")]
    pub gas_limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(rename = "chainID")]
    pub chain_id: Vec<u8>,
    pub version: u32,
    pub signature: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<u32>,
}

/// Serializes a [`CanonicalTransaction`] for hashing.
pub trait Marshaller: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ProcessError::Marshal`] when serialization fails.
    fn marshal(&self, tx: &CanonicalTransaction) -> Result<Vec<u8>, ProcessError>;
}

/// JSON marshaller with deterministic field order.
#[derive(Default)]
pub struct JsonMarshaller;

impl Marshaller for JsonMarshaller {
    fn marshal(&self, tx: &CanonicalTransaction) -> Result<Vec<u8>, ProcessError> {
        serde_json::to_vec(tx).map_err(|e| ProcessError::Marshal(e.to_string()))
    }
}

/// Normalizes a decimal value string into its canonical form.
///
/// # Errors
///
/// Returns [`ProcessError::InvalidTransactionValueField`] when the input is
/// not a non-negative arbitrary-precision integer.
pub fn parse_value(value: &str) -> Result<BigUint, ProcessError> {
    value
        .parse::<BigUint>()
        .map_err(|e| ProcessError::InvalidTransactionValueField(format!("{value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_codec_enforces_length() {
        let codec = HexAddressCodec::strict(4);
        assert_eq!(codec.decode("61616161").unwrap(), b"aaaa");
        assert!(matches!(codec.decode("6161"), Err(ProcessError::InvalidAddress(_))));
        assert!(matches!(codec.decode("zz"), Err(ProcessError::InvalidAddress(_))));
    }

    #[test]
    fn lenient_codec_round_trips() {
        let codec = HexAddressCodec::lenient();
        let bytes = codec.decode("62626262").unwrap();
        assert_eq!(codec.encode(&bytes), "62626262");
    }

    #[test]
    fn value_parsing() {
        assert_eq!(parse_value("1000").unwrap().to_string(), "1000");
        assert_eq!(parse_value("000123").unwrap().to_string(), "123");
        assert!(parse_value("aaaa").is_err());
        assert!(parse_value("-5").is_err());
        assert!(parse_value("").is_err());
    }

    #[test]
    fn marshalling_is_deterministic() {
        let tx = CanonicalTransaction {
            nonce: 1,
            value: "1000".to_string(),
            receiver: b"recv".to_vec(),
            sender: b"send".to_vec(),
            gas_price: 12,
            gas_limit: 13,
            data: Some(b"aGVsbG8=".to_vec()),
            chain_id: b"1".to_vec(),
            version: 1,
            signature: b"sig".to_vec(),
            options: None,
        };

        let marshaller = JsonMarshaller;
        assert_eq!(marshaller.marshal(&tx).unwrap(), marshaller.marshal(&tx.clone()).unwrap());
    }

    #[test]
    fn sha256_hasher_matches_known_digest() {
        let hasher = Sha256Hasher;
        assert_eq!(
            hex::encode(hasher.hash(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
