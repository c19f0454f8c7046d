//! TSIG (RFC 2845) shared keys and request signing.
//!
//! Outgoing queries are signed at the wire level: the MAC covers the
//! serialized message plus the TSIG variables, and the record is appended
//! to the additional section. Responses are not verified here.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ring::hmac;

use crate::constants::TSIG_FUDGE_SECS;
use crate::error::{DnsError, Result};

const TYPE_TSIG: u16 = 250;
const CLASS_ANY: u16 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsigAlgorithm {
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl TsigAlgorithm {
    /// Algorithm name as used in DNS
    pub fn name(&self) -> &'static str {
        match self {
            TsigAlgorithm::HmacSha256 => "hmac-sha256",
            TsigAlgorithm::HmacSha384 => "hmac-sha384",
            TsigAlgorithm::HmacSha512 => "hmac-sha512",
        }
    }

    fn hmac_algorithm(&self) -> hmac::Algorithm {
        match self {
            TsigAlgorithm::HmacSha256 => hmac::HMAC_SHA256,
            TsigAlgorithm::HmacSha384 => hmac::HMAC_SHA384,
            TsigAlgorithm::HmacSha512 => hmac::HMAC_SHA512,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_end_matches('.').to_lowercase().as_str() {
            "hmac-sha256" => Some(TsigAlgorithm::HmacSha256),
            "hmac-sha384" => Some(TsigAlgorithm::HmacSha384),
            "hmac-sha512" => Some(TsigAlgorithm::HmacSha512),
            _ => None,
        }
    }
}

/// A named shared secret used to sign outgoing queries.
#[derive(Debug, Clone)]
pub struct TsigKey {
    name: String,
    algorithm: TsigAlgorithm,
    secret: Vec<u8>,
}

impl TsigKey {
    pub fn new(name: &str, algorithm: TsigAlgorithm, secret: Vec<u8>) -> Self {
        Self {
            name: name.trim_end_matches('.').to_lowercase(),
            algorithm,
            secret,
        }
    }

    /// Key from a base64-encoded secret, defaulting to hmac-sha256.
    pub fn from_encoded(name: &str, encoded: &str) -> Result<Self> {
        let secret = BASE64
            .decode(encoded.trim())
            .map_err(|e| DnsError::InvalidTsigKey(format!("bad base64 secret: {}", e)))?;
        Ok(Self::new(name, TsigAlgorithm::HmacSha256, secret))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn algorithm(&self) -> TsigAlgorithm {
        self.algorithm
    }

    /// Append a TSIG record to a serialized query and return the signed
    /// wire form. `original_id` is the transaction id already stamped on
    /// the message.
    pub fn sign(&self, wire: &[u8], original_id: u16) -> Vec<u8> {
        let time_signed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.sign_at(wire, original_id, time_signed)
    }

    fn sign_at(&self, wire: &[u8], original_id: u16, time_signed: u64) -> Vec<u8> {
        let mut name_wire = Vec::new();
        encode_name(&mut name_wire, &self.name);
        let mut algorithm_wire = Vec::new();
        encode_name(&mut algorithm_wire, self.algorithm.name());

        // Request MAC: the unsigned message followed by the TSIG
        // variables (name, class, ttl, algorithm, time, fudge, error,
        // other-len).
        let mut mac_input =
            Vec::with_capacity(wire.len() + name_wire.len() + algorithm_wire.len() + 20);
        mac_input.extend_from_slice(wire);
        mac_input.extend_from_slice(&name_wire);
        mac_input.extend_from_slice(&CLASS_ANY.to_be_bytes());
        mac_input.extend_from_slice(&0u32.to_be_bytes());
        mac_input.extend_from_slice(&algorithm_wire);
        mac_input.extend_from_slice(&time48(time_signed));
        mac_input.extend_from_slice(&TSIG_FUDGE_SECS.to_be_bytes());
        mac_input.extend_from_slice(&0u16.to_be_bytes());
        mac_input.extend_from_slice(&0u16.to_be_bytes());

        let key = hmac::Key::new(self.algorithm.hmac_algorithm(), &self.secret);
        let mac = hmac::sign(&key, &mac_input);
        let mac = mac.as_ref();

        let mut rdata = Vec::with_capacity(algorithm_wire.len() + mac.len() + 16);
        rdata.extend_from_slice(&algorithm_wire);
        rdata.extend_from_slice(&time48(time_signed));
        rdata.extend_from_slice(&TSIG_FUDGE_SECS.to_be_bytes());
        rdata.extend_from_slice(&(mac.len() as u16).to_be_bytes());
        rdata.extend_from_slice(mac);
        rdata.extend_from_slice(&original_id.to_be_bytes());
        rdata.extend_from_slice(&0u16.to_be_bytes());
        rdata.extend_from_slice(&0u16.to_be_bytes());

        let mut signed = Vec::with_capacity(wire.len() + name_wire.len() + rdata.len() + 10);
        signed.extend_from_slice(wire);
        signed.extend_from_slice(&name_wire);
        signed.extend_from_slice(&TYPE_TSIG.to_be_bytes());
        signed.extend_from_slice(&CLASS_ANY.to_be_bytes());
        signed.extend_from_slice(&0u32.to_be_bytes());
        signed.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        signed.extend_from_slice(&rdata);

        // The TSIG record lives in the additional section.
        let arcount = u16::from_be_bytes([signed[10], signed[11]]) + 1;
        signed[10..12].copy_from_slice(&arcount.to_be_bytes());
        signed
    }
}

impl FromStr for TsigKey {
    type Err = DnsError;

    /// Parse `name:base64-secret` or `algorithm:name:base64-secret`.
    fn from_str(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split(':').collect();
        match parts.as_slice() {
            [name, secret] => Self::from_encoded(name, secret),
            [algorithm, name, secret] => {
                let algorithm = TsigAlgorithm::from_name(algorithm).ok_or_else(|| {
                    DnsError::InvalidTsigKey(format!("unknown algorithm: {}", algorithm))
                })?;
                let secret = BASE64
                    .decode(secret.trim())
                    .map_err(|e| DnsError::InvalidTsigKey(format!("bad base64 secret: {}", e)))?;
                Ok(Self::new(name, algorithm, secret))
            }
            _ => Err(DnsError::InvalidTsigKey(
                "expected name:secret or algorithm:name:secret".to_string(),
            )),
        }
    }
}

/// Uncompressed wire encoding of a domain name.
fn encode_name(buffer: &mut Vec<u8>, name: &str) {
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() {
            continue;
        }
        buffer.push(label.len() as u8);
        buffer.extend_from_slice(label.as_bytes());
    }
    buffer.push(0);
}

fn time48(secs: u64) -> [u8; 6] {
    let bytes = secs.to_be_bytes();
    [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> TsigKey {
        TsigKey::new("update.example", TsigAlgorithm::HmacSha256, b"sekrit".to_vec())
    }

    // A minimal unsigned query: header with id 0x1234 and zeroed counts.
    fn bare_header() -> Vec<u8> {
        let mut wire = vec![0u8; 12];
        wire[0] = 0x12;
        wire[1] = 0x34;
        wire
    }

    #[test]
    fn parses_key_specs() {
        let key: TsigKey = "update.example:c2Vrcml0".parse().unwrap();
        assert_eq!(key.name(), "update.example");
        assert_eq!(key.algorithm(), TsigAlgorithm::HmacSha256);

        let key: TsigKey = "hmac-sha512:update.example:c2Vrcml0".parse().unwrap();
        assert_eq!(key.algorithm(), TsigAlgorithm::HmacSha512);

        assert!("no-colons".parse::<TsigKey>().is_err());
        assert!("update.example:!!!".parse::<TsigKey>().is_err());
        assert!("hmac-md4:update.example:c2Vrcml0".parse::<TsigKey>().is_err());
    }

    #[test]
    fn signing_appends_record_and_bumps_arcount() {
        let wire = bare_header();
        let signed = test_key().sign_at(&wire, 0x1234, 1_700_000_000);

        assert!(signed.len() > wire.len());
        assert_eq!(signed[..12], [0x12, 0x34, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        // Record name follows the original message.
        assert_eq!(signed[12], 6);
        assert_eq!(&signed[13..19], b"update");
        assert_eq!(signed[19], 7);
        assert_eq!(&signed[20..27], b"example");
        assert_eq!(signed[27], 0);
        // Type TSIG, class ANY.
        assert_eq!(&signed[28..32], &[0, 250, 0, 255]);
    }

    #[test]
    fn mac_is_deterministic_for_fixed_time() {
        let wire = bare_header();
        let key = test_key();
        let first = key.sign_at(&wire, 0x1234, 1_700_000_000);
        let second = key.sign_at(&wire, 0x1234, 1_700_000_000);
        assert_eq!(first, second);

        let other_time = key.sign_at(&wire, 0x1234, 1_700_000_001);
        assert_ne!(first, other_time);
    }

    #[test]
    fn sha256_mac_is_32_bytes() {
        let signed = test_key().sign_at(&bare_header(), 0x1234, 1_700_000_000);
        // rdata starts after name (16 bytes) + type/class/ttl/rdlength (10).
        let rdata = &signed[12 + 16 + 10..];
        // algorithm name "hmac-sha256" wire form (13 bytes), time (6),
        // fudge (2), then the mac size.
        let mac_size = u16::from_be_bytes([rdata[21], rdata[22]]);
        assert_eq!(mac_size, 32);
    }
}
