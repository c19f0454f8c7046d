//! Thin helpers over the external DNS message model: query preparation
//! for the wire and response validation against the attempt that sent it.

use hickory_proto::op::{Edns, Message, MessageType, Query};
use hickory_proto::rr::{Name, RecordType};

use crate::constants::EDNS_UDP_SIZE;
use crate::error::{DnsError, Result};

/// Build a recursion-desired query message for `name` / `record_type`.
pub fn build_query(name: &str, record_type: RecordType) -> Result<Message> {
    let name = Name::from_ascii(name)
        .map_err(|e| DnsError::Proto(format!("invalid domain name '{}': {}", name, e)))?;
    let mut message = Message::new();
    message.set_recursion_desired(true);
    message.add_query(Query::query(name, record_type));
    Ok(message)
}

/// Re-stamp `query` with a fresh transaction id, attach EDNS when
/// configured, and serialize for the wire. Returns the bytes and the id
/// the matching response must carry.
pub fn prepare_query(query: &Message, edns_version: Option<u8>) -> Result<(Vec<u8>, u16)> {
    let mut message = query.clone();
    let txid: u16 = rand::random();
    message.set_id(txid);
    if let Some(version) = edns_version {
        let mut edns = Edns::new();
        edns.set_version(version);
        edns.set_max_payload(EDNS_UDP_SIZE);
        *message.extensions_mut() = Some(edns);
    }
    let wire = message.to_vec()?;
    Ok((wire, txid))
}

/// Decode a datagram and check that it answers the attempt `expected_id`.
pub fn parse_response(bytes: &[u8], expected_id: u16) -> Result<Message> {
    let message = Message::from_vec(bytes)?;
    if message.id() != expected_id {
        return Err(DnsError::Proto(format!(
            "transaction id mismatch: expected {}, got {}",
            expected_id,
            message.id()
        )));
    }
    if message.message_type() != MessageType::Response {
        return Err(DnsError::Proto(
            "received a query instead of a response".to_string(),
        ));
    }
    Ok(message)
}
