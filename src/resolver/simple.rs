//! A resolver bound to a single upstream server.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::constants::{QUANTUM_SECS, UDP_RECV_BUFFER_SIZE};
use crate::error::{DnsError, Result};
use crate::system;
use crate::tsig::TsigKey;
use crate::wire;

use super::Resolver;

#[derive(Debug, Clone)]
struct TransportOptions {
    use_tcp: bool,
    ignore_truncation: bool,
    timeout: Duration,
    edns_version: Option<u8>,
    tsig_key: Option<TsigKey>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            use_tcp: false,
            ignore_truncation: false,
            timeout: Duration::from_secs(QUANTUM_SECS),
            edns_version: None,
            tsig_key: None,
        }
    }
}

/// Performs one DNS transaction against one upstream server.
///
/// UDP is tried first; a truncated response is retried over TCP unless
/// truncation is explicitly accepted. Every attempt is bounded by the
/// configured timeout and validated against the transaction id it was
/// sent with.
pub struct SimpleResolver {
    address: RwLock<SocketAddr>,
    options: RwLock<TransportOptions>,
}

impl SimpleResolver {
    /// Create a resolver for `server`, given as an address or
    /// `host:port` spec.
    pub fn new(server: &str) -> Result<Self> {
        Ok(Self::from_addr(system::parse_server(server)?))
    }

    pub fn from_addr(address: SocketAddr) -> Self {
        Self {
            address: RwLock::new(address),
            options: RwLock::new(TransportOptions::default()),
        }
    }

    pub fn address(&self) -> SocketAddr {
        *self.address.read()
    }

    pub fn port(&self) -> u16 {
        self.address.read().port()
    }

    pub fn tcp(&self) -> bool {
        self.options.read().use_tcp
    }

    pub fn ignores_truncation(&self) -> bool {
        self.options.read().ignore_truncation
    }

    pub fn timeout(&self) -> Duration {
        self.options.read().timeout
    }

    pub fn edns(&self) -> Option<u8> {
        self.options.read().edns_version
    }

    pub fn tsig_key(&self) -> Option<TsigKey> {
        self.options.read().tsig_key.clone()
    }

    async fn exchange(
        address: SocketAddr,
        wire_bytes: &[u8],
        txid: u16,
        options: &TransportOptions,
    ) -> Result<Message> {
        if options.use_tcp {
            return Self::exchange_tcp(address, wire_bytes, txid).await;
        }
        let response = Self::exchange_udp(address, wire_bytes, txid).await?;
        if response.truncated() && !options.ignore_truncation {
            debug!("UDP response from {} truncated, retrying over TCP", address);
            return Self::exchange_tcp(address, wire_bytes, txid).await;
        }
        Ok(response)
    }

    async fn exchange_udp(address: SocketAddr, wire_bytes: &[u8], txid: u16) -> Result<Message> {
        let bind_addr = if address.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        // A dedicated socket per attempt keeps concurrent attempts from
        // stealing each other's datagrams.
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.send_to(wire_bytes, address).await?;

        let mut buf = vec![0u8; UDP_RECV_BUFFER_SIZE];
        loop {
            let (len, _src) = socket.recv_from(&mut buf).await?;
            trace!("received {} bytes from {}", len, address);
            match wire::parse_response(&buf[..len], txid) {
                Ok(message) => return Ok(message),
                Err(err) => {
                    // Stray or mismatched datagram; keep listening until
                    // the attempt deadline cuts us off.
                    debug!("discarding datagram from {}: {}", address, err);
                }
            }
        }
    }

    async fn exchange_tcp(address: SocketAddr, wire_bytes: &[u8], txid: u16) -> Result<Message> {
        let mut stream = TcpStream::connect(address).await?;

        // Length-prefixed query
        let query_length = wire_bytes.len() as u16;
        stream.write_all(&query_length.to_be_bytes()).await?;
        stream.write_all(wire_bytes).await?;
        stream.flush().await?;

        let mut length_buf = [0u8; 2];
        stream.read_exact(&mut length_buf).await?;
        let response_length = u16::from_be_bytes(length_buf) as usize;

        let mut response_buf = vec![0u8; response_length];
        stream.read_exact(&mut response_buf).await?;
        wire::parse_response(&response_buf, txid)
    }
}

#[async_trait]
impl Resolver for SimpleResolver {
    async fn send(&self, query: &Message) -> Result<Message> {
        let address = *self.address.read();
        let options = self.options.read().clone();

        let (mut wire_bytes, txid) = wire::prepare_query(query, options.edns_version)?;
        if let Some(key) = &options.tsig_key {
            wire_bytes = key.sign(&wire_bytes, txid);
        }

        trace!("sending {} bytes to {}", wire_bytes.len(), address);
        timeout(
            options.timeout,
            Self::exchange(address, &wire_bytes, txid, &options),
        )
        .await
        .map_err(|_| DnsError::Timeout)?
    }

    fn set_port(&self, port: u16) {
        self.address.write().set_port(port);
    }

    fn set_tcp(&self, use_tcp: bool) {
        self.options.write().use_tcp = use_tcp;
    }

    fn set_ignore_truncation(&self, ignore: bool) {
        self.options.write().ignore_truncation = ignore;
    }

    fn set_edns(&self, version: u8) {
        self.options.write().edns_version = Some(version);
    }

    fn set_tsig_key(&self, key: TsigKey) {
        self.options.write().tsig_key = Some(key);
    }

    fn set_timeout(&self, timeout: Duration) {
        self.options.write().timeout = timeout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_quantum() {
        let resolver = SimpleResolver::new("9.9.9.9").unwrap();
        assert_eq!(resolver.address().port(), 53);
        assert_eq!(resolver.timeout(), Duration::from_secs(20));
        assert!(!resolver.tcp());
        assert!(!resolver.ignores_truncation());
        assert_eq!(resolver.edns(), None);
        assert!(resolver.tsig_key().is_none());
    }

    #[test]
    fn setters_are_observable() {
        let resolver = SimpleResolver::new("9.9.9.9").unwrap();
        resolver.set_port(5353);
        resolver.set_tcp(true);
        resolver.set_ignore_truncation(true);
        resolver.set_edns(0);
        resolver.set_timeout(Duration::from_secs(2));

        assert_eq!(resolver.port(), 5353);
        assert!(resolver.tcp());
        assert!(resolver.ignores_truncation());
        assert_eq!(resolver.edns(), Some(0));
        assert_eq!(resolver.timeout(), Duration::from_secs(2));
    }
}
