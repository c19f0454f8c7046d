//! The fan-out resolution engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::ResolverConfig;
use crate::constants::{DEFAULT_RETRIES, DNS_PORT};
use crate::error::{DnsError, Result};
use crate::system;
use crate::tsig::TsigKey;

use super::{Resolver, SimpleResolver};

/// Rotation cursor shared by every load-balanced call in the process.
/// Updates are relaxed; a skipped or repeated rotation is harmless.
static LB_START: AtomicUsize = AtomicUsize::new(0);

/// Resolves queries against a set of upstream servers in parallel.
///
/// Each call fans the query out across the members in a staggered scan
/// order and retries individual servers on transient loss. The first
/// `NOERROR` response wins outright. When none arrives, the best failure
/// response is returned (`NXDOMAIN` beats generic failure), and the
/// first I/O error is surfaced only if no server produced a response at
/// all.
pub struct FanoutResolver {
    members: RwLock<Vec<Arc<dyn Resolver>>>,
    retries: AtomicUsize,
    load_balance: AtomicBool,
}

impl FanoutResolver {
    /// Build from the system's configured nameservers, falling back to
    /// localhost when none are found.
    pub fn from_system() -> Self {
        let mut servers = system::nameservers();
        if servers.is_empty() {
            servers.push(SocketAddr::from((std::net::Ipv4Addr::LOCALHOST, DNS_PORT)));
        }
        let members = servers
            .into_iter()
            .map(|addr| Arc::new(SimpleResolver::from_addr(addr)) as Arc<dyn Resolver>)
            .collect();
        Self::with_members(members)
    }

    /// Build with one member per server spec.
    pub fn from_servers<S: AsRef<str>>(servers: &[S]) -> Result<Self> {
        if servers.is_empty() {
            return Err(DnsError::NoServersConfigured);
        }
        let members = servers
            .iter()
            .map(|server| {
                let member = SimpleResolver::new(server.as_ref())?;
                Ok(Arc::new(member) as Arc<dyn Resolver>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::with_members(members))
    }

    /// Adopt prebuilt members as-is, leaving their transport settings
    /// untouched.
    pub fn from_resolvers(members: Vec<Arc<dyn Resolver>>) -> Result<Self> {
        if members.is_empty() {
            return Err(DnsError::NoServersConfigured);
        }
        Ok(Self::with_members(members))
    }

    /// Build from a config: explicit servers, or system discovery when
    /// the server list is empty.
    pub fn from_config(config: &ResolverConfig) -> Self {
        let resolver = if config.servers.is_empty() {
            Self::from_system()
        } else {
            let members = config
                .servers
                .iter()
                .map(|&addr| Arc::new(SimpleResolver::from_addr(addr)) as Arc<dyn Resolver>)
                .collect();
            Self::with_members(members)
        };
        resolver.set_timeout(config.timeout);
        resolver.set_retries(config.retries);
        resolver.set_load_balance(config.load_balance);
        resolver
    }

    fn with_members(members: Vec<Arc<dyn Resolver>>) -> Self {
        Self {
            members: RwLock::new(members),
            retries: AtomicUsize::new(DEFAULT_RETRIES),
            load_balance: AtomicBool::new(false),
        }
    }

    pub fn add_resolver(&self, resolver: Arc<dyn Resolver>) {
        self.members.write().push(resolver);
    }

    /// Remove a member by identity. Returns whether it was present.
    pub fn delete_resolver(&self, resolver: &Arc<dyn Resolver>) -> bool {
        let mut members = self.members.write();
        match members.iter().position(|member| Arc::ptr_eq(member, resolver)) {
            Some(index) => {
                members.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get_resolver(&self, index: usize) -> Option<Arc<dyn Resolver>> {
        self.members.read().get(index).cloned()
    }

    pub fn resolvers(&self) -> Vec<Arc<dyn Resolver>> {
        self.members.read().clone()
    }

    /// Maximum attempts per server and call; clamped to at least one.
    pub fn set_retries(&self, retries: usize) {
        self.retries.store(retries.max(1), Ordering::Relaxed);
    }

    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn set_load_balance(&self, load_balance: bool) {
        self.load_balance.store(load_balance, Ordering::Relaxed);
    }

    pub fn load_balance(&self) -> bool {
        self.load_balance.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Resolver for FanoutResolver {
    async fn send(&self, query: &Message) -> Result<Message> {
        // Snapshot the member list; list maintenance during the call
        // does not affect it.
        let members = self.resolvers();
        let count = members.len();
        let retries = self.retries();
        let start = if count > 0 && self.load_balance() {
            LB_START.fetch_add(1, Ordering::Relaxed) % count
        } else {
            0
        };

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let mut sent = vec![0usize; count];
        let mut recvd = vec![0usize; count];
        let mut invalid = vec![false; count];
        let mut best: Option<Message> = None;
        let mut first_error: Option<DnsError> = None;

        loop {
            // Scan for the next dispatch candidate, starting at the
            // rotation cursor. A member with outstanding work keeps the
            // call alive even when it cannot take another attempt.
            let mut dispatched = false;
            let mut waiting = false;
            for offset in 0..count {
                let index = (start + offset) % count;
                if !invalid[index] && sent[index] == recvd[index] && sent[index] < retries {
                    debug!(
                        "sending to resolver {} (attempt {}/{})",
                        index,
                        sent[index] + 1,
                        retries
                    );
                    sent[index] += 1;
                    let member = Arc::clone(&members[index]);
                    let attempt_query = query.clone();
                    let outcomes = outcome_tx.clone();
                    tokio::spawn(async move {
                        let outcome = member.send(&attempt_query).await;
                        // The receiver is gone once the call has returned.
                        let _ = outcomes.send((index, outcome));
                    });
                    dispatched = true;
                    waiting = true;
                    break;
                } else if recvd[index] < sent[index] {
                    waiting = true;
                }
            }
            if !waiting {
                break;
            }

            // Right after a dispatch, only drain what has already
            // arrived, so the remaining first attempts go out before the
            // call blocks.
            let arrival = if dispatched {
                outcome_rx.try_recv().ok()
            } else {
                outcome_rx.recv().await
            };
            let Some((index, outcome)) = arrival else {
                continue;
            };

            recvd[index] += 1;
            match outcome {
                Ok(response) => {
                    if response.response_code() == ResponseCode::NoError {
                        debug!("resolver {} answered NOERROR", index);
                        return Ok(response);
                    }
                    trace!("resolver {} answered {}", index, response.response_code());
                    invalid[index] = true;
                    best = Some(match best.take() {
                        None => response,
                        Some(current) => better_response(current, response),
                    });
                }
                Err(error) => {
                    warn!("resolver {} failed: {}", index, error);
                    if !error.is_transient() {
                        invalid[index] = true;
                    }
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        match (best, first_error) {
            (Some(response), _) => Ok(response),
            (None, Some(error)) => Err(error),
            (None, None) => Err(DnsError::NoResponse),
        }
    }

    fn set_port(&self, port: u16) {
        for member in self.members.read().iter() {
            member.set_port(port);
        }
    }

    fn set_tcp(&self, use_tcp: bool) {
        for member in self.members.read().iter() {
            member.set_tcp(use_tcp);
        }
    }

    fn set_ignore_truncation(&self, ignore: bool) {
        for member in self.members.read().iter() {
            member.set_ignore_truncation(ignore);
        }
    }

    fn set_edns(&self, version: u8) {
        for member in self.members.read().iter() {
            member.set_edns(version);
        }
    }

    fn set_tsig_key(&self, key: TsigKey) {
        for member in self.members.read().iter() {
            member.set_tsig_key(key.clone());
        }
    }

    fn set_timeout(&self, timeout: Duration) {
        for member in self.members.read().iter() {
            member.set_timeout(timeout);
        }
    }
}

/// Authoritative non-existence beats generic failure; otherwise the
/// earlier stash stands.
fn better_response(current: Message, incoming: Message) -> Message {
    if incoming.response_code() == ResponseCode::NXDomain
        && current.response_code() != ResponseCode::NXDomain
    {
        incoming
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_code(code: ResponseCode) -> Message {
        let mut message = Message::new();
        message.set_response_code(code);
        message
    }

    #[test]
    fn nxdomain_displaces_servfail() {
        let kept = better_response(
            response_with_code(ResponseCode::ServFail),
            response_with_code(ResponseCode::NXDomain),
        );
        assert_eq!(kept.response_code(), ResponseCode::NXDomain);
    }

    #[test]
    fn servfail_does_not_displace_nxdomain() {
        let kept = better_response(
            response_with_code(ResponseCode::NXDomain),
            response_with_code(ResponseCode::ServFail),
        );
        assert_eq!(kept.response_code(), ResponseCode::NXDomain);
    }

    #[test]
    fn first_of_equal_codes_wins() {
        let mut first = response_with_code(ResponseCode::ServFail);
        first.set_id(1);
        let mut second = response_with_code(ResponseCode::ServFail);
        second.set_id(2);
        assert_eq!(better_response(first, second).id(), 1);
    }

    #[test]
    fn empty_member_list_is_rejected_at_construction() {
        assert!(FanoutResolver::from_resolvers(Vec::new()).is_err());
        assert!(FanoutResolver::from_servers::<&str>(&[]).is_err());
    }
}
