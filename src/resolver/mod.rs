//! The resolver trait, the per-server and fan-out implementations, and
//! the background-send front.

mod fanout;
mod simple;

pub use fanout::FanoutResolver;
pub use simple::SimpleResolver;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;

use crate::error::{DnsError, Result};
use crate::tsig::TsigKey;

static QUERY_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A component that can resolve one DNS query: either against a single
/// upstream server, or by fanning the query out across several.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Send `query` and wait for the best available response.
    async fn send(&self, query: &Message) -> Result<Message>;

    /// Change the destination port on every underlying server.
    fn set_port(&self, port: u16);

    /// Use TCP for all transactions instead of UDP with TCP fallback.
    fn set_tcp(&self, use_tcp: bool);

    /// Accept truncated UDP responses instead of falling back to TCP.
    fn set_ignore_truncation(&self, ignore: bool);

    /// Attach EDNS at the given version to outgoing queries.
    fn set_edns(&self, version: u8);

    /// Sign outgoing queries with `key`.
    fn set_tsig_key(&self, key: TsigKey);

    /// Bound each attempt by `timeout`.
    fn set_timeout(&self, timeout: Duration);
}

/// Receives the outcome of a background send. Exactly one of the two
/// methods is invoked per query id.
pub trait ResolverCallback: Send + Sync + 'static {
    fn on_response(&self, id: u64, response: Message);
    fn on_error(&self, id: u64, error: DnsError);
}

/// Background-send support for any shared resolver.
pub trait ResolverExt {
    /// Resolve `query` on a background task, delivering the outcome to
    /// `callback`. Returns the query id without blocking; there is no
    /// way to cancel a query once issued.
    fn send_background(&self, query: Message, callback: Arc<dyn ResolverCallback>) -> u64;
}

impl<R: Resolver + ?Sized + 'static> ResolverExt for Arc<R> {
    fn send_background(&self, query: Message, callback: Arc<dyn ResolverCallback>) -> u64 {
        let id = QUERY_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            match resolver.send(&query).await {
                Ok(response) => callback.on_response(id, response),
                Err(error) => callback.on_error(id, error),
            }
        });
        id
    }
}
