pub mod config;
pub mod constants;
pub mod error;
pub mod resolver;
pub mod system;
pub mod tsig;
pub mod wire;

pub use error::{DnsError, Result};
pub use resolver::{FanoutResolver, Resolver, ResolverCallback, ResolverExt, SimpleResolver};
