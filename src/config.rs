use std::net::SocketAddr;
use std::time::Duration;

use crate::constants::{DEFAULT_RETRIES, QUANTUM_SECS};
use crate::error::{DnsError, Result};
use crate::system;

/// Tunables for building a fan-out resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Upstream servers to query; empty means discover from the system
    pub servers: Vec<SocketAddr>,

    /// Per-attempt timeout applied to each member
    pub timeout: Duration,

    /// Maximum attempts per server and call
    pub retries: usize,

    /// Rotate the first server tried across calls
    pub load_balance: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            timeout: Duration::from_secs(QUANTUM_SECS),
            retries: DEFAULT_RETRIES,
            load_balance: false,
        }
    }
}

impl ResolverConfig {
    /// Override defaults from BIFROST_* environment variables.
    /// Returns Err if a present variable does not parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(servers) = std::env::var("BIFROST_UPSTREAM_SERVERS") {
            let parsed = servers
                .split(',')
                .map(|s| system::parse_server(s))
                .collect::<Result<Vec<SocketAddr>>>()?;
            if parsed.is_empty() {
                return Err(DnsError::InvalidConfig("BIFROST_UPSTREAM_SERVERS", servers));
            }
            config.servers = parsed;
        }

        if let Ok(timeout) = std::env::var("BIFROST_TIMEOUT") {
            let secs = timeout
                .parse::<u64>()
                .ok()
                .filter(|&secs| secs > 0)
                .ok_or(DnsError::InvalidConfig("BIFROST_TIMEOUT", timeout))?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Ok(retries) = std::env::var("BIFROST_RETRIES") {
            config.retries = retries
                .parse::<usize>()
                .ok()
                .filter(|&count| count > 0)
                .ok_or(DnsError::InvalidConfig("BIFROST_RETRIES", retries))?;
        }

        if let Ok(flag) = std::env::var("BIFROST_LOAD_BALANCE") {
            config.load_balance = parse_bool(&flag, false);
        }

        Ok(config)
    }
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = ResolverConfig::default();
        assert!(config.servers.is_empty());
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.retries, 3);
        assert!(!config.load_balance);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("true", false));
        assert!(parse_bool("YES", false));
        assert!(parse_bool("1", false));
        assert!(!parse_bool("off", true));
        assert!(parse_bool("gibberish", true));
    }
}
