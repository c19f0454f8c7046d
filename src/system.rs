//! Discovery of the operating system's configured nameservers.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::constants::DNS_PORT;
use crate::error::{DnsError, Result};

/// Parse an upstream server spec into a socket address.
///
/// Supported forms:
///   "1.1.1.1"              -- IPv4, default port 53
///   "1.1.1.1:53"           -- IPv4 with explicit port
///   "2606:4700::1111"      -- bare IPv6, default port 53
///   "[2606:4700::1111]:53" -- bracketed IPv6 with port
///   "dns.example.com:53"   -- hostname, resolved via the OS
pub fn parse_server(input: &str) -> Result<SocketAddr> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DnsError::InvalidServerAddress(input.to_string()));
    }

    if trimmed.starts_with('[') {
        // Bracketed IPv6 with port: [::1]:53
        return trimmed
            .parse()
            .map_err(|_| DnsError::InvalidServerAddress(input.to_string()));
    }

    if trimmed.contains("::") || trimmed.matches(':').count() > 1 {
        // Bare IPv6 address without port
        let ip = trimmed
            .parse()
            .map_err(|_| DnsError::InvalidServerAddress(input.to_string()))?;
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }

    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        // IPv4 with port (e.g. "8.8.8.8:5353")
        return Ok(addr);
    }

    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        // Plain IPv4 without port
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }

    // Hostname, optionally with an explicit port
    let authority = if trimmed.contains(':') {
        trimmed.to_string()
    } else {
        format!("{}:{}", trimmed, DNS_PORT)
    };
    authority
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| DnsError::InvalidServerAddress(input.to_string()))
}

/// Nameservers listed in /etc/resolv.conf.
///
/// Returns an empty vec on non-Unix platforms or if the file cannot be
/// read; callers decide on the fallback.
pub fn nameservers() -> Vec<SocketAddr> {
    match std::fs::read_to_string("/etc/resolv.conf") {
        Ok(contents) => nameservers_from(&contents),
        Err(_) => Vec::new(),
    }
}

fn nameservers_from(contents: &str) -> Vec<SocketAddr> {
    let mut servers = Vec::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with("nameserver") {
            continue;
        }
        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() >= 2 {
            if let Ok(server) = parse_server(parts[1]) {
                servers.push(server);
            }
        }
    }
    servers
}
