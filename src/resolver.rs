//! Host name resolution.
//!
//! Resolution happens exactly once, at load time, so scrapes never touch
//! the resolver. The trait exists so the compiler can be exercised in
//! tests without a working system resolver.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

use crate::types::Protocol;

/// Load-time name resolver interface.
pub trait Resolver: Send + Sync {
    /// Resolve a hostname to one address usable with the given protocol
    /// family: the first IPv4 result for `tcp`/`udp`, the first IPv6
    /// result for `tcp6`/`udp6`.
    fn resolve(&self, host: &str, family: Protocol) -> io::Result<IpAddr>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, family: Protocol) -> io::Result<IpAddr> {
        // IP literals pass through, but only if they fit the family: a v6
        // literal on a tcp rule can never match a v4 connection table.
        if let Ok(ip) = host.parse::<IpAddr>() {
            return if ip.is_ipv6() == family.is_ipv6() {
                Ok(ip)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("address '{}' does not belong to family {}", host, family),
                ))
            };
        }

        let addrs = (host, 0u16).to_socket_addrs()?;
        pick_for_family(addrs.map(|a| a.ip()), family).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} address found for '{}'", family_label(family), host),
            )
        })
    }
}

/// Resolver with predefined mappings, for tests.
#[derive(Debug, Default)]
pub struct StaticResolver {
    mappings: HashMap<String, (Option<Ipv4Addr>, Option<Ipv6Addr>)>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping and return self for chaining.
    pub fn with_mapping(
        mut self,
        host: impl Into<String>,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> Self {
        self.mappings.insert(host.into(), (ipv4, ipv6));
        self
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, host: &str, family: Protocol) -> io::Result<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            if ip.is_ipv6() == family.is_ipv6() {
                return Ok(ip);
            }
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("address '{}' does not belong to family {}", host, family),
            ));
        }

        let (ipv4, ipv6) = self.mappings.get(host).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("host not found: {}", host))
        })?;
        let ip = if family.is_ipv6() {
            ipv6.map(IpAddr::V6)
        } else {
            ipv4.map(IpAddr::V4)
        };
        ip.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} address found for '{}'", family_label(family), host),
            )
        })
    }
}

fn pick_for_family(ips: impl Iterator<Item = IpAddr>, family: Protocol) -> Option<IpAddr> {
    let want_v6 = family.is_ipv6();
    for ip in ips {
        if ip.is_ipv6() == want_v6 {
            return Some(ip);
        }
    }
    None
}

fn family_label(family: Protocol) -> &'static str {
    if family.is_ipv6() {
        "IPv6"
    } else {
        "IPv4"
    }
}
