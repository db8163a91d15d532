//! sockwatch reports whether declared socket connections currently exist.
//!
//! The exporter periodically inspects the operating system's connection
//! table and publishes, per user-declared socket rule, a pair of Prometheus
//! gauges: whether a matching connection exists (`connection_status_up`)
//! and how many exist (`connection_status_count`).
//!
//! # Example
//!
//! ```rust
//! use sockwatch::{compile, SocketConfig, SocketSetCollector, StaticSource};
//! use sockwatch::resolver::StaticResolver;
//! use prometheus::Registry;
//!
//! let config = SocketConfig::parse("
//! sockets:
//!   - name: ssh
//!     host: '*'
//!     port: 22
//! ").unwrap();
//!
//! // Resolve, validate and bucket the rules once, at load time.
//! let rules = compile(&config, &StaticResolver::new()).unwrap();
//!
//! // In production the source is `ProcfsSource::new("/proc")`.
//! let collector = SocketSetCollector::new(rules, Box::new(StaticSource::new()));
//!
//! let registry = Registry::new();
//! registry.register(Box::new(collector)).unwrap();
//! // Every gather performs one scrape.
//! let families = registry.gather();
//! assert!(!families.is_empty());
//! ```
//!
//! # Rule surface
//!
//! Each rule declares a `name` plus any of: `host`/`srcHost`/`dstHost`
//! (concrete host, IP, or the wildcard `any`/`*`), `port`/`srcPort`/
//! `dstPort`, a `protocol` (`tcp`, `tcp6`, `udp`, `udp6`), a desired
//! `status` (`listen` or `established`) and an anchored `process` name
//! pattern. Hostnames resolve once at load; unknown fields anywhere in
//! the document are fatal.

pub mod collector;
pub mod compile;
pub mod config;
pub mod error;
pub mod matcher;
pub mod procfs;
pub mod resolver;
pub mod server;
pub mod source;
pub mod types;

// Re-export commonly used items
pub use collector::{SocketSetCollector, LABEL_NAMES};
pub use compile::{compile, RuleSet, RuleSpec};
pub use config::{RawSocketRule, SocketConfig};
pub use error::{Result, WatchError};
pub use matcher::{summarize, EndpointMatcher, MatchSummary, ProcessMatcher};
pub use procfs::ProcfsSource;
pub use resolver::{Resolver, StaticResolver, SystemResolver};
pub use source::{ConnectionSource, StaticSource};
pub use types::{Protocol, SockEntry, SockState};

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_full_workflow() {
        let config = SocketConfig::parse(
            "
sockets:
  - name: ssh
    host: '*'
    port: 22
  - name: dns
    host: '*'
    port: 53
    protocol: udp
",
        )
        .unwrap();

        let rules = compile(&config, &StaticResolver::new()).unwrap();
        assert_eq!(rules.len(), 2);

        let source = StaticSource::new().with_entries(
            Protocol::Tcp,
            vec![SockEntry {
                local_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                local_port: 22,
                remote_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                remote_port: 0,
                state: SockState::Listen,
                process: None,
            }],
        );

        let collector = SocketSetCollector::new(rules, Box::new(source));
        let registry = prometheus::Registry::new();
        registry.register(Box::new(collector)).unwrap();

        let families = registry.gather();
        assert_eq!(families.len(), 2);

        // ssh is up (one listener), dns is down (empty udp table).
        let status = families
            .iter()
            .find(|f| f.get_name() == "connection_status_up")
            .unwrap();
        for metric in status.get_metric() {
            let name = metric
                .get_label()
                .iter()
                .find(|l| l.get_name() == "name")
                .unwrap()
                .get_value();
            let expected = if name == "ssh" { 1.0 } else { 0.0 };
            assert_eq!(metric.get_gauge().get_value(), expected, "rule {}", name);
        }
    }
}
