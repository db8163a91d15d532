//! Configuration document layer.
//!
//! This module owns exactly what the operator wrote: the YAML document is
//! deserialized into immutable raw records and nothing more. Validation,
//! name resolution and pattern compilation happen in [`crate::compile`],
//! which turns raw records into [`crate::compile::RuleSpec`]s without ever
//! mutating the parsed form.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, WatchError};

/// One socket rule as declared in the configuration document.
///
/// Any key outside this set, anywhere in the document, is a fatal parse
/// error; `deny_unknown_fields` is the contract, not a lint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSocketRule {
    #[serde(default)]
    pub name: String,

    /// Generic host alias; stands in for `srcHost` when that is absent.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, rename = "srcHost")]
    pub src_host: Option<String>,
    #[serde(default, rename = "dstHost")]
    pub dst_host: Option<String>,

    /// Generic port alias; stands in for `srcPort` when that is absent.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, rename = "srcPort")]
    pub src_port: Option<u16>,
    #[serde(default, rename = "dstPort")]
    pub dst_port: Option<u16>,

    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub process: Option<String>,
}

/// The full declared rule document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocketConfig {
    #[serde(default)]
    pub sockets: Vec<RawSocketRule>,
}

impl SocketConfig {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| WatchError::ReadConfig {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse a configuration document from text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_document() {
        let config = SocketConfig::parse(
            "sockets:\n  - name: ssh\n    host: localhost\n    port: 22\n",
        )
        .unwrap();
        assert_eq!(config.sockets.len(), 1);
        assert_eq!(config.sockets[0].name, "ssh");
        assert_eq!(config.sockets[0].host.as_deref(), Some("localhost"));
        assert_eq!(config.sockets[0].port, Some(22));
        assert!(config.sockets[0].status.is_none());
    }

    #[test]
    fn unknown_field_on_rule_is_fatal() {
        // Scenario: a rule carrying `foo: bar` must fail the whole load
        // with an unknown-field diagnostic.
        let err = SocketConfig::parse(
            "sockets:\n  - name: ssh\n    host: localhost\n    port: 22\n    foo: bar\n",
        )
        .unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("unknown field"), "got: {}", display);
        assert!(display.contains("foo"), "got: {}", display);
    }

    #[test]
    fn unknown_field_at_document_root_is_fatal() {
        let err = SocketConfig::parse("sockets: []\nextra: true\n").unwrap_err();
        assert!(format!("{}", err).contains("unknown field"));
    }

    #[test]
    fn aliases_parse_independently() {
        let config = SocketConfig::parse(
            "sockets:\n  - name: web\n    dstHost: 10.0.0.5\n    dstPort: 443\n    srcPort: 8080\n    status: established\n",
        )
        .unwrap();
        let rule = &config.sockets[0];
        assert_eq!(rule.dst_host.as_deref(), Some("10.0.0.5"));
        assert_eq!(rule.dst_port, Some(443));
        assert_eq!(rule.src_port, Some(8080));
        assert!(rule.host.is_none());
        assert_eq!(rule.status.as_deref(), Some("established"));
    }

    #[test]
    fn empty_document_parses_to_no_rules() {
        let config = SocketConfig::parse("sockets: []\n").unwrap();
        assert!(config.sockets.is_empty());
    }

    #[test]
    fn port_zero_is_a_real_value() {
        // Option<u16> removes the Go-style zero sentinel: an explicit 0
        // deserializes as Some(0), absence as None.
        let config =
            SocketConfig::parse("sockets:\n  - name: odd\n    host: '*'\n    port: 0\n").unwrap();
        assert_eq!(config.sockets[0].port, Some(0));
        assert_eq!(config.sockets[0].src_port, None);
    }
}
