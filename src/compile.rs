//! Load-time compilation of raw rule records into the matchable form.
//!
//! `compile` is a pure construction step: it validates every invariant,
//! resolves host patterns through the [`Resolver`] exactly once, compiles
//! process patterns, and buckets the result by protocol family. Raw
//! records are never mutated, and nothing here is re-checked per scrape.
//!
//! Load has two terminal outcomes only: a [`RuleSet`] or the first
//! [`WatchError`] naming the violated rule. There is no partial validity.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::config::{RawSocketRule, SocketConfig};
use crate::error::{Result, WatchError};
use crate::matcher::{EndpointMatcher, ProcessMatcher};
use crate::resolver::Resolver;
use crate::types::{Protocol, SockState};

/// One compiled socket rule, immutable after construction.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    /// Rule identifier, used verbatim as the `name` label.
    pub name: String,
    /// Family whose connection table this rule is matched against.
    pub protocol: Protocol,
    /// Desired connection state.
    pub state: SockState,
    /// Constraint on the local side of candidate entries.
    pub src: EndpointMatcher,
    /// Constraint on the remote side of candidate entries.
    pub dst: EndpointMatcher,
    /// Owning-process constraint, if declared.
    pub process: Option<ProcessMatcher>,
    /// Source host pattern as the operator wrote it (post `host` aliasing).
    pub src_host_text: Option<String>,
    /// Destination host pattern as the operator wrote it.
    pub dst_host_text: Option<String>,
}

impl RuleSpec {
    /// A rule with no endpoint or process constraints, matching any entry
    /// of the given family in the given state.
    pub fn new(name: impl Into<String>, protocol: Protocol, state: SockState) -> Self {
        Self {
            name: name.into(),
            protocol,
            state,
            src: EndpointMatcher::any(),
            dst: EndpointMatcher::any(),
            process: None,
            src_host_text: None,
            dst_host_text: None,
        }
    }

    /// Label values in the fixed exporter schema order:
    /// `{name, srchost, srcport, dsthost, dstport, protocol, status,
    /// process}`. Unconstrained host/port fields render as `*`, an absent
    /// process pattern as the empty string; the substitution is purely
    /// presentational and never fed back into matching.
    pub fn label_values(&self) -> [String; 8] {
        [
            self.name.clone(),
            self.src_host_text.clone().unwrap_or_else(|| "*".into()),
            self.src
                .port
                .map_or_else(|| "*".into(), |p| p.to_string()),
            self.dst_host_text.clone().unwrap_or_else(|| "*".into()),
            self.dst
                .port
                .map_or_else(|| "*".into(), |p| p.to_string()),
            self.protocol.to_string(),
            self.state.to_string(),
            self.process
                .as_ref()
                .map_or_else(String::new, |p| p.pattern().to_string()),
        ]
    }
}

/// The compiled rule collection, bucketed by protocol family.
///
/// Built once per configuration load, never mutated afterward. Buckets
/// follow the fixed [`Protocol::ALL`] order and only contain families with
/// at least one rule, so an unused family is never queried.
#[derive(Debug, Default)]
pub struct RuleSet {
    buckets: Vec<(Protocol, Vec<RuleSpec>)>,
}

impl RuleSet {
    /// Bucket compiled rules by family, preserving declaration order
    /// within each bucket.
    pub fn from_rules(rules: Vec<RuleSpec>) -> Self {
        let mut groups: Vec<Vec<RuleSpec>> = vec![Vec::new(); Protocol::ALL.len()];
        for rule in rules {
            let slot = Protocol::ALL
                .iter()
                .position(|f| *f == rule.protocol)
                .expect("Protocol::ALL covers every family");
            groups[slot].push(rule);
        }
        let buckets = Protocol::ALL
            .into_iter()
            .zip(groups)
            .filter(|(_, group)| !group.is_empty())
            .collect();
        Self { buckets }
    }

    /// Non-empty families with their rules, in fixed order.
    pub fn buckets(&self) -> impl Iterator<Item = (Protocol, &[RuleSpec])> {
        self.buckets
            .iter()
            .map(|(family, rules)| (*family, rules.as_slice()))
    }

    /// Rules of one family; empty slice if the family has none.
    pub fn rules_for(&self, family: Protocol) -> &[RuleSpec] {
        self.buckets
            .iter()
            .find(|(f, _)| *f == family)
            .map_or(&[], |(_, rules)| rules.as_slice())
    }

    /// Total number of rules across all families.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|(_, rules)| rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Compile a parsed configuration into a `RuleSet`.
pub fn compile(config: &SocketConfig, resolver: &dyn Resolver) -> Result<RuleSet> {
    let mut rules = Vec::with_capacity(config.sockets.len());
    let mut seen_labels = HashSet::new();

    for (index, raw) in config.sockets.iter().enumerate() {
        let rule = compile_rule(raw, index + 1, resolver)?;
        // Identical label tuples would silently overwrite each other in
        // the registry, so they are rejected here instead.
        if !seen_labels.insert(rule.label_values()) {
            return Err(WatchError::DuplicateLabels { rule: rule.name });
        }
        rules.push(rule);
    }

    Ok(RuleSet::from_rules(rules))
}

/// Compile a single raw record. `position` is the 1-based index in the
/// document, used to identify rules whose name itself is missing.
fn compile_rule(
    raw: &RawSocketRule,
    position: usize,
    resolver: &dyn Resolver,
) -> Result<RuleSpec> {
    if raw.name.is_empty() {
        return Err(WatchError::MissingName { index: position });
    }
    let rule = raw.name.clone();

    let state = match non_empty(&raw.status) {
        None => SockState::Listen,
        Some(value) => {
            SockState::parse_desired(value).ok_or_else(|| WatchError::InvalidStatus {
                rule: rule.clone(),
                value: value.to_string(),
            })?
        }
    };

    let protocol = match non_empty(&raw.protocol) {
        None => Protocol::Tcp,
        Some(value) => Protocol::parse(value).ok_or_else(|| WatchError::InvalidProtocol {
            rule: rule.clone(),
            value: value.to_string(),
        })?,
    };

    // `srcHost`/`srcPort` inherit the generic aliases; the destination side
    // does not.
    let src_host_text = non_empty(&raw.src_host).or_else(|| non_empty(&raw.host));
    let dst_host_text = non_empty(&raw.dst_host);
    let src_port = raw.src_port.or(raw.port);
    let dst_port = raw.dst_port;

    if state == SockState::Listen {
        if src_host_text.is_none() {
            return Err(WatchError::MissingField {
                rule,
                field: "host or srcHost",
            });
        }
        if src_port.is_none() {
            return Err(WatchError::MissingField {
                rule,
                field: "port or srcPort",
            });
        }
    } else {
        if src_host_text.is_none() && dst_host_text.is_none() {
            return Err(WatchError::MissingField {
                rule,
                field: "host, srcHost or dstHost",
            });
        }
        if src_port.is_none() && dst_port.is_none() {
            return Err(WatchError::MissingField {
                rule,
                field: "port, srcPort or dstPort",
            });
        }
    }

    let src_addr = resolve_pattern(src_host_text, protocol, resolver, &rule)?;
    let dst_addr = resolve_pattern(dst_host_text, protocol, resolver, &rule)?;

    let process = match non_empty(&raw.process) {
        Some(pattern) => Some(ProcessMatcher::new(pattern).map_err(|source| {
            WatchError::ProcessPattern {
                rule: rule.clone(),
                source,
            }
        })?),
        None => None,
    };

    Ok(RuleSpec {
        src: EndpointMatcher {
            addr: src_addr,
            port: src_port,
        },
        dst: EndpointMatcher {
            addr: dst_addr,
            port: dst_port,
        },
        process,
        src_host_text: src_host_text.map(str::to_string),
        dst_host_text: dst_host_text.map(str::to_string),
        name: rule,
        protocol,
        state,
    })
}

/// Resolve one host pattern. Absent patterns compile to no constraint;
/// wildcards to the family's unspecified address; anything else goes
/// through the resolver, first family-appropriate result kept.
fn resolve_pattern(
    text: Option<&str>,
    family: Protocol,
    resolver: &dyn Resolver,
    rule: &str,
) -> Result<Option<IpAddr>> {
    let Some(text) = text else {
        return Ok(None);
    };
    if is_wildcard(text) {
        return Ok(Some(family.unspecified_addr()));
    }
    resolver
        .resolve(text, family)
        .map(Some)
        .map_err(|err| WatchError::Resolve {
            rule: rule.to_string(),
            host: text.to_string(),
            message: err.to_string(),
        })
}

fn is_wildcard(text: &str) -> bool {
    text == "*" || text.eq_ignore_ascii_case("any")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticResolver;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn parse(text: &str) -> SocketConfig {
        SocketConfig::parse(text).unwrap()
    }

    fn resolver() -> StaticResolver {
        StaticResolver::new()
            .with_mapping("localhost", Some(Ipv4Addr::LOCALHOST), Some(Ipv6Addr::LOCALHOST))
            .with_mapping("db.internal", Some(Ipv4Addr::new(10, 0, 0, 5)), None)
    }

    #[test]
    fn defaults_are_tcp_listen() {
        let config = parse("sockets:\n  - name: ssh\n    host: '*'\n    port: 22\n");
        let rules = compile(&config, &resolver()).unwrap();
        let rule = &rules.rules_for(Protocol::Tcp)[0];
        assert_eq!(rule.protocol, Protocol::Tcp);
        assert_eq!(rule.state, SockState::Listen);
        assert_eq!(rule.src.port, Some(22));
        assert_eq!(rule.dst.port, None);
    }

    #[test]
    fn wildcard_resolves_to_family_unspecified() {
        let config = parse(
            "sockets:\n  - name: v4\n    host: any\n    port: 22\n  - name: v6\n    host: '*'\n    port: 22\n    protocol: tcp6\n",
        );
        let rules = compile(&config, &resolver()).unwrap();
        assert_eq!(
            rules.rules_for(Protocol::Tcp)[0].src.addr,
            Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
        );
        assert_eq!(
            rules.rules_for(Protocol::Tcp6)[0].src.addr,
            Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED))
        );
    }

    #[test]
    fn src_host_inherits_generic_host_alias() {
        let config = parse("sockets:\n  - name: ssh\n    host: localhost\n    port: 22\n");
        let rules = compile(&config, &resolver()).unwrap();
        let rule = &rules.rules_for(Protocol::Tcp)[0];
        assert_eq!(rule.src.addr, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert_eq!(rule.src_host_text.as_deref(), Some("localhost"));
    }

    #[test]
    fn dst_host_does_not_inherit_generic_host() {
        let config = parse(
            "sockets:\n  - name: out\n    host: localhost\n    dstPort: 443\n    status: established\n",
        );
        let rules = compile(&config, &resolver()).unwrap();
        let rule = &rules.rules_for(Protocol::Tcp)[0];
        assert_eq!(rule.dst.addr, None);
        assert!(rule.dst_host_text.is_none());
    }

    #[test]
    fn missing_name_is_fatal_and_positional() {
        let config = parse("sockets:\n  - name: ok\n    host: '*'\n    port: 1\n  - host: '*'\n    port: 2\n");
        match compile(&config, &resolver()) {
            Err(WatchError::MissingName { index }) => assert_eq!(index, 2),
            other => panic!("expected MissingName, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn listen_requires_source_host_and_port() {
        let config = parse("sockets:\n  - name: nohost\n    port: 22\n");
        assert!(matches!(
            compile(&config, &resolver()),
            Err(WatchError::MissingField {
                field: "host or srcHost",
                ..
            })
        ));

        let config = parse("sockets:\n  - name: noport\n    host: '*'\n");
        assert!(matches!(
            compile(&config, &resolver()),
            Err(WatchError::MissingField {
                field: "port or srcPort",
                ..
            })
        ));
    }

    #[test]
    fn established_accepts_dest_only_constraints() {
        let config = parse(
            "sockets:\n  - name: web\n    dstHost: 10.0.0.5\n    dstPort: 443\n    status: established\n",
        );
        let rules = compile(&config, &resolver()).unwrap();
        let rule = &rules.rules_for(Protocol::Tcp)[0];
        assert_eq!(rule.dst.addr, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))));
        assert_eq!(rule.dst.port, Some(443));
        assert_eq!(rule.src.addr, None);
        assert_eq!(rule.src.port, None);
    }

    #[test]
    fn established_requires_some_host_and_some_port() {
        let config = parse("sockets:\n  - name: bare\n    status: established\n    port: 9\n");
        assert!(matches!(
            compile(&config, &resolver()),
            Err(WatchError::MissingField {
                field: "host, srcHost or dstHost",
                ..
            })
        ));

        let config = parse("sockets:\n  - name: bare\n    status: established\n    dstHost: 10.0.0.5\n");
        assert!(matches!(
            compile(&config, &resolver()),
            Err(WatchError::MissingField {
                field: "port, srcPort or dstPort",
                ..
            })
        ));
    }

    #[test]
    fn invalid_enums_are_fatal() {
        let config = parse("sockets:\n  - name: r\n    host: '*'\n    port: 1\n    protocol: unix\n");
        assert!(matches!(
            compile(&config, &resolver()),
            Err(WatchError::InvalidProtocol { .. })
        ));

        let config = parse("sockets:\n  - name: r\n    host: '*'\n    port: 1\n    status: closed\n");
        assert!(matches!(
            compile(&config, &resolver()),
            Err(WatchError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn tcp4_and_udp4_normalize() {
        let config = parse(
            "sockets:\n  - name: a\n    host: '*'\n    port: 1\n    protocol: tcp4\n  - name: b\n    host: '*'\n    port: 2\n    protocol: udp4\n",
        );
        let rules = compile(&config, &resolver()).unwrap();
        assert_eq!(rules.rules_for(Protocol::Tcp).len(), 1);
        assert_eq!(rules.rules_for(Protocol::Udp).len(), 1);
        assert!(rules.rules_for(Protocol::Tcp6).is_empty());
    }

    #[test]
    fn unresolvable_host_is_fatal() {
        let config = parse("sockets:\n  - name: r\n    host: nowhere.invalid\n    port: 1\n");
        match compile(&config, &resolver()) {
            Err(WatchError::Resolve { rule, host, .. }) => {
                assert_eq!(rule, "r");
                assert_eq!(host, "nowhere.invalid");
            }
            other => panic!("expected Resolve error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn invalid_process_pattern_is_fatal() {
        let config = parse("sockets:\n  - name: r\n    host: '*'\n    port: 1\n    process: '(bad'\n");
        assert!(matches!(
            compile(&config, &resolver()),
            Err(WatchError::ProcessPattern { .. })
        ));
    }

    #[test]
    fn one_bad_rule_aborts_the_whole_load() {
        // Load failure determinism: validity of the first rule does not
        // rescue a document whose second rule is broken.
        let config = parse(
            "sockets:\n  - name: good\n    host: '*'\n    port: 22\n  - name: ''\n    host: '*'\n    port: 23\n",
        );
        assert!(compile(&config, &resolver()).is_err());
    }

    #[test]
    fn duplicate_label_tuples_are_rejected() {
        let config = parse(
            "sockets:\n  - name: ssh\n    host: '*'\n    port: 22\n  - name: ssh\n    host: '*'\n    port: 22\n",
        );
        assert!(matches!(
            compile(&config, &resolver()),
            Err(WatchError::DuplicateLabels { .. })
        ));

        // Same name with a differing port stays legal.
        let config = parse(
            "sockets:\n  - name: ssh\n    host: '*'\n    port: 22\n  - name: ssh\n    host: '*'\n    port: 2222\n",
        );
        assert_eq!(compile(&config, &resolver()).unwrap().len(), 2);
    }

    #[test]
    fn label_values_substitute_stars_for_unconstrained() {
        let config = parse(
            "sockets:\n  - name: web\n    dstHost: 10.0.0.5\n    dstPort: 443\n    status: established\n    process: nginx\n",
        );
        let rules = compile(&config, &resolver()).unwrap();
        let labels = rules.rules_for(Protocol::Tcp)[0].label_values();
        assert_eq!(
            labels,
            [
                "web".to_string(),
                "*".into(),
                "*".into(),
                "10.0.0.5".into(),
                "443".into(),
                "tcp".into(),
                "established".into(),
                "nginx".into(),
            ]
        );
    }

    #[test]
    fn buckets_follow_fixed_family_order() {
        let config = parse(
            "sockets:\n  - name: u6\n    host: '*'\n    port: 53\n    protocol: udp6\n  - name: t\n    host: '*'\n    port: 22\n",
        );
        let rules = compile(&config, &resolver()).unwrap();
        let families: Vec<Protocol> = rules.buckets().map(|(f, _)| f).collect();
        assert_eq!(families, vec![Protocol::Tcp, Protocol::Udp6]);
    }
}
