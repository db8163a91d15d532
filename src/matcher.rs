//! Per-scrape matching of live connection entries against a rule.
//!
//! All predicates are independent conjuncts; they are applied in a fixed
//! order (state, source address, destination address, source port,
//! destination port, process name) and short-circuit on the first failure.
//! The order only affects which mismatch gets traced, never the outcome.

use std::net::IpAddr;

use regex::Regex;
use tracing::debug;

use crate::compile::RuleSpec;
use crate::types::SockEntry;

/// Constraint on one side (local or remote) of a connection entry.
///
/// `None` fields are unconstrained. A `Some` address matches by plain
/// equality; the unspecified address of a family is an ordinary value
/// here, which is how a wildcard rule matches listeners bound to all
/// interfaces.
#[derive(Debug, Clone, Default)]
pub struct EndpointMatcher {
    pub addr: Option<IpAddr>,
    pub port: Option<u16>,
}

impl EndpointMatcher {
    /// A matcher that accepts any endpoint.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn addr_matches(&self, addr: IpAddr) -> bool {
        self.addr.map_or(true, |want| want == addr)
    }

    pub fn port_matches(&self, port: u16) -> bool {
        self.port.map_or(true, |want| want == port)
    }
}

/// Anchored full-string matcher for the owning process name.
#[derive(Debug, Clone)]
pub struct ProcessMatcher {
    pattern: String,
    regex: Regex,
}

impl ProcessMatcher {
    /// Compile a pattern into a full-match form. The non-capturing group
    /// keeps alternations anchored (`a|b` means `^(?:a|b)$`, not `^a|b$`).
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as the operator wrote it, for labels.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// First predicate an entry failed, for match tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    State,
    SrcAddr,
    DstAddr,
    SrcPort,
    DstPort,
    Process,
}

/// Result of matching one rule against one family's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSummary {
    pub count: u64,
    pub up: bool,
}

/// Apply the rule's predicates to a single entry, returning the first
/// failing predicate, or `None` on a full match.
pub fn check(rule: &RuleSpec, entry: &SockEntry) -> Option<Mismatch> {
    if entry.state != rule.state {
        return Some(Mismatch::State);
    }
    if !rule.src.addr_matches(entry.local_addr) {
        return Some(Mismatch::SrcAddr);
    }
    if !rule.dst.addr_matches(entry.remote_addr) {
        return Some(Mismatch::DstAddr);
    }
    if !rule.src.port_matches(entry.local_port) {
        return Some(Mismatch::SrcPort);
    }
    if !rule.dst.port_matches(entry.remote_port) {
        return Some(Mismatch::DstPort);
    }
    if let Some(ref process) = rule.process {
        // An entry with no resolvable owner can never satisfy a process
        // constraint.
        match entry.process.as_deref() {
            Some(name) if process.matches(name) => {}
            _ => return Some(Mismatch::Process),
        }
    }
    None
}

/// Match every entry of the rule's protocol family against the rule.
///
/// Matching is independent per rule: an entry counted here may equally be
/// counted by any other rule it satisfies.
pub fn summarize(rule: &RuleSpec, entries: &[SockEntry]) -> MatchSummary {
    let mut count = 0u64;
    for entry in entries {
        match check(rule, entry) {
            None => {
                count += 1;
                debug!(
                    rule = %rule.name,
                    local = %entry.local_addr,
                    local_port = entry.local_port,
                    remote = %entry.remote_addr,
                    remote_port = entry.remote_port,
                    "entry matched"
                );
            }
            Some(mismatch) => {
                debug!(
                    rule = %rule.name,
                    local = %entry.local_addr,
                    local_port = entry.local_port,
                    failed = ?mismatch,
                    "entry rejected"
                );
            }
        }
    }
    MatchSummary {
        count,
        up: count > 0,
    }
}
