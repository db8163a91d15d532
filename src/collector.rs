//! Prometheus collector tying rule set and connection source together.

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use tracing::{debug, warn};

use crate::compile::RuleSet;
use crate::matcher;
use crate::source::ConnectionSource;

/// Label schema shared by both gauge families.
pub const LABEL_NAMES: [&str; 8] = [
    "name", "srchost", "srcport", "dsthost", "dstport", "protocol", "status", "process",
];

/// Collector producing a status and a count gauge per declared rule.
///
/// Every `collect` call performs one full scrape under a single lock: the
/// connection table is queried once per family present in the rule set,
/// every rule of that family is matched, and both gauges are updated
/// before the metric families are gathered. Concurrent scrape requests
/// therefore serialize and never interleave snapshots or partially
/// overwrite each other's values.
pub struct SocketSetCollector {
    status: GaugeVec,
    count: GaugeVec,
    rules: RuleSet,
    source: Box<dyn ConnectionSource>,
    scrape_lock: Mutex<()>,
}

impl SocketSetCollector {
    pub fn new(rules: RuleSet, source: Box<dyn ConnectionSource>) -> Self {
        let status = GaugeVec::new(
            Opts::new(
                "connection_status_up",
                "Connection status of the socket (0 down - 1 up).",
            ),
            &LABEL_NAMES,
        )
        .expect("connection_status_up: hardcoded gauge definition is invalid");
        let count = GaugeVec::new(
            Opts::new(
                "connection_status_count",
                "Number of live connections matching the socket rule.",
            ),
            &LABEL_NAMES,
        )
        .expect("connection_status_count: hardcoded gauge definition is invalid");

        Self {
            status,
            count,
            rules,
            source,
            scrape_lock: Mutex::new(()),
        }
    }

    /// Run one scrape cycle: query each family once, match every rule,
    /// update both gauges. Callers must hold `scrape_lock`.
    fn scrape(&self) {
        for (family, rules) in self.rules.buckets() {
            let entries = match self.source.entries(family) {
                Ok(entries) => entries,
                Err(err) => {
                    // Recoverable: this family reports down/zero for this
                    // cycle only; the next scrape queries it afresh.
                    warn!(family = %family, error = %err, "connection table query failed");
                    Vec::new()
                }
            };
            debug!(family = %family, entries = entries.len(), "connection table fetched");

            for rule in rules {
                let summary = matcher::summarize(rule, &entries);
                let labels = rule.label_values();
                let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
                self.status
                    .with_label_values(&labels)
                    .set(if summary.up { 1.0 } else { 0.0 });
                self.count.with_label_values(&labels).set(summary.count as f64);
                debug!(
                    rule = %rule.name,
                    family = %family,
                    up = summary.up,
                    count = summary.count,
                    "rule scraped"
                );
            }
        }
    }
}

impl Collector for SocketSetCollector {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = self.status.desc();
        descs.extend(self.count.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _scrape = self.scrape_lock.lock();
        self.scrape();
        let mut families = self.status.collect();
        families.extend(self.count.collect());
        families
    }
}
