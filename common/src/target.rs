//! Target descriptors. Health, latency and DNS probes address a target by a
//! plain string (URL or hostname); traceroute addresses a target by an
//! `{address, port}` pair since it needs somewhere to dial for the TCP
//! variant and something to resolve for the ICMP variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A traceroute target: a host (name or literal address) plus the port used
/// by the TCP probe variant. ICMP traceroute ignores `port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TracerouteTarget {
    pub addr: String,
    pub port: u16,
}

impl fmt::Display for TracerouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Deduplicates a target list while preserving first-seen order. Used by
/// every probe kind: "duplicates allowed but treated as one logical target".
pub fn dedupe_preserving_order<T: Eq + std::hash::Hash + Clone>(items: &[T]) -> Vec<T> {
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        let targets = vec!["a".to_string(), "b".to_string(), "a".to_string(), "c".to_string()];
        assert_eq!(dedupe_preserving_order(&targets), vec!["a", "b", "c"]);
    }

    #[test]
    fn traceroute_target_displays_as_host_colon_port() {
        let t = TracerouteTarget { addr: "10.0.0.1".into(), port: 80 };
        assert_eq!(t.to_string(), "10.0.0.1:80");
    }
}
