//! Request counters
//!
//! Six monotonic process-lifetime counters, incremented from concurrent
//! handlers with relaxed atomics and snapshotted by `GET /_metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

pub static HITS: AtomicU64 = AtomicU64::new(0);
pub static MISSES: AtomicU64 = AtomicU64::new(0);
pub static ERRORS: AtomicU64 = AtomicU64::new(0);
pub static REDIRECTS: AtomicU64 = AtomicU64::new(0);
pub static DOCS: AtomicU64 = AtomicU64::new(0);
pub static GOGET: AtomicU64 = AtomicU64::new(0);

pub fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of the counters. Field order is the wire order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Snapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub redirects: u64,
    pub docs: u64,
    pub goget: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        hits: HITS.load(Ordering::Relaxed),
        misses: MISSES.load(Ordering::Relaxed),
        errors: ERRORS.load(Ordering::Relaxed),
        redirects: REDIRECTS.load(Ordering::Relaxed),
        docs: DOCS.load(Ordering::Relaxed),
        goget: GOGET.load(Ordering::Relaxed),
    }
}

/// Two-space indented JSON body with a trailing newline
pub fn render_json() -> String {
    let mut body = serde_json::to_string_pretty(&snapshot()).unwrap_or_else(|_| "{}".to_string());
    body.push('\n');
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_monotonic() {
        let before = snapshot();

        incr(&HITS);
        incr(&HITS);
        incr(&GOGET);

        let after = snapshot();

        assert!(after.hits >= before.hits + 2);
        assert!(after.goget >= before.goget + 1);
        assert!(after.misses >= before.misses);
    }

    #[test]
    fn test_json_shape() {
        let body = render_json();

        assert!(body.starts_with("{\n  \"hits\": "));
        assert!(body.ends_with("}\n"));

        let keys: Vec<&str> = body
            .lines()
            .filter_map(|line| line.trim().strip_prefix('"'))
            .filter_map(|line| line.split('"').next())
            .collect();

        assert_eq!(
            keys,
            vec!["hits", "misses", "errors", "redirects", "docs", "goget"]
        );
    }
}
