//! Correlation IDs for turns.
//!
//! Each turn gets a `trace_id`; each model round within it a `span_id`.
//! Both are attached to log lines so one turn's output can be grepped out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique trace ID for a turn.
pub fn generate_trace_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter disambiguates calls within the same clock tick.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("tr-{ts:x}-{count:04x}")
}

/// Generate a span ID for a round within a turn.
pub fn generate_span_id(trace_id: &str, round: u32) -> String {
    format!("{trace_id}:r{round}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_unique() {
        let a = generate_trace_id();
        let b = generate_trace_id();
        assert!(a.starts_with("tr-"));
        assert_ne!(a, b);
    }

    #[test]
    fn span_id_embeds_round() {
        assert_eq!(generate_span_id("tr-1", 3), "tr-1:r3");
    }
}
