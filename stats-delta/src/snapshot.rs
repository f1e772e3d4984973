//! Counter snapshots: one timestamped capture of cumulative counters.

use serde::Serialize;
use std::collections::HashMap;

/// Opaque identity of one logical stream (e.g. one RTP sender, one RTP
/// receiver, one local capture track). Must persist across polls of the same
/// stream and change when the stream is torn down and recreated.
pub type SeriesId = String;

/// Name of a cumulative counter inside a snapshot, e.g. `framesEncoded`,
/// `totalEncodeTime`, `qualityLimitationDurations.cpu`.
pub type CounterName = String;

/// Name of a derived metric, e.g. `encodeTimePerFrameMs`.
pub type MetricName = String;

/// An immutable record of cumulative counters captured at one sampling
/// instant.
///
/// Counters are monotonically non-decreasing for the lifetime of a stream; a
/// decrease is interpreted by the engine as a counter-reset signal (stream
/// restart).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    /// Monotonic clock reading at capture time, in milliseconds.
    pub timestamp_ms: f64,
    /// Cumulative counter values keyed by counter name.
    pub counters: HashMap<CounterName, f64>,
}

impl CounterSnapshot {
    pub fn new(timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms,
            counters: HashMap::new(),
        }
    }

    /// Builder-style counter insertion.
    pub fn with_counter(mut self, name: impl Into<CounterName>, value: f64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }

    pub fn set_counter(&mut self, name: impl Into<CounterName>, value: f64) {
        self.counters.insert(name.into(), value);
    }

    pub fn counter(&self, name: &str) -> Option<f64> {
        self.counters.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let snap = CounterSnapshot::new(1000.0)
            .with_counter("framesEncoded", 30.0)
            .with_counter("packetsSent", 120.0);

        assert_eq!(snap.timestamp_ms, 1000.0);
        assert_eq!(snap.counter("framesEncoded"), Some(30.0));
        assert_eq!(snap.counter("packetsSent"), Some(120.0));
        assert_eq!(snap.counter("framesDecoded"), None);
    }
}
