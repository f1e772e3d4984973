//! Derived, ephemeral reports. Rendering them (display surface, log, file)
//! is the caller's responsibility.

use crate::metric::MetricValue;
use crate::snapshot::{CounterName, MetricName, SeriesId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything derived from one accepted snapshot: per-counter interval
/// deltas plus every registered metric's value for the interval.
///
/// Recomputed on each ingest; holds no references into engine state. Keys are
/// ordered so serialized output is stable.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaReport {
    pub series_id: SeriesId,
    /// Timestamp of the snapshot this report was derived from.
    pub timestamp_ms: f64,
    /// Time since the previous accepted snapshot; `None` on the bootstrap
    /// sample.
    pub interval_ms: Option<f64>,
    /// Interval delta per counter. `Reset` marks a regressed counter,
    /// `Undefined` a counter with no baseline.
    pub counters: BTreeMap<CounterName, MetricValue>,
    /// Derived metric values for the interval.
    pub metrics: BTreeMap<MetricName, MetricValue>,
}

impl DeltaReport {
    /// Convenience accessor for one derived metric.
    pub fn metric(&self, name: &str) -> Option<MetricValue> {
        self.metrics.get(name).copied()
    }

    /// Convenience accessor for one counter delta.
    pub fn counter_delta(&self, name: &str) -> Option<MetricValue> {
        self.counters.get(name).copied()
    }

    /// Whether this is the bootstrap report of a fresh series.
    pub fn is_bootstrap(&self) -> bool {
        self.interval_ms.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let report = DeltaReport {
            series_id: "video-send-0".to_string(),
            timestamp_ms: 2000.0,
            interval_ms: Some(1000.0),
            counters: BTreeMap::from([
                ("framesEncoded".to_string(), MetricValue::Defined(30.0)),
                ("qpSum".to_string(), MetricValue::Reset),
            ]),
            metrics: BTreeMap::from([(
                "framesEncodedPerSecond".to_string(),
                MetricValue::Undefined,
            )]),
        };

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["seriesId"], "video-send-0");
        assert_eq!(json["intervalMs"], 1000.0);
        assert_eq!(json["counters"]["framesEncoded"], 30.0);
        assert_eq!(json["counters"]["qpSum"], "reset");
        assert!(json["metrics"]["framesEncodedPerSecond"].is_null());
    }
}
