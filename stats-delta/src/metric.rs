//! Metric declarations and the marker value type.
//!
//! Every derived metric a series reports is declared up front in a
//! [`MetricSet`], either hand-built or taken from a [`StreamKind`] preset.
//! Free-form accumulation objects are deliberately not supported: the set of
//! metric names is fixed and validated at registration time.

use crate::error::{Error, Result};
use crate::snapshot::{CounterName, CounterSnapshot, MetricName};
use serde::{Serialize, Serializer};

/// A single derived metric value for one sampling interval.
///
/// This is a data-level marker, not an error: a division by zero or a counter
/// regression marks the one affected metric while the rest of the report
/// stays valid. `Undefined` and `Reset` never surface as `NaN` or infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// A finite, computed value.
    Defined(f64),
    /// Not computable this interval (no baseline yet, zero denominator, or
    /// non-finite input).
    Undefined,
    /// A counter regression was detected this interval and the series was
    /// rebaselined.
    Reset,
}

impl MetricValue {
    pub fn is_defined(&self) -> bool {
        matches!(self, MetricValue::Defined(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Defined(v) => Some(*v),
            _ => None,
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            MetricValue::Defined(v) => serializer.serialize_f64(*v),
            MetricValue::Undefined => serializer.serialize_unit(),
            MetricValue::Reset => serializer.serialize_str("reset"),
        }
    }
}

/// Declaration of one derived metric over a series' counters.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSpec {
    /// Per-second rate: `delta(counter) / delta(time_seconds)`.
    Rate {
        name: MetricName,
        counter: CounterName,
    },
    /// Ratio of two counter deltas, times a unit scale. A scale of 1000.0
    /// turns a seconds-sum divided by an item count into milliseconds per
    /// item, e.g. `totalEncodeTime / framesEncoded`.
    Ratio {
        name: MetricName,
        numerator: CounterName,
        denominator: CounterName,
        scale: f64,
    },
    /// Exponentially smoothed per-second rate, for stable display under
    /// irregular sampling intervals.
    SmoothedRate {
        name: MetricName,
        counter: CounterName,
    },
    /// Share of wall time a cumulative-duration counter (in seconds) advanced
    /// during the interval, as a percentage capped at 100.
    Share {
        name: MetricName,
        counter: CounterName,
    },
}

impl MetricSpec {
    pub fn name(&self) -> &str {
        match self {
            MetricSpec::Rate { name, .. }
            | MetricSpec::Ratio { name, .. }
            | MetricSpec::SmoothedRate { name, .. }
            | MetricSpec::Share { name, .. } => name,
        }
    }

    /// The counters this metric reads, for reset-marker attribution.
    pub(crate) fn counters(&self) -> Vec<&CounterName> {
        match self {
            MetricSpec::Rate { counter, .. }
            | MetricSpec::SmoothedRate { counter, .. }
            | MetricSpec::Share { counter, .. } => vec![counter],
            MetricSpec::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator, denominator],
        }
    }
}

/// The kind of logical stream a series tracks, selecting a preset metric
/// catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// An outgoing RTP media sender (encoder side).
    OutboundRtp,
    /// An incoming RTP media receiver (decoder side).
    InboundRtp,
    /// A local capture track (pre-encode frame delivery).
    LocalCapture,
}

impl StreamKind {
    /// Synthesizes counters the platform does not report directly. For local
    /// capture tracks, dropped frames are whatever was neither delivered nor
    /// discarded.
    pub(crate) fn synthesize_counters(&self, snapshot: &mut CounterSnapshot) {
        if let StreamKind::LocalCapture = self {
            if let (Some(total), Some(delivered), Some(discarded)) = (
                snapshot.counter("totalFrames"),
                snapshot.counter("deliveredFrames"),
                snapshot.counter("discardedFrames"),
            ) {
                snapshot.set_counter("droppedFrames", total - delivered - discarded);
            }
        }
    }
}

/// A validated, fixed set of metric declarations for one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    specs: Vec<MetricSpec>,
    kind: Option<StreamKind>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style metric addition.
    pub fn with_metric(mut self, spec: MetricSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn specs(&self) -> &[MetricSpec] {
        &self.specs
    }

    pub fn kind(&self) -> Option<StreamKind> {
        self.kind
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.iter().any(|s| s.name() == name)
    }

    /// Rejects duplicate metric names. Called by the engine at registration.
    pub fn validate(&self) -> Result<()> {
        for (i, spec) in self.specs.iter().enumerate() {
            if self.specs[..i].iter().any(|s| s.name() == spec.name()) {
                return Err(Error::DuplicateMetric(spec.name().to_string()));
            }
        }
        Ok(())
    }

    /// The metric catalogue a peer-connection stats page typically tracks
    /// for a stream of the given kind.
    pub fn for_kind(kind: StreamKind) -> Self {
        let set = match kind {
            StreamKind::OutboundRtp => Self::new()
                .with_metric(MetricSpec::Ratio {
                    name: "qpSumPerFrame".to_string(),
                    numerator: "qpSum".to_string(),
                    denominator: "framesEncoded".to_string(),
                    scale: 1.0,
                })
                .with_metric(MetricSpec::Ratio {
                    name: "encodeTimePerFrameMs".to_string(),
                    numerator: "totalEncodeTime".to_string(),
                    denominator: "framesEncoded".to_string(),
                    scale: 1000.0,
                })
                .with_metric(MetricSpec::Ratio {
                    name: "packetSendDelayMs".to_string(),
                    numerator: "totalPacketSendDelay".to_string(),
                    denominator: "packetsSent".to_string(),
                    scale: 1000.0,
                })
                .with_metric(MetricSpec::Rate {
                    name: "framesEncodedPerSecond".to_string(),
                    counter: "framesEncoded".to_string(),
                })
                .with_metric(MetricSpec::Rate {
                    name: "framesSentPerSecond".to_string(),
                    counter: "framesSent".to_string(),
                })
                .with_metric(MetricSpec::Share {
                    name: "qualityLimitationCpuPct".to_string(),
                    counter: "qualityLimitationDurations.cpu".to_string(),
                }),
            StreamKind::InboundRtp => Self::new()
                .with_metric(MetricSpec::Ratio {
                    name: "qpSumPerFrame".to_string(),
                    numerator: "qpSum".to_string(),
                    denominator: "framesDecoded".to_string(),
                    scale: 1.0,
                })
                .with_metric(MetricSpec::Ratio {
                    name: "processingDelayMs".to_string(),
                    numerator: "totalProcessingDelay".to_string(),
                    denominator: "framesDecoded".to_string(),
                    scale: 1000.0,
                })
                .with_metric(MetricSpec::Ratio {
                    // Distinct from the reserved frame-timing stage name
                    // jitterBufferDelayMs.
                    name: "jitterBufferDelayPerEmittedFrameMs".to_string(),
                    numerator: "jitterBufferDelay".to_string(),
                    denominator: "jitterBufferEmittedCount".to_string(),
                    scale: 1000.0,
                })
                .with_metric(MetricSpec::Ratio {
                    name: "decodeTimePerFrameMs".to_string(),
                    numerator: "totalDecodeTime".to_string(),
                    denominator: "framesDecoded".to_string(),
                    scale: 1000.0,
                })
                .with_metric(MetricSpec::Ratio {
                    name: "assemblyTimeMs".to_string(),
                    numerator: "totalAssemblyTime".to_string(),
                    denominator: "framesAssembledFromMultiplePackets".to_string(),
                    scale: 1000.0,
                })
                .with_metric(MetricSpec::Rate {
                    name: "framesDecodedPerSecond".to_string(),
                    counter: "framesDecoded".to_string(),
                })
                .with_metric(MetricSpec::Rate {
                    name: "framesReceivedPerSecond".to_string(),
                    counter: "framesReceived".to_string(),
                }),
            StreamKind::LocalCapture => Self::new()
                .with_metric(MetricSpec::Rate {
                    name: "deliveredFramesPerSecond".to_string(),
                    counter: "deliveredFrames".to_string(),
                })
                .with_metric(MetricSpec::Rate {
                    name: "discardedFramesPerSecond".to_string(),
                    counter: "discardedFrames".to_string(),
                })
                .with_metric(MetricSpec::Rate {
                    name: "droppedFramesPerSecond".to_string(),
                    counter: "droppedFrames".to_string(),
                })
                .with_metric(MetricSpec::Rate {
                    name: "totalFramesPerSecond".to_string(),
                    counter: "totalFrames".to_string(),
                })
                .with_metric(MetricSpec::SmoothedRate {
                    name: "smoothedFps".to_string(),
                    counter: "totalFrames".to_string(),
                }),
        };
        Self {
            kind: Some(kind),
            ..set
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_value_serialization() {
        let json = serde_json::to_string(&MetricValue::Defined(30.5)).unwrap();
        assert_eq!(json, "30.5");
        let json = serde_json::to_string(&MetricValue::Undefined).unwrap();
        assert_eq!(json, "null");
        let json = serde_json::to_string(&MetricValue::Reset).unwrap();
        assert_eq!(json, "\"reset\"");
    }

    #[test]
    fn test_duplicate_metric_rejected() {
        let set = MetricSet::new()
            .with_metric(MetricSpec::Rate {
                name: "fps".to_string(),
                counter: "framesEncoded".to_string(),
            })
            .with_metric(MetricSpec::Rate {
                name: "fps".to_string(),
                counter: "framesSent".to_string(),
            });
        assert_eq!(
            set.validate(),
            Err(Error::DuplicateMetric("fps".to_string()))
        );
    }

    #[test]
    fn test_preset_catalogues_validate() {
        for kind in [
            StreamKind::OutboundRtp,
            StreamKind::InboundRtp,
            StreamKind::LocalCapture,
        ] {
            let set = MetricSet::for_kind(kind);
            assert!(set.validate().is_ok());
            assert_eq!(set.kind(), Some(kind));
        }
    }

    #[test]
    fn test_local_capture_synthesizes_dropped_frames() {
        let mut snap = CounterSnapshot::new(0.0)
            .with_counter("totalFrames", 100.0)
            .with_counter("deliveredFrames", 90.0)
            .with_counter("discardedFrames", 4.0);
        StreamKind::LocalCapture.synthesize_counters(&mut snap);
        assert_eq!(snap.counter("droppedFrames"), Some(6.0));
    }
}
