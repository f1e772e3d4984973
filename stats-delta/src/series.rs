//! Per-series retained state and the interval delta math.
//!
//! A series keeps only the previous snapshot plus the lifetime sums needed
//! for running means, so retained memory is O(1) no matter how long the
//! stream lives.

use crate::frame_timing::TimingAccumulator;
use crate::metric::{MetricSet, MetricSpec, MetricValue};
use crate::snapshot::{CounterName, CounterSnapshot, MetricName};
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Lifetime mean over the defined values of one metric. `Undefined` and
/// `Reset` intervals are excluded from both sum and count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct MeanAccumulator {
    sum: f64,
    count: u64,
}

impl MeanAccumulator {
    pub(crate) fn record(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub(crate) fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Exponentially smoothed per-second rate for one counter.
///
/// `s' = alpha * s + (1 - alpha) * inst`, seeded with the first instantaneous
/// rate. Only updated for positive time deltas and non-negative count deltas;
/// a counter regression restarts it from the instantaneous-from-zero rate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningRateEstimate {
    smoothed: Option<f64>,
}

impl RunningRateEstimate {
    pub fn value(&self) -> Option<f64> {
        self.smoothed
    }

    fn update(&mut self, instantaneous: f64, alpha: f64) -> f64 {
        let next = match self.smoothed {
            Some(s) => alpha * s + (1.0 - alpha) * instantaneous,
            None => instantaneous,
        };
        self.smoothed = Some(next);
        next
    }

    fn restart(&mut self, instantaneous: Option<f64>) {
        self.smoothed = instantaneous;
    }
}

/// Outcome of one ingest, before the engine attaches the series identity.
#[derive(Debug)]
pub(crate) struct IngestOutcome {
    pub(crate) timestamp_ms: f64,
    pub(crate) interval_ms: Option<f64>,
    pub(crate) counters: BTreeMap<CounterName, MetricValue>,
    pub(crate) metrics: BTreeMap<MetricName, MetricValue>,
}

#[derive(Debug, Default)]
pub(crate) struct Series {
    metric_set: MetricSet,
    previous: Option<CounterSnapshot>,
    means: HashMap<MetricName, MeanAccumulator>,
    estimates: HashMap<MetricName, RunningRateEstimate>,
    pub(crate) timing: TimingAccumulator,
}

impl Series {
    pub(crate) fn new(metric_set: MetricSet) -> Self {
        Self {
            metric_set,
            ..Default::default()
        }
    }

    pub(crate) fn last_timestamp_ms(&self) -> Option<f64> {
        self.previous.as_ref().map(|p| p.timestamp_ms)
    }

    pub(crate) fn has_samples(&self) -> bool {
        self.previous.is_some()
    }

    pub(crate) fn set_metric_set(&mut self, metric_set: MetricSet) {
        self.metric_set = metric_set;
    }

    pub(crate) fn mean(&self, metric: &str) -> Option<Option<f64>> {
        if self.metric_set.contains(metric) {
            return Some(self.means.get(metric).and_then(MeanAccumulator::mean));
        }
        // Frame-timing stage means live under reserved names.
        self.timing.mean(metric)
    }

    pub(crate) fn rate_estimate(&self, metric: &str) -> Option<&RunningRateEstimate> {
        self.estimates.get(metric)
    }

    /// Computes counter deltas and derived metrics against the previous
    /// snapshot, then adopts `snapshot` as the new baseline. The caller has
    /// already verified timestamp ordering.
    pub(crate) fn ingest(&mut self, mut snapshot: CounterSnapshot, alpha: f64) -> IngestOutcome {
        if let Some(kind) = self.metric_set.kind() {
            kind.synthesize_counters(&mut snapshot);
        }

        let Some(previous) = self.previous.take() else {
            // Bootstrap: nothing to delta against yet.
            let outcome = IngestOutcome {
                timestamp_ms: snapshot.timestamp_ms,
                interval_ms: None,
                counters: snapshot
                    .counters
                    .keys()
                    .map(|k| (k.clone(), MetricValue::Undefined))
                    .collect(),
                metrics: self
                    .metric_set
                    .specs()
                    .iter()
                    .map(|s| (s.name().to_string(), MetricValue::Undefined))
                    .collect(),
            };
            self.previous = Some(snapshot);
            return outcome;
        };

        let interval_ms = snapshot.timestamp_ms - previous.timestamp_ms;
        let dt_secs = interval_ms / 1000.0;

        let mut counters = BTreeMap::new();
        let mut regressed: HashSet<&CounterName> = HashSet::new();
        for (name, value) in &snapshot.counters {
            match previous.counter(name) {
                // NaN/infinite input marks this one counter, never a
                // Defined(non-finite). NaN would also slip past the
                // regression comparison below.
                Some(prev) if !value.is_finite() || !prev.is_finite() => {
                    counters.insert(name.clone(), MetricValue::Undefined);
                }
                Some(prev) if *value < prev => {
                    debug!("counter {name} regressed ({prev} -> {value}), rebaselining");
                    regressed.insert(name);
                    counters.insert(name.clone(), MetricValue::Reset);
                }
                Some(prev) => {
                    counters.insert(name.clone(), MetricValue::Defined(value - prev));
                }
                None => {
                    counters.insert(name.clone(), MetricValue::Undefined);
                }
            }
        }

        let mut metrics = BTreeMap::new();
        for spec in self.metric_set.specs() {
            let value = if spec.counters().iter().any(|c| regressed.contains(c)) {
                if let MetricSpec::SmoothedRate { name, counter } = spec {
                    // Counter restarted from zero; restart the estimate from
                    // the progress the fresh counter already shows.
                    let inst = snapshot
                        .counter(counter)
                        .filter(|_| dt_secs > 0.0)
                        .map(|v| v / dt_secs)
                        .filter(|v| v.is_finite());
                    self.estimates.entry(name.clone()).or_default().restart(inst);
                }
                MetricValue::Reset
            } else {
                Self::compute_metric(
                    spec,
                    &snapshot,
                    &previous,
                    dt_secs,
                    alpha,
                    &mut self.estimates,
                )
            };
            if let MetricValue::Defined(v) = value {
                self.means.entry(spec.name().to_string()).or_default().record(v);
            }
            metrics.insert(spec.name().to_string(), value);
        }

        let timestamp_ms = snapshot.timestamp_ms;
        self.previous = Some(snapshot);
        IngestOutcome {
            timestamp_ms,
            interval_ms: Some(interval_ms),
            counters,
            metrics,
        }
    }

    fn compute_metric(
        spec: &MetricSpec,
        current: &CounterSnapshot,
        previous: &CounterSnapshot,
        dt_secs: f64,
        alpha: f64,
        estimates: &mut HashMap<MetricName, RunningRateEstimate>,
    ) -> MetricValue {
        let delta = |counter: &str| -> Option<f64> {
            let d = current.counter(counter)? - previous.counter(counter)?;
            d.is_finite().then_some(d)
        };

        match spec {
            MetricSpec::Rate { counter, .. } => match delta(counter) {
                Some(d) if dt_secs > 0.0 && (d / dt_secs).is_finite() => {
                    MetricValue::Defined(d / dt_secs)
                }
                _ => MetricValue::Undefined,
            },
            MetricSpec::Ratio {
                numerator,
                denominator,
                scale,
                ..
            } => match (delta(numerator), delta(denominator)) {
                (Some(num), Some(den)) if den != 0.0 && (scale * num / den).is_finite() => {
                    MetricValue::Defined(scale * num / den)
                }
                _ => MetricValue::Undefined,
            },
            MetricSpec::SmoothedRate { name, counter } => match delta(counter) {
                Some(d) if dt_secs > 0.0 && (d / dt_secs).is_finite() => {
                    let estimate = estimates.entry(name.clone()).or_default();
                    MetricValue::Defined(estimate.update(d / dt_secs, alpha))
                }
                // Duplicate-or-earlier timestamp after tolerance: keep the
                // counter state but skip smoothing to avoid rate spikes.
                _ => MetricValue::Undefined,
            },
            MetricSpec::Share { counter, .. } => match delta(counter) {
                Some(d) if dt_secs > 0.0 && (d / dt_secs).is_finite() => {
                    MetricValue::Defined((100.0 * d / dt_secs).min(100.0))
                }
                _ => MetricValue::Undefined,
            },
        }
    }
}
