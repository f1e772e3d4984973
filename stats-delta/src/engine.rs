//! The counter-delta analytics engine.

use crate::error::{Error, Result};
use crate::frame_timing::{FrameTiming, StageDelays};
use crate::metric::{MetricSet, StreamKind};
use crate::report::DeltaReport;
use crate::series::Series;
use crate::snapshot::{CounterSnapshot, SeriesId};
use log::debug;
use std::collections::HashMap;

/// Default smoothing factor for running rate estimates: 70% history, 30% new
/// sample.
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.7;

/// Builder for [`DeltaEngine`].
#[derive(Debug, Clone)]
pub struct DeltaEngineBuilder {
    smoothing_alpha: f64,
}

impl Default for DeltaEngineBuilder {
    fn default() -> Self {
        Self {
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }
}

impl DeltaEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Weight given to history in the running rate estimates, in `[0, 1)`.
    pub fn with_smoothing_alpha(mut self, alpha: f64) -> Self {
        self.smoothing_alpha = alpha;
        self
    }

    pub fn build(self) -> Result<DeltaEngine> {
        if !self.smoothing_alpha.is_finite()
            || !(0.0..1.0).contains(&self.smoothing_alpha)
        {
            return Err(Error::InvalidAlpha(self.smoothing_alpha));
        }
        Ok(DeltaEngine {
            smoothing_alpha: self.smoothing_alpha,
            series: HashMap::new(),
        })
    }
}

/// Ingests timestamped snapshots of cumulative counters, one logical stream
/// per series, and derives per-interval rates, ratios, smoothed running
/// rates, and lifetime means.
///
/// All operations are synchronous in-memory computations; nothing blocks and
/// no locks are held. State for different series is fully independent, but
/// concurrent `ingest` calls for the *same* series must be serialized by the
/// caller (`&mut self` enforces this within one instance).
#[derive(Debug)]
pub struct DeltaEngine {
    smoothing_alpha: f64,
    series: HashMap<SeriesId, Series>,
}

impl Default for DeltaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaEngine {
    /// An engine with the default smoothing factor.
    pub fn new() -> Self {
        Self {
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
            series: HashMap::new(),
        }
    }

    pub fn builder() -> DeltaEngineBuilder {
        DeltaEngineBuilder::new()
    }

    /// Declares the derived-metric set for a series. Must happen before the
    /// series' first snapshot; re-registering a series that has already
    /// ingested samples fails with [`Error::SeriesAlreadyActive`].
    pub fn register(&mut self, series_id: impl Into<SeriesId>, metric_set: MetricSet) -> Result<()> {
        metric_set.validate()?;
        let series_id = series_id.into();
        match self.series.get_mut(&series_id) {
            Some(series) if series.has_samples() => Err(Error::SeriesAlreadyActive(series_id)),
            Some(series) => {
                series.set_metric_set(metric_set);
                Ok(())
            }
            None => {
                debug!("registering series {series_id}");
                self.series.insert(series_id, Series::new(metric_set));
                Ok(())
            }
        }
    }

    /// Registers a series with the preset metric catalogue for its stream
    /// kind.
    pub fn register_kind(&mut self, series_id: impl Into<SeriesId>, kind: StreamKind) -> Result<()> {
        self.register(series_id, MetricSet::for_kind(kind))
    }

    /// Ingests one snapshot for a series and returns the derived report.
    ///
    /// The first snapshot of a series (created here on demand if it was never
    /// registered) establishes the baseline and yields an all-`Undefined`
    /// report. A timestamp not strictly greater than the series' last one is
    /// rejected with [`Error::OutOfOrderSample`], a NaN or infinite one with
    /// [`Error::NonFiniteTimestamp`]; either rejection leaves state untouched.
    /// A regressed counter rebaselines the series and marks the metrics that
    /// read it as `Reset`.
    pub fn ingest(&mut self, series_id: &str, snapshot: CounterSnapshot) -> Result<DeltaReport> {
        if !snapshot.timestamp_ms.is_finite() {
            return Err(Error::NonFiniteTimestamp {
                series: series_id.to_string(),
                got_ms: snapshot.timestamp_ms,
            });
        }

        let series = self
            .series
            .entry(series_id.to_string())
            .or_insert_with(|| {
                debug!("creating series {series_id} on first snapshot");
                Series::new(MetricSet::new())
            });

        if let Some(last_ms) = series.last_timestamp_ms() {
            if snapshot.timestamp_ms <= last_ms {
                return Err(Error::OutOfOrderSample {
                    series: series_id.to_string(),
                    last_ms,
                    got_ms: snapshot.timestamp_ms,
                });
            }
        }

        let outcome = series.ingest(snapshot, self.smoothing_alpha);
        Ok(DeltaReport {
            series_id: series_id.to_string(),
            timestamp_ms: outcome.timestamp_ms,
            interval_ms: outcome.interval_ms,
            counters: outcome.counters,
            metrics: outcome.metrics,
        })
    }

    /// Folds one frame's pipeline timestamps into the series' per-stage
    /// lifetime means. Frames with unavailable stages are skipped and `None`
    /// is returned; complete frames return their instant decomposition.
    pub fn ingest_timing(&mut self, series_id: &str, timing: &FrameTiming) -> Option<StageDelays> {
        let delays = timing.stage_delays()?;
        let series = self
            .series
            .entry(series_id.to_string())
            .or_insert_with(|| Series::new(MetricSet::new()));
        series.timing.observe(&delays);
        Some(delays)
    }

    /// Lifetime mean of a registered metric over its defined samples.
    pub fn mean_over_series(&self, series_id: &str, metric: &str) -> Result<f64> {
        let unknown = || Error::UnknownMetric {
            series: series_id.to_string(),
            metric: metric.to_string(),
        };
        let series = self.series.get(series_id).ok_or_else(unknown)?;
        match series.mean(metric).ok_or_else(unknown)? {
            Some(mean) => Ok(mean),
            None => Err(Error::NoAcceptedSamples {
                series: series_id.to_string(),
                metric: metric.to_string(),
            }),
        }
    }

    /// All frame-timing stage means for a series, or `None` before the first
    /// complete frame.
    pub fn timing_means(&self, series_id: &str) -> Option<StageDelays> {
        self.series.get(series_id)?.timing.means()
    }

    /// Current smoothed value of a `SmoothedRate` metric, if it has been
    /// seeded.
    pub fn rate_estimate(&self, series_id: &str, metric: &str) -> Option<f64> {
        self.series.get(series_id)?.rate_estimate(metric)?.value()
    }

    /// Drops all retained state for a series. Idempotent: unknown ids are a
    /// no-op. A fresh ingest afterwards takes the bootstrap path again.
    pub fn reset(&mut self, series_id: &str) {
        if self.series.remove(series_id).is_some() {
            debug!("reset series {series_id}");
        }
    }

    /// Number of live series.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }
}
