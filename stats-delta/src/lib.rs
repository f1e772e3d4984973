//! Streaming counter-delta analytics for media statistics.
//!
//! Media stacks expose their statistics as *cumulative* counters: frames
//! encoded since the stream started, total seconds spent encoding, packets
//! sent, time spent CPU-limited. Raw cumulative values are useless for
//! display; what a stats page wants is per-interval rates and ratios. This
//! crate turns a stream of timestamped counter snapshots into exactly that:
//!
//! - interval deltas per counter,
//! - per-second rates (`Δcount / Δt`),
//! - delta ratios with unit scaling (`ΔtotalEncodeTime / ΔframesEncoded` in
//!   milliseconds per frame),
//! - exponentially smoothed running rates for irregular sampling cadences,
//! - lifetime means over the accepted samples,
//! - per-stage frame-timing delay decomposition (capture → encode → pacer →
//!   network → jitter buffer → decode) with lifetime means per stage.
//!
//! Each logical stream (one sender, one receiver, one local capture track) is
//! one *series*, identified by an opaque id supplied by the caller. A series
//! retains only the previous snapshot plus lifetime sums, so memory stays
//! O(1) per series regardless of stream duration.
//!
//! Division by zero and counter regressions never leak `NaN` or infinity:
//! the affected metric is marked [`MetricValue::Undefined`] or
//! [`MetricValue::Reset`] and the rest of the report stays valid. A
//! regression (a counter that decreased, i.e. a stream restart) rebaselines
//! the series on the fresh snapshot.
//!
//! # Quick Start
//!
//! ```
//! use stats_delta::{CounterSnapshot, DeltaEngine, StreamKind};
//!
//! let mut engine = DeltaEngine::new();
//! engine.register_kind("video-send-0", StreamKind::OutboundRtp)?;
//!
//! // First snapshot only establishes the baseline.
//! engine.ingest(
//!     "video-send-0",
//!     CounterSnapshot::new(1000.0)
//!         .with_counter("framesEncoded", 30.0)
//!         .with_counter("totalEncodeTime", 0.12),
//! )?;
//!
//! // Every later snapshot yields a report of interval deltas and metrics.
//! let report = engine.ingest(
//!     "video-send-0",
//!     CounterSnapshot::new(2000.0)
//!         .with_counter("framesEncoded", 60.0)
//!         .with_counter("totalEncodeTime", 0.27),
//! )?;
//! assert_eq!(
//!     report.metric("framesEncodedPerSecond").unwrap().as_f64(),
//!     Some(30.0),
//! );
//! # Ok::<(), stats_delta::Error>(())
//! ```
//!
//! # Concurrency
//!
//! The engine is built for a single-threaded, event-driven caller: one
//! sampling loop invoking [`DeltaEngine::ingest`] per series on a fixed
//! cadence. No operation blocks or performs I/O. Different series never
//! share state, so separate engine instances may live on separate threads;
//! updates to one series must be serialized by the caller.

#![warn(rust_2018_idioms)]

mod engine;
mod error;
mod frame_timing;
mod metric;
mod report;
mod series;
mod snapshot;

pub use engine::{DEFAULT_SMOOTHING_ALPHA, DeltaEngine, DeltaEngineBuilder};
pub use error::{Error, Result};
pub use frame_timing::{FrameTiming, StageDelays, timing_metric};
pub use metric::{MetricSet, MetricSpec, MetricValue, StreamKind};
pub use report::DeltaReport;
pub use series::RunningRateEstimate;
pub use snapshot::{CounterName, CounterSnapshot, MetricName, SeriesId};
