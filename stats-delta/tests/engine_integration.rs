//! End-to-end scenarios for the counter-delta engine: a synthetic outbound
//! encoder series polled once per second, with duplicate timestamps, counter
//! resets, and teardown in the mix.

use stats_delta::{
    CounterSnapshot, DeltaEngine, Error, FrameTiming, MetricSet, MetricSpec, MetricValue,
    StreamKind, timing_metric,
};

const SERIES: &str = "video-send-0";

fn outbound_snapshot(ts: f64, frames: f64, encode_secs: f64, packets: f64) -> CounterSnapshot {
    CounterSnapshot::new(ts)
        .with_counter("framesEncoded", frames)
        .with_counter("totalEncodeTime", encode_secs)
        .with_counter("packetsSent", packets)
        .with_counter("totalPacketSendDelay", packets * 0.002)
        .with_counter("qpSum", frames * 25.0)
        .with_counter("framesSent", frames)
        .with_counter("qualityLimitationDurations.cpu", 0.0)
}

#[test]
fn monotone_stream_never_rejects_and_never_emits_non_finite() {
    let mut engine = DeltaEngine::new();
    engine.register_kind(SERIES, StreamKind::OutboundRtp).unwrap();

    for i in 0..20u32 {
        let ts = 1000.0 + 1000.0 * f64::from(i);
        let frames = 30.0 * f64::from(i);
        let report = engine
            .ingest(SERIES, outbound_snapshot(ts, frames, frames * 0.004, frames * 4.0))
            .unwrap();

        for value in report.counters.values().chain(report.metrics.values()) {
            if let MetricValue::Defined(v) = value {
                assert!(v.is_finite(), "non-finite metric leaked: {value:?}");
            }
        }
    }
}

#[test]
fn zero_denominator_is_undefined_not_nan() {
    let mut engine = DeltaEngine::new();
    engine.register_kind(SERIES, StreamKind::OutboundRtp).unwrap();

    engine
        .ingest(SERIES, outbound_snapshot(1000.0, 30.0, 0.1, 100.0))
        .unwrap();
    // framesEncoded did not advance: every per-frame ratio has a zero
    // denominator this interval.
    let report = engine
        .ingest(SERIES, outbound_snapshot(2000.0, 30.0, 0.1, 140.0))
        .unwrap();

    assert_eq!(
        report.metric("encodeTimePerFrameMs"),
        Some(MetricValue::Undefined)
    );
    assert_eq!(report.metric("qpSumPerFrame"), Some(MetricValue::Undefined));
    // The rest of the report is still valid.
    assert_eq!(
        report.metric("packetSendDelayMs").unwrap().as_f64().map(f64::round),
        Some(2.0)
    );
    assert_eq!(
        report.metric("framesEncodedPerSecond"),
        Some(MetricValue::Defined(0.0))
    );

    let json = serde_json::to_string(&report).unwrap();
    assert!(!json.contains("NaN") && !json.contains("inf"));
}

#[test]
fn non_finite_counter_input_is_undefined_never_defined() {
    let mut engine = DeltaEngine::new();
    let frames = |ts: f64, n: f64| CounterSnapshot::new(ts).with_counter("framesEncoded", n);

    engine.ingest(SERIES, frames(1000.0, 30.0)).unwrap();

    // A glitched stats report: the delta is marked, not Defined(NaN), and
    // NaN must not be mistaken for a regression either.
    let report = engine.ingest(SERIES, frames(2000.0, f64::NAN)).unwrap();
    assert_eq!(
        report.counter_delta("framesEncoded"),
        Some(MetricValue::Undefined)
    );
    for value in report.counters.values().chain(report.metrics.values()) {
        if let MetricValue::Defined(v) = value {
            assert!(v.is_finite(), "Defined(non-finite) leaked: {v}");
        }
    }

    // Same for an infinite value.
    let mut engine = DeltaEngine::new();
    engine.ingest(SERIES, frames(1000.0, 30.0)).unwrap();
    let report = engine.ingest(SERIES, frames(2000.0, f64::INFINITY)).unwrap();
    assert_eq!(
        report.counter_delta("framesEncoded"),
        Some(MetricValue::Undefined)
    );
}

#[test]
fn counter_recovers_after_non_finite_baseline() {
    let mut engine = DeltaEngine::new();
    let frames = |ts: f64, n: f64| CounterSnapshot::new(ts).with_counter("framesEncoded", n);

    engine.ingest(SERIES, frames(1000.0, 30.0)).unwrap();
    engine.ingest(SERIES, frames(2000.0, f64::NAN)).unwrap();

    // The NaN became the baseline, so this interval has no usable delta.
    let report = engine.ingest(SERIES, frames(3000.0, 90.0)).unwrap();
    assert_eq!(
        report.counter_delta("framesEncoded"),
        Some(MetricValue::Undefined)
    );

    // Two finite snapshots in a row and the series is healthy again.
    let report = engine.ingest(SERIES, frames(4000.0, 120.0)).unwrap();
    assert_eq!(
        report.counter_delta("framesEncoded"),
        Some(MetricValue::Defined(30.0))
    );
}

#[test]
fn bootstrap_report_is_all_undefined() {
    let mut engine = DeltaEngine::new();
    engine.register_kind(SERIES, StreamKind::OutboundRtp).unwrap();

    let report = engine
        .ingest(SERIES, outbound_snapshot(1000.0, 30.0, 0.1, 100.0))
        .unwrap();

    assert!(report.is_bootstrap());
    assert!(report.counters.values().all(|v| *v == MetricValue::Undefined));
    assert!(report.metrics.values().all(|v| *v == MetricValue::Undefined));
    assert_eq!(engine.rate_estimate(SERIES, "smoothedFps"), None);
}

#[test]
fn instantaneous_rate_thirty_frames_over_one_second() {
    let mut engine = DeltaEngine::new();
    engine.register_kind(SERIES, StreamKind::OutboundRtp).unwrap();

    engine
        .ingest(SERIES, outbound_snapshot(1000.0, 30.0, 0.1, 100.0))
        .unwrap();
    let report = engine
        .ingest(SERIES, outbound_snapshot(2000.0, 60.0, 0.22, 220.0))
        .unwrap();

    assert_eq!(
        report.metric("framesEncodedPerSecond"),
        Some(MetricValue::Defined(30.0))
    );
}

#[test]
fn counter_regression_marks_reset_and_rebaselines() {
    let mut engine = DeltaEngine::new();
    engine
        .register(
            SERIES,
            MetricSet::new().with_metric(MetricSpec::Rate {
                name: "framesEncodedPerSecond".to_string(),
                counter: "framesEncoded".to_string(),
            }),
        )
        .unwrap();

    let frames = |ts: f64, n: f64| CounterSnapshot::new(ts).with_counter("framesEncoded", n);

    engine.ingest(SERIES, frames(1000.0, 60.0)).unwrap();

    // Stream restarted underneath us: 60 -> 10.
    let report = engine.ingest(SERIES, frames(2000.0, 10.0)).unwrap();
    assert_eq!(
        report.counter_delta("framesEncoded"),
        Some(MetricValue::Reset)
    );
    assert_eq!(
        report.metric("framesEncodedPerSecond"),
        Some(MetricValue::Reset)
    );

    // The next normal sample deltas against the regressed value, not the
    // stale pre-reset one.
    let report = engine.ingest(SERIES, frames(3000.0, 40.0)).unwrap();
    assert_eq!(
        report.counter_delta("framesEncoded"),
        Some(MetricValue::Defined(30.0))
    );
    assert_eq!(
        report.metric("framesEncodedPerSecond"),
        Some(MetricValue::Defined(30.0))
    );
}

#[test]
fn regression_restarts_smoothed_rate_from_zero() {
    let mut engine = DeltaEngine::new();
    engine
        .register(
            SERIES,
            MetricSet::new().with_metric(MetricSpec::SmoothedRate {
                name: "smoothedFps".to_string(),
                counter: "framesEncoded".to_string(),
            }),
        )
        .unwrap();

    let frames = |ts: f64, n: f64| CounterSnapshot::new(ts).with_counter("framesEncoded", n);

    engine.ingest(SERIES, frames(1000.0, 0.0)).unwrap();
    engine.ingest(SERIES, frames(2000.0, 60.0)).unwrap();
    assert_eq!(engine.rate_estimate(SERIES, "smoothedFps"), Some(60.0));

    // Restarted counter already shows 10 frames of fresh progress over this
    // interval: the estimate restarts at 10/s instead of decaying from 60.
    engine.ingest(SERIES, frames(3000.0, 10.0)).unwrap();
    assert_eq!(engine.rate_estimate(SERIES, "smoothedFps"), Some(10.0));
}

#[test]
fn smoothing_follows_the_seventy_thirty_rule() {
    let mut engine = DeltaEngine::new();
    engine
        .register(
            SERIES,
            MetricSet::new().with_metric(MetricSpec::SmoothedRate {
                name: "smoothedFps".to_string(),
                counter: "totalFrames".to_string(),
            }),
        )
        .unwrap();

    let frames = |ts: f64, n: f64| CounterSnapshot::new(ts).with_counter("totalFrames", n);

    engine.ingest(SERIES, frames(0.0, 0.0)).unwrap();
    // Seeded with the first instantaneous rate.
    engine.ingest(SERIES, frames(500.0, 15.0)).unwrap();
    assert_eq!(engine.rate_estimate(SERIES, "smoothedFps"), Some(30.0));
    // 0.7 * 30 + 0.3 * 20 = 27
    engine.ingest(SERIES, frames(1500.0, 35.0)).unwrap();
    let smoothed = engine.rate_estimate(SERIES, "smoothedFps").unwrap();
    assert!((smoothed - 27.0).abs() < 1e-9);
}

#[test]
fn lifetime_mean_excludes_undefined_intervals() {
    let mut engine = DeltaEngine::new();
    engine
        .register(
            SERIES,
            MetricSet::new().with_metric(MetricSpec::Ratio {
                name: "encodeTimePerFrameMs".to_string(),
                numerator: "totalEncodeTime".to_string(),
                denominator: "framesEncoded".to_string(),
                scale: 1000.0,
            }),
        )
        .unwrap();

    let snap = |ts: f64, frames: f64, secs: f64| {
        CounterSnapshot::new(ts)
            .with_counter("framesEncoded", frames)
            .with_counter("totalEncodeTime", secs)
    };

    engine.ingest(SERIES, snap(1000.0, 0.0, 0.0)).unwrap();
    // Three defined intervals: 2 ms, 4 ms, 6 ms per frame.
    engine.ingest(SERIES, snap(2000.0, 10.0, 0.02)).unwrap();
    engine.ingest(SERIES, snap(3000.0, 20.0, 0.06)).unwrap();
    engine.ingest(SERIES, snap(4000.0, 30.0, 0.12)).unwrap();
    // One undefined interval: frames did not advance.
    let report = engine.ingest(SERIES, snap(5000.0, 30.0, 0.12)).unwrap();
    assert_eq!(
        report.metric("encodeTimePerFrameMs"),
        Some(MetricValue::Undefined)
    );

    let mean = engine.mean_over_series(SERIES, "encodeTimePerFrameMs").unwrap();
    assert!((mean - 4.0).abs() < 1e-9);
}

#[test]
fn reset_then_ingest_is_the_bootstrap_path() {
    let mut engine = DeltaEngine::new();
    engine.register_kind(SERIES, StreamKind::OutboundRtp).unwrap();
    engine
        .ingest(SERIES, outbound_snapshot(1000.0, 30.0, 0.1, 100.0))
        .unwrap();
    engine
        .ingest(SERIES, outbound_snapshot(2000.0, 60.0, 0.2, 200.0))
        .unwrap();

    engine.reset(SERIES);

    // Registration went with the series: the stream was torn down.
    assert!(matches!(
        engine.mean_over_series(SERIES, "framesEncodedPerSecond"),
        Err(Error::UnknownMetric { .. })
    ));

    // Recreating the stream replays the very first ingest: an older
    // timestamp is fine and the report is pure bootstrap.
    engine.register_kind(SERIES, StreamKind::OutboundRtp).unwrap();
    let report = engine
        .ingest(SERIES, outbound_snapshot(500.0, 5.0, 0.01, 10.0))
        .unwrap();
    assert!(report.is_bootstrap());
    assert!(!report.metrics.is_empty());
    assert!(report.metrics.values().all(|v| *v == MetricValue::Undefined));
    assert!(matches!(
        engine.mean_over_series(SERIES, "framesEncodedPerSecond"),
        Err(Error::NoAcceptedSamples { .. })
    ));
}

#[test]
fn unknown_metric_leaves_state_unchanged() {
    let mut engine = DeltaEngine::new();
    engine.register_kind(SERIES, StreamKind::OutboundRtp).unwrap();
    engine
        .ingest(SERIES, outbound_snapshot(1000.0, 30.0, 0.1, 100.0))
        .unwrap();
    engine
        .ingest(SERIES, outbound_snapshot(2000.0, 60.0, 0.2, 200.0))
        .unwrap();

    assert!(matches!(
        engine.mean_over_series(SERIES, "bitrateMbps"),
        Err(Error::UnknownMetric { .. })
    ));

    // Ingest still deltas against the same baseline.
    let report = engine
        .ingest(SERIES, outbound_snapshot(3000.0, 90.0, 0.3, 300.0))
        .unwrap();
    assert_eq!(
        report.counter_delta("framesEncoded"),
        Some(MetricValue::Defined(30.0))
    );
}

#[test]
fn quality_limitation_share_is_capped_at_hundred() {
    let mut engine = DeltaEngine::new();
    engine
        .register(
            SERIES,
            MetricSet::new().with_metric(MetricSpec::Share {
                name: "qualityLimitationCpuPct".to_string(),
                counter: "qualityLimitationDurations.cpu".to_string(),
            }),
        )
        .unwrap();

    let snap = |ts: f64, cpu_secs: f64| {
        CounterSnapshot::new(ts).with_counter("qualityLimitationDurations.cpu", cpu_secs)
    };

    engine.ingest(SERIES, snap(1000.0, 0.0)).unwrap();
    // Half the wall time CPU-limited.
    let report = engine.ingest(SERIES, snap(2000.0, 0.5)).unwrap();
    assert_eq!(
        report.metric("qualityLimitationCpuPct"),
        Some(MetricValue::Defined(50.0))
    );
    // Stat glitch claims more limited time than wall time passed: capped.
    let report = engine.ingest(SERIES, snap(3000.0, 2.0)).unwrap();
    assert_eq!(
        report.metric("qualityLimitationCpuPct"),
        Some(MetricValue::Defined(100.0))
    );
}

#[test]
fn series_are_isolated() {
    let mut engine = DeltaEngine::new();
    let frames = |ts: f64, n: f64| CounterSnapshot::new(ts).with_counter("framesEncoded", n);

    engine.ingest("a", frames(1000.0, 10.0)).unwrap();
    engine.ingest("b", frames(5000.0, 99.0)).unwrap();

    // An error on one series never perturbs another.
    assert!(engine.ingest("a", frames(900.0, 20.0)).is_err());
    let report = engine.ingest("b", frames(6000.0, 129.0)).unwrap();
    assert_eq!(
        report.counter_delta("framesEncoded"),
        Some(MetricValue::Defined(30.0))
    );
    assert_eq!(engine.series_count(), 2);
}

#[test]
fn timing_frames_accumulate_stage_means() {
    let mut engine = DeltaEngine::new();
    engine.register_kind("video-recv-0", StreamKind::InboundRtp).unwrap();

    let a = FrameTiming::parse("3000,100,102,110,112,115,116,116,140,142,150,158,160,0,0").unwrap();
    let b = FrameTiming::parse("6000,200,204,216,218,221,222,222,250,252,260,270,272,0,0").unwrap();
    // Unavailable receive stamp: skipped, not poisoning the means.
    let skipped =
        FrameTiming::parse("9000,300,302,310,312,315,316,316,-1,342,350,358,360,0,0").unwrap();

    assert!(engine.ingest_timing("video-recv-0", &a).is_some());
    assert!(engine.ingest_timing("video-recv-0", &b).is_some());
    assert!(engine.ingest_timing("video-recv-0", &skipped).is_none());

    let means = engine.timing_means("video-recv-0").unwrap();
    assert_eq!(means.capture_to_encode_ms, 3.0); // (2 + 4) / 2
    assert_eq!(means.encode_ms, 10.0); // (8 + 12) / 2
    assert_eq!(means.end_to_end_ms, 64.0); // (58 + 70) / 2

    let mean = engine
        .mean_over_series("video-recv-0", timing_metric::END_TO_END_DELAY_MS)
        .unwrap();
    assert_eq!(mean, 64.0);
}
