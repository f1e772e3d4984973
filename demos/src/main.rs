//! Synthetic poller exercising the stats-delta engine the way a stats page
//! polls a peer connection: one snapshot per series per interval, with an
//! injected mid-run counter reset and a stream of timing-frame infos.

use anyhow::Result;
use clap::Parser;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stats_delta::{CounterSnapshot, DeltaEngine, FrameTiming, StreamKind, timing_metric};

const SEND_SERIES: &str = "video-send-0";
const RECV_SERIES: &str = "video-recv-0";
const TRACK_SERIES: &str = "local-capture-0";

#[derive(Parser)]
#[command(name = "synthetic-poller")]
#[command(about = "Feeds synthetic counter snapshots through the delta engine.")]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    /// Number of polls to simulate.
    #[arg(long, default_value_t = 10)]
    polls: u32,
    /// Nominal poll interval in milliseconds.
    #[arg(long, default_value_t = 1000.0)]
    interval_ms: f64,
    /// Random jitter applied to each interval, +/- this many milliseconds.
    #[arg(long, default_value_t = 50.0)]
    jitter_ms: f64,
    /// Smoothing factor for running rate estimates.
    #[arg(long, default_value_t = stats_delta::DEFAULT_SMOOTHING_ALPHA)]
    alpha: f64,
    /// RNG seed, for reproducible runs.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Poll index at which the sender's counters reset (stream restart).
    #[arg(long, default_value_t = 6)]
    reset_at: u32,
}

/// Cumulative sender-side counters, advanced once per poll. Everything is
/// monotone until `restart` zeroes it, which is what a stream restart looks
/// like from the stats report.
#[derive(Debug, Default)]
struct SenderCounters {
    frames: f64,
    qp_sum: f64,
    encode_time_secs: f64,
    packets: f64,
    send_delay_secs: f64,
    cpu_limited_secs: f64,
}

impl SenderCounters {
    fn advance(&mut self, frames: f64, interval_secs: f64, rng: &mut StdRng) {
        self.frames += frames;
        self.qp_sum += frames * rng.random_range(22.0..28.0);
        self.encode_time_secs += frames * rng.random_range(0.003..0.006);
        let packets = frames * 4.0;
        self.packets += packets;
        self.send_delay_secs += packets * rng.random_range(0.001..0.003);
        self.cpu_limited_secs += interval_secs * rng.random_range(0.0..0.2);
    }

    fn restart(&mut self) {
        *self = Self::default();
    }

    fn snapshot(&self, ts: f64) -> CounterSnapshot {
        CounterSnapshot::new(ts)
            .with_counter("framesEncoded", self.frames)
            .with_counter("framesSent", self.frames)
            .with_counter("qpSum", self.qp_sum)
            .with_counter("totalEncodeTime", self.encode_time_secs)
            .with_counter("packetsSent", self.packets)
            .with_counter("totalPacketSendDelay", self.send_delay_secs)
            .with_counter("qualityLimitationDurations.cpu", self.cpu_limited_secs)
    }
}

fn track_snapshot(ts: f64, total: f64) -> CounterSnapshot {
    let discarded = (total * 0.02).floor();
    let dropped = (total * 0.03).floor();
    CounterSnapshot::new(ts)
        .with_counter("totalFrames", total)
        .with_counter("deliveredFrames", total - discarded - dropped)
        .with_counter("discardedFrames", discarded)
}

/// A plausible goog-timing-frame-info line for one frame captured at
/// `capture_ms`, in the comma-separated wire form so the parser is exercised
/// too.
fn timing_info(capture_ms: f64, rng: &mut StdRng) -> String {
    let encode_start = capture_ms + rng.random_range(1.0..4.0);
    let encode_finish = encode_start + rng.random_range(4.0..12.0);
    let packetized = encode_finish + rng.random_range(0.5..2.0);
    let pacer_exit = packetized + rng.random_range(0.5..5.0);
    let receive_start = pacer_exit + rng.random_range(10.0..40.0);
    let receive_finish = receive_start + rng.random_range(0.5..3.0);
    let decode_start = receive_finish + rng.random_range(5.0..15.0);
    let decode_finish = decode_start + rng.random_range(3.0..10.0);
    format!(
        "{:.0},{capture_ms:.0},{encode_start:.0},{encode_finish:.0},{packetized:.0},{pacer_exit:.0},{pacer_exit:.0},{pacer_exit:.0},{receive_start:.0},{receive_finish:.0},{decode_start:.0},{decode_finish:.0},{decode_finish:.0},0,0",
        capture_ms * 90.0,
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(if cli.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut engine = DeltaEngine::builder()
        .with_smoothing_alpha(cli.alpha)
        .build()?;
    engine.register_kind(SEND_SERIES, StreamKind::OutboundRtp)?;
    engine.register_kind(RECV_SERIES, StreamKind::InboundRtp)?;
    engine.register_kind(TRACK_SERIES, StreamKind::LocalCapture)?;

    let mut now_ms = 10_000.0;
    let mut frames = 0.0f64;
    let mut sender = SenderCounters::default();

    for poll in 0..cli.polls {
        now_ms += cli.interval_ms + rng.random_range(-cli.jitter_ms..=cli.jitter_ms);
        let interval_secs = cli.interval_ms / 1000.0;
        let advance = interval_secs * rng.random_range(28.0..31.0);
        frames += advance;

        if poll == cli.reset_at {
            info!("injecting counter reset at poll {poll}");
            sender.restart();
        }
        sender.advance(advance, interval_secs, &mut rng);

        let report = engine.ingest(SEND_SERIES, sender.snapshot(now_ms))?;
        println!("{}", serde_json::to_string_pretty(&report)?);

        let report = engine.ingest(TRACK_SERIES, track_snapshot(now_ms, frames))?;
        println!("{}", serde_json::to_string_pretty(&report)?);

        // A couple of timing frames arrive per poll on the receive side.
        for i in 0..2 {
            let info = timing_info(now_ms - 500.0 + 100.0 * f64::from(i), &mut rng);
            let timing = FrameTiming::parse(&info)?;
            if let Some(delays) = engine.ingest_timing(RECV_SERIES, &timing) {
                debug!("frame delays: {}", serde_json::to_string(&delays)?);
            }
        }
    }

    if let Some(means) = engine.timing_means(RECV_SERIES) {
        info!("stage delay means: {}", serde_json::to_string_pretty(&means)?);
        info!(
            "mean end-to-end delay: {:.1} ms",
            engine.mean_over_series(RECV_SERIES, timing_metric::END_TO_END_DELAY_MS)?
        );
    }
    for metric in ["framesEncodedPerSecond", "encodeTimePerFrameMs", "packetSendDelayMs"] {
        match engine.mean_over_series(SEND_SERIES, metric) {
            Ok(mean) => info!("lifetime mean {metric}: {mean:.2}"),
            Err(err) => info!("lifetime mean {metric}: {err}"),
        }
    }
    if let Some(fps) = engine.rate_estimate(TRACK_SERIES, "smoothedFps") {
        info!("smoothed capture fps: {fps:.1}");
    }

    Ok(())
}
