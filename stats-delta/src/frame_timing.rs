//! Frame-timing correlation: per-frame pipeline timestamps and their
//! per-stage delay decomposition.
//!
//! The platform reports, per video frame, a comma-separated list of
//! timestamps taken at each pipeline stage (capture, encode, packetization,
//! pacer, network, receive, jitter buffer, decode), all on the same clock.
//! Stages the platform could not measure are reported as -1 and such frames
//! are skipped rather than poisoning the lifetime means.

use crate::error::{Error, Result};
use crate::series::MeanAccumulator;
use serde::Serialize;

/// Reserved metric names under which stage means are readable through
/// [`DeltaEngine::mean_over_series`](crate::DeltaEngine::mean_over_series).
pub mod timing_metric {
    pub const CAPTURE_TO_ENCODE_DELAY_MS: &str = "captureToEncodeDelayMs";
    pub const ENCODE_DELAY_MS: &str = "encodeDelayMs";
    pub const PACKETIZATION_DELAY_MS: &str = "packetizationDelayMs";
    pub const PACER_DELAY_MS: &str = "pacerDelayMs";
    pub const PACKET_RECEIVE_DELAY_MS: &str = "packetReceiveDelayMs";
    pub const JITTER_BUFFER_DELAY_MS: &str = "jitterBufferDelayMs";
    pub const DECODE_DELAY_MS: &str = "decodeDelayMs";
    pub const END_TO_END_DELAY_MS: &str = "endToEndDelayMs";
}

/// Pipeline timestamps for one video frame, in milliseconds on the sender's
/// clock (receive-side stamps are translated by the platform).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    pub rtp_timestamp: f64,
    pub capture_ms: f64,
    pub encode_start_ms: f64,
    pub encode_finish_ms: f64,
    pub packetization_finish_ms: f64,
    pub pacer_exit_ms: f64,
    pub network_entry_ms: f64,
    pub network_exit_ms: f64,
    pub receive_start_ms: f64,
    pub receive_finish_ms: f64,
    pub decode_start_ms: f64,
    pub decode_finish_ms: f64,
}

/// Number of leading numeric fields consumed from the wire form. Trailing
/// fields (render time, outlier/timer flags) are ignored.
const TIMING_FIELDS: usize = 12;

impl FrameTiming {
    /// Parses the comma-separated wire form (`goog-timing-frame-info`).
    pub fn parse(info: &str) -> Result<Self> {
        let fields: Vec<f64> = info
            .split(',')
            .take(TIMING_FIELDS)
            .map(|f| f.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| Error::MalformedTimingInfo(info.to_string()))?;
        if fields.len() < TIMING_FIELDS {
            return Err(Error::MalformedTimingInfo(info.to_string()));
        }

        Ok(Self {
            rtp_timestamp: fields[0],
            capture_ms: fields[1],
            encode_start_ms: fields[2],
            encode_finish_ms: fields[3],
            packetization_finish_ms: fields[4],
            pacer_exit_ms: fields[5],
            network_entry_ms: fields[6],
            network_exit_ms: fields[7],
            receive_start_ms: fields[8],
            receive_finish_ms: fields[9],
            decode_start_ms: fields[10],
            decode_finish_ms: fields[11],
        })
    }

    /// Whether every stage this decomposition consumes was measured. The
    /// platform reports -1 for unavailable stages.
    pub fn is_complete(&self) -> bool {
        [
            self.capture_ms,
            self.encode_start_ms,
            self.encode_finish_ms,
            self.packetization_finish_ms,
            self.pacer_exit_ms,
            self.network_entry_ms,
            self.network_exit_ms,
            self.receive_start_ms,
            self.receive_finish_ms,
            self.decode_start_ms,
            self.decode_finish_ms,
        ]
        .iter()
        .all(|v| *v >= 0.0 && v.is_finite())
    }

    /// Per-stage delay decomposition, or `None` if any consumed stage was
    /// unavailable.
    pub fn stage_delays(&self) -> Option<StageDelays> {
        if !self.is_complete() {
            return None;
        }
        Some(StageDelays {
            capture_to_encode_ms: self.encode_start_ms - self.capture_ms,
            encode_ms: self.encode_finish_ms - self.encode_start_ms,
            packetization_ms: self.packetization_finish_ms - self.encode_finish_ms,
            pacer_ms: self.pacer_exit_ms - self.packetization_finish_ms,
            packet_receive_ms: self.receive_finish_ms - self.receive_start_ms,
            jitter_buffer_ms: self.decode_start_ms - self.receive_finish_ms,
            decode_ms: self.decode_finish_ms - self.decode_start_ms,
            end_to_end_ms: self.decode_finish_ms - self.capture_ms,
        })
    }
}

/// How long one frame spent in each pipeline stage, in milliseconds.
/// TX stages run on the sender, RX stages on the receiver; `end_to_end_ms`
/// spans capture to decode finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDelays {
    pub capture_to_encode_ms: f64,
    pub encode_ms: f64,
    pub packetization_ms: f64,
    pub pacer_ms: f64,
    pub packet_receive_ms: f64,
    pub jitter_buffer_ms: f64,
    pub decode_ms: f64,
    pub end_to_end_ms: f64,
}

/// Lifetime per-stage delay sums for one series.
#[derive(Debug, Clone, Default)]
pub(crate) struct TimingAccumulator {
    capture_to_encode: MeanAccumulator,
    encode: MeanAccumulator,
    packetization: MeanAccumulator,
    pacer: MeanAccumulator,
    packet_receive: MeanAccumulator,
    jitter_buffer: MeanAccumulator,
    decode: MeanAccumulator,
    end_to_end: MeanAccumulator,
    frames: u64,
}

impl TimingAccumulator {
    pub(crate) fn observe(&mut self, delays: &StageDelays) {
        self.capture_to_encode.record(delays.capture_to_encode_ms);
        self.encode.record(delays.encode_ms);
        self.packetization.record(delays.packetization_ms);
        self.pacer.record(delays.pacer_ms);
        self.packet_receive.record(delays.packet_receive_ms);
        self.jitter_buffer.record(delays.jitter_buffer_ms);
        self.decode.record(delays.decode_ms);
        self.end_to_end.record(delays.end_to_end_ms);
        self.frames += 1;
    }

    /// Mean for one reserved timing metric name; `None` if the name is not a
    /// timing metric, `Some(None)` if no complete frame was observed yet.
    pub(crate) fn mean(&self, metric: &str) -> Option<Option<f64>> {
        use timing_metric::*;
        let acc = match metric {
            CAPTURE_TO_ENCODE_DELAY_MS => &self.capture_to_encode,
            ENCODE_DELAY_MS => &self.encode,
            PACKETIZATION_DELAY_MS => &self.packetization,
            PACER_DELAY_MS => &self.pacer,
            PACKET_RECEIVE_DELAY_MS => &self.packet_receive,
            JITTER_BUFFER_DELAY_MS => &self.jitter_buffer,
            DECODE_DELAY_MS => &self.decode,
            END_TO_END_DELAY_MS => &self.end_to_end,
            _ => return None,
        };
        Some(acc.mean())
    }

    /// All stage means in one shot, or `None` before the first complete frame.
    pub(crate) fn means(&self) -> Option<StageDelays> {
        if self.frames == 0 {
            return None;
        }
        Some(StageDelays {
            capture_to_encode_ms: self.capture_to_encode.mean()?,
            encode_ms: self.encode.mean()?,
            packetization_ms: self.packetization.mean()?,
            pacer_ms: self.pacer.mean()?,
            packet_receive_ms: self.packet_receive.mean()?,
            jitter_buffer_ms: self.jitter_buffer.mean()?,
            decode_ms: self.decode.mean()?,
            end_to_end_ms: self.end_to_end.mean()?,
        })
    }
}
