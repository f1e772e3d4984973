use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A snapshot's timestamp was not strictly greater than the last one
    /// recorded for the series. The sample is rejected and prior state is
    /// left untouched, so the caller may retry with corrected ordering.
    #[error("out-of-order sample for series {series}: got {got_ms} ms, last {last_ms} ms")]
    OutOfOrderSample {
        series: String,
        last_ms: f64,
        got_ms: f64,
    },

    /// A snapshot's timestamp was NaN or infinite. Rejected outright: a
    /// non-finite baseline would make every later interval non-finite too.
    #[error("non-finite timestamp {got_ms} for series {series}")]
    NonFiniteTimestamp { series: String, got_ms: f64 },

    /// A mean was requested for a metric never registered on that series.
    #[error("unknown metric {metric} for series {series}")]
    UnknownMetric { series: String, metric: String },

    /// The metric is registered but no sample has produced a defined value
    /// yet, so no mean exists.
    #[error("no accepted samples for metric {metric} on series {series}")]
    NoAcceptedSamples { series: String, metric: String },

    /// Two metric specs in the same set share a name.
    #[error("duplicate metric name {0}")]
    DuplicateMetric(String),

    /// Smoothing factor outside [0, 1).
    #[error("invalid smoothing alpha {0}")]
    InvalidAlpha(f64),

    /// Attempt to replace the metric set of a series that has already
    /// ingested samples.
    #[error("series {0} is already active")]
    SeriesAlreadyActive(String),

    /// A timing-frame info string did not have the expected shape.
    #[error("malformed timing frame info: {0}")]
    MalformedTimingInfo(String),
}
