//! Input and output records of [`crate::derive`].

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

/// Everything the collector learned about one data stream.
///
/// Either both timestamps are present or neither is. A stream without
/// documents may still occupy bytes on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFacts {
    /// Name of the data stream, unique within a batch.
    pub name: String,
    /// Earliest observed event time.
    pub min_timestamp: Option<OffsetDateTime>,
    /// Latest observed event time.
    pub max_timestamp: Option<OffsetDateTime>,
    /// Total bytes held by every backing index of the stream.
    pub store_bytes: u64,
}

impl StreamFacts {
    /// Facts for a stream that holds no documents.
    #[must_use]
    pub fn empty(name: impl Into<String>, store_bytes: u64) -> Self {
        Self {
            name: name.into(),
            min_timestamp: None,
            max_timestamp: None,
            store_bytes,
        }
    }
}

/// Activity classification of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Written to recently and retaining enough history for a stable rate.
    Active,
    /// No writes within the staleness threshold.
    Stagnant,
    /// Written to recently but too young for its rate to be trusted.
    NewShort,
    /// No documents at all.
    Empty,
}

impl Status {
    /// Label used when presenting the status to an operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Active => "ACTIVE",
            Status::Stagnant => "STAGNANT",
            Status::NewShort => "NEW_SHORT",
            Status::Empty => "EMPTY",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long ago a stream last received data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "days")]
pub enum Recency {
    /// Within the "now" window.
    Now,
    /// Fractional days since the last event, never negative.
    DaysAgo(f64),
    /// The stream has no documents.
    Unknown,
}

impl fmt::Display for Recency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recency::Now => f.write_str("now"),
            Recency::DaysAgo(days) => write!(f, "{days:.1}d ago"),
            Recency::Unknown => f.write_str("unknown"),
        }
    }
}

/// Capacity summary of one data stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamReport {
    /// Name of the data stream.
    pub name: String,
    /// Days between the earliest and latest events.
    pub retention_days: f64,
    /// Time since the latest event.
    pub recency: Recency,
    /// Activity classification.
    pub status: Status,
    /// Average bytes ingested per day, zero for stagnant streams.
    pub ingest_per_day: f64,
    /// Total bytes held by the stream.
    pub store_bytes: u64,
    /// `store_bytes` in human units, see [`crate::units::format`].
    pub store_bytes_formatted: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_renders_one_decimal() {
        assert_eq!(Recency::Now.to_string(), "now");
        assert_eq!(Recency::DaysAgo(45.0).to_string(), "45.0d ago");
        assert_eq!(Recency::DaysAgo(3.26).to_string(), "3.3d ago");
        assert_eq!(Recency::Unknown.to_string(), "unknown");
    }

    #[test]
    fn status_labels() {
        assert_eq!(Status::NewShort.to_string(), "NEW_SHORT");
        assert_eq!(Status::Stagnant.as_str(), "STAGNANT");
    }
}
