//! Derivation of a [`StreamReport`] from [`StreamFacts`].

use time::OffsetDateTime;

use crate::{Recency, SECONDS_PER_DAY, Status, StreamFacts, StreamReport, Thresholds, units};

/// Derive the capacity report for one stream as seen at `now`.
///
/// The function is total. Facts that break their own invariants are clamped
/// rather than rejected: a latest event before the earliest yields zero
/// retention and a latest event in the future is treated as happening `now`.
///
/// Rules, in order:
///
/// * no timestamps: [`Status::Empty`], zero rate, unknown recency
/// * last event older than `stagnant_after_days`: [`Status::Stagnant`], the
///   rate is forced to zero
/// * retention below `short_lived_below_days`: [`Status::NewShort`]
/// * otherwise [`Status::Active`]
///
/// A non-stagnant stream with zero retention reports all of its bytes as one
/// day of ingestion.
#[must_use]
pub fn derive(facts: &StreamFacts, now: OffsetDateTime, thresholds: &Thresholds) -> StreamReport {
    let store_bytes_formatted = units::format(facts.store_bytes);

    let (Some(oldest), Some(newest)) = (facts.min_timestamp, facts.max_timestamp) else {
        return StreamReport {
            name: facts.name.clone(),
            retention_days: 0.0,
            recency: Recency::Unknown,
            status: Status::Empty,
            ingest_per_day: 0.0,
            store_bytes: facts.store_bytes,
            store_bytes_formatted,
        };
    };

    let retention_days = days_between(oldest, newest);
    let days_since_last = days_between(newest, now);

    let recency = if days_since_last < thresholds.now_within_days {
        Recency::Now
    } else {
        Recency::DaysAgo(days_since_last)
    };
    let status = classify(retention_days, days_since_last, thresholds);
    let ingest_per_day = ingest_per_day(status, retention_days, facts.store_bytes);

    StreamReport {
        name: facts.name.clone(),
        retention_days,
        recency,
        status,
        ingest_per_day,
        store_bytes: facts.store_bytes,
        store_bytes_formatted,
    }
}

/// Classify a stream that holds documents.
///
/// Staleness is checked before youth: a stream that is both short-lived and
/// stale is [`Status::Stagnant`]. This never returns [`Status::Empty`].
#[must_use]
pub fn classify(retention_days: f64, days_since_last: f64, thresholds: &Thresholds) -> Status {
    if days_since_last > thresholds.stagnant_after_days {
        Status::Stagnant
    } else if retention_days < thresholds.short_lived_below_days {
        Status::NewShort
    } else {
        Status::Active
    }
}

fn ingest_per_day(status: Status, retention_days: f64, store_bytes: u64) -> f64 {
    match status {
        Status::Stagnant | Status::Empty => 0.0,
        // Everything landed in one instant, count it as a single day.
        Status::Active | Status::NewShort if retention_days <= 0.0 => store_bytes as f64,
        Status::Active | Status::NewShort => store_bytes as f64 / retention_days,
    }
}

/// Days from `earlier` to `later`, clamped at zero.
fn days_between(earlier: OffsetDateTime, later: OffsetDateTime) -> f64 {
    let days = (later - earlier).as_seconds_f64() / SECONDS_PER_DAY;
    days.max(0.0)
}
