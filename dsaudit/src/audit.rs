//! Run a capacity audit over every data stream
//!
//! The audit lists the streams of a cluster once, then fetches the facts of up
//! to `max_workers` streams at a time. Results come back in listing order no
//! matter which fetch completes first. A stream whose facts cannot be fetched,
//! even after retries, becomes a [`Row::Unavailable`] and the audit carries on.

use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use dsaudit_metrics::{Status, StreamFacts, StreamReport, Thresholds, derive};
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::collector::{Collector, ConnectivityError, FetchError};

fn default_max_workers() -> NonZeroUsize {
    NonZeroUsize::new(5).expect("5 is non-zero")
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_milliseconds() -> u64 {
    1_000
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration for [`run`]
pub struct Config {
    /// Number of streams whose facts are fetched concurrently
    #[serde(default = "default_max_workers")]
    pub max_workers: NonZeroUsize,
    /// Extra attempts made for a stream after a retryable failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between attempts, multiplied by the attempt number
    #[serde(default = "default_retry_backoff_milliseconds")]
    pub retry_backoff_milliseconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            retry_backoff_milliseconds: default_retry_backoff_milliseconds(),
        }
    }
}

/// One line of an audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Row {
    /// Facts were fetched and a report derived.
    Report(StreamReport),
    /// The stream's facts could not be fetched.
    Unavailable {
        /// Name of the data stream
        name: String,
        /// Why the fetch failed
        reason: String,
    },
}

impl Row {
    /// Name of the data stream this row describes.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Row::Report(report) => &report.name,
            Row::Unavailable { name, .. } => name,
        }
    }

    /// The derived report, if facts were available.
    #[must_use]
    pub fn report(&self) -> Option<&StreamReport> {
        match self {
            Row::Report(report) => Some(report),
            Row::Unavailable { .. } => None,
        }
    }
}

/// Totals over a set of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Number of rows
    pub streams: usize,
    /// Bytes stored by every stream with a report
    pub total_store_bytes: u64,
    /// Daily ingestion summed over [`Status::Active`] streams
    pub active_ingest_per_day: f64,
    /// Streams classified [`Status::Active`]
    pub active: usize,
    /// Streams classified [`Status::Stagnant`]
    pub stagnant: usize,
    /// Streams classified [`Status::NewShort`]
    pub new_short: usize,
    /// Streams classified [`Status::Empty`]
    pub empty: usize,
    /// Streams whose facts could not be fetched
    pub unavailable: usize,
}

impl Summary {
    /// Tally `rows`.
    #[must_use]
    pub fn of<'a>(rows: impl IntoIterator<Item = &'a Row>) -> Self {
        let mut summary = Self::default();
        for row in rows {
            summary.streams += 1;
            let Some(report) = row.report() else {
                summary.unavailable += 1;
                continue;
            };
            summary.total_store_bytes = summary
                .total_store_bytes
                .saturating_add(report.store_bytes);
            match report.status {
                Status::Active => {
                    summary.active += 1;
                    summary.active_ingest_per_day += report.ingest_per_day;
                }
                Status::Stagnant => summary.stagnant += 1,
                Status::NewShort => summary.new_short += 1,
                Status::Empty => summary.empty += 1,
            }
        }
        summary
    }
}

/// The outcome of an audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Audit {
    /// The instant every report was derived against
    #[serde(with = "time::serde::rfc3339")]
    pub now: OffsetDateTime,
    /// One row per listed stream, in listing order
    pub rows: Vec<Row>,
}

impl Audit {
    /// Totals over every row.
    #[must_use]
    pub fn summary(&self) -> Summary {
        Summary::of(&self.rows)
    }
}

/// Audit every data stream known to `collector` as of the current time.
///
/// # Errors
///
/// Returns an error only if the streams cannot be listed. Failures fetching
/// individual streams are recorded as [`Row::Unavailable`].
pub async fn run<C>(
    collector: &C,
    config: &Config,
    thresholds: &Thresholds,
) -> Result<Audit, ConnectivityError>
where
    C: Collector + ?Sized,
{
    run_at(collector, config, thresholds, OffsetDateTime::now_utc()).await
}

/// As [`run`], deriving every report against `now`.
///
/// # Errors
///
/// See [`run`].
pub async fn run_at<C>(
    collector: &C,
    config: &Config,
    thresholds: &Thresholds,
    now: OffsetDateTime,
) -> Result<Audit, ConnectivityError>
where
    C: Collector + ?Sized,
{
    let names = collector.list_streams().await?;
    let total = names.len();
    info!(
        "{total} data streams, {workers} parallel workers",
        workers = config.max_workers
    );

    let completed = AtomicUsize::new(0);
    let completed = &completed;
    let rows: Vec<Row> = stream::iter(names)
        .map(|name| async move {
            let outcome = fetch_with_retry(collector, &name, config).await;
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            match outcome {
                Ok(facts) => {
                    let report = derive(&facts, now, thresholds);
                    info!("[{done}/{total}] {name} {status}", status = report.status);
                    Row::Report(report)
                }
                Err(err) => {
                    warn!("[{done}/{total}] {name} UNAVAILABLE: {err}");
                    Row::Unavailable {
                        name,
                        reason: err.to_string(),
                    }
                }
            }
        })
        .buffered(config.max_workers.get())
        .collect()
        .await;

    Ok(Audit { now, rows })
}

async fn fetch_with_retry<C>(
    collector: &C,
    name: &str,
    config: &Config,
) -> Result<StreamFacts, FetchError>
where
    C: Collector + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match collector.fetch_facts(name).await {
            Ok(facts) => return Ok(checked(facts, name)),
            Err(err) if err.is_retryable() && attempt <= config.max_retries => {
                let backoff = Duration::from_millis(
                    config
                        .retry_backoff_milliseconds
                        .saturating_mul(u64::from(attempt)),
                );
                warn!("{name}: attempt {attempt} failed ({err}), retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Enforce the invariants of [`StreamFacts`] at the collector boundary.
fn checked(mut facts: StreamFacts, name: &str) -> StreamFacts {
    if facts.name != name {
        warn!(
            "collector answered for {reported} when asked for {name}",
            reported = facts.name
        );
        facts.name = name.to_string();
    }
    if facts.min_timestamp.is_some() != facts.max_timestamp.is_some() {
        warn!("{name}: only one time bound present, treating stream as empty");
        facts.min_timestamp = None;
        facts.max_timestamp = None;
    }
    facts
}
