//! Present an [`Audit`] to an operator
//!
//! The presenter never derives anything. It selects and orders rows, then
//! writes them either as a fixed-width table or as a single JSON document.

use std::{cmp::Ordering, fmt, io, str};

use dsaudit_metrics::{Status, StreamReport, units};
use serde::{Deserialize, Serialize};

use crate::audit::{Audit, Row, Summary};

/// Marker printed in the ingest column of stagnant streams.
pub const INACTIVE: &str = "0 (Inactive)";
/// Status printed for streams whose facts could not be fetched.
pub const UNAVAILABLE: &str = "UNAVAILABLE";

const MIN_NAME_WIDTH: usize = 16;
const STATUS_WIDTH: usize = 12;
const SIZE_WIDTH: usize = 14;
const RETENTION_WIDTH: usize = 12;
const LAST_WIDTH: usize = 12;
const INGEST_WIDTH: usize = 16;

/// Errors produced by [`render`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Writing to the output failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Serializing the JSON document failed.
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Output format of the report.
pub enum Format {
    /// Fixed-width table with a totals footer
    #[default]
    Table,
    /// One JSON document holding every row and the totals
    Json,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Format::Table => write!(f, "table"),
            Format::Json => write!(f, "json"),
        }
    }
}

impl str::FromStr for Format {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "table" => Ok(Format::Table),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown format {other:?}, expected table or json")),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Row ordering of the report.
pub enum Sort {
    /// The order in which the cluster listed the streams
    #[default]
    Listed,
    /// Highest daily ingestion first, unavailable streams last
    Ingest,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Sort::Listed => write!(f, "listed"),
            Sort::Ingest => write!(f, "ingest"),
        }
    }
}

impl str::FromStr for Sort {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "listed" => Ok(Sort::Listed),
            "ingest" => Ok(Sort::Ingest),
            other => Err(format!("unknown sort {other:?}, expected listed or ingest")),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration for [`render`]
pub struct Config {
    /// Output format
    #[serde(default)]
    pub format: Format,
    /// Row ordering
    #[serde(default)]
    pub sort: Sort,
    /// Leave stagnant streams out of the report and its totals
    #[serde(default)]
    pub exclude_stagnant: bool,
}

#[derive(Serialize)]
struct Document<'a> {
    #[serde(with = "time::serde::rfc3339")]
    generated_at: time::OffsetDateTime,
    rows: &'a [&'a Row],
    summary: Summary,
}

/// Rows of `audit` selected and ordered as `config` asks.
#[must_use]
pub fn view<'a>(audit: &'a Audit, config: &Config) -> Vec<&'a Row> {
    let mut rows: Vec<&Row> = audit
        .rows
        .iter()
        .filter(|row| {
            !(config.exclude_stagnant
                && row
                    .report()
                    .is_some_and(|report| report.status == Status::Stagnant))
        })
        .collect();
    if config.sort == Sort::Ingest {
        rows.sort_by(|left, right| by_ingest_descending(left, right));
    }
    rows
}

fn by_ingest_descending(left: &Row, right: &Row) -> Ordering {
    match (left.report(), right.report()) {
        (Some(l), Some(r)) => r.ingest_per_day.total_cmp(&l.ingest_per_day),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Write `audit` to `out`.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn render<W>(audit: &Audit, config: &Config, out: &mut W) -> Result<(), Error>
where
    W: io::Write,
{
    let rows = view(audit, config);
    let summary = Summary::of(rows.iter().copied());
    match config.format {
        Format::Table => render_table(&rows, &summary, config, out)?,
        Format::Json => {
            let document = Document {
                generated_at: audit.now,
                rows: &rows,
                summary,
            };
            serde_json::to_writer_pretty(&mut *out, &document)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn render_table<W>(
    rows: &[&Row],
    summary: &Summary,
    config: &Config,
    out: &mut W,
) -> Result<(), io::Error>
where
    W: io::Write,
{
    let name_width = rows
        .iter()
        .map(|row| row.name().chars().count() + 2)
        .max()
        .unwrap_or_default()
        .max(MIN_NAME_WIDTH);
    let rule = "-".repeat(
        name_width + STATUS_WIDTH + SIZE_WIDTH + RETENTION_WIDTH + LAST_WIDTH + INGEST_WIDTH,
    );

    let title = if config.exclude_stagnant {
        "=== DATA STREAM ACTIVITY ANALYSIS (NON-STAGNANT ONLY) ==="
    } else {
        "=== DATA STREAM ACTIVITY ANALYSIS ==="
    };
    writeln!(out, "{title}")?;
    writeln!(
        out,
        "{:<name_width$}{:<STATUS_WIDTH$}{:>SIZE_WIDTH$}{:>RETENTION_WIDTH$}{:>LAST_WIDTH$}{:>INGEST_WIDTH$}",
        "Name", "Status", "Stream Size", "Retention", "Last Data", "Ingest/Day",
    )?;
    writeln!(out, "{rule}")?;

    for row in rows {
        match row {
            Row::Report(report) => {
                let retention = format!("{:.1} d", report.retention_days);
                writeln!(
                    out,
                    "{:<name_width$}{:<STATUS_WIDTH$}{:>SIZE_WIDTH$}{:>RETENTION_WIDTH$}{:>LAST_WIDTH$}{:>INGEST_WIDTH$}",
                    report.name,
                    report.status.as_str(),
                    report.store_bytes_formatted,
                    retention,
                    report.recency.to_string(),
                    ingest_cell(report),
                )?;
            }
            Row::Unavailable { name, reason } => {
                writeln!(
                    out,
                    "{:<name_width$}{:<STATUS_WIDTH$}{:>SIZE_WIDTH$}{:>RETENTION_WIDTH$}{:>LAST_WIDTH$}{:>INGEST_WIDTH$}",
                    name, UNAVAILABLE, "-", "-", "-", "-",
                )?;
                writeln!(out, "  ({reason})")?;
            }
        }
    }

    writeln!(out, "{rule}")?;
    writeln!(
        out,
        "TOTAL STORE SIZE                      : {}",
        units::format(summary.total_store_bytes)
    )?;
    writeln!(
        out,
        "ESTIMATED ACTIVE DATA INGESTION PER DAY: {}",
        units::format_f64(summary.active_ingest_per_day)
    )?;
    writeln!(
        out,
        "DATA STREAMS                          : {} (active {}, new/short {}, stagnant {}, empty {}, unavailable {})",
        summary.streams,
        summary.active,
        summary.new_short,
        summary.stagnant,
        summary.empty,
        summary.unavailable,
    )?;
    Ok(())
}

fn ingest_cell(report: &StreamReport) -> String {
    match report.status {
        Status::Stagnant => INACTIVE.to_string(),
        Status::Active | Status::NewShort | Status::Empty => {
            units::format_f64(report.ingest_per_day)
        }
    }
}
