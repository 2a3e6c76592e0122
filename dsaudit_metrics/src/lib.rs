//! Capacity metrics for data streams
//!
//! This library turns the raw facts known about a data stream -- its earliest
//! and latest event timestamps plus the bytes it occupies on disk -- into a
//! [`StreamReport`]: how long the stream retains data, how recently it was
//! written to, how fast it grows and whether it is still active at all.
//!
//! Nothing here performs I/O. [`derive`] is a pure function and is safe to call
//! from any number of tasks at once.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

mod derive;
mod report;
mod thresholds;
pub mod units;

pub use derive::{classify, derive};
pub use report::{Recency, Status, StreamFacts, StreamReport};
pub use thresholds::{Error, Thresholds};

/// Number of seconds in one day, the unit every span in this crate is
/// expressed in.
pub const SECONDS_PER_DAY: f64 = 86_400.0;
