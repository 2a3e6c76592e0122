//! The dsaudit data stream capacity tool.
//!
//! This library supports the dsaudit binary found elsewhere in this project.
//! It asks an Elasticsearch cluster which data streams exist, gathers the time
//! bounds and on-disk size of each, hands those facts to
//! [`dsaudit_metrics::derive`] and renders the result for an operator.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod audit;
pub mod collector;
pub mod config;
pub mod report;
