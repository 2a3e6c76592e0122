//! Classification thresholds
//!
//! The rules that sort a stream into [`crate::Status`] buckets depend on three
//! numbers. They are kept here, with their defaults, so that the rules can be
//! audited and exercised without a cluster in sight.

use serde::{Deserialize, Serialize};

/// Errors produced by [`Thresholds::new`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// A threshold was negative, NaN or infinite.
    #[error("threshold {name} must be a finite, non-negative number of days, got {value}")]
    NotFinite {
        /// Name of the offending threshold
        name: &'static str,
        /// The rejected value
        value: f64,
    },
    /// The "now" window reaches past the staleness threshold.
    #[error(
        "now_within_days ({now_within}) must be below stagnant_after_days ({stagnant_after})"
    )]
    NowBeyondStagnant {
        /// Configured "now" window
        now_within: f64,
        /// Configured staleness threshold
        stagnant_after: f64,
    },
}

fn default_stagnant_after_days() -> f64 {
    3.0
}

fn default_short_lived_below_days() -> f64 {
    5.0
}

fn default_now_within_days() -> f64 {
    0.05
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Thresholds, in days, used by [`crate::derive`].
pub struct Thresholds {
    /// A stream whose last event is older than this many days is stagnant.
    #[serde(default = "default_stagnant_after_days")]
    pub stagnant_after_days: f64,
    /// A stream retaining less than this many days of data is short-lived.
    #[serde(default = "default_short_lived_below_days")]
    pub short_lived_below_days: f64,
    /// Last events younger than this many days are reported as "now".
    #[serde(default = "default_now_within_days")]
    pub now_within_days: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stagnant_after_days: default_stagnant_after_days(),
            short_lived_below_days: default_short_lived_below_days(),
            now_within_days: default_now_within_days(),
        }
    }
}

impl Thresholds {
    /// Create a validated set of thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error if any threshold is negative or not finite, or if the
    /// "now" window is not strictly below the staleness threshold.
    pub fn new(
        stagnant_after_days: f64,
        short_lived_below_days: f64,
        now_within_days: f64,
    ) -> Result<Self, Error> {
        let thresholds = Self {
            stagnant_after_days,
            short_lived_below_days,
            now_within_days,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Check values that arrived by way of deserialization.
    ///
    /// # Errors
    ///
    /// See [`Thresholds::new`].
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("stagnant_after_days", self.stagnant_after_days),
            ("short_lived_below_days", self.short_lived_below_days),
            ("now_within_days", self.now_within_days),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::NotFinite { name, value });
            }
        }
        if self.now_within_days >= self.stagnant_after_days {
            return Err(Error::NowBeyondStagnant {
                now_within: self.now_within_days,
                stagnant_after: self.stagnant_after_days,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let thresholds = Thresholds::default();
        assert!(thresholds.validate().is_ok());
        assert!((thresholds.stagnant_after_days - 3.0).abs() < f64::EPSILON);
        assert!((thresholds.short_lived_below_days - 5.0).abs() < f64::EPSILON);
        assert!((thresholds.now_within_days - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_negative_and_nan() {
        assert_eq!(
            Thresholds::new(-1.0, 5.0, 0.05),
            Err(Error::NotFinite {
                name: "stagnant_after_days",
                value: -1.0
            })
        );
        assert!(matches!(
            Thresholds::new(3.0, f64::NAN, 0.05),
            Err(Error::NotFinite {
                name: "short_lived_below_days",
                ..
            })
        ));
    }

    #[test]
    fn rejects_now_window_past_staleness() {
        assert!(matches!(
            Thresholds::new(1.0, 5.0, 2.0),
            Err(Error::NowBeyondStagnant { .. })
        ));
    }
}
