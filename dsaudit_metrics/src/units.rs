//! Human scaled byte counts
//!
//! Sizes are scaled by powers of 1024 and labelled with the short unit names
//! operators read in cluster tooling: `B`, `KB`, `MB`, `GB`, `TB`.

const KIB: u64 = 1024;
const SCALED_UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Render `bytes` in the largest unit whose scaled value is at least one.
///
/// Values below 1024 are printed as whole bytes, everything else with two
/// decimal places. Terabytes are the largest unit; petabyte-sized inputs are
/// shown as thousands of terabytes.
#[must_use]
pub fn format(bytes: u64) -> String {
    if bytes < KIB {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / KIB as f64;
    let mut unit = 0;
    while value >= KIB as f64 && unit < SCALED_UNITS.len() - 1 {
        value /= KIB as f64;
        unit += 1;
    }
    format!("{value:.2} {}", SCALED_UNITS[unit])
}

/// As [`format`] for a fractional byte count, such as a daily rate.
///
/// Negative and non-finite inputs are clamped to zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_f64(bytes: f64) -> String {
    if !bytes.is_finite() || bytes <= 0.0 {
        return format(0);
    }
    // `as` saturates at u64::MAX.
    format(bytes.round() as u64)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn whole_bytes_below_one_kilobyte() {
        assert_eq!(format(0), "0 B");
        assert_eq!(format(1), "1 B");
        assert_eq!(format(1023), "1023 B");
    }

    #[test]
    fn scales_to_largest_unit() {
        assert_eq!(format(1024), "1.00 KB");
        assert_eq!(format(1536), "1.50 KB");
        assert_eq!(format(1024 * 1024), "1.00 MB");
        assert_eq!(format(512 * 1024 * 1024), "512.00 MB");
        assert_eq!(format(1024 * 1024 * 1024), "1.00 GB");
        assert_eq!(format(50 * 1024 * 1024 * 1024), "50.00 GB");
        assert_eq!(format(2 * 1024_u64.pow(4)), "2.00 TB");
    }

    #[test]
    fn terabytes_cap_the_scale() {
        assert_eq!(format(1024_u64.pow(5)), "1024.00 TB");
    }

    #[test]
    fn fractional_inputs_round_to_whole_bytes() {
        assert_eq!(format_f64(0.4), "0 B");
        assert_eq!(format_f64(-10.0), "0 B");
        assert_eq!(format_f64(f64::NAN), "0 B");
        assert_eq!(format_f64(1023.6), "1.00 KB");
    }

    fn unit_of(rendered: &str) -> &str {
        rendered
            .rsplit(' ')
            .next()
            .expect("rendered size always carries a unit")
    }

    proptest! {
        #[test]
        fn unit_is_largest_with_scaled_value_at_least_one(bytes in any::<u64>()) {
            let rendered = format(bytes);
            let expected = match bytes {
                b if b < KIB => "B",
                b if b < KIB.pow(2) => "KB",
                b if b < KIB.pow(3) => "MB",
                b if b < KIB.pow(4) => "GB",
                _ => "TB",
            };
            prop_assert_eq!(unit_of(&rendered), expected);
        }

        #[test]
        fn base_unit_renders_as_integer(bytes in 0..KIB) {
            prop_assert_eq!(format(bytes), bytes.to_string() + " B");
        }
    }
}
