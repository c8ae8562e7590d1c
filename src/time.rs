//! Time constants and rounding helpers shared across the interval algebra, strategies, and
//! the report/validator modules.
//!
//! All external times are "round-3" (at most three decimal digits). Internal comparisons use
//! explicit tolerances rather than exact float equality.

/// Adjacency tolerance: two intervals separated by no more than this are considered touching.
pub const ADJACENCY_EPS: f64 = 1e-3;

/// Duration-consistency tolerance: `|duration - (end - start)|` must stay within this bound.
pub const DURATION_EPS: f64 = 2e-3;

/// Tolerance for the round-3 approximation check (`value * 1000` within this of an integer).
pub const ROUND3_EPS: f64 = 1e-6;

/// Round a time value to 3 decimal places, the external serialization precision for every time
/// field this crate emits.
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Round a value to 6 decimal places, used for `rms`.
pub fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

/// Round a value to 2 decimal places, used for `energy_db`.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// True when `value * 1000` is within [`ROUND3_EPS`] of an integer.
pub fn is_round3(value: f64) -> bool {
    let scaled = value * 1000.0;
    (scaled - scaled.round()).abs() <= ROUND3_EPS
}

/// Sanitize a path component for use as a directory name: replace the characters that are
/// invalid (or awkward) across common filesystems with `_`.
pub fn sanitize_path_component(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round3_matches_spec_precision() {
        assert_eq!(round3(1.23456), 1.235);
        assert_eq!(round3(0.0), 0.0);
    }

    #[test]
    fn is_round3_accepts_exact_millis() {
        assert!(is_round3(1.235));
        assert!(!is_round3(1.2345));
    }

    #[test]
    fn sanitize_path_component_replaces_reserved_chars() {
        assert_eq!(sanitize_path_component("a/b:c*d?e\"f<g>h|i\\j"), "a_b_c_d_e_f_g_h_i_j");
    }
}
