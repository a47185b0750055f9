//! crates/cognify_core/src/progress.rs
//!
//! Mastery tracking over evaluation outcomes. Counters live in the session
//! store and are monotonic: outcomes are never retracted or revised once
//! recorded. This module holds the pure derivation.

/// Mastery ratio: fraction of evaluated answers marked correct.
///
/// Returns `None` when nothing has been evaluated, so a fresh session renders
/// as "no data" rather than 0%.
pub fn mastery_ratio(correct: u32, total: u32) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(f64::from(correct) / f64::from(total))
}

/// Mastery as a whole percentage, for display surfaces that want an integer.
pub fn mastery_percent(correct: u32, total: u32) -> Option<u32> {
    mastery_ratio(correct, total).map(|r| (r * 100.0).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_evaluations_is_no_data() {
        assert_eq!(mastery_ratio(0, 0), None);
        assert_eq!(mastery_percent(0, 0), None);
    }

    #[test]
    fn ratio_is_correct_over_total() {
        assert_eq!(mastery_ratio(3, 4), Some(0.75));
        assert_eq!(mastery_ratio(0, 5), Some(0.0));
        assert_eq!(mastery_ratio(5, 5), Some(1.0));
    }

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(mastery_percent(1, 3), Some(33));
        assert_eq!(mastery_percent(2, 3), Some(67));
    }
}
