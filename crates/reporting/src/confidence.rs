//! Confidence scoring: maps a signal type and its sample size to 0..=100.

use attribution_core::types::SignalType;

/// Scale in `[0.5, 1.0]` that discounts small samples.
///
/// `0.5` with no sample, `1.0` from 99 observations upwards.
pub fn sample_size_factor(sample_size: f64) -> f64 {
    if sample_size <= 0.0 {
        return 0.5;
    }
    (0.5 + 0.5 * ((sample_size + 1.0).log10() / 2.0)).min(1.0)
}

/// Sample-size adjusted confidence, never above `base_confidence`.
pub fn calculate_confidence(base_confidence: u8, sample_size: f64) -> u8 {
    let score = (f64::from(base_confidence) * sample_size_factor(sample_size)).round();
    score.clamp(0.0, 100.0) as u8
}

/// Confidence for a directly observed signal. Click-id matches are ground
/// truth and never discounted.
pub fn signal_confidence(signal_type: SignalType, sample_size: f64) -> u8 {
    match signal_type {
        SignalType::ClickId => SignalType::ClickId.base_confidence(),
        other => calculate_confidence(other.base_confidence(), sample_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sample_halves_base() {
        assert_eq!(calculate_confidence(95, 0.0), 48);
        assert_eq!(calculate_confidence(70, 0.0), 35);
        assert_eq!(calculate_confidence(85, -3.0), 43);
    }

    #[test]
    fn test_large_sample_reaches_base() {
        assert_eq!(calculate_confidence(95, 99.0), 95);
        assert_eq!(calculate_confidence(90, 10_000.0), 90);
    }

    #[test]
    fn test_small_sample_is_discounted() {
        // factor(1) = 0.5 + 0.5 * log10(2) / 2 ~= 0.575
        assert_eq!(calculate_confidence(100, 1.0), 58);
        assert_eq!(calculate_confidence(70, 5.0), 49);
    }

    #[test]
    fn test_monotonic_in_sample_size() {
        for base in [0u8, 50, 65, 70, 85, 90, 95, 100] {
            let mut previous = calculate_confidence(base, 1.0);
            for n in 2..500 {
                let current = calculate_confidence(base, f64::from(n));
                assert!(current >= previous, "base {base} dropped at n={n}");
                assert!(current <= base);
                previous = current;
            }
        }
    }

    #[test]
    fn test_click_id_is_never_discounted() {
        assert_eq!(signal_confidence(SignalType::ClickId, 1.0), 100);
        assert_eq!(signal_confidence(SignalType::ClickId, 0.0), 100);
        assert_eq!(signal_confidence(SignalType::Direct, 500.0), 0);
        assert_eq!(signal_confidence(SignalType::PlatformOnly, 200.0), 70);
    }
}
