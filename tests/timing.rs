mod common;

mod tests {
    use myrtio_led_bus::timing::{
        ChipsetTiming3Phase, ChipsetTiming4Phase, DEFAULT_GAP_TOLERANCE_NS, derive_4phase,
        derive_4phase_with_gap,
    };

    use crate::common::example_timing;

    #[test]
    fn test_derive_example_thresholds() {
        let thresholds = derive_4phase(&example_timing(), 150);

        assert_eq!((thresholds.t0h_min_ns, thresholds.t0h_max_ns), (150, 450));
        assert_eq!((thresholds.t0l_min_ns, thresholds.t0l_max_ns), (750, 1050));
        assert_eq!((thresholds.t1h_min_ns, thresholds.t1h_max_ns), (450, 750));
        assert_eq!((thresholds.t1l_min_ns, thresholds.t1l_max_ns), (450, 750));
        assert_eq!(thresholds.reset_min_us, 280);
        assert_eq!(thresholds.gap_tolerance_ns, DEFAULT_GAP_TOLERANCE_NS);
    }

    #[test]
    fn test_derive_is_deterministic() {
        let timing = ChipsetTiming3Phase::WS2812B;
        assert_eq!(derive_4phase(&timing, 120), derive_4phase(&timing, 120));
        assert_eq!(
            derive_4phase(&timing, 120),
            ChipsetTiming4Phase::from_3phase(&timing, 120)
        );
    }

    #[test]
    fn test_reset_is_not_reduced_by_tolerance() {
        let thresholds = derive_4phase(&ChipsetTiming3Phase::SK6812, 140);
        assert_eq!(thresholds.reset_min_us, 80);
        assert_eq!(thresholds.reset_min_ns(), 80_000);
    }

    #[test]
    fn test_custom_gap_tolerance() {
        let thresholds = derive_4phase_with_gap(&example_timing(), 100, 0);
        assert_eq!(thresholds.gap_tolerance_ns, 0);
        assert_eq!(thresholds.t0h_min_ns, 200);
    }

    #[test]
    fn test_lower_bounds_saturate() {
        let timing = ChipsetTiming3Phase::new("TINY", 100, 300, 100, 50);
        let thresholds = derive_4phase(&timing, 140);
        assert_eq!(thresholds.t0h_min_ns, 0);
        assert_eq!(thresholds.t1l_min_ns, 0);
    }

    #[test]
    fn test_canonical_bit_durations() {
        let timing = example_timing();
        assert_eq!(timing.bit0_high_ns(), 300);
        assert_eq!(timing.bit0_low_ns(), 900);
        assert_eq!(timing.bit1_high_ns(), 600);
        assert_eq!(timing.bit1_low_ns(), 600);
        assert_eq!(timing.period_ns(), 1200);
    }

    #[test]
    fn test_band_overlap_check() {
        let timing = example_timing();
        assert_eq!(timing.max_tolerance_ns(), 149);
        assert!(!derive_4phase(&timing, timing.max_tolerance_ns()).bands_overlap());
        // Touching bands at exactly t2 / 2 are still separable
        assert!(!derive_4phase(&timing, 150).bands_overlap());
        assert!(derive_4phase(&timing, 200).bands_overlap());
    }

    #[test]
    fn test_catalogue_tolerances_are_consistent() {
        for timing in [
            ChipsetTiming3Phase::WS2812,
            ChipsetTiming3Phase::WS2812B,
            ChipsetTiming3Phase::WS2811,
            ChipsetTiming3Phase::WS2813,
            ChipsetTiming3Phase::SK6812,
            ChipsetTiming3Phase::TM1814,
            ChipsetTiming3Phase::UCS1903,
        ] {
            let thresholds = derive_4phase(&timing, timing.max_tolerance_ns());
            assert!(!thresholds.bands_overlap(), "{} bands overlap", timing.name);
        }
    }
}
