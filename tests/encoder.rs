mod common;

mod tests {
    use myrtio_led_bus::encoder::{EncodeError, edge_count, encode_edges, encode_pulses, pulse_count};
    use myrtio_led_bus::{ChipsetTiming3Phase, ColorOrder, EdgeTime, FrameBytes, PulseCode, Rgb};

    use crate::common::{byte_edges, example_timing};

    #[test]
    fn test_encode_edges_layout() {
        let timing = example_timing();
        let mut out = [EdgeTime::default(); edge_count(2)];
        let count = encode_edges(&timing, &[0x80, 0x01], &mut out).unwrap();

        assert_eq!(count, 33);
        assert_eq!(out[0], EdgeTime::high(600));
        assert_eq!(out[1], EdgeTime::low(600));
        assert_eq!(out[2], EdgeTime::high(300));
        assert_eq!(out[3], EdgeTime::low(900));
        assert_eq!(&out[..32], byte_edges(&timing, &[0x80, 0x01]).as_slice());
        assert_eq!(out[32], EdgeTime::low(280_000));
    }

    #[test]
    fn test_encode_edges_buffer_too_small() {
        let mut out = [EdgeTime::default(); 16];
        assert_eq!(
            encode_edges(&example_timing(), &[0xFF], &mut out),
            Err(EncodeError::BufferTooSmall { needed: 17 })
        );
    }

    #[test]
    fn test_encode_pulses_at_40mhz() {
        let timing = ChipsetTiming3Phase::WS2812B;
        let mut out = [PulseCode::end_marker(); pulse_count(1)];
        let count = encode_pulses(&timing, &[0x80], 40_000_000, &mut out).unwrap();

        assert_eq!(count, 10);
        assert_eq!(out[0], PulseCode::new(true, 34, false, 16));
        assert_eq!(out[1], PulseCode::new(true, 16, false, 34));
        assert_eq!(out[8], PulseCode::new(false, 11_200, false, 1));
        assert_eq!(out[9], PulseCode::end_marker());
    }

    #[test]
    fn test_long_reset_spills_into_second_half() {
        let timing = ChipsetTiming3Phase::WS2812B;
        let mut out = [PulseCode::end_marker(); pulse_count(0)];
        let count = encode_pulses(&timing, &[], 160_000_000, &mut out).unwrap();

        // 280 µs at 160 MHz is 44800 ticks
        assert_eq!(count, 2);
        assert_eq!(out[0], PulseCode::new(false, 32_767, false, 12_033));
        assert_eq!(out[1], PulseCode::end_marker());
    }

    #[test]
    fn test_encode_pulses_buffer_too_small() {
        let mut out = [PulseCode::end_marker(); 9];
        assert_eq!(
            encode_pulses(&ChipsetTiming3Phase::SK6812, &[0x00], 40_000_000, &mut out),
            Err(EncodeError::BufferTooSmall { needed: 10 })
        );
    }

    #[test]
    fn test_color_order() {
        let color = Rgb::new(1, 2, 3);
        assert_eq!(ColorOrder::Rgb.apply(color), [1, 2, 3]);
        assert_eq!(ColorOrder::Rbg.apply(color), [1, 3, 2]);
        assert_eq!(ColorOrder::Grb.apply(color), [2, 1, 3]);
        assert_eq!(ColorOrder::Gbr.apply(color), [2, 3, 1]);
        assert_eq!(ColorOrder::Brg.apply(color), [3, 1, 2]);
        assert_eq!(ColorOrder::Bgr.apply(color), [3, 2, 1]);
        assert_eq!(ColorOrder::default(), ColorOrder::Rgb);
    }

    #[test]
    fn test_frame_bytes() {
        let pixels = [Rgb::new(0x10, 0x20, 0x30), Rgb::new(0xA0, 0xB0, 0xC0)];
        let mut bytes = FrameBytes::new(&pixels, ColorOrder::Grb);
        assert_eq!(bytes.len(), 6);

        assert_eq!(bytes.next(), Some(0x20));
        assert_eq!(bytes.len(), 5);
        let rest: Vec<u8> = bytes.collect();
        assert_eq!(rest, [0x10, 0x30, 0xB0, 0xA0, 0xC0]);

        assert_eq!(FrameBytes::new(&[], ColorOrder::Bgr).count(), 0);
    }
}
