//! Transmit-side waveform generation
//!
//! Produces the canonical waveform for a byte stream, either as edge times
//! (for replay into a receive channel) or as packed pulse codes (for
//! RMT-style peripherals).

use core::fmt;

use crate::capture::{MAX_PULSE_TICKS, PulseCode, ns_to_ticks};
use crate::edge::EdgeTime;
use crate::timing::ChipsetTiming3Phase;

/// Error returned when the output buffer cannot hold the waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// The destination needs at least `needed` entries
    BufferTooSmall { needed: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { needed } => {
                write!(f, "output buffer too small, {} entries needed", needed)
            }
        }
    }
}

impl core::error::Error for EncodeError {}

/// Number of edges [`encode_edges`] writes for `byte_count` bytes
pub const fn edge_count(byte_count: usize) -> usize {
    byte_count * 16 + 1
}

/// Number of pulse codes [`encode_pulses`] writes for `byte_count` bytes
pub const fn pulse_count(byte_count: usize) -> usize {
    byte_count * 8 + 2
}

/// Encode bytes as canonical edge pairs, MSB first.
///
/// Every bit becomes a high edge followed by a low edge. The frame ends with
/// a single low edge of the reset duration.
pub fn encode_edges(
    timing: &ChipsetTiming3Phase,
    bytes: &[u8],
    out: &mut [EdgeTime],
) -> Result<usize, EncodeError> {
    let needed = edge_count(bytes.len());
    if out.len() < needed {
        return Err(EncodeError::BufferTooSmall { needed });
    }

    let bit0 = [EdgeTime::high(timing.bit0_high_ns()), EdgeTime::low(timing.bit0_low_ns())];
    let bit1 = [EdgeTime::high(timing.bit1_high_ns()), EdgeTime::low(timing.bit1_low_ns())];

    let mut slots = out.chunks_exact_mut(2);
    for &byte in bytes {
        for position in [128, 64, 32, 16, 8, 4, 2, 1] {
            if let Some(slot) = slots.next() {
                slot.copy_from_slice(if byte & position == 0 { &bit0 } else { &bit1 });
            }
        }
    }
    out[needed - 1] = EdgeTime::low(timing.reset_ns());

    Ok(needed)
}

/// Encode bytes as pulse codes for a peripheral clocked at `hz`.
///
/// One symbol per bit, then a low reset symbol and an end marker. Reset
/// periods longer than one symbol half are split across both halves and
/// clamped.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_pulses(
    timing: &ChipsetTiming3Phase,
    bytes: &[u8],
    hz: u32,
    out: &mut [PulseCode],
) -> Result<usize, EncodeError> {
    let needed = pulse_count(bytes.len());
    if out.len() < needed {
        return Err(EncodeError::BufferTooSmall { needed });
    }

    let ticks = |ns: u32| ns_to_ticks(ns, hz).min(u32::from(MAX_PULSE_TICKS)) as u16;
    let bit0 = PulseCode::new(true, ticks(timing.bit0_high_ns()), false, ticks(timing.bit0_low_ns()));
    let bit1 = PulseCode::new(true, ticks(timing.bit1_high_ns()), false, ticks(timing.bit1_low_ns()));

    let mut slots = out.iter_mut();
    for &byte in bytes {
        for position in [128, 64, 32, 16, 8, 4, 2, 1] {
            if let Some(slot) = slots.next() {
                *slot = if byte & position == 0 { bit0 } else { bit1 };
            }
        }
    }

    let reset_ticks = ns_to_ticks(timing.reset_ns(), hz);
    let first = reset_ticks.min(u32::from(MAX_PULSE_TICKS)) as u16;
    let second = reset_ticks
        .saturating_sub(u32::from(first))
        .clamp(1, u32::from(MAX_PULSE_TICKS)) as u16;
    out[needed - 2] = PulseCode::new(false, first.max(1), false, second);
    out[needed - 1] = PulseCode::end_marker();

    Ok(needed)
}
