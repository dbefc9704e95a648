//! Edge-time decoder
//!
//! Turns a captured sequence of half-pulses back into bytes, MSB first,
//! using the thresholds from [`ChipsetTiming4Phase`].
//!
//! Pairs are walked as (high, low). For each pair:
//! - a low of at least the reset duration ends the frame;
//! - a pair matching one of the bit templates yields that bit;
//! - an unmatched pair whose low is stretched just past the bit bands
//!   (within the gap tolerance) is an inter-word gap left by DMA chunking
//!   and is skipped;
//! - anything else counts as a classification error.
//!
//! Classification errors never abort the frame. More than 10% of errors over
//! all classification attempts is reported after the full traversal.

use core::fmt;

use crate::edge::EdgeTime;
use crate::timing::ChipsetTiming4Phase;

/// Decode failure. Both variants report the bytes already written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// A completed byte did not fit in the output buffer
    BufferOverflow { written: usize },
    /// More than 10% of the classified pairs were not recognised
    HighErrorRate {
        written: usize,
        errors: usize,
        attempts: usize,
    },
}

impl DecodeError {
    /// Bytes written before the error was raised
    pub const fn written(&self) -> usize {
        match self {
            Self::BufferOverflow { written } | Self::HighErrorRate { written, .. } => *written,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferOverflow { written } => {
                write!(f, "output buffer overflow after {} bytes", written)
            }
            Self::HighErrorRate {
                written,
                errors,
                attempts,
            } => write!(
                f,
                "high error rate: {}/{} pulses unrecognised ({} bytes decoded)",
                errors, attempts, written
            ),
        }
    }
}

impl core::error::Error for DecodeError {}

/// Statistics of a completed decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecodeReport {
    pub bytes_written: usize,
    /// Bits successfully classified
    pub bits: usize,
    /// Pairs that matched neither bit template, or had the wrong polarity
    pub errors: usize,
    /// Inter-word gaps that were skipped
    pub gaps: usize,
    /// Whether the frame ended with a reset pulse
    pub reset_seen: bool,
}

impl DecodeReport {
    /// Classification attempts (bits plus errors)
    pub const fn attempts(&self) -> usize {
        self.bits + self.errors
    }

    /// Error rate strictly above 10%
    pub const fn high_error_rate(&self) -> bool {
        self.errors * 10 > self.attempts()
    }
}

/// Decode `edges` into `out`, returning the number of bytes written.
///
/// On [`DecodeError::HighErrorRate`] the decoded bytes are still in `out`.
pub fn decode(
    timing: &ChipsetTiming4Phase,
    edges: &[EdgeTime],
    out: &mut [u8],
) -> Result<usize, DecodeError> {
    let report = decode_with_report(timing, edges, out)?;
    if report.high_error_rate() {
        return Err(DecodeError::HighErrorRate {
            written: report.bytes_written,
            errors: report.errors,
            attempts: report.attempts(),
        });
    }
    Ok(report.bytes_written)
}

/// Decode `edges` into `out` and report statistics without judging quality.
///
/// Only [`DecodeError::BufferOverflow`] is returned from here.
pub fn decode_with_report(
    timing: &ChipsetTiming4Phase,
    edges: &[EdgeTime],
    out: &mut [u8],
) -> Result<DecodeReport, DecodeError> {
    let reset_ns = timing.reset_min_ns();
    let mut report = DecodeReport::default();
    let mut packer = BitPacker::new(out);

    let mut index = 0;
    while index < edges.len() {
        let first = edges[index];

        if !first.high {
            // A run of lows: either the reset (possibly split across several
            // captured halves) or garbage before the next high.
            let mut run_ns = 0u32;
            while index < edges.len() && !edges[index].high {
                run_ns = run_ns.saturating_add(edges[index].duration_ns);
                index += 1;
            }
            if run_ns >= reset_ns {
                report.reset_seen = true;
                break;
            }
            report.errors += 1;
            continue;
        }

        let Some(&second) = edges.get(index + 1) else {
            // Trailing high with no low: the capture was cut short.
            break;
        };

        if second.high {
            report.errors += 1;
            index += 1;
            continue;
        }
        index += 2;

        if second.duration_ns >= reset_ns {
            report.reset_seen = true;
            break;
        }

        match classify(timing, first.duration_ns, second.duration_ns) {
            Some(bit) => {
                report.bits += 1;
                packer.push(bit).map_err(|()| DecodeError::BufferOverflow {
                    written: packer.written,
                })?;
            }
            None if is_gap(timing, second.duration_ns) => report.gaps += 1,
            None => report.errors += 1,
        }
    }

    packer.flush().map_err(|()| DecodeError::BufferOverflow {
        written: packer.written,
    })?;
    report.bytes_written = packer.written;

    Ok(report)
}

/// Classify a pulse pair against both bit templates.
///
/// A low that falls short of the matching band by no more than the gap
/// tolerance is still accepted when the high half identifies the bit.
pub fn classify(timing: &ChipsetTiming4Phase, high_ns: u32, low_ns: u32) -> Option<bool> {
    if timing.is_bit0_high(high_ns) && timing.is_bit0_low(low_ns) {
        return Some(false);
    }
    if timing.is_bit1_high(high_ns) && timing.is_bit1_low(low_ns) {
        return Some(true);
    }

    let gap = timing.gap_tolerance_ns;
    let short = |min: u32, max: u32| low_ns >= min.saturating_sub(gap) && low_ns <= max;
    if timing.is_bit0_high(high_ns) && short(timing.t0l_min_ns, timing.t0l_max_ns) {
        Some(false)
    } else if timing.is_bit1_high(high_ns) && short(timing.t1l_min_ns, timing.t1l_max_ns) {
        Some(true)
    } else {
        None
    }
}

/// A low stretched past a band by no more than the gap tolerance.
///
/// Only consulted for pairs [`classify`] rejected, so a bit whose high half
/// is clear is never dropped as a gap.
fn is_gap(timing: &ChipsetTiming4Phase, low_ns: u32) -> bool {
    if timing.gap_tolerance_ns == 0 || timing.is_bit0_low(low_ns) || timing.is_bit1_low(low_ns) {
        return false;
    }
    let gap = timing.gap_tolerance_ns;
    let stretched = |max: u32| low_ns > max && low_ns <= max.saturating_add(gap);
    stretched(timing.t0l_max_ns) || stretched(timing.t1l_max_ns)
}

/// Packs bits MSB first into successive bytes.
struct BitPacker<'a> {
    out: &'a mut [u8],
    written: usize,
    current: u8,
    bits: u8,
}

impl<'a> BitPacker<'a> {
    fn new(out: &'a mut [u8]) -> Self {
        Self {
            out,
            written: 0,
            current: 0,
            bits: 0,
        }
    }

    fn push(&mut self, bit: bool) -> Result<(), ()> {
        self.current = (self.current << 1) | u8::from(bit);
        self.bits += 1;
        if self.bits == 8 {
            self.store(self.current)?;
            self.current = 0;
            self.bits = 0;
        }
        Ok(())
    }

    /// Write a trailing partial byte, left aligned.
    fn flush(&mut self) -> Result<(), ()> {
        if self.bits == 0 {
            return Ok(());
        }
        let byte = self.current << (8 - self.bits);
        self.current = 0;
        self.bits = 0;
        self.store(byte)
    }

    fn store(&mut self, byte: u8) -> Result<(), ()> {
        let slot = self.out.get_mut(self.written).ok_or(())?;
        *slot = byte;
        self.written += 1;
        Ok(())
    }
}
