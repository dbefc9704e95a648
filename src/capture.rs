//! Capture-side plumbing shared between interrupt context and the poller.
//!
//! [`CaptureSignal`] carries the completion flag and write position using
//! release stores on the producer side and acquire loads on the consumer
//! side. [`CaptureRing`] is a bounded symbol buffer built on
//! `critical-section` and `heapless::Vec` that capture interrupts can push to.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use critical_section::Mutex;
use heapless::Vec;

const DURATION_MASK: u32 = 0x7FFF;
const LEVEL_BIT: u32 = 1 << 15;

/// Largest duration a single pulse half can hold, in ticks
pub const MAX_PULSE_TICKS: u16 = 0x7FFF;

/// Packed two-half pulse symbol, as produced and consumed by RMT-style
/// peripherals.
///
/// Bits 0..=14 hold the first duration and bit 15 its level, bits 16..=30
/// hold the second duration and bit 31 its level. A zero duration marks the
/// end of a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseCode(u32);

impl PulseCode {
    /// Durations above [`MAX_PULSE_TICKS`] are clamped.
    pub const fn new(level0: bool, ticks0: u16, level1: bool, ticks1: u16) -> Self {
        Self(pack_half(level0, ticks0) | (pack_half(level1, ticks1) << 16))
    }

    /// Zero-duration symbol that terminates a capture
    pub const fn end_marker() -> Self {
        Self(0)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn level0(self) -> bool {
        self.0 & LEVEL_BIT != 0
    }

    #[allow(clippy::cast_possible_truncation)]
    pub const fn ticks0(self) -> u16 {
        (self.0 & DURATION_MASK) as u16
    }

    pub const fn level1(self) -> bool {
        (self.0 >> 16) & LEVEL_BIT != 0
    }

    #[allow(clippy::cast_possible_truncation)]
    pub const fn ticks1(self) -> u16 {
        ((self.0 >> 16) & DURATION_MASK) as u16
    }

    /// Both halves as `(level, ticks)` pairs
    pub const fn halves(self) -> [(bool, u16); 2] {
        [(self.level0(), self.ticks0()), (self.level1(), self.ticks1())]
    }
}

const fn pack_half(level: bool, ticks: u16) -> u32 {
    let ticks = if ticks > MAX_PULSE_TICKS {
        MAX_PULSE_TICKS
    } else {
        ticks
    };
    let mut half = ticks as u32;
    if level {
        half |= LEVEL_BIT;
    }
    half
}

/// Convert peripheral ticks to nanoseconds
#[allow(clippy::cast_possible_truncation)]
pub const fn ticks_to_ns(ticks: u32, hz: u32) -> u32 {
    if hz == 0 {
        return 0;
    }
    let ns = (ticks as u64 * 1_000_000_000) / hz as u64;
    if ns > u32::MAX as u64 {
        u32::MAX
    } else {
        ns as u32
    }
}

/// Convert nanoseconds to peripheral ticks, rounding to nearest
#[allow(clippy::cast_possible_truncation)]
pub const fn ns_to_ticks(ns: u32, hz: u32) -> u32 {
    let ticks = (ns as u64 * hz as u64 + 500_000_000) / 1_000_000_000;
    if ticks > u32::MAX as u64 {
        u32::MAX
    } else {
        ticks as u32
    }
}

/// Completion state written from interrupt context and polled by `wait`.
#[derive(Debug)]
pub struct CaptureSignal {
    complete: AtomicBool,
    position: AtomicUsize,
}

impl CaptureSignal {
    /// Create a new signal with nothing written.
    pub const fn new() -> Self {
        Self {
            complete: AtomicBool::new(false),
            position: AtomicUsize::new(0),
        }
    }

    /// Clear completion and rewind the write position.
    pub fn reset(&self) {
        self.position.store(0, Ordering::Release);
        self.complete.store(false, Ordering::Release);
    }

    /// Publish a new write position (producer side).
    pub fn advance_to(&self, position: usize) {
        self.position.store(position, Ordering::Release);
    }

    /// Mark the capture as finished (producer side).
    pub fn complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Number of symbols written so far
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }
}

impl Default for CaptureSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when pushing to a full or closed ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaptureFull(pub PulseCode);

/// Bounded capture buffer shared with interrupt handlers.
///
/// The producer pushes symbols; the ring publishes progress through its
/// [`CaptureSignal`] and completes itself once `limit` symbols are stored.
/// Suitable for a `static`.
pub struct CaptureRing<const N: usize> {
    inner: Mutex<RefCell<RingState<N>>>,
    signal: CaptureSignal,
}

struct RingState<const N: usize> {
    symbols: Vec<PulseCode, N>,
    limit: usize,
}

impl<const N: usize> CaptureRing<N> {
    /// Create a new empty ring accepting up to `N` symbols.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(RingState {
                symbols: Vec::new(),
                limit: N,
            })),
            signal: CaptureSignal::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub const fn signal(&self) -> &CaptureSignal {
        &self.signal
    }

    /// Drop all symbols and accept at most `limit` new ones.
    pub fn restart(&self, limit: usize) {
        critical_section::with(|cs| {
            let mut state = self.inner.borrow(cs).borrow_mut();
            state.symbols.clear();
            state.limit = limit.min(N);
        });
        self.signal.reset();
    }

    /// Store one captured symbol.
    ///
    /// An end marker completes the capture without being stored.
    pub fn push(&self, symbol: PulseCode) -> Result<(), CaptureFull> {
        if self.signal.is_complete() {
            return Err(CaptureFull(symbol));
        }
        if symbol == PulseCode::end_marker() {
            self.signal.complete();
            return Ok(());
        }
        critical_section::with(|cs| {
            let mut state = self.inner.borrow(cs).borrow_mut();
            if state.symbols.len() >= state.limit {
                self.signal.complete();
                return Err(CaptureFull(symbol));
            }
            state.symbols.push(symbol).map_err(CaptureFull)?;
            self.signal.advance_to(state.symbols.len());
            if state.symbols.len() >= state.limit {
                self.signal.complete();
            }
            Ok(())
        })
    }

    /// Mark the capture as finished.
    pub fn close(&self) {
        self.signal.complete();
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow(cs).borrow().symbols.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy stored symbols starting at `offset` into `out`.
    ///
    /// Returns the number of symbols copied.
    pub fn read(&self, offset: usize, out: &mut [PulseCode]) -> usize {
        critical_section::with(|cs| {
            let state = self.inner.borrow(cs).borrow();
            let Some(available) = state.symbols.get(offset..) else {
                return 0;
            };
            let count = available.len().min(out.len());
            out[..count].copy_from_slice(&available[..count]);
            count
        })
    }
}

impl<const N: usize> Default for CaptureRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
