//! Loopback validation
//!
//! Drives one transmit engine against a receive channel wired to the same
//! line and checks that what comes back decodes to what was sent. Only the
//! first lane of a multi-lane setup can be read back this way, since a wire
//! has a single receive path.
//!
//! The runner never retries: a failed iteration is reported and the caller
//! decides what to do with it.

use core::fmt;

use embassy_time::Duration;

use crate::bus::{BusError, ChannelBusManager, ChannelConfig, ColorOrder, FrameBytes};
use crate::color::Rgb;
use crate::decoder::DecodeError;
use crate::rx::{CaptureBackend, PollClock, RxChannel, RxConfig, RxWaitResult};
use crate::timing::{ChipsetTiming3Phase, DEFAULT_GAP_TOLERANCE_NS, derive_4phase_with_gap};

/// Default tolerance applied around the nominal pulse widths
pub const DEFAULT_TOLERANCE_NS: u32 = 150;

/// Parameters of a loopback run
#[derive(Debug, Clone, Copy)]
pub struct LoopbackConfig {
    /// Driver forced as the only enabled one
    pub driver: &'static str,
    pub pin: u8,
    pub timing: ChipsetTiming3Phase,
    pub color_order: ColorOrder,
    pub tolerance_ns: u32,
    pub gap_tolerance_ns: u32,
    pub rx: RxConfig,
    /// Per-frame receive timeout
    pub timeout: Duration,
    /// Measured frames
    pub iterations: usize,
    /// Send one discarded frame first to absorb first-call latency
    pub warm_up: bool,
}

impl LoopbackConfig {
    /// Create a config with one measured iteration and a warm-up frame.
    ///
    /// The tolerance is 150 ns, capped by [`ChipsetTiming3Phase::max_tolerance_ns`].
    pub fn new(driver: &'static str, pin: u8, timing: ChipsetTiming3Phase) -> Self {
        Self {
            driver,
            pin,
            timing,
            color_order: ColorOrder::Rgb,
            tolerance_ns: DEFAULT_TOLERANCE_NS.min(timing.max_tolerance_ns()),
            gap_tolerance_ns: DEFAULT_GAP_TOLERANCE_NS,
            rx: RxConfig::default(),
            timeout: Duration::from_millis(100),
            iterations: 1,
            warm_up: true,
        }
    }
}

/// Outcome of a loopback run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopbackReport {
    pub passed: usize,
    pub failed: usize,
    /// Measured frames that captured nothing
    pub timeouts: usize,
    /// Wire bytes sent per frame
    pub bytes_expected: usize,
    /// Offset of the first differing byte seen in any failed frame
    pub first_mismatch: Option<usize>,
    pub last_error: Option<DecodeError>,
}

impl LoopbackReport {
    pub const fn all_passed(&self) -> bool {
        self.failed == 0 && self.passed > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopbackError {
    /// The driver name is not registered
    UnknownDriver,
    /// The driver cannot serve the pin
    NoChannel,
    /// The receive channel rejected its configuration
    RxUnsupported,
    /// The decode buffer cannot hold one frame
    ScratchTooSmall { needed: usize },
    Bus(BusError),
}

impl From<BusError> for LoopbackError {
    fn from(value: BusError) -> Self {
        Self::Bus(value)
    }
}

impl fmt::Display for LoopbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDriver => write!(f, "unknown driver"),
            Self::NoChannel => write!(f, "driver cannot serve pin"),
            Self::RxUnsupported => write!(f, "receive configuration unsupported"),
            Self::ScratchTooSmall { needed } => {
                write!(f, "decode buffer too small, {} bytes needed", needed)
            }
            Self::Bus(error) => write!(f, "bus error: {}", error),
        }
    }
}

impl core::error::Error for LoopbackError {}

/// Transmit `pixels` through `config.driver` and read them back through `rx`.
///
/// `rx` is armed before every transmission. The channel is released before
/// returning, whatever the outcome. Drivers stay in the exclusive state set
/// here.
pub fn run_loopback<'a, B, C, const DRIVERS: usize, const CHANNELS: usize, const EDGES: usize>(
    bus: &mut ChannelBusManager<'a, DRIVERS, CHANNELS>,
    rx: &mut RxChannel<B, EDGES>,
    clock: &mut C,
    config: &LoopbackConfig,
    pixels: &'a [Rgb],
    scratch: &mut [u8],
) -> Result<LoopbackReport, LoopbackError>
where
    B: CaptureBackend,
    C: PollClock,
{
    let bytes_expected = pixels.len() * 3;
    if scratch.len() < bytes_expected {
        return Err(LoopbackError::ScratchTooSmall {
            needed: bytes_expected,
        });
    }

    if !bus.set_exclusive_driver(config.driver) {
        return Err(LoopbackError::UnknownDriver);
    }
    let channel = ChannelConfig::new(config.pin, config.timing, pixels).with_color_order(config.color_order);
    let handle = bus.add_channel(channel).ok_or(LoopbackError::NoChannel)?;

    let thresholds = derive_4phase_with_gap(&config.timing, config.tolerance_ns, config.gap_tolerance_ns);
    let mut report = LoopbackReport {
        bytes_expected,
        ..LoopbackReport::default()
    };

    let frames = config.iterations + usize::from(config.warm_up);
    for frame in 0..frames {
        let measured = !(config.warm_up && frame == 0);

        if !rx.begin(config.rx) {
            bus.release(handle);
            return Err(LoopbackError::RxUnsupported);
        }
        if let Err(error) = bus.show(handle) {
            bus.release(handle);
            return Err(error.into());
        }

        if rx.wait(clock, config.timeout) == RxWaitResult::Timeout {
            if measured {
                crate::log!("[run_loopback] frame {} timed out", frame);
                report.timeouts += 1;
                report.failed += 1;
            }
            continue;
        }

        let (written, error) = match rx.decode(&thresholds, scratch) {
            Ok(written) => (written, None),
            Err(error) => (error.written(), Some(error)),
        };
        if !measured {
            continue;
        }

        let mismatch = first_mismatch(&scratch[..written], FrameBytes::new(pixels, config.color_order));
        if error.is_none() && mismatch.is_none() {
            report.passed += 1;
            continue;
        }

        crate::log!("[run_loopback] frame {} failed: {:?} {:?}", frame, error, mismatch);
        report.failed += 1;
        if error.is_some() {
            report.last_error = error;
        }
        if report.first_mismatch.is_none() {
            report.first_mismatch = mismatch;
        }
    }

    bus.release(handle);
    Ok(report)
}

/// Offset of the first byte where `decoded` and `expected` differ,
/// including a length difference.
fn first_mismatch(decoded: &[u8], expected: FrameBytes<'_>) -> Option<usize> {
    let expected_len = expected.len();
    if let Some(offset) = decoded
        .iter()
        .zip(expected)
        .position(|(actual, wanted)| *actual != wanted)
    {
        return Some(offset);
    }
    (decoded.len() != expected_len).then(|| decoded.len().min(expected_len))
}
