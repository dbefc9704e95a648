use core::fmt;

use super::frame::Frame;
use crate::timing::ChipsetTiming3Phase;

/// Errors raised by a transmit engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    UnsupportedPin,
    UnsupportedTiming,
    /// A previous transmission is still running
    Busy,
    /// The peripheral reported a transmission failure
    Transmit,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedPin => write!(f, "pin not supported by engine"),
            Self::UnsupportedTiming => write!(f, "timing not supported by engine"),
            Self::Busy => write!(f, "engine busy"),
            Self::Transmit => write!(f, "transmission failed"),
        }
    }
}

impl core::error::Error for EngineError {}

/// Hardware transmit engine (pulse-train, shift-register, parallel-IO, ...).
///
/// Implement this trait for each peripheral family. Instances are owned by
/// the application and lent to [`ChannelBusManager`](super::ChannelBusManager).
pub trait TxEngine {
    /// Whether this engine can drive `pin` with `timing`
    fn supports(&self, pin: u8, timing: &ChipsetTiming3Phase) -> bool;

    /// Number of lanes the engine can drive concurrently
    fn lane_capacity(&self) -> usize {
        1
    }

    /// Peripheral or DMA resource shared with other engines, if any.
    ///
    /// Two different engines reporting the same resource never hold
    /// channels at the same time.
    fn shared_resource(&self) -> Option<u8> {
        None
    }

    /// Bind `lane` to `pin` with `timing`.
    fn configure(&mut self, lane: u8, pin: u8, timing: &ChipsetTiming3Phase) -> Result<(), EngineError>;

    /// Start emitting `frame` on `lane`.
    fn emit(&mut self, lane: u8, frame: &Frame<'_>) -> Result<(), EngineError>;

    /// Whether `lane` still has a transmission in flight
    fn is_busy(&self, lane: u8) -> bool;

    /// Stop any in-flight transmission on `lane` and release its pin.
    ///
    /// Must not return before the peripheral and its DMA are idle.
    fn quiesce(&mut self, lane: u8);

    /// Notification that the engine was enabled or masked out.
    fn set_enabled(&mut self, _enabled: bool) {}
}
