#![no_std]

#[cfg(feature = "esp32-log")]
macro_rules! log {
    ($($arg:tt)*) => {
        esp_println::println!($($arg)*)
    };
}

#[cfg(not(feature = "esp32-log"))]
macro_rules! log {
    ($($arg:tt)*) => {
        if false {
            core::mem::drop(core::format_args!($($arg)*));
        }
    };
}

pub(crate) use log;

pub mod bus;
pub mod capture;
pub mod color;
pub mod decoder;
pub mod edge;
pub mod encoder;
pub mod rx;
pub mod timing;
pub mod validation;

pub use bus::{
    BusError, ChannelBusManager, ChannelConfig, ChannelHandle, ColorOrder, DriverInfo,
    EngineError, Frame, FrameBytes, LaneAllocation, MAX_CHANNELS, TxEngine,
};
pub use capture::{CaptureRing, CaptureSignal, PulseCode};
pub use decoder::{DecodeError, DecodeReport, decode, decode_with_report};
pub use edge::EdgeTime;
pub use encoder::{EncodeError, encode_edges, encode_pulses};
pub use rx::{
    BlockingClock, CaptureBackend, CaptureError, PollClock, RxChannel, RxConfig, RxState,
    RxWaitResult, WaitPolicy,
};
pub use timing::{ChipsetTiming3Phase, ChipsetTiming4Phase, derive_4phase};
pub use validation::{LoopbackConfig, LoopbackError, LoopbackReport, run_loopback};

pub use color::Rgb;
pub use embassy_time::{Duration, Instant};
