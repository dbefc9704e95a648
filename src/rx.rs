//! Receive channel
//!
//! Drives one capture peripheral through a capture session:
//!
//! ```text
//! Idle --begin--> Armed --first symbol--> Capturing --done--> FrameComplete
//!                   ^                                              |
//!                   +--------------------begin---------------------+
//! ```
//!
//! The peripheral itself is an external collaborator behind
//! [`CaptureBackend`]. Completion is observed by polling the backend's
//! [`CaptureSignal`] from [`RxChannel::wait`].

use core::fmt;

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::capture::{CaptureSignal, PulseCode, ticks_to_ns};
use crate::decoder::{self, DecodeError, DecodeReport};
use crate::edge::EdgeTime;
use crate::timing::ChipsetTiming4Phase;

/// Symbols pulled from the backend per read while materialising edges
const READ_CHUNK: usize = 32;

/// Capture session parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxConfig {
    /// Capture tick rate
    pub hz: u32,
    /// Maximum number of symbols captured in one session
    pub buffer_size: usize,
    /// Longest pulse considered part of a frame, in nanoseconds
    pub signal_range_max_ns: u32,
    /// The line idles low and the frame starts on a rising edge
    pub start_low: bool,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            hz: 40_000_000,
            buffer_size: 512,
            signal_range_max_ns: 100_000,
            start_low: true,
        }
    }
}

/// Outcome of [`RxChannel::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxWaitResult {
    /// A frame (possibly partial) is available
    Success,
    /// Nothing was captured before the timeout
    Timeout,
}

/// Lifecycle of an [`RxChannel`] capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// Not armed, or disarmed after a failed `begin`
    Idle,
    /// Waiting for the first edge
    Armed,
    /// Edges are arriving
    Capturing,
    /// The frame ended by reset, buffer limit or idle line
    FrameComplete,
}

/// Errors a capture backend reports while arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureError {
    /// The pin cannot be routed to this peripheral
    UnsupportedPin,
    /// The requested buffer exceeds what the peripheral can hold
    BufferTooLarge,
    /// The peripheral rejected the configuration
    Peripheral,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedPin => write!(f, "pin not supported by capture peripheral"),
            Self::BufferTooLarge => write!(f, "capture buffer too large"),
            Self::Peripheral => write!(f, "capture peripheral configuration failed"),
        }
    }
}

impl core::error::Error for CaptureError {}

/// Hardware capture peripheral bound to one pin.
pub trait CaptureBackend {
    /// Reset the peripheral and start capturing at the next edge.
    ///
    /// Must fully configure the pin before returning, so a transmitter
    /// started afterwards cannot lose its first edge.
    fn arm(&mut self, config: &RxConfig) -> Result<(), CaptureError>;

    /// Stop capturing. Captured symbols stay readable.
    fn disarm(&mut self);

    /// Completion state shared with the capture interrupt
    fn signal(&self) -> &CaptureSignal;

    /// Copy captured symbols starting at `offset`, returning the count.
    fn read_symbols(&self, offset: usize, out: &mut [PulseCode]) -> usize;
}

/// Source of time for polling loops.
pub trait PollClock {
    /// Current time
    fn now(&self) -> Instant;

    /// Yield for roughly `duration` between polls.
    fn pause(&mut self, duration: Duration);
}

/// [`PollClock`] backed by the embassy time driver, blocking between polls.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingClock;

impl PollClock for BlockingClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn pause(&mut self, duration: Duration) {
        embassy_time::block_for(duration);
    }
}

/// Polling behaviour of [`RxChannel::wait`].
///
/// End-of-frame detection by inactivity is a heuristic: a frame is assumed
/// finished once the write position has not moved for the inactivity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    /// Overrides the window derived from `signal_range_max_ns`
    pub inactivity_window: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            inactivity_window: None,
        }
    }
}

impl WaitPolicy {
    fn inactivity(&self, config: &RxConfig) -> Duration {
        self.inactivity_window.unwrap_or_else(|| {
            Duration::from_micros(u64::from(config.signal_range_max_ns.div_ceil(1000)))
        })
    }
}

/// One capture session owner. `EDGES` bounds the materialised edge buffer.
pub struct RxChannel<B: CaptureBackend, const EDGES: usize> {
    backend: B,
    config: RxConfig,
    policy: WaitPolicy,
    state: RxState,
    edges: Vec<EdgeTime, EDGES>,
    edges_valid: bool,
}

impl<B: CaptureBackend, const EDGES: usize> RxChannel<B, EDGES> {
    /// Create a new idle channel with the default wait policy.
    pub fn new(backend: B) -> Self {
        Self::with_policy(backend, WaitPolicy::default())
    }

    /// Create a new idle channel polling with `policy`.
    pub fn with_policy(backend: B, policy: WaitPolicy) -> Self {
        Self {
            backend,
            config: RxConfig::default(),
            policy,
            state: RxState::Idle,
            edges: Vec::new(),
            edges_valid: false,
        }
    }

    /// Current capture state
    pub const fn state(&self) -> RxState {
        self.state
    }

    /// Configuration of the last successful `begin`
    pub const fn config(&self) -> &RxConfig {
        &self.config
    }

    /// Replace the wait policy. Applies from the next `wait`.
    pub fn set_policy(&mut self, policy: WaitPolicy) {
        self.policy = policy;
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Arm the capture for a new frame.
    ///
    /// Returns `false` when the configuration cannot be served: a buffer
    /// larger than the edge storage, or a pin/peripheral the backend rejects.
    /// Any previous capture is discarded.
    pub fn begin(&mut self, config: RxConfig) -> bool {
        self.edges.clear();
        self.edges_valid = false;

        if config.buffer_size == 0 || config.buffer_size.saturating_mul(2) > EDGES || config.hz == 0 {
            crate::log!("[RxChannel.begin] unsupported buffer size {}", config.buffer_size);
            self.state = RxState::Idle;
            return false;
        }

        if let Err(error) = self.backend.arm(&config) {
            crate::log!("[RxChannel.begin] arm failed: {}", error);
            self.state = RxState::Idle;
            return false;
        }

        self.config = config;
        self.state = RxState::Armed;
        true
    }

    /// Poll until the frame completes, goes quiet, or `timeout` elapses.
    ///
    /// A timeout with some symbols captured still counts as success; the
    /// partial frame is usable.
    pub fn wait<C: PollClock>(&mut self, clock: &mut C, timeout: Duration) -> RxWaitResult {
        match self.state {
            RxState::FrameComplete => return RxWaitResult::Success,
            RxState::Idle => return RxWaitResult::Timeout,
            RxState::Armed | RxState::Capturing => {}
        }

        let inactivity = self.policy.inactivity(&self.config);
        let start = clock.now();
        let mut last_position = 0;
        let mut last_progress = start;

        loop {
            let complete = self.backend.signal().is_complete();
            let position = self.backend.signal().position();
            let now = clock.now();

            if complete {
                crate::log!("[RxChannel.wait] capture complete, {} symbols", position);
                return self.finish_frame();
            }

            if position != last_position {
                last_position = position;
                last_progress = now;
                self.state = RxState::Capturing;
            } else if position > 0 && now.saturating_duration_since(last_progress) >= inactivity {
                crate::log!("[RxChannel.wait] line idle, {} symbols", position);
                return self.finish_frame();
            }

            if now.saturating_duration_since(start) >= timeout {
                if position > 0 {
                    crate::log!("[RxChannel.wait] timeout with partial frame, {} symbols", position);
                    return self.finish_frame();
                }
                crate::log!("[RxChannel.wait] timeout");
                return RxWaitResult::Timeout;
            }

            clock.pause(self.policy.poll_interval);
        }
    }

    /// Decode the captured frame into `out`.
    pub fn decode(
        &mut self,
        timing: &ChipsetTiming4Phase,
        out: &mut [u8],
    ) -> Result<usize, DecodeError> {
        self.materialize();
        let result = decoder::decode(timing, &self.edges, out);
        if let Err(error) = result {
            crate::log!("[RxChannel.decode] {}", error);
        }
        result
    }

    /// Decode the captured frame and return statistics.
    pub fn decode_with_report(
        &mut self,
        timing: &ChipsetTiming4Phase,
        out: &mut [u8],
    ) -> Result<DecodeReport, DecodeError> {
        self.materialize();
        decoder::decode_with_report(timing, &self.edges, out)
    }

    /// Copy captured edges starting at `offset` into `out`.
    pub fn raw_edge_times(&mut self, out: &mut [EdgeTime], offset: usize) -> usize {
        self.materialize();
        let Some(available) = self.edges.get(offset..) else {
            return 0;
        };
        let count = available.len().min(out.len());
        out[..count].copy_from_slice(&available[..count]);
        count
    }

    /// Number of captured edges
    pub fn edge_count(&mut self) -> usize {
        self.materialize();
        self.edges.len()
    }

    /// Replace the capture with `edges`, bypassing the hardware.
    ///
    /// The channel moves straight to `FrameComplete`. Returns how many edges
    /// were stored; the rest are dropped when `EDGES` is exceeded.
    pub fn inject_edges(&mut self, edges: &[EdgeTime]) -> usize {
        self.backend.disarm();
        self.edges.clear();
        let count = edges.len().min(EDGES);
        let _ = self.edges.extend_from_slice(&edges[..count]);
        self.edges_valid = true;
        self.state = RxState::FrameComplete;
        count
    }

    fn finish_frame(&mut self) -> RxWaitResult {
        self.backend.disarm();
        self.edges_valid = false;
        self.state = RxState::FrameComplete;
        RxWaitResult::Success
    }

    /// Convert raw symbols to edges.
    ///
    /// The result is cached only once the capture can no longer grow; reads
    /// while armed always see the latest symbols.
    fn materialize(&mut self) {
        if self.edges_valid {
            return;
        }
        self.edges.clear();
        match self.state {
            RxState::Idle => {
                self.edges_valid = true;
                return;
            }
            RxState::FrameComplete => self.edges_valid = true,
            RxState::Armed | RxState::Capturing => {}
        }

        let hz = self.config.hz;
        let mut leading_idle = self.config.start_low;
        let mut chunk = [PulseCode::end_marker(); READ_CHUNK];
        let mut offset = 0;

        'symbols: loop {
            let count = self.backend.read_symbols(offset, &mut chunk);
            if count == 0 {
                break;
            }
            offset += count;

            for symbol in &chunk[..count] {
                for (level, ticks) in symbol.halves() {
                    if ticks == 0 {
                        break 'symbols;
                    }
                    if leading_idle && !level {
                        continue;
                    }
                    leading_idle = false;
                    let edge = EdgeTime::new(level, ticks_to_ns(u32::from(ticks), hz));
                    if self.edges.push(edge).is_err() {
                        break 'symbols;
                    }
                }
            }
        }
    }
}
