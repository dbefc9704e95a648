//! Shared test infrastructure for myrtio-led-bus integration tests

#![allow(dead_code)] // Items used across multiple test files; Rust analyzes per-file

use std::cell::RefCell;
use std::rc::Rc;

use myrtio_led_bus::capture::{CaptureRing, CaptureSignal, PulseCode};
use myrtio_led_bus::encoder::{encode_pulses, pulse_count};
use myrtio_led_bus::{
    CaptureBackend, CaptureError, ChipsetTiming3Phase, EdgeTime, EngineError, Frame, PollClock,
    RxConfig, TxEngine,
};
use embassy_time::{Duration, Instant};

/// Symbols a test wire can hold
pub const RING: usize = 1024;

pub type Wire = CaptureRing<RING>;

// ============================================================================
// Manual clock
// ============================================================================

/// Clock that only moves when polled code pauses.
///
/// An optional hook runs after every pause with the new time in
/// microseconds, standing in for interrupt activity.
pub struct ManualClock<'a> {
    now_us: u64,
    pauses: usize,
    on_pause: Option<Box<dyn FnMut(u64) + 'a>>,
}

impl<'a> ManualClock<'a> {
    pub fn new() -> Self {
        Self {
            now_us: 0,
            pauses: 0,
            on_pause: None,
        }
    }

    pub fn with_hook(hook: impl FnMut(u64) + 'a) -> Self {
        Self {
            now_us: 0,
            pauses: 0,
            on_pause: Some(Box::new(hook)),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    pub fn pauses(&self) -> usize {
        self.pauses
    }
}

impl PollClock for ManualClock<'_> {
    fn now(&self) -> Instant {
        Instant::from_micros(self.now_us)
    }

    fn pause(&mut self, duration: Duration) {
        self.now_us += duration.as_micros();
        self.pauses += 1;
        if let Some(hook) = self.on_pause.as_mut() {
            hook(self.now_us);
        }
    }
}

// ============================================================================
// Capture backend
// ============================================================================

/// Capture backend reading from a shared wire.
pub struct WireCapture<'a> {
    wire: &'a Wire,
    pin: u8,
    supported_pins: &'static [u8],
    pub arms: usize,
    pub last_config: Option<RxConfig>,
}

impl<'a> WireCapture<'a> {
    pub fn new(wire: &'a Wire, pin: u8) -> Self {
        Self {
            wire,
            pin,
            supported_pins: &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            arms: 0,
            last_config: None,
        }
    }

    pub fn with_supported_pins(mut self, pins: &'static [u8]) -> Self {
        self.supported_pins = pins;
        self
    }
}

impl CaptureBackend for WireCapture<'_> {
    fn arm(&mut self, config: &RxConfig) -> Result<(), CaptureError> {
        if !self.supported_pins.contains(&self.pin) {
            return Err(CaptureError::UnsupportedPin);
        }
        if config.buffer_size > RING {
            return Err(CaptureError::BufferTooLarge);
        }
        self.wire.restart(config.buffer_size);
        self.arms += 1;
        self.last_config = Some(*config);
        Ok(())
    }

    fn disarm(&mut self) {
        self.wire.close();
    }

    fn signal(&self) -> &CaptureSignal {
        self.wire.signal()
    }

    fn read_symbols(&self, offset: usize, out: &mut [PulseCode]) -> usize {
        self.wire.read(offset, out)
    }
}

// ============================================================================
// Transmit engine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Configure { lane: u8, pin: u8 },
    Emit { lane: u8, bytes: Vec<u8> },
    Quiesce { lane: u8 },
    Enabled(bool),
}

pub type EventLog = Rc<RefCell<Vec<(&'static str, EngineEvent)>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Scriptable transmit engine. When attached to a wire it plays its frames
/// into it as pulse codes at `hz`.
pub struct TestEngine<'a> {
    name: &'static str,
    pins: Vec<u8>,
    lanes: usize,
    resource: Option<u8>,
    wire: Option<&'a Wire>,
    hz: u32,
    busy_lanes: Vec<u8>,
    stuck: bool,
    fail_configure: bool,
    log: EventLog,
}

impl<'a> TestEngine<'a> {
    pub fn new(name: &'static str, pins: &[u8], log: &EventLog) -> Self {
        Self {
            name,
            pins: pins.to_vec(),
            lanes: 1,
            resource: None,
            wire: None,
            hz: 40_000_000,
            busy_lanes: Vec::new(),
            stuck: false,
            fail_configure: false,
            log: Rc::clone(log),
        }
    }

    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes;
        self
    }

    pub fn with_resource(mut self, resource: u8) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_wire(mut self, wire: &'a Wire, hz: u32) -> Self {
        self.wire = Some(wire);
        self.hz = hz;
        self
    }

    pub fn failing_configure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    /// Quiesce never brings a lane back to idle
    pub fn stuck(mut self) -> Self {
        self.stuck = true;
        self
    }

    fn record(&self, event: EngineEvent) {
        self.log.borrow_mut().push((self.name, event));
    }
}

impl TxEngine for TestEngine<'_> {
    fn supports(&self, pin: u8, _timing: &ChipsetTiming3Phase) -> bool {
        self.pins.contains(&pin)
    }

    fn lane_capacity(&self) -> usize {
        self.lanes
    }

    fn shared_resource(&self) -> Option<u8> {
        self.resource
    }

    fn configure(&mut self, lane: u8, pin: u8, _timing: &ChipsetTiming3Phase) -> Result<(), EngineError> {
        if self.fail_configure {
            return Err(EngineError::UnsupportedPin);
        }
        self.record(EngineEvent::Configure { lane, pin });
        Ok(())
    }

    fn emit(&mut self, lane: u8, frame: &Frame<'_>) -> Result<(), EngineError> {
        let bytes: Vec<u8> = frame.bytes().collect();
        if let Some(wire) = self.wire {
            for symbol in pulses(frame.timing, &bytes, self.hz) {
                // A disarmed capture drops the frame, like a real wire would.
                let _ = wire.push(symbol);
            }
        }
        if !self.busy_lanes.contains(&lane) {
            self.busy_lanes.push(lane);
        }
        self.record(EngineEvent::Emit { lane, bytes });
        Ok(())
    }

    fn is_busy(&self, lane: u8) -> bool {
        self.busy_lanes.contains(&lane)
    }

    fn quiesce(&mut self, lane: u8) {
        if !self.stuck {
            self.busy_lanes.retain(|&busy| busy != lane);
        }
        self.record(EngineEvent::Quiesce { lane });
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.record(EngineEvent::Enabled(enabled));
    }
}

// ============================================================================
// Edge builders
// ============================================================================

/// Canonical edges for `bits`, without a reset
pub fn bit_edges(timing: &ChipsetTiming3Phase, bits: &[bool]) -> Vec<EdgeTime> {
    bits.iter()
        .flat_map(|&bit| {
            if bit {
                [EdgeTime::high(timing.bit1_high_ns()), EdgeTime::low(timing.bit1_low_ns())]
            } else {
                [EdgeTime::high(timing.bit0_high_ns()), EdgeTime::low(timing.bit0_low_ns())]
            }
        })
        .collect()
}

/// Canonical edges for `bytes`, MSB first, without a reset
pub fn byte_edges(timing: &ChipsetTiming3Phase, bytes: &[u8]) -> Vec<EdgeTime> {
    let bits: Vec<bool> = bytes
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1 == 1))
        .collect();
    bit_edges(timing, &bits)
}

/// Pulse codes for `bytes`, including the reset symbol and end marker
pub fn pulses(timing: &ChipsetTiming3Phase, bytes: &[u8], hz: u32) -> Vec<PulseCode> {
    let mut out = vec![PulseCode::end_marker(); pulse_count(bytes.len())];
    let count = encode_pulses(timing, bytes, hz, &mut out).unwrap();
    out.truncate(count);
    out
}

/// The timing used in the worked example: 300/300/600 ns, 280 µs reset
pub fn example_timing() -> ChipsetTiming3Phase {
    ChipsetTiming3Phase::new("EXAMPLE", 300, 300, 600, 280)
}
