//! Transmit engine arbitration
//!
//! [`ChannelBusManager`] keeps a registry of named transmit engines and
//! decides which one serves a logical output channel. Selection rules:
//! - only enabled engines that support the pin and timing are considered;
//! - the engine needs a free lane, and must not share a resource with a
//!   different engine that currently holds channels;
//! - the highest priority wins, ties go to the earliest registration.
//!
//! A pin has at most one active channel. Releasing a channel quiesces its
//! engine before the pin becomes available again.

mod engine;
mod frame;

use core::fmt;

use heapless::Vec;

pub use engine::{EngineError, TxEngine};
pub use frame::{ColorOrder, Frame, FrameBytes};

use crate::color::Rgb;
use crate::timing::ChipsetTiming3Phase;

/// Largest `CHANNELS` a [`ChannelBusManager`] supports
pub const MAX_CHANNELS: usize = u8::MAX as usize + 1;

/// Registry entry of a transmit engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverInfo {
    pub name: &'static str,
    /// Higher wins
    pub priority: i32,
    pub enabled: bool,
}

/// Parameters of one logical output channel
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig<'a> {
    pub pin: u8,
    pub timing: ChipsetTiming3Phase,
    /// Externally owned pixel buffer
    pub pixels: &'a [Rgb],
    pub color_order: ColorOrder,
}

impl<'a> ChannelConfig<'a> {
    pub const fn new(pin: u8, timing: ChipsetTiming3Phase, pixels: &'a [Rgb]) -> Self {
        Self {
            pin,
            timing,
            pixels,
            color_order: ColorOrder::Rgb,
        }
    }

    pub const fn with_color_order(mut self, color_order: ColorOrder) -> Self {
        self.color_order = color_order;
        self
    }
}

/// Handle to an allocated channel.
///
/// Stale handles (released channels) are rejected even if the slot was
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelHandle {
    slot: u8,
    generation: u32,
}

/// Errors from manager operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// No room for another driver
    RegistryFull,
    /// The driver still holds channels
    DriverBusy,
    /// The handle does not refer to an active channel
    StaleHandle,
    Engine(EngineError),
}

impl From<EngineError> for BusError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistryFull => write!(f, "driver registry full"),
            Self::DriverBusy => write!(f, "driver has active channels"),
            Self::StaleHandle => write!(f, "stale channel handle"),
            Self::Engine(error) => write!(f, "engine error: {}", error),
        }
    }
}

impl core::error::Error for BusError {}

/// Result of a multi-lane allocation
#[derive(Debug, Clone, Default)]
pub struct LaneAllocation<const CHANNELS: usize> {
    /// Allocated handles, in request order
    pub handles: Vec<ChannelHandle, CHANNELS>,
    /// Only lane 0 could be allocated
    pub reduced: bool,
}

struct DriverSlot<'a> {
    info: DriverInfo,
    engine: &'a mut dyn TxEngine,
}

#[derive(Clone, Copy)]
struct ActiveChannel<'a> {
    config: ChannelConfig<'a>,
    driver: usize,
    lane: u8,
}

/// Registry and arbiter of transmit engines.
///
/// Constructible and resettable so tests can build isolated instances; an
/// application normally keeps one.
pub struct ChannelBusManager<'a, const DRIVERS: usize, const CHANNELS: usize> {
    drivers: Vec<DriverSlot<'a>, DRIVERS>,
    channels: [Option<ActiveChannel<'a>>; CHANNELS],
    generations: [u32; CHANNELS],
}

impl<'a, const DRIVERS: usize, const CHANNELS: usize> ChannelBusManager<'a, DRIVERS, CHANNELS> {
    /// Create an empty manager.
    ///
    /// `CHANNELS` is limited to 256 so every slot fits a handle.
    pub const fn new() -> Self {
        const { assert!(CHANNELS <= MAX_CHANNELS, "CHANNELS must not exceed 256") };
        Self {
            drivers: Vec::new(),
            channels: [None; CHANNELS],
            generations: [0; CHANNELS],
        }
    }

    /// Register an engine under `name`, enabled.
    ///
    /// Registering an existing name updates its priority, re-enables it and
    /// swaps the engine, as long as the old engine holds no channels.
    pub fn register_driver(
        &mut self,
        name: &'static str,
        priority: i32,
        engine: &'a mut dyn TxEngine,
    ) -> Result<(), BusError> {
        if let Some(index) = self.driver_index(name) {
            if self.lanes_in_use(index) > 0 {
                crate::log!("[ChannelBusManager.register_driver] {} busy", name);
                return Err(BusError::DriverBusy);
            }
            let slot = &mut self.drivers[index];
            slot.info.priority = priority;
            slot.info.enabled = true;
            slot.engine = engine;
            slot.engine.set_enabled(true);
            crate::log!("[ChannelBusManager.register_driver] updated {} priority {}", name, priority);
            return Ok(());
        }

        let info = DriverInfo {
            name,
            priority,
            enabled: true,
        };
        self.drivers
            .push(DriverSlot { info, engine })
            .map_err(|_| BusError::RegistryFull)?;
        crate::log!("[ChannelBusManager.register_driver] {} priority {}", name, priority);
        Ok(())
    }

    /// Enable or mask out a driver. Returns `false` for unknown names.
    ///
    /// Channels already running on the driver are left alone; the mask only
    /// affects later allocations.
    pub fn set_driver_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(index) = self.driver_index(name) else {
            return false;
        };
        let slot = &mut self.drivers[index];
        if slot.info.enabled != enabled {
            slot.info.enabled = enabled;
            slot.engine.set_enabled(enabled);
        }
        true
    }

    /// Enable only `name` and disable every other driver.
    ///
    /// Returns `false` without changing anything when `name` is unknown.
    pub fn set_exclusive_driver(&mut self, name: &str) -> bool {
        if self.driver_index(name).is_none() {
            crate::log!("[ChannelBusManager.set_exclusive_driver] unknown driver {}", name);
            return false;
        }
        for slot in &mut self.drivers {
            let enabled = slot.info.name == name;
            if slot.info.enabled != enabled {
                slot.info.enabled = enabled;
                slot.engine.set_enabled(enabled);
            }
        }
        crate::log!("[ChannelBusManager.set_exclusive_driver] {}", name);
        true
    }

    /// Snapshot of a registered driver
    pub fn driver_info(&self, name: &str) -> Option<DriverInfo> {
        self.driver_index(name).map(|index| self.drivers[index].info)
    }

    /// Registered drivers in registration order
    pub fn drivers(&self) -> impl Iterator<Item = &DriverInfo> + '_ {
        self.drivers.iter().map(|slot| &slot.info)
    }

    /// Allocate a channel on the best engine for `config.pin`.
    ///
    /// Returns `None` when the pin is taken or no enabled engine can serve
    /// it. That is the normal "unsupported here" outcome.
    pub fn add_channel(&mut self, config: ChannelConfig<'a>) -> Option<ChannelHandle> {
        if self.is_pin_in_use(config.pin) {
            crate::log!("[ChannelBusManager.add_channel] pin {} already in use", config.pin);
            return None;
        }
        let Some(slot) = self.channels.iter().position(Option::is_none) else {
            crate::log!("[ChannelBusManager.add_channel] no free channel slot");
            return None;
        };

        let mut candidates: Vec<usize, DRIVERS> = (0..self.drivers.len())
            .filter(|&index| self.can_serve(index, &config))
            .collect();
        candidates.sort_unstable_by_key(|&index| (core::cmp::Reverse(self.drivers[index].info.priority), index));

        for index in candidates {
            let Some(lane) = self.free_lane(index) else {
                continue;
            };
            let engine = &mut self.drivers[index].engine;
            if let Err(error) = engine.configure(lane, config.pin, &config.timing) {
                crate::log!(
                    "[ChannelBusManager.add_channel] {} rejected pin {}: {}",
                    self.drivers[index].info.name,
                    config.pin,
                    error
                );
                continue;
            }

            self.channels[slot] = Some(ActiveChannel {
                config,
                driver: index,
                lane,
            });
            crate::log!(
                "[ChannelBusManager.add_channel] pin {} -> {} lane {}",
                config.pin,
                self.drivers[index].info.name,
                lane
            );
            return Some(self.handle(slot));
        }

        crate::log!("[ChannelBusManager.add_channel] no driver for pin {}", config.pin);
        None
    }

    /// Allocate several lanes that must run concurrently.
    ///
    /// Every lane goes through the same arbitration as [`Self::add_channel`],
    /// so lanes never land on conflicting resources. If any lane cannot be
    /// placed, all but lane 0 are released and the allocation is marked as
    /// reduced.
    pub fn add_lanes(&mut self, configs: &[ChannelConfig<'a>]) -> LaneAllocation<CHANNELS> {
        let mut allocation = LaneAllocation::default();
        for config in configs {
            let Some(handle) = self.add_channel(*config) else {
                allocation.reduced = true;
                break;
            };
            if allocation.handles.push(handle).is_err() {
                self.release(handle);
                allocation.reduced = true;
                break;
            }
        }

        if allocation.reduced {
            while allocation.handles.len() > 1 {
                if let Some(handle) = allocation.handles.pop() {
                    self.release(handle);
                }
            }
            crate::log!(
                "[ChannelBusManager.add_lanes] {} lanes requested, reduced to lane 0",
                configs.len()
            );
        }
        allocation
    }

    /// Emit the channel's pixel buffer.
    pub fn show(&mut self, handle: ChannelHandle) -> Result<(), BusError> {
        let channel = self.channel(handle).ok_or(BusError::StaleHandle)?;
        let frame = Frame {
            pixels: channel.config.pixels,
            color_order: channel.config.color_order,
            timing: &channel.config.timing,
        };
        self.drivers[channel.driver].engine.emit(channel.lane, &frame)?;
        Ok(())
    }

    /// Emit every active channel, stopping at the first error.
    pub fn show_all(&mut self) -> Result<(), BusError> {
        for slot in 0..CHANNELS {
            if self.channels[slot].is_some() {
                self.show(self.handle(slot))?;
            }
        }
        Ok(())
    }

    /// Quiesce and free a channel.
    ///
    /// Returns `false` for stale handles, and when the engine still reports
    /// the lane busy after quiescing. The channel then stays allocated so its
    /// pin cannot be handed to another engine.
    pub fn release(&mut self, handle: ChannelHandle) -> bool {
        let Some(channel) = self.channel(handle) else {
            return false;
        };
        let engine = &mut self.drivers[channel.driver].engine;
        engine.quiesce(channel.lane);
        if engine.is_busy(channel.lane) {
            crate::log!(
                "[ChannelBusManager.release] {} lane {} still busy, pin {} kept",
                self.drivers[channel.driver].info.name,
                channel.lane,
                channel.config.pin
            );
            return false;
        }
        self.free_slot(usize::from(handle.slot));
        crate::log!(
            "[ChannelBusManager.release] pin {} released from {}",
            channel.config.pin,
            self.drivers[channel.driver].info.name
        );
        true
    }

    /// Quiesce every channel, then forget every channel and driver.
    ///
    /// Unlike [`Self::release`], slots are freed even if an engine stays busy.
    pub fn reset(&mut self) {
        for slot in 0..CHANNELS {
            let Some(channel) = self.channels[slot] else {
                continue;
            };
            let engine = &mut self.drivers[channel.driver].engine;
            engine.quiesce(channel.lane);
            if engine.is_busy(channel.lane) {
                crate::log!(
                    "[ChannelBusManager.reset] {} lane {} still busy",
                    self.drivers[channel.driver].info.name,
                    channel.lane
                );
            }
            self.free_slot(slot);
        }
        self.drivers.clear();
    }

    /// Name of the driver serving `handle`
    pub fn channel_driver(&self, handle: ChannelHandle) -> Option<&'static str> {
        self.channel(handle)
            .map(|channel| self.drivers[channel.driver].info.name)
    }

    /// Lane index of `handle` on its driver
    pub fn channel_lane(&self, handle: ChannelHandle) -> Option<u8> {
        self.channel(handle).map(|channel| channel.lane)
    }

    /// Number of allocated channels
    pub fn channel_count(&self) -> usize {
        self.channels.iter().flatten().count()
    }

    /// Whether a live channel already drives `pin`.
    pub fn is_pin_in_use(&self, pin: u8) -> bool {
        self.channels
            .iter()
            .flatten()
            .any(|channel| channel.config.pin == pin)
    }

    fn driver_index(&self, name: &str) -> Option<usize> {
        self.drivers.iter().position(|slot| slot.info.name == name)
    }

    fn channel(&self, handle: ChannelHandle) -> Option<ActiveChannel<'a>> {
        let slot = usize::from(handle.slot);
        if self.generations.get(slot) != Some(&handle.generation) {
            return None;
        }
        self.channels[slot]
    }

    fn free_slot(&mut self, slot: usize) {
        self.channels[slot] = None;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn handle(&self, slot: usize) -> ChannelHandle {
        ChannelHandle {
            slot: slot as u8,
            generation: self.generations[slot],
        }
    }

    fn can_serve(&self, index: usize, config: &ChannelConfig<'_>) -> bool {
        let slot = &self.drivers[index];
        slot.info.enabled
            && slot.engine.supports(config.pin, &config.timing)
            && !self.conflicts(index)
    }

    /// Another engine with the same shared resource holds channels.
    fn conflicts(&self, index: usize) -> bool {
        let Some(resource) = self.drivers[index].engine.shared_resource() else {
            return false;
        };
        self.channels.iter().flatten().any(|channel| {
            channel.driver != index
                && self.drivers[channel.driver].engine.shared_resource() == Some(resource)
        })
    }

    fn lanes_in_use(&self, index: usize) -> usize {
        self.channels
            .iter()
            .flatten()
            .filter(|channel| channel.driver == index)
            .count()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn free_lane(&self, index: usize) -> Option<u8> {
        let capacity = self.drivers[index].engine.lane_capacity().min(usize::from(u8::MAX));
        (0..capacity as u8).find(|&lane| {
            !self
                .channels
                .iter()
                .flatten()
                .any(|channel| channel.driver == index && channel.lane == lane)
        })
    }
}

impl<const DRIVERS: usize, const CHANNELS: usize> Default for ChannelBusManager<'_, DRIVERS, CHANNELS> {
    fn default() -> Self {
        Self::new()
    }
}
