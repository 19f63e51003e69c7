//! Hardware collaborators the driver talks to.
//!
//! Chip support lives entirely behind these two traits: a board crate picks the timer
//! and the pin mapping, the driver only asks for a periodic tick and for pin handles.

use crate::config::TickConfig;
use core::fmt::Debug;
use embedded_hal::digital::{OutputPin, PinState};

/// Direction of a GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    /// High-impedance input
    Input,
    /// Push-pull output
    Output,
}

/// Resolves logical pin numbers into output handles and configures pin direction.
pub trait PinBackend {
    /// Handle used by the tick handler to drive the pin. Typically the port output
    /// register plus the pin's bit mask.
    type Output: OutputPin;
    /// Backend specific error.
    type Error: Debug;

    /// Look up the output handle for `pin`.
    fn resolve(&mut self, pin: u8) -> Result<Self::Output, Self::Error>;

    /// Switch `pin` to the given direction.
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), Self::Error>;

    /// Drive `pin` to `level` regardless of its current mode.
    fn write_level(&mut self, pin: u8, level: PinState) -> Result<(), Self::Error>;
}

/// The periodic interrupt source that clocks [`ChannelTable::irq_handler`](crate::ChannelTable::irq_handler).
pub trait TimerBackend {
    /// Backend specific error.
    type Error: Debug;

    /// Program the timer to fire the tick interrupt at the rate described by `tick` and
    /// enable the interrupt.
    fn configure_periodic_tick(&mut self, tick: &TickConfig) -> Result<(), Self::Error>;

    /// Overwrite the raw hardware counter.
    fn reset_counter(&mut self, value: u8) -> Result<(), Self::Error>;
}
