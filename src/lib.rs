//! Software PWM on arbitrary GPIO pins, clocked by a single periodic timer interrupt.
//!
//! A [`ChannelTable`] lives in a `static` and is shared between the timer interrupt, which
//! calls [`ChannelTable::irq_handler`] on every tick, and the main program, which owns a
//! [`SoftPwm`] registry built from the table. Every channel runs a 256-tick cycle: the pin
//! turns on at the start of the cycle and off once the cycle counter reaches the channel's
//! duty value. Optional fades move the duty value towards its target by a bounded step
//! per cycle.
#![no_std]

// This must go FIRST so that all the other modules see its macros.
mod fmt;

mod backend;
mod channel;
mod config;
mod registry;
mod secondary;

use channel::ChannelSlot;
use core::sync::atomic::{AtomicU8, Ordering};
use embedded_hal::digital::OutputPin;

pub use backend::{PinBackend, PinMode, TimerBackend};
pub use channel::ChannelState;
pub use config::{
    DEFAULT_CLOCK_HZ, DEFAULT_COMPARE, DEFAULT_PRESCALER, TICKS_PER_CYCLE, TickConfig,
};
pub use embedded_hal::digital::PinState;
pub use registry::{SoftPwm, SoftPwmBuilder};
pub use secondary::{DEFAULT_SECONDARY_DIVIDER, SecondaryCallback};

use secondary::SecondaryTick;

/// Highest duty value, the pin stays on for all but the last tick of the cycle.
pub const MAX_DUTY: u8 = u8::MAX;

const MAX_PERCENT: u8 = 100;

/// Cycle counter value that makes the next tick start a fresh cycle.
const CYCLE_RESTART: u8 = u8::MAX;

/// Errors that can occur during software PWM operations.
///
/// A failed call leaves the channel table untouched, with two exceptions: `detach` frees
/// the slot before parking the pin, so a [`SoftPwmError::PinBackend`] from it still leaves
/// the channel detached, and an immediate `set_duty` restarts the cycle before looking for
/// a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SoftPwmError {
    /// No free channel slot for a pin that is not yet tracked
    NoChannelSlotAvailable,
    /// No channel owns the requested pin. Nothing was changed, callers may ignore it.
    UnknownPin,
    /// The pin number does not fit the channel table
    InvalidPin,
    /// The duty cycle percentage is greater than 100
    InvalidDutyCycle,
    /// The tick configuration divides by zero
    InvalidTickConfig,
    /// The pin backend reported an error
    PinBackend,
    /// The timer backend reported an error
    TimerBackend,
}

impl core::fmt::Display for SoftPwmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Self::NoChannelSlotAvailable => "no free channel slot",
            Self::UnknownPin => "pin is not attached to a channel",
            Self::InvalidPin => "pin number out of range",
            Self::InvalidDutyCycle => "duty cycle percentage above 100",
            Self::InvalidTickConfig => "invalid tick configuration",
            Self::PinBackend => "pin backend error",
            Self::TimerBackend => "timer backend error",
        };

        f.write_str(msg)
    }
}

impl core::error::Error for SoftPwmError {}

/// Which electrical level means "on".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// High is on, a higher duty value keeps the pin high for longer
    #[default]
    Normal,
    /// Low is on
    Inverted,
}

impl From<u8> for Polarity {
    /// 0 is [`Polarity::Normal`], anything else is coerced to [`Polarity::Inverted`].
    fn from(value: u8) -> Self {
        if value == 0 {
            Polarity::Normal
        } else {
            Polarity::Inverted
        }
    }
}

/// Channel selector for registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Target {
    /// The channel that owns this pin
    Pin(u8),
    /// Every occupied channel
    All,
}

impl From<u8> for Target {
    fn from(pin: u8) -> Self {
        Target::Pin(pin)
    }
}

/// Convert a 0..=100 percentage into the 0..=255 duty domain, truncating.
pub fn percent_to_duty(percent: u8) -> Result<u8, SoftPwmError> {
    if percent > MAX_PERCENT {
        return Err(SoftPwmError::InvalidDutyCycle);
    }

    let duty = u16::from(percent) * u16::from(MAX_DUTY) / u16::from(MAX_PERCENT);

    u8::try_from(duty).map_err(|_| SoftPwmError::InvalidDutyCycle)
}

/// Fixed-capacity table of `N` channels driving pin handles of type `H`.
///
/// Meant to be placed in a `static` so both the timer interrupt and the main program can
/// reach it:
///
/// ```ignore
/// static PWM: ChannelTable<BoardPin, 16> = ChannelTable::new();
///
/// #[interrupt]
/// fn TIMER2_COMPA() {
///     PWM.irq_handler();
/// }
/// ```
pub struct ChannelTable<H, const N: usize> {
    slots: [ChannelSlot<H>; N],
    cycle_count: AtomicU8,
    secondary: SecondaryTick,
}

impl<H, const N: usize> Default for ChannelTable<H, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, const N: usize> ChannelTable<H, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { ChannelSlot::new() }; N],
            cycle_count: AtomicU8::new(CYCLE_RESTART),
            secondary: SecondaryTick::new(),
        }
    }

    /// Start configuring the registry that owns this table.
    pub fn builder(&self) -> SoftPwmBuilder<'_, H, (), (), N> {
        SoftPwmBuilder::new(self)
    }

    /// Number of channel slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of slots currently owning a pin.
    pub fn active_channels(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_occupied()).count()
    }

    /// Snapshot of the channel that owns `pin`.
    pub fn channel(&self, pin: u8) -> Option<ChannelState> {
        self.slots
            .iter()
            .find(|slot| slot.pin() == Some(pin))
            .and_then(ChannelSlot::snapshot)
    }

    /// Position of the shared cycle counter.
    pub fn cycle_count(&self) -> u8 {
        self.cycle_count.load(Ordering::Relaxed)
    }

    /// Install the callback fired every `divider` calls of
    /// [`secondary_irq_handler`](Self::secondary_irq_handler). A divider of 0 never fires.
    pub fn set_secondary_callback(&self, divider: u16, callback: SecondaryCallback) {
        self.secondary.set_callback(divider, Some(callback));
    }

    /// Remove the secondary callback and restore the default divider.
    pub fn clear_secondary_callback(&self) {
        self.secondary.set_callback(DEFAULT_SECONDARY_DIVIDER, None);
    }

    /// Ticks counted by the secondary divider since it last fired.
    pub fn secondary_count(&self) -> u16 {
        self.secondary.count()
    }

    /// Handler for the optional second compare interrupt of the PWM timer.
    pub fn secondary_irq_handler(&self) {
        self.secondary.tick();
    }

    pub(crate) fn matching(&self, target: Target) -> impl Iterator<Item = &ChannelSlot<H>> {
        self.slots.iter().filter(move |slot| slot.matches(target))
    }

    pub(crate) fn restart_cycle(&self) {
        self.cycle_count.store(CYCLE_RESTART, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        for slot in &self.slots {
            slot.clear();
        }

        self.restart_cycle();
    }
}

impl<H: OutputPin, const N: usize> ChannelTable<H, N> {
    /// Tick handler, to be called from the periodic timer interrupt.
    ///
    /// When the cycle counter wraps, every channel takes one fade step and its pin turns
    /// on unless the new duty value is 0. On every tick, channels whose duty value equals
    /// the counter turn off.
    pub fn irq_handler(&self) {
        let count = self.cycle_count.load(Ordering::Relaxed).wrapping_add(1);

        self.cycle_count.store(count, Ordering::Relaxed);

        critical_section::with(|cs| {
            if count == 0 {
                for slot in self.slots.iter().filter(|slot| slot.is_occupied()) {
                    if slot.advance() > 0 {
                        slot.drive(cs, true);
                    }
                }
            }

            for slot in self.slots.iter().filter(|slot| slot.is_occupied()) {
                if slot.current.load(Ordering::Relaxed) == count {
                    slot.drive(cs, false);
                }
            }
        });
    }
}
