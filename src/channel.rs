use crate::{Polarity, Target};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicI8, AtomicU8, Ordering};
use critical_section::{CriticalSection, Mutex};
use embedded_hal::digital::{OutputPin, PinState};

/// Pin value of a slot that owns no pin.
pub(crate) const FREE: i8 = -1;

/// Read-only copy of a channel's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelState {
    /// Pin owned by the channel
    pub pin: u8,
    /// Electrical sense of "on"
    pub polarity: Polarity,
    /// Duty value the channel converges to
    pub target: u8,
    /// Duty value driven during the current cycle
    pub current: u8,
    /// Maximum per-cycle increase of `current`, 0 jumps
    pub fade_up: u8,
    /// Maximum per-cycle decrease of `current`, 0 jumps
    pub fade_down: u8,
}

/// One entry of the channel table.
///
/// Every scalar is a separate atomic so the tick handler never reads a torn field. The
/// pin number is published last on claim and withdrawn first on release, so an occupied
/// slot always carries a valid handle.
pub(crate) struct ChannelSlot<H> {
    pin: AtomicI8,
    inverted: AtomicBool,
    pub(crate) target: AtomicU8,
    pub(crate) current: AtomicU8,
    pub(crate) fade_up: AtomicU8,
    pub(crate) fade_down: AtomicU8,
    handle: Mutex<RefCell<Option<H>>>,
}

impl<H> ChannelSlot<H> {
    pub(crate) const fn new() -> Self {
        Self {
            pin: AtomicI8::new(FREE),
            inverted: AtomicBool::new(false),
            target: AtomicU8::new(0),
            current: AtomicU8::new(0),
            fade_up: AtomicU8::new(0),
            fade_down: AtomicU8::new(0),
            handle: Mutex::new(RefCell::new(None)),
        }
    }

    pub(crate) fn pin(&self) -> Option<u8> {
        u8::try_from(self.pin.load(Ordering::Acquire)).ok()
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.pin.load(Ordering::Acquire) >= 0
    }

    pub(crate) fn matches(&self, target: Target) -> bool {
        match (target, self.pin()) {
            (Target::All, Some(_)) => true,
            (Target::Pin(pin), Some(owned)) => pin == owned,
            (_, None) => false,
        }
    }

    pub(crate) fn polarity(&self) -> Polarity {
        if self.inverted.load(Ordering::Relaxed) {
            Polarity::Inverted
        } else {
            Polarity::Normal
        }
    }

    pub(crate) fn set_polarity(&self, polarity: Polarity) {
        self.inverted.store(polarity == Polarity::Inverted, Ordering::SeqCst);
    }

    /// Populate a free slot for `pin`. The slot becomes visible to the tick handler only
    /// once the pin number is stored.
    pub(crate) fn claim(&self, pin: i8, handle: H, polarity: Polarity, target: u8) {
        critical_section::with(|cs| {
            self.handle.borrow_ref_mut(cs).replace(handle);
        });
        self.set_polarity(polarity);
        self.current.store(0, Ordering::SeqCst);
        self.fade_up.store(0, Ordering::SeqCst);
        self.fade_down.store(0, Ordering::SeqCst);
        self.target.store(target, Ordering::SeqCst);
        self.pin.store(pin, Ordering::Release);
    }

    /// Withdraw the slot from the tick handler and hand back its pin handle.
    pub(crate) fn release(&self) -> Option<H> {
        self.pin.store(FREE, Ordering::Release);

        critical_section::with(|cs| self.handle.borrow_ref_mut(cs).take())
    }

    /// Return the slot to its power-on state.
    pub(crate) fn clear(&self) {
        drop(self.release());
        self.inverted.store(false, Ordering::SeqCst);
        self.target.store(0, Ordering::SeqCst);
        self.current.store(0, Ordering::SeqCst);
        self.fade_up.store(0, Ordering::SeqCst);
        self.fade_down.store(0, Ordering::SeqCst);
    }

    /// Move `current` one cycle closer to `target` and return the new value.
    pub(crate) fn advance(&self) -> u8 {
        let current = fade_step(
            self.current.load(Ordering::Relaxed),
            self.target.load(Ordering::Relaxed),
            self.fade_up.load(Ordering::Relaxed),
            self.fade_down.load(Ordering::Relaxed),
        );

        self.current.store(current, Ordering::Relaxed);

        current
    }

    pub(crate) fn snapshot(&self) -> Option<ChannelState> {
        Some(ChannelState {
            pin: self.pin()?,
            polarity: self.polarity(),
            target: self.target.load(Ordering::Relaxed),
            current: self.current.load(Ordering::Relaxed),
            fade_up: self.fade_up.load(Ordering::Relaxed),
            fade_down: self.fade_down.load(Ordering::Relaxed),
        })
    }
}

impl<H: OutputPin> ChannelSlot<H> {
    /// Drive the "on" or "off" level, translated through the slot's polarity.
    pub(crate) fn drive(&self, cs: CriticalSection<'_>, on: bool) {
        let level = self.polarity().level(on);

        if let Some(handle) = self.handle.borrow_ref_mut(cs).as_mut() {
            // No error path out of interrupt context.
            let _ = handle.set_state(level);
        }
    }
}

impl Polarity {
    /// Electrical level that represents `on` for this polarity.
    #[must_use]
    pub fn level(self, on: bool) -> PinState {
        match self {
            Polarity::Normal => PinState::from(on),
            Polarity::Inverted => PinState::from(!on),
        }
    }
}

/// One cycle of a linear fade from `current` towards `target`.
///
/// A zero rate in the direction of travel jumps straight to the target.
pub(crate) fn fade_step(current: u8, target: u8, fade_up: u8, fade_down: u8) -> u8 {
    if current < target && fade_up > 0 {
        current.saturating_add(fade_up).min(target)
    } else if current > target && fade_down > 0 {
        current.saturating_sub(fade_down).max(target)
    } else {
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_step_without_rates_jumps() {
        assert_eq!(fade_step(0, 200, 0, 0), 200);
        assert_eq!(fade_step(200, 10, 0, 0), 10);
    }

    #[test]
    fn fade_step_clamps_at_target() {
        assert_eq!(fade_step(250, 255, 10, 0), 255);
        assert_eq!(fade_step(5, 0, 0, 10), 0);
        assert_eq!(fade_step(100, 90, 0, 20), 90);
    }

    #[test]
    fn fade_step_moves_by_rate() {
        assert_eq!(fade_step(0, 255, 4, 0), 4);
        assert_eq!(fade_step(255, 0, 0, 3), 252);
    }

    #[test]
    fn fade_step_only_uses_rate_in_direction_of_travel() {
        // Fading down is configured but the target lies above: jump.
        assert_eq!(fade_step(10, 200, 0, 5), 200);
        assert_eq!(fade_step(200, 10, 5, 0), 10);
    }

    #[test]
    fn polarity_levels() {
        assert_eq!(Polarity::Normal.level(true), PinState::High);
        assert_eq!(Polarity::Normal.level(false), PinState::Low);
        assert_eq!(Polarity::Inverted.level(true), PinState::Low);
        assert_eq!(Polarity::Inverted.level(false), PinState::High);
    }
}
