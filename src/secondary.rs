use core::cell::Cell;
use critical_section::Mutex;

/// Divider applied by [`SecondaryTick`] until one is configured.
pub const DEFAULT_SECONDARY_DIVIDER: u16 = 50_000;

/// Callback fired every `divider` secondary ticks.
pub type SecondaryCallback = fn();

/// Auxiliary divider driven by a second compare interrupt of the PWM timer.
///
/// It shares the timer with the channel scheduler but never touches the channel table.
pub(crate) struct SecondaryTick {
    count: Mutex<Cell<u16>>,
    divider: Mutex<Cell<u16>>,
    callback: Mutex<Cell<Option<SecondaryCallback>>>,
}

impl SecondaryTick {
    pub(crate) const fn new() -> Self {
        Self {
            count: Mutex::new(Cell::new(0)),
            divider: Mutex::new(Cell::new(DEFAULT_SECONDARY_DIVIDER)),
            callback: Mutex::new(Cell::new(None)),
        }
    }

    pub(crate) fn set_callback(&self, divider: u16, callback: Option<SecondaryCallback>) {
        critical_section::with(|cs| {
            self.count.borrow(cs).set(0);
            self.divider.borrow(cs).set(divider);
            self.callback.borrow(cs).set(callback);
        });
    }

    pub(crate) fn tick(&self) {
        let callback = critical_section::with(|cs| {
            let divider = self.divider.borrow(cs).get();
            let count = self.count.borrow(cs);
            let next = count.get().wrapping_add(1);

            if divider != 0 && next >= divider {
                count.set(0);
                self.callback.borrow(cs).get()
            } else {
                count.set(next);
                None
            }
        });

        if let Some(callback) = callback {
            callback();
        }
    }

    pub(crate) fn count(&self) -> u16 {
        critical_section::with(|cs| self.count.borrow(cs).get())
    }
}
