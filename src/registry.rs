use crate::channel::ChannelSlot;
use crate::{
    ChannelTable, PinBackend, PinMode, PinState, Polarity, SoftPwmError, Target, TickConfig,
    TimerBackend, percent_to_duty,
};
use core::sync::atomic::Ordering;

/// Builder for [`SoftPwm`], obtained from [`ChannelTable::builder`].
///
/// Both backends must be supplied before [`build`](SoftPwmBuilder::build) becomes
/// available.
pub struct SoftPwmBuilder<'a, H, P, T, const N: usize> {
    table: &'a ChannelTable<H, N>,
    pins: P,
    timer: T,
    default_polarity: Polarity,
    tick: TickConfig,
}

impl<'a, H, const N: usize> SoftPwmBuilder<'a, H, (), (), N> {
    pub(crate) fn new(table: &'a ChannelTable<H, N>) -> Self {
        Self {
            table,
            pins: (),
            timer: (),
            default_polarity: Polarity::Normal,
            tick: TickConfig::default(),
        }
    }
}

impl<'a, H, P, T, const N: usize> SoftPwmBuilder<'a, H, P, T, N> {
    /// Polarity given to every newly attached channel.
    pub fn default_polarity(mut self, polarity: Polarity) -> Self {
        self.default_polarity = polarity;
        self
    }

    /// Rate of the tick interrupt, used to program the timer and to compute fade rates.
    pub fn tick_config(mut self, tick: TickConfig) -> Self {
        self.tick = tick;
        self
    }
}

impl<'a, H, T, const N: usize> SoftPwmBuilder<'a, H, (), T, N> {
    pub fn pin_backend<P>(self, pins: P) -> SoftPwmBuilder<'a, H, P, T, N>
    where
        P: PinBackend<Output = H>,
    {
        SoftPwmBuilder {
            table: self.table,
            pins,
            timer: self.timer,
            default_polarity: self.default_polarity,
            tick: self.tick,
        }
    }
}

impl<'a, H, P, const N: usize> SoftPwmBuilder<'a, H, P, (), N> {
    pub fn timer_backend<T>(self, timer: T) -> SoftPwmBuilder<'a, H, P, T, N>
    where
        T: TimerBackend,
    {
        SoftPwmBuilder {
            table: self.table,
            pins: self.pins,
            timer,
            default_polarity: self.default_polarity,
            tick: self.tick,
        }
    }
}

impl<'a, P, T, const N: usize> SoftPwmBuilder<'a, P::Output, P, T, N>
where
    P: PinBackend,
    T: TimerBackend,
{
    /// Start the periodic tick and free every channel slot.
    ///
    /// Any channel left in the table by a previous registry is dropped without touching
    /// its pin. The table is only reset once the timer accepted the configuration.
    pub fn build(mut self) -> Result<SoftPwm<'a, P, T, N>, SoftPwmError> {
        self.tick.validate()?;
        self.timer.configure_periodic_tick(&self.tick).map_err(|_| {
            error!("timer backend rejected the tick configuration");
            SoftPwmError::TimerBackend
        })?;
        self.table.reset();

        info!(
            "soft PWM ready: {} channels, {} ms cycle",
            N,
            self.tick.cycle_period_ms()
        );

        Ok(SoftPwm {
            table: self.table,
            pins: self.pins,
            timer: self.timer,
            default_polarity: self.default_polarity,
            tick: self.tick,
        })
    }
}

/// Channel registry, used from normal execution context only.
///
/// Owns the pin and timer backends and mutates the shared [`ChannelTable`] while the tick
/// interrupt keeps running. Operations address channels by pin; [`Target::All`] applies an
/// operation to every occupied channel.
pub struct SoftPwm<'a, P: PinBackend, T, const N: usize> {
    table: &'a ChannelTable<P::Output, N>,
    pins: P,
    timer: T,
    default_polarity: Polarity,
    tick: TickConfig,
}

impl<'a, P, T, const N: usize> SoftPwm<'a, P, T, N>
where
    P: PinBackend,
    T: TimerBackend,
{
    /// Set the duty target of a channel, attaching `pin` to a free slot if it is not yet
    /// tracked.
    ///
    /// A newly attached pin is driven to its "off" level before it becomes an output. With
    /// `immediate` the shared cycle restarts on the next tick, which shifts the phase of
    /// every channel, not just this one. The restart happens before the slot lookup, so it
    /// also takes effect when attaching fails.
    pub fn set_duty(
        &mut self,
        target: Target,
        value: u8,
        immediate: bool,
    ) -> Result<(), SoftPwmError> {
        if immediate {
            self.restart_cycle()?;
        }

        let table = self.table;

        match target {
            Target::All => {
                for slot in table.matching(Target::All) {
                    slot.target.store(value, Ordering::SeqCst);
                }

                Ok(())
            }
            Target::Pin(pin) => {
                if let Some(slot) = table.matching(target).next() {
                    slot.target.store(value, Ordering::SeqCst);
                    return Ok(());
                }

                self.attach(pin, value)
            }
        }
    }

    /// [`set_duty`](Self::set_duty) with a 0..=100 percentage.
    pub fn set_duty_percent(
        &mut self,
        target: Target,
        percent: u8,
        immediate: bool,
    ) -> Result<(), SoftPwmError> {
        let value = percent_to_duty(percent)?;

        self.set_duty(target, value, immediate)
    }

    /// Change which electrical level counts as "on".
    pub fn set_polarity(
        &mut self,
        target: Target,
        polarity: impl Into<Polarity>,
    ) -> Result<(), SoftPwmError> {
        let polarity = polarity.into();

        self.for_each_match(target, |slot| slot.set_polarity(polarity))
    }

    /// Set how long a full 0..=255 sweep takes in each direction. A zero duration makes
    /// that direction jump to the target at the next cycle.
    pub fn set_fade_time(
        &mut self,
        target: Target,
        fade_up_ms: u16,
        fade_down_ms: u16,
    ) -> Result<(), SoftPwmError> {
        let fade_up = self.tick.fade_rate(fade_up_ms);
        let fade_down = self.tick.fade_rate(fade_down_ms);

        debug!(
            "fade {} ms up -> {}/cycle, {} ms down -> {}/cycle",
            fade_up_ms,
            fade_up,
            fade_down_ms,
            fade_down
        );

        self.for_each_match(target, |slot| {
            slot.fade_up.store(fade_up, Ordering::SeqCst);
            slot.fade_down.store(fade_down, Ordering::SeqCst);
        })
    }

    /// Stop driving a channel: its slot is freed, then the pin is pulled high and turned
    /// into an input.
    ///
    /// Every matching slot is freed even if the pin backend fails to park its pin; the
    /// last backend error is returned and the slot stays free.
    pub fn detach(&mut self, target: Target) -> Result<(), SoftPwmError> {
        let table = self.table;
        let mut found = false;
        let mut result = Ok(());

        for slot in table.matching(target) {
            let Some(pin) = slot.pin() else {
                continue;
            };

            drop(slot.release());
            found = true;

            if let Err(err) = self.park(pin) {
                result = Err(err);
            }

            debug!("detached pin {}", pin);
        }

        match target {
            Target::Pin(_) if !found => Err(SoftPwmError::UnknownPin),
            _ => result,
        }
    }

    /// The table this registry writes to.
    pub fn table(&self) -> &'a ChannelTable<P::Output, N> {
        self.table
    }

    /// Polarity given to newly attached channels.
    pub fn default_polarity(&self) -> Polarity {
        self.default_polarity
    }

    /// Tick rate the timer was configured with.
    pub fn tick_config(&self) -> TickConfig {
        self.tick
    }

    /// Give back the backends. Attached channels stay in the table and keep running.
    pub fn free(self) -> (P, T) {
        (self.pins, self.timer)
    }

    fn attach(&mut self, pin: u8, value: u8) -> Result<(), SoftPwmError> {
        let id = i8::try_from(pin).map_err(|_| SoftPwmError::InvalidPin)?;
        let table = self.table;

        let Some((index, slot)) = table
            .slots
            .iter()
            .enumerate()
            .find(|(_, slot)| !slot.is_occupied())
        else {
            warn!("no free channel slot for pin {}", pin);
            return Err(SoftPwmError::NoChannelSlotAvailable);
        };

        let handle = self.pins.resolve(pin).map_err(|_| {
            error!("pin backend cannot resolve pin {}", pin);
            SoftPwmError::PinBackend
        })?;
        let polarity = self.default_polarity;

        self.pins
            .write_level(pin, polarity.level(false))
            .map_err(|_| SoftPwmError::PinBackend)?;
        self.pins
            .set_mode(pin, PinMode::Output)
            .map_err(|_| SoftPwmError::PinBackend)?;

        slot.claim(id, handle, polarity, value);

        debug!("attached pin {} to slot {}", pin, index);

        Ok(())
    }

    fn park(&mut self, pin: u8) -> Result<(), SoftPwmError> {
        self.pins
            .write_level(pin, PinState::High)
            .map_err(|_| SoftPwmError::PinBackend)?;
        self.pins
            .set_mode(pin, PinMode::Input)
            .map_err(|_| SoftPwmError::PinBackend)
    }

    fn restart_cycle(&mut self) -> Result<(), SoftPwmError> {
        self.timer
            .reset_counter(0)
            .map_err(|_| SoftPwmError::TimerBackend)?;
        self.table.restart_cycle();

        trace!("cycle restarted");

        Ok(())
    }

    fn for_each_match(
        &self,
        target: Target,
        mut f: impl FnMut(&ChannelSlot<P::Output>),
    ) -> Result<(), SoftPwmError> {
        let mut found = false;

        for slot in self.table.matching(target) {
            f(slot);
            found = true;
        }

        match target {
            Target::Pin(_) if !found => Err(SoftPwmError::UnknownPin),
            _ => Ok(()),
        }
    }
}
