use crate::SoftPwmError;

/// Number of ticks in one PWM cycle.
pub const TICKS_PER_CYCLE: u32 = 256;

/// Compare value used by [`TickConfig::default`].
pub const DEFAULT_COMPARE: u16 = 130;
/// CPU clock used by [`TickConfig::default`].
pub const DEFAULT_CLOCK_HZ: u32 = 16_000_000;
/// Timer prescaler used by [`TickConfig::default`].
pub const DEFAULT_PRESCALER: u32 = 8;

/// Describes the rate of the periodic tick interrupt.
///
/// The driver itself never touches timer registers, it only needs the resulting PWM
/// cycle period to turn fade durations into per-cycle step sizes. The same value is handed
/// to [`TimerBackend::configure_periodic_tick`](crate::TimerBackend::configure_periodic_tick)
/// so the backend can program the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickConfig {
    /// Compare-match (CTC) timer clocked from the CPU through a prescaler.
    Compare {
        /// Compare register value
        compare: u16,
        /// CPU clock in Hz
        clock_hz: u32,
        /// Timer clock divider
        prescaler: u32,
    },
    /// Interval timer firing `cycle_hz * 256` times per second.
    Interval {
        /// PWM cycles per second
        cycle_hz: u32,
    },
}

impl Default for TickConfig {
    fn default() -> Self {
        Self::Compare {
            compare: DEFAULT_COMPARE,
            clock_hz: DEFAULT_CLOCK_HZ,
            prescaler: DEFAULT_PRESCALER,
        }
    }
}

impl TickConfig {
    /// Check that the configuration does not divide by zero anywhere.
    pub fn validate(&self) -> Result<(), SoftPwmError> {
        match *self {
            Self::Compare {
                compare,
                clock_hz,
                prescaler,
            } => {
                if compare == 0 || prescaler == 0 {
                    return Err(SoftPwmError::InvalidTickConfig);
                }

                match prescaler.checked_mul(1000) {
                    Some(divider) if clock_hz / divider != 0 => Ok(()),
                    _ => Err(SoftPwmError::InvalidTickConfig),
                }
            }
            Self::Interval { cycle_hz } if cycle_hz == 0 => Err(SoftPwmError::InvalidTickConfig),
            Self::Interval { .. } => Ok(()),
        }
    }

    /// Length of one 256-tick PWM cycle in whole milliseconds.
    ///
    /// Returns 0 for a configuration that fails [`validate`](Self::validate).
    #[must_use]
    pub fn cycle_period_ms(&self) -> u32 {
        if self.validate().is_err() {
            return 0;
        }

        match *self {
            Self::Compare {
                compare,
                clock_hz,
                prescaler,
            } => {
                let timer_khz = clock_hz / (prescaler * 1000);

                u32::from(compare) * TICKS_PER_CYCLE / timer_khz
            }
            Self::Interval { cycle_hz } => 1000 / cycle_hz,
        }
    }

    /// Per-cycle step needed to sweep the full 0..=255 range in `duration_ms`.
    ///
    /// A zero duration disables fading. Any nonzero duration yields at least 1 so that a
    /// long fade still makes progress.
    #[must_use]
    pub fn fade_rate(&self, duration_ms: u16) -> u8 {
        if duration_ms == 0 {
            return 0;
        }

        let rate = 255 * self.cycle_period_ms() / u32::from(duration_ms);

        u8::try_from(rate).unwrap_or(u8::MAX).max(1)
    }
}
