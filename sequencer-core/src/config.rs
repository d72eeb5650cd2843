//! Timing configuration shared by firmware and host targets.
//!
//! Every timeout the sequencer uses is expressed here as a wall-clock duration
//! and converted exactly once into tick counts derived from the configured
//! tick period. Transition logic only ever compares tick counts, so porting to
//! a different clock tree means changing [`SequencerConfig::tick_period`] and
//! nothing else.

use core::{fmt, time::Duration};

use crate::signals::HISTORY_WIDTH;
use crate::timers::MAX_TIMER_TICKS;

/// Period of the sampling tick interrupt.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(8);
/// Minimum hold for a press to count as intentional.
pub const DEFAULT_HOLD_THRESHOLD: Duration = Duration::from_millis(100);
/// Dwell in `Wait` before giving up and powering down.
pub const DEFAULT_WAKE_TIMEOUT: Duration = Duration::from_millis(750);
/// Quiet period in `MCURunning` before dropping into the idle dwell.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);
/// Liveness supervisor timeout.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_millis(500);

/// Firmware major version reported through register 0x04.
pub const FIRMWARE_MAJOR: u8 = 1;
/// Firmware minor version reported through register 0x04.
pub const FIRMWARE_MINOR: u8 = 2;

/// Identity bytes served over the register link.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareIdentity {
    pub major: u8,
    pub minor: u8,
    /// Hardware capability flag (register 0x06).
    pub capability: bool,
}

impl FirmwareIdentity {
    pub const fn new(major: u8, minor: u8, capability: bool) -> Self {
        Self {
            major,
            minor,
            capability,
        }
    }
}

impl Default for FirmwareIdentity {
    fn default() -> Self {
        Self::new(FIRMWARE_MAJOR, FIRMWARE_MINOR, false)
    }
}

/// Durations and identity used to build a controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequencerConfig {
    pub tick_period: Duration,
    pub hold_threshold: Duration,
    pub wake_timeout: Duration,
    /// `None` disables the idle dwell entirely.
    pub idle_timeout: Option<Duration>,
    pub watchdog_timeout: Duration,
    pub identity: FirmwareIdentity,
}

impl SequencerConfig {
    /// Configuration with the board defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            hold_threshold: DEFAULT_HOLD_THRESHOLD,
            wake_timeout: DEFAULT_WAKE_TIMEOUT,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            identity: FirmwareIdentity::new(FIRMWARE_MAJOR, FIRMWARE_MINOR, false),
        }
    }

    #[must_use]
    pub const fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    #[must_use]
    pub const fn with_hold_threshold(mut self, hold: Duration) -> Self {
        self.hold_threshold = hold;
        self
    }

    #[must_use]
    pub const fn with_wake_timeout(mut self, timeout: Duration) -> Self {
        self.wake_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_identity(mut self, identity: FirmwareIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Total time an input must hold steady before it is treated as settled.
    #[must_use]
    pub fn debounce_latency(&self) -> Duration {
        self.tick_period * HISTORY_WIDTH
    }

    /// Checks the configuration and derives its tick thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the tick period is zero, a threshold does
    /// not fit the timer range, or the watchdog would fire within two ticks.
    pub fn validate(&self) -> Result<Thresholds, ConfigError> {
        if self.tick_period.is_zero() {
            return Err(ConfigError::ZeroTickPeriod);
        }

        let hold = checked_ticks(self.hold_threshold, self.tick_period)
            .ok_or(ConfigError::OutOfRange(Threshold::Hold))?;
        let wake = checked_ticks(self.wake_timeout, self.tick_period)
            .ok_or(ConfigError::OutOfRange(Threshold::Wake))?;
        let idle = match self.idle_timeout {
            Some(timeout) => Some(
                checked_ticks(timeout, self.tick_period)
                    .ok_or(ConfigError::OutOfRange(Threshold::Idle))?,
            ),
            None => None,
        };

        if self.watchdog_timeout < self.tick_period * 2 {
            return Err(ConfigError::WatchdogTooShort);
        }

        Ok(Thresholds {
            hold_ticks: hold,
            wake_ticks: wake,
            idle_ticks: idle,
        })
    }

    /// Derives tick thresholds, clamping anything out of range.
    ///
    /// Prefer [`SequencerConfig::validate`] where the error can be reported.
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        Thresholds {
            hold_ticks: clamped_ticks(self.hold_threshold, self.tick_period),
            wake_ticks: clamped_ticks(self.wake_timeout, self.tick_period),
            idle_ticks: match self.idle_timeout {
                Some(timeout) => Some(clamped_ticks(timeout, self.tick_period)),
                None => None,
            },
        }
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick-count thresholds consumed by the sequencer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Thresholds {
    /// Held ticks at or above this count classify a press as long.
    pub hold_ticks: u16,
    pub wake_ticks: u16,
    pub idle_ticks: Option<u16>,
}

/// Converts `duration` to whole ticks, rounding up, never below one tick.
#[must_use]
pub const fn ticks_for(duration: Duration, tick_period: Duration) -> u128 {
    let period = tick_period.as_nanos();
    if period == 0 {
        return 0;
    }
    let ticks = duration.as_nanos().div_ceil(period);
    if ticks == 0 { 1 } else { ticks }
}

#[allow(clippy::cast_lossless, clippy::cast_possible_truncation)]
const fn clamped_ticks(duration: Duration, tick_period: Duration) -> u16 {
    let ticks = ticks_for(duration, tick_period);
    if ticks > MAX_TIMER_TICKS as u128 {
        MAX_TIMER_TICKS
    } else {
        ticks as u16
    }
}

fn checked_ticks(duration: Duration, tick_period: Duration) -> Option<u16> {
    let ticks = ticks_for(duration, tick_period);
    if ticks > u128::from(MAX_TIMER_TICKS) {
        None
    } else {
        u16::try_from(ticks).ok()
    }
}

/// Names the threshold that failed validation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Threshold {
    Hold,
    Wake,
    Idle,
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Hold => f.write_str("hold threshold"),
            Threshold::Wake => f.write_str("wake timeout"),
            Threshold::Idle => f.write_str("idle timeout"),
        }
    }
}

/// Reasons a [`SequencerConfig`] is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    ZeroTickPeriod,
    /// The named threshold needs more ticks than a timer can count.
    OutOfRange(Threshold),
    /// The supervisor would fire before two ticks elapse.
    WatchdogTooShort,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTickPeriod => f.write_str("tick period must be non-zero"),
            ConfigError::OutOfRange(which) => write!(f, "{which} exceeds the timer range"),
            ConfigError::WatchdogTooShort => {
                f.write_str("watchdog timeout must cover at least two ticks")
            }
        }
    }
}
