//! CPU suspend policy and watchdog arming.
//!
//! The wake interrupt may fire at any instant, including between the loop's
//! decision to sleep and the suspend instruction itself. Both sleep paths
//! therefore test their flags with interrupts masked and hand the still-masked
//! context to [`LowPower::suspend`], which unmasks and suspends in one step.
//! A wake that lands before the check is seen by the check; one that lands
//! after it is left pending and ends the suspend immediately.

use core::time::Duration;

use crate::hal::{LowPower, SleepMode, Watchdog};
use crate::shared::SharedState;

/// Result of a guarded power-down.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepOutcome {
    /// The wake flag was already set; the CPU never suspended.
    Skipped,
    /// Number of suspends before the wake flag was seen. Values above one
    /// mean other interrupts resumed the CPU first.
    Woken { suspends: u32 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SleepCoordinator {
    watchdog_timeout: Duration,
    armed: bool,
}

impl SleepCoordinator {
    #[must_use]
    pub const fn new(watchdog_timeout: Duration) -> Self {
        Self {
            watchdog_timeout,
            armed: false,
        }
    }

    /// Arms the supervisor at controller start.
    pub fn start<W: Watchdog + ?Sized>(&mut self, watchdog: &mut W) {
        watchdog.arm(self.watchdog_timeout);
        self.armed = true;
    }

    /// Top-of-iteration liveness report.
    pub fn pet<W: Watchdog + ?Sized>(&mut self, watchdog: &mut W) {
        if self.armed {
            watchdog.pet();
        }
    }

    #[must_use]
    pub const fn watchdog_armed(&self) -> bool {
        self.armed
    }

    /// Suspends in power-down mode until the wake source fires.
    ///
    /// The caller enables the wake source beforehand. On return the wake
    /// source is disabled again, the wake flag has been consumed, and the
    /// supervisor is re-armed.
    pub fn enter_guarded_sleep<B: Watchdog + LowPower + ?Sized>(
        &mut self,
        shared: &SharedState,
        board: &mut B,
    ) -> SleepOutcome {
        board.disarm();
        self.armed = false;

        let mut suspends: u32 = 0;
        while !critical_section::with(|cs| {
            if shared.take_wake() {
                true
            } else {
                board.suspend(SleepMode::PowerDown, cs);
                false
            }
        }) {
            suspends = suspends.saturating_add(1);
        }

        board.set_wake_source_enabled(false);
        board.arm(self.watchdog_timeout);
        self.armed = true;

        if suspends == 0 {
            SleepOutcome::Skipped
        } else {
            SleepOutcome::Woken { suspends }
        }
    }

    /// End-of-iteration sleep; suspends only while no event is pending.
    ///
    /// Returns whether the CPU suspended.
    pub fn light_sleep<L: LowPower + ?Sized>(
        &mut self,
        shared: &SharedState,
        board: &mut L,
        mode: SleepMode,
    ) -> bool {
        critical_section::with(|cs| {
            if shared.event_pending() {
                false
            } else {
                board.suspend(mode, cs);
                true
            }
        })
    }
}
