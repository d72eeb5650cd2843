//! Tick-granular up-counting timers.
//!
//! A [`TickTimer`] counts ticks upward from the moment it is armed and is
//! compared against thresholds from [`crate::config::Thresholds`]. A negative
//! count means the timer is disarmed and ignores ticks.

/// Largest count a timer can hold; further ticks saturate here.
pub const MAX_TIMER_TICKS: u16 = i16::MAX.unsigned_abs();

const DISARMED: i16 = -1;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickTimer {
    count: i16,
}

impl TickTimer {
    #[must_use]
    pub const fn disarmed() -> Self {
        Self { count: DISARMED }
    }

    /// Starts counting from zero.
    pub fn arm(&mut self) {
        self.count = 0;
    }

    pub fn disarm(&mut self) {
        self.count = DISARMED;
    }

    #[must_use]
    pub const fn is_armed(self) -> bool {
        self.count >= 0
    }

    /// Called from the tick handler.
    pub fn increment(&mut self) {
        if self.count >= 0 {
            self.count = self.count.saturating_add(1);
        }
    }

    /// Ticks since arming, or `None` when disarmed.
    #[must_use]
    pub const fn elapsed(self) -> Option<u16> {
        if self.count >= 0 {
            Some(self.count.unsigned_abs())
        } else {
            None
        }
    }

    /// True once an armed timer has counted at least `ticks`.
    #[must_use]
    pub const fn has_reached(self, ticks: u16) -> bool {
        match self.elapsed() {
            Some(elapsed) => elapsed >= ticks,
            None => false,
        }
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::disarmed()
    }
}

/// Selects one of the sequencer's timers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    ButtonHold,
    Wakeup,
    Idle,
}

/// The three timers the tick handler advances.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerBank {
    button_hold: TickTimer,
    wakeup: TickTimer,
    idle: TickTimer,
}

impl TimerBank {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            button_hold: TickTimer::disarmed(),
            wakeup: TickTimer::disarmed(),
            idle: TickTimer::disarmed(),
        }
    }

    pub fn tick(&mut self) {
        self.button_hold.increment();
        self.wakeup.increment();
        self.idle.increment();
    }

    #[must_use]
    pub const fn get(&self, id: TimerId) -> TickTimer {
        match id {
            TimerId::ButtonHold => self.button_hold,
            TimerId::Wakeup => self.wakeup,
            TimerId::Idle => self.idle,
        }
    }

    pub fn get_mut(&mut self, id: TimerId) -> &mut TickTimer {
        match id {
            TimerId::ButtonHold => &mut self.button_hold,
            TimerId::Wakeup => &mut self.wakeup,
            TimerId::Idle => &mut self.idle,
        }
    }
}
