use core::fmt;

use crate::hal::SleepMode;

/// Nodes of the power sequencing state machine.
///
/// `*Entry` nodes perform one-shot side effects and immediately fall through
/// to their steady counterpart. Codes are stable and exposed over register
/// 0x05.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerState {
    Start = 0x00,
    WaitEntry = 0x01,
    Wait = 0x02,
    ButtonPress = 0x03,
    ButtonRelease = 0x04,
    SignaledOnEntry = 0x05,
    SignaledOn = 0x06,
    McuRunningEntry = 0x07,
    McuRunning = 0x08,
    IdleEntry = 0x09,
    Idle = 0x0A,
    IdleExit = 0x0B,
    SignaledOffEntry = 0x0C,
    SignaledOff = 0x0D,
    McuOffEntry = 0x0E,
    McuOff = 0x0F,
    PowerDownEntry = 0x10,
    PowerDownExit = 0x11,
}

impl PowerState {
    pub const ALL: [PowerState; 18] = [
        PowerState::Start,
        PowerState::WaitEntry,
        PowerState::Wait,
        PowerState::ButtonPress,
        PowerState::ButtonRelease,
        PowerState::SignaledOnEntry,
        PowerState::SignaledOn,
        PowerState::McuRunningEntry,
        PowerState::McuRunning,
        PowerState::IdleEntry,
        PowerState::Idle,
        PowerState::IdleExit,
        PowerState::SignaledOffEntry,
        PowerState::SignaledOff,
        PowerState::McuOffEntry,
        PowerState::McuOff,
        PowerState::PowerDownEntry,
        PowerState::PowerDownExit,
    ];

    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a raw state byte; `None` marks a corrupted memo.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        let state = match code {
            0x00 => PowerState::Start,
            0x01 => PowerState::WaitEntry,
            0x02 => PowerState::Wait,
            0x03 => PowerState::ButtonPress,
            0x04 => PowerState::ButtonRelease,
            0x05 => PowerState::SignaledOnEntry,
            0x06 => PowerState::SignaledOn,
            0x07 => PowerState::McuRunningEntry,
            0x08 => PowerState::McuRunning,
            0x09 => PowerState::IdleEntry,
            0x0A => PowerState::Idle,
            0x0B => PowerState::IdleExit,
            0x0C => PowerState::SignaledOffEntry,
            0x0D => PowerState::SignaledOff,
            0x0E => PowerState::McuOffEntry,
            0x0F => PowerState::McuOff,
            0x10 => PowerState::PowerDownEntry,
            0x11 => PowerState::PowerDownExit,
            _ => return None,
        };
        Some(state)
    }

    /// States that are remembered as the previous stable state when left.
    #[must_use]
    pub const fn is_steady(self) -> bool {
        matches!(
            self,
            PowerState::Start
                | PowerState::Wait
                | PowerState::SignaledOn
                | PowerState::McuRunning
                | PowerState::Idle
                | PowerState::SignaledOff
                | PowerState::McuOff
        )
    }

    /// Entry nodes evaluate their successor within the same poll iteration.
    #[must_use]
    pub const fn is_entry(self) -> bool {
        matches!(
            self,
            PowerState::WaitEntry
                | PowerState::SignaledOnEntry
                | PowerState::McuRunningEntry
                | PowerState::IdleEntry
                | PowerState::SignaledOffEntry
                | PowerState::McuOffEntry
                | PowerState::PowerDownEntry
        )
    }

    /// Sleep depth used at the end of a poll iteration spent in this state.
    #[must_use]
    pub const fn sleep_mode(self) -> SleepMode {
        match self {
            PowerState::Idle => SleepMode::AdcNoiseReduction,
            _ => SleepMode::Idle,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            PowerState::Start => "start",
            PowerState::WaitEntry => "wait-entry",
            PowerState::Wait => "wait",
            PowerState::ButtonPress => "button-press",
            PowerState::ButtonRelease => "button-release",
            PowerState::SignaledOnEntry => "signaled-on-entry",
            PowerState::SignaledOn => "signaled-on",
            PowerState::McuRunningEntry => "mcu-running-entry",
            PowerState::McuRunning => "mcu-running",
            PowerState::IdleEntry => "idle-entry",
            PowerState::Idle => "idle",
            PowerState::IdleExit => "idle-exit",
            PowerState::SignaledOffEntry => "signaled-off-entry",
            PowerState::SignaledOff => "signaled-off",
            PowerState::McuOffEntry => "mcu-off-entry",
            PowerState::McuOff => "mcu-off",
            PowerState::PowerDownEntry => "power-down-entry",
            PowerState::PowerDownExit => "power-down-exit",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw-encoded current and previous stable state, stored as one unit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StateMemo {
    pub current: u8,
    pub previous: u8,
}

impl StateMemo {
    #[must_use]
    pub const fn boot() -> Self {
        Self {
            current: PowerState::Start.code(),
            previous: PowerState::Start.code(),
        }
    }

    /// Memo after moving from `from` to `to`.
    ///
    /// `previous` only follows when a steady state is left, so it always
    /// names the last steady state.
    #[must_use]
    pub const fn advance(self, from: PowerState, to: PowerState) -> Self {
        Self {
            current: to.code(),
            previous: if from.is_steady() {
                from.code()
            } else {
                self.previous
            },
        }
    }

    #[must_use]
    pub const fn current(self) -> Option<PowerState> {
        PowerState::from_code(self.current)
    }

    #[must_use]
    pub const fn previous(self) -> Option<PowerState> {
        PowerState::from_code(self.previous)
    }
}

impl Default for StateMemo {
    fn default() -> Self {
        Self::boot()
    }
}
