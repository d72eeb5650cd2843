//! Tick-sampled debounce for the two monitored digital inputs.

use core::fmt;

use crate::hal::SignalSource;

/// Number of consecutive samples that must agree before a level is settled.
pub const HISTORY_WIDTH: u32 = u8::BITS;

/// Identifies one of the monitored inputs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalId {
    /// Momentary pushbutton, high while pressed.
    Button,
    /// Host "running" indication, high while the host OS is up.
    HostRunning,
}

impl SignalId {
    pub const ALL: [SignalId; 2] = [SignalId::Button, SignalId::HostRunning];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SignalId::Button => "button",
            SignalId::HostRunning => "host-running",
        }
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Debounced view of a [`DigitalSignal`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalLevel {
    Asserted,
    Deasserted,
    /// Samples in the window disagree.
    Indeterminate,
}

impl fmt::Display for SignalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalLevel::Asserted => f.write_str("asserted"),
            SignalLevel::Deasserted => f.write_str("deasserted"),
            SignalLevel::Indeterminate => f.write_str("indeterminate"),
        }
    }
}

/// Eight-sample shift history; the newest sample occupies bit 0.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DigitalSignal {
    history: u8,
}

impl DigitalSignal {
    /// A signal that has only ever sampled low.
    #[must_use]
    pub const fn new() -> Self {
        Self { history: 0x00 }
    }

    #[must_use]
    pub const fn from_history(history: u8) -> Self {
        Self { history }
    }

    #[must_use]
    pub const fn history(self) -> u8 {
        self.history
    }

    /// Shifts one raw sample into the history.
    pub fn sample(&mut self, high: bool) {
        self.history = (self.history << 1) | u8::from(high);
    }

    #[must_use]
    pub const fn level(self) -> SignalLevel {
        match self.history {
            0xFF => SignalLevel::Asserted,
            0x00 => SignalLevel::Deasserted,
            _ => SignalLevel::Indeterminate,
        }
    }

    #[must_use]
    pub const fn is_asserted(self) -> bool {
        self.history == 0xFF
    }

    #[must_use]
    pub const fn is_deasserted(self) -> bool {
        self.history == 0x00
    }

    #[must_use]
    pub const fn is_indeterminate(self) -> bool {
        !self.is_asserted() && !self.is_deasserted()
    }
}

/// Histories for every monitored input, updated together on each tick.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalBank {
    button: DigitalSignal,
    host_running: DigitalSignal,
}

impl SignalBank {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            button: DigitalSignal::new(),
            host_running: DigitalSignal::new(),
        }
    }

    /// Samples every input once.
    pub fn tick<S: SignalSource + ?Sized>(&mut self, source: &mut S) {
        for id in SignalId::ALL {
            let high = source.read(id);
            self.signal_mut(id).sample(high);
        }
    }

    #[must_use]
    pub const fn signal(&self, id: SignalId) -> DigitalSignal {
        match id {
            SignalId::Button => self.button,
            SignalId::HostRunning => self.host_running,
        }
    }

    fn signal_mut(&mut self, id: SignalId) -> &mut DigitalSignal {
        match id {
            SignalId::Button => &mut self.button,
            SignalId::HostRunning => &mut self.host_running,
        }
    }

    #[must_use]
    pub const fn level(&self, id: SignalId) -> SignalLevel {
        self.signal(id).level()
    }

    #[must_use]
    pub const fn is_asserted(&self, id: SignalId) -> bool {
        self.signal(id).is_asserted()
    }

    #[must_use]
    pub const fn is_deasserted(&self, id: SignalId) -> bool {
        self.signal(id).is_deasserted()
    }

    #[must_use]
    pub const fn is_indeterminate(&self, id: SignalId) -> bool {
        self.signal(id).is_indeterminate()
    }
}
