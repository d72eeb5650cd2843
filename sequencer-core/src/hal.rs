//! Hardware seams consumed by the controller.
//!
//! Firmware binds these traits to real peripherals; the emulator and the test
//! suite bind them to simulated boards. Nothing in this crate touches a
//! register directly.

use core::time::Duration;

use critical_section::CriticalSection;

use crate::signals::SignalId;

/// Raw digital input levels, read once per tick.
pub trait SignalSource {
    /// Returns `true` when the input is electrically asserted.
    fn read(&mut self, id: SignalId) -> bool;
}

/// Output lines driven by the sequencer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputId {
    /// Power enable for the host computer.
    Enable,
    /// Request line the host polls to begin an orderly shutdown.
    ShutdownRequest,
}

/// Direction of the auxiliary open-drain pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinDirection {
    /// Released; the external pull-up sets the level.
    Input,
    Output,
}

pub trait DigitalOutputs {
    fn set(&mut self, id: OutputId, high: bool);

    fn set_aux_direction(&mut self, direction: PinDirection);

    fn set_aux_level(&mut self, high: bool);

    /// Current electrical level of the auxiliary pin.
    fn aux_level(&mut self) -> bool;
}

/// Single-conversion analog front end.
///
/// Completion is reported asynchronously through
/// [`crate::shared::SharedState::on_conversion_complete`].
pub trait AnalogInput {
    fn start_conversion(&mut self, channel: u8);

    fn power_down(&mut self);

    fn power_up(&mut self);
}

/// Liveness supervisor.
pub trait Watchdog {
    fn arm(&mut self, timeout: Duration);

    fn disarm(&mut self);

    fn pet(&mut self);
}

/// CPU suspend depth requested by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepMode {
    /// Clocks keep running; any interrupt resumes.
    Idle,
    /// Quiets the CPU for conversions; SPI and ADC interrupts still resume.
    AdcNoiseReduction,
    /// Deepest level; only the wake source resumes.
    PowerDown,
}

pub trait LowPower {
    fn set_tick_enabled(&mut self, enabled: bool);

    fn set_wake_source_enabled(&mut self, enabled: bool);

    fn set_transport_enabled(&mut self, enabled: bool);

    /// Unmasks interrupts and suspends as a single indivisible step.
    ///
    /// Called with interrupts masked. An interrupt that became pending before
    /// the call must end the suspend immediately. Returns once an interrupt
    /// has been taken; the critical section is re-established on return.
    fn suspend(&mut self, mode: SleepMode, cs: CriticalSection<'_>);
}

/// Everything the controller loop drives.
pub trait Board: DigitalOutputs + AnalogInput + Watchdog + LowPower {}

impl<T> Board for T where T: DigitalOutputs + AnalogInput + Watchdog + LowPower {}

/// Board that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopBoard;

impl NoopBoard {
    /// Creates a new no-op board.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SignalSource for NoopBoard {
    fn read(&mut self, _: SignalId) -> bool {
        false
    }
}

impl DigitalOutputs for NoopBoard {
    fn set(&mut self, _: OutputId, _: bool) {}

    fn set_aux_direction(&mut self, _: PinDirection) {}

    fn set_aux_level(&mut self, _: bool) {}

    fn aux_level(&mut self) -> bool {
        true
    }
}

impl AnalogInput for NoopBoard {
    fn start_conversion(&mut self, _: u8) {}

    fn power_down(&mut self) {}

    fn power_up(&mut self) {}
}

impl Watchdog for NoopBoard {
    fn arm(&mut self, _: Duration) {}

    fn disarm(&mut self) {}

    fn pet(&mut self) {}
}

impl LowPower for NoopBoard {
    fn set_tick_enabled(&mut self, _: bool) {}

    fn set_wake_source_enabled(&mut self, _: bool) {}

    fn set_transport_enabled(&mut self, _: bool) {}

    fn suspend(&mut self, _: SleepMode, _: CriticalSection<'_>) {}
}
