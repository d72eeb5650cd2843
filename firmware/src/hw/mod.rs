//! STM32G0 binding of the controller's hardware seams.
//!
//! Pin assignment:
//!
//! | Signal            | Pin  | Notes                                        |
//! |-------------------|------|----------------------------------------------|
//! | power button      | PB5  | active low, pull-up, EXTI5 falling wakes     |
//! | host running      | PB6  | active high                                  |
//! | host enable       | PB3  | push-pull                                    |
//! | shutdown request  | PB4  | push-pull                                    |
//! | auxiliary         | PB7  | open drain, external pull-up                 |
//! | SPI1 NSS/SCK/MISO/MOSI | PA4..PA7 | slave, AF0; EXTI4 rising deselects |
//! | analog channels   | PA0..PA3, PB0..PB2, PB10 | ADC IN0..3, IN8..11 |

pub mod adc;
pub mod power;
pub mod transport;

use core::time::Duration;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use critical_section::CriticalSection;
use embassy_stm32::gpio::{Flex, Input, Level, Output, Pull, Speed};
use embassy_stm32::pac;
use sequencer_core::hal::{
    AnalogInput, DigitalOutputs, LowPower, OutputId, PinDirection, SignalSource, SleepMode,
    Watchdog,
};
use sequencer_core::signals::SignalId;

use self::adc::ScanAdc;
use self::power::Supervisor;

/// Core clock after `embassy_stm32::init` with the default configuration (HSI16).
pub const CORE_CLOCK_HZ: u32 = 16_000_000;

/// EXTI line carrying the power button.
pub const BUTTON_LINE: usize = 5;
/// EXTI line carrying SPI1 chip-select.
pub const SELECT_LINE: usize = 4;

/// Largest value the 24-bit SysTick reload register holds.
const SYST_MAX_RELOAD: u32 = 0x00FF_FFFF;

/// SysTick reload value for `period` at [`CORE_CLOCK_HZ`].
#[must_use]
pub fn systick_reload(period: Duration) -> u32 {
    let cycles = period
        .as_micros()
        .saturating_mul(u128::from(CORE_CLOCK_HZ / 1_000_000));
    u32::try_from(cycles.saturating_sub(1))
        .map_or(SYST_MAX_RELOAD, |reload| reload.min(SYST_MAX_RELOAD))
}

/// Inputs sampled from the tick interrupt.
pub struct Inputs {
    button: Input<'static>,
    host_running: Input<'static>,
}

impl Inputs {
    #[must_use]
    pub fn new(button: Input<'static>, host_running: Input<'static>) -> Self {
        Self {
            button,
            host_running,
        }
    }
}

impl SignalSource for Inputs {
    fn read(&mut self, id: SignalId) -> bool {
        match id {
            SignalId::Button => self.button.is_low(),
            SignalId::HostRunning => self.host_running.is_high(),
        }
    }
}

/// Lines driven by the sequencer and the register engine.
pub struct Outputs {
    pub enable: Output<'static>,
    pub shutdown_request: Output<'static>,
    pub aux: Flex<'static>,
}

/// Owns every peripheral the controller loop drives.
pub struct SequencerBoard {
    enable: Output<'static>,
    shutdown_request: Output<'static>,
    aux: Flex<'static>,
    adc: ScanAdc,
    supervisor: Supervisor,
    syst: SYST,
    scb: SCB,
}

impl SequencerBoard {
    #[must_use]
    pub fn new(
        outputs: Outputs,
        adc: ScanAdc,
        supervisor: Supervisor,
        mut syst: SYST,
        scb: SCB,
        tick_period: Duration,
    ) -> Self {
        let Outputs {
            enable,
            shutdown_request,
            mut aux,
        } = outputs;
        aux.set_as_input(Pull::None);

        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(systick_reload(tick_period));
        syst.clear_current();
        syst.enable_counter();

        configure_button_line();
        transport::configure();

        Self {
            enable,
            shutdown_request,
            aux,
            adc,
            supervisor,
            syst,
            scb,
        }
    }
}

fn configure_button_line() {
    let exti = pac::EXTI;
    // Port B.
    exti.exticr(BUTTON_LINE / 4)
        .modify(|w| w.set_exti(BUTTON_LINE % 4, 1));
    exti.ftsr(0).modify(|w| w.set_line(BUTTON_LINE, true));
    exti.rtsr(0).modify(|w| w.set_line(BUTTON_LINE, false));
}

impl DigitalOutputs for SequencerBoard {
    fn set(&mut self, id: OutputId, high: bool) {
        let pin = match id {
            OutputId::Enable => &mut self.enable,
            OutputId::ShutdownRequest => &mut self.shutdown_request,
        };
        pin.set_level(Level::from(high));
    }

    fn set_aux_direction(&mut self, direction: PinDirection) {
        match direction {
            PinDirection::Input => self.aux.set_as_input(Pull::None),
            PinDirection::Output => self.aux.set_as_output(Speed::Low),
        }
    }

    fn set_aux_level(&mut self, high: bool) {
        self.aux.set_level(Level::from(high));
    }

    fn aux_level(&mut self) -> bool {
        self.aux.is_high()
    }
}

impl AnalogInput for SequencerBoard {
    fn start_conversion(&mut self, channel: u8) {
        self.adc.start(channel);
    }

    fn power_down(&mut self) {
        self.adc.disable();
    }

    fn power_up(&mut self) {
        self.adc.enable();
    }
}

impl Watchdog for SequencerBoard {
    fn arm(&mut self, timeout: Duration) {
        self.supervisor.arm(timeout);
    }

    fn disarm(&mut self) {
        self.supervisor.disarm();
    }

    fn pet(&mut self) {
        self.supervisor.pet();
    }
}

impl LowPower for SequencerBoard {
    fn set_tick_enabled(&mut self, enabled: bool) {
        if enabled {
            self.syst.clear_current();
            self.syst.enable_interrupt();
        } else {
            self.syst.disable_interrupt();
        }
    }

    fn set_wake_source_enabled(&mut self, enabled: bool) {
        let exti = pac::EXTI;
        if enabled {
            exti.fpr(0).write(|w| w.set_line(BUTTON_LINE, true));
        }
        exti.imr(0).modify(|w| w.set_line(BUTTON_LINE, enabled));
    }

    fn set_transport_enabled(&mut self, enabled: bool) {
        transport::set_enabled(enabled);
    }

    fn suspend(&mut self, mode: SleepMode, _: CriticalSection<'_>) {
        power::suspend(&mut self.scb, mode);
    }
}
