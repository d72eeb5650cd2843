use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::peripheral::NVIC;
use cortex_m::register::primask;
use cortex_m_rt::{entry, exception};
use critical_section::{self, Mutex, RawRestoreState};
use defmt_rtt as _;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Flex, Input, Level, Output, Pull, Speed};
use embassy_stm32::pac;
use sequencer_core::config::SequencerConfig;
use sequencer_core::controller::Controller;
use sequencer_core::shared::SharedState;

use crate::hw::adc::{self, ScanAdc};
use crate::hw::power::{self, Supervisor};
use crate::hw::{BUTTON_LINE, Inputs, Outputs, SequencerBoard, transport};
use crate::log::{LogMirror, log_boot, log_config_rejected};

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

const CONFIG: SequencerConfig = SequencerConfig::new();

static SHARED: SharedState = SharedState::new();
static INPUTS: Mutex<RefCell<Option<Inputs>>> = Mutex::new(RefCell::new(None));

#[entry]
fn main() -> ! {
    let p = hal::init(hal::Config::default());
    let core = cortex_m::Peripherals::take().expect("core peripherals are taken once");
    power::configure();

    let inputs = Inputs::new(Input::new(p.PB5, Pull::Up), Input::new(p.PB6, Pull::Down));
    critical_section::with(|cs| INPUTS.borrow_ref_mut(cs).replace(inputs));

    let outputs = Outputs {
        enable: Output::new(p.PB3, Level::Low, Speed::Low),
        shutdown_request: Output::new(p.PB4, Level::Low, Speed::Low),
        aux: Flex::new(p.PB7),
    };
    let board = SequencerBoard::new(
        outputs,
        ScanAdc::power_on(),
        Supervisor::new(p.IWDG),
        core.SYST,
        core.SCB,
        CONFIG.tick_period,
    );

    let controller = match Controller::new(&SHARED, board, &CONFIG) {
        Ok(controller) => controller,
        Err(error) => {
            log_config_rejected(error);
            cortex_m::asm::udf();
        }
    };
    log_boot(CONFIG.identity, CONFIG.thresholds());

    unsafe {
        NVIC::unmask(hal::interrupt::EXTI4_15);
        NVIC::unmask(hal::interrupt::SPI1);
        NVIC::unmask(hal::interrupt::ADC1_COMP);
    }

    let mut mirror = LogMirror::new();
    controller.run(|controller, _| {
        mirror.drain(controller.log());
    })
}

#[exception]
fn SysTick() {
    critical_section::with(|cs| {
        if let Some(inputs) = INPUTS.borrow_ref_mut(cs).as_mut() {
            SHARED.on_tick(inputs);
        }
    });
}

#[pac::interrupt]
fn EXTI4_15() {
    let exti = pac::EXTI;
    if exti.fpr(0).read().line(BUTTON_LINE) {
        exti.fpr(0).write(|w| w.set_line(BUTTON_LINE, true));
        SHARED.on_wake();
    }
    if transport::acknowledge_deselect() {
        SHARED.on_deselect();
    }
}

#[pac::interrupt]
fn SPI1() {
    while let Some(received) = transport::read_byte() {
        let reply = SHARED.on_byte_exchanged(received, transport::selected());
        transport::write_byte(reply);
    }
}

#[pac::interrupt]
fn ADC1_COMP() {
    if let Some(value) = adc::take_result() {
        SHARED.on_conversion_complete(value);
    }
}
