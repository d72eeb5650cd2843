//! Interrupt-driven single conversions on ADC1.

use embassy_stm32::pac;
use embassy_time::{Duration, block_for};
use sequencer_core::shared::CHANNEL_COUNT;

/// ADC input backing each logical channel.
const INPUTS: [u8; CHANNEL_COUNT] = [0, 1, 2, 3, 8, 9, 10, 11];

/// Regulator start-up time before the converter may be enabled.
const REGULATOR_SETTLE: Duration = Duration::from_micros(20);

/// ADC1 driven through its registers; completions land in `ADC1_COMP`.
pub struct ScanAdc {
    enabled: bool,
}

impl ScanAdc {
    /// Clocks, calibrates, and enables the converter.
    #[must_use]
    pub fn power_on() -> Self {
        pac::RCC.apbenr2().modify(|w| w.set_adcen(true));

        let adc = pac::ADC1;
        adc.cr().modify(|w| w.set_advregen(true));
        block_for(REGULATOR_SETTLE);
        adc.cr().modify(|w| w.set_adcal(true));
        while adc.cr().read().adcal() {}

        adc.ier().write(|w| w.set_eocie(true));

        let mut scan = Self { enabled: false };
        scan.enable();
        scan
    }

    pub fn start(&mut self, channel: u8) {
        let Some(input) = INPUTS.get(usize::from(channel)) else {
            return;
        };
        if !self.enabled {
            return;
        }

        let adc = pac::ADC1;
        adc.isr().write(|w| w.set_ccrdy(true));
        adc.chselr().write_value(pac::adc::regs::Chselr(1 << input));
        while !adc.isr().read().ccrdy() {}
        adc.cr().modify(|w| w.set_adstart(true));
    }

    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        let adc = pac::ADC1;
        if adc.cr().read().adstart() {
            adc.cr().modify(|w| w.set_adstp(true));
            while adc.cr().read().adstp() {}
        }
        adc.cr().modify(|w| w.set_addis(true));
        while adc.cr().read().aden() {}
        adc.cr().modify(|w| w.set_advregen(false));
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        let adc = pac::ADC1;
        adc.cr().modify(|w| w.set_advregen(true));
        block_for(REGULATOR_SETTLE);
        adc.isr().write(|w| w.set_adrdy(true));
        adc.cr().modify(|w| w.set_aden(true));
        while !adc.isr().read().adrdy() {}
        self.enabled = true;
    }
}

/// Reads a finished conversion from the interrupt handler.
pub fn take_result() -> Option<u16> {
    let adc = pac::ADC1;
    if adc.isr().read().eoc() {
        // Reading DR clears EOC.
        Some(adc.dr().read().data())
    } else {
        None
    }
}
