//! SPI1 in slave mode, one interrupt per exchanged byte.

use core::ptr;

use embassy_stm32::pac;
use embassy_stm32::pac::gpio::vals::Moder;

use super::SELECT_LINE;

const SPI_PINS: core::ops::RangeInclusive<usize> = 4..=7;

/// Routes PA4..PA7 to SPI1 and configures the peripheral as an 8-bit slave.
pub fn configure() {
    pac::RCC.apbenr2().modify(|w| w.set_spi1en(true));

    let gpio = pac::GPIOA;
    for pin in SPI_PINS {
        gpio.afr(0).modify(|w| w.set_afr(pin, 0));
        gpio.moder().modify(|w| w.set_moder(pin, Moder::ALTERNATE));
    }

    let spi = pac::SPI1;
    spi.cr1().write(|w| {
        w.set_mstr(pac::spi::vals::Mstr::SLAVE);
        w.set_ssm(false);
    });
    spi.cr2().write(|w| {
        w.set_ds(pac::spi::vals::Ds::BITS8);
        w.set_frxth(pac::spi::vals::Frxth::QUARTER);
        w.set_rxneie(true);
    });

    // Chip-select release ends a frame.
    let exti = pac::EXTI;
    exti.exticr(SELECT_LINE / 4)
        .modify(|w| w.set_exti(SELECT_LINE % 4, 0));
    exti.rtsr(0).modify(|w| w.set_line(SELECT_LINE, true));
}

/// Starts or stops servicing the bus master.
pub fn set_enabled(enabled: bool) {
    let spi = pac::SPI1;
    let exti = pac::EXTI;
    if enabled {
        write_byte(0);
        spi.cr1().modify(|w| w.set_spe(true));
    } else {
        spi.cr1().modify(|w| w.set_spe(false));
    }
    exti.imr(0).modify(|w| w.set_line(SELECT_LINE, enabled));
}

/// Whether the master currently holds chip-select low.
pub fn selected() -> bool {
    !pac::GPIOA.idr().read().idr(*SPI_PINS.start())
}

/// Pops a received byte, if one is waiting.
pub fn read_byte() -> Option<u8> {
    let spi = pac::SPI1;
    if spi.sr().read().rxne() {
        // SAFETY: byte access to DR pops exactly one frame from the RX FIFO.
        Some(unsafe { ptr::read_volatile(spi.dr().as_ptr().cast::<u8>()) })
    } else {
        None
    }
}

/// Queues the byte shifted out on the next exchange.
pub fn write_byte(byte: u8) {
    let spi = pac::SPI1;
    // SAFETY: byte access to DR pushes exactly one frame into the TX FIFO.
    unsafe { ptr::write_volatile(spi.dr().as_ptr().cast::<u8>(), byte) };
}

/// Clears the chip-select edge flag.
pub fn acknowledge_deselect() -> bool {
    let exti = pac::EXTI;
    let pending = exti.rpr(0).read().line(SELECT_LINE);
    if pending {
        exti.rpr(0).write(|w| w.set_line(SELECT_LINE, true));
    }
    pending
}
