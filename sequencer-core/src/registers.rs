//! Register protocol served to the host over the byte-oriented slave link.
//!
//! Every transaction is exactly three bytes: an address, then two data bytes.
//! The slave cannot stall the bus, so each reply byte must already be queued
//! when the previous exchange completes. The interrupt half
//! ([`TransactionState`]) therefore answers with one byte of pipeline latency:
//! on the address byte it computes both reply bytes, queues the first, and
//! holds the second for the data phase.
//!
//! | Address | Read (byte 2, byte 3) | Write (byte 2) |
//! |---|---|---|
//! | `0x01` | 0, 0 | channel-request mask |
//! | `0x02` | current mask, 0 | ignored |
//! | `0x03` | 0, 0 | toggles the auxiliary open-drain pin |
//! | `0x04` | major, minor | ignored |
//! | `0x05` | current state, previous stable state | ignored |
//! | `0x06` | capability flag, 0 | ignored |
//! | `0x10..=0x17` | result low, result high | ignored |
//! | other | 0, 0 | ignored |

use crate::hal::{DigitalOutputs, PinDirection};
use crate::shared::SharedState;

/// Bytes per transaction.
pub const FRAME_LEN: usize = 3;

pub const CHANNEL_REQUEST: u8 = 0x01;
pub const CHANNEL_MASK: u8 = 0x02;
pub const TOGGLE_AUX: u8 = 0x03;
pub const FIRMWARE_IDENTITY: u8 = 0x04;
pub const SEQUENCER_STATE: u8 = 0x05;
pub const CAPABILITY: u8 = 0x06;
/// First ADC result register; channel `n` lives at `RESULT_BASE + n`.
pub const RESULT_BASE: u8 = 0x10;
pub const RESULT_LAST: u8 = 0x17;

/// Decoded register address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    ChannelRequest,
    ChannelMask,
    ToggleAux,
    FirmwareIdentity,
    SequencerState,
    Capability,
    Result(u8),
    Reserved(u8),
}

impl Register {
    #[must_use]
    pub const fn decode(address: u8) -> Self {
        match address {
            CHANNEL_REQUEST => Register::ChannelRequest,
            CHANNEL_MASK => Register::ChannelMask,
            TOGGLE_AUX => Register::ToggleAux,
            FIRMWARE_IDENTITY => Register::FirmwareIdentity,
            SEQUENCER_STATE => Register::SequencerState,
            CAPABILITY => Register::Capability,
            address @ RESULT_BASE..=RESULT_LAST => Register::Result(address - RESULT_BASE),
            other => Register::Reserved(other),
        }
    }

    /// Reply bytes for a read of this register.
    fn read(self, shared: &SharedState) -> [u8; 2] {
        match self {
            Register::ChannelMask => [shared.channel_mask(), 0],
            Register::FirmwareIdentity => {
                let identity = shared.identity();
                [identity.major, identity.minor]
            }
            Register::SequencerState => {
                let memo = shared.state_memo();
                [memo.current, memo.previous]
            }
            Register::Capability => [u8::from(shared.identity().capability), 0],
            Register::Result(channel) => {
                if shared.channel_mask() & (1 << channel) == 0 {
                    [0, 0]
                } else {
                    shared.result(channel).to_le_bytes()
                }
            }
            Register::ChannelRequest | Register::ToggleAux | Register::Reserved(_) => [0, 0],
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Phase {
    Address,
    Data,
    Trailer,
}

/// Interrupt-side cursor through one transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransactionState {
    phase: Phase,
    register: Register,
    queued: u8,
}

impl TransactionState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Address,
            register: Register::Reserved(0),
            queued: 0,
        }
    }

    /// Drops any partial frame and waits for a new address byte.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Consumes one received byte and returns the byte for the next exchange.
    pub(crate) fn on_byte(&mut self, received: u8, shared: &SharedState) -> u8 {
        match self.phase {
            Phase::Address => {
                let register = Register::decode(received);
                let [first, second] = register.read(shared);
                if register == Register::ToggleAux {
                    shared.request_toggle();
                }
                self.register = register;
                self.queued = second;
                self.phase = Phase::Data;
                first
            }
            Phase::Data => {
                if self.register == Register::ChannelRequest {
                    shared.set_channel_mask(received);
                }
                self.phase = Phase::Trailer;
                self.queued
            }
            Phase::Trailer => {
                self.reset();
                shared.mark_transaction_done();
                0
            }
        }
    }
}

impl Default for TransactionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop-side half of the protocol: applies deferred effects.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RegisterEngine {
    transactions: u32,
    toggles: u32,
}

impl RegisterEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transactions: 0,
            toggles: 0,
        }
    }

    /// Applies a pending auxiliary toggle and reports whether a transaction
    /// completed since the last poll.
    ///
    /// The auxiliary pin is open-drain: when it reads low it is released to an
    /// input, otherwise it is driven low.
    pub fn poll<O: DigitalOutputs + ?Sized>(
        &mut self,
        shared: &SharedState,
        outputs: &mut O,
    ) -> bool {
        if shared.take_toggle() {
            if outputs.aux_level() {
                outputs.set_aux_level(false);
                outputs.set_aux_direction(PinDirection::Output);
            } else {
                outputs.set_aux_direction(PinDirection::Input);
            }
            self.toggles = self.toggles.wrapping_add(1);
        }

        let completed = shared.take_transaction_done();
        if completed {
            self.transactions = self.transactions.wrapping_add(1);
        }
        completed
    }

    /// Completed transactions observed by [`RegisterEngine::poll`].
    #[must_use]
    pub const fn transactions(&self) -> u32 {
        self.transactions
    }

    #[must_use]
    pub const fn toggles(&self) -> u32 {
        self.toggles
    }
}
