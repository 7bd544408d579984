#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
// The facade accessor tables expand through a token-munching macro with one
// recursion step per field.
#![recursion_limit = "256"]

pub mod interface;
pub mod registers;
pub mod shadow;

mod current;
#[macro_use]
mod device;

pub mod tmc2130;
pub mod tmc2208;

// Re-export main types
pub use interface::{RegisterInterface, SpiInterface, SpiStatus, UartConfig, UartInterface};
pub use registers::{Access, Field, Register};
pub use tmc2130::Tmc2130Driver;
pub use tmc2208::Tmc2208Driver;

/// Sync byte that opens every UART datagram
pub const UART_SYNC: u8 = 0x05;

/// Address the chip uses for itself when it answers a read request
///
/// Reply datagrams carry this in the slave-address slot, marking the master
/// as the recipient.
pub const UART_MASTER_ADDR: u8 = 0xFF;

/// Default UART slave address (MS1/MS2 strapped low)
pub const UART_SLAVE_ADDR_DEFAULT: u8 = 0x00;

/// Expected value of the IOIN `VERSION` field on a TMC2130
pub const VERSION_TMC2130: u8 = 0x11;

/// Expected value of the IOIN `VERSION` field on a TMC2208
pub const VERSION_TMC2208: u8 = 0x20;

/// Driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Communication error on the underlying bus
    Bus(E),
    /// No reply datagram arrived within the configured timeout (UART only)
    Timeout,
    /// A reply datagram failed its CRC check
    ///
    /// Field getters never surface this directly: the driver keeps the
    /// last-known shadow value and raises the sticky
    /// [`crc_error`](crate::Tmc2208Driver::crc_error) flag instead. Direct
    /// register reads through an interface do return it.
    Crc,
    /// The connection self-test read back a value that does not match what
    /// was written
    NotResponding,
    /// The register does not support the requested direction (wire-read of
    /// a write-only register, or write of a read-only register)
    UnsupportedOperation,
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Self::Bus(error)
    }
}
