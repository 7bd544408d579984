//! Bus interface implementations for the TMC driver family
//!
//! Two incompatible transports exist for the same register space:
//!
//! - [`SpiInterface`]: the 4-wire synchronous bus of the TMC2130. Every
//!   exchange is exactly 5 bytes (address byte plus 32-bit payload,
//!   most-significant byte first) inside one chip-select frame, and reads
//!   take two exchanges because the first one only primes the chip's
//!   internal read buffer.
//! - [`UartInterface`]: the half-duplex single-wire serial line of the
//!   TMC2208. Transfers are framed datagrams protected by a CRC-8, the
//!   transmitter hears its own bytes echo back on typical wiring, and read
//!   replies arrive after a chip-controlled delay.
//!
//! Both implement [`RegisterInterface`], the 32-bit register transaction
//! contract the driver facades are built on.

use crc::{Algorithm, Crc};
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use embedded_io::{Read, ReadReady, Write};

use crate::{Error, UART_SLAVE_ADDR_DEFAULT, UART_SYNC};

/// Direction bit in the register address byte: set for writes on both
/// transports
const ADDR_WRITE_BIT: u8 = 0x80;

/// Length of a UART write datagram and of a read reply
const WRITE_DATAGRAM_LEN: usize = 8;

/// Length of a UART read-request datagram
const READ_REQUEST_LEN: usize = 4;

/// Granularity of the reply-timeout polling loop
const POLL_INTERVAL_US: u32 = 10;

/// CRC-8 used by the UART datagram protocol
///
/// Polynomial 0x07 with each input byte processed bit 0 first and no
/// reflection of the result. Check value (`"123456789"`) is 0x04.
const CRC8_TMC: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: 0x00,
    refin: true,
    refout: false,
    xorout: 0x00,
    check: 0x04,
    residue: 0xFC,
};

const DATAGRAM_CRC: Crc<u8> = Crc::<u8>::new(&CRC8_TMC);

/// Compute the datagram CRC over `data`
///
/// The last byte of every datagram carries this checksum computed over all
/// preceding bytes.
pub fn datagram_crc(data: &[u8]) -> u8 {
    DATAGRAM_CRC.checksum(data)
}

/// 32-bit register transaction contract shared by both transports
///
/// `addr` is always the plain 7-bit register address; the implementations
/// own the direction bit and all framing.
pub trait RegisterInterface {
    /// Transport error type
    type Error;

    /// Write a 32-bit value to the register at `addr`
    fn write_register(&mut self, addr: u8, value: u32) -> Result<(), Self::Error>;

    /// Read the 32-bit value of the register at `addr`
    fn read_register(&mut self, addr: u8) -> Result<u32, Self::Error>;
}

/// Status flags clocked back during the address byte of every SPI exchange
///
/// Overwritten on every transaction; only the most recent value is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiStatus(u8);

impl SpiStatus {
    /// Raw status byte
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// A reset occurred since the flag was last cleared
    pub const fn reset_flag(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// The driver shut down on an error condition
    pub const fn driver_error(self) -> bool {
        self.0 & 0x02 != 0
    }

    /// Charge pump undervoltage
    pub const fn uv_cp(self) -> bool {
        self.0 & 0x04 != 0
    }
}

/// SPI interface for the TMC2130
///
/// # Note on chip select
///
/// Built on the `SpiDevice` trait, which owns the chip-select pin: every
/// 5-byte exchange runs inside one `transaction()` call, so chip select is
/// asserted before the first bit and released after the last, with no other
/// bus traffic interleaved.
///
/// If using `embedded-hal-bus`, an `SpiDevice` is typically created like:
/// ```ignore
/// let spi_device = embedded_hal_bus::spi::ExclusiveDevice::new(spi_bus, cs_pin, delay);
/// let interface = SpiInterface::new(spi_device);
/// ```
pub struct SpiInterface<SPI> {
    spi: SPI,
    status: SpiStatus,
}

impl<SPI> SpiInterface<SPI> {
    /// Create a new SPI interface with the given SPI device
    pub const fn new(spi: SPI) -> Self {
        Self {
            spi,
            status: SpiStatus(0),
        }
    }

    /// Status byte returned by the most recent exchange
    pub fn status(&self) -> SpiStatus {
        self.status
    }

    /// Consume the interface and return the SPI device
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI, E> RegisterInterface for SpiInterface<SPI>
where
    SPI: SpiDevice<Error = E>,
{
    type Error = Error<E>;

    fn write_register(&mut self, addr: u8, value: u32) -> Result<(), Self::Error> {
        let mut buf = [0u8; 5];
        buf[0] = addr | ADDR_WRITE_BIT;
        buf[1..].copy_from_slice(&value.to_be_bytes());

        self.spi.transfer_in_place(&mut buf).map_err(Error::Bus)?;
        self.status = SpiStatus(buf[0]);
        Ok(())
    }

    fn read_register(&mut self, addr: u8) -> Result<u32, Self::Error> {
        let addr = addr & !ADDR_WRITE_BIT;

        // The first exchange only latches the register into the chip's
        // internal read buffer; its response bytes belong to whatever was
        // addressed before. The second exchange shifts out the real data.
        let mut buf = [addr, 0, 0, 0, 0];
        self.spi.transfer_in_place(&mut buf).map_err(Error::Bus)?;

        let mut buf = [addr, 0, 0, 0, 0];
        self.spi.transfer_in_place(&mut buf).map_err(Error::Bus)?;
        self.status = SpiStatus(buf[0]);

        let mut data = [0u8; 4];
        data.copy_from_slice(&buf[1..]);
        Ok(u32::from_be_bytes(data))
    }
}

/// UART transport configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Slave address sent in every datagram (MS1/MS2 strapping)
    pub slave_addr: u8,
    /// Upper bound on the wait for reply bytes, in microseconds
    pub reply_timeout_us: u32,
    /// Whether transmitted bytes echo back on the shared line
    ///
    /// True for the usual single-wire wiring, where the receiver hears
    /// every transmitted byte and the echo must be discarded before a reply
    /// can be parsed. Set to false for dual-wire wiring without loopback.
    pub self_echo: bool,
    /// TX-only wiring: the chip's reply line is not connected
    ///
    /// All register reads fail with `UnsupportedOperation`; the driver
    /// facade serves every getter from the shadow store instead.
    pub write_only: bool,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            slave_addr: UART_SLAVE_ADDR_DEFAULT,
            reply_timeout_us: 10_000,
            self_echo: true,
            write_only: false,
        }
    }
}

/// UART interface for the TMC2208
///
/// Wraps a byte stream (`embedded_io::{Read, Write, ReadReady}`) and a
/// delay provider used to pace the bounded reply wait.
pub struct UartInterface<U, D> {
    uart: U,
    delay: D,
    config: UartConfig,
    crc_error: bool,
}

impl<U, D> UartInterface<U, D> {
    /// Create a new UART interface
    pub const fn new(uart: U, delay: D, config: UartConfig) -> Self {
        Self {
            uart,
            delay,
            config,
            crc_error: false,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &UartConfig {
        &self.config
    }

    /// Whether a reply datagram failed its CRC check since the flag was
    /// last cleared
    ///
    /// Sticky: reads that fail the check set it, nothing clears it except
    /// [`clear_crc_error`](Self::clear_crc_error).
    pub fn crc_error(&self) -> bool {
        self.crc_error
    }

    /// Clear the sticky CRC error flag
    pub fn clear_crc_error(&mut self) {
        self.crc_error = false;
    }

    /// Consume the interface and return the serial port and delay provider
    pub fn release(self) -> (U, D) {
        (self.uart, self.delay)
    }
}

impl<U, D> UartInterface<U, D>
where
    U: Read + Write + ReadReady,
    D: DelayNs,
{
    /// Fill `buf` from the line, giving up after the configured timeout
    fn read_exact_bounded(&mut self, buf: &mut [u8]) -> Result<(), Error<U::Error>> {
        let mut filled = 0;
        let mut waited_us = 0;
        while filled < buf.len() {
            if self.uart.read_ready().map_err(Error::Bus)? {
                let n = self.uart.read(&mut buf[filled..]).map_err(Error::Bus)?;
                if n == 0 {
                    return Err(Error::Timeout);
                }
                filled += n;
            } else if waited_us >= self.config.reply_timeout_us {
                return Err(Error::Timeout);
            } else {
                self.delay.delay_us(POLL_INTERVAL_US);
                waited_us += POLL_INTERVAL_US;
            }
        }
        Ok(())
    }

    /// Consume the loopback copy of a datagram this side just transmitted
    fn discard_echo(&mut self, len: usize) -> Result<(), Error<U::Error>> {
        let mut scratch = [0u8; WRITE_DATAGRAM_LEN];
        self.read_exact_bounded(&mut scratch[..len])
    }
}

impl<U, D> RegisterInterface for UartInterface<U, D>
where
    U: Read + Write + ReadReady,
    D: DelayNs,
{
    type Error = Error<U::Error>;

    fn write_register(&mut self, addr: u8, value: u32) -> Result<(), Self::Error> {
        let mut datagram = [0u8; WRITE_DATAGRAM_LEN];
        datagram[0] = UART_SYNC;
        datagram[1] = self.config.slave_addr;
        datagram[2] = addr | ADDR_WRITE_BIT;
        datagram[3..7].copy_from_slice(&value.to_be_bytes());
        datagram[7] = datagram_crc(&datagram[..7]);

        self.uart.write_all(&datagram).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)?;
        if self.config.self_echo {
            self.discard_echo(WRITE_DATAGRAM_LEN)?;
        }
        // The protocol has no acknowledgment for writes; success is assumed
        // once transmission completes.
        Ok(())
    }

    fn read_register(&mut self, addr: u8) -> Result<u32, Self::Error> {
        if self.config.write_only {
            return Err(Error::UnsupportedOperation);
        }

        let mut request = [0u8; READ_REQUEST_LEN];
        request[0] = UART_SYNC;
        request[1] = self.config.slave_addr;
        request[2] = addr & !ADDR_WRITE_BIT;
        request[3] = datagram_crc(&request[..3]);

        self.uart.write_all(&request).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)?;
        if self.config.self_echo {
            self.discard_echo(READ_REQUEST_LEN)?;
        }

        let mut reply = [0u8; WRITE_DATAGRAM_LEN];
        self.read_exact_bounded(&mut reply)?;

        if datagram_crc(&reply[..7]) != reply[7] {
            self.crc_error = true;
            return Err(Error::Crc);
        }

        let mut data = [0u8; 4];
        data.copy_from_slice(&reply[3..7]);
        Ok(u32::from_be_bytes(data))
    }
}
