//! Unit tests for the asynchronous CRC-8 datagram transport

use crate::common::{create_uart_driver, create_uart_driver_with, MockDelay, MockSerial};
use tmc_stepper::{Error, RegisterInterface, UartConfig, UartInterface};

#[test]
fn test_write_datagram_format() {
    let (mut driver, serial) = create_uart_driver();

    // Fresh shadow GCONF is 0, so this writes exactly 0x40
    driver.set_pdn_disable(true).unwrap();

    let datagrams = serial.datagrams();
    assert_eq!(datagrams.len(), 1);
    assert_eq!(
        datagrams[0],
        vec![0x05, 0x00, 0x80, 0x00, 0x00, 0x00, 0x40, 0x47],
        "sync, slave, addr|write, 4 data bytes MSB first, CRC"
    );
}

#[test]
fn test_read_request_format_and_reply_parsing() {
    let (mut driver, serial) = create_uart_driver();
    serial.set_register(0x00, 0x0000_0141);
    serial.clear_datagrams();

    assert_eq!(driver.gconf().unwrap(), 0x0000_0141);

    let requests = serial.read_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        vec![0x05, 0x00, 0x00, 0x48],
        "read request: sync, slave, addr, CRC"
    );
}

#[test]
fn test_echo_is_discarded_before_reply() {
    // The mock loops every transmitted byte back ahead of the reply, as a
    // self-wired half-duplex line does. Reads only work if the binding
    // discards exactly the echoed bytes first.
    let (mut driver, serial) = create_uart_driver();
    serial.set_register(0x6F, 0x8000_0001);

    assert_eq!(driver.drv_status().unwrap(), 0x8000_0001);
    // And again, to prove no stray echo bytes accumulate
    assert_eq!(driver.drv_status().unwrap(), 0x8000_0001);
}

#[test]
fn test_dual_wire_wiring_without_echo() {
    let config = UartConfig {
        self_echo: false,
        ..UartConfig::default()
    };
    let (mut driver, serial) = create_uart_driver_with(config);
    serial.set_register(0x6F, 0x0000_0042);

    assert_eq!(driver.drv_status().unwrap(), 0x0000_0042);
}

#[test]
fn test_crc_mismatch_returns_stale_value_and_sets_sticky_flag() {
    let (mut driver, serial) = create_uart_driver();
    serial.set_register(0x00, 0x0000_0111);

    // Prime the shadow with a good read
    assert_eq!(driver.gconf().unwrap(), 0x0000_0111);
    assert!(!driver.crc_error());

    // Chip state changes, but the reply gets a data bit flipped
    serial.set_register(0x00, 0x0000_0222);
    serial.corrupt_next_reply(4, 0x10);

    let value = driver.gconf().unwrap();
    assert_eq!(
        value, 0x0000_0111,
        "corrupted reply must never be accepted; last-known value stands in"
    );
    assert!(driver.crc_error(), "CRC flag must be sticky after a bad reply");

    // The flag stays set across a successful read until cleared explicitly
    assert_eq!(driver.gconf().unwrap(), 0x0000_0222);
    assert!(driver.crc_error());
    driver.clear_crc_error();
    assert!(!driver.crc_error());
}

#[test]
fn test_crc_mismatch_detected_for_any_corrupted_byte() {
    // Flip a bit in each protected byte of the reply in turn; every
    // position must be caught.
    for index in 0..7 {
        let (mut driver, serial) = create_uart_driver();
        serial.set_register(0x00, 0x0000_0111);
        assert_eq!(driver.gconf().unwrap(), 0x0000_0111);

        serial.set_register(0x00, 0x0000_0222);
        serial.corrupt_next_reply(index, 0x01);

        assert_eq!(
            driver.gconf().unwrap(),
            0x0000_0111,
            "corruption in reply byte {index} went undetected"
        );
        assert!(driver.crc_error());
    }
}

#[test]
fn test_interface_level_crc_error() {
    let serial = MockSerial::new();
    let handle = serial.clone();
    let mut iface = UartInterface::new(serial, MockDelay, UartConfig::default());

    handle.set_register(0x6C, 0x1000_0053);
    handle.corrupt_next_reply(3, 0x80);

    assert_eq!(iface.read_register(0x6C), Err(Error::Crc));
    assert!(iface.crc_error());

    // A clean reply afterwards succeeds without clearing the sticky flag
    assert_eq!(iface.read_register(0x6C), Ok(0x1000_0053));
    assert!(iface.crc_error());
}

#[test]
fn test_read_timeout_when_chip_does_not_answer() {
    let (mut driver, serial) = create_uart_driver();
    serial.set_respond(false);

    assert_eq!(driver.gconf(), Err(Error::Timeout));
}

#[test]
fn test_write_only_wiring_serves_reads_from_shadow() {
    let config = UartConfig {
        write_only: true,
        ..UartConfig::default()
    };
    let (mut driver, serial) = create_uart_driver_with(config);

    // Readable register, but TX-only wiring: the shadow default is
    // returned and no request goes out.
    assert_eq!(driver.chopconf().unwrap(), 0x1000_0053);
    assert!(serial.read_requests().is_empty());

    // Writes still reach the chip
    driver.set_toff(4).unwrap();
    assert_eq!(serial.get_register(0x6C) & 0xF, 4);
}

#[test]
fn test_write_only_wiring_rejects_interface_reads() {
    let config = UartConfig {
        write_only: true,
        ..UartConfig::default()
    };
    let serial = MockSerial::new();
    let mut iface = UartInterface::new(serial, MockDelay, config);

    assert_eq!(iface.read_register(0x00), Err(Error::UnsupportedOperation));
}

#[test]
fn test_writes_have_no_reply_and_need_none() {
    let (mut driver, serial) = create_uart_driver();

    // A pure write sequence completes without any reply bytes queued
    driver.set_tpwmthrs(1000).unwrap();
    driver.set_vactual(42).unwrap();

    assert_eq!(serial.get_register(0x13), 1000);
    assert_eq!(serial.get_register(0x22), 42);
    assert_eq!(serial.read_requests().len(), 0);
}
