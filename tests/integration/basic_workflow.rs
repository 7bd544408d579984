//! Integration tests for complete configuration workflows

use crate::common::{create_spi_driver, create_uart_driver};
use tmc_stepper::registers::{tmc2130, tmc2208};

#[test]
fn test_tmc2130_bring_up_workflow() {
    let (mut driver, spi) = create_spi_driver();

    // Cold start: push the shadow defaults, then verify the link
    driver.begin().unwrap();
    assert_eq!(spi.frames().len(), tmc2130::SHADOWED.len());
    driver.test_connection().unwrap();

    // Configure current, microstepping and chopper mode
    driver.set_rms_current(800).unwrap();
    driver.set_microsteps(16).unwrap();
    driver.set_intpol(true).unwrap();
    driver.set_en_pwm_mode(true).unwrap();

    // The readback path agrees with what was configured
    assert_eq!(driver.microsteps().unwrap(), 16);
    assert!(driver.en_pwm_mode().unwrap());
    let rms = driver.rms_current().unwrap();
    assert!(
        (750..=850).contains(&rms),
        "configured 800 mA, read back {rms} mA"
    );

    // The composed CHOPCONF value reached the chip
    let chopconf = spi.get_register(0x6C);
    assert_eq!((chopconf >> 24) & 0xF, 4, "MRES for 16 microsteps");
    assert_ne!(chopconf & (1 << 28), 0, "INTPOL set");
}

#[test]
fn test_tmc2130_status_telemetry() {
    let (mut driver, spi) = create_spi_driver();

    // Inject a driver status snapshot: standstill, CS=5, stallGuard result
    spi.set_register(0x6F, (1 << 31) | (5 << 16) | 0x1F5);

    assert!(driver.stst().unwrap());
    assert_eq!(driver.cs_actual().unwrap(), 5);
    assert_eq!(driver.sg_result().unwrap(), 0x1F5);
    assert!(!driver.stallguard().unwrap());

    // stallGuard threshold configuration goes through the write-only
    // COOLCONF shadow
    driver.set_sgt(-10).unwrap();
    assert_eq!(driver.sgt().unwrap(), -10);
}

#[test]
fn test_tmc2130_field_setters_do_not_corrupt_neighbors() {
    let (mut driver, spi) = create_spi_driver();

    driver.set_toff(5).unwrap();
    driver.set_tbl(2).unwrap();
    driver.set_hstrt(4).unwrap();
    driver.set_vsense(true).unwrap();
    driver.set_mres(8).unwrap();

    assert_eq!(driver.toff().unwrap(), 5);
    assert_eq!(driver.tbl().unwrap(), 2);
    assert_eq!(driver.hstrt().unwrap(), 4);
    assert!(driver.vsense().unwrap());
    assert_eq!(driver.mres().unwrap(), 8);

    let chopconf = spi.get_register(0x6C);
    assert_eq!(chopconf & 0xF, 5);
    assert_eq!((chopconf >> 15) & 0x3, 2);
    assert_eq!((chopconf >> 4) & 0x7, 4);
    assert_ne!(chopconf & (1 << 17), 0);
    assert_eq!((chopconf >> 24) & 0xF, 8);
}

#[test]
fn test_tmc2208_bring_up_workflow() {
    let (mut driver, serial) = create_uart_driver();

    driver.begin().unwrap();

    // begin() makes the UART sticky and hands microstep control to MRES
    let gconf = serial.get_register(0x00);
    assert_ne!(gconf & 0x40, 0, "pdn_disable");
    assert_ne!(gconf & 0x80, 0, "mstep_reg_select");

    // Two GCONF field writes plus the full shadow push
    assert_eq!(
        serial.ifcnt() as usize,
        2 + tmc2208::SHADOWED.len(),
        "every write datagram must be accepted"
    );

    driver.test_connection().unwrap();

    driver.set_rms_current(600).unwrap();
    driver.set_microsteps(8).unwrap();
    assert_eq!(driver.microsteps().unwrap(), 8);

    let rms = driver.rms_current().unwrap();
    assert!(
        (550..=650).contains(&rms),
        "configured 600 mA, read back {rms} mA"
    );
}

#[test]
fn test_tmc2208_velocity_and_version() {
    let (mut driver, serial) = create_uart_driver();

    // UART-driven motion: VACTUAL is write-only, the getter is the shadow
    driver.set_vactual(-100_000).unwrap();
    assert_eq!(driver.vactual().unwrap(), -100_000);
    assert_eq!(serial.get_register(0x22), (-100_000i32 as u32) & 0x00FF_FFFF);

    driver.set_vactual(0).unwrap();
    assert_eq!(driver.vactual().unwrap(), 0);

    // Chip identification from IOIN
    serial.set_register(0x06, 0x20 << 24 | 1 << 8);
    assert_eq!(driver.version().unwrap(), 0x20);
    assert!(driver.sel_a().unwrap());
}

#[test]
fn test_tmc2208_chopper_helpers_round_trip() {
    let (mut driver, _serial) = create_uart_driver();

    driver.set_blank_time(24).unwrap();
    assert_eq!(driver.blank_time().unwrap(), 24);

    driver.set_hysteresis_end(-2).unwrap();
    assert_eq!(driver.hysteresis_end().unwrap(), -2);

    driver.set_hysteresis_start(6).unwrap();
    assert_eq!(driver.hysteresis_start().unwrap(), 6);

    // Out-of-range values are ignored, keeping the last configuration
    driver.set_hysteresis_start(9).unwrap();
    assert_eq!(driver.hysteresis_start().unwrap(), 6);
    driver.set_microsteps(3).unwrap();
    assert_eq!(driver.microsteps().unwrap(), 256, "begin not called: reset MRES");
}

#[test]
fn test_error_recovery_workflow() {
    let (mut driver, serial) = create_uart_driver();

    serial.fail_next_write();
    assert!(driver.set_toff(3).is_err());

    // The failure is isolated: configuration continues on the next cycle
    driver.set_toff(3).unwrap();
    assert_eq!(driver.toff().unwrap(), 3);
    driver.test_connection().unwrap();
}
