//! High-level driver for the TMC2208
//!
//! The TMC2208 talks over the half-duplex single-wire UART. Setters follow
//! the same shadow-mutate-then-transmit policy as the SPI driver; getters on
//! readable registers go through a read-request/reply datagram exchange with
//! CRC protection. A reply that fails its CRC check never replaces cached
//! state: the getter returns the last-known shadow value and the sticky
//! [`crc_error`](Tmc2208Driver::crc_error) flag records the corruption. On
//! TX-only wiring ([`UartConfig::write_only`](crate::UartConfig)) every
//! getter is served from the shadow store.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use crate::interface::{RegisterInterface, UartConfig, UartInterface};
use crate::registers::tmc2208::{
    self as regs, chopconf, drv_status, factory_conf, gconf, gstat, ifcnt, ihold_irun, ioin,
    otp_read, pwm_auto, pwm_scale, pwmconf, slaveconf, tpowerdown, tpwmthrs, tstep, vactual,
};
use crate::registers::{Field, Register};
use crate::shadow::ShadowStore;
use crate::Error;

/// High-level TMC2208 driver
pub struct Tmc2208Driver<U, D> {
    iface: UartInterface<U, D>,
    shadow: ShadowStore<{ regs::SHADOWED.len() }>,
    rsense: f32,
    hold_multiplier: f32,
}

impl<U, D> Tmc2208Driver<U, D> {
    /// Create a new TMC2208 driver
    ///
    /// `rsense_ohms` is the external sense resistor value (commonly 0.11 Ω)
    /// used for RMS current conversion. Construction performs no bus
    /// traffic; call [`begin`](Self::begin) to configure the UART-relevant
    /// GCONF bits and synchronize the chip with the shadow defaults.
    pub fn new(iface: UartInterface<U, D>, rsense_ohms: f32) -> Self {
        Self {
            iface,
            shadow: ShadowStore::new(&regs::SHADOWED),
            rsense: rsense_ohms,
            hold_multiplier: 0.5,
        }
    }

    /// Active transport configuration
    pub fn config(&self) -> &UartConfig {
        self.iface.config()
    }

    /// Whether a reply datagram failed its CRC check since the flag was
    /// last cleared
    ///
    /// While set, the value returned by the affected getter was the cached
    /// one, not fresh chip state.
    pub fn crc_error(&self) -> bool {
        self.iface.crc_error()
    }

    /// Clear the sticky CRC error flag
    pub fn clear_crc_error(&mut self) {
        self.iface.clear_crc_error()
    }

    /// Consume the driver and return the interface
    pub fn release(self) -> UartInterface<U, D> {
        self.iface
    }
}

impl<U, D> Tmc2208Driver<U, D>
where
    U: Read + Write + ReadReady,
    D: DelayNs,
{
    fn read_reg(&mut self, reg: Register) -> Result<u32, Error<U::Error>> {
        if !reg.access.readable() || self.iface.config().write_only {
            return Ok(self.shadow.get(reg));
        }
        match self.iface.read_register(reg.addr) {
            Ok(raw) => {
                self.shadow.set(reg, raw);
                Ok(raw)
            }
            // The interface raised the sticky flag; the last valid value
            // stands in for the corrupted reply.
            Err(Error::Crc) => Ok(self.shadow.get(reg)),
            Err(e) => Err(e),
        }
    }

    fn write_reg(&mut self, reg: Register, raw: u32) -> Result<(), Error<U::Error>> {
        if !reg.access.writable() {
            return Err(Error::UnsupportedOperation);
        }
        self.shadow.set(reg, raw);
        self.iface.write_register(reg.addr, raw)
    }

    fn update_field(&mut self, reg: Register, field: Field, value: u32) -> Result<(), Error<U::Error>> {
        let raw = field.insert(self.shadow.get(reg), value);
        self.write_reg(reg, raw)
    }

    /// Initialize the chip for UART control
    ///
    /// Keeps the UART usable when PDN_UART is wired as an output
    /// (`pdn_disable`), selects MRES as the microstep source
    /// (`mstep_reg_select`), then flushes the shadow defaults to hardware.
    pub fn begin(&mut self) -> Result<(), Error<U::Error>> {
        self.set_pdn_disable(true)?;
        self.set_mstep_reg_select(true)?;
        self.push()
    }

    /// Rewrite every shadowed register from the cache, in table order
    ///
    /// Used after a cold start or a soft reset to resynchronize the chip
    /// with the driver's state.
    pub fn push(&mut self) -> Result<(), Error<U::Error>> {
        let Self { iface, shadow, .. } = self;
        for (addr, raw) in shadow.iter() {
            iface.write_register(addr, raw)?;
        }
        Ok(())
    }

    /// Check that the chip is present and communicating
    ///
    /// The write path has no acknowledgment, so the test goes through a
    /// different read-back path: IFCNT counts every accepted write
    /// datagram. Reads IFCNT, rewrites GCONF from the shadow (a benign
    /// write), and passes only if the counter advanced by exactly one.
    /// Fails with [`Error::UnsupportedOperation`] on TX-only wiring.
    pub fn test_connection(&mut self) -> Result<(), Error<U::Error>> {
        if self.iface.config().write_only {
            return Err(Error::UnsupportedOperation);
        }
        let before = self.iface.read_register(regs::IFCNT.addr)? as u8;
        let gconf = self.shadow.get(regs::GCONF);
        self.iface.write_register(regs::GCONF.addr, gconf)?;
        let after = self.iface.read_register(regs::IFCNT.addr)? as u8;

        if after == before.wrapping_add(1) {
            Ok(())
        } else {
            Err(Error::NotResponding)
        }
    }

    /// Clear the latched GSTAT flags
    pub fn clear_gstat(&mut self) -> Result<(), Error<U::Error>> {
        self.write_reg(regs::GSTAT, 0b111)
    }

    /// Whether the power stage is enabled (ENN low and TOFF nonzero)
    pub fn is_enabled(&mut self) -> Result<bool, Error<U::Error>> {
        let enn = self.enn()?;
        let toff = self.toff()?;
        Ok(!enn && toff > 0)
    }

    /// Write the OTP programming register
    ///
    /// Not shadowed and never replayed by [`push`](Self::push):
    /// programming one-time memory is irreversible. See the datasheet for
    /// the key layout.
    pub fn set_otp_prog(&mut self, value: u32) -> Result<(), Error<U::Error>> {
        self.write_reg(regs::OTP_PROG, value)
    }

    /// Set the factory clock trim
    ///
    /// FACTORY_CONF holds factory calibration, so this reads the register
    /// first and modifies only the FCLKTRIM field instead of going through
    /// the shadow cache.
    pub fn set_fclktrim(&mut self, trim: u8) -> Result<(), Error<U::Error>> {
        let raw = self.read_reg(regs::FACTORY_CONF)?;
        self.write_reg(
            regs::FACTORY_CONF,
            factory_conf::FCLKTRIM.insert(raw, u32::from(trim)),
        )
    }

    /// Set the overtemperature prewarning trim
    ///
    /// Read-modify-write against live chip state, like
    /// [`set_fclktrim`](Self::set_fclktrim).
    pub fn set_ottrim(&mut self, trim: u8) -> Result<(), Error<U::Error>> {
        let raw = self.read_reg(regs::FACTORY_CONF)?;
        self.write_reg(
            regs::FACTORY_CONF,
            factory_conf::OTTRIM.insert(raw, u32::from(trim)),
        )
    }

    register_api! {
        error = Error<U::Error>;

        // GCONF
        reg gconf/set_gconf: regs::GCONF, "the global configuration register";
        bool i_scale_analog/set_i_scale_analog: regs::GCONF, gconf::I_SCALE_ANALOG,
            "whether the VREF pin provides the current reference";
        bool internal_rsense/set_internal_rsense: regs::GCONF, gconf::INTERNAL_RSENSE,
            "whether the internal sense resistors are used";
        bool en_spreadcycle/set_en_spreadcycle: regs::GCONF, gconf::EN_SPREADCYCLE,
            "forced spreadCycle mode (stealthChop otherwise)";
        bool shaft/set_shaft: regs::GCONF, gconf::SHAFT,
            "motor direction inversion";
        bool index_otpw/set_index_otpw: regs::GCONF, gconf::INDEX_OTPW,
            "overtemperature prewarning on the INDEX pin";
        bool index_step/set_index_step: regs::GCONF, gconf::INDEX_STEP,
            "step pulses on the INDEX pin";
        bool pdn_disable/set_pdn_disable: regs::GCONF, gconf::PDN_DISABLE,
            "UART availability when PDN_UART is tied low";
        bool mstep_reg_select/set_mstep_reg_select: regs::GCONF, gconf::MSTEP_REG_SELECT,
            "microstep resolution selection via MRES instead of the MS pins";
        bool multistep_filt/set_multistep_filt: regs::GCONF, gconf::MULTISTEP_FILT,
            "software pulse generator filtering";

        // GSTAT
        bool_ro reset_flag: regs::GSTAT, gstat::RESET,
            "whether a reset occurred since the flag was cleared";
        bool_ro drv_err: regs::GSTAT, gstat::DRV_ERR,
            "whether the driver shut down on an error";
        bool_ro uv_cp: regs::GSTAT, gstat::UV_CP,
            "charge pump undervoltage";

        uint_ro ifcnt: u8, regs::IFCNT, ifcnt::IFCNT,
            "the UART write access counter";

        uint senddelay/set_senddelay: u8, regs::SLAVECONF, slaveconf::SENDDELAY,
            "the reply send delay in bit times";

        uint_ro otp: u32, regs::OTP_READ, otp_read::OTP,
            "the one-time-programmable memory contents";

        // IOIN
        reg_ro ioin: regs::IOIN, "the input pin state register";
        bool_ro enn: regs::IOIN, ioin::ENN, "the ENN pin level";
        bool_ro ms1: regs::IOIN, ioin::MS1, "the MS1 pin level";
        bool_ro ms2: regs::IOIN, ioin::MS2, "the MS2 pin level";
        bool_ro diag: regs::IOIN, ioin::DIAG, "the DIAG pin level";
        bool_ro pdn_uart: regs::IOIN, ioin::PDN_UART, "the PDN_UART pin level";
        bool_ro step_pin: regs::IOIN, ioin::STEP, "the STEP pin level";
        bool_ro sel_a: regs::IOIN, ioin::SEL_A, "the driver type indicator pin";
        bool_ro dir_pin: regs::IOIN, ioin::DIR, "the DIR pin level";
        uint_ro version: u8, regs::IOIN, ioin::VERSION, "the chip version (0x20 on the TMC2208)";

        // FACTORY_CONF (setters are custom read-modify-write methods)
        uint_ro fclktrim: u8, regs::FACTORY_CONF, factory_conf::FCLKTRIM,
            "the factory clock trim";
        uint_ro ottrim: u8, regs::FACTORY_CONF, factory_conf::OTTRIM,
            "the overtemperature prewarning trim";

        // IHOLD_IRUN (write-only; getters return the shadow value)
        reg ihold_irun/set_ihold_irun: regs::IHOLD_IRUN, "the motor current control register";
        uint ihold/set_ihold: u8, regs::IHOLD_IRUN, ihold_irun::IHOLD,
            "the standstill current scale (0..31)";
        uint irun/set_irun: u8, regs::IHOLD_IRUN, ihold_irun::IRUN,
            "the run current scale (0..31)";
        uint iholddelay/set_iholddelay: u8, regs::IHOLD_IRUN, ihold_irun::IHOLDDELAY,
            "the delay before standstill current reduction";

        uint tpowerdown/set_tpowerdown: u8, regs::TPOWERDOWN, tpowerdown::TPOWERDOWN,
            "the standstill delay until current reduction";
        uint_ro tstep: u32, regs::TSTEP, tstep::TSTEP,
            "the measured time between microsteps";
        uint tpwmthrs/set_tpwmthrs: u32, regs::TPWMTHRS, tpwmthrs::TPWMTHRS,
            "the stealthChop upper velocity threshold";

        int vactual/set_vactual: i32, regs::VACTUAL, vactual::VACTUAL,
            "the signed UART-driven velocity (0 returns control to STEP/DIR)";

        // CHOPCONF
        reg chopconf/set_chopconf: regs::CHOPCONF, "the chopper configuration register";
        uint toff/set_toff: u8, regs::CHOPCONF, chopconf::TOFF,
            "the chopper off time (0 disables the driver)";
        uint hstrt/set_hstrt: u8, regs::CHOPCONF, chopconf::HSTRT,
            "the raw hysteresis start field";
        uint hend/set_hend: u8, regs::CHOPCONF, chopconf::HEND,
            "the raw hysteresis end field";
        uint tbl/set_tbl: u8, regs::CHOPCONF, chopconf::TBL,
            "the raw comparator blank time field";
        bool vsense/set_vsense: regs::CHOPCONF, chopconf::VSENSE,
            "the high-sensitivity sense voltage range";
        uint mres/set_mres: u8, regs::CHOPCONF, chopconf::MRES,
            "the raw microstep resolution field";
        bool intpol/set_intpol: regs::CHOPCONF, chopconf::INTPOL,
            "interpolation to 256 microsteps";
        bool dedge/set_dedge: regs::CHOPCONF, chopconf::DEDGE,
            "stepping on both STEP pin edges";
        bool diss2g/set_diss2g: regs::CHOPCONF, chopconf::DISS2G,
            "short-to-ground protection disable";
        bool diss2vs/set_diss2vs: regs::CHOPCONF, chopconf::DISS2VS,
            "low-side short protection disable";

        // DRV_STATUS
        reg_ro drv_status: regs::DRV_STATUS, "the driver status register";
        bool_ro otpw: regs::DRV_STATUS, drv_status::OTPW,
            "overtemperature prewarning";
        bool_ro ot: regs::DRV_STATUS, drv_status::OT,
            "overtemperature shutdown";
        bool_ro s2ga: regs::DRV_STATUS, drv_status::S2GA,
            "short to ground on phase A";
        bool_ro s2gb: regs::DRV_STATUS, drv_status::S2GB,
            "short to ground on phase B";
        bool_ro s2vsa: regs::DRV_STATUS, drv_status::S2VSA,
            "low-side short on phase A";
        bool_ro s2vsb: regs::DRV_STATUS, drv_status::S2VSB,
            "low-side short on phase B";
        bool_ro ola: regs::DRV_STATUS, drv_status::OLA,
            "open load on phase A";
        bool_ro olb: regs::DRV_STATUS, drv_status::OLB,
            "open load on phase B";
        bool_ro t120: regs::DRV_STATUS, drv_status::T120,
            "the 120 °C temperature threshold flag";
        bool_ro t143: regs::DRV_STATUS, drv_status::T143,
            "the 143 °C temperature threshold flag";
        bool_ro t150: regs::DRV_STATUS, drv_status::T150,
            "the 150 °C temperature threshold flag";
        bool_ro t157: regs::DRV_STATUS, drv_status::T157,
            "the 157 °C temperature threshold flag";
        uint_ro cs_actual: u8, regs::DRV_STATUS, drv_status::CS_ACTUAL,
            "the actual current scale";
        bool_ro stealth: regs::DRV_STATUS, drv_status::STEALTH,
            "whether stealthChop is active";
        bool_ro stst: regs::DRV_STATUS, drv_status::STST,
            "standstill detection";

        // PWMCONF
        reg pwmconf/set_pwmconf: regs::PWMCONF, "the stealthChop PWM configuration register";
        uint pwm_ofs/set_pwm_ofs: u8, regs::PWMCONF, pwmconf::PWM_OFS,
            "the user-defined PWM amplitude offset";
        uint pwm_grad/set_pwm_grad: u8, regs::PWMCONF, pwmconf::PWM_GRAD,
            "the PWM amplitude gradient";
        uint pwm_freq/set_pwm_freq: u8, regs::PWMCONF, pwmconf::PWM_FREQ,
            "the PWM frequency selection";
        bool pwm_autoscale/set_pwm_autoscale: regs::PWMCONF, pwmconf::PWM_AUTOSCALE,
            "automatic PWM amplitude scaling";
        bool pwm_autograd/set_pwm_autograd: regs::PWMCONF, pwmconf::PWM_AUTOGRAD,
            "automatic PWM gradient adaptation";
        uint freewheel/set_freewheel: u8, regs::PWMCONF, pwmconf::FREEWHEEL,
            "the standstill mode selection";
        uint pwm_reg/set_pwm_reg: u8, regs::PWMCONF, pwmconf::PWM_REG,
            "the amplitude regulation loop gradient";
        uint pwm_lim/set_pwm_lim: u8, regs::PWMCONF, pwmconf::PWM_LIM,
            "the amplitude limit after chopper mode switches";

        // PWM_SCALE / PWM_AUTO
        uint_ro pwm_scale_sum: u8, regs::PWM_SCALE, pwm_scale::PWM_SCALE_SUM,
            "the actual PWM duty cycle";
        int_ro pwm_scale_auto: i16, regs::PWM_SCALE, pwm_scale::PWM_SCALE_AUTO,
            "the signed amplitude regulator result";
        uint_ro pwm_ofs_auto: u8, regs::PWM_AUTO, pwm_auto::PWM_OFS_AUTO,
            "the automatically determined amplitude offset";
        uint_ro pwm_grad_auto: u8, regs::PWM_AUTO, pwm_auto::PWM_GRAD_AUTO,
            "the automatically determined gradient";
    }

    chopper_helpers! {
        error = Error<U::Error>;
        chopconf = regs::CHOPCONF;
        mres = chopconf::MRES;
        tbl = chopconf::TBL;
        hstrt = chopconf::HSTRT;
        hend = chopconf::HEND;
    }

    current_helpers! {
        error = Error<U::Error>;
    }
}
