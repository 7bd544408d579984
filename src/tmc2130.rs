//! High-level driver for the TMC2130
//!
//! The TMC2130 talks over the 4-wire SPI bus. All configuration flows
//! through the shadow store: field setters modify the cached raw value and
//! transmit the whole register, field getters on readable registers refresh
//! the cache from the wire first, and getters on write-only registers
//! (IHOLD_IRUN, COOLCONF, PWMCONF, …) return the last locally written
//! value, which is the only copy in existence.

use embedded_hal::spi::SpiDevice;

use crate::interface::{RegisterInterface, SpiInterface, SpiStatus};
use crate::registers::tmc2130::{
    self as regs, chopconf, coolconf, drv_status, encm_ctrl, gconf, gstat, ihold_irun, ioin,
    lost_steps, mscnt, mscuract, pwm_scale, pwmconf, tcoolthrs, thigh, tpowerdown, tpwmthrs, tstep,
    vdcmin, xdirect,
};
use crate::registers::{Field, Register};
use crate::shadow::ShadowStore;
use crate::Error;

/// High-level TMC2130 driver
pub struct Tmc2130Driver<SPI> {
    iface: SpiInterface<SPI>,
    shadow: ShadowStore<{ regs::SHADOWED.len() }>,
    rsense: f32,
    hold_multiplier: f32,
}

impl<SPI> Tmc2130Driver<SPI> {
    /// Create a new TMC2130 driver
    ///
    /// `rsense_ohms` is the external sense resistor value (commonly 0.11 Ω)
    /// used for RMS current conversion. Construction performs no bus
    /// traffic; call [`begin`](Self::begin) to synchronize the chip with
    /// the shadow defaults.
    pub fn new(iface: SpiInterface<SPI>, rsense_ohms: f32) -> Self {
        Self {
            iface,
            shadow: ShadowStore::new(&regs::SHADOWED),
            rsense: rsense_ohms,
            hold_multiplier: 0.5,
        }
    }

    /// Status flags clocked back during the most recent SPI exchange
    pub fn last_status(&self) -> SpiStatus {
        self.iface.status()
    }

    /// Consume the driver and return the interface
    pub fn release(self) -> SpiInterface<SPI> {
        self.iface
    }
}

impl<SPI, E> Tmc2130Driver<SPI>
where
    SPI: SpiDevice<Error = E>,
{
    fn read_reg(&mut self, reg: Register) -> Result<u32, Error<E>> {
        if !reg.access.readable() {
            return Ok(self.shadow.get(reg));
        }
        let raw = self.iface.read_register(reg.addr)?;
        self.shadow.set(reg, raw);
        Ok(raw)
    }

    fn write_reg(&mut self, reg: Register, raw: u32) -> Result<(), Error<E>> {
        if !reg.access.writable() {
            return Err(Error::UnsupportedOperation);
        }
        self.shadow.set(reg, raw);
        self.iface.write_register(reg.addr, raw)
    }

    fn update_field(&mut self, reg: Register, field: Field, value: u32) -> Result<(), Error<E>> {
        let raw = field.insert(self.shadow.get(reg), value);
        self.write_reg(reg, raw)
    }

    /// Initialize the chip: flush the shadow defaults to hardware
    pub fn begin(&mut self) -> Result<(), Error<E>> {
        self.push()
    }

    /// Rewrite every shadowed register from the cache, in table order
    ///
    /// Used after a cold start or a soft reset to resynchronize the chip
    /// with the driver's state.
    pub fn push(&mut self) -> Result<(), Error<E>> {
        let Self { iface, shadow, .. } = self;
        for (addr, raw) in shadow.iter() {
            iface.write_register(addr, raw)?;
        }
        Ok(())
    }

    /// Check that the chip is present and communicating
    ///
    /// Writes all-ones in the defined bits of XDIRECT (a benign read/write
    /// register), reads it back over the wire, repeats with all-zeros, and
    /// restores the previous value. Both patterns must round-trip exactly:
    /// a floating or shorted bus line can fake one pattern but not both.
    pub fn test_connection(&mut self) -> Result<(), Error<E>> {
        let mask = xdirect::COIL_A.mask() | xdirect::COIL_B.mask();
        let previous = self.shadow.get(regs::XDIRECT);

        self.write_reg(regs::XDIRECT, mask)?;
        let ones = self.iface.read_register(regs::XDIRECT.addr)?;
        self.write_reg(regs::XDIRECT, 0)?;
        let zeros = self.iface.read_register(regs::XDIRECT.addr)?;
        self.write_reg(regs::XDIRECT, previous)?;

        if ones & mask == mask && zeros & mask == 0 {
            Ok(())
        } else {
            Err(Error::NotResponding)
        }
    }

    /// Clear the latched GSTAT flags
    pub fn clear_gstat(&mut self) -> Result<(), Error<E>> {
        self.write_reg(regs::GSTAT, 0b111)
    }

    /// Whether the power stage is enabled (DRV_ENN low and TOFF nonzero)
    pub fn is_enabled(&mut self) -> Result<bool, Error<E>> {
        let enn = self.drv_enn_cfg6()?;
        let toff = self.toff()?;
        Ok(!enn && toff > 0)
    }

    register_api! {
        error = Error<E>;

        // GCONF
        reg gconf/set_gconf: regs::GCONF, "the global configuration register";
        bool i_scale_analog/set_i_scale_analog: regs::GCONF, gconf::I_SCALE_ANALOG,
            "whether the AIN pin provides the current reference";
        bool internal_rsense/set_internal_rsense: regs::GCONF, gconf::INTERNAL_RSENSE,
            "whether the internal sense resistors are used";
        bool en_pwm_mode/set_en_pwm_mode: regs::GCONF, gconf::EN_PWM_MODE,
            "stealthChop voltage PWM mode";
        bool enc_commutation/set_enc_commutation: regs::GCONF, gconf::ENC_COMMUTATION,
            "encoder commutation";
        bool shaft/set_shaft: regs::GCONF, gconf::SHAFT,
            "motor direction inversion";
        bool diag0_error/set_diag0_error: regs::GCONF, gconf::DIAG0_ERROR,
            "DIAG0 activation on driver errors";
        bool diag0_otpw/set_diag0_otpw: regs::GCONF, gconf::DIAG0_OTPW,
            "DIAG0 activation on overtemperature prewarning";
        bool diag0_stall/set_diag0_stall: regs::GCONF, gconf::DIAG0_STALL,
            "DIAG0 activation on stall";
        bool diag1_stall/set_diag1_stall: regs::GCONF, gconf::DIAG1_STALL,
            "DIAG1 activation on stall";
        bool diag1_index/set_diag1_index: regs::GCONF, gconf::DIAG1_INDEX,
            "DIAG1 activation on index position";
        bool diag1_onstate/set_diag1_onstate: regs::GCONF, gconf::DIAG1_ONSTATE,
            "DIAG1 activation while the chopper is on";
        bool diag1_steps_skipped/set_diag1_steps_skipped: regs::GCONF, gconf::DIAG1_STEPS_SKIPPED,
            "DIAG1 toggling on skipped steps";
        bool diag0_int_pushpull/set_diag0_int_pushpull: regs::GCONF, gconf::DIAG0_INT_PUSHPULL,
            "push-pull output mode for DIAG0";
        bool diag1_pushpull/set_diag1_pushpull: regs::GCONF, gconf::DIAG1_PUSHPULL,
            "push-pull output mode for DIAG1";
        bool small_hysteresis/set_small_hysteresis: regs::GCONF, gconf::SMALL_HYSTERESIS,
            "the reduced hysteresis for step frequency comparison";
        bool stop_enable/set_stop_enable: regs::GCONF, gconf::STOP_ENABLE,
            "emergency stop via the DCEN pin";
        bool direct_mode/set_direct_mode: regs::GCONF, gconf::DIRECT_MODE,
            "direct coil current control via XDIRECT";

        // GSTAT
        bool_ro reset_flag: regs::GSTAT, gstat::RESET,
            "whether a reset occurred since the flag was cleared";
        bool_ro drv_err: regs::GSTAT, gstat::DRV_ERR,
            "whether the driver shut down on an error";
        bool_ro uv_cp: regs::GSTAT, gstat::UV_CP,
            "charge pump undervoltage";

        // IOIN
        reg_ro ioin: regs::IOIN, "the input pin state register";
        bool_ro step_pin: regs::IOIN, ioin::STEP, "the STEP pin level";
        bool_ro dir_pin: regs::IOIN, ioin::DIR, "the DIR pin level";
        bool_ro dcen_cfg4: regs::IOIN, ioin::DCEN_CFG4, "the DCEN_CFG4 pin level";
        bool_ro dcin_cfg5: regs::IOIN, ioin::DCIN_CFG5, "the DCIN_CFG5 pin level";
        bool_ro drv_enn_cfg6: regs::IOIN, ioin::DRV_ENN_CFG6, "the DRV_ENN_CFG6 pin level";
        bool_ro dco: regs::IOIN, ioin::DCO, "the DCO pin level";
        uint_ro version: u8, regs::IOIN, ioin::VERSION, "the chip version (0x11 on the TMC2130)";

        // IHOLD_IRUN (write-only; getters return the shadow value)
        reg ihold_irun/set_ihold_irun: regs::IHOLD_IRUN, "the motor current control register";
        uint ihold/set_ihold: u8, regs::IHOLD_IRUN, ihold_irun::IHOLD,
            "the standstill current scale (0..31)";
        uint irun/set_irun: u8, regs::IHOLD_IRUN, ihold_irun::IRUN,
            "the run current scale (0..31)";
        uint iholddelay/set_iholddelay: u8, regs::IHOLD_IRUN, ihold_irun::IHOLDDELAY,
            "the delay before standstill current reduction";

        // Velocity thresholds and timing
        uint tpowerdown/set_tpowerdown: u8, regs::TPOWERDOWN, tpowerdown::TPOWERDOWN,
            "the standstill delay until current reduction";
        uint_ro tstep: u32, regs::TSTEP, tstep::TSTEP,
            "the measured time between microsteps";
        uint tpwmthrs/set_tpwmthrs: u32, regs::TPWMTHRS, tpwmthrs::TPWMTHRS,
            "the stealthChop upper velocity threshold";
        uint tcoolthrs/set_tcoolthrs: u32, regs::TCOOLTHRS, tcoolthrs::TCOOLTHRS,
            "the coolStep lower velocity threshold";
        uint thigh/set_thigh: u32, regs::THIGH, thigh::THIGH,
            "the high-velocity chopper switch threshold";

        // XDIRECT
        reg xdirect/set_xdirect: regs::XDIRECT, "the direct coil current register";
        int coil_a/set_coil_a: i16, regs::XDIRECT, xdirect::COIL_A,
            "the signed coil A current (-255..255)";
        int coil_b/set_coil_b: i16, regs::XDIRECT, xdirect::COIL_B,
            "the signed coil B current (-255..255)";

        uint vdcmin/set_vdcmin: u32, regs::VDCMIN, vdcmin::VDCMIN,
            "the dcStep minimum velocity";

        // Microstep table state
        uint_ro mscnt: u16, regs::MSCNT, mscnt::MSCNT, "the microstep counter";
        int_ro cur_a: i16, regs::MSCURACT, mscuract::CUR_A, "the signed phase A current";
        int_ro cur_b: i16, regs::MSCURACT, mscuract::CUR_B, "the signed phase B current";

        // CHOPCONF
        reg chopconf/set_chopconf: regs::CHOPCONF, "the chopper configuration register";
        uint toff/set_toff: u8, regs::CHOPCONF, chopconf::TOFF,
            "the chopper off time (0 disables the driver)";
        uint hstrt/set_hstrt: u8, regs::CHOPCONF, chopconf::HSTRT,
            "the raw hysteresis start field";
        uint hend/set_hend: u8, regs::CHOPCONF, chopconf::HEND,
            "the raw hysteresis end field";
        bool disfdcc/set_disfdcc: regs::CHOPCONF, chopconf::DISFDCC,
            "fast decay comparator termination disable";
        bool rndtf/set_rndtf: regs::CHOPCONF, chopconf::RNDTF,
            "random off time modulation";
        bool chm/set_chm: regs::CHOPCONF, chopconf::CHM,
            "constant off time chopper mode";
        uint tbl/set_tbl: u8, regs::CHOPCONF, chopconf::TBL,
            "the raw comparator blank time field";
        bool vsense/set_vsense: regs::CHOPCONF, chopconf::VSENSE,
            "the high-sensitivity sense voltage range";
        bool vhighfs/set_vhighfs: regs::CHOPCONF, chopconf::VHIGHFS,
            "full-stepping at high velocity";
        bool vhighchm/set_vhighchm: regs::CHOPCONF, chopconf::VHIGHCHM,
            "the high-velocity switch to constant off time";
        uint sync_phase/set_sync_phase: u8, regs::CHOPCONF, chopconf::SYNC,
            "the chopper synchronization clock divider";
        uint mres/set_mres: u8, regs::CHOPCONF, chopconf::MRES,
            "the raw microstep resolution field";
        bool intpol/set_intpol: regs::CHOPCONF, chopconf::INTPOL,
            "interpolation to 256 microsteps";
        bool dedge/set_dedge: regs::CHOPCONF, chopconf::DEDGE,
            "stepping on both STEP pin edges";
        bool diss2g/set_diss2g: regs::CHOPCONF, chopconf::DISS2G,
            "short-to-ground protection disable";

        // COOLCONF (write-only; getters return the shadow value)
        reg coolconf/set_coolconf: regs::COOLCONF, "the coolStep configuration register";
        uint semin/set_semin: u8, regs::COOLCONF, coolconf::SEMIN,
            "the coolStep current increase threshold";
        uint seup/set_seup: u8, regs::COOLCONF, coolconf::SEUP,
            "the coolStep current increment step width";
        uint semax/set_semax: u8, regs::COOLCONF, coolconf::SEMAX,
            "the coolStep current decrease hysteresis";
        uint sedn/set_sedn: u8, regs::COOLCONF, coolconf::SEDN,
            "the coolStep current decrement speed";
        bool seimin/set_seimin: regs::COOLCONF, coolconf::SEIMIN,
            "the quarter-current coolStep floor";
        int sgt/set_sgt: i8, regs::COOLCONF, coolconf::SGT,
            "the signed stallGuard threshold (-64..63)";
        bool sfilt/set_sfilt: regs::COOLCONF, coolconf::SFILT,
            "stallGuard filtering over four full steps";

        // DRV_STATUS
        reg_ro drv_status: regs::DRV_STATUS, "the driver status register";
        uint_ro sg_result: u16, regs::DRV_STATUS, drv_status::SG_RESULT,
            "the stallGuard measurement result";
        bool_ro fsactive: regs::DRV_STATUS, drv_status::FSACTIVE,
            "whether full-step mode is active";
        uint_ro cs_actual: u8, regs::DRV_STATUS, drv_status::CS_ACTUAL,
            "the actual current scale";
        bool_ro stallguard: regs::DRV_STATUS, drv_status::STALLGUARD,
            "whether a stall is detected";
        bool_ro ot: regs::DRV_STATUS, drv_status::OT,
            "overtemperature shutdown";
        bool_ro otpw: regs::DRV_STATUS, drv_status::OTPW,
            "overtemperature prewarning";
        bool_ro s2ga: regs::DRV_STATUS, drv_status::S2GA,
            "short to ground on phase A";
        bool_ro s2gb: regs::DRV_STATUS, drv_status::S2GB,
            "short to ground on phase B";
        bool_ro ola: regs::DRV_STATUS, drv_status::OLA,
            "open load on phase A";
        bool_ro olb: regs::DRV_STATUS, drv_status::OLB,
            "open load on phase B";
        bool_ro stst: regs::DRV_STATUS, drv_status::STST,
            "standstill detection";

        // PWMCONF (write-only; getters return the shadow value)
        reg pwmconf/set_pwmconf: regs::PWMCONF, "the stealthChop PWM configuration register";
        uint pwm_ampl/set_pwm_ampl: u8, regs::PWMCONF, pwmconf::PWM_AMPL,
            "the PWM amplitude or offset";
        uint pwm_grad/set_pwm_grad: u8, regs::PWMCONF, pwmconf::PWM_GRAD,
            "the PWM amplitude gradient";
        uint pwm_freq/set_pwm_freq: u8, regs::PWMCONF, pwmconf::PWM_FREQ,
            "the PWM frequency selection";
        bool pwm_autoscale/set_pwm_autoscale: regs::PWMCONF, pwmconf::PWM_AUTOSCALE,
            "automatic PWM amplitude scaling";
        bool pwm_symmetric/set_pwm_symmetric: regs::PWMCONF, pwmconf::PWM_SYMMETRIC,
            "forced symmetric PWM";
        uint freewheel/set_freewheel: u8, regs::PWMCONF, pwmconf::FREEWHEEL,
            "the standstill mode selection";

        uint_ro pwm_scale: u8, regs::PWM_SCALE, pwm_scale::PWM_SCALE,
            "the actual PWM amplitude scaler";

        // ENCM_CTRL (write-only)
        bool inv/set_inv: regs::ENCM_CTRL, encm_ctrl::INV,
            "encoder direction inversion";
        bool maxspeed/set_maxspeed: regs::ENCM_CTRL, encm_ctrl::MAXSPEED,
            "the maximum encoder update rate";

        uint_ro lost_steps: u32, regs::LOST_STEPS, lost_steps::LOST_STEPS,
            "the dcStep lost step counter";
    }

    chopper_helpers! {
        error = Error<E>;
        chopconf = regs::CHOPCONF;
        mres = chopconf::MRES;
        tbl = chopconf::TBL;
        hstrt = chopconf::HSTRT;
        hend = chopconf::HEND;
    }

    current_helpers! {
        error = Error<E>;
    }
}
