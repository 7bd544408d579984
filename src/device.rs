//! Accessor generation for the driver facades
//!
//! The chip facades declare their field surface as a table consumed by
//! [`register_api!`]: one line per field naming the accessor pair, the
//! register and field constants from [`registers`](crate::registers), the
//! value type, and a description. The macro expands each line into a
//! getter/setter pair that routes through the facade's `read_reg` /
//! `write_reg` / `update_field` plumbing, so the shadow-store and transport
//! policy lives in exactly one place per chip.
//!
//! Entry kinds:
//!
//! - `reg get/set: REG, "desc"`: raw 32-bit register accessor pair
//! - `reg_ro get: REG, "desc"`: raw read-only register accessor
//! - `bool get/set: REG, FIELD, "desc"`: single-bit field
//! - `bool_ro get: REG, FIELD, "desc"`
//! - `uint get/set: TYPE, REG, FIELD, "desc"`: unsigned field
//! - `uint_ro get: TYPE, REG, FIELD, "desc"`
//! - `int get/set: TYPE, REG, FIELD, "desc"`: sign-extended field
//! - `int_ro get: TYPE, REG, FIELD, "desc"`

macro_rules! register_api {
    (error = $err:ty;) => {};

    (error = $err:ty;
     reg $get:ident/$set:ident: $reg:expr, $desc:literal; $($rest:tt)*) => {
        #[doc = concat!("Raw value of ", $desc)]
        pub fn $get(&mut self) -> Result<u32, $err> {
            self.read_reg($reg)
        }
        #[doc = concat!("Write the raw value of ", $desc)]
        pub fn $set(&mut self, value: u32) -> Result<(), $err> {
            self.write_reg($reg, value)
        }
        register_api!(error = $err; $($rest)*);
    };

    (error = $err:ty;
     reg_ro $get:ident: $reg:expr, $desc:literal; $($rest:tt)*) => {
        #[doc = concat!("Raw value of ", $desc)]
        pub fn $get(&mut self) -> Result<u32, $err> {
            self.read_reg($reg)
        }
        register_api!(error = $err; $($rest)*);
    };

    (error = $err:ty;
     bool $get:ident/$set:ident: $reg:expr, $field:expr, $desc:literal; $($rest:tt)*) => {
        #[doc = concat!("Read ", $desc)]
        pub fn $get(&mut self) -> Result<bool, $err> {
            Ok($field.extract(self.read_reg($reg)?) != 0)
        }
        #[doc = concat!("Set ", $desc)]
        pub fn $set(&mut self, value: bool) -> Result<(), $err> {
            self.update_field($reg, $field, value as u32)
        }
        register_api!(error = $err; $($rest)*);
    };

    (error = $err:ty;
     bool_ro $get:ident: $reg:expr, $field:expr, $desc:literal; $($rest:tt)*) => {
        #[doc = concat!("Read ", $desc)]
        pub fn $get(&mut self) -> Result<bool, $err> {
            Ok($field.extract(self.read_reg($reg)?) != 0)
        }
        register_api!(error = $err; $($rest)*);
    };

    (error = $err:ty;
     uint $get:ident/$set:ident: $ty:ty, $reg:expr, $field:expr, $desc:literal; $($rest:tt)*) => {
        #[doc = concat!("Read ", $desc)]
        pub fn $get(&mut self) -> Result<$ty, $err> {
            Ok($field.extract(self.read_reg($reg)?) as $ty)
        }
        #[doc = concat!("Set ", $desc)]
        pub fn $set(&mut self, value: $ty) -> Result<(), $err> {
            self.update_field($reg, $field, u32::from(value))
        }
        register_api!(error = $err; $($rest)*);
    };

    (error = $err:ty;
     uint_ro $get:ident: $ty:ty, $reg:expr, $field:expr, $desc:literal; $($rest:tt)*) => {
        #[doc = concat!("Read ", $desc)]
        pub fn $get(&mut self) -> Result<$ty, $err> {
            Ok($field.extract(self.read_reg($reg)?) as $ty)
        }
        register_api!(error = $err; $($rest)*);
    };

    (error = $err:ty;
     int $get:ident/$set:ident: $ty:ty, $reg:expr, $field:expr, $desc:literal; $($rest:tt)*) => {
        #[doc = concat!("Read ", $desc)]
        pub fn $get(&mut self) -> Result<$ty, $err> {
            Ok($field.extract_signed(self.read_reg($reg)?) as $ty)
        }
        #[doc = concat!("Set ", $desc)]
        pub fn $set(&mut self, value: $ty) -> Result<(), $err> {
            self.update_field($reg, $field, value as i32 as u32)
        }
        register_api!(error = $err; $($rest)*);
    };

    (error = $err:ty;
     int_ro $get:ident: $ty:ty, $reg:expr, $field:expr, $desc:literal; $($rest:tt)*) => {
        #[doc = concat!("Read ", $desc)]
        pub fn $get(&mut self) -> Result<$ty, $err> {
            Ok($field.extract_signed(self.read_reg($reg)?) as $ty)
        }
        register_api!(error = $err; $($rest)*);
    };
}

/// Chopper tuning helpers shared by every chip with a CHOPCONF register:
/// microstep resolution, comparator blank time and the offset-encoded
/// hysteresis values in their physical ranges.
macro_rules! chopper_helpers {
    (error = $err:ty; chopconf = $reg:expr; mres = $mres:expr; tbl = $tbl:expr;
     hstrt = $hstrt:expr; hend = $hend:expr;) => {
        /// Microstep resolution: 256, 128, 64, 32, 16, 8, 4, 2 or 0 for
        /// full-step mode
        pub fn microsteps(&mut self) -> Result<u16, $err> {
            Ok(match $mres.extract(self.read_reg($reg)?) {
                0 => 256,
                1 => 128,
                2 => 64,
                3 => 32,
                4 => 16,
                5 => 8,
                6 => 4,
                7 => 2,
                _ => 0,
            })
        }

        /// Set the microstep resolution
        ///
        /// Accepts 256, 128, 64, 32, 16, 8, 4, 2 or 0 (full-step mode);
        /// other values are ignored.
        pub fn set_microsteps(&mut self, resolution: u16) -> Result<(), $err> {
            let mres = match resolution {
                256 => 0,
                128 => 1,
                64 => 2,
                32 => 3,
                16 => 4,
                8 => 5,
                4 => 6,
                2 => 7,
                0 => 8,
                _ => return Ok(()),
            };
            self.update_field($reg, $mres, mres)
        }

        /// Comparator blank time in clock cycles: 16, 24, 36 or 54
        pub fn blank_time(&mut self) -> Result<u8, $err> {
            Ok(match $tbl.extract(self.read_reg($reg)?) {
                0 => 16,
                1 => 24,
                2 => 36,
                _ => 54,
            })
        }

        /// Set the comparator blank time
        ///
        /// Accepts 16, 24, 36 or 54 clock cycles; other values are ignored.
        pub fn set_blank_time(&mut self, cycles: u8) -> Result<(), $err> {
            let tbl = match cycles {
                16 => 0,
                24 => 1,
                36 => 2,
                54 => 3,
                _ => return Ok(()),
            };
            self.update_field($reg, $tbl, tbl)
        }

        /// Hysteresis end value in its physical -3..=12 range
        pub fn hysteresis_end(&mut self) -> Result<i8, $err> {
            Ok($hend.extract(self.read_reg($reg)?) as i8 - 3)
        }

        /// Set the hysteresis end value (-3..=12; the register stores it
        /// offset by 3). Out-of-range values are ignored.
        pub fn set_hysteresis_end(&mut self, value: i8) -> Result<(), $err> {
            if !(-3..=12).contains(&value) {
                return Ok(());
            }
            self.update_field($reg, $hend, (value + 3) as u32)
        }

        /// Hysteresis start value in its physical 1..=8 range
        pub fn hysteresis_start(&mut self) -> Result<u8, $err> {
            Ok($hstrt.extract(self.read_reg($reg)?) as u8 + 1)
        }

        /// Set the hysteresis start value (1..=8; the register stores it
        /// offset by 1). Out-of-range values are ignored.
        pub fn set_hysteresis_start(&mut self, value: u8) -> Result<(), $err> {
            if !(1..=8).contains(&value) {
                return Ok(());
            }
            self.update_field($reg, $hstrt, (value - 1) as u32)
        }
    };
}

/// RMS current configuration shared by every chip with IHOLD_IRUN and a
/// VSENSE range switch. Expects the facade to carry `rsense` and
/// `hold_multiplier` fields plus the generated `irun`/`ihold`/`vsense`
/// accessors.
macro_rules! current_helpers {
    (error = $err:ty;) => {
        /// Motor RMS current in milliamps, derived from IRUN, the sense
        /// range and the sense resistor value
        pub fn rms_current(&mut self) -> Result<u16, $err> {
            let scale = self.irun()?;
            let vsense = self.vsense()?;
            Ok(crate::current::rms_from_scale(scale, self.rsense, vsense))
        }

        /// Program the run and hold currents from an RMS target in
        /// milliamps
        ///
        /// Picks the high-sensitivity VSENSE range when the low range would
        /// leave fewer than 16 of the 32 current scale steps, then derives
        /// IHOLD from the hold multiplier.
        pub fn set_rms_current(&mut self, milliamps: u16) -> Result<(), $err> {
            let mut scale = crate::current::scale_for_rms(milliamps, self.rsense, false);
            if scale < 16 {
                self.set_vsense(true)?;
                scale = crate::current::scale_for_rms(milliamps, self.rsense, true);
            } else {
                self.set_vsense(false)?;
            }
            self.set_irun(scale)?;
            self.set_ihold((scale as f32 * self.hold_multiplier) as u8)
        }

        /// Fraction of the run current kept at standstill
        pub fn hold_multiplier(&self) -> f32 {
            self.hold_multiplier
        }

        /// Set the standstill current fraction used by `set_rms_current`
        pub fn set_hold_multiplier(&mut self, multiplier: f32) {
            self.hold_multiplier = multiplier;
        }
    };
}
