//! Implementation for the BMP085/BMP180 barometric pressure sensor.
//!
//! Compensation arithmetic follows the datasheet reference algorithm:
//! integer products, shifts and divisions, including the
//! `B7 < 0x8000_0000` branch that keeps the 32-bit scaling from
//! overflowing. The datasheet worked example lands exactly (see the tests).

use defmt::Format;
use rtic_monotonics::stm32::{Tim2 as Mono, *};

use crate::{
    barometer::{pressure_altitude, Celsius, Meters, Pascals, Reading},
    bus::{Bus, BusTransport, Error},
};

/// Fixed device address
pub const ADDRESS: u8 = 0x77;

/// Value of the id register for this sensor family
const CHIP_ID: u8 = 0x55;

/// Datasheet temperature conversion time is 4.5 ms
const TEMPERATURE_CONVERSION_MS: u16 = 5;

mod registers {
    /// First byte of the 22-byte factory calibration block
    pub const CALIBRATION: u8 = 0xAA;
    /// Chip identification
    pub const ID: u8 = 0xD0;
    /// Measurement control
    pub const CTRL_MEAS: u8 = 0xF4;
    /// Conversion result, MSB first
    pub const OUT: u8 = 0xF6;
}

mod commands {
    /// Start a temperature conversion
    pub const CONVERT_TEMPERATURE: u8 = 0x2E;
    /// Start a pressure conversion; the oversampling setting goes in bits 7:6
    pub const CONVERT_PRESSURE: u8 = 0x34;
}

/// Hardware pressure sampling accuracy modes.
///
/// Higher settings integrate longer inside the sensor: more resolution,
/// fewer samples per second.
#[derive(Debug, Format, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum Oversampling {
    UltraLowPower = 0,
    Standard = 1,
    HighResolution = 2,
    UltraHighResolution = 3,
}

impl Oversampling {
    pub const fn from_setting(setting: u8) -> Option<Self> {
        match setting {
            0 => Some(Self::UltraLowPower),
            1 => Some(Self::Standard),
            2 => Some(Self::HighResolution),
            3 => Some(Self::UltraHighResolution),
            _ => None,
        }
    }

    pub const fn setting(self) -> u8 {
        self as u8
    }

    /// Control byte starting a pressure conversion at this setting
    const fn command(self) -> u8 {
        commands::CONVERT_PRESSURE | (self as u8) << 6
    }

    /// Returns the minimum conversion time in milliseconds
    pub const fn conversion_time(self) -> u16 {
        match self {
            Self::UltraLowPower => 5,
            Self::Standard => 8,
            Self::HighResolution => 14,
            Self::UltraHighResolution => 26,
        }
    }

    /// Bits of the 24-bit conversion result this setting leaves unused
    const fn data_shift(self) -> u8 {
        8 - self as u8
    }
}

/// Factory calibration constants, unique per sensor unit
#[derive(Debug, Format, Copy, Clone, Eq, PartialEq)]
pub struct Calibration {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl Calibration {
    /// Decode the 22-byte calibration block: eleven big-endian words,
    /// AC4-AC6 unsigned, the rest signed.
    pub fn decode(raw: &[u8; 22]) -> Self {
        Self {
            ac1: i16::from_be_bytes([raw[0], raw[1]]),
            ac2: i16::from_be_bytes([raw[2], raw[3]]),
            ac3: i16::from_be_bytes([raw[4], raw[5]]),
            ac4: u16::from_be_bytes([raw[6], raw[7]]),
            ac5: u16::from_be_bytes([raw[8], raw[9]]),
            ac6: u16::from_be_bytes([raw[10], raw[11]]),
            b1: i16::from_be_bytes([raw[12], raw[13]]),
            b2: i16::from_be_bytes([raw[14], raw[15]]),
            mb: i16::from_be_bytes([raw[16], raw[17]]),
            mc: i16::from_be_bytes([raw[18], raw[19]]),
            md: i16::from_be_bytes([raw[20], raw[21]]),
        }
    }

    /// Temperature term shared with the pressure computation (datasheet B5)
    fn b5(&self, ut: u16) -> i32 {
        let ut = i32::from(ut);
        let x1 = ((ut - i32::from(self.ac6)) * i32::from(self.ac5)) >> 15;
        let x2 = (i32::from(self.mc) << 11) / (x1 + i32::from(self.md));
        x1 + x2
    }

    /// True temperature in °C, resolution 0.1 °C
    pub fn temperature(&self, ut: u16) -> Celsius {
        let deci_celsius = (self.b5(ut) + 8) >> 4;
        deci_celsius as f32 / 10.0
    }

    /// True pressure in Pa.
    ///
    /// The temperature-dependent term is derived from `ut` here, so the
    /// result is always compensated against a temperature conversion taken
    /// alongside the pressure conversion.
    pub fn pressure(&self, up: u32, ut: u16, oversampling: Oversampling) -> i32 {
        let oss = oversampling.setting();

        let b6 = self.b5(ut) - 4000;
        let x1 = (i32::from(self.b2) * ((b6 * b6) >> 12)) >> 11;
        let x2 = (i32::from(self.ac2) * b6) >> 11;
        let x3 = x1 + x2;
        let b3 = (((i32::from(self.ac1) * 4 + x3) << oss) + 2) / 4;

        let x1 = (i32::from(self.ac3) * b6) >> 13;
        let x2 = (i32::from(self.b1) * ((b6 * b6) >> 12)) >> 16;
        let x3 = ((x1 + x2) + 2) >> 2;
        let b4 = (u32::from(self.ac4) * ((x3 + 32768) as u32)) >> 15;

        let b7 = (up - b3 as u32) * (50_000 >> oss);
        let pressure = if b7 < 0x8000_0000 {
            ((b7 * 2) / b4) as i32
        } else {
            ((b7 / b4) * 2) as i32
        };

        let x1 = (pressure >> 8) * (pressure >> 8);
        let x1 = (x1 * 3038) >> 16;
        let x2 = (-7357 * pressure) >> 16;
        pressure + ((x1 + x2 + 3791) >> 4)
    }
}

/// Assemble the 24-bit conversion result and drop the bits the selected
/// oversampling leaves unused
const fn unpack_pressure(raw: [u8; 3], oversampling: Oversampling) -> u32 {
    let word = (raw[0] as u32) << 16 | (raw[1] as u32) << 8 | raw[2] as u32;
    word >> oversampling.data_shift()
}

/// BMP085/BMP180 driver over a [`Bus`].
///
/// [`init`](Self::init) must run before any measurement; every operation
/// returns an error instead of undefined readings otherwise.
pub struct Bmp180<T> {
    bus: Bus<T>,
    calibration: Option<Calibration>,
}

impl<T: BusTransport> Bmp180<T> {
    pub const fn new(bus: Bus<T>) -> Self {
        Self {
            bus,
            calibration: None,
        }
    }

    /// Probe the chip and load the factory calibration block
    pub async fn init(&mut self) -> Result<(), Error<T::Error>> {
        let mut id = [0u8; 1];
        self.bus.read_registers(registers::ID, &mut id).await?;
        if id[0] != CHIP_ID {
            return Err(Error::ChipIdMismatch);
        }

        let mut raw = [0u8; 22];
        self.bus.read_registers(registers::CALIBRATION, &mut raw).await?;
        self.calibration = Some(Calibration::decode(&raw));

        Ok(())
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Start a conversion and wait out its settle time
    async fn convert(&mut self, command: u8, settle_ms: u16) -> Result<(), Error<T::Error>> {
        self.bus.write_register(registers::CTRL_MEAS, command).await?;
        Mono::delay(u64::from(settle_ms).millis()).await;
        Ok(())
    }

    /// Raw uncompensated temperature (UT)
    pub async fn read_raw_temperature(&mut self) -> Result<u16, Error<T::Error>> {
        self.convert(commands::CONVERT_TEMPERATURE, TEMPERATURE_CONVERSION_MS)
            .await?;

        let mut raw = [0u8; 2];
        self.bus.read_registers(registers::OUT, &mut raw).await?;
        Ok(u16::from_be_bytes(raw))
    }

    /// Raw uncompensated pressure (UP), scaled for `oversampling`
    pub async fn read_raw_pressure(
        &mut self,
        oversampling: Oversampling,
    ) -> Result<u32, Error<T::Error>> {
        self.convert(oversampling.command(), oversampling.conversion_time())
            .await?;

        let mut raw = [0u8; 3];
        self.bus.read_registers(registers::OUT, &mut raw).await?;
        Ok(unpack_pressure(raw, oversampling))
    }

    /// Measures the compensated temperature in °C
    pub async fn temperature(&mut self) -> Result<Celsius, Error<T::Error>> {
        let calibration = self.loaded_calibration()?;
        let ut = self.read_raw_temperature().await?;
        Ok(calibration.temperature(ut))
    }

    /// Measures the compensated pressure in Pa.
    ///
    /// Runs a temperature conversion first: the compensation formula needs
    /// a current temperature term.
    pub async fn pressure(&mut self, oversampling: Oversampling) -> Result<Pascals, Error<T::Error>> {
        self.measure(oversampling).await.map(|reading| reading.pressure)
    }

    /// Measures temperature and pressure with one conversion each
    pub async fn measure(&mut self, oversampling: Oversampling) -> Result<Reading, Error<T::Error>> {
        let calibration = self.loaded_calibration()?;
        let ut = self.read_raw_temperature().await?;
        let up = self.read_raw_pressure(oversampling).await?;

        Ok(Reading {
            temperature: calibration.temperature(ut),
            pressure: calibration.pressure(up, ut, oversampling) as f32,
        })
    }

    /// Altitude above the standard sea-level reference, in meters
    pub async fn altitude(&mut self, oversampling: Oversampling) -> Result<Meters, Error<T::Error>> {
        let pressure = self.pressure(oversampling).await?;
        Ok(pressure_altitude(pressure))
    }

    fn loaded_calibration(&self) -> Result<Calibration, Error<T::Error>> {
        self.calibration.ok_or(Error::NotCalibrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Worked example from the datasheet (section 3.5)
    const CALIBRATION: Calibration = Calibration {
        ac1: 408,
        ac2: -72,
        ac3: -14383,
        ac4: 32741,
        ac5: 32757,
        ac6: 23153,
        b1: 6190,
        b2: 4,
        mb: -32768,
        mc: -8711,
        md: 2868,
    };

    #[test]
    fn temperature_matches_datasheet_example() {
        let temperature = CALIBRATION.temperature(27898);
        assert!((temperature - 15.0).abs() < 0.1);
    }

    #[test]
    fn pressure_matches_datasheet_example() {
        let pressure = CALIBRATION.pressure(23843, 27898, Oversampling::UltraLowPower);
        assert_eq!(pressure, 69_964);
    }

    #[test]
    fn calibration_decode_is_endian_and_sign_correct() {
        let words: [u16; 11] = [
            408,
            (-72i16) as u16,
            (-14383i16) as u16,
            0xFFE5, // AC4 above i16::MAX stays unsigned
            32757,
            23153,
            6190,
            4,
            0x8000, // MB at the signed minimum
            (-8711i16) as u16,
            2868,
        ];
        let mut raw = [0u8; 22];
        for (chunk, word) in raw.chunks_exact_mut(2).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }

        let calibration = Calibration::decode(&raw);
        assert_eq!(calibration.ac1, 408);
        assert_eq!(calibration.ac2, -72);
        assert_eq!(calibration.ac3, -14383);
        assert_eq!(calibration.ac4, 65509);
        assert_eq!(calibration.ac5, 32757);
        assert_eq!(calibration.ac6, 23153);
        assert_eq!(calibration.b1, 6190);
        assert_eq!(calibration.b2, 4);
        assert_eq!(calibration.mb, i16::MIN);
        assert_eq!(calibration.mc, -8711);
        assert_eq!(calibration.md, 2868);
    }

    #[test]
    fn conversion_times_follow_the_datasheet_table() {
        assert_eq!(Oversampling::UltraLowPower.conversion_time(), 5);
        assert_eq!(Oversampling::Standard.conversion_time(), 8);
        assert_eq!(Oversampling::HighResolution.conversion_time(), 14);
        assert_eq!(Oversampling::UltraHighResolution.conversion_time(), 26);
    }

    #[test]
    fn pressure_commands_place_oversampling_in_the_high_bits() {
        assert_eq!(Oversampling::UltraLowPower.command(), 0x34);
        assert_eq!(Oversampling::Standard.command(), 0x74);
        assert_eq!(Oversampling::HighResolution.command(), 0xB4);
        assert_eq!(Oversampling::UltraHighResolution.command(), 0xF4);
    }

    #[test]
    fn raw_pressure_drops_exactly_the_unused_bits() {
        let raw = [0x12, 0x34, 0x56];
        assert_eq!(
            unpack_pressure(raw, Oversampling::UltraLowPower),
            0x0012_3456 >> 8
        );
        assert_eq!(unpack_pressure(raw, Oversampling::Standard), 0x0012_3456 >> 7);
        assert_eq!(
            unpack_pressure(raw, Oversampling::HighResolution),
            0x0012_3456 >> 6
        );
        assert_eq!(
            unpack_pressure(raw, Oversampling::UltraHighResolution),
            0x0012_3456 >> 5
        );
    }

    #[test]
    fn oversampling_settings_round_trip() {
        for setting in 0..4 {
            let oversampling = Oversampling::from_setting(setting).unwrap();
            assert_eq!(oversampling.setting(), setting);
        }
        assert!(Oversampling::from_setting(4).is_none());
    }
}
