//! Barometric sensor interface

pub mod bmp180;

use defmt::Format;

pub type Celsius = f32;
pub type Pascals = f32;
pub type Meters = f32;

/// Standard sea-level pressure in Pa
pub const SEA_LEVEL_PRESSURE: Pascals = 101_325.0;

/// One compensated measurement
#[derive(Debug, Format, Copy, Clone, PartialEq)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: Celsius,
    /// Pascals
    pub pressure: Pascals,
}

pub trait Barometer {
    type Error;

    /// Measure temperature and pressure
    async fn read(&mut self) -> Result<Reading, Self::Error>;
}

/// International barometric formula: altitude above the sea-level reference
/// for a given pressure.
///
/// The reference is fixed at [`SEA_LEVEL_PRESSURE`]; accuracy depends on
/// how close the actual local sea-level pressure is to it.
pub fn pressure_altitude(pressure: Pascals) -> Meters {
    44_330.0 * (1.0 - libm::powf(pressure / SEA_LEVEL_PRESSURE, 0.190_294_957_18))
}

/// Fake barometer for testing
#[cfg(feature = "fake")]
pub mod fake {
    use core::convert::Infallible;

    use crate::barometer::{Barometer, Reading};

    /// A fake barometer that always returns the same reading
    pub struct FakeBarometer {
        reading: Reading,
    }

    impl FakeBarometer {
        pub const fn new(reading: Reading) -> Self {
            Self { reading }
        }

        /// Get the current reading
        pub const fn reading(&self) -> Reading {
            self.reading
        }
        /// Get a mutable reference to the current reading
        pub fn reading_mut(&mut self) -> &mut Reading {
            &mut self.reading
        }
    }

    impl Barometer for FakeBarometer {
        type Error = Infallible;

        async fn read(&mut self) -> Result<Reading, Self::Error> {
            Ok(self.reading)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn altitude_is_zero_at_the_reference_pressure() {
        assert!(pressure_altitude(SEA_LEVEL_PRESSURE).abs() < 0.01);
    }

    #[test]
    fn altitude_decreases_as_pressure_rises() {
        let pressures = [80_000.0, 90_000.0, 95_000.0, SEA_LEVEL_PRESSURE, 104_000.0];
        for pair in pressures.windows(2) {
            assert!(pressure_altitude(pair[1]) < pressure_altitude(pair[0]));
        }
    }
}
