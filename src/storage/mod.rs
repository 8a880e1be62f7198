use heapless::HistoryBuffer;
use rtic_monotonics::{stm32::Tim2 as Mono, Monotonic};

use crate::barometer::Reading;

pub struct Storage<const N: usize> {
    samples: HistoryBuffer<Sample, N>,
}

impl<const N: usize> Storage<N> {
    pub const fn new() -> Self {
        Self {
            samples: HistoryBuffer::new(),
        }
    }

    /// Record a reading, returning the stored reduced-precision sample
    pub fn write(&mut self, reading: Reading) -> Sample {
        let sample = Sample::now_from_reading(reading);
        self.samples.write(sample);
        sample
    }

    pub fn recent(&self) -> Option<Sample> {
        self.samples.recent().copied()
    }

    pub fn oldest(&self) -> impl Iterator<Item = &Sample> {
        self.samples.oldest_ordered()
    }
}

#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct Sample {
    /// Seconds since startup
    secs: u32,
    /// Reduced precision temperature, tenths of a °C
    deci_celsius: i16,
    /// Reduced precision pressure, tens of Pa
    decapascals: u16,
}

static_assertions::assert_eq_size!(Sample, u64);

impl Sample {
    #[inline]
    fn new(secs: u32, reading: Reading) -> Self {
        Self {
            secs,
            deci_celsius: (reading.temperature * 10.0) as i16,
            decapascals: (reading.pressure / 10.0) as u16,
        }
    }

    #[inline]
    fn now_from_reading(reading: Reading) -> Self {
        let secs = Mono::now().duration_since_epoch().to_secs();
        Self::new(secs as u32, reading)
    }

    pub fn secs(&self) -> u32 {
        self.secs
    }

    /// Tenths of a degree Celsius
    pub fn deci_celsius(&self) -> i16 {
        self.deci_celsius
    }

    /// Pascals
    pub fn pascals(&self) -> u32 {
        u32::from(self.decapascals) * 10
    }
}
