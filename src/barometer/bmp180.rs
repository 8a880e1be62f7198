use crate::{
    barometer::{Barometer, Reading},
    bmp180::{Bmp180, Oversampling},
    bus::{BusTransport, Error},
};

/// [`Bmp180`] behind the [`Barometer`] interface, carrying the node's
/// oversampling policy.
pub struct Bmp180Barometer<T> {
    sensor: Bmp180<T>,
    oversampling: Oversampling,
}

impl<T: BusTransport> Bmp180Barometer<T> {
    pub const fn new(sensor: Bmp180<T>) -> Self {
        Self {
            sensor,
            oversampling: Oversampling::Standard,
        }
    }

    /// Probe the chip and load its calibration
    pub async fn init(&mut self) -> Result<(), Error<T::Error>> {
        self.sensor.init().await
    }

    pub fn sensor(&self) -> &Bmp180<T> {
        &self.sensor
    }
    pub fn sensor_mut(&mut self) -> &mut Bmp180<T> {
        &mut self.sensor
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }
    pub fn set_oversampling(&mut self, oversampling: Oversampling) {
        self.oversampling = oversampling;
    }
}

impl<T: BusTransport> Barometer for Bmp180Barometer<T> {
    type Error = Error<T::Error>;

    async fn read(&mut self) -> Result<Reading, Self::Error> {
        self.sensor.measure(self.oversampling).await
    }
}
