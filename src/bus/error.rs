use defmt::Format;

pub type Result<T, E> = core::result::Result<T, Error<E>>;

#[derive(Debug, Format, Copy, Clone)]
pub enum Error<E> {
    /// No completion event arrived within the bounded wait. The transfer may
    /// still be running, the device may be absent, or the peripheral may be
    /// misconfigured.
    Timeout,

    /// A completion event arrived that does not match the transfer in
    /// flight. This generally means a previous transfer was abandoned and
    /// completed late.
    UnexpectedEvent,

    /// The peripheral driver refused or failed to start the transfer
    Bus(E),

    /// The id register did not identify the expected sensor
    ChipIdMismatch,

    /// A measurement was requested before the calibration block was loaded
    NotCalibrated,
}

impl<E> Error<E> {
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::Timeout => "Completion timeout",
            Error::UnexpectedEvent => "Unexpected completion event",
            Error::Bus(_) => "Bus error",
            Error::ChipIdMismatch => "Chip id mismatch",
            Error::NotCalibrated => "Not calibrated",
        }
    }
}

impl<E> From<E> for Error<E> {
    fn from(value: E) -> Self {
        Self::Bus(value)
    }
}
