//! Register transfers against the sensor bus, with completion events.
//!
//! The driver never talks to the peripheral directly: a [`BusTransport`]
//! starts transfers, and the completion path (a DMA transfer-complete
//! interrupt, or the return of a blocking call) raises an [`Event`] through
//! its [`CompletionNotifier`]. [`Bus`] sequences the two halves and bounds
//! every wait, so a dead bus surfaces as [`Error::Timeout`] instead of a
//! hang.

mod error;

use fugit::ExtU64;
use rtic_monotonics::{stm32::Tim2 as Mono, Monotonic, TimeoutError};
use rtic_sync::channel::{Receiver, Sender};

pub use self::error::*;

/// Longest a started transfer may take before the wait is abandoned
const TRANSFER_TIMEOUT_MS: u64 = 50;

/// Depth of the completion event queue. One transfer is in flight at a
/// time; the spare slot absorbs a late completion from an abandoned
/// transfer until the next drain.
pub const EVENT_CAPACITY: usize = 2;

pub type EventSender = Sender<'static, Event, EVENT_CAPACITY>;
pub type EventReceiver = Receiver<'static, Event, EVENT_CAPACITY>;

/// Transfer completion, as reported by the transport layer
#[derive(Debug, defmt::Format, Copy, Clone, Eq, PartialEq)]
pub enum Event {
    WriteComplete,
    ReadComplete,
}

/// Completion-side handle held by the transport layer.
///
/// `Clone` so that separate write- and read-completion interrupt handlers
/// can each own one. Raising an event never blocks; it is safe from
/// interrupt context.
#[derive(Clone)]
pub struct CompletionNotifier {
    events: EventSender,
}

impl CompletionNotifier {
    pub const fn new(events: EventSender) -> Self {
        Self { events }
    }

    pub fn write_complete(&mut self) {
        // A full queue means nothing is waiting on this transfer
        let _ = self.events.try_send(Event::WriteComplete);
    }

    pub fn read_complete(&mut self) {
        let _ = self.events.try_send(Event::ReadComplete);
    }
}

/// Starts register transfers addressed at the sensor.
///
/// Implementations report completion through the [`CompletionNotifier`]
/// paired with the [`Bus`] that owns them.
pub trait BusTransport {
    type Error;

    /// Begin writing one byte to a device register
    fn start_write(&mut self, register: u8, value: u8) -> core::result::Result<(), Self::Error>;

    /// Begin reading `buffer.len()` bytes starting at a device register
    fn start_read(&mut self, register: u8, buffer: &mut [u8]) -> core::result::Result<(), Self::Error>;
}

/// Issue-then-wait sequencing over a [`BusTransport`].
pub struct Bus<T> {
    transport: T,
    events: EventReceiver,
    timeout: <Mono as Monotonic>::Duration,
}

impl<T: BusTransport> Bus<T> {
    pub fn new(transport: T, events: EventReceiver) -> Self {
        Self {
            transport,
            events,
            timeout: TRANSFER_TIMEOUT_MS.millis(),
        }
    }

    /// Write one byte to `register` and wait for completion
    pub async fn write_register(&mut self, register: u8, value: u8) -> Result<(), T::Error> {
        self.drain();
        self.transport.start_write(register, value)?;
        self.wait_for(Event::WriteComplete).await
    }

    /// Fill `buffer` from consecutive registers starting at `register` and
    /// wait for completion
    pub async fn read_registers(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), T::Error> {
        self.drain();
        self.transport.start_read(register, buffer)?;
        self.wait_for(Event::ReadComplete).await
    }

    /// Discard completion events left over from abandoned transfers
    fn drain(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    async fn wait_for(&mut self, expected: Event) -> Result<(), T::Error> {
        match Mono::timeout_after(self.timeout, self.events.recv()).await {
            Ok(Ok(event)) if event == expected => Ok(()),
            Ok(Ok(_)) => Err(Error::UnexpectedEvent),
            // Every notifier was dropped: no completion can ever arrive
            Ok(Err(_)) => Err(Error::Timeout),
            Err(TimeoutError) => Err(Error::Timeout),
        }
    }
}

/// [`BusTransport`] over a blocking HAL I2C peripheral.
///
/// The transfer runs to completion inside `start_*`; the completion event
/// is raised on return rather than from a transfer-complete interrupt. A
/// DMA transport raising events from its own interrupt handlers drops in
/// without driver changes.
pub struct BlockingI2c<I2C> {
    i2c: I2C,
    address: u8,
    notifier: CompletionNotifier,
}

impl<I2C> BlockingI2c<I2C> {
    pub const fn new(i2c: I2C, address: u8, notifier: CompletionNotifier) -> Self {
        Self {
            i2c,
            address,
            notifier,
        }
    }
}

impl<I2C, E> BusTransport for BlockingI2c<I2C>
where
    I2C: embedded_hal::blocking::i2c::Write<Error = E>
        + embedded_hal::blocking::i2c::WriteRead<Error = E>,
{
    type Error = E;

    fn start_write(&mut self, register: u8, value: u8) -> core::result::Result<(), E> {
        self.i2c.write(self.address, &[register, value])?;
        self.notifier.write_complete();
        Ok(())
    }

    fn start_read(&mut self, register: u8, buffer: &mut [u8]) -> core::result::Result<(), E> {
        self.i2c.write_read(self.address, &[register], buffer)?;
        self.notifier.read_complete();
        Ok(())
    }
}
