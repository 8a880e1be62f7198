#![feature(type_alias_impl_trait)]
#![no_std]
#![no_main]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(dead_code, clippy::module_name_repetitions, clippy::wildcard_imports)]

mod sampler;
mod terminal;

use defmt_rtt as _;
use panic_probe as _;

#[rtic::app(device = stm32f0xx_hal::pac, dispatchers = [USART1, TIM14])]
mod app {
    use defmt::{panic, unreachable, *};
    use rtic_monotonics::{
        stm32::{Tim2 as Mono, *},
        Monotonic,
    };
    use rtic_sync::{
        channel::{ReceiveError, Receiver, Sender},
        make_channel,
    };
    use stm32f0xx_hal::{
        gpio::{
            gpioa::{PA15, PA2},
            gpiob::{PB6, PB7},
            Alternate, Output, Pin, PushPull, AF1,
        },
        i2c::I2c,
        pac::{Interrupt, I2C1, IWDG, USART2},
        prelude::*,
        serial,
        serial::{Event as SerialEvent, Serial},
        watchdog::Watchdog,
    };

    use crate::terminal::is_newline;
    use rtic_altimeter::{
        barometer::{bmp180::Bmp180Barometer, Reading},
        bmp180::{self, Bmp180, Oversampling},
        bus::{BlockingI2c, Bus, CompletionNotifier, Event, EVENT_CAPACITY},
        storage::{Sample, Storage},
    };

    type SensorI2c = I2c<I2C1, PB6<Alternate<AF1>>, PB7<Alternate<AF1>>>;
    pub type SensorBarometer = Bmp180Barometer<BlockingI2c<SensorI2c>>;

    #[shared]
    struct Shared {
        usart: Serial<USART2, PA2<Alternate<AF1>>, PA15<Alternate<AF1>>>,
        buffer: heapless::Deque<u8, { crate::terminal::BUFFER_SIZE }>,
        oversampling: Oversampling,
        storage: Storage<100>,
    }

    #[local]
    struct Local {
        barometer: SensorBarometer,
        tx: Sender<'static, Reading, 1>,
        watch_rx: Receiver<'static, Sample, 1>,
    }

    #[init]
    fn init(mut cx: init::Context) -> (Shared, Local) {
        // Set system clock to 24 MHz
        let mut rcc = cx
            .device
            .RCC
            .configure()
            .hsi48()
            .sysclk(24.mhz())
            .pclk(24.mhz())
            .hclk(24.mhz())
            .freeze(&mut cx.device.FLASH);

        trace!("sysclk: {}", rcc.clocks.sysclk().0);
        trace!("hclk: {}", rcc.clocks.hclk().0);
        trace!("pclk: {}", rcc.clocks.pclk().0);

        // Enable tim2 monotonic
        let token = rtic_monotonics::create_stm32_tim2_monotonic_token!();
        Mono::start(24_000_000, token);

        // Setup GPIO
        let gpioa = cx.device.GPIOA.split(&mut rcc);
        let gpiob = cx.device.GPIOB.split(&mut rcc);
        let pb3 = gpiob.pb3.into_push_pull_output(&cx.cs);

        let _ = blinky::spawn(pb3.downgrade());
        let _ = watchdog::spawn(cx.device.IWDG);

        // Setup USART & USART interrupt
        let mut usart = Serial::usart2(
            cx.device.USART2,
            (
                gpioa.pa2.into_alternate_af1(&cx.cs),
                gpioa.pa15.into_alternate_af1(&cx.cs),
            ),
            115_200.bps(),
            &mut rcc,
        );
        usart.listen(SerialEvent::Rxne);
        rtic::pend(Interrupt::USART2);

        // Setup BMP180 on I2C1. Completion events flow from the transport
        // back into the driver's bounded waits.
        let (event_tx, event_rx) = make_channel!(Event, EVENT_CAPACITY);
        let scl = gpiob.pb6.into_alternate_af1(&cx.cs);
        let sda = gpiob.pb7.into_alternate_af1(&cx.cs);
        let i2c = I2c::i2c1(cx.device.I2C1, (scl, sda), 100.khz(), &mut rcc);
        let transport = BlockingI2c::new(i2c, bmp180::ADDRESS, CompletionNotifier::new(event_tx));
        let barometer = Bmp180Barometer::new(Bmp180::new(Bus::new(transport, event_rx)));

        // Setup channels
        let (tx, rx) = make_channel!(Reading, 1);
        let (watch_tx, watch_rx) = make_channel!(Sample, 1);

        // Setup Storage
        let storage = Storage::new();

        // Launch tasks
        let _ = sampler::spawn();
        let _ = storage::spawn(rx, watch_tx);

        (
            Shared {
                usart,
                buffer: heapless::Deque::new(),
                oversampling: Oversampling::Standard,
                storage,
            },
            Local {
                barometer,
                tx,
                watch_rx,
            },
        )
    }

    #[idle]
    fn idle(_: idle::Context) -> ! {
        rtic::pend(Interrupt::USART2);

        loop {
            cortex_m::asm::wfi();
        }
    }

    #[task(priority = 1)]
    async fn blinky(_: blinky::Context, mut pin: Pin<Output<PushPull>>) {
        unwrap!(pin.set_low());
        let mut now = Mono::now();
        loop {
            unwrap!(pin.toggle());
            now += 500.millis();
            Mono::delay_until(now).await;
        }
    }

    #[task(priority = 1)]
    async fn watchdog(_: watchdog::Context, wdg: IWDG) {
        let mut wdg = Watchdog::new(wdg);
        wdg.start(1.hz());

        loop {
            wdg.feed();
            Mono::delay(100.millis()).await;
        }
    }

    #[task(priority = 2, local = [barometer, tx], shared = [oversampling])]
    async fn sampler(cx: sampler::Context) {
        crate::sampler::sampler(cx).await;
    }

    #[task(priority = 1, shared = [storage])]
    async fn storage(
        mut cx: storage::Context,
        mut rx: Receiver<'static, Reading, 1>,
        mut watch_tx: Sender<'static, Sample, 1>,
    ) {
        loop {
            let reading = match rx.recv().await {
                Ok(reading) => reading,
                Err(ReceiveError::Empty) => continue,
                Err(ReceiveError::NoSender) => unreachable!("Sender dropped"),
            };

            let sample = cx.shared.storage.lock(|storage| storage.write(reading));

            // Watchers may not be listening
            let _ = watch_tx.try_send(sample);
        }
    }

    #[task(priority = 2, shared = [usart, buffer, oversampling, storage], local = [watch_rx])]
    async fn terminal(cx: terminal::Context) {
        crate::terminal::terminal(cx).await;
    }

    #[task(binds = USART2, local = [times: u32 = 0], shared = [usart, buffer])]
    fn usart2(cx: usart2::Context) {
        *cx.local.times += 1;

        // Read & echo all available bytes from the usart
        (cx.shared.usart, cx.shared.buffer).lock(|usart, buffer| loop {
            match usart.read() {
                Ok(b) => {
                    // Echo back
                    if is_newline(b) {
                        let _ = nb::block!(usart.write(b'\r'));
                        let _ = nb::block!(usart.write(b'\n'));
                    } else {
                        let _ = nb::block!(usart.write(b));
                    }

                    // Append to buffer
                    if buffer.push_back(b).is_err() {
                        panic!("Buffer overflow");
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(serial::Error::Framing)) => {
                    panic!("USART error: Framing");
                }
                Err(nb::Error::Other(serial::Error::Noise)) => panic!("USART error: Noise"),
                Err(nb::Error::Other(serial::Error::Overrun)) => {
                    panic!("USART error: Overrun");
                }
                Err(nb::Error::Other(serial::Error::Parity)) => {
                    panic!("USART error: Parity");
                }

                Err(nb::Error::Other(_)) => defmt::panic!("USART error: Unknown"),
            }
        });

        defmt::trace!("USART2 interrupt fired: {}", *cx.local.times);

        // Trigger terminal task to handle input
        let _ = terminal::spawn();
    }

    timestamp!("{=u64:us}", {
        Mono::now().duration_since_epoch().to_micros()
    });
}
