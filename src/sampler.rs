//! Periodic barometer sampling task

use defmt::*;
use rtic::Mutex;
use rtic_monotonics::{
    stm32::{Tim2 as Mono, *},
    Monotonic,
};
use stm32f0xx_hal::i2c::Error as I2cError;

use rtic_altimeter::{barometer::Barometer, bus::Error};

/// Seconds between measurements
const SAMPLE_PERIOD: u64 = 2;

#[cfg_attr(feature = "sizing", inline(never))]
pub async fn sampler(mut cx: crate::app::sampler::Context<'_>) {
    // Readings are meaningless until the factory calibration is loaded
    while let Err(e) = cx.local.barometer.init().await {
        error!("barometer init failed: {=str}", e.as_str());
        Mono::delay(SAMPLE_PERIOD.secs()).await;
    }
    info!("barometer calibration loaded");

    let mut now = Mono::now();
    loop {
        trace!("sampler");

        match sample(&mut cx).await {
            Ok(()) => {}
            Err(e) => error!("sample failed: {=str}", e.as_str()),
        }

        now += SAMPLE_PERIOD.secs();
        Mono::delay_until(now).await;
    }
}

async fn sample(cx: &mut crate::app::sampler::Context<'_>) -> Result<(), Error<I2cError>> {
    let oversampling = cx.shared.oversampling.lock(|oss| *oss);
    cx.local.barometer.set_oversampling(oversampling);

    let reading = cx.local.barometer.read().await?;

    debug!(
        "temperature: {=f32} C, pressure: {=f32} Pa",
        reading.temperature, reading.pressure
    );

    // Drop the reading if storage has fallen behind
    let _ = cx.local.tx.try_send(reading);

    Ok(())
}
