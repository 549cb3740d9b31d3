//! Outdoor air temperature from a TMP117-class sensor on I2C.

use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Timer};

use crate::fmt::warn;

pub const AMBIENT_ADDRESS: u8 = 0x45;
const RESULT_REGISTER: u8 = 0x00;
const CONVERSION_TIME: Duration = Duration::from_millis(51);
const CELSIUS_PER_LSB: f32 = 0.0078125;

pub struct AmbientSensor<I2C> {
    i2c: I2C,
    address: u8,
    /// Active-low supply enable.
    enable_bar: Output<'static>,
}

impl<I2C> AmbientSensor<I2C> {
    pub fn new(i2c: I2C, address: u8, enable_bar: Output<'static>) -> Self {
        Self { i2c, address, enable_bar }
    }
}

impl<I2C> AmbientSensor<I2C>
where
    I2C: embedded_hal_async::i2c::I2c,
{
    /// Powers the sensor for one conversion. `None` when the bus read fails.
    pub async fn read_celsius(&mut self) -> Option<f32> {
        self.enable_bar.set_low();
        Timer::after(CONVERSION_TIME).await;
        let mut buf = [0u8; 2];
        let reading = self.i2c.write_read(self.address, &[RESULT_REGISTER], &mut buf).await;
        self.enable_bar.set_high();

        match reading {
            Ok(()) => Some(f32::from(i16::from_be_bytes(buf)) * CELSIUS_PER_LSB),
            Err(_) => {
                warn!("ambient sensor at {=u8:#x} did not respond", self.address);
                None
            }
        }
    }
}
