#![no_std]
#![no_main]

mod ambient_sensor;
mod clock;
mod fmt;
mod relays;

// Core libraries
use core::sync::atomic::{AtomicBool, Ordering};

// External libraries
use arrayvec::ArrayVec;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};
use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_stm32::adc::Adc;
use embassy_stm32::{bind_interrupts, exti::ExtiInput, peripherals};
use embassy_stm32::{gpio::{Level, Output, Pull, Speed}, i2c::{ErrorInterruptHandler, EventInterruptHandler, I2c}, rtc::{Rtc, RtcConfig}, time::Hertz, Config};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_time::{Duration, Ticker, Timer};
#[cfg(not(feature = "defmt"))]
use panic_halt as _;

// Internal modules, both this crate and the business logic crate.
use business_logic::config::CONTROL_PERIOD_MS;
use business_logic::{ChillerPlant, PlantEvent, UnitKind};
use ambient_sensor::{AMBIENT_ADDRESS, AmbientSensor};
use clock::PlantClock;
use fmt::{error, info, unwrap, warn};
use relays::RelayBank;

/// Inputs from the other tasks, applied between control cycles.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum PlantCommand {
    Demand(f32),
    Ambient(f32),
    EmergencyStop,
    Rearm,
}

type CommandSender = Sender<'static, ThreadModeRawMutex, PlantCommand, 8>;

static COMMANDS: Channel<ThreadModeRawMutex, PlantCommand, 8> = Channel::new();
/// Mirrors the plant's E-stop latch for the status LED.
static LATCHED: AtomicBool = AtomicBool::new(false);

/// Cycles between status reports.
const STATUS_EVERY: u32 = 100;
/// Holding the button this long while latched re-arms the plant.
const REARM_HOLD: Duration = Duration::from_secs(3);
const DEBOUNCE: Duration = Duration::from_millis(50);
const ADC_FULL_SCALE: f32 = 4095.0;

#[embassy_executor::main]
async fn main(spawner: Spawner) {

    // Chip peripheral configuration
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        use embassy_stm32::rcc::mux::{Adcsel, I2c1sel};

        config.rcc.msi = Some(MSIRange::RANGE4M);

        // 48 MHz system clock from the MSI through PLL1.
        config.rcc.pll = Some(Pll {
            source: PllSource::MSI,
            prediv: PllPreDiv::DIV1,
            mul: PllMul::MUL24,
            divp: None,
            divq: Some(PllQDiv::DIV2),
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV1;
        config.rcc.apb2_pre = APBPrescaler::DIV1;

        // The RTC runs from the LSE so plant uptime survives resets.
        config.rcc.ls = LsConfig {
            rtc: RtcClockSource::LSE,
            lsi: false,
            lse: Some(LseConfig { frequency: Hertz(32768), mode: LseMode::Oscillator(LseDrive::Low) }),
        };
        config.rcc.mux.adcsel = Adcsel::SYS;
        config.rcc.mux.i2c1sel = I2c1sel::PCLK1;
    }
    let p = embassy_stm32::init(config);

    // Contactors first, so nothing is energized while the rest comes up.
    let mut relays = RelayBank::new(
        [
            Output::new(p.PC0, Level::Low, Speed::Low),
            Output::new(p.PC1, Level::Low, Speed::Low),
            Output::new(p.PC2, Level::Low, Speed::Low),
            Output::new(p.PC3, Level::Low, Speed::Low),
            Output::new(p.PC4, Level::Low, Speed::Low),
            Output::new(p.PC5, Level::Low, Speed::Low),
            Output::new(p.PC6, Level::Low, Speed::Low),
            Output::new(p.PC7, Level::Low, Speed::Low),
        ],
        [
            Output::new(p.PB12, Level::Low, Speed::Low),
            Output::new(p.PB13, Level::Low, Speed::Low),
            Output::new(p.PB14, Level::Low, Speed::Low),
            Output::new(p.PB15, Level::Low, Speed::Low),
        ],
    );
    relays.all_off();

    let led = Output::new(p.PB0, Level::High, Speed::Low);
    let estop = ExtiInput::new(p.PB5, p.EXTI5, Pull::Up);
    let sensor_enable_bar = Output::new(p.PA15, Level::High, Speed::Low);

    let mut rtc = Rtc::new(p.RTC, RtcConfig::default());
    rtc.set_daylight_savings(false);
    let clock = unwrap!(PlantClock::start(rtc));

    bind_interrupts!(struct Irqs {
        I2C1_EV => EventInterruptHandler<peripherals::I2C1>;
        I2C1_ER => ErrorInterruptHandler<peripherals::I2C1>;
    });
    let i2c = I2c::new(
        p.I2C1,
        p.PB6,
        p.PB7,
        Irqs,
        p.DMA1_CH6,
        p.DMA1_CH7,
        Hertz(400_000),
        Default::default(),
    );
    let ambient = AmbientSensor::new(i2c, AMBIENT_ADDRESS, sensor_enable_bar);
    let adc = Adc::new(p.ADC1);

    unwrap!(spawner.spawn(estop_button(estop, COMMANDS.sender())));
    unwrap!(spawner.spawn(status_led(led)));
    unwrap!(spawner.spawn(ambient_temperature(ambient, COMMANDS.sender())));
    unwrap!(spawner.spawn(demand_input(adc, p.PA0, COMMANDS.sender())));

    let mut plant = ChillerPlant::new(clock.now());
    let mut ticker = Ticker::every(Duration::from_millis(CONTROL_PERIOD_MS));
    let mut cycles: u32 = 0;
    info!("control loop running every {} ms", CONTROL_PERIOD_MS);

    loop {
        let mut events: ArrayVec<PlantEvent, 8> = ArrayVec::new();
        match select(ticker.next(), COMMANDS.receive()).await {
            Either::First(()) => {
                if let Err(err) = plant.tick(clock.now(), &mut relays, &mut events) {
                    warn!("control cycle skipped: {:?}", err);
                }
                cycles = cycles.wrapping_add(1);
                if cycles % STATUS_EVERY == 0 {
                    let status = plant.status();
                    info!(
                        "demand {}%, compressors {}/{} {:?}, condensers {}/{} {:?}",
                        status.demand_percent,
                        status.compressors.running,
                        status.compressors.target,
                        status.compressors.state,
                        status.condensers.running,
                        status.condensers.target,
                        status.condensers.state,
                    );
                }
            }
            Either::Second(command) => apply(&mut plant, command, &clock, &mut relays, &mut events),
        }
        LATCHED.store(plant.is_emergency_stopped(), Ordering::Relaxed);

        for event in events {
            match event {
                PlantEvent::EmergencyStopActivated | PlantEvent::UnitFaulted { .. } => error!("{:?}", event),
                _ => warn!("{:?}", event),
            }
        }
    }
}

fn apply(
    plant: &mut ChillerPlant,
    command: PlantCommand,
    clock: &PlantClock,
    relays: &mut RelayBank,
    events: &mut ArrayVec<PlantEvent, 8>,
) {
    match command {
        PlantCommand::Demand(percent) => plant.set_demand_percent(percent),
        PlantCommand::Ambient(celsius) => {
            if let Err(err) = plant.set_ambient_temperature(celsius) {
                warn!("ambient reading {} rejected: {:?}", celsius, err);
            }
        }
        PlantCommand::EmergencyStop => plant.emergency_stop(clock.now(), relays, events),
        PlantCommand::Rearm => {
            plant.rearm();
            info!(
                "re-armed with {} compressors available",
                plant.pool().available_count(UnitKind::Compressor)
            );
        }
    }
}

/// A press trips the emergency stop. Holding it while latched re-arms.
#[embassy_executor::task]
async fn estop_button(mut button: ExtiInput<'static>, commands: CommandSender) {
    loop {
        button.wait_for_falling_edge().await;
        if !LATCHED.load(Ordering::Relaxed) {
            warn!("emergency stop pressed");
            commands.send(PlantCommand::EmergencyStop).await;
        } else if let Either::Second(()) = select(button.wait_for_rising_edge(), Timer::after(REARM_HOLD)).await {
            info!("re-arm requested");
            commands.send(PlantCommand::Rearm).await;
        }
        Timer::after(DEBOUNCE).await;
        if button.is_low() {
            button.wait_for_rising_edge().await;
        }
        Timer::after(DEBOUNCE).await;
    }
}

/// Slow blink while running, fast blink while the E-stop is latched.
#[embassy_executor::task]
async fn status_led(mut led: Output<'static>) {
    loop {
        let half_period = if LATCHED.load(Ordering::Relaxed) {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(500)
        };
        led.toggle();
        Timer::after(half_period).await;
    }
}

#[embassy_executor::task]
async fn ambient_temperature(
    mut sensor: AmbientSensor<I2c<'static, embassy_stm32::mode::Async>>,
    commands: CommandSender,
) {
    let mut ticker = Ticker::every(Duration::from_secs(10));
    loop {
        if let Some(celsius) = sensor.read_celsius().await {
            commands.send(PlantCommand::Ambient(celsius)).await;
        }
        ticker.next().await;
    }
}

/// 0-10 V building load signal, scaled to 0-3.3 V at the pin.
#[embassy_executor::task]
async fn demand_input(mut adc: Adc<'static, peripherals::ADC1>, mut pin: peripherals::PA0, commands: CommandSender) {
    let mut ticker = Ticker::every(Duration::from_secs(1));
    loop {
        let raw = adc.blocking_read(&mut pin);
        commands.send(PlantCommand::Demand(f32::from(raw) / ADC_FULL_SCALE * 100.0)).await;
        ticker.next().await;
    }
}
