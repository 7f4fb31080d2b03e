#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use alloc::vec::Vec;

use canopy::config::{InternetConfig, NodeConfig, ScheduleConfig};
use canopy::http::Endpoint;
use canopy::indicator::StatusLed;
use canopy::lifecycle::{Board, PowerControl, run_cycle};
use canopy::sensors::SensorChannel;
use canopy::storage::ReadoutLog;
use embassy_executor::Spawner;
use embassy_net::{Runner, StackResources};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::rng::Rng;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::WifiDevice;
use log::{error, info};
use static_cell::StaticCell;

use canopy_firmware::async_i2c_bus::{I2cDevice, SharedI2c};
use canopy_firmware::power::DeepSleep;
use canopy_firmware::rtc::{RtcClock, RtcRetained, wakeup};
use canopy_firmware::sd_card::SdMedium;
use canopy_firmware::sensors::NodeSensor;
#[cfg(feature = "sensor-bh1750")]
use canopy_firmware::sensors::Bh1750Channel;
#[cfg(feature = "sensor-sht40")]
use canopy_firmware::sensors::{Sht40Channel, Sht40Quantity};
use canopy_firmware::wifi::{HttpUploader, WifiLink};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

type SensorBus = I2c<'static, esp_hal::Async>;

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

fn node_config() -> NodeConfig<'static> {
    NodeConfig {
        device_id: env!("DEVICE_ID"),
        collector_url: env!("COLLECTOR_URL"),
        internet: InternetConfig {
            ssid: env!("WIFI_SSID"),
            password: env!("WIFI_PASSWORD"),
        },
        schedule: ScheduleConfig {
            // GPIO0 is the boot button and an RTC GPIO on the S3.
            ext_wake_pin: Some(0),
            ..ScheduleConfig::default()
        },
        // Checked by build.rs
        utc_offset_secs: env!("UTC_OFFSET_SECS").parse().unwrap_or_default(),
        ..NodeConfig::default()
    }
}

fn sensor_channels(
    bus: &'static SharedI2c<SensorBus>,
) -> Vec<SensorChannel<NodeSensor<I2cDevice<'static, SensorBus>>>> {
    let mut channels = Vec::new();

    #[cfg(feature = "sensor-sht40")]
    {
        channels.extend(
            [
                ("TMP", Sht40Quantity::Temperature),
                ("HUM", Sht40Quantity::Humidity),
            ]
            .into_iter()
            .filter_map(|(code, quantity)| {
                let sensor = NodeSensor::Sht40(Sht40Channel::new(I2cDevice::new(bus), quantity));
                SensorChannel::new(code, 1, sensor)
                    .inspect_err(|e| error!("Channel {} rejected: {}", code, e))
                    .ok()
            }),
        );
    }

    #[cfg(feature = "sensor-bh1750")]
    {
        let sensor = NodeSensor::Bh1750(Bh1750Channel::new(I2cDevice::new(bus)));
        match SensorChannel::new("LUM", 3, sensor) {
            Ok(channel) => channels.push(channel),
            Err(e) => error!("Channel LUM rejected: {}", e),
        }
    }

    #[cfg(not(any(feature = "sensor-sht40", feature = "sensor-bh1750")))]
    let _ = bus;

    channels
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let cause = wakeup();
    info!("Woke up: {:?}", cause);

    let node_config = node_config();
    // A bad collector URL only disables sync; the node keeps sampling.
    if let Err(e) = node_config.validate() {
        error!("Invalid node configuration: {}", e);
    }
    let endpoint = Endpoint::parse(node_config.collector_url).ok();

    static RTC: StaticCell<Rtc<'static>> = StaticCell::new();
    let clock = RtcClock::new(RTC.init(Rtc::new(peripherals.LPWR)));

    // Sensors on I2C0
    let i2c0 = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .expect("Failed to configure I2C0")
    .with_sda(peripherals.GPIO8)
    .with_scl(peripherals.GPIO9)
    .into_async();
    static I2C0_BUS: StaticCell<SharedI2c<SensorBus>> = StaticCell::new();
    let i2c0_bus: &'static SharedI2c<SensorBus> = I2C0_BUS.init(SharedI2c::new(i2c0));

    // SD card on SPI2
    let spi_bus = Spi::new(
        peripherals.SPI2,
        SpiConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .expect("Failed to configure SPI2")
    .with_sck(peripherals.GPIO12)
    .with_mosi(peripherals.GPIO11)
    .with_miso(peripherals.GPIO13);
    let sd_cs = Output::new(peripherals.GPIO10, Level::High, OutputConfig::default());
    let sd_spi = ExclusiveDevice::new(spi_bus, sd_cs, esp_hal::delay::Delay::new())
        .expect("Failed to set up SD card chip select");
    let sd_card = embedded_sdmmc::SdCard::new(sd_spi, esp_hal::delay::Delay::new());

    // WiFi
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize radio"));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(&*radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).ok();

    let led = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());

    let mut board = Board {
        channels: sensor_channels(i2c0_bus),
        log: ReadoutLog::new(SdMedium::new(sd_card)),
        network: WifiLink::new(wifi_controller, stack, node_config.internet.clone(), clock),
        uploader: HttpUploader::new(stack),
        clock,
        // SAFETY: the only accessor of the retained image in this program.
        retained: unsafe { RtcRetained::take() },
        delay: embassy_time::Delay,
        led: StatusLed::new(led, embassy_time::Delay),
    };
    let mut power = DeepSleep::new(peripherals.GPIO0);

    let report = run_cycle(cause, &node_config, endpoint.as_ref(), &mut board, &mut power).await;
    info!(
        "Cycle {}: {} fault(s)",
        report.state.boot_count,
        report.faults.len()
    );

    power.deep_sleep()
}
