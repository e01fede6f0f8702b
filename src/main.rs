#![no_std]
#![no_main]

extern crate alloc;

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;
use trouble_host::prelude::{appearance, GapConfig, PeripheralConfig};

mod tasks;

use tasks::{app_task, ble_task, format_device_name, led_task, register_service, Server, LED_CHANNEL};

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

/// Static cell for esp-radio controller (needed for 'static lifetime)
static RADIO_CONTROLLER: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

/// Advertised device name, shared by GAP and the advertiser
static DEVICE_NAME: StaticCell<[u8; 20]> = StaticCell::new();

/// GATT server holding the custom service attribute table
static SERVER: StaticCell<Server<'static>> = StaticCell::new();

/// Type alias for the BLE controller
type BleController = trouble_host::prelude::ExternalController<
    esp_radio::ble::controller::BleConnector<'static>,
    10,
>;

#[esp_hal::main]
fn main() -> ! {
    // Initialise heap allocator for BLE support (64KB - BLE requires significant heap)
    esp_alloc::heap_allocator!(size: 64 * 1024);

    esp_println::logger::init_logger(log::LevelFilter::Info);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // LED off until a peer connects (active low)
    let led = Output::new(peripherals.GPIO48, Level::High, OutputConfig::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Read unique device ID from eFuse MAC address (last 3 bytes)
    let mac = esp_hal::efuse::Efuse::read_base_mac_address();
    let device_id: [u8; 3] = [mac[3], mac[4], mac[5]];

    // Initialise esp-radio for BLE support (must be after esp_rtos::start)
    let radio_controller = RADIO_CONTROLLER.init(
        esp_radio::init().expect("Failed to initialize esp-radio")
    );

    // Create BLE connector (ownership is passed to ExternalController)
    let ble_connector = esp_radio::ble::controller::BleConnector::new(
        radio_controller,
        peripherals.BT,
        esp_radio::ble::Config::default(),
    ).expect("Failed to initialize BLE connector");

    // Wrap in ExternalController for trouble-host compatibility
    let controller: BleController = trouble_host::prelude::ExternalController::new(ble_connector);

    // Generate unique device name from chip ID
    let device_name = format_device_name(DEVICE_NAME.init([0u8; 20]), &device_id);

    let server = SERVER.init(
        Server::new_with_config(GapConfig::Peripheral(PeripheralConfig {
            name: device_name,
            appearance: &appearance::UNKNOWN,
        }))
        .expect("Failed to build GATT server"),
    );

    // Registration is permanent; a failure here leaves nothing to advertise
    if let Err(e) = register_service(server) {
        panic!("custom service registration failed: {:?}", e);
    }

    // Create and run the embassy executor
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(async_main(spawner, led, controller, device_id, device_name, server));
    })
}

#[embassy_executor::task]
async fn async_main(
    spawner: Spawner,
    led: Output<'static>,
    ble_controller: BleController,
    device_id: [u8; 3],
    device_name: &'static str,
    server: &'static Server<'static>,
) {
    spawner.spawn(led_host_task(led)).unwrap();
    spawner.spawn(app_host_task(server)).unwrap();
    spawner.spawn(ble_host_task(ble_controller, device_id, device_name, server)).unwrap();
}

/// Task that drives the board LED
#[embassy_executor::task]
async fn led_host_task(led: Output<'static>) {
    led_task(led, LED_CHANNEL.receiver()).await;
}

/// Task that pushes custom value updates
#[embassy_executor::task]
async fn app_host_task(server: &'static Server<'static>) {
    app_task(server).await;
}

/// Task that manages BLE connectivity
///
/// This task handles advertising and connections, and routes stack events
/// to the custom service.
#[embassy_executor::task]
async fn ble_host_task(
    controller: BleController,
    device_id: [u8; 3],
    device_name: &'static str,
    server: &'static Server<'static>,
) {
    ble_task(controller, device_id, device_name, server).await;
}
