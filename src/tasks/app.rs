//! Application side of the custom service
//!
//! Owns the registered service instance, reacts to its events and pushes a
//! counter value while the peer has notifications enabled.

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use custom_service_firmware::ble::{CustomService, ServiceEvent, ServiceInit, UpdateError};
use custom_service_firmware::config::gap;
use custom_service_firmware::indicator::{Indication, Indicator};

use super::ble::{Server, TroubleStack};
use super::led::LedIndicator;

/// The registered custom service, shared by the BLE task and the app task
pub static SERVICE: Mutex<CriticalSectionRawMutex, RefCell<Option<CustomService>>> =
    Mutex::new(RefCell::new(None));

/// Latest notification-enabled state reported by the peer
static NOTIFY_STATE: Signal<CriticalSectionRawMutex, bool> = Signal::new();

/// Service event handler
///
/// Called with the service mutex held; it must not lock [`SERVICE`].
fn on_service_event(_service: &CustomService, event: ServiceEvent) {
    match event {
        ServiceEvent::Connected => {
            LedIndicator.indicate(Indication::Connected);
        }
        ServiceEvent::Disconnected => {
            LedIndicator.indicate(Indication::Idle);
            NOTIFY_STATE.signal(false);
        }
        ServiceEvent::NotificationEnabled => {
            log::info!("notifications enabled");
            NOTIFY_STATE.signal(true);
        }
        ServiceEvent::NotificationDisabled => {
            log::info!("notifications disabled");
            NOTIFY_STATE.signal(false);
        }
    }
}

fn on_data_received(data: &[u8]) {
    log::info!("value received: {:02x?}", data);
}

/// Register the custom service and publish it in [`SERVICE`]
pub fn register_service(server: &'static Server<'static>) -> Result<(), custom_service_firmware::ble::RegistrationError> {
    let init = ServiceInit {
        evt_handler: Some(on_service_event),
        data_handler: Some(on_data_received),
    };
    let service = CustomService::init(&mut TroubleStack::new(server), &init)?;

    SERVICE.lock(|cell| {
        cell.replace(Some(service));
    });
    Ok(())
}

/// Push one counter value through the service
fn push_value(server: &'static Server<'static>, value: u8) {
    let result = SERVICE.lock(|cell| match cell.borrow().as_ref() {
        Some(service) => service.custom_value_update(&mut TroubleStack::new(server), value),
        None => Err(UpdateError::NotConnected),
    });

    match result {
        Ok(()) => log::debug!("notified {:#04x}", value),
        Err(UpdateError::NotConnected) => log::debug!("stored {:#04x}, no peer", value),
        Err(e) => log::warn!("value update failed: {:?}", e),
    }
}

/// Task that updates the custom value periodically while notifications are on
pub async fn app_task(server: &'static Server<'static>) {
    let mut counter: u8 = 0;
    let mut enabled = false;

    loop {
        if !enabled {
            enabled = NOTIFY_STATE.wait().await;
            continue;
        }

        match select(
            NOTIFY_STATE.wait(),
            Timer::after(Duration::from_millis(gap::NOTIFY_PERIOD_MS)),
        )
        .await
        {
            Either::First(state) => enabled = state,
            Either::Second(_) => {
                counter = counter.wrapping_add(1);
                push_value(server, counter);
            }
        }
    }
}
