//! Embassy tasks module
//!
//! Contains the async tasks for the firmware, organised by functionality.

pub mod app;
pub mod ble;
pub mod led;

pub use app::{app_task, register_service};
pub use ble::{ble_task, format_device_name, Server};
pub use led::{led_task, LED_CHANNEL};
