//! LED task for non-blocking board indication
//!
//! Drives the board LED from the custom service's indications without
//! blocking the BLE event path.

use custom_service_firmware::config::led;
use custom_service_firmware::indicator::{Indication, Indicator};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver};
use esp_hal::gpio::Output;

/// LED state change requested by an indication
#[derive(Clone, Copy)]
pub enum LedCommand {
    /// Blink for the given number of milliseconds, then restore the steady state
    Flash(u64),
    /// Set the steady state (true = lit)
    Steady(bool),
}

/// Type alias for the LED channel receiver
pub type LedReceiver = Receiver<'static, CriticalSectionRawMutex, LedCommand, 4>;

/// Channel for LED commands
pub static LED_CHANNEL: Channel<CriticalSectionRawMutex, LedCommand, 4> = Channel::new();

/// Indicator backed by the LED task
///
/// Commands are dropped when the channel is full.
#[derive(Clone, Copy, Default)]
pub struct LedIndicator;

impl Indicator for LedIndicator {
    fn indicate(&mut self, indication: Indication) {
        let command = match indication {
            Indication::DataReceived => LedCommand::Flash(led::RCV_FLASH_MS),
            Indication::Connected => LedCommand::Steady(true),
            Indication::Idle => LedCommand::Steady(false),
        };
        let _ = LED_CHANNEL.try_send(command);
    }
}

/// Task that applies LED commands (the LED is active low)
pub async fn led_task(mut led: Output<'static>, receiver: LedReceiver) {
    led.set_high();

    loop {
        match receiver.receive().await {
            LedCommand::Flash(duration_ms) => {
                // Invert briefly so the flash is visible in either steady state
                led.toggle();
                embassy_time::Timer::after(embassy_time::Duration::from_millis(duration_ms)).await;
                led.toggle();
            }
            LedCommand::Steady(on) => {
                if on {
                    led.set_low();
                } else {
                    led.set_high();
                }
            }
        }
    }
}
