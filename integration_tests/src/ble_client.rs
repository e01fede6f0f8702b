//! BLE client for the custom service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

/// Custom service UUIDs (must match firmware)
const CUSTOM_SERVICE_UUID: Uuid = Uuid::from_u128(0xf3641400_b000_4042_ba50_05ca45bf8abc);
const CUSTOM_VALUE_UUID: Uuid = Uuid::from_u128(0xf3641401_b000_4042_ba50_05ca45bf8abc);

/// BLE client for the custom value characteristic.
pub struct BleClient {
    peripheral: Peripheral,
    value_char: Characteristic,
    /// Notifications received, oldest first
    notifications: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BleClient {
    /// Scan for a device by name and connect.
    pub async fn connect_by_name(name: &str, scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        adapter.start_scan(ScanFilter::default()).await?;
        let peripheral = Self::find_device_by_name(&adapter, name, scan_timeout).await?;
        adapter.stop_scan().await?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        if !peripheral
            .services()
            .iter()
            .any(|s| s.uuid == CUSTOM_SERVICE_UUID)
        {
            return Err(anyhow!("Custom service not found"));
        }

        let value_char = peripheral
            .characteristics()
            .iter()
            .find(|c| c.uuid == CUSTOM_VALUE_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("Custom value characteristic not found"))?;

        let notifications = Arc::new(Mutex::new(Vec::new()));

        // Collect notifications in the background
        let buffer_clone = notifications.clone();
        let peripheral_clone = peripheral.clone();
        tokio::spawn(async move {
            let mut stream = match peripheral_clone.notifications().await {
                Ok(s) => s,
                Err(_) => return,
            };

            while let Some(data) = stream.next().await {
                if data.uuid == CUSTOM_VALUE_UUID {
                    buffer_clone.lock().await.push(data.value);
                }
            }
        });

        Ok(Self {
            peripheral,
            value_char,
            notifications,
        })
    }

    /// Find a device by name within the scan timeout.
    async fn find_device_by_name(
        adapter: &Adapter,
        name: &str,
        scan_timeout: Duration,
    ) -> Result<Peripheral> {
        let start = std::time::Instant::now();

        while start.elapsed() < scan_timeout {
            let peripherals = adapter.peripherals().await?;

            for peripheral in peripherals {
                if let Some(props) = peripheral.properties().await? {
                    if props.local_name.as_deref() == Some(name) {
                        return Ok(peripheral);
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("Device '{}' not found within timeout", name))
    }

    /// Read the custom value.
    pub async fn read_value(&self) -> Result<Vec<u8>> {
        Ok(self.peripheral.read(&self.value_char).await?)
    }

    /// Write the custom value and wait for the write response.
    pub async fn write_value(&self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.value_char, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    /// Enable notifications on the custom value.
    pub async fn subscribe(&self) -> Result<()> {
        self.peripheral.subscribe(&self.value_char).await?;
        Ok(())
    }

    /// Disable notifications on the custom value.
    pub async fn unsubscribe(&self) -> Result<()> {
        self.peripheral.unsubscribe(&self.value_char).await?;
        Ok(())
    }

    /// Wait for the next notification.
    pub async fn wait_for_notification(&self, wait: Duration) -> Result<Vec<u8>> {
        let result = timeout(wait, async {
            loop {
                {
                    let mut buf = self.notifications.lock().await;
                    if !buf.is_empty() {
                        return buf.remove(0);
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        result.map_err(|_| anyhow!("Timeout waiting for notification"))
    }

    /// Discard any notifications received so far.
    pub async fn clear_notifications(&self) {
        self.notifications.lock().await.clear();
    }

    /// Disconnect from the device.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
