//! Service and board configuration constants for the ESP32-S3 custom service peripheral

/// UUIDs for the custom service
pub mod uuid {
    /// Vendor-specific 128-bit base UUID (little-endian, as stored on air)
    ///
    /// F364ADC9-B000-4042-BA50-05CA45BF8ABC
    pub const BASE: [u8; 16] = [
        0xBC, 0x8A, 0xBF, 0x45, 0xCA, 0x05, 0x50, 0xBA, 0x40, 0x42, 0xB0, 0x00, 0xC9, 0xAD, 0x64,
        0xF3,
    ];

    /// 16-bit alias of the custom service, substituted into bytes 12..14 of the base
    pub const SERVICE: u16 = 0x1400;

    /// 16-bit alias of the custom value characteristic
    pub const VALUE_CHAR: u16 = 0x1401;
}

/// Custom value characteristic layout
pub mod characteristic {
    /// Maximum value length in bytes
    pub const MAX_LEN: usize = 2;

    /// Length of the value at registration
    pub const INIT_LEN: usize = 1;

    /// Length of the authorization reply (see `ble::authorize`)
    pub const AUTH_REPLY_LEN: u16 = 2;
}

/// Connection handle constants
pub mod connection {
    /// Marker for "no peer connected"
    pub const INVALID_HANDLE: u16 = 0xFFFF;
}

/// LED pin and flash timing
pub mod led {
    pub const PIN: u8 = 48;

    /// Flash duration for the "data received" indication
    pub const RCV_FLASH_MS: u64 = 50;

    /// Flash duration for the "connected" indication
    pub const CONNECTED_FLASH_MS: u64 = 200;
}

/// GAP and application timing
pub mod gap {
    /// Device name prefix for advertising, completed with the device ID
    pub const DEVICE_NAME_PREFIX: &str = "CustomSvc-";

    /// Interval between counter notifications while notifications are enabled
    pub const NOTIFY_PERIOD_MS: u64 = 1000;

    /// Maximum number of concurrent connections
    pub const CONNECTIONS_MAX: usize = 1;

    /// Number of L2CAP channels
    pub const L2CAP_CHANNELS_MAX: usize = 3;
}
