//! Client Characteristic Configuration Descriptor decoding

/// Value written by a peer to a CCCD.
///
/// The descriptor is a 16-bit little-endian bit field; bit 0 enables
/// notifications and bit 1 enables indications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cccd(u16);

impl Cccd {
    const NOTIFY: u16 = 0x0001;
    const INDICATE: u16 = 0x0002;

    /// Decode a CCCD write payload.
    ///
    /// Returns `None` unless the payload is exactly two bytes long.
    pub fn from_write(data: &[u8]) -> Option<Self> {
        match data {
            [lo, hi] => Some(Self(u16::from_le_bytes([*lo, *hi]))),
            _ => None,
        }
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    /// Notification-enable bit
    pub fn notify(&self) -> bool {
        self.0 & Self::NOTIFY != 0
    }

    /// Indication-enable bit
    pub fn indicate(&self) -> bool {
        self.0 & Self::INDICATE != 0
    }
}
