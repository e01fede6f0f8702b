//! Board indication interface
//!
//! The custom service reports activity through this trait so the firmware
//! can drive the board LED without the service knowing about GPIO.

/// Activity worth showing on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indication {
    /// A write to the value characteristic was received
    DataReceived,
    /// A peer connected
    Connected,
    /// No peer connected
    Idle,
}

/// Fire-and-forget indication sink
pub trait Indicator {
    fn indicate(&mut self, indication: Indication);
}

/// Indicator that drops every indication
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn indicate(&mut self, _indication: Indication) {}
}
