//! Connection state tracking for the single supported link

use crate::config::connection::INVALID_HANDLE;

/// Connection handle assigned by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnHandle(pub u16);

impl ConnHandle {
    /// No peer connected
    pub const INVALID: Self = Self(INVALID_HANDLE);

    /// Returns true unless this is [`ConnHandle::INVALID`]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Raw handle value as used on the HCI boundary
    pub fn raw(self) -> u16 {
        self.0
    }
}

impl Default for ConnHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Tracks the handle of the currently connected peer.
///
/// Only one link is supported. A second connect overwrites the first
/// handle without complaint, and a disconnect always clears it, whatever
/// handle it names.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionState {
    handle: ConnHandle,
}

impl ConnectionState {
    /// Create a tracker with no peer connected
    pub fn new() -> Self {
        Self {
            handle: ConnHandle::INVALID,
        }
    }

    pub fn on_connected(&mut self, handle: ConnHandle) {
        if self.handle.is_valid() {
            log::warn!(
                "connection {} replaces existing link {}",
                handle.raw(),
                self.handle.raw()
            );
        }
        self.handle = handle;
    }

    pub fn on_disconnected(&mut self) {
        self.handle = ConnHandle::INVALID;
    }

    /// Current connection handle, or [`ConnHandle::INVALID`]
    pub fn handle(&self) -> ConnHandle {
        self.handle
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_valid()
    }
}
