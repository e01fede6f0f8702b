//! Stack-delivered events and the service events raised to the application

use super::connection::ConnHandle;

/// Authorization request held by the stack until the application replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeRequest<'a> {
    /// Deferred read of `handle`
    Read { handle: u16, offset: u16 },
    /// Deferred write of `data` to `handle`
    Write {
        handle: u16,
        offset: u16,
        data: &'a [u8],
    },
}

/// Event delivered by the BLE stack
///
/// Payloads borrow from the stack's event buffer and are only valid for
/// the duration of the dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEvent<'a> {
    /// A peer connected
    Connected { conn_handle: ConnHandle },
    /// The link went down
    Disconnected { conn_handle: ConnHandle, reason: u8 },
    /// A write was committed to the attribute table
    Write {
        conn_handle: ConnHandle,
        handle: u16,
        data: &'a [u8],
    },
    /// A deferred read or write needs an answer before the call returns
    AuthorizeRequest {
        conn_handle: ConnHandle,
        request: AuthorizeRequest<'a>,
    },
    /// Notifications were transmitted
    HvnTxComplete { conn_handle: ConnHandle, count: u8 },
    /// Persistent system attributes are missing for the peer
    SysAttrMissing { conn_handle: ConnHandle },
    /// An ATT transaction timed out
    Timeout { conn_handle: ConnHandle },
}

/// Event raised by the custom service to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvent {
    Connected,
    Disconnected,
    NotificationEnabled,
    NotificationDisabled,
}
