//! Deferred write authorization
//!
//! With deferred writes enabled, the stack holds every peer write to the
//! value characteristic and asks for approval. The reply must be submitted
//! before the event handler returns; there is no later point at which the
//! stack will accept it.

use super::connection::ConnHandle;
use super::stack::{AuthorizeReply, AuthorizeType, GattStack, GattStatus};
use crate::config::characteristic::AUTH_REPLY_LEN;

/// Build the approval for a write of `value`.
///
/// The reply declares a length of [`AUTH_REPLY_LEN`] while carrying a single
/// byte of data. Stacks that honour `len` over the slice will read past the
/// tentative value; callers keep this behaviour for compatibility with
/// deployed centrals.
pub fn write_reply(value: &u8) -> AuthorizeReply<'_> {
    AuthorizeReply {
        kind: AuthorizeType::Write,
        gatt_status: GattStatus::Success,
        write_update: true,
        read_update: true,
        offset: 0,
        len: AUTH_REPLY_LEN,
        data: core::slice::from_ref(value),
    }
}

/// Approve a deferred write and return the approved value.
///
/// Only the first byte of `data` is taken; an empty write approves `0x00`.
///
/// # Panics
///
/// Panics if the stack refuses the reply. The peer's transaction cannot be
/// answered a second time, so there is nothing left to recover.
pub fn approve_write<S: GattStack>(stack: &mut S, conn: ConnHandle, data: &[u8]) -> u8 {
    let value = data.first().copied().unwrap_or(0);
    let reply = write_reply(&value);

    log::debug!("authorizing write of {:#04x} on conn {}", value, conn.raw());
    if let Err(e) = stack.reply_authorization(conn, &reply) {
        panic!("write authorization reply failed: {:?}", e);
    }
    value
}
