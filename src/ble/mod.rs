//! Bluetooth Low Energy module
//!
//! Provides the custom GATT service: registration with the stack, stack
//! event translation, deferred-write authorization and value notification.

pub mod authorize;
pub mod cccd;
pub mod connection;
pub mod event;
pub mod service;
pub mod stack;

pub use connection::ConnHandle;
pub use event::{AuthorizeRequest, ServiceEvent, StackEvent};
pub use service::{on_stack_event, CustomService, RegistrationError, ServiceInit, UpdateError};
pub use stack::{GattStack, StackError};
