//! Custom service with a single notifiable value characteristic
//!
//! - Service UUID: F3641400-B000-4042-BA50-05CA45BF8ABC
//! - Value characteristic: F3641401-... (read, write, notify; 1-2 bytes)
//!
//! Writes to the value are deferred: the stack asks for authorization and
//! the service approves every write from inside the event handler.

use heapless::Vec;

use super::authorize;
use super::cccd::Cccd;
use super::connection::{ConnHandle, ConnectionState};
use super::event::{AuthorizeRequest, ServiceEvent, StackEvent};
use super::stack::{
    CharProperties, CharacteristicHandles, CharacteristicParams, GattStack, SecurityMode,
    ServiceType, StackError, Uuid,
};
use crate::config::{characteristic, uuid};
use crate::indicator::{Indication, Indicator};

/// Application handler for service events
///
/// Runs inside the stack's event delivery and must not block.
pub type EventHandler = fn(&CustomService, ServiceEvent);

/// Handler for raw bytes written to the value characteristic
pub type DataHandler = fn(&[u8]);

/// Errors during service registration
///
/// Registration consumes attribute table space permanently, so none of
/// these can be retried without restarting the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    /// Vendor UUID base could not be registered
    Uuid(StackError),
    /// Service declaration could not be added
    Service(StackError),
    /// Value characteristic could not be added
    Characteristic(StackError),
}

/// Errors from [`CustomService::custom_value_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// The value was not stored
    StoreFailed(StackError),
    /// The value was stored but the notification was not sent
    NotifyFailed(StackError),
    /// The value was stored; no peer is connected to notify
    NotConnected,
}

/// Initialisation parameters for [`CustomService::init`]
#[derive(Clone, Copy, Default)]
pub struct ServiceInit {
    pub evt_handler: Option<EventHandler>,
    pub data_handler: Option<DataHandler>,
}

/// Registered custom service instance
///
/// Owned by the application. Every stack event must be routed through
/// [`CustomService::on_stack_event`] (or [`on_stack_event`]) and every value
/// change through [`CustomService::custom_value_update`].
pub struct CustomService {
    uuid_type: u8,
    service_handle: u16,
    value_handles: CharacteristicHandles,
    connection: ConnectionState,
    evt_handler: Option<EventHandler>,
    data_handler: Option<DataHandler>,
}

/// Parameters of the custom value characteristic
fn value_char_params(uuid_type: u8) -> CharacteristicParams {
    CharacteristicParams {
        uuid: Uuid {
            uuid_type,
            uuid: uuid::VALUE_CHAR,
        },
        max_len: characteristic::MAX_LEN,
        init_len: characteristic::INIT_LEN,
        is_var_len: true,
        props: CharProperties {
            read: true,
            write: true,
            write_without_response: false,
            notify: true,
            indicate: false,
        },
        is_deferred_read: false,
        is_deferred_write: true,
        read_access: SecurityMode::Open,
        write_access: SecurityMode::Open,
        cccd_write_access: SecurityMode::Open,
    }
}

impl CustomService {
    /// Register the service and its value characteristic with the stack.
    pub fn init<S: GattStack>(stack: &mut S, init: &ServiceInit) -> Result<Self, RegistrationError> {
        let uuid_type = stack
            .allocate_uuid(&uuid::BASE)
            .map_err(RegistrationError::Uuid)?;

        let service_uuid = Uuid {
            uuid_type,
            uuid: uuid::SERVICE,
        };
        let service_handle = stack
            .add_service(ServiceType::Primary, service_uuid)
            .map_err(RegistrationError::Service)?;

        let value_handles = stack
            .add_characteristic(service_handle, &value_char_params(uuid_type))
            .map_err(RegistrationError::Characteristic)?;

        log::info!(
            "custom service registered: service {:#06x}, value {:#06x}, cccd {:#06x}",
            service_handle,
            value_handles.value_handle,
            value_handles.cccd_handle
        );

        Ok(Self {
            uuid_type,
            service_handle,
            value_handles,
            connection: ConnectionState::new(),
            evt_handler: init.evt_handler,
            data_handler: init.data_handler,
        })
    }

    pub fn uuid_type(&self) -> u8 {
        self.uuid_type
    }

    pub fn service_handle(&self) -> u16 {
        self.service_handle
    }

    pub fn value_handle(&self) -> u16 {
        self.value_handles.value_handle
    }

    pub fn cccd_handle(&self) -> u16 {
        self.value_handles.cccd_handle
    }

    /// Handle of the connected peer, or [`ConnHandle::INVALID`]
    pub fn conn_handle(&self) -> ConnHandle {
        self.connection.handle()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Handle an event from the BLE stack.
    ///
    /// Events for other services' handles are ignored. Authorization
    /// requests for the value characteristic are answered before this
    /// returns.
    pub fn on_stack_event<S: GattStack, I: Indicator>(
        &mut self,
        stack: &mut S,
        indicator: &mut I,
        event: &StackEvent<'_>,
    ) {
        match *event {
            StackEvent::Connected { conn_handle } => self.on_connect(conn_handle),
            StackEvent::Disconnected {
                conn_handle,
                reason,
            } => self.on_disconnect(conn_handle, reason),
            StackEvent::Write { handle, data, .. } => self.on_write(indicator, handle, data),
            StackEvent::AuthorizeRequest { request, .. } => self.on_authorize(stack, request),
            StackEvent::HvnTxComplete { .. }
            | StackEvent::SysAttrMissing { .. }
            | StackEvent::Timeout { .. } => {}
        }
    }

    fn raise(&self, event: ServiceEvent) {
        if let Some(handler) = self.evt_handler {
            handler(self, event);
        }
    }

    fn on_connect(&mut self, conn_handle: ConnHandle) {
        log::info!("peer {} connected", conn_handle.raw());
        self.connection.on_connected(conn_handle);
        self.raise(ServiceEvent::Connected);
    }

    fn on_disconnect(&mut self, conn_handle: ConnHandle, reason: u8) {
        log::info!("peer {} disconnected, reason {:#04x}", conn_handle.raw(), reason);
        self.connection.on_disconnected();
        self.raise(ServiceEvent::Disconnected);
    }

    fn on_write<I: Indicator>(&mut self, indicator: &mut I, handle: u16, data: &[u8]) {
        if handle == self.value_handles.value_handle {
            log::debug!("value written: {:02x?}", data);
            indicator.indicate(Indication::DataReceived);
            if let Some(data_handler) = self.data_handler {
                data_handler(data);
            }
        }

        if handle == self.value_handles.cccd_handle {
            if let Some(cccd) = Cccd::from_write(data) {
                let event = if cccd.notify() {
                    ServiceEvent::NotificationEnabled
                } else {
                    ServiceEvent::NotificationDisabled
                };
                log::debug!("cccd written: {:#06x}", cccd.raw());
                self.raise(event);
            }
        }
    }

    fn on_authorize<S: GattStack>(&mut self, stack: &mut S, request: AuthorizeRequest<'_>) {
        if let AuthorizeRequest::Write { handle, data, .. } = request {
            if handle == self.value_handles.value_handle {
                let value = authorize::approve_write(stack, self.connection.handle(), data);
                log::info!("write of {:#04x} authorized", value);
            }
        }
    }

    /// Store a new value and notify the connected peer.
    ///
    /// The value is stored first. [`UpdateError::NotConnected`] and
    /// [`UpdateError::NotifyFailed`] both leave the new value in place.
    pub fn custom_value_update<S: GattStack>(
        &self,
        stack: &mut S,
        custom_value: u8,
    ) -> Result<(), UpdateError> {
        let conn = self.connection.handle();
        let value = [custom_value];

        stack
            .set_attribute_value(conn, self.value_handles.value_handle, &value)
            .map_err(UpdateError::StoreFailed)?;

        if !conn.is_valid() {
            return Err(UpdateError::NotConnected);
        }

        stack
            .send_notification(conn, self.value_handles.value_handle, &value)
            .map_err(UpdateError::NotifyFailed)
    }

    /// Read the current value back from the attribute table
    pub fn custom_value<S: GattStack>(
        &self,
        stack: &mut S,
    ) -> Result<Vec<u8, { characteristic::MAX_LEN }>, StackError> {
        let mut buf = [0u8; characteristic::MAX_LEN];
        let len = stack.get_attribute_value(
            self.connection.handle(),
            self.value_handles.value_handle,
            &mut buf,
        )?;

        Vec::from_slice(&buf[..len]).map_err(|_| StackError::InvalidParam)
    }
}

/// Stack observer entry point.
///
/// Either argument may be missing when the stack delivers an event before
/// the service is registered; the call is then a no-op.
pub fn on_stack_event<S: GattStack, I: Indicator>(
    event: Option<&StackEvent<'_>>,
    context: Option<&mut CustomService>,
    stack: &mut S,
    indicator: &mut I,
) {
    if let (Some(event), Some(service)) = (event, context) {
        service.on_stack_event(stack, indicator, event);
    }
}
