//! BLE task and TrouBLE stack adapter
//!
//! Runs the TrouBLE host, translates its connection events into
//! [`StackEvent`]s for the custom service and implements [`GattStack`]
//! on top of the attribute table built by the GATT macros.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use trouble_host::prelude::*;

use custom_service_firmware::ble::stack::{
    AuthorizeReply, CharacteristicHandles, CharacteristicParams, GattStatus, ServiceType, Uuid,
};
use custom_service_firmware::ble::{
    on_stack_event, AuthorizeRequest, ConnHandle, GattStack, StackError, StackEvent,
};
use custom_service_firmware::config::{characteristic, gap, uuid};

use super::app::SERVICE;
use super::led::LedIndicator;

/// Type identifier handed out for the vendor base UUID
const VENDOR_UUID_TYPE: u8 = 2;

/// Custom service as laid out in the attribute table
#[gatt_service(uuid = "f3641400-b000-4042-ba50-05ca45bf8abc")]
pub struct CustomGattService {
    /// Custom value characteristic, 1-2 bytes
    #[characteristic(uuid = "f3641401-b000-4042-ba50-05ca45bf8abc", read, write, notify)]
    pub value: Vec<u8, { characteristic::MAX_LEN }>,
}

/// BLE GATT Server with the custom service
#[gatt_server(mutex_type = CriticalSectionRawMutex)]
pub struct Server {
    pub custom: CustomGattService,
}

/// Notification queued by [`TroubleStack::send_notification`]
pub struct PendingNotification {
    conn: ConnHandle,
    value: Vec<u8, { characteristic::MAX_LEN }>,
}

/// Notifications waiting for the connection task
static NOTIFY_CHANNEL: Channel<CriticalSectionRawMutex, PendingNotification, 4> = Channel::new();

/// Authorization decision captured while a deferred write is pending
struct CapturedReply {
    approved: bool,
    update: bool,
    value: Vec<u8, { characteristic::MAX_LEN }>,
}

/// [`GattStack`] over the TrouBLE attribute server
///
/// Registration resolves the handles the GATT macros already assigned.
/// Notifications are handed to the connection task, which owns the
/// connection needed to send them.
pub struct TroubleStack<'s> {
    server: &'s Server<'static>,
    awaiting_reply: bool,
    reply: Option<CapturedReply>,
}

impl<'s> TroubleStack<'s> {
    pub fn new(server: &'s Server<'static>) -> Self {
        Self {
            server,
            awaiting_reply: false,
            reply: None,
        }
    }

    /// Adapter for dispatching a deferred write that expects an answer
    fn for_authorization(server: &'s Server<'static>) -> Self {
        Self {
            awaiting_reply: true,
            ..Self::new(server)
        }
    }

    fn take_reply(&mut self) -> Option<CapturedReply> {
        self.awaiting_reply = false;
        self.reply.take()
    }

    fn value_handle(&self) -> u16 {
        self.server.custom.value.handle
    }
}

impl GattStack for TroubleStack<'_> {
    fn allocate_uuid(&mut self, base: &[u8; 16]) -> Result<u8, StackError> {
        // The table is generated with exactly one vendor base
        if *base == uuid::BASE {
            Ok(VENDOR_UUID_TYPE)
        } else {
            Err(StackError::NoMem)
        }
    }

    fn add_service(&mut self, kind: ServiceType, uuid: Uuid) -> Result<u16, StackError> {
        if kind != ServiceType::Primary
            || uuid.uuid_type != VENDOR_UUID_TYPE
            || uuid.uuid != uuid::SERVICE
        {
            return Err(StackError::InvalidParam);
        }
        Ok(self.server.custom.handle)
    }

    fn add_characteristic(
        &mut self,
        service_handle: u16,
        params: &CharacteristicParams,
    ) -> Result<CharacteristicHandles, StackError> {
        if service_handle != self.server.custom.handle
            || params.uuid.uuid != uuid::VALUE_CHAR
            || params.max_len != characteristic::MAX_LEN
            || !params.props.notify
        {
            return Err(StackError::InvalidParam);
        }

        let value = &self.server.custom.value;
        let cccd_handle = value.cccd_handle.ok_or(StackError::NotFound)?;

        let initial: Vec<u8, { characteristic::MAX_LEN }> =
            Vec::from_slice(&[0u8; characteristic::MAX_LEN][..params.init_len])
                .map_err(|_| StackError::InvalidParam)?;
        self.server
            .set(value, &initial)
            .map_err(|_| StackError::NoMem)?;

        Ok(CharacteristicHandles {
            value_handle: value.handle,
            cccd_handle,
        })
    }

    fn set_attribute_value(
        &mut self,
        _conn: ConnHandle,
        handle: u16,
        value: &[u8],
    ) -> Result<(), StackError> {
        if handle != self.value_handle() {
            return Err(StackError::NotFound);
        }
        let value = Vec::from_slice(value).map_err(|_| StackError::InvalidParam)?;
        self.server
            .set(&self.server.custom.value, &value)
            .map_err(|_| StackError::InvalidParam)
    }

    fn get_attribute_value(
        &mut self,
        _conn: ConnHandle,
        handle: u16,
        buf: &mut [u8],
    ) -> Result<usize, StackError> {
        if handle != self.value_handle() {
            return Err(StackError::NotFound);
        }
        let value = self
            .server
            .get(&self.server.custom.value)
            .map_err(|_| StackError::NotFound)?;
        let count = core::cmp::min(buf.len(), value.len());
        buf[..count].copy_from_slice(&value[..count]);
        Ok(count)
    }

    fn send_notification(
        &mut self,
        conn: ConnHandle,
        handle: u16,
        value: &[u8],
    ) -> Result<(), StackError> {
        if !conn.is_valid() {
            return Err(StackError::InvalidState);
        }
        if handle != self.value_handle() {
            return Err(StackError::NotFound);
        }
        let value = Vec::from_slice(value).map_err(|_| StackError::InvalidParam)?;
        NOTIFY_CHANNEL
            .try_send(PendingNotification { conn, value })
            .map_err(|_| StackError::Busy)
    }

    fn reply_authorization(
        &mut self,
        _conn: ConnHandle,
        reply: &AuthorizeReply<'_>,
    ) -> Result<(), StackError> {
        if !self.awaiting_reply || self.reply.is_some() {
            return Err(StackError::InvalidState);
        }

        // Never read past the supplied data, whatever length is declared
        let len = core::cmp::min(usize::from(reply.len), reply.data.len());
        let value = Vec::from_slice(&reply.data[..len]).map_err(|_| StackError::InvalidParam)?;
        self.reply = Some(CapturedReply {
            approved: reply.gatt_status == GattStatus::Success,
            update: reply.write_update,
            value,
        });
        Ok(())
    }
}

/// Route one stack event through the registered custom service
fn dispatch(stack: &mut TroubleStack<'_>, event: &StackEvent<'_>) {
    SERVICE.lock(|cell| {
        let mut service = cell.borrow_mut();
        on_stack_event(Some(event), service.as_mut(), stack, &mut LedIndicator);
    });
}

/// Format device ID bytes as uppercase hex into a buffer
/// Returns the formatted string slice
pub fn format_device_name<'a>(buf: &'a mut [u8; 20], device_id: &[u8; 3]) -> &'a str {
    const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";
    let prefix = gap::DEVICE_NAME_PREFIX.as_bytes();

    buf[..prefix.len()].copy_from_slice(prefix);

    // Format 3 bytes as 6 hex characters
    let mut pos = prefix.len();
    for &byte in device_id {
        buf[pos] = HEX_CHARS[(byte >> 4) as usize];
        buf[pos + 1] = HEX_CHARS[(byte & 0x0F) as usize];
        pos += 2;
    }

    // All bytes are ASCII, so this will always succeed
    core::str::from_utf8(&buf[..pos]).unwrap_or(gap::DEVICE_NAME_PREFIX)
}

/// Main BLE task that manages the Bluetooth stack and connections
///
/// This task:
/// 1. Starts advertising under the device name
/// 2. Feeds connection, write and deferred-write events to the custom service
/// 3. Sends the notifications the service queues
pub async fn ble_task<C: Controller>(
    controller: C,
    device_id: [u8; 3],
    device_name: &'static str,
    server: &'static Server<'static>,
) {
    let mut resources: HostResources<DefaultPacketPool, { gap::CONNECTIONS_MAX }, { gap::L2CAP_CHANNELS_MAX }> =
        HostResources::new();

    // Build the BLE stack with address derived from device ID
    let stack = trouble_host::new(controller, &mut resources).set_random_address(Address::random([
        device_id[0],
        device_id[1],
        device_id[2],
        0x1E,
        0x83,
        0xE7,
    ]));

    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let runner_task = runner.run();

    let peripheral_task = async {
        let mut adv_data = [0u8; 31];
        let len = match AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                AdStructure::CompleteLocalName(device_name.as_bytes()),
            ],
            &mut adv_data,
        ) {
            Ok(l) => l,
            Err(_) => return,
        };

        loop {
            log::info!("BLE: advertising as '{}'", device_name);
            let advertiser = match peripheral
                .advertise(
                    &Default::default(),
                    Advertisement::ConnectableScannableUndirected {
                        adv_data: &adv_data[..len],
                        scan_data: &[],
                    },
                )
                .await
            {
                Ok(a) => a,
                Err(_) => continue,
            };

            let acceptor = match advertiser.accept().await {
                Ok(a) => a,
                Err(_) => continue,
            };

            let conn = match acceptor.with_attribute_server(server) {
                Ok(c) => c,
                Err(_) => continue,
            };

            let conn_handle = ConnHandle(conn.raw().handle().raw());
            dispatch(&mut TroubleStack::new(server), &StackEvent::Connected { conn_handle });

            // Drop notifications queued for an earlier link
            while NOTIFY_CHANNEL.try_receive().is_ok() {}

            loop {
                let gatt_future = conn.next();
                let notify_future = NOTIFY_CHANNEL.receive();

                match embassy_futures::select::select(gatt_future, notify_future).await {
                    embassy_futures::select::Either::First(gatt_event) => match gatt_event {
                        GattConnectionEvent::Disconnected { reason } => {
                            dispatch(
                                &mut TroubleStack::new(server),
                                &StackEvent::Disconnected {
                                    conn_handle,
                                    reason: reason.into_inner(),
                                },
                            );
                            break;
                        }
                        GattConnectionEvent::Gatt { event } => {
                            handle_gatt_event(server, conn_handle, event);
                        }
                        _ => {}
                    },
                    embassy_futures::select::Either::Second(pending) => {
                        if pending.conn == conn_handle {
                            if let Err(e) = server.custom.value.notify(&conn, &pending.value).await {
                                log::warn!("BLE: notification failed: {:?}", e);
                            }
                        }
                    }
                }
            }
        }
    };

    embassy_futures::select::select(runner_task, peripheral_task).await;
}

/// Translate one GATT event and answer the peer
fn handle_gatt_event<P: PacketPool>(
    server: &'static Server<'static>,
    conn_handle: ConnHandle,
    event: GattEvent<'_, '_, P>,
) {
    match event {
        GattEvent::Write(write_event) => {
            let handle = write_event.handle();

            if handle == server.custom.value.handle {
                // Value writes are deferred until the service authorizes them
                let mut stack = TroubleStack::for_authorization(server);
                dispatch(
                    &mut stack,
                    &StackEvent::AuthorizeRequest {
                        conn_handle,
                        request: AuthorizeRequest::Write {
                            handle,
                            offset: 0,
                            data: write_event.data(),
                        },
                    },
                );

                match stack.take_reply() {
                    Some(reply) if reply.approved => {
                        let _ = write_event.accept();
                        if reply.update {
                            let _ = server.set(&server.custom.value, &reply.value);
                        }
                        // Committed, report it like any other write
                        dispatch(
                            &mut stack,
                            &StackEvent::Write {
                                conn_handle,
                                handle,
                                data: &reply.value,
                            },
                        );
                    }
                    Some(_) => {
                        let _ = write_event.reject(AttErrorCode::WRITE_NOT_PERMITTED);
                    }
                    None => {
                        log::warn!("BLE: write to {:#06x} left unanswered", handle);
                        let _ = write_event.reject(AttErrorCode::UNLIKELY_ERROR);
                    }
                }
            } else {
                let mut data: Vec<u8, 8> = Vec::new();
                let _ = data.extend_from_slice(write_event.data());
                let _ = write_event.accept();
                dispatch(
                    &mut TroubleStack::new(server),
                    &StackEvent::Write {
                        conn_handle,
                        handle,
                        data: &data,
                    },
                );
            }
        }
        GattEvent::Read(read_event) => {
            let _ = read_event.accept();
        }
        GattEvent::Other(other_event) => {
            let _ = other_event.accept();
        }
    }
}
