//! BLE stack trait for abstraction and testability
//!
//! This trait defines the calls the custom service makes into the vendor
//! BLE stack: attribute registration, value storage, notification and the
//! write-authorization reply. The firmware implements it over TrouBLE; the
//! mock implementation records every call for unit tests.

use super::connection::ConnHandle;

/// Errors reported by the BLE stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// Out of table space (UUID table, attribute table, TX buffers)
    NoMem,
    /// Invalid parameter, e.g. an oversized value
    InvalidParam,
    /// Operation not allowed in the current state, e.g. not connected
    InvalidState,
    /// Unknown attribute or connection handle
    NotFound,
    /// Stack is busy, try again later
    Busy,
}

/// UUID given as a 16-bit alias on a registered base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uuid {
    /// Type identifier returned by [`GattStack::allocate_uuid`]
    pub uuid_type: u8,
    /// 16-bit alias placed into the base
    pub uuid: u16,
}

/// Kind of service declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Primary,
    Secondary,
}

/// Access requirement for reading or writing an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// No access allowed
    NoAccess,
    /// No security required
    Open,
    /// Encrypted link required
    Encrypted,
}

/// Characteristic properties exposed in the declaration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

/// Parameters for adding a characteristic to a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicParams {
    pub uuid: Uuid,
    pub max_len: usize,
    pub init_len: usize,
    pub is_var_len: bool,
    pub props: CharProperties,
    /// Reads are held until the application authorizes them
    pub is_deferred_read: bool,
    /// Writes are held until the application authorizes them
    pub is_deferred_write: bool,
    pub read_access: SecurityMode,
    pub write_access: SecurityMode,
    pub cccd_write_access: SecurityMode,
}

/// Handles assigned to an added characteristic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicHandles {
    pub value_handle: u16,
    pub cccd_handle: u16,
}

/// ATT-level status carried in an authorization reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    ReadNotPermitted,
    WriteNotPermitted,
    InsufficientAuthorization,
    InvalidAttributeValueLength,
}

/// Which kind of access an authorization request or reply concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeType {
    Read,
    Write,
}

/// Reply to a deferred read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizeReply<'a> {
    pub kind: AuthorizeType,
    pub gatt_status: GattStatus,
    /// Stack should store `data` into the attribute on approval
    pub write_update: bool,
    /// Stack should serve `data` to the peer for a deferred read
    pub read_update: bool,
    pub offset: u16,
    /// Declared length of the reply; may exceed `data.len()`
    pub len: u16,
    pub data: &'a [u8],
}

/// Abstract BLE stack interface for testability
///
/// All calls are synchronous. They run either inside the stack's event
/// delivery or from application code, and none of them may suspend.
pub trait GattStack {
    /// Register a vendor-specific 128-bit base UUID and return its type id
    fn allocate_uuid(&mut self, base: &[u8; 16]) -> Result<u8, StackError>;

    /// Add a service declaration and return its handle
    fn add_service(&mut self, kind: ServiceType, uuid: Uuid) -> Result<u16, StackError>;

    /// Add a characteristic to the service at `service_handle`
    fn add_characteristic(
        &mut self,
        service_handle: u16,
        params: &CharacteristicParams,
    ) -> Result<CharacteristicHandles, StackError>;

    /// Store a value in the attribute table
    fn set_attribute_value(
        &mut self,
        conn: ConnHandle,
        handle: u16,
        value: &[u8],
    ) -> Result<(), StackError>;

    /// Read a value from the attribute table, returning its length
    fn get_attribute_value(
        &mut self,
        conn: ConnHandle,
        handle: u16,
        buf: &mut [u8],
    ) -> Result<usize, StackError>;

    /// Push a notification to the peer on `conn`
    fn send_notification(
        &mut self,
        conn: ConnHandle,
        handle: u16,
        value: &[u8],
    ) -> Result<(), StackError>;

    /// Answer a pending authorization request on `conn`
    fn reply_authorization(
        &mut self,
        conn: ConnHandle,
        reply: &AuthorizeReply<'_>,
    ) -> Result<(), StackError>;
}

#[cfg(test)]
pub mod mock {
    //! Mock BLE stack for testing

    use super::*;
    use heapless::Vec;

    /// Largest value the mock attribute table stores
    pub const MOCK_VALUE_LEN: usize = 8;

    /// First handle handed out, after the GAP and GATT services
    const FIRST_HANDLE: u16 = 0x000C;

    /// Stack calls in the order they were made
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StackCall {
        AllocateUuid,
        AddService,
        AddCharacteristic,
        SetValue,
        GetValue,
        Notify,
        ReplyAuthorization,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedNotification {
        pub conn: ConnHandle,
        pub handle: u16,
        pub data: Vec<u8, MOCK_VALUE_LEN>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedReply {
        pub conn: ConnHandle,
        pub kind: AuthorizeType,
        pub gatt_status: GattStatus,
        pub write_update: bool,
        pub read_update: bool,
        pub offset: u16,
        pub len: u16,
        pub data: Vec<u8, MOCK_VALUE_LEN>,
    }

    struct MockAttribute {
        handle: u16,
        max_len: usize,
        value: Vec<u8, MOCK_VALUE_LEN>,
    }

    /// Mock BLE stack for unit testing
    pub struct MockGattStack {
        uuid_bases: Vec<[u8; 16], 4>,
        uuid_capacity: usize,
        services: Vec<(u16, ServiceType, Uuid), 4>,
        characteristics: Vec<(u16, CharacteristicParams), 4>,
        attributes: Vec<MockAttribute, 16>,
        next_handle: u16,
        calls: Vec<StackCall, 64>,
        notifications: Vec<RecordedNotification, 16>,
        replies: Vec<RecordedReply, 16>,
        next_uuid_error: Option<StackError>,
        next_service_error: Option<StackError>,
        next_char_error: Option<StackError>,
        next_set_error: Option<StackError>,
        next_notify_error: Option<StackError>,
        next_reply_error: Option<StackError>,
    }

    impl MockGattStack {
        /// Create a new mock stack with room for two vendor UUID bases
        pub fn new() -> Self {
            Self {
                uuid_bases: Vec::new(),
                uuid_capacity: 2,
                services: Vec::new(),
                characteristics: Vec::new(),
                attributes: Vec::new(),
                next_handle: FIRST_HANDLE,
                calls: Vec::new(),
                notifications: Vec::new(),
                replies: Vec::new(),
                next_uuid_error: None,
                next_service_error: None,
                next_char_error: None,
                next_set_error: None,
                next_notify_error: None,
                next_reply_error: None,
            }
        }

        /// Limit the vendor UUID table to `capacity` entries
        pub fn with_uuid_capacity(mut self, capacity: usize) -> Self {
            self.uuid_capacity = capacity;
            self
        }

        pub fn set_next_service_error(&mut self, error: StackError) {
            self.next_service_error = Some(error);
        }

        pub fn set_next_uuid_error(&mut self, error: StackError) {
            self.next_uuid_error = Some(error);
        }

        pub fn set_next_char_error(&mut self, error: StackError) {
            self.next_char_error = Some(error);
        }

        pub fn set_next_set_error(&mut self, error: StackError) {
            self.next_set_error = Some(error);
        }

        pub fn set_next_notify_error(&mut self, error: StackError) {
            self.next_notify_error = Some(error);
        }

        pub fn set_next_reply_error(&mut self, error: StackError) {
            self.next_reply_error = Some(error);
        }

        /// Every call made so far, oldest first
        pub fn calls(&self) -> &[StackCall] {
            &self.calls
        }

        pub fn clear_calls(&mut self) {
            self.calls.clear();
        }

        pub fn uuid_bases(&self) -> &[[u8; 16]] {
            &self.uuid_bases
        }

        pub fn services(&self) -> &[(u16, ServiceType, Uuid)] {
            &self.services
        }

        /// Added characteristics with the service handle they belong to
        pub fn characteristics(&self) -> &[(u16, CharacteristicParams)] {
            &self.characteristics
        }

        pub fn notifications(&self) -> &[RecordedNotification] {
            &self.notifications
        }

        pub fn replies(&self) -> &[RecordedReply] {
            &self.replies
        }

        /// Current contents of the attribute at `handle`
        pub fn value(&self, handle: u16) -> Option<&[u8]> {
            self.attributes
                .iter()
                .find(|a| a.handle == handle)
                .map(|a| a.value.as_slice())
        }

        fn record(&mut self, call: StackCall) {
            let _ = self.calls.push(call);
        }

        fn allocate_handle(&mut self) -> u16 {
            let handle = self.next_handle;
            self.next_handle += 1;
            handle
        }

        fn add_attribute(&mut self, handle: u16, max_len: usize, init_len: usize) -> Result<(), StackError> {
            let mut value = Vec::new();
            value
                .resize(init_len, 0)
                .map_err(|_| StackError::InvalidParam)?;
            self.attributes
                .push(MockAttribute {
                    handle,
                    max_len,
                    value,
                })
                .map_err(|_| StackError::NoMem)
        }
    }

    impl Default for MockGattStack {
        fn default() -> Self {
            Self::new()
        }
    }

    impl GattStack for MockGattStack {
        fn allocate_uuid(&mut self, base: &[u8; 16]) -> Result<u8, StackError> {
            self.record(StackCall::AllocateUuid);
            if let Some(error) = self.next_uuid_error.take() {
                return Err(error);
            }

            // Re-registering a known base returns its existing type
            if let Some(pos) = self.uuid_bases.iter().position(|b| b == base) {
                return Ok(pos as u8 + 2);
            }
            if self.uuid_bases.len() >= self.uuid_capacity {
                return Err(StackError::NoMem);
            }
            self.uuid_bases.push(*base).map_err(|_| StackError::NoMem)?;

            // Types 0 and 1 are reserved for "unknown" and Bluetooth SIG UUIDs
            Ok(self.uuid_bases.len() as u8 + 1)
        }

        fn add_service(&mut self, kind: ServiceType, uuid: Uuid) -> Result<u16, StackError> {
            self.record(StackCall::AddService);
            if let Some(error) = self.next_service_error.take() {
                return Err(error);
            }

            if uuid.uuid_type < 2 || usize::from(uuid.uuid_type - 1) > self.uuid_bases.len() {
                return Err(StackError::InvalidParam);
            }

            let handle = self.allocate_handle();
            self.services
                .push((handle, kind, uuid))
                .map_err(|_| StackError::NoMem)?;
            Ok(handle)
        }

        fn add_characteristic(
            &mut self,
            service_handle: u16,
            params: &CharacteristicParams,
        ) -> Result<CharacteristicHandles, StackError> {
            self.record(StackCall::AddCharacteristic);
            if let Some(error) = self.next_char_error.take() {
                return Err(error);
            }

            if !self.services.iter().any(|(h, _, _)| *h == service_handle) {
                return Err(StackError::InvalidParam);
            }
            if params.init_len > params.max_len || params.max_len > MOCK_VALUE_LEN {
                return Err(StackError::InvalidParam);
            }

            // Declaration, value, then CCCD
            let _declaration = self.allocate_handle();
            let value_handle = self.allocate_handle();
            self.add_attribute(value_handle, params.max_len, params.init_len)?;

            let mut cccd_handle = 0;
            if params.props.notify || params.props.indicate {
                cccd_handle = self.allocate_handle();
                self.add_attribute(cccd_handle, 2, 2)?;
            }

            self.characteristics
                .push((service_handle, params.clone()))
                .map_err(|_| StackError::NoMem)?;

            Ok(CharacteristicHandles {
                value_handle,
                cccd_handle,
            })
        }

        fn set_attribute_value(
            &mut self,
            _conn: ConnHandle,
            handle: u16,
            value: &[u8],
        ) -> Result<(), StackError> {
            self.record(StackCall::SetValue);
            if let Some(error) = self.next_set_error.take() {
                return Err(error);
            }

            let attribute = self
                .attributes
                .iter_mut()
                .find(|a| a.handle == handle)
                .ok_or(StackError::NotFound)?;
            if value.len() > attribute.max_len {
                return Err(StackError::InvalidParam);
            }

            attribute.value.clear();
            attribute
                .value
                .extend_from_slice(value)
                .map_err(|_| StackError::InvalidParam)
        }

        fn get_attribute_value(
            &mut self,
            _conn: ConnHandle,
            handle: u16,
            buf: &mut [u8],
        ) -> Result<usize, StackError> {
            self.record(StackCall::GetValue);

            let attribute = self
                .attributes
                .iter()
                .find(|a| a.handle == handle)
                .ok_or(StackError::NotFound)?;
            let count = core::cmp::min(buf.len(), attribute.value.len());
            buf[..count].copy_from_slice(&attribute.value[..count]);
            Ok(count)
        }

        fn send_notification(
            &mut self,
            conn: ConnHandle,
            handle: u16,
            value: &[u8],
        ) -> Result<(), StackError> {
            self.record(StackCall::Notify);
            if let Some(error) = self.next_notify_error.take() {
                return Err(error);
            }
            if !conn.is_valid() {
                return Err(StackError::InvalidState);
            }

            let mut data = Vec::new();
            data.extend_from_slice(value)
                .map_err(|_| StackError::InvalidParam)?;
            let _ = self.notifications.push(RecordedNotification { conn, handle, data });
            Ok(())
        }

        fn reply_authorization(
            &mut self,
            conn: ConnHandle,
            reply: &AuthorizeReply<'_>,
        ) -> Result<(), StackError> {
            self.record(StackCall::ReplyAuthorization);
            if let Some(error) = self.next_reply_error.take() {
                return Err(error);
            }

            let mut data = Vec::new();
            data.extend_from_slice(reply.data)
                .map_err(|_| StackError::InvalidParam)?;
            let _ = self.replies.push(RecordedReply {
                conn,
                kind: reply.kind,
                gatt_status: reply.gatt_status,
                write_update: reply.write_update,
                read_update: reply.read_update,
                offset: reply.offset,
                len: reply.len,
                data,
            });
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const BASE: [u8; 16] = [0xAA; 16];

        fn params(uuid: Uuid) -> CharacteristicParams {
            CharacteristicParams {
                uuid,
                max_len: 2,
                init_len: 1,
                is_var_len: true,
                props: CharProperties {
                    read: true,
                    notify: true,
                    ..Default::default()
                },
                is_deferred_read: false,
                is_deferred_write: false,
                read_access: SecurityMode::Open,
                write_access: SecurityMode::Open,
                cccd_write_access: SecurityMode::Open,
            }
        }

        #[test]
        fn test_mock_uuid_table_exhaustion() {
            let mut stack = MockGattStack::new().with_uuid_capacity(1);

            assert_eq!(stack.allocate_uuid(&BASE), Ok(2));
            // Same base again reuses the entry
            assert_eq!(stack.allocate_uuid(&BASE), Ok(2));
            assert_eq!(stack.allocate_uuid(&[0x55; 16]), Err(StackError::NoMem));
        }

        #[test]
        fn test_mock_characteristic_handles() {
            let mut stack = MockGattStack::new();
            let uuid_type = stack.allocate_uuid(&BASE).unwrap();
            let uuid = Uuid { uuid_type, uuid: 0x1234 };

            let service = stack.add_service(ServiceType::Primary, uuid).unwrap();
            let handles = stack.add_characteristic(service, &params(uuid)).unwrap();

            assert_eq!(service, FIRST_HANDLE);
            assert_eq!(handles.value_handle, service + 2);
            assert_eq!(handles.cccd_handle, service + 3);
            assert_eq!(stack.value(handles.value_handle), Some(&[0u8][..]));
            assert_eq!(stack.value(handles.cccd_handle), Some(&[0u8, 0][..]));
        }

        #[test]
        fn test_mock_set_value_checks_length() {
            let mut stack = MockGattStack::new();
            let uuid_type = stack.allocate_uuid(&BASE).unwrap();
            let uuid = Uuid { uuid_type, uuid: 0x1234 };
            let service = stack.add_service(ServiceType::Primary, uuid).unwrap();
            let handles = stack.add_characteristic(service, &params(uuid)).unwrap();

            let conn = ConnHandle::INVALID;
            assert_eq!(
                stack.set_attribute_value(conn, handles.value_handle, &[1, 2, 3]),
                Err(StackError::InvalidParam)
            );
            assert_eq!(stack.set_attribute_value(conn, 0x0999, &[1]), Err(StackError::NotFound));

            stack.set_attribute_value(conn, handles.value_handle, &[1, 2]).unwrap();
            let mut buf = [0u8; 4];
            assert_eq!(stack.get_attribute_value(conn, handles.value_handle, &mut buf), Ok(2));
            assert_eq!(&buf[..2], &[1, 2]);
        }

        #[test]
        fn test_mock_notify_error_is_one_shot() {
            let mut stack = MockGattStack::new();

            stack.set_next_notify_error(StackError::Busy);
            assert_eq!(
                stack.send_notification(ConnHandle(1), 0x10, &[1]),
                Err(StackError::Busy)
            );
            stack.send_notification(ConnHandle(1), 0x10, &[1]).unwrap();
            assert_eq!(stack.notifications().len(), 1);
        }

        #[test]
        fn test_mock_notify_requires_connection() {
            let mut stack = MockGattStack::new();

            assert_eq!(
                stack.send_notification(ConnHandle::INVALID, 0x10, &[1]),
                Err(StackError::InvalidState)
            );
            assert!(stack.notifications().is_empty());
        }
    }
}
