//! Register resolution and typed marshalling.
//!
//! A register channel resolves its `(device, address, wire type)` triple once, at
//! setup, and then moves values between host parameters and the vendor calls
//! for that wire type. String registers with a companion length register are
//! moved as raw byte arrays whose size is the live value of the length register.

use crate::registry::{DeviceEntry, DeviceRegistry};
use crate::{ChannelError, ChannelId, Param, Reply, Result};
use core::fmt;
use labjack_sdk::{Handle, Ljm, RegisterType, STRING_ALLOCATION_SIZE};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MAX_BYTE_ARRAY_LEN: usize = 1024;

/// How a register is named by the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RegisterRef {
    ByAddress(u32),
    ByName(String),
}

impl RegisterRef {
    /// Interpret a text-host parameter: a non-zero number is an address,
    /// anything else (including `0`) is a register name.
    pub fn from_param(param: &Param) -> Self {
        match u32::try_from(param.to_int()) {
            Ok(address) if address != 0 => Self::ByAddress(address),
            _ => Self::ByName(param.to_text()),
        }
    }

    /// Resolve to an address and its wire type through the vendor tables.
    pub fn resolve(&self, sdk: &dyn Ljm) -> Result<(u32, RegisterType)> {
        let resolved = match self {
            Self::ByAddress(address) => sdk.address_to_type(*address).map(|ty| (*address, ty)),
            Self::ByName(name) => sdk.name_to_address(name),
        };
        let (address, ty) = resolved.map_err(|source| ChannelError::Resolution {
            register: self.to_string(),
            source,
        })?;
        debug!(register = %self, address, %ty, "register resolved");
        Ok((address, ty))
    }
}

impl fmt::Display for RegisterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByAddress(a) => write!(f, "{a}"),
            Self::ByName(n) => f.write_str(n),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegisterOptions {
    /// Upper bound on a byte-array transfer, checked before allocating.
    pub max_byte_array_len: usize,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            max_byte_array_len: DEFAULT_MAX_BYTE_ARRAY_LEN,
        }
    }
}

/// Typed setup request for a register entry.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisterConfig {
    pub device: ChannelId,
    pub register: RegisterRef,
    pub type_override: Option<RegisterType>,
    pub length_register: Option<RegisterRef>,
}

impl RegisterConfig {
    pub fn new(device: ChannelId, register: RegisterRef) -> Self {
        Self {
            device,
            register,
            type_override: None,
            length_register: None,
        }
    }

    pub fn with_type(mut self, ty: RegisterType) -> Self {
        self.type_override = Some(ty);
        self
    }

    pub fn with_length_register(mut self, length: RegisterRef) -> Self {
        self.length_register = Some(length);
        self
    }
}

/// A value read from a register.
#[derive(Clone, Debug, PartialEq)]
pub enum RegisterValue {
    Number(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<RegisterValue> for Param {
    fn from(value: RegisterValue) -> Self {
        match value {
            RegisterValue::Number(v) => Param::Float(v),
            RegisterValue::Text(s) => Param::Text(s),
            RegisterValue::Bytes(b) => Param::Buffer(b),
        }
    }
}

impl From<RegisterValue> for Reply {
    fn from(value: RegisterValue) -> Self {
        Reply::from(Param::from(value))
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Status {
    Unconfigured,
    Ready,
    Unusable(String),
}

/// One device register, resolved at setup and accessed repeatedly.
pub struct RegisterEntry {
    sdk: Arc<dyn Ljm>,
    registry: Arc<DeviceRegistry>,
    options: RegisterOptions,
    device: Option<Arc<DeviceEntry>>,
    address: u32,
    ty: RegisterType,
    length_address: Option<u32>,
    status: Status,
}

impl RegisterEntry {
    pub fn new(
        sdk: Arc<dyn Ljm>,
        registry: Arc<DeviceRegistry>,
        options: RegisterOptions,
    ) -> Self {
        Self {
            sdk,
            registry,
            options,
            device: None,
            address: 0,
            ty: RegisterType::Uint16,
            length_address: None,
            status: Status::Unconfigured,
        }
    }

    pub fn device(&self) -> Option<ChannelId> {
        self.device.as_ref().map(|d| d.channel_id())
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn register_type(&self) -> RegisterType {
        self.ty
    }

    pub fn length_address(&self) -> Option<u32> {
        self.length_address
    }

    /// Wire type of the length register, when one is configured.
    pub fn length_type(&self) -> Option<RegisterType> {
        self.length_address.map(|_| RegisterType::Uint32)
    }

    pub fn is_ready(&self) -> bool {
        self.status == Status::Ready
    }

    /// Why the last setup failed, if it did.
    pub fn unusable_reason(&self) -> Option<&str> {
        match &self.status {
            Status::Unusable(reason) => Some(reason),
            _ => None,
        }
    }

    /// Resolve device, address, wire type and length register.
    ///
    /// Any failure leaves the entry unusable: reads and writes then fail with
    /// [`ChannelError::NotConfigured`] until a later setup succeeds.
    pub fn configure(&mut self, config: &RegisterConfig) -> Result<()> {
        match self.try_configure(config) {
            Ok(()) => {
                self.status = Status::Ready;
                Ok(())
            }
            Err(e) => {
                self.status = Status::Unusable(e.to_string());
                Err(e)
            }
        }
    }

    /// Record a setup failure found before [`configure`](Self::configure) could run.
    pub fn mark_unusable(&mut self, err: ChannelError) -> ChannelError {
        self.status = Status::Unusable(err.to_string());
        err
    }

    fn try_configure(&mut self, config: &RegisterConfig) -> Result<()> {
        let device = self
            .registry
            .find_by_channel_id(config.device)
            .ok_or_else(|| ChannelError::NotFound(config.device.to_string()))?;
        self.device = Some(device);

        let (address, inferred) = config.register.resolve(self.sdk.as_ref())?;
        self.address = address;
        self.ty = config.type_override.unwrap_or(inferred);

        self.length_address = match &config.length_register {
            Some(length) => Some(length.resolve(self.sdk.as_ref())?.0),
            None => None,
        };
        debug!(
            device = %config.device,
            address = self.address,
            ty = %self.ty,
            length_address = ?self.length_address,
            "register configured"
        );
        Ok(())
    }

    /// Registers moved as raw bytes: LJM_BYTE always, and strings that have a
    /// length register.
    fn is_byte_array(&self) -> bool {
        match self.ty {
            RegisterType::Byte => true,
            RegisterType::String => self.length_address.is_some(),
            _ => false,
        }
    }

    fn ready_device(&self) -> Result<&Arc<DeviceEntry>> {
        match (&self.status, &self.device) {
            (Status::Ready, Some(device)) => Ok(device),
            _ => Err(ChannelError::NotConfigured),
        }
    }

    fn checked_len(&self, raw: f64) -> Result<usize> {
        let max = self.options.max_byte_array_len;
        if !raw.is_finite() || raw < 0.0 || raw > max as f64 {
            return Err(ChannelError::LengthOutOfRange { len: raw, max });
        }
        Ok(raw as usize)
    }

    pub fn read(&self) -> Result<RegisterValue> {
        let device = self.ready_device()?;
        let slot = device.lock();
        let handle = (*slot).ok_or(ChannelError::DeviceNotOpen(device.channel_id()))?;
        let sdk = self.sdk.as_ref();

        match (self.ty, self.length_address) {
            (RegisterType::String | RegisterType::Byte, Some(length_address)) => {
                let raw = sdk
                    .read_value(handle, length_address, RegisterType::Uint32)
                    .map_err(|e| ChannelError::at(e, length_address))?;
                let len = self.checked_len(raw)?;
                let bytes = sdk
                    .read_byte_array(handle, self.address, len)
                    .map_err(|e| ChannelError::at(e, self.address))?;
                Ok(RegisterValue::Bytes(bytes))
            }
            (RegisterType::String, None) => sdk
                .read_string(handle, self.address)
                .map(RegisterValue::Text)
                .map_err(|e| ChannelError::at(e, self.address)),
            (ty, _) => sdk
                .read_value(handle, self.address, ty)
                .map(RegisterValue::Number)
                .map_err(|e| ChannelError::at(e, self.address)),
        }
    }

    pub fn write(&self, value: &Param) -> Result<()> {
        let device = self.ready_device()?;
        let slot = device.lock();
        let handle = (*slot).ok_or(ChannelError::DeviceNotOpen(device.channel_id()))?;

        if self.is_byte_array() {
            return self.write_bytes(handle, &value.to_bytes());
        }
        let sdk = self.sdk.as_ref();
        if self.ty == RegisterType::String {
            let text = truncate_to_string_capacity(value.to_text());
            return sdk
                .write_string(handle, self.address, &text)
                .map_err(|e| ChannelError::at(e, self.address));
        }
        sdk.write_value(handle, self.address, self.ty, value.to_float())
            .map_err(|e| ChannelError::at(e, self.address))
    }

    /// Length register first, so it always describes the data just written.
    fn write_bytes(&self, handle: Handle, bytes: &[u8]) -> Result<()> {
        let sdk = self.sdk.as_ref();
        self.checked_len(bytes.len() as f64)?;
        if let Some(length_address) = self.length_address {
            sdk.write_value(
                handle,
                length_address,
                RegisterType::Uint32,
                bytes.len() as f64,
            )
            .map_err(|e| ChannelError::at(e, length_address))?;
        }
        sdk.write_byte_array(handle, self.address, bytes)
            .map_err(|e| ChannelError::at(e, self.address))
    }
}

pub(crate) fn truncate_to_string_capacity(mut text: String) -> String {
    let cap = STRING_ALLOCATION_SIZE - 1;
    if text.len() > cap {
        let mut end = cap;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use labjack_sdk::{MockCall, MockLjm, MockValue};

    fn fixture() -> (Arc<MockLjm>, Arc<DeviceRegistry>, RegisterEntry) {
        let sdk = Arc::new(MockLjm::t7());
        let registry = Arc::new(DeviceRegistry::new());
        let dev = registry.register_device(ChannelId(5));
        dev.open(sdk.as_ref(), None).unwrap();
        let entry = RegisterEntry::new(
            sdk.clone() as Arc<dyn Ljm>,
            registry.clone(),
            RegisterOptions::default(),
        );
        sdk.clear_calls();
        (sdk, registry, entry)
    }

    #[test]
    fn numeric_address_skips_name_lookup() {
        let (sdk, _, mut reg) = fixture();
        reg.configure(&RegisterConfig::new(ChannelId(5), RegisterRef::ByAddress(1000)))
            .unwrap();
        assert_eq!(sdk.calls(), vec![MockCall::AddressToType(1000)]);
        assert_eq!(reg.register_type(), RegisterType::Float32);
    }

    #[test]
    fn zero_or_text_goes_through_name_lookup() {
        assert_eq!(
            RegisterRef::from_param(&Param::from("0")),
            RegisterRef::ByName("0".to_string())
        );
        assert_eq!(
            RegisterRef::from_param(&Param::Int(0)),
            RegisterRef::ByName("0".to_string())
        );
        assert_eq!(
            RegisterRef::from_param(&Param::from("AIN0")),
            RegisterRef::ByName("AIN0".to_string())
        );
        assert_eq!(
            RegisterRef::from_param(&Param::from("1000")),
            RegisterRef::ByAddress(1000)
        );

        let (sdk, _, mut reg) = fixture();
        let err = reg
            .configure(&RegisterConfig::new(
                ChannelId(5),
                RegisterRef::from_param(&Param::from("0")),
            ))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Resolution { .. }));
        assert_eq!(sdk.calls(), vec![MockCall::NameToAddress("0".to_string())]);
    }

    #[test]
    fn resolution_failure_makes_entry_unusable() {
        let (_, _, mut reg) = fixture();
        let err = reg
            .configure(&RegisterConfig::new(
                ChannelId(5),
                RegisterRef::ByName("NOPE".to_string()),
            ))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Resolution { .. }));
        assert!(!reg.is_ready());
        assert!(reg.unusable_reason().is_some_and(|r| r.contains("NOPE")));
        assert_eq!(reg.read(), Err(ChannelError::NotConfigured));
        assert_eq!(reg.write(&Param::Float(1.0)), Err(ChannelError::NotConfigured));
    }

    #[test]
    fn missing_device_is_not_found() {
        let (_, _, mut reg) = fixture();
        let err = reg
            .configure(&RegisterConfig::new(
                ChannelId(6),
                RegisterRef::ByName("DAC0".to_string()),
            ))
            .unwrap_err();
        assert_eq!(err, ChannelError::NotFound("6".to_string()));
        assert_eq!(reg.read(), Err(ChannelError::NotConfigured));
    }

    #[test]
    fn unopened_device_is_reported() {
        let sdk = Arc::new(MockLjm::t7());
        let registry = Arc::new(DeviceRegistry::new());
        registry.register_device(ChannelId(3));
        let mut reg = RegisterEntry::new(sdk, registry, RegisterOptions::default());
        reg.configure(&RegisterConfig::new(
            ChannelId(3),
            RegisterRef::ByName("DAC0".to_string()),
        ))
        .unwrap();
        assert_eq!(reg.read(), Err(ChannelError::DeviceNotOpen(ChannelId(3))));
    }

    #[test]
    fn numeric_write_then_read() {
        let (sdk, _, mut reg) = fixture();
        reg.configure(&RegisterConfig::new(
            ChannelId(5),
            RegisterRef::ByName("DAC0".to_string()),
        ))
        .unwrap();
        reg.write(&Param::from("2.5")).unwrap();
        assert_eq!(reg.read().unwrap(), RegisterValue::Number(2.5));
        assert!(sdk.calls().contains(&MockCall::WriteValue {
            handle: Handle(1),
            address: 1000,
            ty: RegisterType::Float32,
            value: 2.5
        }));
    }

    #[test]
    fn type_override_replaces_inferred_type() {
        let (_, _, mut reg) = fixture();
        reg.configure(
            &RegisterConfig::new(ChannelId(5), RegisterRef::ByName("FIO0".to_string()))
                .with_type(RegisterType::Int32),
        )
        .unwrap();
        assert_eq!(reg.register_type(), RegisterType::Int32);
        assert_eq!(reg.address(), 2000);
    }

    #[test]
    fn fixed_string_path() {
        let (sdk, _, mut reg) = fixture();
        reg.configure(&RegisterConfig::new(
            ChannelId(5),
            RegisterRef::ByName("DEVICE_NAME_DEFAULT".to_string()),
        ))
        .unwrap();
        reg.write(&Param::from("x".repeat(60))).unwrap();
        assert_eq!(
            reg.read().unwrap(),
            RegisterValue::Text("x".repeat(STRING_ALLOCATION_SIZE - 1))
        );
        assert!(matches!(
            sdk.calls().last(),
            Some(MockCall::ReadString { address: 60500, .. })
        ));
    }

    #[test]
    fn byte_array_with_length_register() {
        let (sdk, _, mut reg) = fixture();
        reg.configure(
            &RegisterConfig::new(ChannelId(5), RegisterRef::ByName("LUA_SOURCE_WRITE".into()))
                .with_length_register(RegisterRef::ByName("LUA_SOURCE_SIZE".into())),
        )
        .unwrap();
        assert_eq!(reg.length_type(), Some(RegisterType::Uint32));
        sdk.clear_calls();

        let data: Vec<u8> = (0u8..10).collect();
        reg.write(&Param::Buffer(data.clone())).unwrap();
        assert_eq!(
            sdk.calls(),
            vec![
                MockCall::WriteValue {
                    handle: Handle(1),
                    address: 6012,
                    ty: RegisterType::Uint32,
                    value: 10.0
                },
                MockCall::WriteByteArray {
                    handle: Handle(1),
                    address: 6014,
                    bytes: data.clone()
                },
            ]
        );
        assert_eq!(reg.read().unwrap(), RegisterValue::Bytes(data));
        assert_eq!(sdk.value(6012), Some(MockValue::Number(10.0)));
    }

    #[test]
    fn length_is_reread_on_every_access() {
        let (sdk, _, mut reg) = fixture();
        reg.configure(
            &RegisterConfig::new(ChannelId(5), RegisterRef::ByName("DEVICE_NAME_DEFAULT".into()))
                .with_length_register(RegisterRef::ByName("LUA_SOURCE_SIZE".into())),
        )
        .unwrap();
        sdk.set_value(60500, MockValue::Bytes(b"abcdef".to_vec()));
        sdk.set_value(6012, MockValue::Number(3.0));
        assert_eq!(reg.read().unwrap(), RegisterValue::Bytes(b"abc".to_vec()));
        sdk.set_value(6012, MockValue::Number(5.0));
        assert_eq!(reg.read().unwrap(), RegisterValue::Bytes(b"abcde".to_vec()));
    }

    #[test]
    fn oversized_length_is_rejected_before_reading() {
        let (sdk, _, mut reg) = fixture();
        reg.configure(
            &RegisterConfig::new(ChannelId(5), RegisterRef::ByName("LUA_SOURCE_WRITE".into()))
                .with_length_register(RegisterRef::ByName("LUA_SOURCE_SIZE".into())),
        )
        .unwrap();
        sdk.set_value(6012, MockValue::Number(1e9));
        sdk.clear_calls();
        let err = reg.read().unwrap_err();
        assert!(matches!(err, ChannelError::LengthOutOfRange { max: 1024, .. }));
        assert!(!sdk
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::ReadByteArray { .. })));
    }

    #[test]
    fn vendor_failures_carry_code_and_address() {
        let (sdk, _, mut reg) = fixture();
        reg.configure(&RegisterConfig::new(ChannelId(5), RegisterRef::ByAddress(1002)))
            .unwrap();
        sdk.fail_at(1002, 2358);
        assert_eq!(
            reg.write(&Param::Float(1.0)),
            Err(ChannelError::Vendor {
                code: 2358,
                address: Some(1002)
            })
        );
    }

    #[test]
    fn byte_type_without_length_register_writes_bytes() {
        let (sdk, _, mut reg) = fixture();
        reg.configure(&RegisterConfig::new(
            ChannelId(5),
            RegisterRef::ByName("LUA_SOURCE_WRITE".into()),
        ))
        .unwrap();
        sdk.clear_calls();
        reg.write(&Param::from("ab")).unwrap();
        assert_eq!(
            sdk.calls(),
            vec![MockCall::WriteByteArray {
                handle: Handle(1),
                address: 6014,
                bytes: b"ab".to_vec()
            }]
        );
    }
}
