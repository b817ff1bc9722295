use crate::{
    AnalogSample, DigitalSample, Handle, HandleInfo, Ljm, OpenSpec, RegisterType, Result,
    SdkError, U12, STRING_ALLOCATION_SIZE,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Status code reported for calls on a handle the mock never opened.
pub const DEVICE_NOT_OPEN: i32 = 1224;

/// Stored contents of one mock register.
#[derive(Clone, Debug, PartialEq)]
pub enum MockValue {
    Number(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// One vendor entry point invocation, recorded in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    Open(OpenSpec),
    NameToAddress(String),
    AddressToType(u32),
    ReadValue {
        handle: Handle,
        address: u32,
        ty: RegisterType,
    },
    WriteValue {
        handle: Handle,
        address: u32,
        ty: RegisterType,
        value: f64,
    },
    ReadString {
        handle: Handle,
        address: u32,
    },
    WriteString {
        handle: Handle,
        address: u32,
        value: String,
    },
    ReadByteArray {
        handle: Handle,
        address: u32,
        len: usize,
    },
    WriteByteArray {
        handle: Handle,
        address: u32,
        bytes: Vec<u8>,
    },
}

#[derive(Default)]
struct State {
    names: HashMap<String, (u32, RegisterType)>,
    types: HashMap<u32, RegisterType>,
    values: HashMap<u32, MockValue>,
    failures: HashMap<u32, i32>,
    open_failure: Option<i32>,
    next_handle: i32,
    open: HashSet<Handle>,
    calls: Vec<MockCall>,
}

/// An in-process LJM device model. Each instance is independent.
#[derive(Default)]
pub struct MockLjm {
    state: Mutex<State>,
}

impl MockLjm {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small T7-like register map.
    pub fn t7() -> Self {
        Self::new()
            .with_register("AIN0", 0, RegisterType::Float32)
            .with_register("AIN1", 2, RegisterType::Float32)
            .with_register("DAC0", 1000, RegisterType::Float32)
            .with_register("DAC1", 1002, RegisterType::Float32)
            .with_register("FIO0", 2000, RegisterType::Uint16)
            .with_register("LUA_SOURCE_SIZE", 6012, RegisterType::Uint32)
            .with_register("LUA_SOURCE_WRITE", 6014, RegisterType::Byte)
            .with_register("SERIAL_NUMBER", 60028, RegisterType::Uint32)
            .with_register("DEVICE_NAME_DEFAULT", 60500, RegisterType::String)
    }

    pub fn with_register(self, name: &str, address: u32, ty: RegisterType) -> Self {
        self.define(name, address, ty);
        self
    }

    pub fn define(&self, name: &str, address: u32, ty: RegisterType) {
        let mut st = self.state.lock();
        st.names.insert(name.to_string(), (address, ty));
        st.types.insert(address, ty);
    }

    pub fn set_value(&self, address: u32, value: MockValue) {
        self.state.lock().values.insert(address, value);
    }

    pub fn value(&self, address: u32) -> Option<MockValue> {
        self.state.lock().values.get(&address).cloned()
    }

    /// Make every read or write at `address` fail with `code`.
    pub fn fail_at(&self, address: u32, code: i32) {
        self.state.lock().failures.insert(address, code);
    }

    pub fn clear_failure(&self, address: u32) {
        self.state.lock().failures.remove(&address);
    }

    /// Make the next open calls fail with `code`; `None` restores success.
    pub fn fail_open(&self, code: Option<i32>) {
        self.state.lock().open_failure = code;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn access(st: &State, handle: Handle, address: u32) -> Result<()> {
        if !st.open.contains(&handle) {
            return Err(SdkError::vendor_at(DEVICE_NOT_OPEN, address));
        }
        if let Some(code) = st.failures.get(&address) {
            return Err(SdkError::vendor_at(*code, address));
        }
        Ok(())
    }
}

fn coerce(ty: RegisterType, value: f64) -> f64 {
    match ty {
        RegisterType::Byte => value as u8 as f64,
        RegisterType::Uint16 => value as u16 as f64,
        RegisterType::Uint32 => value as u32 as f64,
        RegisterType::Int32 => value as i32 as f64,
        RegisterType::Float32 | RegisterType::String => value as f32 as f64,
    }
}

fn truncate_str(value: &str) -> String {
    let cap = STRING_ALLOCATION_SIZE - 1;
    if value.len() <= cap {
        return value.to_string();
    }
    let mut end = cap;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

impl Ljm for MockLjm {
    fn open(&self, spec: &OpenSpec) -> Result<Handle> {
        let mut st = self.state.lock();
        st.calls.push(MockCall::Open(spec.clone()));
        if let Some(code) = st.open_failure {
            return Err(SdkError::vendor(code));
        }
        st.next_handle += 1;
        let handle = Handle(st.next_handle);
        st.open.insert(handle);
        Ok(handle)
    }

    fn close(&self, handle: Handle) -> Result<()> {
        let mut st = self.state.lock();
        if st.open.remove(&handle) {
            Ok(())
        } else {
            Err(SdkError::vendor(DEVICE_NOT_OPEN))
        }
    }

    fn name_to_address(&self, name: &str) -> Result<(u32, RegisterType)> {
        let mut st = self.state.lock();
        st.calls.push(MockCall::NameToAddress(name.to_string()));
        st.names
            .get(name)
            .copied()
            .ok_or_else(|| SdkError::UnknownName(name.to_string()))
    }

    fn address_to_type(&self, address: u32) -> Result<RegisterType> {
        let mut st = self.state.lock();
        st.calls.push(MockCall::AddressToType(address));
        st.types
            .get(&address)
            .copied()
            .ok_or(SdkError::UnknownAddress(address))
    }

    fn read_value(&self, handle: Handle, address: u32, ty: RegisterType) -> Result<f64> {
        let mut st = self.state.lock();
        st.calls.push(MockCall::ReadValue {
            handle,
            address,
            ty,
        });
        Self::access(&st, handle, address)?;
        match st.values.get(&address) {
            None => Ok(0.0),
            Some(MockValue::Number(v)) => Ok(coerce(ty, *v)),
            Some(_) => Err(SdkError::InvalidArgument(format!(
                "register {address} does not hold a number"
            ))),
        }
    }

    fn write_value(
        &self,
        handle: Handle,
        address: u32,
        ty: RegisterType,
        value: f64,
    ) -> Result<()> {
        let mut st = self.state.lock();
        st.calls.push(MockCall::WriteValue {
            handle,
            address,
            ty,
            value,
        });
        Self::access(&st, handle, address)?;
        st.values
            .insert(address, MockValue::Number(coerce(ty, value)));
        Ok(())
    }

    fn read_string(&self, handle: Handle, address: u32) -> Result<String> {
        let mut st = self.state.lock();
        st.calls.push(MockCall::ReadString { handle, address });
        Self::access(&st, handle, address)?;
        let text = match st.values.get(&address) {
            None => String::new(),
            Some(MockValue::Text(s)) => s.clone(),
            Some(MockValue::Bytes(b)) => {
                let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
                String::from_utf8_lossy(&b[..end]).into_owned()
            }
            Some(MockValue::Number(v)) => v.to_string(),
        };
        Ok(truncate_str(&text))
    }

    fn write_string(&self, handle: Handle, address: u32, value: &str) -> Result<()> {
        let mut st = self.state.lock();
        st.calls.push(MockCall::WriteString {
            handle,
            address,
            value: value.to_string(),
        });
        Self::access(&st, handle, address)?;
        st.values
            .insert(address, MockValue::Text(truncate_str(value)));
        Ok(())
    }

    fn read_byte_array(&self, handle: Handle, address: u32, len: usize) -> Result<Vec<u8>> {
        let mut st = self.state.lock();
        st.calls.push(MockCall::ReadByteArray {
            handle,
            address,
            len,
        });
        Self::access(&st, handle, address)?;
        let stored: &[u8] = match st.values.get(&address) {
            Some(MockValue::Bytes(b)) => b,
            Some(MockValue::Text(s)) => s.as_bytes(),
            _ => &[],
        };
        let mut out = vec![0u8; len];
        let n = stored.len().min(len);
        out[..n].copy_from_slice(&stored[..n]);
        Ok(out)
    }

    fn write_byte_array(&self, handle: Handle, address: u32, bytes: &[u8]) -> Result<()> {
        let mut st = self.state.lock();
        st.calls.push(MockCall::WriteByteArray {
            handle,
            address,
            bytes: bytes.to_vec(),
        });
        Self::access(&st, handle, address)?;
        st.values.insert(address, MockValue::Bytes(bytes.to_vec()));
        Ok(())
    }

    fn handle_info(&self, handle: Handle) -> Result<HandleInfo> {
        let st = self.state.lock();
        if !st.open.contains(&handle) {
            return Err(SdkError::vendor(DEVICE_NOT_OPEN));
        }
        Ok(HandleInfo {
            device_type: 7,
            connection_type: 1,
            serial_number: 470_000_000 + handle.0,
            ip_address: 0,
            port: 0,
            max_bytes_per_mb: 64,
        })
    }

    fn error_to_string(&self, code: i32) -> String {
        match code {
            0 => "LJME_NOERROR".to_string(),
            DEVICE_NOT_OPEN => "LJME_DEVICE_NOT_OPEN".to_string(),
            _ => format!("LJM error {code}"),
        }
    }
}

#[derive(Default)]
struct U12State {
    local_id: i32,
    analog_inputs: HashMap<i32, f32>,
    analog_outputs: [f32; 2],
    digital: HashMap<(bool, i32), bool>,
}

/// An in-process U12 model. Digital outputs read back on the same line.
#[derive(Default)]
pub struct MockU12 {
    state: Mutex<U12State>,
}

impl MockU12 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local id reported when a call asks for the first found unit (`-1`).
    pub fn with_local_id(self, id: i32) -> Self {
        self.state.lock().local_id = id;
        self
    }

    pub fn set_analog_input(&self, channel: i32, voltage: f32) {
        self.state.lock().analog_inputs.insert(channel, voltage);
    }

    pub fn analog_outputs(&self) -> [f32; 2] {
        self.state.lock().analog_outputs
    }

    pub fn set_digital_line(&self, channel: i32, d_port: bool, state: bool) {
        self.state.lock().digital.insert((d_port, channel), state);
    }

    pub fn digital_line(&self, channel: i32, d_port: bool) -> bool {
        self.state
            .lock()
            .digital
            .get(&(d_port, channel))
            .copied()
            .unwrap_or(false)
    }

    fn resolve(st: &U12State, id: i32) -> i32 {
        if id < 0 {
            st.local_id
        } else {
            id
        }
    }
}

impl U12 for MockU12 {
    fn analog_in(&self, id: i32, channel: i32, gain: i32) -> Result<AnalogSample> {
        if !(0..=7).contains(&gain) {
            return Err(SdkError::InvalidArgument(format!("gain {gain}")));
        }
        let st = self.state.lock();
        let voltage = st.analog_inputs.get(&channel).copied().unwrap_or(0.0);
        Ok(AnalogSample {
            id: Self::resolve(&st, id),
            voltage,
            over_voltage: voltage.abs() > 10.0,
        })
    }

    fn analog_out(&self, id: i32, ao0: Option<f32>, ao1: Option<f32>) -> Result<i32> {
        let mut st = self.state.lock();
        if let Some(v) = ao0 {
            st.analog_outputs[0] = v;
        }
        if let Some(v) = ao1 {
            st.analog_outputs[1] = v;
        }
        Ok(Self::resolve(&st, id))
    }

    fn digital_in(&self, id: i32, channel: i32, d_port: bool) -> Result<DigitalSample> {
        let st = self.state.lock();
        Ok(DigitalSample {
            id: Self::resolve(&st, id),
            state: st.digital.get(&(d_port, channel)).copied().unwrap_or(false),
        })
    }

    fn digital_out(&self, id: i32, channel: i32, d_port: bool, state: bool) -> Result<i32> {
        let mut st = self.state.lock();
        st.digital.insert((d_port, channel), state);
        Ok(Self::resolve(&st, id))
    }
}
