use crate::{
    AnalogSample, DigitalSample, Handle, HandleInfo, OpenSpec, RegisterType, Result, SdkError,
};

/// A minimal blocking interface to the LJM library.
///
/// Every call is a blocking foreign call. Implementations must be shareable across
/// threads, but a single handle is not safe for concurrent use: callers serialize
/// access per handle.
pub trait Ljm: Send + Sync {
    /// Open a device by type, connection and identifier strings.
    fn open(&self, spec: &OpenSpec) -> Result<Handle>;

    /// Close a previously opened handle.
    fn close(&self, _handle: Handle) -> Result<()> {
        Err(SdkError::Unsupported("close not supported"))
    }

    /// Resolve a register name to its address and wire type.
    fn name_to_address(&self, name: &str) -> Result<(u32, RegisterType)>;

    /// Infer the wire type of a numeric register address.
    fn address_to_type(&self, address: u32) -> Result<RegisterType>;

    fn read_value(&self, handle: Handle, address: u32, ty: RegisterType) -> Result<f64>;

    fn write_value(&self, handle: Handle, address: u32, ty: RegisterType, value: f64)
        -> Result<()>;

    /// Read a fixed-capacity string register.
    fn read_string(&self, handle: Handle, address: u32) -> Result<String>;

    /// Write a fixed-capacity string register.
    fn write_string(&self, handle: Handle, address: u32, value: &str) -> Result<()>;

    /// Read exactly `len` raw bytes starting at `address`.
    fn read_byte_array(&self, handle: Handle, address: u32, len: usize) -> Result<Vec<u8>>;

    fn write_byte_array(&self, handle: Handle, address: u32, bytes: &[u8]) -> Result<()>;

    fn handle_info(&self, _handle: Handle) -> Result<HandleInfo> {
        Err(SdkError::Unsupported("handle info not supported"))
    }

    /// Human readable name of a status code.
    fn error_to_string(&self, code: i32) -> String {
        format!("LJM error {code}")
    }
}

/// The four U12 driver entry points used by the analog and digital channels.
///
/// `id` is the local id of the unit; `-1` selects the first unit found.
pub trait U12: Send + Sync {
    fn analog_in(&self, id: i32, channel: i32, gain: i32) -> Result<AnalogSample>;

    /// Set analog outputs; `None` leaves that output unchanged.
    fn analog_out(&self, id: i32, ao0: Option<f32>, ao1: Option<f32>) -> Result<i32>;

    /// Sample one digital line. `d_port` selects the D lines instead of IO.
    fn digital_in(&self, id: i32, channel: i32, d_port: bool) -> Result<DigitalSample>;

    fn digital_out(&self, id: i32, channel: i32, d_port: bool, state: bool) -> Result<i32>;
}
