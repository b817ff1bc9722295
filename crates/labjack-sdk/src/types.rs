use core::fmt;

/// Capacity of the fixed-size string path, terminator included.
pub const STRING_ALLOCATION_SIZE: usize = 50;

/// Opaque vendor-issued identifier for an open device connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Handle(pub i32);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire type of a register, with the LJM numeric codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RegisterType {
    Uint16,
    Uint32,
    Int32,
    Float32,
    String,
    Byte,
}

impl RegisterType {
    pub fn raw(self) -> i32 {
        match self {
            Self::Uint16 => 0,
            Self::Uint32 => 1,
            Self::Int32 => 2,
            Self::Float32 => 3,
            Self::String => 98,
            Self::Byte => 99,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Uint16),
            1 => Some(Self::Uint32),
            2 => Some(Self::Int32),
            3 => Some(Self::Float32),
            98 => Some(Self::String),
            99 => Some(Self::Byte),
            _ => None,
        }
    }

    /// Parse one of the type-override tokens accepted at register setup.
    ///
    /// `BYTE_ARRAY` is an alias of `LJM_STRING`: a string register whose
    /// contents are moved as raw bytes when a length register is configured.
    pub fn from_override_token(token: &str) -> Option<Self> {
        match token {
            "LJM_STRING" | "BYTE_ARRAY" => Some(Self::String),
            "LJM_BYTE" => Some(Self::Byte),
            "LJM_UINT16" => Some(Self::Uint16),
            "LJM_UINT32" => Some(Self::Uint32),
            "LJM_INT32" => Some(Self::Int32),
            "LJM_FLOAT32" => Some(Self::Float32),
            _ => None,
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uint16 => "LJM_UINT16",
            Self::Uint32 => "LJM_UINT32",
            Self::Int32 => "LJM_INT32",
            Self::Float32 => "LJM_FLOAT32",
            Self::String => "LJM_STRING",
            Self::Byte => "LJM_BYTE",
        };
        f.write_str(name)
    }
}

/// Device selectors passed to the vendor open call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenSpec {
    pub device_type: String,
    pub connection_type: String,
    pub identifier: String,
}

impl OpenSpec {
    pub fn new(
        device_type: impl Into<String>,
        connection_type: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            device_type: device_type.into(),
            connection_type: connection_type.into(),
            identifier: identifier.into(),
        }
    }

    /// First found device of any type, on any connection.
    pub fn any() -> Self {
        Self::new("LJM_dtANY", "LJM_ctANY", "LJM_idANY")
    }
}

impl Default for OpenSpec {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for OpenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.device_type, self.connection_type, self.identifier
        )
    }
}

/// Connection details reported for an open handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandleInfo {
    pub device_type: i32,
    pub connection_type: i32,
    pub serial_number: i32,
    pub ip_address: i32,
    pub port: i32,
    pub max_bytes_per_mb: i32,
}

/// One U12 analog input conversion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalogSample {
    /// Local id of the unit that answered.
    pub id: i32,
    pub voltage: f32,
    pub over_voltage: bool,
}

/// One U12 digital line sample.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DigitalSample {
    pub id: i32,
    pub state: bool,
}
