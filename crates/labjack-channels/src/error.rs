use crate::ChannelId;
use labjack_sdk::SdkError;
use thiserror::Error;

pub type Result<T, E = ChannelError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChannelError {
    #[error("device channel not found: {0}")]
    NotFound(String),
    #[error("cannot resolve register {register}: {source}")]
    Resolution {
        register: String,
        #[source]
        source: SdkError,
    },
    #[error("vendor error {code}{}", at_address(.address))]
    Vendor { code: i32, address: Option<u32> },
    #[error(transparent)]
    Sdk(SdkError),
    #[error("register is not configured")]
    NotConfigured,
    #[error("device channel {0} has no open connection")]
    DeviceNotOpen(ChannelId),
    #[error("byte array length {len} outside 0..={max}")]
    LengthOutOfRange { len: f64, max: usize },
    #[error("unknown channel class: {0}")]
    UnknownClass(String),
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("channel name already in use: {0}")]
    NameTaken(String),
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("cannot parse command: {0}")]
    Parse(String),
}

impl ChannelError {
    /// Map an SDK error from a call against `address`, keeping the driver's
    /// own fault address when it reported one.
    pub fn at(err: SdkError, address: u32) -> Self {
        match err {
            SdkError::Vendor { code, address: a } => Self::Vendor {
                code,
                address: a.or(Some(address)),
            },
            other => Self::Sdk(other),
        }
    }
}

impl From<SdkError> for ChannelError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::Vendor { code, address } => Self::Vendor { code, address },
            other => Self::Sdk(other),
        }
    }
}

fn at_address(address: &Option<u32>) -> String {
    address
        .map(|a| format!(" at address {a}"))
        .unwrap_or_default()
}
