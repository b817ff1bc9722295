use thiserror::Error;

pub type Result<T, E = SdkError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SdkError {
    /// Non-success status returned by a vendor call.
    #[error("vendor error {code}{}", fmt_address(.address))]
    Vendor { code: i32, address: Option<u32> },
    #[error("unknown register name: {0}")]
    UnknownName(String),
    #[error("unknown register address: {0}")]
    UnknownAddress(u32),
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SdkError {
    pub fn vendor(code: i32) -> Self {
        Self::Vendor {
            code,
            address: None,
        }
    }

    pub fn vendor_at(code: i32, address: u32) -> Self {
        Self::Vendor {
            code,
            address: Some(address),
        }
    }

    /// Vendor status code, if this error came from the driver.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Vendor { code, .. } => Some(*code),
            _ => None,
        }
    }
}

fn fmt_address(address: &Option<u32>) -> String {
    address
        .map(|a| format!(" at address {a}"))
        .unwrap_or_default()
}
