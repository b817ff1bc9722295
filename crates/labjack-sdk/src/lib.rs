//! labjack-sdk: blocking abstractions over the LabJack driver libraries
//!
//! This crate provides traits and types for talking to LabJack devices through the
//! LJM library (T-series) and the legacy U12 driver. Backends are feature-gated: the
//! default build enables a `mock` backend so that binaries and tests run on any host
//! without the vendor libraries installed.

mod types;
pub use types::{
    AnalogSample, DigitalSample, Handle, HandleInfo, OpenSpec, RegisterType,
    STRING_ALLOCATION_SIZE,
};

mod error;
pub use error::{Result, SdkError};

mod traits;
pub use traits::{Ljm, U12};

pub mod diag;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockCall, MockLjm, MockU12, MockValue};

#[cfg(feature = "ljm")]
mod ljm;

#[cfg(feature = "ljm")]
pub use ljm::LjmLibrary;

#[cfg(all(feature = "u12", windows))]
mod u12;

#[cfg(all(feature = "u12", windows))]
pub use u12::U12Library;
