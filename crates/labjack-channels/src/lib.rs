//! LabJack devices as named, linkable host channels.
//!
//! The [`ChannelHost`] owns channel classes and instances. [`ljm`] installs
//! the `ljmdev` and `ljmreg` classes backed by a [`DeviceRegistry`] and
//! [`RegisterEntry`] values; [`u12`] installs the legacy `ljai`, `ljao`,
//! `ljdo` and `ljdi` classes. Vendor access always goes through the traits
//! in `labjack_sdk`, so every class runs against the mock backend in tests.

mod error;
pub mod host;
pub mod ljm;
pub mod loader;
mod metrics;
mod params;
pub mod register;
pub mod registry;
pub mod u12;

pub use error::{ChannelError, Result};
pub use host::{parse_command, Channel, ChannelClass, ChannelHost, ChannelId, Command, Context};
pub use metrics::MetricsHub;
pub use params::{Param, Reply};
pub use register::{
    RegisterConfig, RegisterEntry, RegisterOptions, RegisterRef, RegisterValue,
    DEFAULT_MAX_BYTE_ARRAY_LEN,
};
pub use registry::{DeviceEntry, DeviceRegistry};
