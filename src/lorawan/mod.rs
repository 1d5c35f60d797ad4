//! LoRaWAN protocol implementation
//!
//! This module contains the core LoRaWAN protocol implementation, including:
//! - Frame encoding and the error taxonomy
//! - Join-request / join-accept handling
//! - Uplink assembly and downlink validation
//! - Regional band plans and MAC commands

/// MAC command handling
pub mod commands;

/// Downlink validation and decoding
pub mod downlink;

/// OTAA join handshake
pub mod join;

/// MAC frame layout and errors
pub mod mac;

/// Join frame layouts
pub mod phy;

/// Regional parameters and configurations
pub mod region;

/// Uplink assembly
pub mod uplink;

pub use downlink::{DataDownlink, Downlink, DownlinkProcessor};
pub use join::{JoinAccept, JoinProcedure};
pub use mac::{EncodingError, MacError, UplinkBuildError};
pub use uplink::{BuiltUplink, Uplink, UplinkBuilder};
