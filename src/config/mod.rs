//! Device and network configuration
//!
//! This module contains types and functions for configuring LoRaWAN devices
//! and network parameters. It includes:
//! - Device configuration (DevEUI, JoinEUI, keys, activation, version)
//! - Session state management
//! - TOML configuration files (`std`)

/// Device configuration and session state
pub mod device;

/// TOML configuration files
#[cfg(feature = "std")]
pub mod file;

pub use device::{DeviceConfig, SessionState};
#[cfg(feature = "std")]
pub use file::{ConfigError, ConfigFile};
