//! LoRaWAN end-device protocol engine in Rust
//!
//! This crate implements the device side of LoRaWAN 1.0.x and 1.1 as used by a
//! device simulator talking to a network server through a gateway bridge.
//! It performs the OTAA join handshake, derives session keys, builds and
//! authenticates uplinks, validates and decrypts downlinks, and keeps the
//! frame counters and nonces in an external [`store::CounterStore`] so they
//! survive restarts.
//!
//! # Features
//! - OTAA and ABP activation
//! - LoRaWAN 1.0.x and 1.1 MIC, encryption and key derivation
//! - Persistent counter/nonce state with per-identity locking
//! - EU868 and US915 band plans for 1.1 MIC index resolution
//! - JSON, Protobuf and JSON-via-Protobuf gateway envelopes (`std`)
//! - No unsafe code
//!
//! # Example
//! ```no_run
//! use lorawan_sim::{
//!     config::device::{AESKey, DeviceConfig, EUI64},
//!     device::Device,
//!     lorawan::{region::EU868, uplink::Uplink},
//!     store::memory::MemoryStore,
//!     transport::{ModulationParams, TxParams},
//! };
//!
//! let config = DeviceConfig::new_otaa(
//!     EUI64::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]),
//!     EUI64::new([0x00; 8]),
//!     AESKey::new([0x00; 16]),
//!     AESKey::new([0x00; 16]),
//! );
//! let mut device = Device::new(config, MemoryStore::new(), EU868::new()).unwrap();
//!
//! // Join request bytes, ready for the gateway bridge
//! let join_request = device.build_join_request().unwrap();
//! # let join_accept: &[u8] = &[];
//! device.process_downlink(join_accept).unwrap();
//!
//! let tx = TxParams::new(868_100_000, ModulationParams::lora(7, 125_000));
//! let uplink = device.build_uplink(&Uplink::new(Some(1), b"Hello, LoRaWAN!", tx)).unwrap();
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]

/// Device and network configuration
pub mod config;

/// Cryptographic functions and key material
pub mod crypto;

/// High-level device interface
pub mod device;

/// Gateway-bridge envelope codecs
#[cfg(feature = "std")]
pub mod envelope;

/// LoRaWAN protocol implementation
pub mod lorawan;

/// Frame counter and nonce persistence
pub mod store;

/// Transport abstraction for built frames
pub mod transport;
