//! Transport seam between the protocol engine and the gateway bridge
//!
//! The engine hands a fully built PHY payload, its radio parameters and the
//! selected [`Marshaler`] to a [`Transport`]. Connection management (MQTT,
//! UDP forwarder) lives behind the trait.

/// Transmit parameters, marshaler selection and the transport trait
pub mod traits;

pub use traits::{Marshaler, ModulationParams, Transport, TxParams, UnknownMarshaler};
