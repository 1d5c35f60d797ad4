//! Gateway-bridge protobuf messages
//!
//! Hand-declared `prost` messages mirroring the bridge's `UplinkFrame` and
//! `DownlinkFrame`. The same structs serialize to protobuf JSON (camelCase,
//! base64 bytes) through `serde`.

use serde::{Deserialize, Serialize};

use super::base64_bytes;

/// LoRa modulation info
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoraModulationInfo {
    /// Bandwidth in Hz
    #[prost(uint32, tag = "1")]
    pub bandwidth: u32,
    /// Spreading factor
    #[prost(uint32, tag = "2")]
    pub spreading_factor: u32,
    /// Coding rate, e.g. `4/5`
    #[prost(string, tag = "3")]
    pub code_rate: String,
    /// IQ inversion
    #[prost(bool, tag = "4")]
    pub polarization_inversion: bool,
}

/// Modulation wrapper
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Modulation {
    /// LoRa parameters
    #[prost(message, optional, tag = "3")]
    pub lora: Option<LoraModulationInfo>,
}

/// Uplink transmission info
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UplinkTxInfo {
    /// Frequency in Hz
    #[prost(uint32, tag = "1")]
    pub frequency: u32,
    /// Modulation
    #[prost(message, optional, tag = "2")]
    pub modulation: Option<Modulation>,
}

/// Uplink reception info
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UplinkRxInfo {
    /// Hex gateway ID
    #[prost(string, tag = "1")]
    pub gateway_id: String,
    /// Uplink ID
    #[prost(uint32, tag = "2")]
    pub uplink_id: u32,
    /// RSSI in dBm
    #[prost(int32, tag = "5")]
    pub rssi: i32,
    /// SNR in dB
    #[prost(float, tag = "6")]
    pub snr: f32,
    /// Channel index
    #[prost(uint32, tag = "7")]
    pub channel: u32,
}

/// Uplink frame published by a gateway bridge
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UplinkFrame {
    /// PHY payload
    #[prost(bytes = "vec", tag = "1")]
    #[serde(with = "base64_bytes")]
    pub phy_payload: Vec<u8>,
    /// Transmission info
    #[prost(message, optional, tag = "4")]
    pub tx_info: Option<UplinkTxInfo>,
    /// Reception info
    #[prost(message, optional, tag = "5")]
    pub rx_info: Option<UplinkRxInfo>,
}

/// Downlink transmission info
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownlinkTxInfo {
    /// Frequency in Hz
    #[prost(uint32, tag = "1")]
    pub frequency: u32,
    /// Power in dBm
    #[prost(int32, tag = "2")]
    pub power: i32,
    /// Modulation
    #[prost(message, optional, tag = "3")]
    pub modulation: Option<Modulation>,
}

/// One transmission option of a downlink
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownlinkFrameItem {
    /// PHY payload
    #[prost(bytes = "vec", tag = "1")]
    #[serde(with = "base64_bytes")]
    pub phy_payload: Vec<u8>,
    /// Transmission info
    #[prost(message, optional, tag = "3")]
    pub tx_info: Option<DownlinkTxInfo>,
}

/// Downlink frame sent by the network server
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownlinkFrame {
    /// Downlink ID
    #[prost(uint32, tag = "3")]
    pub downlink_id: u32,
    /// Transmission options (RX1, RX2)
    #[prost(message, repeated, tag = "5")]
    pub items: Vec<DownlinkFrameItem>,
    /// Hex gateway ID
    #[prost(string, tag = "7")]
    pub gateway_id: String,
}
