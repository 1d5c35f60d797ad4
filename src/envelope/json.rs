//! Legacy gateway-bridge JSON envelopes

#![allow(non_snake_case, missing_docs)]

use serde::{Deserialize, Serialize};

use super::base64_bytes;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct LoRaModulationInfo {
    /// Bandwidth in kHz
    pub bandwidth: u32,
    pub spreadingFactor: u32,
    pub codeRate: String,
    pub polarizationInversion: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct UplinkTxInfo {
    pub frequency: u32,
    pub modulation: String,
    pub loRaModulationInfo: LoRaModulationInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct UplinkRxInfo {
    pub gatewayID: String,
    pub rssi: i32,
    pub loRaSNR: f32,
    pub channel: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct UplinkFrame {
    #[serde(with = "base64_bytes")]
    pub phyPayload: Vec<u8>,
    pub txInfo: UplinkTxInfo,
    pub rxInfo: UplinkRxInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DownlinkTxInfo {
    pub gatewayID: String,
    pub frequency: u32,
    pub power: i32,
    pub modulation: String,
    pub loRaModulationInfo: LoRaModulationInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DownlinkFrame {
    #[serde(with = "base64_bytes")]
    pub phyPayload: Vec<u8>,
    pub txInfo: DownlinkTxInfo,
    pub token: u32,
}
