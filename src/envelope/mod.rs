//! Gateway-bridge envelope codecs
//!
//! Pure functions wrapping an already built PHY payload for the gateway
//! bridge and unwrapping downlinks from it. The [`Marshaler`] only selects
//! the envelope format; the LoRaWAN bytes pass through untouched.

pub mod json;
pub mod proto;

use base64::Engine;

use crate::config::device::EUI64;
use crate::transport::{Marshaler, ModulationParams, TxParams};

/// Envelope encoding or decoding failure
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// JSON error
    #[error("json envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// Protobuf decode error
    #[error("protobuf envelope: {0}")]
    Protobuf(#[from] prost::DecodeError),
    /// Downlink without any transmission item
    #[error("downlink envelope carries no frame")]
    Empty,
}

/// Reception metadata reported alongside an uplink
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxMetadata {
    /// Receiving gateway
    pub gateway_id: EUI64,
    /// Uplink ID
    pub uplink_id: u32,
    /// RSSI in dBm
    pub rssi: i32,
    /// SNR in dB
    pub snr: f32,
    /// Channel index
    pub channel: u32,
}

impl Default for RxMetadata {
    fn default() -> Self {
        Self {
            gateway_id: EUI64::default(),
            uplink_id: 0,
            rssi: -50,
            snr: 5.5,
            channel: 0,
        }
    }
}

/// Downlink unwrapped from an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedDownlink {
    /// PHY payload of the first transmission option
    pub phy_payload: Vec<u8>,
    /// Frequency in Hz
    pub frequency: u32,
    /// Downlink ID or token
    pub downlink_id: u32,
}

pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

fn code_rate(modulation: &ModulationParams) -> String {
    format!("4/{}", modulation.coding_rate)
}

fn proto_modulation(modulation: &ModulationParams) -> proto::Modulation {
    proto::Modulation {
        lora: Some(proto::LoraModulationInfo {
            bandwidth: modulation.bandwidth,
            spreading_factor: modulation.spreading_factor as u32,
            code_rate: code_rate(modulation),
            polarization_inversion: false,
        }),
    }
}

fn json_modulation(modulation: &ModulationParams, downlink: bool) -> json::LoRaModulationInfo {
    json::LoRaModulationInfo {
        bandwidth: modulation.bandwidth / 1000,
        spreadingFactor: modulation.spreading_factor as u32,
        codeRate: code_rate(modulation),
        polarizationInversion: downlink,
    }
}

/// Build the protobuf uplink message
pub fn uplink_frame(phy_payload: &[u8], tx: &TxParams, rx: &RxMetadata) -> proto::UplinkFrame {
    proto::UplinkFrame {
        phy_payload: phy_payload.to_vec(),
        tx_info: Some(proto::UplinkTxInfo {
            frequency: tx.frequency,
            modulation: Some(proto_modulation(&tx.modulation)),
        }),
        rx_info: Some(proto::UplinkRxInfo {
            gateway_id: rx.gateway_id.to_string(),
            uplink_id: rx.uplink_id,
            rssi: rx.rssi,
            snr: rx.snr,
            channel: rx.channel,
        }),
    }
}

/// Wrap an uplink PHY payload in the envelope `marshaler` selects
pub fn encode_uplink(
    marshaler: Marshaler,
    phy_payload: &[u8],
    tx: &TxParams,
    rx: &RxMetadata,
) -> Result<Vec<u8>, EnvelopeError> {
    match marshaler {
        Marshaler::Json => {
            let frame = json::UplinkFrame {
                phyPayload: phy_payload.to_vec(),
                txInfo: json::UplinkTxInfo {
                    frequency: tx.frequency,
                    modulation: "LORA".into(),
                    loRaModulationInfo: json_modulation(&tx.modulation, false),
                },
                rxInfo: json::UplinkRxInfo {
                    gatewayID: rx.gateway_id.to_string(),
                    rssi: rx.rssi,
                    loRaSNR: rx.snr,
                    channel: rx.channel,
                },
            };
            Ok(serde_json::to_vec(&frame)?)
        }
        Marshaler::Protobuf => {
            Ok(prost::Message::encode_to_vec(&uplink_frame(phy_payload, tx, rx)))
        }
        Marshaler::JsonProtobuf => Ok(serde_json::to_vec(&uplink_frame(phy_payload, tx, rx))?),
    }
}

/// Recover the PHY payload from an uplink envelope
pub fn decode_uplink(marshaler: Marshaler, bytes: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    match marshaler {
        Marshaler::Json => Ok(serde_json::from_slice::<json::UplinkFrame>(bytes)?.phyPayload),
        Marshaler::Protobuf => {
            Ok(<proto::UplinkFrame as prost::Message>::decode(bytes)?.phy_payload)
        }
        Marshaler::JsonProtobuf => {
            Ok(serde_json::from_slice::<proto::UplinkFrame>(bytes)?.phy_payload)
        }
    }
}

/// Wrap a downlink PHY payload the way a network server does
pub fn encode_downlink(
    marshaler: Marshaler,
    phy_payload: &[u8],
    tx: &TxParams,
    gateway_id: EUI64,
    downlink_id: u32,
) -> Result<Vec<u8>, EnvelopeError> {
    match marshaler {
        Marshaler::Json => {
            let frame = json::DownlinkFrame {
                phyPayload: phy_payload.to_vec(),
                txInfo: json::DownlinkTxInfo {
                    gatewayID: gateway_id.to_string(),
                    frequency: tx.frequency,
                    power: tx.power as i32,
                    modulation: "LORA".into(),
                    loRaModulationInfo: json_modulation(&tx.modulation, true),
                },
                token: downlink_id,
            };
            Ok(serde_json::to_vec(&frame)?)
        }
        Marshaler::Protobuf | Marshaler::JsonProtobuf => {
            let frame = proto::DownlinkFrame {
                downlink_id,
                items: vec![proto::DownlinkFrameItem {
                    phy_payload: phy_payload.to_vec(),
                    tx_info: Some(proto::DownlinkTxInfo {
                        frequency: tx.frequency,
                        power: tx.power as i32,
                        modulation: Some(proto_modulation(&tx.modulation)),
                    }),
                }],
                gateway_id: gateway_id.to_string(),
            };
            if marshaler == Marshaler::Protobuf {
                Ok(prost::Message::encode_to_vec(&frame))
            } else {
                Ok(serde_json::to_vec(&frame)?)
            }
        }
    }
}

/// Unwrap a downlink envelope
pub fn decode_downlink(
    marshaler: Marshaler,
    bytes: &[u8],
) -> Result<ReceivedDownlink, EnvelopeError> {
    let frame = match marshaler {
        Marshaler::Json => {
            let frame: json::DownlinkFrame = serde_json::from_slice(bytes)?;
            return Ok(ReceivedDownlink {
                phy_payload: frame.phyPayload,
                frequency: frame.txInfo.frequency,
                downlink_id: frame.token,
            });
        }
        Marshaler::Protobuf => <proto::DownlinkFrame as prost::Message>::decode(bytes)?,
        Marshaler::JsonProtobuf => serde_json::from_slice::<proto::DownlinkFrame>(bytes)?,
    };

    let downlink_id = frame.downlink_id;
    let item = frame.items.into_iter().next().ok_or(EnvelopeError::Empty)?;
    Ok(ReceivedDownlink {
        frequency: item.tx_info.map(|tx| tx.frequency).unwrap_or(0),
        phy_payload: item.phy_payload,
        downlink_id,
    })
}

/// Base64 text of a PHY payload, as shown in bridge logs
pub fn phy_payload_base64(phy_payload: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(phy_payload)
}
