use core::fmt;
use core::str::FromStr;

/// LoRa modulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModulationParams {
    /// Spreading factor (SF7-SF12)
    pub spreading_factor: u8,
    /// Bandwidth in Hz
    pub bandwidth: u32,
    /// Coding rate denominator (4/5 is 5)
    pub coding_rate: u8,
}

impl ModulationParams {
    /// LoRa modulation with coding rate 4/5
    pub const fn lora(spreading_factor: u8, bandwidth: u32) -> Self {
        Self {
            spreading_factor,
            bandwidth,
            coding_rate: 5,
        }
    }
}

/// Transmission parameters of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxParams {
    /// Frequency in Hz
    pub frequency: u32,
    /// Transmission power in dBm
    pub power: i8,
    /// Modulation parameters
    pub modulation: ModulationParams,
}

impl TxParams {
    /// Parameters at 14 dBm
    pub const fn new(frequency: u32, modulation: ModulationParams) -> Self {
        Self {
            frequency,
            power: 14,
            modulation,
        }
    }
}

/// Envelope format wrapped around the PHY payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Marshaler {
    /// Plain JSON envelope
    #[default]
    Json,
    /// Protobuf binary envelope
    Protobuf,
    /// JSON rendering of the protobuf schema
    JsonProtobuf,
}

impl Marshaler {
    /// Configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            Marshaler::Json => "json",
            Marshaler::Protobuf => "protobuf",
            Marshaler::JsonProtobuf => "json_protobuf",
        }
    }
}

impl fmt::Display for Marshaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised marshaler name
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown marshaler")]
pub struct UnknownMarshaler;

impl FromStr for Marshaler {
    type Err = UnknownMarshaler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Marshaler::Json),
            "protobuf" => Ok(Marshaler::Protobuf),
            "json_protobuf" | "json-protobuf" => Ok(Marshaler::JsonProtobuf),
            _ => Err(UnknownMarshaler),
        }
    }
}

/// Sink for built frames
pub trait Transport {
    /// Error type for send operations
    type Error;

    /// Send a serialized PHY payload, wrapped in the envelope `marshaler` selects
    fn send(
        &mut self,
        phy_payload: &[u8],
        tx: &TxParams,
        marshaler: Marshaler,
    ) -> Result<(), Self::Error>;
}
