use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::device::{AESKey, DevAddr, DeviceConfig, MacVersion, SessionKeys, EUI64};
use crate::lorawan::mac::{MacError, Major};
use crate::transport::Marshaler;

/// Configuration file error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML syntax or schema error
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    /// Identifier or key is not valid hex of the right length
    #[error("field `{field}` is not valid hex: {source}")]
    Hex {
        /// Offending field
        field: &'static str,
        /// Decoder error
        source: hex::FromHexError,
    },
    /// Unsupported MAC version or major revision
    #[error(transparent)]
    Version(#[from] MacError),
    /// Unknown envelope marshaler
    #[error("unknown marshaler `{0}`")]
    UnknownMarshaler(String),
    /// ABP activation without an `[device.abp]` section
    #[error("ABP activation requires a [device.abp] section")]
    MissingAbpSession,
    /// OTAA root key absent
    #[error("OTAA activation requires `{0}`")]
    MissingKey(&'static str),
    /// ABP 1.1 session keys only partly given
    #[error("ABP session needs either nwk_s_key or all three 1.1 network keys")]
    IncompleteAbpKeys,
}

/// Activation mode as written in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationKind {
    /// Over-the-air activation
    Otaa,
    /// Activation by personalization
    Abp,
}

/// Band plan named in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BandName {
    /// EU863-870
    EU868,
    /// US902-928
    US915,
}

/// Parsed configuration file
///
/// ```toml
/// [device]
/// dev_eui = "0102030405060708"
/// join_eui = "0000000000000000"
/// nwk_key = "00000000000000000000000000000000"
/// app_key = "00000000000000000000000000000000"
/// mac_version = "1.0.3"
/// marshaler = "protobuf"
///
/// [band]
/// region = "EU868"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Device section
    pub device: DeviceSection,
    /// Band section
    #[serde(default)]
    pub band: BandSection,
}

/// `[device]` section
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSection {
    /// Hex DevEUI
    pub dev_eui: String,
    /// Hex JoinEUI
    #[serde(default = "zero_eui")]
    pub join_eui: String,
    /// Hex NwkKey (1.0: AppKey); required for OTAA
    #[serde(default)]
    pub nwk_key: Option<String>,
    /// Hex AppKey; required for OTAA 1.1
    #[serde(default)]
    pub app_key: Option<String>,
    /// `1.0`, `1.0.x`, `1.1` or `1.1.x`
    #[serde(default = "default_mac_version")]
    pub mac_version: String,
    /// Major revision, 0 for LoRaWAN R1
    #[serde(default)]
    pub major: u8,
    /// `otaa` or `abp`
    #[serde(default = "default_activation")]
    pub activation: ActivationKind,
    /// `json`, `protobuf` or `json_protobuf`
    #[serde(default = "default_marshaler")]
    pub marshaler: String,
    /// Disable the downlink counter check
    #[serde(default)]
    pub skip_fcnt_check: bool,
    /// ABP session
    #[serde(default)]
    pub abp: Option<AbpSection>,
}

/// `[device.abp]` section
#[derive(Debug, Clone, Deserialize)]
pub struct AbpSection {
    /// Hex DevAddr
    pub dev_addr: String,
    /// Hex 1.0 NwkSKey
    #[serde(default)]
    pub nwk_s_key: Option<String>,
    /// Hex FNwkSIntKey (1.1)
    #[serde(default)]
    pub f_nwk_s_int_key: Option<String>,
    /// Hex SNwkSIntKey (1.1)
    #[serde(default)]
    pub s_nwk_s_int_key: Option<String>,
    /// Hex NwkSEncKey (1.1)
    #[serde(default)]
    pub nwk_s_enc_key: Option<String>,
    /// Hex AppSKey
    pub app_s_key: String,
}

/// `[band]` section
#[derive(Debug, Clone, Deserialize)]
pub struct BandSection {
    /// Band plan
    pub region: BandName,
}

impl Default for BandSection {
    fn default() -> Self {
        Self {
            region: BandName::EU868,
        }
    }
}

fn zero_eui() -> String {
    "0000000000000000".into()
}

fn default_mac_version() -> String {
    "1.0".into()
}

fn default_activation() -> ActivationKind {
    ActivationKind::Otaa
}

fn default_marshaler() -> String {
    Marshaler::Json.as_str().into()
}

fn decode_hex<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], ConfigError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(value.trim(), &mut out)
        .map_err(|source| ConfigError::Hex { field, source })?;
    Ok(out)
}

fn decode_key(field: &'static str, value: Option<&String>) -> Result<AESKey, ConfigError> {
    let value = value.ok_or(ConfigError::MissingKey(field))?;
    Ok(AESKey::new(decode_hex(field, value)?))
}

impl ConfigFile {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Band plan named in the file
    pub fn band(&self) -> BandName {
        self.band.region
    }

    /// Build the device configuration
    pub fn device_config(&self) -> Result<DeviceConfig, ConfigError> {
        let d = &self.device;
        let mac_version: MacVersion = d.mac_version.parse()?;
        let major = match d.major {
            0 => Major::LoRaWANR1,
            other => {
                return Err(MacError::UnsupportedVersion {
                    major: other,
                    minor: 0,
                }
                .into())
            }
        };
        let marshaler: Marshaler = d
            .marshaler
            .parse()
            .map_err(|_| ConfigError::UnknownMarshaler(d.marshaler.clone()))?;
        let dev_eui = EUI64::new(decode_hex("dev_eui", &d.dev_eui)?);

        let mut config = match d.activation {
            ActivationKind::Otaa => {
                let nwk_key = decode_key("nwk_key", d.nwk_key.as_ref())?;
                // 1.0 derives every session key from the NwkKey slot
                let app_key = match (mac_version, &d.app_key) {
                    (MacVersion::V1_0, None) => nwk_key.clone(),
                    (_, app_key) => decode_key("app_key", app_key.as_ref())?,
                };
                DeviceConfig::new_otaa(
                    dev_eui,
                    EUI64::new(decode_hex("join_eui", &d.join_eui)?),
                    nwk_key,
                    app_key,
                )
            }
            ActivationKind::Abp => {
                let abp = d.abp.as_ref().ok_or(ConfigError::MissingAbpSession)?;
                DeviceConfig::new_abp(
                    dev_eui,
                    DevAddr::new(decode_hex("dev_addr", &abp.dev_addr)?),
                    abp.session_keys()?,
                )
            }
        };
        config.major = major;
        Ok(config
            .with_mac_version(mac_version)
            .with_marshaler(marshaler)
            .with_skip_fcnt_check(d.skip_fcnt_check))
    }
}

impl AbpSection {
    fn session_keys(&self) -> Result<SessionKeys, ConfigError> {
        let app_s_key = AESKey::new(decode_hex("app_s_key", &self.app_s_key)?);
        match (
            &self.nwk_s_key,
            &self.f_nwk_s_int_key,
            &self.s_nwk_s_int_key,
            &self.nwk_s_enc_key,
        ) {
            (Some(nwk), None, None, None) => Ok(SessionKeys::new_v1_0(
                AESKey::new(decode_hex("nwk_s_key", nwk)?),
                app_s_key,
            )),
            (None, Some(f), Some(s), Some(enc)) => Ok(SessionKeys::new_v1_1(
                AESKey::new(decode_hex("f_nwk_s_int_key", f)?),
                AESKey::new(decode_hex("s_nwk_s_int_key", s)?),
                AESKey::new(decode_hex("nwk_s_enc_key", enc)?),
                app_s_key,
            )),
            _ => Err(ConfigError::IncompleteAbpKeys),
        }
    }
}
