use core::fmt;
use core::str::FromStr;

pub use crate::crypto::keys::{AESKey, RootKeys, SessionKeys};
use crate::lorawan::mac::{MacError, Major};
use crate::transport::Marshaler;

/// EUI-64 identifier, stored in the usual big-endian display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EUI64([u8; 8]);

impl EUI64 {
    /// Create an EUI from display-order bytes (`01-02-..-08` is `[0x01, .., 0x08]`)
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Display-order bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Little-endian wire representation
    pub fn to_wire(&self) -> [u8; 8] {
        let mut wire = self.0;
        wire.reverse();
        wire
    }

    /// Build from the little-endian wire representation
    pub fn from_wire(mut wire: [u8; 8]) -> Self {
        wire.reverse();
        Self(wire)
    }
}

impl From<[u8; 8]> for EUI64 {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for EUI64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Device address (4 bytes), stored in big-endian display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DevAddr([u8; 4]);

impl DevAddr {
    /// Create an address from display-order bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Display-order bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Little-endian wire representation
    pub fn to_wire(&self) -> [u8; 4] {
        let mut wire = self.0;
        wire.reverse();
        wire
    }

    /// Build from the little-endian wire representation
    pub fn from_wire(mut wire: [u8; 4]) -> Self {
        wire.reverse();
        Self(wire)
    }
}

impl From<u32> for DevAddr {
    fn from(value: u32) -> Self {
        Self(value.to_be_bytes())
    }
}

impl From<DevAddr> for u32 {
    fn from(addr: DevAddr) -> Self {
        u32::from_be_bytes(addr.0)
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", u32::from(*self))
    }
}

/// LoRaWAN MAC version implemented by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacVersion {
    /// LoRaWAN 1.0.x
    V1_0,
    /// LoRaWAN 1.1
    V1_1,
}

impl FromStr for MacVersion {
    type Err = MacError;

    /// Accepts `1.0`, `1.0.x`, `1.1` and `1.1.x`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts.next().and_then(|p| p.parse::<u8>().ok());
        let minor = parts.next().and_then(|p| p.parse::<u8>().ok());
        match (major, minor) {
            (Some(1), Some(0)) => Ok(MacVersion::V1_0),
            (Some(1), Some(1)) => Ok(MacVersion::V1_1),
            (major, minor) => Err(MacError::UnsupportedVersion {
                major: major.unwrap_or(0),
                minor: minor.unwrap_or(0),
            }),
        }
    }
}

/// Device activation mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Over-the-air activation through a join handshake
    Otaa,
    /// Activation by personalization with provisioned session state
    Abp {
        /// Provisioned device address
        dev_addr: DevAddr,
        /// Provisioned session keys
        session_keys: SessionKeys,
    },
}

/// Device configuration for both OTAA and ABP activation
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device EUI (unique device identifier)
    pub dev_eui: EUI64,
    /// Join EUI (1.0: AppEUI)
    pub join_eui: EUI64,
    /// Root keys (used for OTAA)
    pub root_keys: RootKeys,
    /// Activation mode
    pub activation: Activation,
    /// Major revision written into every MHDR
    pub major: Major,
    /// MAC version
    pub mac_version: MacVersion,
    /// Envelope format handed to the transport
    pub marshaler: Marshaler,
    /// Accept downlinks whose counter does not advance (ABP testing)
    pub skip_fcnt_check: bool,
}

impl DeviceConfig {
    /// Create a new OTAA device configuration
    pub fn new_otaa(dev_eui: EUI64, join_eui: EUI64, nwk_key: AESKey, app_key: AESKey) -> Self {
        Self {
            dev_eui,
            join_eui,
            root_keys: RootKeys::new(nwk_key, app_key),
            activation: Activation::Otaa,
            major: Major::LoRaWANR1,
            mac_version: MacVersion::V1_0,
            marshaler: Marshaler::default(),
            skip_fcnt_check: false,
        }
    }

    /// Create a new ABP device configuration
    pub fn new_abp(dev_eui: EUI64, dev_addr: DevAddr, session_keys: SessionKeys) -> Self {
        Self {
            dev_eui,
            join_eui: EUI64::default(),
            // Not used in ABP
            root_keys: RootKeys::new(AESKey::new([0; 16]), AESKey::new([0; 16])),
            activation: Activation::Abp {
                dev_addr,
                session_keys,
            },
            major: Major::LoRaWANR1,
            mac_version: MacVersion::V1_0,
            marshaler: Marshaler::default(),
            skip_fcnt_check: false,
        }
    }

    /// Set the MAC version
    pub fn with_mac_version(mut self, mac_version: MacVersion) -> Self {
        self.mac_version = mac_version;
        self
    }

    /// Set the envelope marshaler
    pub fn with_marshaler(mut self, marshaler: Marshaler) -> Self {
        self.marshaler = marshaler;
        self
    }

    /// Enable or disable the downlink frame counter check
    pub fn with_skip_fcnt_check(mut self, skip: bool) -> Self {
        self.skip_fcnt_check = skip;
        self
    }

    /// Whether the device joins over the air
    pub fn is_otaa(&self) -> bool {
        matches!(self.activation, Activation::Otaa)
    }
}

/// Join handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JoinState {
    /// No session
    NotJoined,
    /// A join-request with this DevNonce was emitted
    AwaitingAccept {
        /// DevNonce carried by the pending join-request
        dev_nonce: u16,
    },
    /// Session established (OTAA accepted or ABP provisioned)
    Joined,
}

/// Session state of a device
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Current join state
    pub join_state: JoinState,
    /// Device address (assigned during activation)
    pub dev_addr: DevAddr,
    /// MAC version in effect for this session (1.1 only after OptNeg)
    pub mac_version: MacVersion,
    /// Session keys, present once activated
    pub keys: Option<SessionKeys>,
    /// Last used uplink frame counter
    pub fcnt_up: u32,
    /// Last accepted downlink frame counter, `None` before the first one
    pub fcnt_down: Option<u32>,
    /// Last used device nonce
    pub dev_nonce: u16,
    /// Last accepted join nonce
    pub join_nonce: Option<u32>,
    /// Home NetID from the last join-accept
    pub net_id: u32,
    /// RX1 delay in seconds
    pub rx1_delay: u8,
    /// RX1 data rate offset from the last join-accept
    pub rx1_dr_offset: u8,
    /// RX2 data rate from the last join-accept
    pub rx2_data_rate: u8,
    /// FCnt of a confirmed downlink the next uplink must acknowledge
    pub ack_pending: Option<u32>,
    /// FCnt of the last confirmed uplink awaiting acknowledgement
    pub confirmed_uplink: Option<u32>,
}

impl SessionState {
    /// Create an empty session state for a device that has not joined
    pub fn new() -> Self {
        Self {
            join_state: JoinState::NotJoined,
            dev_addr: DevAddr::default(),
            mac_version: MacVersion::V1_0,
            keys: None,
            fcnt_up: 0,
            fcnt_down: None,
            dev_nonce: 0,
            join_nonce: None,
            net_id: 0,
            rx1_delay: 1,
            rx1_dr_offset: 0,
            rx2_data_rate: 0,
            ack_pending: None,
            confirmed_uplink: None,
        }
    }

    /// Create a new session state for ABP activation
    pub fn new_abp(dev_addr: DevAddr, keys: SessionKeys, mac_version: MacVersion) -> Self {
        Self {
            join_state: JoinState::Joined,
            dev_addr,
            mac_version,
            keys: Some(keys),
            ..Self::new()
        }
    }

    /// Whether a session is established
    pub fn is_joined(&self) -> bool {
        self.join_state == JoinState::Joined
    }

    /// Reset the per-session counters and acknowledgement state
    pub fn reset_counters(&mut self) {
        self.fcnt_up = 0;
        self.fcnt_down = None;
        self.ack_pending = None;
        self.confirmed_uplink = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
