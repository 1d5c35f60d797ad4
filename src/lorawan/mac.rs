use heapless::Vec;

use crate::config::device::DevAddr;
use crate::crypto::{CryptoError, MIC_SIZE};
use crate::store::StoreError;

use super::region::RegionError;

/// Maximum MAC payload size
pub const MAX_MAC_PAYLOAD_SIZE: usize = 242;

/// Maximum PHY payload size
pub const MAX_PHY_PAYLOAD_SIZE: usize = 256;

/// Maximum FOpts length
pub const MAX_FOPTS_LEN: usize = 15;

/// Buffer holding a complete PHY payload
pub type PhyBuffer = Vec<u8, MAX_PHY_PAYLOAD_SIZE>;

/// MAC header types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MType {
    /// Join request
    JoinRequest = 0x00,
    /// Join accept
    JoinAccept = 0x20,
    /// Unconfirmed data uplink
    UnconfirmedDataUp = 0x40,
    /// Unconfirmed data downlink
    UnconfirmedDataDown = 0x60,
    /// Confirmed data uplink
    ConfirmedDataUp = 0x80,
    /// Confirmed data downlink
    ConfirmedDataDown = 0xA0,
    /// Rejoin request
    RejoinRequest = 0xC0,
    /// Proprietary
    Proprietary = 0xE0,
}

impl MType {
    /// Extract the message type from an MHDR byte
    pub fn from_mhdr(mhdr: u8) -> Self {
        match mhdr & 0xE0 {
            0x00 => MType::JoinRequest,
            0x20 => MType::JoinAccept,
            0x40 => MType::UnconfirmedDataUp,
            0x60 => MType::UnconfirmedDataDown,
            0x80 => MType::ConfirmedDataUp,
            0xA0 => MType::ConfirmedDataDown,
            0xC0 => MType::RejoinRequest,
            _ => MType::Proprietary,
        }
    }

    /// Whether this is a data uplink
    pub fn is_data_up(&self) -> bool {
        matches!(self, MType::UnconfirmedDataUp | MType::ConfirmedDataUp)
    }

    /// Whether this is a data downlink
    pub fn is_data_down(&self) -> bool {
        matches!(self, MType::UnconfirmedDataDown | MType::ConfirmedDataDown)
    }

    /// Whether the frame requests an acknowledgement
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MType::ConfirmedDataUp | MType::ConfirmedDataDown)
    }
}

/// Major revision of the frame format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Major {
    /// LoRaWAN R1
    LoRaWANR1 = 0x00,
}

impl Major {
    /// Parse the major bits of an MHDR byte
    pub fn from_mhdr(mhdr: u8) -> Result<Self, MacError> {
        match mhdr & 0x03 {
            0x00 => Ok(Major::LoRaWANR1),
            other => Err(MacError::UnsupportedVersion {
                major: other,
                minor: 0,
            }),
        }
    }
}

/// Build an MHDR byte
pub fn mhdr(mtype: MType, major: Major) -> u8 {
    mtype as u8 | major as u8
}

/// Frame header flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FCtrl {
    /// Adaptive data rate enabled
    pub adr: bool,
    /// ADR acknowledgement request (uplink only)
    pub adr_ack_req: bool,
    /// Acknowledges the last confirmed frame
    pub ack: bool,
    /// Frame pending (downlink) or Class B enabled (uplink)
    pub f_pending: bool,
    /// FOpts length
    pub f_opts_len: u8,
}

impl FCtrl {
    /// Encode as one byte
    pub fn to_byte(&self) -> u8 {
        let mut byte = self.f_opts_len & 0x0F;
        if self.adr {
            byte |= 0x80;
        }
        if self.adr_ack_req {
            byte |= 0x40;
        }
        if self.ack {
            byte |= 0x20;
        }
        if self.f_pending {
            byte |= 0x10;
        }
        byte
    }

    /// Decode from one byte
    pub fn from_byte(byte: u8) -> Self {
        Self {
            adr: (byte & 0x80) != 0,
            adr_ack_req: (byte & 0x40) != 0,
            ack: (byte & 0x20) != 0,
            f_pending: (byte & 0x10) != 0,
            f_opts_len: byte & 0x0F,
        }
    }
}

/// Frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FHDR {
    /// Device address
    pub dev_addr: DevAddr,
    /// Frame control flags
    pub f_ctrl: FCtrl,
    /// Low 16 bits of the frame counter
    pub f_cnt: u16,
    /// Frame options (MAC commands), possibly encrypted
    pub f_opts: Vec<u8, MAX_FOPTS_LEN>,
}

impl FHDR {
    fn serialize(&self, buffer: &mut PhyBuffer) -> Result<(), EncodingError> {
        let mut f_ctrl = self.f_ctrl;
        f_ctrl.f_opts_len = self.f_opts.len() as u8;
        buffer
            .extend_from_slice(&self.dev_addr.to_wire())
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .push(f_ctrl.to_byte())
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .extend_from_slice(&self.f_cnt.to_le_bytes())
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .extend_from_slice(&self.f_opts)
            .map_err(|_| EncodingError::BufferTooSmall)
    }
}

/// Data frame without its MIC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Message type
    pub mtype: MType,
    /// Major revision
    pub major: Major,
    /// Frame header
    pub fhdr: FHDR,
    /// Port, absent for header-only frames
    pub f_port: Option<u8>,
    /// FRMPayload, possibly encrypted
    pub frm_payload: Vec<u8, MAX_MAC_PAYLOAD_SIZE>,
}

impl DataFrame {
    /// Serialize `MHDR | FHDR | FPort | FRMPayload`
    pub fn encode_without_mic(&self) -> Result<PhyBuffer, EncodingError> {
        if self.f_port.is_none() && !self.frm_payload.is_empty() {
            return Err(EncodingError::MissingPort);
        }
        if self.f_port == Some(0) && !self.fhdr.f_opts.is_empty() {
            return Err(EncodingError::PortZeroWithFOpts);
        }

        let mut buffer = PhyBuffer::new();
        buffer
            .push(mhdr(self.mtype, self.major))
            .map_err(|_| EncodingError::BufferTooSmall)?;
        self.fhdr.serialize(&mut buffer)?;
        if let Some(port) = self.f_port {
            buffer.push(port).map_err(|_| EncodingError::BufferTooSmall)?;
        }
        buffer
            .extend_from_slice(&self.frm_payload)
            .map_err(|_| EncodingError::BufferTooSmall)?;
        Ok(buffer)
    }

    /// Parse a complete data PHY payload into the frame and its MIC
    pub fn parse(bytes: &[u8]) -> Result<(Self, [u8; MIC_SIZE]), EncodingError> {
        // MHDR + DevAddr + FCtrl + FCnt + MIC
        const MIN_LEN: usize = 1 + 4 + 1 + 2 + MIC_SIZE;
        if bytes.len() < MIN_LEN {
            return Err(EncodingError::TooShort(bytes.len()));
        }

        let mtype = MType::from_mhdr(bytes[0]);
        if !mtype.is_data_up() && !mtype.is_data_down() {
            return Err(EncodingError::UnexpectedMType(mtype));
        }
        let major = match Major::from_mhdr(bytes[0]) {
            Ok(major) => major,
            Err(_) => return Err(EncodingError::InvalidMajor(bytes[0] & 0x03)),
        };

        let body_end = bytes.len() - MIC_SIZE;
        let mut mic = [0u8; MIC_SIZE];
        mic.copy_from_slice(&bytes[body_end..]);

        let dev_addr = DevAddr::from_wire([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let f_ctrl = FCtrl::from_byte(bytes[5]);
        let f_cnt = u16::from_le_bytes([bytes[6], bytes[7]]);

        let opts_end = 8 + f_ctrl.f_opts_len as usize;
        if opts_end > body_end {
            return Err(EncodingError::TooShort(bytes.len()));
        }
        let f_opts =
            Vec::from_slice(&bytes[8..opts_end]).map_err(|_| EncodingError::BufferTooSmall)?;

        let (f_port, frm_payload) = if opts_end < body_end {
            let payload = &bytes[opts_end + 1..body_end];
            if payload.len() > MAX_MAC_PAYLOAD_SIZE {
                return Err(EncodingError::PayloadTooLong(payload.len()));
            }
            let payload =
                Vec::from_slice(payload).map_err(|_| EncodingError::BufferTooSmall)?;
            (Some(bytes[opts_end]), payload)
        } else {
            (None, Vec::new())
        };

        if f_port == Some(0) && !f_opts.is_empty() {
            return Err(EncodingError::PortZeroWithFOpts);
        }

        Ok((
            Self {
                mtype,
                major,
                fhdr: FHDR {
                    dev_addr,
                    f_ctrl,
                    f_cnt,
                    f_opts,
                },
                f_port,
                frm_payload,
            },
            mic,
        ))
    }
}

/// Malformed frame construction or parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// Frame shorter than its fixed fields
    #[error("frame of {0} bytes is too short")]
    TooShort(usize),
    /// Output buffer too small
    #[error("frame buffer too small")]
    BufferTooSmall,
    /// Message type not valid in this position
    #[error("unexpected message type {0:?}")]
    UnexpectedMType(MType),
    /// Major revision not supported
    #[error("unsupported major revision {0}")]
    InvalidMajor(u8),
    /// FOpts longer than 15 bytes
    #[error("FOpts of {0} bytes exceed 15")]
    FOptsTooLong(usize),
    /// FRMPayload longer than the MAC payload limit
    #[error("payload of {0} bytes exceeds the maximum")]
    PayloadTooLong(usize),
    /// FPort 0 frame also carrying FOpts
    #[error("FPort 0 frame must not carry FOpts")]
    PortZeroWithFOpts,
    /// Payload present without an FPort
    #[error("payload present without FPort")]
    MissingPort,
    /// Frame addressed to another device
    #[error("frame addressed to {received}, expected {expected}")]
    AddressMismatch {
        /// This device's address
        expected: DevAddr,
        /// Address carried by the frame
        received: DevAddr,
    },
    /// 16-bit DevNonce space used up
    #[error("DevNonce space exhausted")]
    DevNonceExhausted,
    /// 32-bit uplink frame counter space used up
    #[error("uplink frame counter exhausted")]
    FCntExhausted,
    /// Join-accept of an invalid length
    #[error("join-accept of {0} bytes has an invalid length")]
    InvalidJoinAcceptLength(usize),
    /// Unknown MAC command identifier
    #[error("unknown MAC command 0x{0:02x}")]
    UnknownCommand(u8),
    /// MAC command payload cut short
    #[error("MAC command 0x{0:02x} is truncated")]
    TruncatedCommand(u8),
}

/// Uplink assembly failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UplinkBuildError {
    /// Frame encoding failed
    #[error("encoding: {0}")]
    Encoding(#[from] EncodingError),
    /// Cipher failed
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    /// Band plan lookup failed
    #[error("region: {0}")]
    Region(#[from] RegionError),
}

/// MAC layer error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacError {
    /// Malformed frame
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    /// Message integrity check failed
    #[error("invalid MIC")]
    InvalidMic,
    /// Join-accept JoinNonce did not advance
    #[error("replayed JoinNonce {received} (last accepted {last})")]
    ReplayedJoinNonce {
        /// JoinNonce carried by the join-accept
        received: u32,
        /// Last accepted JoinNonce
        last: u32,
    },
    /// Downlink frame counter did not advance
    #[error("stale frame counter {received} (last accepted {last})")]
    StaleFrameCounter {
        /// Expanded 32-bit frame counter of the downlink
        received: u32,
        /// Last accepted downlink frame counter
        last: u32,
    },
    /// MAC version or major revision not supported
    #[error("unsupported LoRaWAN version {major}.{minor}")]
    UnsupportedVersion {
        /// Major part
        major: u8,
        /// Minor part
        minor: u8,
    },
    /// Counter store failure
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Uplink could not be assembled
    #[error("uplink build failed: {0}")]
    UplinkBuild(#[from] UplinkBuildError),
    /// Cipher failure outside uplink assembly
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
}

impl MacError {
    /// Authentication or freshness rejection of a received frame
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            MacError::InvalidMic
                | MacError::ReplayedJoinNonce { .. }
                | MacError::StaleFrameCounter { .. }
        )
    }

    /// Infrastructure failure; the operation left state unchanged and may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, MacError::Store(StoreError::Unavailable(_)))
    }
}
