use crate::config::device::{DevAddr, EUI64};
use crate::crypto::MIC_SIZE;

use super::mac::{mhdr, EncodingError, MType, Major, PhyBuffer};

/// Join-request frame length (MHDR | JoinEUI | DevEUI | DevNonce | MIC)
pub const JOIN_REQUEST_LEN: usize = 1 + 8 + 8 + 2 + MIC_SIZE;

/// Join-accept body length without CFList (after MHDR, including MIC)
pub const JOIN_ACCEPT_LEN: usize = 16;

/// Join-accept body length with CFList (after MHDR, including MIC)
pub const JOIN_ACCEPT_CFLIST_LEN: usize = 32;

/// Join request payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequest {
    /// Join EUI (1.0: AppEUI)
    pub join_eui: EUI64,
    /// Device EUI
    pub dev_eui: EUI64,
    /// Device nonce
    pub dev_nonce: u16,
}

impl JoinRequest {
    /// Serialize `MHDR | JoinEUI | DevEUI | DevNonce`, ready for the MIC
    pub fn encode_without_mic(&self, major: Major) -> Result<PhyBuffer, EncodingError> {
        let mut buffer = PhyBuffer::new();
        buffer
            .push(mhdr(MType::JoinRequest, major))
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .extend_from_slice(&self.join_eui.to_wire())
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .extend_from_slice(&self.dev_eui.to_wire())
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .extend_from_slice(&self.dev_nonce.to_le_bytes())
            .map_err(|_| EncodingError::BufferTooSmall)?;
        Ok(buffer)
    }

    /// Parse a complete join-request frame, returning the payload and its MIC
    pub fn parse(bytes: &[u8]) -> Result<(Self, [u8; MIC_SIZE]), EncodingError> {
        if bytes.len() != JOIN_REQUEST_LEN {
            return Err(EncodingError::TooShort(bytes.len()));
        }
        let mtype = MType::from_mhdr(bytes[0]);
        if mtype != MType::JoinRequest {
            return Err(EncodingError::UnexpectedMType(mtype));
        }

        let mut join_eui = [0u8; 8];
        join_eui.copy_from_slice(&bytes[1..9]);
        let mut dev_eui = [0u8; 8];
        dev_eui.copy_from_slice(&bytes[9..17]);
        let mut mic = [0u8; MIC_SIZE];
        mic.copy_from_slice(&bytes[19..23]);

        Ok((
            Self {
                join_eui: EUI64::from_wire(join_eui),
                dev_eui: EUI64::from_wire(dev_eui),
                dev_nonce: u16::from_le_bytes([bytes[17], bytes[18]]),
            },
            mic,
        ))
    }
}

/// Downlink settings carried by a join-accept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DLSettings {
    /// Network supports LoRaWAN 1.1 key derivation
    pub opt_neg: bool,
    /// RX1 data rate offset (0-7)
    pub rx1_dr_offset: u8,
    /// RX2 data rate (0-15)
    pub rx2_data_rate: u8,
}

impl DLSettings {
    /// Encode as one byte
    pub fn to_byte(&self) -> u8 {
        let mut byte = ((self.rx1_dr_offset & 0x07) << 4) | (self.rx2_data_rate & 0x0F);
        if self.opt_neg {
            byte |= 0x80;
        }
        byte
    }

    /// Decode from one byte
    pub fn from_byte(byte: u8) -> Self {
        Self {
            opt_neg: (byte & 0x80) != 0,
            rx1_dr_offset: (byte >> 4) & 0x07,
            rx2_data_rate: byte & 0x0F,
        }
    }
}

/// Optional channel list appended to a join-accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfList {
    /// Type 0: five extra channel frequencies in Hz
    Frequencies([u32; 5]),
    /// Type 1: channel mask blocks (fixed channel plans)
    ChannelMask([u16; 5]),
}

impl CfList {
    fn parse(bytes: &[u8; 16]) -> Self {
        if bytes[15] == 0x01 {
            let mut masks = [0u16; 5];
            for (i, mask) in masks.iter_mut().enumerate() {
                *mask = u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);
            }
            CfList::ChannelMask(masks)
        } else {
            let mut freqs = [0u32; 5];
            for (i, freq) in freqs.iter_mut().enumerate() {
                let raw = &bytes[3 * i..3 * i + 3];
                *freq = u32::from_le_bytes([raw[0], raw[1], raw[2], 0]) * 100;
            }
            CfList::Frequencies(freqs)
        }
    }

    fn encode(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        match self {
            CfList::Frequencies(freqs) => {
                for (i, freq) in freqs.iter().enumerate() {
                    out[3 * i..3 * i + 3].copy_from_slice(&(freq / 100).to_le_bytes()[..3]);
                }
            }
            CfList::ChannelMask(masks) => {
                for (i, mask) in masks.iter().enumerate() {
                    out[2 * i..2 * i + 2].copy_from_slice(&mask.to_le_bytes());
                }
                out[15] = 0x01;
            }
        }
        out
    }
}

/// Decrypted join-accept fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAcceptPayload {
    /// Join nonce (1.0: AppNonce), 24 bits
    pub join_nonce: u32,
    /// Home NetID, 24 bits
    pub net_id: u32,
    /// Assigned device address
    pub dev_addr: DevAddr,
    /// Downlink settings
    pub dl_settings: DLSettings,
    /// RX1 delay (0 means 1 second)
    pub rx_delay: u8,
    /// Optional channel list
    pub cf_list: Option<CfList>,
}

impl JoinAcceptPayload {
    /// Parse the plaintext join-accept body (after MHDR, without MIC)
    pub fn parse(body: &[u8]) -> Result<Self, EncodingError> {
        let cf_list = match body.len() {
            12 => None,
            28 => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(&body[12..28]);
                Some(CfList::parse(&raw))
            }
            other => return Err(EncodingError::InvalidJoinAcceptLength(other)),
        };

        Ok(Self {
            join_nonce: u32::from_le_bytes([body[0], body[1], body[2], 0]),
            net_id: u32::from_le_bytes([body[3], body[4], body[5], 0]),
            dev_addr: DevAddr::from_wire([body[6], body[7], body[8], body[9]]),
            dl_settings: DLSettings::from_byte(body[10]),
            rx_delay: body[11],
            cf_list,
        })
    }

    /// Serialize the plaintext body (after MHDR, without MIC)
    pub fn encode(&self) -> Result<PhyBuffer, EncodingError> {
        let mut buffer = PhyBuffer::new();
        buffer
            .extend_from_slice(&self.join_nonce.to_le_bytes()[..3])
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .extend_from_slice(&self.net_id.to_le_bytes()[..3])
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .extend_from_slice(&self.dev_addr.to_wire())
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .push(self.dl_settings.to_byte())
            .map_err(|_| EncodingError::BufferTooSmall)?;
        buffer
            .push(self.rx_delay)
            .map_err(|_| EncodingError::BufferTooSmall)?;
        if let Some(cf_list) = &self.cf_list {
            buffer
                .extend_from_slice(&cf_list.encode())
                .map_err(|_| EncodingError::BufferTooSmall)?;
        }
        Ok(buffer)
    }

    /// RX1 delay in seconds
    pub fn rx1_delay_secs(&self) -> u8 {
        match self.rx_delay & 0x0F {
            0 => 1,
            delay => delay,
        }
    }
}
