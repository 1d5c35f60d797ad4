use heapless::Vec;

use super::mac::{EncodingError, MAX_MAC_PAYLOAD_SIZE};

/// Maximum number of MAC commands decoded from one frame
pub const MAX_COMMANDS: usize = 16;

/// Decoded MAC commands of one frame
pub type MacCommands = Vec<MacCommand, MAX_COMMANDS>;

/// MAC command
///
/// Uplink and downlink share command identifiers with different payloads,
/// so parsing needs the direction of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacCommand {
    /// Reset indication (1.1, uplink)
    ResetInd {
        /// Minor version of the device
        minor: u8,
    },
    /// Reset confirmation (1.1, downlink)
    ResetConf {
        /// Minor version of the server
        minor: u8,
    },
    /// Link check request
    LinkCheckReq,
    /// Link check answer
    LinkCheckAns {
        /// Link margin in dB
        margin: u8,
        /// Number of gateways that received the request
        gateway_count: u8,
    },
    /// Link ADR request
    LinkADRReq {
        /// Data rate
        data_rate: u8,
        /// TX power
        tx_power: u8,
        /// Channel mask
        ch_mask: u16,
        /// Channel mask control
        ch_mask_cntl: u8,
        /// Number of transmissions
        nb_trans: u8,
    },
    /// Link ADR answer
    LinkADRAns {
        /// Power ACK
        power_ack: bool,
        /// Data rate ACK
        data_rate_ack: bool,
        /// Channel mask ACK
        channel_mask_ack: bool,
    },
    /// Duty cycle request
    DutyCycleReq {
        /// Maximum duty cycle
        max_duty_cycle: u8,
    },
    /// Duty cycle answer
    DutyCycleAns,
    /// RX parameter setup request
    RXParamSetupReq {
        /// RX1 data rate offset
        rx1_dr_offset: u8,
        /// RX2 data rate
        rx2_data_rate: u8,
        /// RX2 frequency in Hz
        freq: u32,
    },
    /// RX parameter setup answer
    RXParamSetupAns {
        /// RX1 data rate offset ACK
        rx1_dr_offset_ack: bool,
        /// RX2 data rate ACK
        rx2_data_rate_ack: bool,
        /// Channel ACK
        channel_ack: bool,
    },
    /// Device status request
    DevStatusReq,
    /// Device status answer
    DevStatusAns {
        /// Battery level (0 = external power, 1-254 = level, 255 = unknown)
        battery: u8,
        /// Radio status (margin in dB, 6-bit signed)
        margin: i8,
    },
    /// New channel request
    NewChannelReq {
        /// Channel index
        ch_index: u8,
        /// Frequency in Hz
        freq: u32,
        /// Maximum data rate
        max_dr: u8,
        /// Minimum data rate
        min_dr: u8,
    },
    /// New channel answer
    NewChannelAns {
        /// Channel frequency OK
        channel_freq_ok: bool,
        /// Data rate OK
        data_rate_ok: bool,
    },
    /// RX timing setup request
    RXTimingSetupReq {
        /// Delay (0-15)
        delay: u8,
    },
    /// RX timing setup answer
    RXTimingSetupAns,
    /// TX parameter setup request
    TxParamSetupReq {
        /// Downlink dwell time
        downlink_dwell_time: bool,
        /// Uplink dwell time
        uplink_dwell_time: bool,
        /// Maximum EIRP
        max_eirp: u8,
    },
    /// TX parameter setup answer
    TxParamSetupAns,
    /// Downlink channel request
    DlChannelReq {
        /// Channel index
        ch_index: u8,
        /// Frequency in Hz
        freq: u32,
    },
    /// Downlink channel answer
    DlChannelAns {
        /// Channel frequency OK
        channel_freq_ok: bool,
        /// Uplink frequency exists
        uplink_freq_exists: bool,
    },
    /// Rekey indication (1.1, uplink)
    RekeyInd {
        /// Minor version of the device
        minor: u8,
    },
    /// Rekey confirmation (1.1, downlink)
    RekeyConf {
        /// Minor version of the server
        minor: u8,
    },
    /// ADR parameter setup request (1.1)
    ADRParamSetupReq {
        /// ADR_ACK_LIMIT exponent
        limit_exp: u8,
        /// ADR_ACK_DELAY exponent
        delay_exp: u8,
    },
    /// ADR parameter setup answer (1.1)
    ADRParamSetupAns,
    /// Device time request
    DeviceTimeReq,
    /// Device time answer
    DeviceTimeAns {
        /// Seconds since the GPS epoch
        seconds: u32,
        /// Fractional second in 1/256 s
        fraction: u8,
    },
}

fn truncated(cid: u8) -> EncodingError {
    EncodingError::TruncatedCommand(cid)
}

fn freq_from(raw: &[u8]) -> u32 {
    u32::from_le_bytes([raw[0], raw[1], raw[2], 0]) * 100
}

fn freq_to(freq: u32) -> [u8; 3] {
    let raw = (freq / 100).to_le_bytes();
    [raw[0], raw[1], raw[2]]
}

impl MacCommand {
    /// Command identifier
    pub fn cid(&self) -> u8 {
        match self {
            MacCommand::ResetInd { .. } | MacCommand::ResetConf { .. } => 0x01,
            MacCommand::LinkCheckReq | MacCommand::LinkCheckAns { .. } => 0x02,
            MacCommand::LinkADRReq { .. } | MacCommand::LinkADRAns { .. } => 0x03,
            MacCommand::DutyCycleReq { .. } | MacCommand::DutyCycleAns => 0x04,
            MacCommand::RXParamSetupReq { .. } | MacCommand::RXParamSetupAns { .. } => 0x05,
            MacCommand::DevStatusReq | MacCommand::DevStatusAns { .. } => 0x06,
            MacCommand::NewChannelReq { .. } | MacCommand::NewChannelAns { .. } => 0x07,
            MacCommand::RXTimingSetupReq { .. } | MacCommand::RXTimingSetupAns => 0x08,
            MacCommand::TxParamSetupReq { .. } | MacCommand::TxParamSetupAns => 0x09,
            MacCommand::DlChannelReq { .. } | MacCommand::DlChannelAns { .. } => 0x0A,
            MacCommand::RekeyInd { .. } | MacCommand::RekeyConf { .. } => 0x0B,
            MacCommand::ADRParamSetupReq { .. } | MacCommand::ADRParamSetupAns => 0x0C,
            MacCommand::DeviceTimeReq | MacCommand::DeviceTimeAns { .. } => 0x0D,
        }
    }

    /// Whether the command travels device to network
    pub fn is_uplink(&self) -> bool {
        matches!(
            self,
            MacCommand::ResetInd { .. }
                | MacCommand::LinkCheckReq
                | MacCommand::LinkADRAns { .. }
                | MacCommand::DutyCycleAns
                | MacCommand::RXParamSetupAns { .. }
                | MacCommand::DevStatusAns { .. }
                | MacCommand::NewChannelAns { .. }
                | MacCommand::RXTimingSetupAns
                | MacCommand::TxParamSetupAns
                | MacCommand::DlChannelAns { .. }
                | MacCommand::RekeyInd { .. }
                | MacCommand::ADRParamSetupAns
                | MacCommand::DeviceTimeReq
        )
    }

    /// Get command payload length in bytes (without the CID)
    pub fn len(&self) -> usize {
        match self {
            MacCommand::ResetInd { .. } | MacCommand::ResetConf { .. } => 1,
            MacCommand::LinkCheckReq => 0,
            MacCommand::LinkCheckAns { .. } => 2,
            MacCommand::LinkADRReq { .. } => 4,
            MacCommand::LinkADRAns { .. } => 1,
            MacCommand::DutyCycleReq { .. } => 1,
            MacCommand::DutyCycleAns => 0,
            MacCommand::RXParamSetupReq { .. } => 4,
            MacCommand::RXParamSetupAns { .. } => 1,
            MacCommand::DevStatusReq => 0,
            MacCommand::DevStatusAns { .. } => 2,
            MacCommand::NewChannelReq { .. } => 5,
            MacCommand::NewChannelAns { .. } => 1,
            MacCommand::RXTimingSetupReq { .. } => 1,
            MacCommand::RXTimingSetupAns => 0,
            MacCommand::TxParamSetupReq { .. } => 1,
            MacCommand::TxParamSetupAns => 0,
            MacCommand::DlChannelReq { .. } => 4,
            MacCommand::DlChannelAns { .. } => 1,
            MacCommand::RekeyInd { .. } | MacCommand::RekeyConf { .. } => 1,
            MacCommand::ADRParamSetupReq { .. } => 1,
            MacCommand::ADRParamSetupAns => 0,
            MacCommand::DeviceTimeReq => 0,
            MacCommand::DeviceTimeAns { .. } => 5,
        }
    }

    /// Whether the command has no payload
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `CID | payload` to `out`
    pub fn encode<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<(), EncodingError> {
        let mut payload = [0u8; 5];
        match *self {
            MacCommand::ResetInd { minor }
            | MacCommand::ResetConf { minor }
            | MacCommand::RekeyInd { minor }
            | MacCommand::RekeyConf { minor } => payload[0] = minor & 0x0F,
            MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            } => {
                payload[0] = margin;
                payload[1] = gateway_count;
            }
            MacCommand::LinkADRReq {
                data_rate,
                tx_power,
                ch_mask,
                ch_mask_cntl,
                nb_trans,
            } => {
                payload[0] = (data_rate << 4) | (tx_power & 0x0F);
                payload[1..3].copy_from_slice(&ch_mask.to_le_bytes());
                payload[3] = ((ch_mask_cntl & 0x07) << 4) | (nb_trans & 0x0F);
            }
            MacCommand::LinkADRAns {
                power_ack,
                data_rate_ack,
                channel_mask_ack,
            } => {
                payload[0] = ((power_ack as u8) << 2)
                    | ((data_rate_ack as u8) << 1)
                    | channel_mask_ack as u8;
            }
            MacCommand::DutyCycleReq { max_duty_cycle } => payload[0] = max_duty_cycle & 0x0F,
            MacCommand::RXParamSetupReq {
                rx1_dr_offset,
                rx2_data_rate,
                freq,
            } => {
                payload[0] = ((rx1_dr_offset & 0x07) << 4) | (rx2_data_rate & 0x0F);
                payload[1..4].copy_from_slice(&freq_to(freq));
            }
            MacCommand::RXParamSetupAns {
                rx1_dr_offset_ack,
                rx2_data_rate_ack,
                channel_ack,
            } => {
                payload[0] = ((rx1_dr_offset_ack as u8) << 2)
                    | ((rx2_data_rate_ack as u8) << 1)
                    | channel_ack as u8;
            }
            MacCommand::DevStatusAns { battery, margin } => {
                payload[0] = battery;
                payload[1] = (margin as u8) & 0x3F;
            }
            MacCommand::NewChannelReq {
                ch_index,
                freq,
                max_dr,
                min_dr,
            } => {
                payload[0] = ch_index;
                payload[1..4].copy_from_slice(&freq_to(freq));
                payload[4] = (max_dr << 4) | (min_dr & 0x0F);
            }
            MacCommand::NewChannelAns {
                channel_freq_ok,
                data_rate_ok,
            } => payload[0] = ((data_rate_ok as u8) << 1) | channel_freq_ok as u8,
            MacCommand::RXTimingSetupReq { delay } => payload[0] = delay & 0x0F,
            MacCommand::TxParamSetupReq {
                downlink_dwell_time,
                uplink_dwell_time,
                max_eirp,
            } => {
                payload[0] = ((downlink_dwell_time as u8) << 5)
                    | ((uplink_dwell_time as u8) << 4)
                    | (max_eirp & 0x0F);
            }
            MacCommand::DlChannelReq { ch_index, freq } => {
                payload[0] = ch_index;
                payload[1..4].copy_from_slice(&freq_to(freq));
            }
            MacCommand::DlChannelAns {
                channel_freq_ok,
                uplink_freq_exists,
            } => payload[0] = ((uplink_freq_exists as u8) << 1) | channel_freq_ok as u8,
            MacCommand::ADRParamSetupReq {
                limit_exp,
                delay_exp,
            } => payload[0] = (limit_exp << 4) | (delay_exp & 0x0F),
            MacCommand::DeviceTimeAns { seconds, fraction } => {
                payload[0..4].copy_from_slice(&seconds.to_le_bytes());
                payload[4] = fraction;
            }
            MacCommand::LinkCheckReq
            | MacCommand::DutyCycleAns
            | MacCommand::DevStatusReq
            | MacCommand::RXTimingSetupAns
            | MacCommand::TxParamSetupAns
            | MacCommand::ADRParamSetupAns
            | MacCommand::DeviceTimeReq => {}
        }

        out.push(self.cid()).map_err(|_| EncodingError::BufferTooSmall)?;
        out.extend_from_slice(&payload[..self.len()])
            .map_err(|_| EncodingError::BufferTooSmall)
    }

    fn parse_uplink(cid: u8, p: &[u8]) -> Result<(Self, usize), EncodingError> {
        let need = |n: usize| if p.len() < n { Err(truncated(cid)) } else { Ok(()) };
        let cmd = match cid {
            0x01 => {
                need(1)?;
                MacCommand::ResetInd { minor: p[0] & 0x0F }
            }
            0x02 => MacCommand::LinkCheckReq,
            0x03 => {
                need(1)?;
                MacCommand::LinkADRAns {
                    power_ack: (p[0] & 0x04) != 0,
                    data_rate_ack: (p[0] & 0x02) != 0,
                    channel_mask_ack: (p[0] & 0x01) != 0,
                }
            }
            0x04 => MacCommand::DutyCycleAns,
            0x05 => {
                need(1)?;
                MacCommand::RXParamSetupAns {
                    rx1_dr_offset_ack: (p[0] & 0x04) != 0,
                    rx2_data_rate_ack: (p[0] & 0x02) != 0,
                    channel_ack: (p[0] & 0x01) != 0,
                }
            }
            0x06 => {
                need(2)?;
                // Sign-extend the 6-bit margin
                let margin = ((p[1] << 2) as i8) >> 2;
                MacCommand::DevStatusAns {
                    battery: p[0],
                    margin,
                }
            }
            0x07 => {
                need(1)?;
                MacCommand::NewChannelAns {
                    channel_freq_ok: (p[0] & 0x01) != 0,
                    data_rate_ok: (p[0] & 0x02) != 0,
                }
            }
            0x08 => MacCommand::RXTimingSetupAns,
            0x09 => MacCommand::TxParamSetupAns,
            0x0A => {
                need(1)?;
                MacCommand::DlChannelAns {
                    channel_freq_ok: (p[0] & 0x01) != 0,
                    uplink_freq_exists: (p[0] & 0x02) != 0,
                }
            }
            0x0B => {
                need(1)?;
                MacCommand::RekeyInd { minor: p[0] & 0x0F }
            }
            0x0C => MacCommand::ADRParamSetupAns,
            0x0D => MacCommand::DeviceTimeReq,
            other => return Err(EncodingError::UnknownCommand(other)),
        };
        Ok((cmd, cmd.len()))
    }

    fn parse_downlink(cid: u8, p: &[u8]) -> Result<(Self, usize), EncodingError> {
        let need = |n: usize| if p.len() < n { Err(truncated(cid)) } else { Ok(()) };
        let cmd = match cid {
            0x01 => {
                need(1)?;
                MacCommand::ResetConf { minor: p[0] & 0x0F }
            }
            0x02 => {
                need(2)?;
                MacCommand::LinkCheckAns {
                    margin: p[0],
                    gateway_count: p[1],
                }
            }
            0x03 => {
                need(4)?;
                MacCommand::LinkADRReq {
                    data_rate: p[0] >> 4,
                    tx_power: p[0] & 0x0F,
                    ch_mask: u16::from_le_bytes([p[1], p[2]]),
                    ch_mask_cntl: (p[3] >> 4) & 0x07,
                    nb_trans: p[3] & 0x0F,
                }
            }
            0x04 => {
                need(1)?;
                MacCommand::DutyCycleReq {
                    max_duty_cycle: p[0] & 0x0F,
                }
            }
            0x05 => {
                need(4)?;
                MacCommand::RXParamSetupReq {
                    rx1_dr_offset: (p[0] >> 4) & 0x07,
                    rx2_data_rate: p[0] & 0x0F,
                    freq: freq_from(&p[1..4]),
                }
            }
            0x06 => MacCommand::DevStatusReq,
            0x07 => {
                need(5)?;
                MacCommand::NewChannelReq {
                    ch_index: p[0],
                    freq: freq_from(&p[1..4]),
                    max_dr: p[4] >> 4,
                    min_dr: p[4] & 0x0F,
                }
            }
            0x08 => {
                need(1)?;
                MacCommand::RXTimingSetupReq { delay: p[0] & 0x0F }
            }
            0x09 => {
                need(1)?;
                MacCommand::TxParamSetupReq {
                    downlink_dwell_time: (p[0] & 0x20) != 0,
                    uplink_dwell_time: (p[0] & 0x10) != 0,
                    max_eirp: p[0] & 0x0F,
                }
            }
            0x0A => {
                need(4)?;
                MacCommand::DlChannelReq {
                    ch_index: p[0],
                    freq: freq_from(&p[1..4]),
                }
            }
            0x0B => {
                need(1)?;
                MacCommand::RekeyConf { minor: p[0] & 0x0F }
            }
            0x0C => {
                need(1)?;
                MacCommand::ADRParamSetupReq {
                    limit_exp: p[0] >> 4,
                    delay_exp: p[0] & 0x0F,
                }
            }
            0x0D => {
                need(5)?;
                MacCommand::DeviceTimeAns {
                    seconds: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
                    fraction: p[4],
                }
            }
            other => return Err(EncodingError::UnknownCommand(other)),
        };
        Ok((cmd, cmd.len()))
    }
}

/// Parse a sequence of MAC commands (FOpts or an FPort 0 payload)
pub fn parse_commands(bytes: &[u8], uplink: bool) -> Result<MacCommands, EncodingError> {
    let mut commands = MacCommands::new();
    let mut rest = bytes;
    while let Some((&cid, payload)) = rest.split_first() {
        let (cmd, len) = if uplink {
            MacCommand::parse_uplink(cid, payload)?
        } else {
            MacCommand::parse_downlink(cid, payload)?
        };
        commands.push(cmd).map_err(|_| EncodingError::BufferTooSmall)?;
        rest = &payload[len..];
    }
    Ok(commands)
}

/// Serialize MAC commands back to back
pub fn encode_commands(
    commands: &[MacCommand],
) -> Result<Vec<u8, MAX_MAC_PAYLOAD_SIZE>, EncodingError> {
    let mut out = Vec::new();
    for cmd in commands {
        cmd.encode(&mut out)?;
    }
    Ok(out)
}
