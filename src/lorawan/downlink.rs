use heapless::Vec;
use tracing::{debug, warn};

use crate::config::device::{DeviceConfig, MacVersion, SessionKeys, SessionState};
use crate::crypto::{self, CryptoProvider, Direction, MIC_SIZE};
use crate::store::{CounterField, CounterStore};

use super::commands::{parse_commands, MacCommands};
use super::join::JoinAccept;
use super::mac::{DataFrame, EncodingError, FCtrl, MType, MacError, Major, MAX_MAC_PAYLOAD_SIZE};

/// Largest forward jump of the 16-bit wire counter accepted as a rollover
pub const MAX_FCNT_GAP: u32 = 16_384;

/// Result of processing a downlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downlink {
    /// Join-accept; the device is now joined
    JoinAccept(JoinAccept),
    /// Data frame addressed to this device
    Data(DataDownlink),
}

/// Decrypted and decoded data downlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDownlink {
    /// Server requested an acknowledgement
    pub confirmed: bool,
    /// Expanded 32-bit frame counter
    pub fcnt: u32,
    /// Frame control flags
    pub f_ctrl: FCtrl,
    /// Port, absent for header-only frames
    pub f_port: Option<u8>,
    /// Plaintext application payload (empty for FPort 0)
    pub payload: Vec<u8, MAX_MAC_PAYLOAD_SIZE>,
    /// MAC commands from FOpts or an FPort 0 payload
    pub mac_commands: MacCommands,
}

impl DataDownlink {
    /// Whether the frame acknowledges the last confirmed uplink
    pub fn ack(&self) -> bool {
        self.f_ctrl.ack
    }
}

/// Expand a 16-bit wire counter to 32 bits against the last accepted value
///
/// Values behind `last` by more than [`MAX_FCNT_GAP`] are read as a rollover
/// of the low 16 bits; smaller steps back stay behind `last`.
pub fn expand_fcnt(last: u32, wire: u16) -> u32 {
    let candidate = (last & 0xFFFF_0000) | wire as u32;
    if candidate < last && last - candidate > MAX_FCNT_GAP {
        candidate.wrapping_add(0x1_0000)
    } else {
        candidate
    }
}

/// Data downlink validation for one device
pub struct DownlinkProcessor<'a, S, C> {
    config: &'a DeviceConfig,
    store: &'a S,
    crypto: &'a C,
}

impl<'a, S: CounterStore, C: CryptoProvider> DownlinkProcessor<'a, S, C> {
    /// Bind the processor to a device's configuration and collaborators
    pub fn new(config: &'a DeviceConfig, store: &'a S, crypto: &'a C) -> Self {
        Self {
            config,
            store,
            crypto,
        }
    }

    /// Authenticate, decrypt and decode a data downlink
    ///
    /// The downlink counter is persisted only after the whole frame decoded.
    pub fn process(
        &self,
        session: &mut SessionState,
        keys: &SessionKeys,
        bytes: &[u8],
    ) -> Result<DataDownlink, MacError> {
        let result = self.decode(session, keys, bytes);
        if let Err(e) = &result {
            if e.is_security_rejection() {
                warn!(dev_eui = %self.config.dev_eui, error = %e, "downlink rejected");
            } else {
                debug!(dev_eui = %self.config.dev_eui, error = %e, "downlink dropped");
            }
        }
        result
    }

    fn decode(
        &self,
        session: &mut SessionState,
        keys: &SessionKeys,
        bytes: &[u8],
    ) -> Result<DataDownlink, MacError> {
        if let Some(&mhdr) = bytes.first() {
            Major::from_mhdr(mhdr)?;
        }
        let (frame, mic) = DataFrame::parse(bytes)?;
        if !frame.mtype.is_data_down() {
            return Err(EncodingError::UnexpectedMType(frame.mtype).into());
        }
        if frame.fhdr.dev_addr != session.dev_addr {
            return Err(EncodingError::AddressMismatch {
                expected: session.dev_addr,
                received: frame.fhdr.dev_addr,
            }
            .into());
        }

        let dev_eui = &self.config.dev_eui;
        let last = self.store.get(dev_eui)?.and_then(|record| record.fcnt_down);
        let fcnt = expand_fcnt(last.unwrap_or(0), frame.fhdr.f_cnt);

        let v1_1 = session.mac_version == MacVersion::V1_1;
        let conf_fcnt = if v1_1 && frame.fhdr.f_ctrl.ack {
            session.confirmed_uplink.map(|f| f as u16).unwrap_or(0)
        } else {
            0
        };
        let expected = crypto::compute_data_mic(
            self.crypto,
            &keys.s_nwk_s_int_key,
            session.dev_addr,
            fcnt,
            Direction::Down,
            conf_fcnt,
            &bytes[..bytes.len() - MIC_SIZE],
        )?;
        if expected != mic {
            return Err(MacError::InvalidMic);
        }

        // The first downlink of a session may carry any counter, including 0
        if let Some(last) = last.filter(|_| !self.config.skip_fcnt_check) {
            if fcnt <= last {
                return Err(MacError::StaleFrameCounter {
                    received: fcnt,
                    last,
                });
            }
        }

        let mut f_opts = frame.fhdr.f_opts;
        if v1_1 && !f_opts.is_empty() {
            crypto::encrypt_fopts(
                self.crypto,
                &keys.nwk_s_enc_key,
                session.dev_addr,
                fcnt,
                Direction::Down,
                frame.f_port.map_or(false, |port| port > 0),
                &mut f_opts,
            )?;
        }

        let mut payload = frame.frm_payload;
        if let Some(port) = frame.f_port {
            let key = if port == 0 {
                &keys.nwk_s_enc_key
            } else {
                &keys.app_s_key
            };
            crypto::encrypt_frm_payload(
                self.crypto,
                key,
                session.dev_addr,
                fcnt,
                Direction::Down,
                &mut payload,
            )?;
        }

        let mac_commands = if frame.f_port == Some(0) {
            let commands = parse_commands(&payload, false)?;
            payload.clear();
            commands
        } else {
            parse_commands(&f_opts, false)?
        };

        self.store.set(dev_eui, &[CounterField::FCntDown(Some(fcnt))])?;

        let confirmed = frame.mtype == MType::ConfirmedDataDown;
        session.fcnt_down = Some(fcnt);
        if confirmed {
            session.ack_pending = Some(fcnt);
        }
        if frame.fhdr.f_ctrl.ack {
            session.confirmed_uplink = None;
        }
        debug!(
            dev_eui = %dev_eui,
            fcnt,
            f_port = ?frame.f_port,
            confirmed,
            commands = mac_commands.len(),
            "downlink accepted"
        );

        Ok(DataDownlink {
            confirmed,
            fcnt,
            f_ctrl: frame.fhdr.f_ctrl,
            f_port: frame.f_port,
            payload,
            mac_commands,
        })
    }
}
