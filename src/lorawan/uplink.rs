use heapless::Vec;
use tracing::debug;

use crate::config::device::{DeviceConfig, MacVersion, SessionKeys, SessionState};
use crate::crypto::{self, CryptoProvider, Direction};
use crate::store::{CounterField, CounterStore};
use crate::transport::TxParams;

use super::commands::{encode_commands, MacCommand};
use super::mac::{
    DataFrame, EncodingError, FCtrl, MType, MacError, PhyBuffer, UplinkBuildError, FHDR,
    MAX_FOPTS_LEN, MAX_MAC_PAYLOAD_SIZE,
};
use super::region::Region;

/// Application request for one data uplink
#[derive(Debug, Clone, Copy)]
pub struct Uplink<'a> {
    /// Port; `None` sends a header-only frame, `Some(0)` carries MAC commands in the payload
    pub f_port: Option<u8>,
    /// Plaintext FRMPayload
    pub payload: &'a [u8],
    /// Request an acknowledgement
    pub confirmed: bool,
    /// ADR flag
    pub adr: bool,
    /// ADRACKReq flag
    pub adr_ack_req: bool,
    /// Class B flag
    pub class_b: bool,
    /// Commands piggybacked in FOpts
    pub mac_commands: &'a [MacCommand],
    /// Radio parameters of the transmission
    pub tx: TxParams,
}

impl<'a> Uplink<'a> {
    /// Unconfirmed uplink without flags or MAC commands
    pub fn new(f_port: Option<u8>, payload: &'a [u8], tx: TxParams) -> Self {
        Self {
            f_port,
            payload,
            confirmed: false,
            adr: false,
            adr_ack_req: false,
            class_b: false,
            mac_commands: &[],
            tx,
        }
    }

    /// Request an acknowledgement
    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }

    /// Set the ADR flag
    pub fn with_adr(mut self, adr: bool) -> Self {
        self.adr = adr;
        self
    }

    /// Set the ADRACKReq flag
    pub fn with_adr_ack_req(mut self, adr_ack_req: bool) -> Self {
        self.adr_ack_req = adr_ack_req;
        self
    }

    /// Set the Class B flag
    pub fn with_class_b(mut self, class_b: bool) -> Self {
        self.class_b = class_b;
        self
    }

    /// Attach MAC commands to FOpts
    pub fn with_mac_commands(mut self, mac_commands: &'a [MacCommand]) -> Self {
        self.mac_commands = mac_commands;
        self
    }
}

/// Authenticated uplink ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltUplink {
    /// PHY payload
    pub bytes: PhyBuffer,
    /// Frame counter used (already persisted)
    pub fcnt: u32,
}

/// Uplink assembly for one device
pub struct UplinkBuilder<'a, S, C, R> {
    config: &'a DeviceConfig,
    store: &'a S,
    crypto: &'a C,
    region: &'a R,
}

impl<'a, S: CounterStore, C: CryptoProvider, R: Region> UplinkBuilder<'a, S, C, R> {
    /// Bind the builder to a device's configuration and collaborators
    pub fn new(config: &'a DeviceConfig, store: &'a S, crypto: &'a C, region: &'a R) -> Self {
        Self {
            config,
            store,
            crypto,
            region,
        }
    }

    /// Advance the uplink counter and build an authenticated frame
    ///
    /// The new counter is persisted before assembly and stays consumed even
    /// when assembly or the later send fails.
    pub fn build(
        &self,
        session: &mut SessionState,
        keys: &SessionKeys,
        uplink: &Uplink<'_>,
    ) -> Result<BuiltUplink, MacError> {
        let dev_eui = &self.config.dev_eui;
        let last = self
            .store
            .get(dev_eui)?
            .map(|record| record.fcnt_up)
            .unwrap_or(0);
        let fcnt = last
            .checked_add(1)
            .ok_or(UplinkBuildError::Encoding(EncodingError::FCntExhausted))?;

        self.store.set(dev_eui, &[CounterField::FCntUp(fcnt)])?;
        session.fcnt_up = fcnt;

        let bytes = self.assemble(session, keys, uplink, fcnt)?;

        session.ack_pending = None;
        if uplink.confirmed {
            session.confirmed_uplink = Some(fcnt);
        }
        debug!(
            dev_eui = %dev_eui,
            fcnt,
            f_port = ?uplink.f_port,
            len = bytes.len(),
            "uplink built"
        );
        Ok(BuiltUplink { bytes, fcnt })
    }

    fn assemble(
        &self,
        session: &SessionState,
        keys: &SessionKeys,
        uplink: &Uplink<'_>,
        fcnt: u32,
    ) -> Result<PhyBuffer, UplinkBuildError> {
        let dev_addr = session.dev_addr;

        let commands = encode_commands(uplink.mac_commands)?;
        if commands.len() > MAX_FOPTS_LEN {
            return Err(EncodingError::FOptsTooLong(commands.len()).into());
        }
        let mut f_opts: Vec<u8, MAX_FOPTS_LEN> =
            Vec::from_slice(&commands).map_err(|_| EncodingError::BufferTooSmall)?;

        if uplink.payload.len() > MAX_MAC_PAYLOAD_SIZE {
            return Err(EncodingError::PayloadTooLong(uplink.payload.len()).into());
        }
        let mut frm_payload: Vec<u8, MAX_MAC_PAYLOAD_SIZE> =
            Vec::from_slice(uplink.payload).map_err(|_| EncodingError::BufferTooSmall)?;

        if session.mac_version == MacVersion::V1_1 && !f_opts.is_empty() {
            crypto::encrypt_fopts(
                self.crypto,
                &keys.nwk_s_enc_key,
                dev_addr,
                fcnt,
                Direction::Up,
                false,
                &mut f_opts,
            )?;
        }

        if let Some(port) = uplink.f_port {
            let key = if port == 0 {
                &keys.nwk_s_enc_key
            } else {
                &keys.app_s_key
            };
            crypto::encrypt_frm_payload(
                self.crypto,
                key,
                dev_addr,
                fcnt,
                Direction::Up,
                &mut frm_payload,
            )?;
        }

        let frame = DataFrame {
            mtype: if uplink.confirmed {
                MType::ConfirmedDataUp
            } else {
                MType::UnconfirmedDataUp
            },
            major: self.config.major,
            fhdr: FHDR {
                dev_addr,
                f_ctrl: FCtrl {
                    adr: uplink.adr,
                    adr_ack_req: uplink.adr_ack_req,
                    ack: session.ack_pending.is_some(),
                    f_pending: uplink.class_b,
                    f_opts_len: f_opts.len() as u8,
                },
                f_cnt: fcnt as u16,
                f_opts,
            },
            f_port: uplink.f_port,
            frm_payload,
        };
        let mut bytes = frame.encode_without_mic()?;

        let mic = match session.mac_version {
            MacVersion::V1_0 => crypto::compute_data_mic(
                self.crypto,
                &keys.f_nwk_s_int_key,
                dev_addr,
                fcnt,
                Direction::Up,
                0,
                &bytes,
            )?,
            MacVersion::V1_1 => {
                let indices = self.region.resolve(&uplink.tx)?;
                let conf_fcnt = session.ack_pending.map(|f| f as u16).unwrap_or(0);
                crypto::compute_uplink_mic_v1_1(
                    self.crypto,
                    &keys.f_nwk_s_int_key,
                    &keys.s_nwk_s_int_key,
                    dev_addr,
                    fcnt,
                    conf_fcnt,
                    indices.data_rate,
                    indices.channel,
                    &bytes,
                )?
            }
        };
        bytes
            .extend_from_slice(&mic)
            .map_err(|_| EncodingError::BufferTooSmall)?;
        Ok(bytes)
    }
}
