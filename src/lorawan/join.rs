//! OTAA join handshake
//!
//! `NotJoined -> AwaitingAccept -> Joined`, falling back to `NotJoined` when a
//! join-accept fails validation.

use tracing::{debug, info, warn};

use crate::config::device::{DevAddr, DeviceConfig, JoinState, MacVersion, SessionState};
use crate::crypto::{self, CryptoProvider, JoinContext, JOIN_REQUEST_TYPE, MIC_SIZE};
use crate::store::{CounterField, CounterStore};

use super::mac::{EncodingError, MType, MacError, Major, PhyBuffer};
use super::phy::{
    CfList, JoinAcceptPayload, JoinRequest, JOIN_ACCEPT_CFLIST_LEN, JOIN_ACCEPT_LEN,
};
use super::region::Region;

/// Outcome of an accepted join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAccept {
    /// Assigned device address
    pub dev_addr: DevAddr,
    /// Home NetID
    pub net_id: u32,
    /// Accepted JoinNonce
    pub join_nonce: u32,
    /// Network negotiated LoRaWAN 1.1
    pub opt_neg: bool,
    /// RX1 delay in seconds
    pub rx1_delay: u8,
    /// RX1 data rate offset
    pub rx1_dr_offset: u8,
    /// RX2 data rate
    pub rx2_data_rate: u8,
    /// Channel list, already applied to the band plan
    pub cf_list: Option<CfList>,
}

/// Join-request construction and join-accept validation for one device
pub struct JoinProcedure<'a, S, C> {
    config: &'a DeviceConfig,
    store: &'a S,
    crypto: &'a C,
}

impl<'a, S: CounterStore, C: CryptoProvider> JoinProcedure<'a, S, C> {
    /// Bind the procedure to a device's configuration and collaborators
    pub fn new(config: &'a DeviceConfig, store: &'a S, crypto: &'a C) -> Self {
        Self {
            config,
            store,
            crypto,
        }
    }

    /// Build a join-request with the next DevNonce
    ///
    /// The DevNonce is persisted before the frame is returned, so a frame
    /// that reaches the air never reuses a nonce.
    pub fn request(&self, session: &mut SessionState) -> Result<PhyBuffer, MacError> {
        let dev_eui = &self.config.dev_eui;
        let last = self
            .store
            .get(dev_eui)?
            .map(|record| record.dev_nonce)
            .unwrap_or(0);
        let dev_nonce = last
            .checked_add(1)
            .ok_or(EncodingError::DevNonceExhausted)?;

        let request = JoinRequest {
            join_eui: self.config.join_eui,
            dev_eui: self.config.dev_eui,
            dev_nonce,
        };
        let mut frame = request.encode_without_mic(self.config.major)?;
        let mic =
            crypto::compute_join_request_mic(self.crypto, &self.config.root_keys.nwk_key, &frame)?;
        frame
            .extend_from_slice(&mic)
            .map_err(|_| EncodingError::BufferTooSmall)?;

        self.store.set(dev_eui, &[CounterField::DevNonce(dev_nonce)])?;

        session.dev_nonce = dev_nonce;
        session.join_state = JoinState::AwaitingAccept { dev_nonce };
        debug!(dev_eui = %dev_eui, dev_nonce, "join-request built");
        Ok(frame)
    }

    /// Validate a join-accept answering the request carrying `dev_nonce`
    ///
    /// On success the session holds the derived keys and fresh counters and
    /// the channel list has been applied to `region`. A rejected accept sends
    /// the session back to `NotJoined`; a store outage keeps it awaiting the
    /// same accept. Nothing is persisted on failure.
    pub fn accept<R: Region>(
        &self,
        session: &mut SessionState,
        region: &mut R,
        dev_nonce: u16,
        frame: &[u8],
    ) -> Result<JoinAccept, MacError> {
        let result = self.validate_and_apply(session, region, dev_nonce, frame);
        match &result {
            Ok(accept) => info!(
                dev_eui = %self.config.dev_eui,
                dev_addr = %accept.dev_addr,
                join_nonce = accept.join_nonce,
                opt_neg = accept.opt_neg,
                "join accepted"
            ),
            Err(e) if e.is_transient() => {
                debug!(dev_eui = %self.config.dev_eui, error = %e, "join-accept deferred");
            }
            Err(e) => {
                session.join_state = JoinState::NotJoined;
                if e.is_security_rejection() {
                    warn!(dev_eui = %self.config.dev_eui, error = %e, "join-accept rejected");
                } else {
                    debug!(dev_eui = %self.config.dev_eui, error = %e, "join-accept failed");
                }
            }
        }
        result
    }

    fn validate_and_apply<R: Region>(
        &self,
        session: &mut SessionState,
        region: &mut R,
        dev_nonce: u16,
        frame: &[u8],
    ) -> Result<JoinAccept, MacError> {
        let body_len = frame.len().saturating_sub(1);
        if body_len != JOIN_ACCEPT_LEN && body_len != JOIN_ACCEPT_CFLIST_LEN {
            return Err(EncodingError::InvalidJoinAcceptLength(frame.len()).into());
        }
        let mtype = MType::from_mhdr(frame[0]);
        if mtype != MType::JoinAccept {
            return Err(EncodingError::UnexpectedMType(mtype).into());
        }
        Major::from_mhdr(frame[0])?;

        let root = &self.config.root_keys;
        let mut body = [0u8; JOIN_ACCEPT_CFLIST_LEN];
        let body = &mut body[..body_len];
        body.copy_from_slice(&frame[1..]);
        crypto::decrypt_join_accept(self.crypto, &root.nwk_key, body)?;

        let (fields, received_mic) = body.split_at(body_len - MIC_SIZE);
        let payload = JoinAcceptPayload::parse(fields)?;

        // A 1.0 device treats the OptNeg bit as RFU
        let opt_neg =
            payload.dl_settings.opt_neg && self.config.mac_version == MacVersion::V1_1;

        let mut msg = [0u8; 1 + JOIN_ACCEPT_CFLIST_LEN];
        msg[0] = frame[0];
        msg[1..1 + fields.len()].copy_from_slice(fields);
        let msg = &msg[..1 + fields.len()];

        let expected = if opt_neg {
            let js_int_key =
                crypto::derive_js_int_key(self.crypto, &root.nwk_key, self.config.dev_eui)?;
            crypto::compute_join_accept_mic_v1_1(
                self.crypto,
                &js_int_key,
                JOIN_REQUEST_TYPE,
                self.config.join_eui,
                dev_nonce,
                msg,
            )?
        } else {
            crypto::compute_join_accept_mic(self.crypto, &root.nwk_key, msg)?
        };
        if expected[..] != received_mic[..] {
            return Err(MacError::InvalidMic);
        }

        let dev_eui = &self.config.dev_eui;
        if let Some(last) = self.store.get(dev_eui)?.and_then(|r| r.join_nonce) {
            if payload.join_nonce <= last {
                return Err(MacError::ReplayedJoinNonce {
                    received: payload.join_nonce,
                    last,
                });
            }
        }

        let ctx = JoinContext {
            join_nonce: payload.join_nonce,
            net_id: payload.net_id,
            join_eui: self.config.join_eui,
            dev_nonce,
            opt_neg,
        };
        let keys = crypto::derive_session_keys(self.crypto, root, &ctx)?;

        self.store.set(
            dev_eui,
            &[
                CounterField::JoinNonce(payload.join_nonce),
                CounterField::FCntUp(0),
                CounterField::FCntDown(None),
            ],
        )?;

        session.join_state = JoinState::Joined;
        session.dev_addr = payload.dev_addr;
        session.mac_version = if opt_neg {
            MacVersion::V1_1
        } else {
            MacVersion::V1_0
        };
        session.keys = Some(keys);
        session.reset_counters();
        session.join_nonce = Some(payload.join_nonce);
        session.net_id = payload.net_id;
        session.rx1_delay = payload.rx1_delay_secs();
        session.rx1_dr_offset = payload.dl_settings.rx1_dr_offset;
        session.rx2_data_rate = payload.dl_settings.rx2_data_rate;

        if let Some(cf_list) = &payload.cf_list {
            region.apply_cf_list(cf_list);
        }

        Ok(JoinAccept {
            dev_addr: payload.dev_addr,
            net_id: payload.net_id,
            join_nonce: payload.join_nonce,
            opt_neg,
            rx1_delay: session.rx1_delay,
            rx1_dr_offset: payload.dl_settings.rx1_dr_offset,
            rx2_data_rate: payload.dl_settings.rx2_data_rate,
            cf_list: payload.cf_list,
        })
    }
}
