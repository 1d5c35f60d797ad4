//! High-level LoRaWAN device interface
//!
//! [`Device`] composes the join procedure, uplink builder and downlink
//! processor around one identity. Every operation holds the store's
//! per-identity lock for its read-modify-write of counters and nonces.

use core::convert::Infallible;
use core::fmt;

use tracing::{debug, info};

use crate::{
    config::device::{
        Activation, DevAddr, DeviceConfig, JoinState, SessionKeys, SessionState,
    },
    crypto::{CryptoProvider, DefaultCrypto},
    lorawan::{
        downlink::{Downlink, DownlinkProcessor},
        join::JoinProcedure,
        mac::{EncodingError, MType, MacError, PhyBuffer},
        region::Region,
        uplink::{BuiltUplink, Uplink, UplinkBuilder},
    },
    store::CounterStore,
    transport::{Transport, TxParams},
};

/// LoRaWAN device error type
#[derive(Debug)]
pub enum DeviceError<E = Infallible> {
    /// MAC layer error
    Mac(MacError),
    /// Invalid configuration
    InvalidConfig(&'static str),
    /// Operation not valid in the current join state
    InvalidState(JoinState),
    /// Transport failed to send a built frame
    Transport(E),
}

impl<E> From<MacError> for DeviceError<E> {
    fn from(error: MacError) -> Self {
        DeviceError::Mac(error)
    }
}

impl<E> DeviceError<E> {
    /// Authentication or freshness rejection of a received frame
    pub fn is_security_rejection(&self) -> bool {
        matches!(self, DeviceError::Mac(e) if e.is_security_rejection())
    }

    /// Infrastructure failure that left state unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Mac(e) if e.is_transient())
    }
}

impl DeviceError<Infallible> {
    /// Re-type an error that cannot carry a transport failure
    pub fn lift<E>(self) -> DeviceError<E> {
        match self {
            DeviceError::Mac(e) => DeviceError::Mac(e),
            DeviceError::InvalidConfig(reason) => DeviceError::InvalidConfig(reason),
            DeviceError::InvalidState(state) => DeviceError::InvalidState(state),
            DeviceError::Transport(never) => match never {},
        }
    }
}

impl<E: fmt::Debug> fmt::Display for DeviceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Mac(e) => write!(f, "{}", e),
            DeviceError::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            DeviceError::InvalidState(state) => {
                write!(f, "operation not valid in join state {:?}", state)
            }
            DeviceError::Transport(e) => write!(f, "transport error: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for DeviceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Mac(e) => Some(e),
            _ => None,
        }
    }
}

/// LoRaWAN end device
pub struct Device<S: CounterStore, REG: Region, C: CryptoProvider = DefaultCrypto> {
    config: DeviceConfig,
    session: SessionState,
    store: S,
    region: REG,
    crypto: C,
}

impl<S: CounterStore, REG: Region> Device<S, REG> {
    /// Create a device using the default AES/CMAC provider
    pub fn new(config: DeviceConfig, store: S, region: REG) -> Result<Self, DeviceError> {
        Self::with_crypto(config, store, region, DefaultCrypto)
    }
}

impl<S: CounterStore, REG: Region, C: CryptoProvider> Device<S, REG, C> {
    /// Create a device with a custom crypto provider
    ///
    /// Persisted counters and nonces of the identity are loaded from `store`.
    /// An OTAA device always starts unjoined.
    pub fn with_crypto(
        config: DeviceConfig,
        store: S,
        region: REG,
        crypto: C,
    ) -> Result<Self, DeviceError> {
        let mut session = match &config.activation {
            Activation::Otaa => SessionState::new(),
            Activation::Abp {
                dev_addr,
                session_keys,
            } => SessionState::new_abp(*dev_addr, session_keys.clone(), config.mac_version),
        };

        {
            let _guard = store.lock(&config.dev_eui).map_err(MacError::from)?;
            if let Some(record) = store.get(&config.dev_eui).map_err(MacError::from)? {
                session.fcnt_up = record.fcnt_up;
                session.fcnt_down = record.fcnt_down;
                session.dev_nonce = record.dev_nonce;
                session.join_nonce = record.join_nonce;
            }
        }

        debug!(
            dev_eui = %config.dev_eui,
            region = region.name(),
            otaa = config.is_otaa(),
            "device created"
        );
        Ok(Self {
            config,
            session,
            store,
            region,
            crypto,
        })
    }

    /// Build a join-request, consuming and persisting the next DevNonce
    pub fn build_join_request(&mut self) -> Result<PhyBuffer, DeviceError> {
        if !self.config.is_otaa() {
            return Err(DeviceError::InvalidConfig("ABP devices do not join"));
        }
        let _guard = self
            .store
            .lock(&self.config.dev_eui)
            .map_err(MacError::from)?;
        let procedure = JoinProcedure::new(&self.config, &self.store, &self.crypto);
        Ok(procedure.request(&mut self.session)?)
    }

    /// Build a join-request and hand it to the transport
    pub fn join<T: Transport>(
        &mut self,
        transport: &mut T,
        tx: &TxParams,
    ) -> Result<(), DeviceError<T::Error>> {
        let frame = self.build_join_request().map_err(DeviceError::lift)?;
        transport
            .send(&frame, tx, self.config.marshaler)
            .map_err(DeviceError::Transport)?;
        info!(dev_eui = %self.config.dev_eui, dev_nonce = self.session.dev_nonce, "join-request sent");
        Ok(())
    }

    /// Build an authenticated uplink, advancing the persisted uplink counter
    pub fn build_uplink(&mut self, uplink: &Uplink<'_>) -> Result<BuiltUplink, DeviceError> {
        let keys = self.active_keys()?;
        let _guard = self
            .store
            .lock(&self.config.dev_eui)
            .map_err(MacError::from)?;
        let builder = UplinkBuilder::new(&self.config, &self.store, &self.crypto, &self.region);
        Ok(builder.build(&mut self.session, &keys, uplink)?)
    }

    /// Build an uplink and hand it to the transport; returns the FCnt used
    ///
    /// The counter stays consumed when the transport fails.
    pub fn send_uplink<T: Transport>(
        &mut self,
        transport: &mut T,
        uplink: &Uplink<'_>,
    ) -> Result<u32, DeviceError<T::Error>> {
        let built = self.build_uplink(uplink).map_err(DeviceError::lift)?;
        transport
            .send(&built.bytes, &uplink.tx, self.config.marshaler)
            .map_err(DeviceError::Transport)?;
        Ok(built.fcnt)
    }

    /// Validate and decode a received PHY payload
    ///
    /// While a join-request is pending only a join-accept is valid; once
    /// joined only data downlinks addressed to this device are.
    pub fn process_downlink(&mut self, bytes: &[u8]) -> Result<Downlink, DeviceError> {
        let mhdr = *bytes
            .first()
            .ok_or(MacError::Encoding(EncodingError::TooShort(0)))?;
        let mtype = MType::from_mhdr(mhdr);

        match (mtype, self.session.join_state) {
            (MType::JoinAccept, JoinState::AwaitingAccept { dev_nonce }) => {
                let _guard = self
                    .store
                    .lock(&self.config.dev_eui)
                    .map_err(MacError::from)?;
                let procedure = JoinProcedure::new(&self.config, &self.store, &self.crypto);
                let accept =
                    procedure.accept(&mut self.session, &mut self.region, dev_nonce, bytes)?;
                Ok(Downlink::JoinAccept(accept))
            }
            (MType::JoinAccept, state) => Err(DeviceError::InvalidState(state)),
            (mtype, JoinState::Joined) if mtype.is_data_down() => {
                let keys = self.active_keys()?;
                let _guard = self
                    .store
                    .lock(&self.config.dev_eui)
                    .map_err(MacError::from)?;
                let processor = DownlinkProcessor::new(&self.config, &self.store, &self.crypto);
                Ok(Downlink::Data(processor.process(
                    &mut self.session,
                    &keys,
                    bytes,
                )?))
            }
            (mtype, _) if mtype.is_data_down() => {
                Err(DeviceError::InvalidState(self.session.join_state))
            }
            (mtype, _) => Err(MacError::Encoding(EncodingError::UnexpectedMType(mtype)).into()),
        }
    }

    /// Purge persisted counters and nonces and drop the session
    ///
    /// An ABP device keeps its provisioned session with counters back at 0.
    pub fn reset(&mut self) -> Result<(), DeviceError> {
        let _guard = self
            .store
            .lock(&self.config.dev_eui)
            .map_err(MacError::from)?;
        self.store
            .delete(&self.config.dev_eui)
            .map_err(MacError::from)?;

        self.session = match &self.config.activation {
            Activation::Otaa => SessionState::new(),
            Activation::Abp {
                dev_addr,
                session_keys,
            } => SessionState::new_abp(*dev_addr, session_keys.clone(), self.config.mac_version),
        };
        info!(dev_eui = %self.config.dev_eui, "device reset");
        Ok(())
    }

    fn active_keys(&self) -> Result<SessionKeys, DeviceError> {
        match (&self.session.join_state, &self.session.keys) {
            (JoinState::Joined, Some(keys)) => Ok(keys.clone()),
            (state, _) => Err(DeviceError::InvalidState(*state)),
        }
    }

    /// Device configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Current session state
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Current join state
    pub fn join_state(&self) -> JoinState {
        self.session.join_state
    }

    /// Whether a session is established
    pub fn is_joined(&self) -> bool {
        self.session.is_joined()
    }

    /// Device address of the current session
    pub fn dev_addr(&self) -> DevAddr {
        self.session.dev_addr
    }

    /// Session keys, once activated
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.session.keys.as_ref()
    }

    /// Last used uplink frame counter
    pub fn fcnt_up(&self) -> u32 {
        self.session.fcnt_up
    }

    /// Last accepted downlink frame counter, `None` before the first downlink
    pub fn fcnt_down(&self) -> Option<u32> {
        self.session.fcnt_down
    }

    /// Last used DevNonce
    pub fn dev_nonce(&self) -> u16 {
        self.session.dev_nonce
    }

    /// Band plan
    pub fn region(&self) -> &REG {
        &self.region
    }

    /// Mutable band plan
    pub fn region_mut(&mut self) -> &mut REG {
        &mut self.region
    }

    /// Counter store handle
    pub fn store(&self) -> &S {
        &self.store
    }
}
