//! Root and session key material
//!
//! Key bytes are zeroed when the owning value is dropped. `Debug` output never
//! contains key bytes.

use core::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-128 key (16 bytes)
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AESKey([u8; 16]);

impl AESKey {
    /// Create a key from raw bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for AESKey {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for AESKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AESKey(..)")
    }
}

/// Long-lived root keys provisioned on the device
///
/// For LoRaWAN 1.0.x devices the single 1.0 "AppKey" goes into `nwk_key`;
/// `app_key` is only used once a 1.1 network negotiates OptNeg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootKeys {
    /// Network root key (NwkKey)
    pub nwk_key: AESKey,
    /// Application root key (AppKey)
    pub app_key: AESKey,
}

impl RootKeys {
    /// Create root keys
    pub fn new(nwk_key: AESKey, app_key: AESKey) -> Self {
        Self { nwk_key, app_key }
    }
}

/// Session keys of an activated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    /// Forwarding network session integrity key (1.0: NwkSKey)
    pub f_nwk_s_int_key: AESKey,
    /// Serving network session integrity key (1.0: NwkSKey)
    pub s_nwk_s_int_key: AESKey,
    /// Network session encryption key (1.0: NwkSKey)
    pub nwk_s_enc_key: AESKey,
    /// Application session key
    pub app_s_key: AESKey,
}

impl SessionKeys {
    /// LoRaWAN 1.0 session: one network session key in all three network roles
    pub fn new_v1_0(nwk_s_key: AESKey, app_s_key: AESKey) -> Self {
        Self {
            f_nwk_s_int_key: nwk_s_key.clone(),
            s_nwk_s_int_key: nwk_s_key.clone(),
            nwk_s_enc_key: nwk_s_key,
            app_s_key,
        }
    }

    /// LoRaWAN 1.1 session with distinct network keys
    pub fn new_v1_1(
        f_nwk_s_int_key: AESKey,
        s_nwk_s_int_key: AESKey,
        nwk_s_enc_key: AESKey,
        app_s_key: AESKey,
    ) -> Self {
        Self {
            f_nwk_s_int_key,
            s_nwk_s_int_key,
            nwk_s_enc_key,
            app_s_key,
        }
    }
}
