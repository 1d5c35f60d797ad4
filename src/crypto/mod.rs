//! LoRaWAN cryptographic operations
//!
//! This module sequences the AES-128 and AES-CMAC primitives into the
//! LoRaWAN 1.0.x / 1.1 constructions:
//! - Message Integrity Code (MIC) computation for join and data frames
//! - FRMPayload and FOpts encryption/decryption
//! - Join accept encryption
//! - Session key derivation
//!
//! The primitives themselves sit behind [`CryptoProvider`]; [`DefaultCrypto`]
//! uses the `aes` and `cmac` crates.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use zeroize::Zeroize;

/// Root and session key material
pub mod keys;

pub use keys::{AESKey, RootKeys, SessionKeys};

use crate::config::device::{DevAddr, EUI64};

/// MIC size in bytes
pub const MIC_SIZE: usize = 4;

/// Block size for AES-128
pub const BLOCK_SIZE: usize = 16;

/// One AES block
pub type Block = [u8; BLOCK_SIZE];

/// Key type byte for FNwkSIntKey (1.0: NwkSKey)
pub const F_NWK_S_INT_KEY: u8 = 0x01;
/// Key type byte for AppSKey
pub const APP_S_KEY: u8 = 0x02;
/// Key type byte for SNwkSIntKey
pub const S_NWK_S_INT_KEY: u8 = 0x03;
/// Key type byte for NwkSEncKey
pub const NWK_S_ENC_KEY: u8 = 0x04;
/// Key type byte for JSIntKey
pub const JS_INT_KEY: u8 = 0x06;

/// JoinReqType value for a join-request (as opposed to a rejoin)
pub const JOIN_REQUEST_TYPE: u8 = 0xFF;

/// Errors raised by the cipher layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The cipher rejected the key
    #[error("cipher rejected the key")]
    InvalidKey,
    /// Input is longer than the construction allows
    #[error("input of {0} bytes exceeds the block construction")]
    TooLong(usize),
    /// Input is not a whole number of AES blocks
    #[error("input of {0} bytes is not block aligned")]
    Unaligned(usize),
}

/// AES-128 and AES-CMAC primitives
pub trait CryptoProvider {
    /// Encrypt one block in place (AES-128-ECB)
    fn encrypt_block(&self, key: &AESKey, block: &mut Block) -> Result<(), CryptoError>;

    /// Decrypt one block in place (AES-128-ECB)
    fn decrypt_block(&self, key: &AESKey, block: &mut Block) -> Result<(), CryptoError>;

    /// AES-CMAC over the concatenation of `parts`
    fn cmac(&self, key: &AESKey, parts: &[&[u8]]) -> Result<Block, CryptoError>;
}

/// Provider backed by the `aes` and `cmac` crates
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCrypto;

impl CryptoProvider for DefaultCrypto {
    fn encrypt_block(&self, key: &AESKey, block: &mut Block) -> Result<(), CryptoError> {
        let cipher = Aes128::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        Ok(())
    }

    fn decrypt_block(&self, key: &AESKey, block: &mut Block) -> Result<(), CryptoError> {
        let cipher = Aes128::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        Ok(())
    }

    fn cmac(&self, key: &AESKey, parts: &[&[u8]]) -> Result<Block, CryptoError> {
        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::InvalidKey)?;
        for part in parts {
            mac.update(part);
        }
        let tag = mac.finalize().into_bytes();
        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&tag);
        Ok(out)
    }
}

/// Direction identifiers for cryptographic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Uplink (device to network)
    Up = 0,
    /// Downlink (network to device)
    Down = 1,
}

/// Common layout of the B0/B1 MIC blocks and the A_i encryption blocks
fn data_block(prefix: u8, dir: Direction, dev_addr: DevAddr, fcnt: u32) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = prefix;
    block[5] = dir as u8;
    block[6..10].copy_from_slice(&dev_addr.to_wire());
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());
    block
}

fn truncate(tag: &Block) -> [u8; MIC_SIZE] {
    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(&tag[..MIC_SIZE]);
    mic
}

fn length_byte(msg: &[u8]) -> Result<u8, CryptoError> {
    u8::try_from(msg.len()).map_err(|_| CryptoError::TooLong(msg.len()))
}

/// Compute the MIC of a join-request
///
/// `msg` is `MHDR | JoinEUI | DevEUI | DevNonce`.
pub fn compute_join_request_mic<C: CryptoProvider>(
    crypto: &C,
    nwk_key: &AESKey,
    msg: &[u8],
) -> Result<[u8; MIC_SIZE], CryptoError> {
    Ok(truncate(&crypto.cmac(nwk_key, &[msg])?))
}

/// Compute the MIC of a join-accept answered in 1.0 mode (OptNeg unset)
///
/// `msg` is `MHDR | JoinNonce | NetID | DevAddr | DLSettings | RxDelay | CFList`.
pub fn compute_join_accept_mic<C: CryptoProvider>(
    crypto: &C,
    nwk_key: &AESKey,
    msg: &[u8],
) -> Result<[u8; MIC_SIZE], CryptoError> {
    Ok(truncate(&crypto.cmac(nwk_key, &[msg])?))
}

/// Compute the MIC of a join-accept answered in 1.1 mode (OptNeg set)
pub fn compute_join_accept_mic_v1_1<C: CryptoProvider>(
    crypto: &C,
    js_int_key: &AESKey,
    join_req_type: u8,
    join_eui: EUI64,
    dev_nonce: u16,
    msg: &[u8],
) -> Result<[u8; MIC_SIZE], CryptoError> {
    let join_eui = join_eui.to_wire();
    let dev_nonce = dev_nonce.to_le_bytes();
    let tag = crypto.cmac(
        js_int_key,
        &[&[join_req_type][..], &join_eui[..], &dev_nonce[..], msg],
    )?;
    Ok(truncate(&tag))
}

/// Compute a data frame MIC using a single B0 block
///
/// This is the 1.0 MIC in both directions and the 1.1 downlink MIC.
/// `conf_fcnt` is only non-zero for 1.1 downlinks acknowledging an uplink.
pub fn compute_data_mic<C: CryptoProvider>(
    crypto: &C,
    key: &AESKey,
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
    conf_fcnt: u16,
    msg: &[u8],
) -> Result<[u8; MIC_SIZE], CryptoError> {
    let mut b0 = data_block(0x49, dir, dev_addr, fcnt);
    b0[1..3].copy_from_slice(&conf_fcnt.to_le_bytes());
    b0[15] = length_byte(msg)?;
    Ok(truncate(&crypto.cmac(key, &[&b0[..], msg])?))
}

/// Compute a LoRaWAN 1.1 uplink MIC
///
/// The result is `cmacS[0..2] | cmacF[0..2]` where cmacS runs over B1 with
/// SNwkSIntKey and cmacF over B0 with FNwkSIntKey.
#[allow(clippy::too_many_arguments)]
pub fn compute_uplink_mic_v1_1<C: CryptoProvider>(
    crypto: &C,
    f_nwk_s_int_key: &AESKey,
    s_nwk_s_int_key: &AESKey,
    dev_addr: DevAddr,
    fcnt: u32,
    conf_fcnt: u16,
    tx_dr: u8,
    tx_ch: u8,
    msg: &[u8],
) -> Result<[u8; MIC_SIZE], CryptoError> {
    let mut b0 = data_block(0x49, Direction::Up, dev_addr, fcnt);
    b0[15] = length_byte(msg)?;

    let mut b1 = b0;
    b1[1..3].copy_from_slice(&conf_fcnt.to_le_bytes());
    b1[3] = tx_dr;
    b1[4] = tx_ch;

    let cmac_s = crypto.cmac(s_nwk_s_int_key, &[&b1[..], msg])?;
    let cmac_f = crypto.cmac(f_nwk_s_int_key, &[&b0[..], msg])?;
    Ok([cmac_s[0], cmac_s[1], cmac_f[0], cmac_f[1]])
}

/// Encrypt or decrypt an FRMPayload in place (AES-128 in CTR-like mode)
///
/// The operation is its own inverse.
pub fn encrypt_frm_payload<C: CryptoProvider>(
    crypto: &C,
    key: &AESKey,
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
    payload: &mut [u8],
) -> Result<(), CryptoError> {
    if payload.len() > 255 * BLOCK_SIZE {
        return Err(CryptoError::TooLong(payload.len()));
    }

    for (i, chunk) in payload.chunks_mut(BLOCK_SIZE).enumerate() {
        let mut s = data_block(0x01, dir, dev_addr, fcnt);
        s[15] = (i + 1) as u8;
        crypto.encrypt_block(key, &mut s)?;
        for (byte, pad) in chunk.iter_mut().zip(s.iter()) {
            *byte ^= pad;
        }
    }

    Ok(())
}

/// Encrypt or decrypt 1.1 FOpts in place under NwkSEncKey
///
/// `a_fcnt_down` selects the application downlink counter variant of the
/// keystream block and is ignored for uplinks.
pub fn encrypt_fopts<C: CryptoProvider>(
    crypto: &C,
    nwk_s_enc_key: &AESKey,
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
    a_fcnt_down: bool,
    fopts: &mut [u8],
) -> Result<(), CryptoError> {
    if fopts.len() > 15 {
        return Err(CryptoError::TooLong(fopts.len()));
    }

    let mut s = data_block(0x01, dir, dev_addr, fcnt);
    if dir == Direction::Down {
        s[4] = if a_fcnt_down { 0x02 } else { 0x01 };
    }
    s[15] = 0x01;
    crypto.encrypt_block(nwk_s_enc_key, &mut s)?;

    for (byte, pad) in fopts.iter_mut().zip(s.iter()) {
        *byte ^= pad;
    }
    Ok(())
}

/// Decrypt a received join-accept body (everything after MHDR) in place
///
/// The network encrypts with the AES decrypt operation, so the device
/// recovers the plaintext with AES encrypt.
pub fn decrypt_join_accept<C: CryptoProvider>(
    crypto: &C,
    key: &AESKey,
    data: &mut [u8],
) -> Result<(), CryptoError> {
    for_each_block(data, |block| crypto.encrypt_block(key, block))
}

/// Encrypt a join-accept body in place the way a network server does
pub fn encrypt_join_accept<C: CryptoProvider>(
    crypto: &C,
    key: &AESKey,
    data: &mut [u8],
) -> Result<(), CryptoError> {
    for_each_block(data, |block| crypto.decrypt_block(key, block))
}

fn for_each_block<F>(data: &mut [u8], mut op: F) -> Result<(), CryptoError>
where
    F: FnMut(&mut Block) -> Result<(), CryptoError>,
{
    if data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::Unaligned(data.len()));
    }

    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        op(&mut block)?;
        chunk.copy_from_slice(&block);
    }
    Ok(())
}

/// Parameters of a completed join that feed session key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinContext {
    /// JoinNonce (1.0: AppNonce), 24 bits
    pub join_nonce: u32,
    /// Home NetID, 24 bits
    pub net_id: u32,
    /// JoinEUI (1.0: AppEUI)
    pub join_eui: EUI64,
    /// DevNonce of the answered join-request
    pub dev_nonce: u16,
    /// OptNeg bit from the join-accept DLSettings
    pub opt_neg: bool,
}

/// Derive a single session key
///
/// The block is `key_type | JoinNonce | NetID | DevNonce | pad16` or, with
/// OptNeg set, `key_type | JoinNonce | JoinEUI | DevNonce | pad16`.
pub fn derive_session_key<C: CryptoProvider>(
    crypto: &C,
    root_key: &AESKey,
    key_type: u8,
    ctx: &JoinContext,
) -> Result<AESKey, CryptoError> {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = key_type;
    block[1..4].copy_from_slice(&ctx.join_nonce.to_le_bytes()[..3]);
    if ctx.opt_neg {
        block[4..12].copy_from_slice(&ctx.join_eui.to_wire());
        block[12..14].copy_from_slice(&ctx.dev_nonce.to_le_bytes());
    } else {
        block[4..7].copy_from_slice(&ctx.net_id.to_le_bytes()[..3]);
        block[7..9].copy_from_slice(&ctx.dev_nonce.to_le_bytes());
    }

    crypto.encrypt_block(root_key, &mut block)?;
    let key = AESKey::new(block);
    block.zeroize();
    Ok(key)
}

/// Derive all session keys after a join-accept
///
/// Either every key is derived or an error is returned; there is no partial
/// result.
pub fn derive_session_keys<C: CryptoProvider>(
    crypto: &C,
    root: &RootKeys,
    ctx: &JoinContext,
) -> Result<SessionKeys, CryptoError> {
    if ctx.opt_neg {
        Ok(SessionKeys::new_v1_1(
            derive_session_key(crypto, &root.nwk_key, F_NWK_S_INT_KEY, ctx)?,
            derive_session_key(crypto, &root.nwk_key, S_NWK_S_INT_KEY, ctx)?,
            derive_session_key(crypto, &root.nwk_key, NWK_S_ENC_KEY, ctx)?,
            derive_session_key(crypto, &root.app_key, APP_S_KEY, ctx)?,
        ))
    } else {
        let nwk_s_key = derive_session_key(crypto, &root.nwk_key, F_NWK_S_INT_KEY, ctx)?;
        let app_s_key = derive_session_key(crypto, &root.nwk_key, APP_S_KEY, ctx)?;
        Ok(SessionKeys::new_v1_0(nwk_s_key, app_s_key))
    }
}

/// Derive the 1.1 join server integrity key used for join-accept MICs
pub fn derive_js_int_key<C: CryptoProvider>(
    crypto: &C,
    nwk_key: &AESKey,
    dev_eui: EUI64,
) -> Result<AESKey, CryptoError> {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = JS_INT_KEY;
    block[1..9].copy_from_slice(&dev_eui.to_wire());
    crypto.encrypt_block(nwk_key, &mut block)?;
    let key = AESKey::new(block);
    block.zeroize();
    Ok(key)
}
