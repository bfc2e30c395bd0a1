//! scrypt-derived-key AES-GCM wrapping.
//!
//! Derives a 256-bit key with `scrypt` straight from a passphrase (or an
//! SSH-agent signature, upstream in `protector.rs`) and uses it to seal
//! the private key under AES-256-GCM. The ciphertext field holds
//! `nonce || ct || tag`.

use aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{Error, Result};

const SCRYPT_LOG_N: u8 = 14; // N = 2^14 = 16384
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScryptParams {
    pub n: u32,
    pub r: u32,
    pub p: u32,
    pub length: u32,
}

impl Default for ScryptParams {
    fn default() -> Self {
        ScryptParams {
            n: 1u32 << SCRYPT_LOG_N,
            r: SCRYPT_R,
            p: SCRYPT_P,
            length: KEY_LEN as u32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub scrypt: ScryptInner,
    /// 12-byte nonce || AES-GCM ciphertext+tag, hex-encoded.
    pub ciphertext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScryptInner {
    pub salt: String,
    pub length: u32,
    pub n: u32,
    pub r: u32,
    pub p: u32,
}

const KDF_TYPE: &str = "scrypt-aes-gcm";

fn derive_key(password: &[u8], salt: &[u8], params: &ScryptParams) -> Result<[u8; KEY_LEN]> {
    let log_n = (params.n as f64).log2();
    if log_n.fract() != 0.0 || log_n < 1.0 || log_n > 63.0 {
        return Err(Error::ConfigInvalid(format!("invalid scrypt N={}", params.n)));
    }
    let scrypt_params = scrypt::Params::new(log_n as u8, params.r, params.p, params.length as usize)
        .map_err(|e| Error::ConfigInvalid(format!("invalid scrypt params: {e}")))?;
    let mut out = [0u8; KEY_LEN];
    scrypt::scrypt(password, salt, &scrypt_params, &mut out)
        .map_err(|e| Error::ConfigInvalid(format!("scrypt derivation failed: {e}")))?;
    Ok(out)
}

/// `wrap(password, plaintext) -> record`.
pub fn wrap(password: &[u8], plaintext: &[u8]) -> Result<WrapRecord> {
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let params = ScryptParams::default();
    let mut key = derive_key(password, &salt, &params)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| Error::ConfigInvalid(format!("invalid AES-GCM key: {e}")))?;
    key.zeroize();
    let ct = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| Error::ConfigInvalid("AES-GCM encryption failed".into()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ct.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ct);

    Ok(WrapRecord {
        kind: KDF_TYPE.to_string(),
        scrypt: ScryptInner {
            salt: hex::encode(salt),
            length: params.length,
            n: params.n,
            r: params.r,
            p: params.p,
        },
        ciphertext: hex::encode(blob),
    })
}

/// `unwrap(password, record) -> plaintext`.
pub fn unwrap(password: &[u8], record: &WrapRecord) -> Result<Vec<u8>> {
    if record.kind != KDF_TYPE {
        return Err(Error::UnsupportedKdf(record.kind.clone()));
    }

    let salt = hex::decode(&record.scrypt.salt)
        .map_err(|e| Error::ConfigInvalid(format!("invalid salt hex: {e}")))?;
    let params = ScryptParams {
        n: record.scrypt.n,
        r: record.scrypt.r,
        p: record.scrypt.p,
        length: record.scrypt.length,
    };
    let mut key = derive_key(password, &salt, &params)?;

    let blob = hex::decode(&record.ciphertext)
        .map_err(|e| Error::ConfigInvalid(format!("invalid ciphertext hex: {e}")))?;
    if blob.len() < NONCE_LEN {
        return Err(Error::ConfigInvalid("ciphertext shorter than nonce".into()));
    }
    let (nonce_bytes, ct) = blob.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| Error::ConfigInvalid(format!("invalid AES-GCM key: {e}")))?;
    key.zeroize();
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ct)
        .map_err(|_| Error::BadPassphrase)
}
