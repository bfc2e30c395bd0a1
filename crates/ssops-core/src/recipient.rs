//! Per-recipient RSA-OAEP envelope.
//!
//! `kind` only ever has one value (`"rsa"`) today, but is kept as a string
//! field, rather than a unit enum, so a later recipient kind is a data
//! change, not a format break.

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::protector::{self, PassphraseSource, ProtectedKeyRecord};

pub const RSA_KEY_BITS: usize = 2048;
const OAEP_HASH_LEN: usize = 32; // SHA-256 digest length

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientDescriptor {
    pub kind: String,
    pub name: String,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<ProtectedKeyRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientEnvelope {
    /// RSA-OAEP ciphertext, hex-encoded.
    pub ciphertext: String,
    pub configuration: RecipientDescriptor,
}

pub fn generate_keypair() -> Result<(RsaPrivateKey, RsaPublicKey)> {
    let mut rng = rand::rngs::OsRng;
    let sk = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| Error::ConfigInvalid(format!("RSA key generation failed: {e}")))?;
    let pk = RsaPublicKey::from(&sk);
    Ok((sk, pk))
}

pub fn public_key_to_pem(pk: &RsaPublicKey) -> Result<String> {
    pk.to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::ConfigInvalid(format!("public key encode failed: {e}")))
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| Error::ConfigInvalid(format!("invalid public key PEM: {e}")))
}

pub fn private_key_to_pkcs8_der(sk: &RsaPrivateKey) -> Result<Vec<u8>> {
    let doc = sk
        .to_pkcs8_der()
        .map_err(|e| Error::ConfigInvalid(format!("private key encode failed: {e}")))?;
    Ok(doc.as_bytes().to_vec())
}

pub fn private_key_from_pkcs8_der(der: &[u8]) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_der(der)
        .map_err(|e| Error::ConfigInvalid(format!("invalid private key bytes: {e}")))
}

/// Maximum plaintext length RSA-OAEP-SHA256 admits for a given key size.
pub fn max_payload_len(pk: &RsaPublicKey) -> usize {
    use rsa::traits::PublicKeyParts;
    let key_bytes = pk.size();
    key_bytes.saturating_sub(2 * OAEP_HASH_LEN + 2)
}

/// Encrypt `plaintext` for one recipient.
pub fn encrypt(descriptor: &RecipientDescriptor, plaintext: &[u8]) -> Result<RecipientEnvelope> {
    let pk = public_key_from_pem(&descriptor.public_key)?;
    let limit = max_payload_len(&pk);
    if plaintext.len() > limit {
        return Err(Error::PayloadTooLarge {
            len: plaintext.len(),
            limit,
        });
    }

    let mut rng = rand::rngs::OsRng;
    let ciphertext = pk
        .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| Error::ConfigInvalid(format!("RSA-OAEP encryption failed: {e}")))?;

    Ok(RecipientEnvelope {
        ciphertext: hex::encode(ciphertext),
        configuration: descriptor.clone(),
    })
}

/// Decrypt one recipient envelope.
///
/// Resolves the protected private key in priority order: the descriptor's
/// embedded copy first, then the local key store by name (verifying the
/// stored public key matches the descriptor's).
pub fn decrypt(
    envelope: &RecipientEnvelope,
    keystore: Option<&KeyStore>,
    source: &dyn PassphraseSource,
) -> Result<Vec<u8>> {
    let name = &envelope.configuration.name;

    let protected = if let Some(embedded) = &envelope.configuration.encrypted_private_key {
        embedded.clone()
    } else {
        let store = keystore.ok_or_else(|| Error::KeyStoreMissing("<home>/.ssops".into()))?;
        let stored_public_key = store.read_public_key(name)?;
        if stored_public_key != envelope.configuration.public_key {
            return Err(Error::PublicKeyMismatch);
        }
        store.read_private_key(name)?
    };

    let attempt = || -> Result<Vec<u8>> {
        let mut private_key_der = protector::unwrap(&protected, source)?;
        let sk = private_key_from_pkcs8_der(&private_key_der);
        private_key_der.zeroize();
        let sk = sk?;
        let ciphertext = hex::decode(&envelope.ciphertext)
            .map_err(|e| Error::ConfigInvalid(format!("invalid ciphertext hex: {e}")))?;
        sk.decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map_err(|e| Error::ConfigInvalid(format!("RSA-OAEP decryption failed: {e}")))
    };

    attempt().map_err(|e| Error::DecryptFailed {
        name: name.clone(),
        source: Box::new(e),
    })
}
