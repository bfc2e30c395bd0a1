//! Authorized-keys line parsing.
//!
//! Two things key off an authorized-keys line: protecting a private key
//! under an SSH-agent challenge only needs the raw key blob, while
//! importing an SSH key as a method recipient needs the blob decoded all
//! the way down to an RSA public key. Both start the same way: split
//! `"<type> <base64> [comment]"` and base64-decode the second field.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::BigUint;

use crate::error::{Error, Result};
use crate::wire::Reader;

pub struct AuthorizedKeyLine {
    pub key_type: String,
    pub blob: Vec<u8>,
    #[allow(dead_code)]
    pub comment: String,
}

/// Parse one `authorized_keys`-format line: `"<type> <base64> [comment]"`.
pub fn parse_authorized_key_line(line: &str) -> Result<AuthorizedKeyLine> {
    let line = line.trim();
    let mut fields = line.splitn(3, ' ');
    let key_type = fields
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::ConfigInvalid("empty authorized-keys line".into()))?
        .to_string();
    let encoded = fields
        .next()
        .ok_or_else(|| Error::ConfigInvalid("authorized-keys line missing key data".into()))?;
    let comment = fields.next().unwrap_or("").to_string();

    let blob = STANDARD
        .decode(encoded)
        .map_err(|e| Error::ConfigInvalid(format!("invalid base64 in authorized-keys line: {e}")))?;

    Ok(AuthorizedKeyLine {
        key_type,
        blob,
        comment,
    })
}

/// Decode an `ssh-rsa` wire-format blob (`string "ssh-rsa" || mpint e || mpint n`)
/// into an RSA public key. Rejects anything that isn't `ssh-rsa`: the scheme
/// depends on deterministic RSA signatures, so Ed25519/ECDSA/DSA agent keys
/// are never valid recipients or protectors.
pub fn rsa_public_key_from_ssh_blob(blob: &[u8]) -> Result<rsa::RsaPublicKey> {
    let mut r = Reader::new(blob);
    let key_type = String::from_utf8_lossy(&r.string()?).into_owned();
    if key_type != "ssh-rsa" {
        return Err(Error::UnsupportedRecipientKind(key_type));
    }
    let e = r.mpint()?;
    let n = r.mpint()?;
    rsa::RsaPublicKey::new(
        BigUint::from_bytes_be(&n),
        BigUint::from_bytes_be(&e),
    )
    .map_err(|e| Error::ConfigInvalid(format!("invalid RSA key in ssh blob: {e}")))
}
