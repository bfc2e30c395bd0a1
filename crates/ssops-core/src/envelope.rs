//! Multi-recipient envelope: combines per-recipient envelopes into one
//! encrypted artifact and reverses the process on decrypt by trying each
//! entry in turn.
//!
//! The try-in-order decrypt loop stops at the first success and otherwise
//! accumulates every cause for the aggregate error.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::method::MethodFile;
use crate::protector::PassphraseSource;
use crate::recipient::{self, RecipientEnvelope};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub kind: String,
    pub name: String,
    pub encrypted: RecipientEnvelope,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Artifact(pub Vec<ArtifactEntry>);

/// Encrypt `plaintext` for every recipient in `method` (optionally filtered
/// to a single name), preserving method order.
pub fn encrypt(
    method: &MethodFile,
    plaintext: &[u8],
    name_filter: Option<&str>,
) -> Result<Artifact> {
    let mut entries = Vec::new();
    for descriptor in &method.methods {
        if let Some(filter) = name_filter {
            if descriptor.name != filter {
                continue;
            }
        }
        let envelope = recipient::encrypt(descriptor, plaintext)?;
        entries.push(ArtifactEntry {
            kind: descriptor.kind.clone(),
            name: descriptor.name.clone(),
            encrypted: envelope,
        });
    }
    Ok(Artifact(entries))
}

/// Decrypt an [`Artifact`], trying entries in order and stopping at the
/// first success. A name filter restricts the attempt
/// set before iteration begins. Every failure, including a user-declined
/// prompt, is folded into the per-recipient cause list; if none succeed,
/// the causes are reported together as [`Error::AllRecipientsFailed`].
pub fn decrypt(
    artifact: &Artifact,
    keystore: Option<&KeyStore>,
    source: &dyn PassphraseSource,
    name_filter: Option<&str>,
) -> Result<Vec<u8>> {
    let mut causes = Vec::new();
    for entry in &artifact.0 {
        if let Some(filter) = name_filter {
            if entry.name != filter {
                continue;
            }
        }
        match recipient::decrypt(&entry.encrypted, keystore, source) {
            Ok(plaintext) => {
                log::info!("decrypted using recipient {:?}", entry.name);
                return Ok(plaintext);
            }
            Err(e) => {
                log::warn!("recipient {:?} failed: {e}", entry.name);
                causes.push((entry.name.clone(), e));
            }
        }
    }
    log::error!("all {} recipients failed", causes.len());
    Err(Error::AllRecipientsFailed(causes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::{generate_keypair, private_key_to_pkcs8_der, public_key_to_pem};

    struct NoPrompt;
    impl PassphraseSource for NoPrompt {
        fn read(&self, _prompt: &str) -> Result<String> {
            Ok("hunter2".to_string())
        }
    }

    fn add_recipient(method: &mut MethodFile, name: &str) {
        let (sk, pk) = generate_keypair().unwrap();
        let der = private_key_to_pkcs8_der(&sk).unwrap();
        let protected = crate::protector::wrap_passphrase(name, &der, &NoPrompt).unwrap();
        method
            .add(crate::recipient::RecipientDescriptor {
                kind: "rsa".to_string(),
                name: name.to_string(),
                public_key: public_key_to_pem(&pk).unwrap(),
                encrypted_private_key: Some(protected),
            })
            .unwrap();
    }

    #[test]
    fn multi_recipient_round_trip_preserves_order() {
        let mut method = MethodFile::new();
        add_recipient(&mut method, "alex");
        add_recipient(&mut method, "mathieu");

        let artifact = encrypt(&method, b"top secret", None).unwrap();
        assert_eq!(artifact.0.len(), 2);
        assert_eq!(artifact.0[0].name, "alex");
        assert_eq!(artifact.0[1].name, "mathieu");

        let out = decrypt(&artifact, None, &NoPrompt, None).unwrap();
        assert_eq!(out, b"top secret");
    }

    #[test]
    fn succeeds_regardless_of_recipient_position() {
        let mut method = MethodFile::new();
        add_recipient(&mut method, "alex");
        add_recipient(&mut method, "mathieu");
        let artifact = encrypt(&method, b"payload", None).unwrap();

        // Only "mathieu" (the second entry) can actually be unwrapped here;
        // the attempted-but-failed first entry must not abort the loop.
        struct OnlyMathieu;
        impl PassphraseSource for OnlyMathieu {
            fn read(&self, prompt: &str) -> Result<String> {
                if prompt.contains("mathieu") {
                    Ok("hunter2".to_string())
                } else {
                    Ok(String::new())
                }
            }
        }
        let out = decrypt(&artifact, None, &OnlyMathieu, None).unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn name_filter_restricts_encrypt_and_decrypt() {
        let mut method = MethodFile::new();
        add_recipient(&mut method, "alex");
        add_recipient(&mut method, "mathieu");

        let artifact = encrypt(&method, b"payload", Some("alex")).unwrap();
        assert_eq!(artifact.0.len(), 1);
        assert_eq!(artifact.0[0].name, "alex");

        assert!(matches!(
            decrypt(&artifact, None, &NoPrompt, Some("mathieu")),
            Err(Error::AllRecipientsFailed(ref causes)) if causes.is_empty()
        ));
    }

    #[test]
    fn all_recipients_failing_reports_aggregate_error() {
        let mut method = MethodFile::new();
        add_recipient(&mut method, "alex");
        let artifact = encrypt(&method, b"payload", None).unwrap();

        struct WrongPassphrase;
        impl PassphraseSource for WrongPassphrase {
            fn read(&self, _prompt: &str) -> Result<String> {
                Ok("not-it".to_string())
            }
        }
        match decrypt(&artifact, None, &WrongPassphrase, None) {
            Err(Error::AllRecipientsFailed(causes)) => {
                assert_eq!(causes.len(), 1);
                assert_eq!(causes[0].0, "alex");
            }
            other => panic!("expected AllRecipientsFailed, got {other:?}"),
        }
    }
}
