//! Private-key protector: passphrase or SSH-agent.
//!
//! Terminal prompting itself is injected through [`PassphraseSource`], which
//! the CLI crate implements with `rpassword`. Everything downstream of
//! "here is the typed string" lives here: comparing the two passphrase
//! entries, treating an empty unwrap prompt as a decline, driving the
//! SSH-agent challenge/response.

use std::path::Path;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::agent::AgentClient;
use crate::error::{Error, Result};
use crate::kdf::{self, WrapRecord};
use crate::security::constant_time_eq;
use crate::sshkey;

/// Supplies passphrases typed at a terminal. Implemented by the CLI crate;
/// core only depends on the trait so it never touches a tty directly.
pub trait PassphraseSource {
    fn read(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshAgentWrapRecord {
    /// 32 random bytes, hex-encoded.
    pub challenge: String,
    /// The authorized-keys text line identifying the protecting SSH key.
    pub ssh_public_key: String,
    /// A passphrase-style wrap record whose "password" is the agent's
    /// signature over `challenge`.
    pub encrypted_private_key: WrapRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Protection {
    #[serde(rename = "password")]
    Password(WrapRecord),
    #[serde(rename = "ssh-agent")]
    SshAgent(SshAgentWrapRecord),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedKeyRecord {
    pub name: String,
    #[serde(flatten)]
    pub protection: Protection,
}

/// Wrap `plaintext` under a passphrase, prompting twice and rejecting a
/// mismatch.
pub fn wrap_passphrase(
    name: &str,
    plaintext: &[u8],
    source: &dyn PassphraseSource,
) -> Result<ProtectedKeyRecord> {
    let first = source.read(&format!("Enter passphrase for {name}: "))?;
    let second = source.read(&format!("Confirm passphrase for {name}: "))?;
    if !constant_time_eq(first.as_bytes(), second.as_bytes()) {
        return Err(Error::PassphraseMismatch);
    }
    let record = kdf::wrap(first.as_bytes(), plaintext)?;
    Ok(ProtectedKeyRecord {
        name: name.to_string(),
        protection: Protection::Password(record),
    })
}

/// Wrap `plaintext` under an SSH-agent challenge signed by the key at
/// `ssh_public_key_path`.
pub fn wrap_ssh_agent(
    name: &str,
    plaintext: &[u8],
    ssh_public_key_path: &Path,
) -> Result<ProtectedKeyRecord> {
    let line_text = std::fs::read_to_string(ssh_public_key_path)?;
    let line_text = line_text.lines().next().unwrap_or("").to_string();
    let parsed = sshkey::parse_authorized_key_line(&line_text)?;
    if parsed.key_type != "ssh-rsa" {
        return Err(Error::UnsupportedRecipientKind(parsed.key_type));
    }

    let mut challenge = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut challenge);

    let mut agent = AgentClient::connect_env()?;
    let (_, signature) = sign_or_map_not_in_agent(&mut agent, &parsed.blob, &challenge)?;

    let encrypted_private_key = kdf::wrap(&signature, plaintext)?;

    Ok(ProtectedKeyRecord {
        name: name.to_string(),
        protection: Protection::SshAgent(SshAgentWrapRecord {
            challenge: hex::encode(challenge),
            ssh_public_key: line_text,
            encrypted_private_key,
        }),
    })
}

fn sign_or_map_not_in_agent(
    agent: &mut AgentClient,
    blob: &[u8],
    data: &[u8],
) -> Result<(String, Vec<u8>)> {
    match agent.sign(blob, data) {
        Ok(result) => Ok(result),
        Err(Error::AgentRefused) => {
            if agent.has_identity(blob)? {
                Err(Error::AgentRefused)
            } else {
                Err(Error::KeyNotInAgent)
            }
        }
        Err(e) => Err(e),
    }
}

/// Unwrap a protected private key, dispatching on its protection kind.
pub fn unwrap(record: &ProtectedKeyRecord, source: &dyn PassphraseSource) -> Result<Vec<u8>> {
    match &record.protection {
        Protection::Password(wrap_record) => {
            let passphrase = source.read(&format!("Enter passphrase for {}: ", record.name))?;
            if passphrase.is_empty() {
                return Err(Error::UserDeclined);
            }
            kdf::unwrap(passphrase.as_bytes(), wrap_record)
        }
        Protection::SshAgent(agent_record) => unwrap_ssh_agent(agent_record),
    }
}

fn unwrap_ssh_agent(record: &SshAgentWrapRecord) -> Result<Vec<u8>> {
    let parsed = sshkey::parse_authorized_key_line(&record.ssh_public_key)?;
    let challenge = hex::decode(&record.challenge)
        .map_err(|e| Error::ConfigInvalid(format!("invalid challenge hex: {e}")))?;

    let mut agent = AgentClient::connect_env()?;
    let (_, signature) = sign_or_map_not_in_agent(&mut agent, &parsed.blob, &challenge)?;

    kdf::unwrap(&signature, &record.encrypted_private_key).map_err(|e| match e {
        Error::BadPassphrase => Error::BadSignature,
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FixedPrompts(RefCell<Vec<String>>);

    impl FixedPrompts {
        fn new(answers: &[&str]) -> Self {
            FixedPrompts(RefCell::new(
                answers.iter().rev().map(|s| s.to_string()).collect(),
            ))
        }
    }

    impl PassphraseSource for FixedPrompts {
        fn read(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.borrow_mut().pop().unwrap_or_default())
        }
    }

    #[test]
    fn passphrase_round_trip() {
        let wrap_source = FixedPrompts::new(&["hunter2", "hunter2"]);
        let record = wrap_passphrase("alex", b"private key bytes", &wrap_source).unwrap();

        let unwrap_source = FixedPrompts::new(&["hunter2"]);
        let plaintext = unwrap(&record, &unwrap_source).unwrap();
        assert_eq!(plaintext, b"private key bytes");
    }

    #[test]
    fn mismatched_passphrase_rejected() {
        let wrap_source = FixedPrompts::new(&["hunter2", "hunter3"]);
        assert!(matches!(
            wrap_passphrase("alex", b"data", &wrap_source),
            Err(Error::PassphraseMismatch)
        ));
    }

    #[test]
    fn empty_unwrap_prompt_declines() {
        let wrap_source = FixedPrompts::new(&["hunter2", "hunter2"]);
        let record = wrap_passphrase("alex", b"data", &wrap_source).unwrap();

        let unwrap_source = FixedPrompts::new(&[""]);
        assert!(matches!(
            unwrap(&record, &unwrap_source),
            Err(Error::UserDeclined)
        ));
    }

    #[test]
    fn wrong_unwrap_passphrase_is_bad_passphrase() {
        let wrap_source = FixedPrompts::new(&["hunter2", "hunter2"]);
        let record = wrap_passphrase("alex", b"data", &wrap_source).unwrap();

        let unwrap_source = FixedPrompts::new(&["nope"]);
        assert!(matches!(
            unwrap(&record, &unwrap_source),
            Err(Error::BadPassphrase)
        ));
    }
}
