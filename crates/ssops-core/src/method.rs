//! Method file: the append-only recipient list an `encrypt` run targets.
//!
//! Stored as a flat JSON array of [`RecipientDescriptor`], the same shape
//! `method show` renders as a table and `method add-key`/`add-ssh-key`
//! append to.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::recipient::RecipientDescriptor;
use crate::sshkey;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MethodFile {
    pub methods: Vec<RecipientDescriptor>,
}

impl MethodFile {
    pub fn new() -> Self {
        MethodFile::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| Error::ConfigInvalid(format!("malformed method file: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::ConfigInvalid(format!("serializing method file: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn find(&self, kind: &str, name: &str) -> Option<&RecipientDescriptor> {
        self.methods
            .iter()
            .find(|d| d.kind == kind && d.name == name)
    }

    /// Append a descriptor, refusing a `(kind, name)` already present.
    pub fn add(&mut self, descriptor: RecipientDescriptor) -> Result<()> {
        if self.find(&descriptor.kind, &descriptor.name).is_some() {
            log::warn!(
                "refusing duplicate recipient {}:{}",
                descriptor.kind,
                descriptor.name
            );
            return Err(Error::DuplicateRecipient {
                kind: descriptor.kind,
                name: descriptor.name,
            });
        }
        log::info!("added recipient {}:{}", descriptor.kind, descriptor.name);
        self.methods.push(descriptor);
        Ok(())
    }

    /// Import an `authorized_keys`-style RSA line as an `"rsa"` recipient.
    ///
    /// The recipient's name is the key file's basename with a trailing
    /// `.pub` stripped, rather than sliced by a fixed suffix length. A
    /// basename shorter than `.pub` would otherwise report a name with
    /// leading characters silently chopped off.
    pub fn add_ssh_key(&mut self, path: &Path) -> Result<()> {
        let line_text = std::fs::read_to_string(path)?;
        let line_text = line_text
            .lines()
            .next()
            .ok_or_else(|| Error::ConfigInvalid("empty SSH public key file".into()))?;
        let parsed = sshkey::parse_authorized_key_line(line_text)?;
        let pk = sshkey::rsa_public_key_from_ssh_blob(&parsed.blob)?;
        let public_key_pem = crate::recipient::public_key_to_pem(&pk)?;

        let basename = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::ConfigInvalid("SSH public key path has no file name".into()))?;
        let name = basename.strip_suffix(".pub").unwrap_or(basename).to_string();

        self.add(RecipientDescriptor {
            kind: "rsa".to_string(),
            name,
            public_key: public_key_pem,
            encrypted_private_key: None,
        })
    }

    /// `(name, kind, embedded?)` rows for `method show`.
    pub fn rows(&self) -> Vec<(String, String, bool)> {
        self.methods
            .iter()
            .map(|d| {
                (
                    d.name.clone(),
                    d.kind.clone(),
                    d.encrypted_private_key.is_some(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::{generate_keypair, public_key_to_pem};

    fn descriptor(name: &str) -> RecipientDescriptor {
        let (_sk, pk) = generate_keypair().unwrap();
        RecipientDescriptor {
            kind: "rsa".to_string(),
            name: name.to_string(),
            public_key: public_key_to_pem(&pk).unwrap(),
            encrypted_private_key: None,
        }
    }

    #[test]
    fn create_is_empty() {
        let m = MethodFile::new();
        assert!(m.methods.is_empty());
    }

    #[test]
    fn add_rejects_duplicate_kind_and_name() {
        let mut m = MethodFile::new();
        m.add(descriptor("alex")).unwrap();
        assert!(matches!(
            m.add(descriptor("alex")),
            Err(Error::DuplicateRecipient { .. })
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("method.json");
        let mut m = MethodFile::new();
        m.add(descriptor("alex")).unwrap();
        m.save(&path).unwrap();

        let loaded = MethodFile::load(&path).unwrap();
        assert_eq!(loaded.methods.len(), 1);
        assert_eq!(loaded.methods[0].name, "alex");
    }

    #[test]
    fn rows_reports_embedded_flag() {
        let mut m = MethodFile::new();
        m.add(descriptor("alex")).unwrap();
        let rows = m.rows();
        assert_eq!(rows, vec![("alex".to_string(), "rsa".to_string(), false)]);
    }
}
