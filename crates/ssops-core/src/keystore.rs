//! Key store: `<home>/.ssops/{name,name.pub}`.
//!
//! Writes are atomic-durable: write through a `tempfile::NamedTempFile` in
//! the target directory, `fsync` the file, rename into place, then `fsync`
//! the directory handle so the rename itself survives a crash. The
//! directory fsync matters here because the store is written to
//! repeatedly over the tool's lifetime, not just once.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::protector::ProtectedKeyRecord;
use crate::security;

pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    /// `<home>/.ssops`, created if absent.
    pub fn open_default() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::ConfigInvalid("cannot determine home directory".into()))?;
        Self::open(home.join(".ssops"))
    }

    pub fn open(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(KeyStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn private_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn public_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.pub"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.private_path(name).is_file() && self.public_path(name).is_file()
    }

    /// Persist both halves of a key. Refuses to overwrite an existing key
    /// unless `force` is set (used by `key protect` rewrapping).
    pub fn write_keypair(
        &self,
        name: &str,
        private_record: &ProtectedKeyRecord,
        public_key_pem: &str,
        force: bool,
    ) -> Result<()> {
        if !force && self.exists(name) {
            return Err(Error::KeyExists(name.to_string()));
        }
        let private_json = serde_json::to_string_pretty(private_record)
            .map_err(|e| Error::ConfigInvalid(format!("serializing private key record: {e}")))?;
        atomic_write(&self.private_path(name), private_json.as_bytes(), true)?;
        atomic_write(&self.public_path(name), public_key_pem.as_bytes(), false)?;
        log::info!("wrote key {name:?} to {}", self.dir.display());
        Ok(())
    }

    pub fn read_private_key(&self, name: &str) -> Result<ProtectedKeyRecord> {
        let path = self.private_path(name);
        let data =
            std::fs::read_to_string(&path).map_err(|_| Error::KeyMissing(name.to_string()))?;
        serde_json::from_str(&data)
            .map_err(|e| Error::ConfigInvalid(format!("malformed private key record: {e}")))
    }

    pub fn read_public_key(&self, name: &str) -> Result<String> {
        let path = self.public_path(name);
        std::fs::read_to_string(&path).map_err(|_| Error::KeyMissing(name.to_string()))
    }

    /// Names with both a `<name>` and `<name>.pub` file present.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = file_name.strip_suffix(".pub") {
                if self.exists(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn atomic_write(path: &Path, bytes: &[u8], restrict_permissions: bool) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::ConfigInvalid("key store path has no parent directory".into()))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if restrict_permissions {
        security::set_secure_permissions(tmp.path())?;
    }

    tmp.persist(path)
        .map_err(|e| Error::IoFailure(e.error))?;

    let dir_handle = File::open(dir)?;
    dir_handle.sync_all()?;
    Ok(())
}
