pub mod agent;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keystore;
pub mod method;
pub mod protector;
pub mod recipient;
pub mod security;
pub mod sshkey;
pub mod wire;

pub use envelope::{decrypt as decrypt_artifact, encrypt as encrypt_artifact, Artifact, ArtifactEntry};
pub use error::{Error, Result};
pub use keystore::KeyStore;
pub use method::MethodFile;
pub use protector::{PassphraseSource, ProtectedKeyRecord, Protection};
pub use recipient::RecipientDescriptor;

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Read an entire method file, encrypt `plaintext` for its recipients (or a
/// single named one), and serialize the resulting artifact as JSON.
pub fn encrypt_to_artifact_json(
    method_path: &Path,
    plaintext: &[u8],
    name_filter: Option<&str>,
) -> Result<Vec<u8>> {
    let method = MethodFile::load(method_path)?;
    let artifact = encrypt_artifact(&method, plaintext, name_filter)?;
    serde_json::to_vec_pretty(&artifact)
        .map_err(|e| Error::ConfigInvalid(format!("serializing artifact: {e}")))
}

/// Parse a JSON artifact and decrypt it against the local key store,
/// trying recipients in artifact order.
pub fn decrypt_from_artifact_json(
    artifact_json: &[u8],
    keystore: Option<&KeyStore>,
    source: &dyn PassphraseSource,
    name_filter: Option<&str>,
) -> Result<Vec<u8>> {
    let artifact: Artifact = serde_json::from_slice(artifact_json)
        .map_err(|e| Error::ConfigInvalid(format!("malformed artifact: {e}")))?;
    decrypt_artifact(&artifact, keystore, source, name_filter)
}

/// Write `bytes` to `path` atomic-durably: tempfile in the same directory,
/// fsync the file, rename into place, fsync the directory. No partial
/// output is ever left behind at `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    security::set_secure_permissions(tmp.path())?;
    tmp.persist(path).map_err(|e| Error::IoFailure(e.error))?;
    let dir_handle = File::open(dir)?;
    dir_handle.sync_all()?;
    Ok(())
}
