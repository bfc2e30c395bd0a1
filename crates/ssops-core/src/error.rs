//! The tagged error taxonomy shared by every component.
//!
//! Each variant names one failure domain. Per-recipient failures collected
//! by [`Error::AllRecipientsFailed`] keep
//! their causes in attempt order so verbose/debug output can replay the
//! whole chain, while terse output can still join the short messages.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed field in {0}")]
    ConfigInvalid(String),

    #[error("unsupported kdf type {0:?}")]
    UnsupportedKdf(String),

    #[error("unsupported recipient kind {0:?}")]
    UnsupportedRecipientKind(String),

    #[error("passphrase entries did not match")]
    PassphraseMismatch,

    #[error("incorrect passphrase")]
    BadPassphrase,

    #[error("user declined to enter a passphrase")]
    UserDeclined,

    #[error("SSH agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("SSH agent refused the request")]
    AgentRefused,

    #[error("key not present in SSH agent")]
    KeyNotInAgent,

    #[error("SSH agent returned an invalid signature")]
    BadSignature,

    #[error("recipient public key does not match the local key store")]
    PublicKeyMismatch,

    #[error("payload too large for RSA-OAEP ({len} bytes, limit {limit})")]
    PayloadTooLarge { len: usize, limit: usize },

    #[error("decrypt failed for recipient {name:?}")]
    DecryptFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("all recipients failed: {}", join_causes(.0))]
    AllRecipientsFailed(Vec<(String, Error)>),

    #[error("recipient {kind}:{name} already present in method")]
    DuplicateRecipient { kind: String, name: String },

    #[error("key {0:?} already exists")]
    KeyExists(String),

    #[error("key {0:?} not found")]
    KeyMissing(String),

    #[error("key store missing at {0}")]
    KeyStoreMissing(String),

    #[error("I/O error: {0}")]
    IoFailure(#[from] io::Error),
}

fn join_causes(causes: &[(String, Error)]) -> String {
    causes
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// One line, no cause chain: the terse (non-debug) rendering.
    pub fn terse(&self) -> String {
        self.to_string()
    }

    /// Full cause chain, one line per `source()`, for `-d`/`--debug` mode.
    pub fn debug_chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, Error>;
