//! SSH-agent client.
//!
//! A minimal client for the two agent operations ssops needs: listing
//! identities and requesting a signature over the `SSH_AUTH_SOCK` Unix
//! socket.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::wire::{Reader, Writer};

const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
const SSH_AGENTC_SIGN_REQUEST: u8 = 13;
const SSH_AGENT_SIGN_RESPONSE: u8 = 14;
const SSH_AGENT_FAILURE: u8 = 5;

/// Request `rsa-sha2-256` signatures (RFC 8332); signatures under this flag
/// are deterministic, which is what lets ssops use one as KDF input.
const SSH_AGENT_RSA_SHA2_256: u32 = 0x02;

const AGENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One identity reported by `list_identities`: its raw SSH wire-format
/// public-key blob and its comment string.
pub struct Identity {
    pub blob: Vec<u8>,
    pub comment: String,
}

pub struct AgentClient {
    stream: UnixStream,
}

impl AgentClient {
    /// Connect using the `SSH_AUTH_SOCK` environment variable.
    pub fn connect_env() -> Result<Self> {
        let path = std::env::var("SSH_AUTH_SOCK")
            .map_err(|_| Error::AgentUnavailable("SSH_AUTH_SOCK is not set".into()))?;
        Self::connect(&path)
    }

    pub fn connect(socket_path: &str) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .map_err(|e| Error::AgentUnavailable(format!("{socket_path}: {e}")))?;
        stream
            .set_read_timeout(Some(AGENT_TIMEOUT))
            .map_err(|e| Error::AgentUnavailable(e.to_string()))?;
        log::debug!("connected to ssh-agent at {socket_path}");
        Ok(AgentClient { stream })
    }

    fn request(&mut self, msg_type: u8, payload: &[u8]) -> Result<(u8, Vec<u8>)> {
        let total_len = 1 + payload.len();
        let mut frame = Vec::with_capacity(4 + total_len);
        frame.extend_from_slice(&(total_len as u32).to_be_bytes());
        frame.push(msg_type);
        frame.extend_from_slice(payload);
        self.stream.write_all(&frame)?;

        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body)?;
        if body.is_empty() {
            return Err(Error::AgentRefused);
        }
        Ok((body[0], body[1..].to_vec()))
    }

    /// List identities (11 -> 12): returns the `(blob, comment)` pairs the
    /// agent currently holds.
    pub fn list_identities(&mut self) -> Result<Vec<Identity>> {
        let (resp_type, body) = self.request(SSH_AGENTC_REQUEST_IDENTITIES, &[])?;
        if resp_type == SSH_AGENT_FAILURE {
            return Err(Error::AgentRefused);
        }
        if resp_type != SSH_AGENT_IDENTITIES_ANSWER {
            return Err(Error::AgentUnavailable(format!(
                "unexpected agent response type {resp_type}"
            )));
        }

        let mut r = Reader::new(&body);
        let count = r.u32()?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let blob = r.string()?;
            let comment = String::from_utf8_lossy(&r.string()?).into_owned();
            out.push(Identity { blob, comment });
        }
        Ok(out)
    }

    /// Sign request (13 -> 14, or failure 5): sign `data` under `key_blob`,
    /// requesting the deterministic `rsa-sha2-256` scheme. Returns
    /// `(algorithm, signature)` as reported by the agent.
    pub fn sign(&mut self, key_blob: &[u8], data: &[u8]) -> Result<(String, Vec<u8>)> {
        let mut w = Writer::new();
        w.string(key_blob);
        w.string(data);
        w.u32(SSH_AGENT_RSA_SHA2_256);
        let payload = w.into_bytes();

        let (resp_type, body) = self.request(SSH_AGENTC_SIGN_REQUEST, &payload)?;
        if resp_type == SSH_AGENT_FAILURE {
            return Err(Error::AgentRefused);
        }
        if resp_type != SSH_AGENT_SIGN_RESPONSE {
            return Err(Error::AgentUnavailable(format!(
                "unexpected agent response type {resp_type}"
            )));
        }

        let mut r = Reader::new(&body);
        let sig_blob = r.string()?;
        let mut sr = Reader::new(&sig_blob);
        let algorithm = String::from_utf8_lossy(&sr.string()?).into_owned();
        let signature = sr.string()?;
        Ok((algorithm, signature))
    }

    /// Find the identity whose blob matches `key_blob` exactly.
    pub fn has_identity(&mut self, key_blob: &[u8]) -> Result<bool> {
        Ok(self
            .list_identities()?
            .iter()
            .any(|id| id.blob == key_blob))
    }
}
