//! Process and file hardening shared by every operation that touches a
//! plaintext private key or passphrase.
//!
//! Secret material stays in `Vec<u8>`/`String`, zeroized on drop via
//! `zeroize`, rather than a raw locked allocation, so this module covers
//! core dumps, file permissions, and constant-time comparison.

use crate::error::Result;

/// Disable core dumps for the current process. Best-effort: a failure here
/// is not itself fatal to the operation that called it.
pub fn disable_core_dumps() {
    #[cfg(unix)]
    {
        use libc::{rlimit, setrlimit, RLIMIT_CORE};
        let rlim = rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        unsafe {
            setrlimit(RLIMIT_CORE, &rlim);
        }
    }
}

/// Restrict a just-written file to owner read/write only.
pub fn set_secure_permissions(path: &std::path::Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Constant-time byte comparison, used to compare an SSH-agent signature
/// against a freshly recomputed one rather than branching on the first
/// differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_standard_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
