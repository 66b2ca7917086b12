#![forbid(unsafe_code)]

//! Startup guards for the backend process.

use anyhow::{Result, bail};
use nix::unistd::Uid;

use crate::config::TokenSettings;

/// HS256 secrets shorter than this are rejected at startup.
pub const MIN_SECRET_LEN: usize = 32;

/// Fails fast when the server is started as root. The backend writes uploads
/// and its database under the working directory, which should belong to an
/// unprivileged service account.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Rejects token secrets that are too short or shared between the access and
/// refresh credentials.
pub fn ensure_token_secrets(tokens: &TokenSettings) -> Result<()> {
    for (name, secret) in [
        ("ACCESS_TOKEN_SECRET", &tokens.access_secret),
        ("REFRESH_TOKEN_SECRET", &tokens.refresh_secret),
    ] {
        if secret.len() < MIN_SECRET_LEN {
            bail!("{name} must be at least {MIN_SECRET_LEN} bytes long");
        }
    }
    if tokens.access_secret == tokens.refresh_secret {
        bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
    }
    Ok(())
}
