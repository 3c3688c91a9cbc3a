//! Login credentials for the remote account.
//!
//! The remote host is logged into with the same username and password the
//! user signed in to webmail with. A [`CredentialSource`] hands those out on
//! demand, so the plaintext password only exists while a session is being
//! authenticated.

mod one_time_pad;

use std::fmt;

use zeroize::Zeroizing;

use crate::errors::TransportError;

pub use one_time_pad::OneTimePadCredentials;

/// Username and plaintext password for the remote account.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials for authenticating a transport session.
///
/// A failure is reported as [`TransportError::Credentials`] and treated like
/// a rejected login by callers.
pub trait CredentialSource {
    fn credentials(&self) -> Result<Credentials, TransportError>;
}

/// Credentials that are already available in plaintext.
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self(Credentials::new(username, password))
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, TransportError> {
        Ok(self.0.clone())
    }
}

/// Credentials taken from the process environment.
///
/// `AUTORESPOND_USER` names the account. The password is either given
/// directly in `AUTORESPOND_PASSWORD`, or as the webmail's encrypted pair
/// `AUTORESPOND_KEY` + `AUTORESPOND_PAD`.
pub struct EnvCredentials;

pub const ENV_USER: &str = "AUTORESPOND_USER";
pub const ENV_PASSWORD: &str = "AUTORESPOND_PASSWORD";
pub const ENV_KEY: &str = "AUTORESPOND_KEY";
pub const ENV_PAD: &str = "AUTORESPOND_PAD";

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> Result<Credentials, TransportError> {
        let username = std::env::var(ENV_USER)
            .ok()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| TransportError::Credentials(format!("{ENV_USER} is not set")))?;

        if let Ok(password) = std::env::var(ENV_PASSWORD) {
            return Ok(Credentials::new(username, password));
        }

        match (std::env::var(ENV_KEY), std::env::var(ENV_PAD)) {
            (Ok(key), Ok(pad)) => OneTimePadCredentials::new(username, key, pad).credentials(),
            _ => Err(TransportError::Credentials(format!(
                "neither {ENV_PASSWORD} nor {ENV_KEY}/{ENV_PAD} is set"
            ))),
        }
    }
}
