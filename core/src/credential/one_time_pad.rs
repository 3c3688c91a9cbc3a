use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroizing;

use super::{CredentialSource, Credentials};
use crate::errors::TransportError;

/// The webmail session's stored password: a base64 ciphertext XORed
/// byte-for-byte with a base64 one-time pad kept in the session.
pub struct OneTimePadCredentials {
    username: String,
    ciphertext: String,
    pad: String,
}

impl OneTimePadCredentials {
    pub fn new(
        username: impl Into<String>,
        ciphertext: impl Into<String>,
        pad: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            ciphertext: ciphertext.into(),
            pad: pad.into(),
        }
    }
}

impl CredentialSource for OneTimePadCredentials {
    fn credentials(&self) -> Result<Credentials, TransportError> {
        let password = decrypt(&self.ciphertext, &self.pad)?;
        Ok(Credentials {
            username: self.username.clone(),
            password,
        })
    }
}

fn decrypt(ciphertext: &str, pad: &str) -> Result<Zeroizing<String>, TransportError> {
    let encrypted = Zeroizing::new(
        STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| TransportError::Credentials(format!("bad ciphertext: {e}")))?,
    );
    let pad = Zeroizing::new(
        STANDARD
            .decode(pad.trim())
            .map_err(|e| TransportError::Credentials(format!("bad pad: {e}")))?,
    );
    if pad.len() < encrypted.len() {
        return Err(TransportError::Credentials(
            "pad is shorter than the ciphertext".to_string(),
        ));
    }

    let plain: Vec<u8> = encrypted
        .iter()
        .zip(pad.iter())
        .map(|(c, p)| c ^ p)
        .collect();
    String::from_utf8(plain)
        .map(Zeroizing::new)
        .map_err(|_| TransportError::Credentials("decrypted password is not UTF-8".to_string()))
}
