//! Maps a configured method name and port onto a backend.
//!
//! This is the only place that knows the method spellings. It performs no
//! I/O.

use crate::config::AutorespondConfig;
use crate::errors::TransportError;

use super::BackendKind;

/// Result of selecting a backend: which kind and the port to dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub kind: BackendKind,
    pub port: u16,
}

/// Select the backend for `method` (case-insensitive).
///
/// `ssh` is an alias for `scp`. A port of `None` or `0` picks the method's
/// default.
pub fn select(method: &str, port: Option<u16>) -> Result<Selection, TransportError> {
    let kind = match method.trim().to_ascii_lowercase().as_str() {
        "ftp" => BackendKind::Ftp,
        "ftp/tls" => BackendKind::FtpTls { implicit: false },
        "ftps" => BackendKind::FtpTls { implicit: true },
        "ssh" | "scp" => BackendKind::Scp,
        "sftp" => BackendKind::Sftp,
        _ => return Err(TransportError::UnknownMethod(method.to_string())),
    };
    let port = port.filter(|p| *p != 0).unwrap_or(kind.default_port());
    Ok(Selection { kind, port })
}

/// A fully resolved remote account location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub kind: BackendKind,
    pub port: u16,
}

impl Endpoint {
    pub fn from_config(config: &AutorespondConfig) -> Result<Self, TransportError> {
        let host = config.ftphost.trim();
        if host.is_empty() {
            return Err(TransportError::NotConfigured);
        }
        let selection = select(&config.ftp_method, config.ftp_port)?;
        Ok(Self {
            host: host.to_string(),
            kind: selection.kind,
            port: selection.port,
        })
    }

    /// `host:port`, as used in error messages.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
