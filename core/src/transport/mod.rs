//! Remote transports: one authenticated connection to the user's account.
//!
//! Every protocol family implements [`Transport`], a small capability
//! interface (stat, mkdir, get, put, delete) plus the session lifecycle
//! `Unconnected → Connected → Authenticated → Closed`, with `Failed`
//! reachable from any state. The generic read/write logic in
//! [`crate::files`] is written once against this trait.
//!
//! # Lifecycle
//!
//! 1. [`select`](selector::select) maps the configured method to a
//!    [`BackendKind`] and port.
//! 2. A [`TransportFactory`] creates an unconnected transport for the kind.
//! 3. [`connect()`](Transport::connect), then
//!    [`authenticate()`](Transport::authenticate).
//! 4. File operations, possibly many, through [`SessionCache`].
//! 5. [`close()`](Transport::close), best effort.

pub mod cache;
pub mod ftp;
pub mod memory;
pub mod selector;
pub mod ssh;

use std::fmt;
use std::time::Duration;

use crate::credential::Credentials;
use crate::errors::TransportError;

pub use cache::SessionCache;
pub use selector::{select, Endpoint};

/// Permissions for directories the writer creates.
pub const DIR_MODE: i32 = 0o700;
/// Permissions for files the writer uploads.
pub const FILE_MODE: i32 = 0o600;

/// The protocol family a session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Plain-text FTP.
    Ftp,
    /// FTP over TLS; `implicit` starts TLS before the greeting, otherwise
    /// the session is upgraded with `AUTH TLS`.
    FtpTls { implicit: bool },
    /// SSH with file bodies moved by SCP.
    Scp,
    /// SSH with file bodies moved by SFTP.
    Sftp,
}

impl BackendKind {
    /// Protocol default port.
    pub fn default_port(self) -> u16 {
        match self {
            BackendKind::Ftp | BackendKind::FtpTls { implicit: false } => 21,
            BackendKind::FtpTls { implicit: true } => 990,
            BackendKind::Scp | BackendKind::Sftp => 22,
        }
    }

    pub fn scheme(self) -> &'static str {
        match self {
            BackendKind::Ftp => "ftp",
            BackendKind::FtpTls { implicit: false } => "ftp/tls",
            BackendKind::FtpTls { implicit: true } => "ftps",
            BackendKind::Scp => "scp",
            BackendKind::Sftp => "sftp",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Authenticated,
    Closed,
    Failed(String),
}

/// One connection to the remote account.
///
/// Paths are interpreted relative to the login directory unless absolute.
/// Implementations never retry; a failed call leaves the decision to the
/// caller.
pub trait Transport {
    fn kind(&self) -> BackendKind;

    fn state(&self) -> &SessionState;

    /// Open the connection, including any TLS or SSH handshake.
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    fn authenticate(&mut self, credentials: &Credentials) -> Result<(), TransportError>;

    /// Cheap round trip confirming an authenticated session is still usable.
    fn probe(&mut self) -> bool;

    /// Tear the connection down. Failures are logged, never returned.
    fn close(&mut self);

    /// Whether a regular file exists at `path`.
    fn exists(&mut self, path: &str) -> Result<bool, TransportError>;

    /// Whether a directory exists at `path`.
    fn dir_exists(&mut self, path: &str) -> Result<bool, TransportError>;

    /// Create one directory whose parent already exists.
    fn mkdir(&mut self, path: &str, mode: i32) -> Result<(), TransportError>;

    /// Fetch at most `max_bytes` of the file at `path`.
    fn get(&mut self, path: &str, max_bytes: u64) -> Result<Vec<u8>, TransportError>;

    /// Replace the file at `path` with `data` as atomically as the protocol
    /// allows, leaving it with permissions `mode`.
    fn put(&mut self, path: &str, data: &[u8], mode: i32) -> Result<(), TransportError>;

    /// Remove the file at `path`.
    fn delete(&mut self, path: &str) -> Result<(), TransportError>;
}

/// Creates unconnected transports for a backend kind.
pub trait TransportFactory {
    fn create(&self, kind: BackendKind) -> Box<dyn Transport>;
}

/// Factory for the real network backends.
#[derive(Debug, Clone, Default)]
pub struct NetworkTransports {
    pub timeout: Option<Duration>,
    pub tls_accept_invalid_certs: bool,
}

impl TransportFactory for NetworkTransports {
    fn create(&self, kind: BackendKind) -> Box<dyn Transport> {
        match kind {
            BackendKind::Ftp => Box::new(ftp::FtpTransport::new(
                ftp::Security::Plain,
                self.timeout,
                self.tls_accept_invalid_certs,
            )),
            BackendKind::FtpTls { implicit } => Box::new(ftp::FtpTransport::new(
                if implicit {
                    ftp::Security::ImplicitTls
                } else {
                    ftp::Security::ExplicitTls
                },
                self.timeout,
                self.tls_accept_invalid_certs,
            )),
            BackendKind::Scp => Box::new(ssh::SshTransport::new(ssh::SshMode::Scp, self.timeout)),
            BackendKind::Sftp => {
                Box::new(ssh::SshTransport::new(ssh::SshMode::Sftp, self.timeout))
            }
        }
    }
}

/// Sibling name an upload is staged under before being renamed over `path`.
pub(crate) fn staging_name(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => format!("{}/.{}.part", &path[..i], &path[i + 1..]),
        None => format!(".{path}.part"),
    }
}

/// Open a TCP connection to `host:port`, trying each resolved address.
pub(crate) fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> std::io::Result<std::net::TcpStream> {
    use std::net::{TcpStream, ToSocketAddrs};

    let stream = match timeout {
        None => TcpStream::connect((host, port))?,
        Some(limit) => {
            let mut last_err = None;
            let mut connected = None;
            for addr in (host, port).to_socket_addrs()? {
                match TcpStream::connect_timeout(&addr, limit) {
                    Ok(s) => {
                        connected = Some(s);
                        break;
                    }
                    Err(e) => last_err = Some(e),
                }
            }
            match connected {
                Some(s) => s,
                None => {
                    return Err(last_err.unwrap_or_else(|| {
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!("{host} did not resolve to any address"),
                        )
                    }))
                }
            }
        }
    };
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports() {
        assert_eq!(BackendKind::Ftp.default_port(), 21);
        assert_eq!(BackendKind::FtpTls { implicit: false }.default_port(), 21);
        assert_eq!(BackendKind::FtpTls { implicit: true }.default_port(), 990);
        assert_eq!(BackendKind::Scp.default_port(), 22);
        assert_eq!(BackendKind::Sftp.default_port(), 22);
    }

    #[test]
    fn kind_display_uses_scheme() {
        assert_eq!(BackendKind::FtpTls { implicit: true }.to_string(), "ftps");
        assert_eq!(BackendKind::Sftp.to_string(), "sftp");
    }

    #[test]
    fn staging_name_stays_in_the_same_directory() {
        assert_eq!(staging_name(".forward"), "..forward.part");
        assert_eq!(staging_name("mail/.vacation.msg"), "mail/..vacation.msg.part");
        assert_eq!(staging_name("/home/jdoe/x"), "/home/jdoe/.x.part");
    }

    #[test]
    fn connect_tcp_reports_refused_port() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = connect_tcp("127.0.0.1", port, Some(Duration::from_secs(2)));
        assert!(result.is_err());
    }
}
