//! SSH backend over `ssh2`, moving file bodies with SCP or SFTP.
//!
//! Both modes open the SFTP subsystem right after login; it serves stat,
//! mkdir, unlink and the liveness probe. Only the transfer of file bodies
//! differs between the modes.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use ssh2::{ErrorCode, FileStat, OpenFlags, OpenType, RenameFlags, Session, Sftp};
use tracing::{debug, warn};

use crate::credential::Credentials;
use crate::errors::TransportError;

use super::{connect_tcp, staging_name, BackendKind, SessionState, Transport};

/// libssh2's `LIBSSH2_FX_NO_SUCH_FILE`.
const FX_NO_SUCH_FILE: i32 = 2;
const FX_FAILURE: i32 = 4;
const FX_FILE_ALREADY_EXISTS: i32 = 11;

/// How file bodies are transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshMode {
    Scp,
    Sftp,
}

pub struct SshTransport {
    mode: SshMode,
    timeout: Option<Duration>,
    state: SessionState,
    target: String,
    session: Option<Session>,
    sftp: Option<Sftp>,
}

impl SshTransport {
    pub fn new(mode: SshMode, timeout: Option<Duration>) -> Self {
        Self {
            mode,
            timeout,
            state: SessionState::Unconnected,
            target: String::new(),
            session: None,
            sftp: None,
        }
    }

    fn session(&self) -> Result<&Session, String> {
        self.session.as_ref().ok_or_else(|| "not connected".to_string())
    }

    fn sftp(&self) -> Result<&Sftp, String> {
        self.sftp.as_ref().ok_or_else(|| "not logged in".to_string())
    }

    fn fail(&mut self, reason: &str) {
        self.state = SessionState::Failed(reason.to_string());
    }

    fn open_session(&self, host: &str, port: u16) -> Result<Session, String> {
        let tcp = connect_tcp(host, port, self.timeout).map_err(|e| e.to_string())?;
        let mut session = Session::new().map_err(|e| e.to_string())?;
        session.set_tcp_stream(tcp);
        if let Some(limit) = self.timeout {
            session.set_timeout(u32::try_from(limit.as_millis()).unwrap_or(u32::MAX));
        }
        session
            .handshake()
            .map_err(|e| format!("SSH handshake failed: {e}"))?;
        Ok(session)
    }

    /// `Ok(None)` when nothing exists at `path`.
    fn stat(&self, path: &str) -> Result<Option<FileStat>, String> {
        match self.sftp()?.stat(Path::new(path)) {
            Ok(stat) => Ok(Some(stat)),
            Err(e) if is_no_such_file(&e) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    fn scp_get(&self, path: &str, max_bytes: u64) -> Result<Vec<u8>, String> {
        let (mut channel, _stat) = self
            .session()?
            .scp_recv(Path::new(path))
            .map_err(|e| e.to_string())?;
        let mut data = Vec::new();
        (&mut channel)
            .take(max_bytes)
            .read_to_end(&mut data)
            .map_err(|e| e.to_string())?;
        // Drain whatever is left past the limit so the channel closes cleanly.
        io::copy(&mut channel, &mut io::sink()).map_err(|e| e.to_string())?;
        finish_channel(channel)?;
        Ok(data)
    }

    fn sftp_get(&self, path: &str, max_bytes: u64) -> Result<Vec<u8>, String> {
        let file = self
            .sftp()?
            .open(Path::new(path))
            .map_err(|e| e.to_string())?;
        let mut data = Vec::new();
        file.take(max_bytes)
            .read_to_end(&mut data)
            .map_err(|e| e.to_string())?;
        Ok(data)
    }

    fn scp_put(&self, path: &str, data: &[u8], mode: i32) -> Result<(), String> {
        let mut channel = self
            .session()?
            .scp_send(Path::new(path), mode, data.len() as u64, None)
            .map_err(|e| e.to_string())?;
        channel.write_all(data).map_err(|e| e.to_string())?;
        finish_channel(channel)
    }

    fn sftp_put(&self, path: &str, data: &[u8], mode: i32) -> Result<(), String> {
        let sftp = self.sftp()?;
        let staged = staging_name(path);
        let staged_path = Path::new(&staged);
        let target = Path::new(path);

        let mut file = sftp
            .open_mode(
                staged_path,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                mode,
                OpenType::File,
            )
            .map_err(|e| e.to_string())?;
        if let Err(e) = file.write_all(data) {
            drop(file);
            discard(sftp, staged_path);
            return Err(e.to_string());
        }
        drop(file);

        let flags = Some(RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE);
        if let Err(first) = sftp.rename(staged_path, target, flags) {
            // SFTPv3 servers refuse to rename over an existing file. Only
            // then is the target removed, and only with the new content
            // still in place to replace it.
            let staged_present = sftp.stat(staged_path).is_ok();
            if !overwrite_refused(&first) || !staged_present {
                if staged_present {
                    discard(sftp, staged_path);
                }
                return Err(first.to_string());
            }
            debug!("rename over {path} refused ({first}); removing target first");
            if let Err(e) = sftp.unlink(target) {
                discard(sftp, staged_path);
                return Err(format!("cannot replace {path}: {e}"));
            }
            if let Err(e) = sftp.rename(staged_path, target, None) {
                warn!("{path} was removed but {staged} could not take its place: {e}");
                return Err(e.to_string());
            }
        }

        let perms = FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: Some(mode as u32),
            atime: None,
            mtime: None,
        };
        if let Err(e) = sftp.setstat(target, perms) {
            warn!("cannot set mode {mode:o} on {path}: {e}");
        }
        Ok(())
    }
}

impl Transport for SshTransport {
    fn kind(&self) -> BackendKind {
        match self.mode {
            SshMode::Scp => BackendKind::Scp,
            SshMode::Sftp => BackendKind::Sftp,
        }
    }

    fn state(&self) -> &SessionState {
        &self.state
    }

    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.target = format!("{host}:{port}");
        match self.open_session(host, port) {
            Ok(session) => {
                debug!("SSH handshake with {} complete", self.target);
                self.session = Some(session);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(reason) => {
                self.fail(&reason);
                Err(TransportError::Connect {
                    target: self.target.clone(),
                    reason,
                })
            }
        }
    }

    fn authenticate(&mut self, credentials: &Credentials) -> Result<(), TransportError> {
        let host = self.target.clone();
        let session = self.session.as_ref().ok_or_else(|| TransportError::Auth {
            host: host.clone(),
            reason: "not connected".to_string(),
        })?;

        if let Err(e) = session.userauth_password(&credentials.username, &credentials.password) {
            let reason = e.to_string();
            self.fail(&reason);
            return Err(TransportError::Auth { host, reason });
        }
        if !session.authenticated() {
            self.fail("authentication failed");
            return Err(TransportError::Auth {
                host,
                reason: "authentication failed".to_string(),
            });
        }

        match session.sftp() {
            Ok(sftp) => self.sftp = Some(sftp),
            Err(e) => {
                let reason = e.to_string();
                self.fail(&reason);
                return Err(TransportError::Subsystem {
                    target: host,
                    reason,
                });
            }
        }
        self.state = SessionState::Authenticated;
        Ok(())
    }

    fn probe(&mut self) -> bool {
        let alive = match self.sftp() {
            Ok(sftp) => sftp.realpath(Path::new(".")).is_ok(),
            Err(_) => false,
        };
        if !alive {
            self.fail("probe failed");
        }
        alive
    }

    fn close(&mut self) {
        self.sftp = None;
        if let Some(session) = self.session.take() {
            if let Err(e) = session.disconnect(None, "closing", None) {
                debug!("SSH disconnect from {} failed: {e}", self.target);
            }
        }
        self.state = SessionState::Closed;
    }

    fn exists(&mut self, path: &str) -> Result<bool, TransportError> {
        self.stat(path)
            .map(|stat| stat.is_some_and(|s| !s.is_dir()))
            .map_err(|reason| TransportError::Read {
                path: path.to_string(),
                reason,
            })
    }

    fn dir_exists(&mut self, path: &str) -> Result<bool, TransportError> {
        self.stat(path)
            .map(|stat| stat.is_some_and(|s| s.is_dir()))
            .map_err(|reason| TransportError::ChangeDir {
                path: path.to_string(),
                reason,
            })
    }

    fn mkdir(&mut self, path: &str, mode: i32) -> Result<(), TransportError> {
        self.sftp()
            .and_then(|sftp| sftp.mkdir(Path::new(path), mode).map_err(|e| e.to_string()))
            .map_err(|reason| TransportError::CreateDir {
                path: path.to_string(),
                reason,
            })
    }

    fn get(&mut self, path: &str, max_bytes: u64) -> Result<Vec<u8>, TransportError> {
        let result = match self.mode {
            SshMode::Scp => self.scp_get(path, max_bytes),
            SshMode::Sftp => self.sftp_get(path, max_bytes),
        };
        result.map_err(|reason| TransportError::Read {
            path: path.to_string(),
            reason,
        })
    }

    fn put(&mut self, path: &str, data: &[u8], mode: i32) -> Result<(), TransportError> {
        let result = match self.mode {
            SshMode::Scp => self.scp_put(path, data, mode),
            SshMode::Sftp => self.sftp_put(path, data, mode),
        };
        result.map_err(|reason| TransportError::Write {
            path: path.to_string(),
            reason,
        })
    }

    fn delete(&mut self, path: &str) -> Result<(), TransportError> {
        let result = self.sftp().and_then(|sftp| match sftp.unlink(Path::new(path)) {
            Ok(()) => Ok(()),
            Err(e) if is_no_such_file(&e) => Ok(()),
            Err(e) => Err(e.to_string()),
        });
        result.map_err(|reason| TransportError::Remove {
            path: path.to_string(),
            reason,
        })
    }
}

fn is_no_such_file(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::SFTP(FX_NO_SUCH_FILE))
}

/// The generic failure SFTPv3 servers answer an overwriting rename with,
/// or the explicit "already exists" of later protocol versions.
fn overwrite_refused(err: &ssh2::Error) -> bool {
    matches!(
        err.code(),
        ErrorCode::SFTP(FX_FAILURE | FX_FILE_ALREADY_EXISTS)
    )
}

/// Remove a staging file that will not be renamed into place.
fn discard(sftp: &Sftp, staged: &Path) {
    if let Err(e) = sftp.unlink(staged) {
        warn!("cannot remove staging file {}: {e}", staged.display());
    }
}

fn finish_channel(mut channel: ssh2::Channel) -> Result<(), String> {
    channel.send_eof().map_err(|e| e.to_string())?;
    channel.wait_eof().map_err(|e| e.to_string())?;
    channel.close().map_err(|e| e.to_string())?;
    channel.wait_close().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_selects_kind() {
        assert_eq!(SshTransport::new(SshMode::Scp, None).kind(), BackendKind::Scp);
        assert_eq!(
            SshTransport::new(SshMode::Sftp, None).kind(),
            BackendKind::Sftp
        );
    }

    #[test]
    fn operations_before_login_fail_cleanly() {
        let mut t = SshTransport::new(SshMode::Sftp, None);
        assert_eq!(*t.state(), SessionState::Unconnected);
        assert!(matches!(
            t.exists(".forward"),
            Err(TransportError::Read { .. })
        ));
        assert!(!t.probe());
        t.close();
        assert_eq!(*t.state(), SessionState::Closed);
    }

    #[test]
    fn authenticate_without_connect_is_an_auth_error() {
        let mut t = SshTransport::new(SshMode::Scp, None);
        let err = t
            .authenticate(&Credentials::new("jdoe", "pw"))
            .unwrap_err();
        assert!(matches!(err, TransportError::Auth { .. }));
    }

    #[test]
    fn connect_refused_is_a_connect_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut t = SshTransport::new(SshMode::Sftp, Some(Duration::from_secs(2)));
        let err = t.connect("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(matches!(t.state(), SessionState::Failed(_)));
    }

    #[test]
    fn failed_handshake_marks_the_session_failed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"220 not an ssh server\r\n").unwrap();
        });
        let mut t = SshTransport::new(SshMode::Scp, Some(Duration::from_secs(2)));
        let err = t.connect("127.0.0.1", port).unwrap_err();
        match err {
            TransportError::Connect { target, reason } => {
                assert_eq!(target, format!("127.0.0.1:{port}"));
                assert!(reason.contains("handshake"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(t.state(), SessionState::Failed(_)));
        server.join().unwrap();
    }

    #[test]
    fn only_overwrite_refusals_allow_removing_the_target() {
        let refused = ssh2::Error::new(ErrorCode::SFTP(FX_FAILURE), "failure");
        assert!(overwrite_refused(&refused));
        let exists = ssh2::Error::new(ErrorCode::SFTP(FX_FILE_ALREADY_EXISTS), "exists");
        assert!(overwrite_refused(&exists));

        let denied = ssh2::Error::new(ErrorCode::SFTP(3), "permission denied");
        assert!(!overwrite_refused(&denied));
        let missing = ssh2::Error::new(ErrorCode::SFTP(FX_NO_SUCH_FILE), "no such file");
        assert!(!overwrite_refused(&missing));
        assert!(is_no_such_file(&missing));
    }
}
