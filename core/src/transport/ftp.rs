//! Blocking FTP client, optionally secured with TLS.
//!
//! Supports just what whole-file transfers of small dotfiles need: login,
//! binary mode, passive data connections, SIZE/CWD probing, MKD, RETR, STOR,
//! RNFR/RNTO, DELE and `SITE CHMOD`. TLS follows RFC 4217: `AUTH TLS` on the
//! control connection (or TLS from the first byte on the implicit port),
//! `PBSZ 0`/`PROT P`, and data connections that resume the control
//! connection's TLS session, which many servers insist on.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use openssl::ssl::{
    SslConnector, SslMethod, SslOptions, SslSessionRef, SslStream, SslVerifyMode,
};
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use crate::credential::Credentials;
use crate::errors::TransportError;

use super::{connect_tcp, staging_name, BackendKind, SessionState, Transport};

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Plain,
    /// Upgrade with `AUTH TLS` after the greeting.
    ExplicitTls,
    /// TLS from the first byte.
    ImplicitTls,
}

/// A control or data connection.
enum Stream {
    Plain(TcpStream),
    Tls(Box<SslStream<TcpStream>>),
}

impl Stream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Plain(s) => s,
            Stream::Tls(s) => s.get_ref(),
        }
    }

    /// Close the stream, sending a TLS close_notify first when secured.
    fn finish(self) {
        if let Stream::Tls(mut s) = self {
            if let Err(e) = s.shutdown() {
                trace!("TLS shutdown: {e}");
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}

/// One server reply; multi-line replies have their lines joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

pub struct FtpTransport {
    security: Security,
    timeout: Option<Duration>,
    accept_invalid_certs: bool,
    state: SessionState,
    host: String,
    target: String,
    control: Option<BufReader<Stream>>,
    connector: Option<SslConnector>,
    /// Login directory, from `PWD`; `CWD` probes return here.
    home: Option<String>,
}

impl FtpTransport {
    pub fn new(security: Security, timeout: Option<Duration>, accept_invalid_certs: bool) -> Self {
        Self {
            security,
            timeout,
            accept_invalid_certs,
            state: SessionState::Unconnected,
            host: String::new(),
            target: String::new(),
            control: None,
            connector: None,
            home: None,
        }
    }

    fn fail(&mut self, reason: &str) {
        self.state = SessionState::Failed(reason.to_string());
    }

    /// Send `cmd` and wait for the final reply.
    ///
    /// An I/O error leaves the control connection unusable and marks the
    /// session failed.
    fn command(&mut self, cmd: &str) -> Result<Reply, String> {
        let result = match self.control.as_mut() {
            Some(control) => send_command(control, cmd).and_then(|()| read_reply(control)),
            None => return Err("not connected".to_string()),
        };
        result.map_err(|e| {
            let reason = e.to_string();
            self.fail(&reason);
            reason
        })
    }

    /// Wait for a reply without sending anything.
    fn reply(&mut self) -> Result<Reply, String> {
        let result = match self.control.as_mut() {
            Some(control) => read_reply(control),
            None => return Err("not connected".to_string()),
        };
        result.map_err(|e| {
            let reason = e.to_string();
            self.fail(&reason);
            reason
        })
    }

    fn build_connector(&self) -> Result<SslConnector, String> {
        let mut builder = SslConnector::builder(SslMethod::tls()).map_err(|e| e.to_string())?;
        // Servers commonly close data connections without close_notify.
        builder.set_options(SslOptions::IGNORE_UNEXPECTED_EOF);
        if self.accept_invalid_certs {
            builder.set_verify(SslVerifyMode::NONE);
        }
        Ok(builder.build())
    }

    fn tls_wrap(
        &self,
        tcp: TcpStream,
        resume: Option<&SslSessionRef>,
    ) -> Result<SslStream<TcpStream>, String> {
        let connector = self
            .connector
            .as_ref()
            .ok_or_else(|| "TLS is not set up".to_string())?;
        let mut config = connector.configure().map_err(|e| e.to_string())?;
        if self.accept_invalid_certs {
            config.set_verify_hostname(false);
        }
        let mut ssl = config.into_ssl(&self.host).map_err(|e| e.to_string())?;
        if let Some(session) = resume {
            // SAFETY: the session was negotiated by a connection made from
            // this same connector's context.
            unsafe { ssl.set_session(session) }.map_err(|e| e.to_string())?;
        }
        ssl.connect(tcp)
            .map_err(|e| format!("TLS handshake failed: {e}"))
    }

    fn open_control(&mut self, host: &str, port: u16) -> Result<(), String> {
        let tcp = connect_tcp(host, port, self.timeout).map_err(|e| e.to_string())?;
        if self.security != Security::Plain {
            self.connector = Some(self.build_connector()?);
        }

        let stream = match self.security {
            Security::ImplicitTls => Stream::Tls(Box::new(self.tls_wrap(tcp, None)?)),
            _ => Stream::Plain(tcp),
        };
        self.control = Some(BufReader::new(stream));

        let greeting = self.reply()?;
        if greeting.code != 220 {
            return Err(format!("unexpected greeting: {greeting}"));
        }
        trace!("Greeting from {}: {greeting}", self.target);

        if self.security == Security::ExplicitTls {
            let reply = self.command("AUTH TLS")?;
            if reply.code != 234 {
                return Err(format!("server refused AUTH TLS: {reply}"));
            }
            let tcp = match self.control.take().map(BufReader::into_inner) {
                Some(Stream::Plain(tcp)) => tcp,
                _ => return Err("control connection lost during AUTH TLS".to_string()),
            };
            let tls = self.tls_wrap(tcp, None)?;
            self.control = Some(BufReader::new(Stream::Tls(Box::new(tls))));
        }

        if self.security != Security::Plain {
            for cmd in ["PBSZ 0", "PROT P"] {
                let reply = self.command(cmd)?;
                if !reply.is_success() {
                    return Err(format!("{cmd} rejected: {reply}"));
                }
            }
        }
        Ok(())
    }

    fn login(&mut self, credentials: &Credentials) -> Result<(), String> {
        let reply = self.command(&format!("USER {}", credentials.username))?;
        let reply = match reply.code {
            230 => reply,
            331 => {
                let pass = Zeroizing::new(format!("PASS {}", credentials.password.as_str()));
                self.command(&pass)?
            }
            _ => return Err(reply.to_string()),
        };
        if !matches!(reply.code, 202 | 230) {
            return Err(reply.to_string());
        }

        let reply = self.command("TYPE I")?;
        if !reply.is_success() {
            return Err(format!("cannot switch to binary mode: {reply}"));
        }

        let reply = self.command("PWD")?;
        self.home = if reply.code == 257 {
            parse_pwd(&reply.text)
        } else {
            None
        };
        if self.home.is_none() {
            warn!("{} did not report a login directory: {reply}", self.target);
        }
        Ok(())
    }

    /// Enter passive mode and connect the data socket. The TLS handshake,
    /// if any, has to wait until the transfer command has been accepted.
    fn passive(&mut self) -> Result<TcpStream, String> {
        let reply = self.command("PASV")?;
        if reply.code != 227 {
            return Err(format!("passive mode refused: {reply}"));
        }
        let port = parse_pasv_port(&reply.text)
            .ok_or_else(|| format!("cannot parse passive reply: {reply}"))?;
        // The advertised address is often wrong behind NAT; the control
        // connection's peer is not.
        let ip = self
            .control
            .as_ref()
            .ok_or_else(|| "not connected".to_string())?
            .get_ref()
            .tcp()
            .peer_addr()
            .map_err(|e| e.to_string())?
            .ip();
        connect_tcp(&ip.to_string(), port, self.timeout).map_err(|e| e.to_string())
    }

    fn secure_data(&self, tcp: TcpStream) -> Result<Stream, String> {
        match self.control.as_ref().map(BufReader::get_ref) {
            Some(Stream::Tls(control)) => {
                let resume = control.ssl().session();
                Ok(Stream::Tls(Box::new(self.tls_wrap(tcp, resume)?)))
            }
            _ => Ok(Stream::Plain(tcp)),
        }
    }

    /// Start a transfer command on a fresh data connection.
    fn start_transfer(&mut self, cmd: &str) -> Result<Stream, String> {
        let tcp = self.passive()?;
        let reply = self.command(cmd)?;
        if !matches!(reply.code, 125 | 150) {
            return Err(reply.to_string());
        }
        match self.secure_data(tcp) {
            Ok(stream) => Ok(stream),
            Err(e) => {
                // The server is still waiting on the data connection.
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn finish_transfer(&mut self, stream: Stream) -> Result<(), String> {
        stream.finish();
        let reply = self.reply()?;
        if matches!(reply.code, 226 | 250) {
            Ok(())
        } else {
            Err(reply.to_string())
        }
    }

    fn retrieve(&mut self, path: &str, max_bytes: u64) -> Result<Vec<u8>, String> {
        let mut stream = self.start_transfer(&format!("RETR {path}"))?;
        let mut data = Vec::new();
        let read = (&mut stream).take(max_bytes).read_to_end(&mut data);
        // Drain anything past the limit so the server sees a complete transfer.
        let drained = read.and_then(|_| io::copy(&mut stream, &mut io::sink()));
        if let Err(e) = drained {
            stream.finish();
            self.fail(&e.to_string());
            return Err(e.to_string());
        }
        self.finish_transfer(stream)?;
        Ok(data)
    }

    fn store(&mut self, path: &str, data: &[u8], mode: i32) -> Result<(), String> {
        let staged = staging_name(path);
        let mut stream = self.start_transfer(&format!("STOR {staged}"))?;
        if let Err(e) = stream.write_all(data).and_then(|()| stream.flush()) {
            stream.finish();
            self.fail(&e.to_string());
            return Err(e.to_string());
        }
        self.finish_transfer(stream)?;

        if let Err(e) = self.rename(&staged, path) {
            if let Ok(reply) = self.command(&format!("DELE {staged}")) {
                trace!("cleanup of {staged}: {reply}");
            }
            return Err(e);
        }

        let reply = self.command(&format!("SITE CHMOD {mode:o} {path}"))?;
        if !reply.is_success() {
            warn!("cannot set mode {mode:o} on {path}: {reply}");
        }
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), String> {
        let reply = self.command(&format!("RNFR {from}"))?;
        if reply.code != 350 {
            return Err(reply.to_string());
        }
        let reply = self.command(&format!("RNTO {to}"))?;
        if !reply.is_success() {
            return Err(reply.to_string());
        }
        Ok(())
    }

    fn size_exists(&mut self, path: &str) -> Result<bool, String> {
        let reply = self.command(&format!("SIZE {path}"))?;
        match reply.code {
            213 => Ok(true),
            550 => Ok(false),
            _ => Err(reply.to_string()),
        }
    }

    fn probe_dir(&mut self, path: &str) -> Result<bool, String> {
        // Without a login directory the probe can only walk back with CDUP,
        // which needs a relative path without `..`.
        let depth = match self.home {
            Some(_) => None,
            None => Some(
                relative_depth(path).ok_or_else(|| "login directory is unknown".to_string())?,
            ),
        };

        let reply = self.command(&format!("CWD {path}"))?;
        if reply.code == 550 {
            return Ok(false);
        }
        if !reply.is_success() {
            return Err(reply.to_string());
        }

        match (depth, self.home.clone()) {
            (Some(depth), _) => {
                for _ in 0..depth {
                    let reply = self.command("CDUP")?;
                    if !reply.is_success() {
                        let reason = format!("cannot leave {path}: {reply}");
                        self.fail(&reason);
                        return Err(reason);
                    }
                }
            }
            (None, Some(home)) => {
                let reply = self.command(&format!("CWD {home}"))?;
                if !reply.is_success() {
                    let reason = format!("cannot return to {home}: {reply}");
                    self.fail(&reason);
                    return Err(reason);
                }
            }
            (None, None) => {}
        }
        Ok(true)
    }

    fn make_dir(&mut self, path: &str, mode: i32) -> Result<(), String> {
        let reply = self.command(&format!("MKD {path}"))?;
        if !reply.is_success() {
            return Err(reply.to_string());
        }
        // A new directory keeps the server's default mode unless this
        // succeeds, so unlike files a rejection fails the write.
        let reply = self.command(&format!("SITE CHMOD {mode:o} {path}"))?;
        if !reply.is_success() {
            return Err(format!("cannot set mode {mode:o}: {reply}"));
        }
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), String> {
        let reply = self.command(&format!("DELE {path}"))?;
        if reply.is_success() || (reply.code == 550 && !self.size_exists(path)?) {
            Ok(())
        } else {
            Err(reply.to_string())
        }
    }
}

impl Transport for FtpTransport {
    fn kind(&self) -> BackendKind {
        match self.security {
            Security::Plain => BackendKind::Ftp,
            Security::ExplicitTls => BackendKind::FtpTls { implicit: false },
            Security::ImplicitTls => BackendKind::FtpTls { implicit: true },
        }
    }

    fn state(&self) -> &SessionState {
        &self.state
    }

    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.host = host.to_string();
        self.target = format!("{host}:{port}");
        match self.open_control(host, port) {
            Ok(()) => {
                debug!("Connected to {} ({})", self.target, self.kind());
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(reason) => {
                self.fail(&reason);
                self.control = None;
                Err(TransportError::Connect {
                    target: self.target.clone(),
                    reason,
                })
            }
        }
    }

    fn authenticate(&mut self, credentials: &Credentials) -> Result<(), TransportError> {
        match self.login(credentials) {
            Ok(()) => {
                self.state = SessionState::Authenticated;
                Ok(())
            }
            Err(reason) => {
                self.fail(&reason);
                Err(TransportError::Auth {
                    host: self.host.clone(),
                    reason,
                })
            }
        }
    }

    fn probe(&mut self) -> bool {
        match self.command("SYST") {
            Ok(reply) if reply.is_success() => true,
            Ok(reply) => {
                self.fail(&reply.to_string());
                false
            }
            Err(_) => false,
        }
    }

    fn close(&mut self) {
        if self.control.is_some() && !matches!(self.state, SessionState::Failed(_)) {
            if let Err(e) = self.command("QUIT") {
                debug!("QUIT on {} failed: {e}", self.target);
            }
        }
        if let Some(control) = self.control.take() {
            control.into_inner().finish();
        }
        self.state = SessionState::Closed;
    }

    fn exists(&mut self, path: &str) -> Result<bool, TransportError> {
        self.size_exists(path).map_err(|reason| TransportError::Read {
            path: path.to_string(),
            reason,
        })
    }

    fn dir_exists(&mut self, path: &str) -> Result<bool, TransportError> {
        self.probe_dir(path).map_err(|reason| TransportError::ChangeDir {
            path: path.to_string(),
            reason,
        })
    }

    fn mkdir(&mut self, path: &str, mode: i32) -> Result<(), TransportError> {
        self.make_dir(path, mode)
            .map_err(|reason| TransportError::CreateDir {
                path: path.to_string(),
                reason,
            })
    }

    fn get(&mut self, path: &str, max_bytes: u64) -> Result<Vec<u8>, TransportError> {
        self.retrieve(path, max_bytes)
            .map_err(|reason| TransportError::Read {
                path: path.to_string(),
                reason,
            })
    }

    fn put(&mut self, path: &str, data: &[u8], mode: i32) -> Result<(), TransportError> {
        self.store(path, data, mode)
            .map_err(|reason| TransportError::Write {
                path: path.to_string(),
                reason,
            })
    }

    fn delete(&mut self, path: &str) -> Result<(), TransportError> {
        self.remove(path).map_err(|reason| TransportError::Remove {
            path: path.to_string(),
            reason,
        })
    }
}

fn send_command<S: Read + Write>(stream: &mut BufReader<S>, cmd: &str) -> io::Result<()> {
    if cmd.starts_with("PASS ") {
        trace!("> PASS ****");
    } else {
        trace!("> {cmd}");
    }
    let line = Zeroizing::new(format!("{cmd}\r\n"));
    let inner = stream.get_mut();
    inner.write_all(line.as_bytes())?;
    inner.flush()
}

/// Read one complete reply, following multi-line continuations.
fn read_reply<R: BufRead>(reader: &mut R) -> io::Result<Reply> {
    let first = read_line(reader)?;
    let (code, continued, text) = parse_status(&first)?;
    if !continued {
        trace!("< {first}");
        return Ok(Reply { code, text });
    }

    let terminator = format!("{code} ");
    let mut lines = vec![text];
    loop {
        let line = read_line(reader)?;
        if let Some(last) = line.strip_prefix(&terminator) {
            lines.push(last.to_string());
            break;
        }
        if line == code.to_string() {
            break;
        }
        lines.push(line);
    }
    let reply = Reply {
        code,
        text: lines.join("\n"),
    };
    trace!("< {reply}");
    Ok(reply)
}

fn read_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        ));
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Split `"227-text"` / `"227 text"` into code, continuation flag and text.
fn parse_status(line: &str) -> io::Result<(u16, bool, String)> {
    let invalid = || {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed reply line {line:?}"),
        )
    };
    let code: u16 = line
        .get(..3)
        .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|c| c.parse().ok())
        .ok_or_else(invalid)?;
    let continued = line.as_bytes().get(3) == Some(&b'-');
    let text = line.get(4..).unwrap_or("").to_string();
    Ok((code, continued, text))
}

/// Port from a `227` reply such as `Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
fn parse_pasv_port(text: &str) -> Option<u16> {
    let numbers: Vec<u16> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if numbers.len() < 6 {
        return None;
    }
    let fields = &numbers[numbers.len() - 6..];
    if fields.iter().any(|n| *n > 255) {
        return None;
    }
    Some(fields[4] * 256 + fields[5])
}

/// Number of components a relative `path` descends, or `None` when `CDUP`
/// cannot undo a `CWD` into it.
fn relative_depth(path: &str) -> Option<usize> {
    if path.starts_with(['/', '\\']) {
        return None;
    }
    let mut depth = 0;
    for part in path.split(['/', '\\']).filter(|p| !p.is_empty() && *p != ".") {
        if part == ".." {
            return None;
        }
        depth += 1;
    }
    Some(depth)
}

/// Directory from a `257` reply; embedded quotes are doubled.
fn parse_pwd(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let mut chars = text[start + 1..].chars().peekable();
    let mut dir = String::new();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                dir.push('"');
            } else {
                return Some(dir);
            }
        } else {
            dir.push(c);
        }
    }
    None
}
