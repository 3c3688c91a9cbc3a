//! Whole-file transfers of small line-oriented text files.
//!
//! [`reader::read_lines`] and [`writer::write_content`] hold the protocol
//! independent logic (existence checks, parent directory creation, delete on
//! empty content) and drive any [`Transport`](crate::transport::Transport).
//! [`RemoteFiles`] binds them to the configured endpoint and a request-scoped
//! [`SessionCache`].

pub mod reader;
pub mod writer;

use tracing::debug;

use crate::config::AutorespondConfig;
use crate::credential::CredentialSource;
use crate::errors::TransportError;
use crate::transport::{Endpoint, NetworkTransports, SessionCache, TransportFactory};

pub use reader::read_lines;
pub use writer::write_content;

/// Content of a remote file as read by [`read_lines`].
///
/// A file that does not exist is not an error; it is kept distinct from an
/// empty file so callers can tell "never written" apart when they care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFile {
    Absent,
    /// Lines without terminators, trailing whitespace trimmed.
    Present(Vec<String>),
}

impl RemoteFile {
    pub fn lines(&self) -> &[String] {
        match self {
            RemoteFile::Absent => &[],
            RemoteFile::Present(lines) => lines,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, RemoteFile::Absent)
    }
}

/// Split a remote path into its directory and file name.
///
/// Both `/` and `\` separate components. A bare name lives in `.`.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind(['/', '\\']) {
        None => (".", path),
        Some(0) => ("/", &path[1..]),
        Some(i) => (&path[..i], &path[i + 1..]),
    }
}

/// Every directory that has to exist for `dir` to exist, outermost first.
///
/// `.` components and repeated separators are dropped; an absolute `dir`
/// yields absolute prefixes.
pub fn directory_prefixes(dir: &str) -> Vec<String> {
    let absolute = dir.starts_with(['/', '\\']);
    let mut current = if absolute { "/".to_string() } else { String::new() };
    let mut out = Vec::new();
    for part in dir.split(['/', '\\']).filter(|p| !p.is_empty() && *p != ".") {
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(part);
        out.push(current.clone());
    }
    out
}

/// Reads and writes the user's files on the configured host.
///
/// Sessions are opened lazily on first use, reused for every later transfer
/// and closed by [`close()`](RemoteFiles::close) or on drop.
pub struct RemoteFiles {
    config: AutorespondConfig,
    cache: SessionCache,
    credentials: Box<dyn CredentialSource>,
}

impl RemoteFiles {
    pub fn new(
        config: &AutorespondConfig,
        factory: Box<dyn TransportFactory>,
        credentials: Box<dyn CredentialSource>,
    ) -> Self {
        Self {
            config: config.clone(),
            cache: SessionCache::new(factory),
            credentials,
        }
    }

    /// Use the network backends with the configured timeout and TLS policy.
    pub fn over_network(
        config: &AutorespondConfig,
        credentials: Box<dyn CredentialSource>,
    ) -> Self {
        let factory = NetworkTransports {
            timeout: config.timeout(),
            tls_accept_invalid_certs: config.tls_accept_invalid_certs,
        };
        Self::new(config, Box::new(factory), credentials)
    }

    /// The configured remote account, or the configuration problem that
    /// prevents reaching it.
    pub fn endpoint(&self) -> Result<Endpoint, TransportError> {
        Endpoint::from_config(&self.config)
    }

    /// Fetch the file at `path` as lines, bounded by the configured size.
    pub fn download(&mut self, path: &str) -> Result<RemoteFile, TransportError> {
        let endpoint = self.endpoint()?;
        if path.trim().is_empty() {
            return Err(TransportError::MissingPath);
        }
        debug!("Downloading {path} from {}", endpoint.target());
        let session = self.cache.session(&endpoint, self.credentials.as_ref())?;
        read_lines(session, path, self.config.max_bytes)
    }

    /// Replace the file at `path` with `content`, or remove it when
    /// `content` is empty.
    pub fn upload(&mut self, path: &str, content: &str) -> Result<(), TransportError> {
        let endpoint = self.endpoint()?;
        if path.trim().is_empty() {
            return Err(TransportError::MissingPath);
        }
        debug!(
            "Uploading {} bytes to {path} on {}",
            content.len(),
            endpoint.target()
        );
        let session = self.cache.session(&endpoint, self.credentials.as_ref())?;
        write_content(session, path, content)
    }

    /// Close every open session.
    pub fn close(&mut self) {
        self.cache.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredentials;
    use crate::transport::memory::MemoryFs;

    fn remote(fs: &MemoryFs, host: &str) -> RemoteFiles {
        let config = AutorespondConfig {
            ftphost: host.into(),
            ..Default::default()
        };
        RemoteFiles::new(
            &config,
            Box::new(fs.factory()),
            Box::new(StaticCredentials::new("jdoe", "pw")),
        )
    }

    #[test]
    fn split_path_cases() {
        assert_eq!(split_path(".forward"), (".", ".forward"));
        assert_eq!(split_path("mail/.vacation.msg"), ("mail", ".vacation.msg"));
        assert_eq!(split_path("/etc/x"), ("/etc", "x"));
        assert_eq!(split_path("/x"), ("/", "x"));
        assert_eq!(split_path("a\\b"), ("a", "b"));
    }

    #[test]
    fn directory_prefixes_cases() {
        assert!(directory_prefixes(".").is_empty());
        assert!(directory_prefixes("/").is_empty());
        assert_eq!(directory_prefixes("mail/lists"), vec!["mail", "mail/lists"]);
        assert_eq!(directory_prefixes("./mail//x"), vec!["mail", "mail/x"]);
        assert_eq!(
            directory_prefixes("/home/jdoe"),
            vec!["/home", "/home/jdoe"]
        );
    }

    #[test]
    fn download_and_upload_share_one_session() {
        let fs = MemoryFs::new();
        fs.insert_file(".forward", "jdoe@example.org\n");
        let mut files = remote(&fs, "mail.example.com");

        let content = files.download(".forward").unwrap();
        assert_eq!(content.lines(), ["jdoe@example.org"]);
        files.upload(".forward", "other@example.org\n").unwrap();

        assert_eq!(fs.connect_count(), 1);
        assert_eq!(fs.file(".forward").as_deref(), Some("other@example.org\n"));
    }

    #[test]
    fn missing_host_fails_before_connecting() {
        let fs = MemoryFs::new();
        let mut files = remote(&fs, "");
        assert!(matches!(
            files.download(".forward"),
            Err(TransportError::NotConfigured)
        ));
        assert_eq!(fs.connect_count(), 0);
    }

    #[test]
    fn empty_path_is_rejected() {
        let fs = MemoryFs::new();
        let mut files = remote(&fs, "h");
        assert!(matches!(
            files.upload("  ", "x"),
            Err(TransportError::MissingPath)
        ));
    }
}
