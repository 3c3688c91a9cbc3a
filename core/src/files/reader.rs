use tracing::{debug, trace};

use crate::errors::TransportError;
use crate::transport::Transport;

use super::{split_path, RemoteFile};

/// Read the file at `path` as lines.
///
/// A parent directory that cannot be entered is an error; a missing file is
/// [`RemoteFile::Absent`]. At most `max_bytes` bytes are fetched, so an
/// oversized file yields its leading lines only. Invalid UTF-8 is replaced
/// rather than rejected.
pub fn read_lines(
    session: &mut dyn Transport,
    path: &str,
    max_bytes: u64,
) -> Result<RemoteFile, TransportError> {
    if path.trim().is_empty() {
        return Err(TransportError::MissingPath);
    }

    let (dir, _) = split_path(path);
    if dir != "." && dir != "/" && !session.dir_exists(dir)? {
        return Err(TransportError::ChangeDir {
            path: dir.to_string(),
            reason: "no such directory".to_string(),
        });
    }

    if !session.exists(path)? {
        debug!("{path} does not exist");
        return Ok(RemoteFile::Absent);
    }

    let data = session.get(path, max_bytes)?;
    trace!("Read {} bytes from {path}", data.len());
    let text = String::from_utf8_lossy(&data);
    Ok(RemoteFile::Present(
        text.lines().map(|l| l.trim_end().to_string()).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credentials;
    use crate::transport::memory::{MemoryFs, Op};
    use crate::transport::{BackendKind, TransportFactory};

    fn session(fs: &MemoryFs) -> Box<dyn Transport> {
        let mut t = fs.factory().create(BackendKind::Sftp);
        t.connect("h", 22).unwrap();
        t.authenticate(&Credentials::new("jdoe", "pw")).unwrap();
        t
    }

    #[test]
    fn reads_lines_and_trims_trailing_whitespace() {
        let fs = MemoryFs::new();
        fs.insert_file(".forward", "a@example.org  \r\n\"|/usr/bin/vacation jdoe\"\n");
        let mut t = session(&fs);
        let content = read_lines(t.as_mut(), ".forward", 10240).unwrap();
        assert_eq!(
            content,
            RemoteFile::Present(vec![
                "a@example.org".to_string(),
                "\"|/usr/bin/vacation jdoe\"".to_string()
            ])
        );
    }

    #[test]
    fn missing_file_is_absent() {
        let fs = MemoryFs::new();
        let mut t = session(&fs);
        assert!(read_lines(t.as_mut(), ".forward", 10240)
            .unwrap()
            .is_absent());
    }

    #[test]
    fn empty_file_is_present_without_lines() {
        let fs = MemoryFs::new();
        fs.insert_file(".forward", "");
        let mut t = session(&fs);
        let content = read_lines(t.as_mut(), ".forward", 10240).unwrap();
        assert!(!content.is_absent());
        assert!(content.lines().is_empty());
    }

    #[test]
    fn missing_parent_directory_is_an_error() {
        let fs = MemoryFs::new();
        let mut t = session(&fs);
        let err = read_lines(t.as_mut(), "mail/.forward", 10240).unwrap_err();
        assert!(matches!(err, TransportError::ChangeDir { ref path, .. } if path == "mail"));
    }

    #[test]
    fn reads_are_truncated_to_max_bytes() {
        let fs = MemoryFs::new();
        fs.insert_file(".vacation.msg", "Subject: x\n\nlong body\n");
        let mut t = session(&fs);
        let content = read_lines(t.as_mut(), ".vacation.msg", 10).unwrap();
        assert_eq!(content.lines(), ["Subject: x"]);
    }

    #[test]
    fn get_failure_is_a_read_error() {
        let fs = MemoryFs::new();
        fs.insert_file(".forward", "x\n");
        fs.fail(Op::Get, ".forward");
        let mut t = session(&fs);
        assert!(matches!(
            read_lines(t.as_mut(), ".forward", 10240),
            Err(TransportError::Read { .. })
        ));
    }
}
