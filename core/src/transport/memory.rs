//! In-process backend over a shared in-memory file tree.
//!
//! Used by the test suites in place of a real server. Every transport made
//! by one [`MemoryFs`] sees the same files, and faults can be injected per
//! path or per session phase.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::rc::Rc;

use crate::credential::Credentials;
use crate::errors::TransportError;

use super::{BackendKind, SessionState, Transport, TransportFactory};

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, (Vec<u8>, i32)>,
    dirs: BTreeMap<String, i32>,
    generation: u64,
    connects: usize,
    closes: usize,
    refuse_connect: bool,
    reject_logins: bool,
    failing: HashSet<(Op, String)>,
    log: Vec<String>,
}

/// Operations that can be made to fail for a given path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Stat,
    Mkdir,
    Get,
    Put,
    Delete,
}

/// Handle to a shared in-memory file tree.
#[derive(Clone, Default)]
pub struct MemoryFs {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose transports all operate on this tree.
    pub fn factory(&self) -> MemoryTransports {
        MemoryTransports { fs: self.clone() }
    }

    pub fn insert_file(&self, path: &str, content: &str) {
        let path = normalize(path);
        let mut state = self.state.borrow_mut();
        for dir in ancestors(&path) {
            state.dirs.entry(dir).or_insert(0o755);
        }
        state
            .files
            .insert(path, (content.as_bytes().to_vec(), 0o644));
    }

    pub fn insert_dir(&self, path: &str) {
        let path = normalize(path);
        let mut state = self.state.borrow_mut();
        for dir in ancestors(&path) {
            state.dirs.entry(dir).or_insert(0o755);
        }
        state.dirs.insert(path, 0o755);
    }

    /// Content of the file at `path`, if present.
    pub fn file(&self, path: &str) -> Option<String> {
        self.state
            .borrow()
            .files
            .get(&normalize(path))
            .map(|(data, _)| String::from_utf8_lossy(data).into_owned())
    }

    pub fn file_mode(&self, path: &str) -> Option<i32> {
        self.state
            .borrow()
            .files
            .get(&normalize(path))
            .map(|(_, mode)| *mode)
    }

    pub fn dir_mode(&self, path: &str) -> Option<i32> {
        self.state.borrow().dirs.get(&normalize(path)).copied()
    }

    /// Names of all files, sorted.
    pub fn file_names(&self) -> BTreeSet<String> {
        self.state.borrow().files.keys().cloned().collect()
    }

    /// Make `op` on `path` fail from now on.
    pub fn fail(&self, op: Op, path: &str) {
        self.state
            .borrow_mut()
            .failing
            .insert((op, normalize(path)));
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.borrow_mut().refuse_connect = refuse;
    }

    pub fn reject_logins(&self, reject: bool) {
        self.state.borrow_mut().reject_logins = reject;
    }

    /// Simulate the server dropping every open connection.
    pub fn drop_connections(&self) {
        self.state.borrow_mut().generation += 1;
    }

    pub fn connect_count(&self) -> usize {
        self.state.borrow().connects
    }

    pub fn close_count(&self) -> usize {
        self.state.borrow().closes
    }

    /// Mutating operations performed so far, e.g. `"put .forward"`.
    pub fn log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }
}

/// [`TransportFactory`] handing out [`MemoryTransport`]s.
pub struct MemoryTransports {
    fs: MemoryFs,
}

impl TransportFactory for MemoryTransports {
    fn create(&self, kind: BackendKind) -> Box<dyn Transport> {
        Box::new(MemoryTransport {
            kind,
            fs: self.fs.clone(),
            state: SessionState::Unconnected,
            generation: 0,
        })
    }
}

pub struct MemoryTransport {
    kind: BackendKind,
    fs: MemoryFs,
    state: SessionState,
    generation: u64,
}

impl MemoryTransport {
    fn check(&self, op: Op, path: &str) -> Result<String, String> {
        if self.state != SessionState::Authenticated {
            return Err("not logged in".to_string());
        }
        let state = self.fs.state.borrow();
        if state.generation != self.generation {
            return Err("connection reset by peer".to_string());
        }
        let path = normalize(path);
        if state.failing.contains(&(op, path.clone())) {
            return Err("injected failure".to_string());
        }
        Ok(path)
    }
}

impl Transport for MemoryTransport {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn state(&self) -> &SessionState {
        &self.state
    }

    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        let mut state = self.fs.state.borrow_mut();
        if state.refuse_connect {
            self.state = SessionState::Failed("connection refused".to_string());
            return Err(TransportError::Connect {
                target: format!("{host}:{port}"),
                reason: "Connection refused".to_string(),
            });
        }
        state.connects += 1;
        self.generation = state.generation;
        self.state = SessionState::Connected;
        Ok(())
    }

    fn authenticate(&mut self, credentials: &Credentials) -> Result<(), TransportError> {
        if self.fs.state.borrow().reject_logins {
            self.state = SessionState::Failed("login rejected".to_string());
            return Err(TransportError::Auth {
                host: "memory".to_string(),
                reason: format!("530 Login incorrect for {}", credentials.username),
            });
        }
        self.state = SessionState::Authenticated;
        Ok(())
    }

    fn probe(&mut self) -> bool {
        self.state == SessionState::Authenticated
            && self.fs.state.borrow().generation == self.generation
    }

    fn close(&mut self) {
        self.fs.state.borrow_mut().closes += 1;
        self.state = SessionState::Closed;
    }

    fn exists(&mut self, path: &str) -> Result<bool, TransportError> {
        let path = self.check(Op::Stat, path).map_err(|reason| TransportError::Read {
            path: path.to_string(),
            reason,
        })?;
        Ok(self.fs.state.borrow().files.contains_key(&path))
    }

    fn dir_exists(&mut self, path: &str) -> Result<bool, TransportError> {
        let path = self
            .check(Op::Stat, path)
            .map_err(|reason| TransportError::ChangeDir {
                path: path.to_string(),
                reason,
            })?;
        Ok(path.is_empty() || path == "/" || self.fs.state.borrow().dirs.contains_key(&path))
    }

    fn mkdir(&mut self, path: &str, mode: i32) -> Result<(), TransportError> {
        let err = |reason: String| TransportError::CreateDir {
            path: path.to_string(),
            reason,
        };
        let normalized = self.check(Op::Mkdir, path).map_err(err)?;
        let mut state = self.fs.state.borrow_mut();
        if state.dirs.contains_key(&normalized) {
            return Err(err("file exists".to_string()));
        }
        if let Some(parent) = parent_of(&normalized) {
            if !state.dirs.contains_key(&parent) {
                return Err(err("no such directory".to_string()));
            }
        }
        state.log.push(format!("mkdir {normalized}"));
        state.dirs.insert(normalized, mode);
        Ok(())
    }

    fn get(&mut self, path: &str, max_bytes: u64) -> Result<Vec<u8>, TransportError> {
        let err = |reason: String| TransportError::Read {
            path: path.to_string(),
            reason,
        };
        let normalized = self.check(Op::Get, path).map_err(err)?;
        let state = self.fs.state.borrow();
        let (data, _) = state
            .files
            .get(&normalized)
            .ok_or_else(|| err("no such file".to_string()))?;
        let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX).min(data.len());
        Ok(data[..limit].to_vec())
    }

    fn put(&mut self, path: &str, data: &[u8], mode: i32) -> Result<(), TransportError> {
        let err = |reason: String| TransportError::Write {
            path: path.to_string(),
            reason,
        };
        let normalized = self.check(Op::Put, path).map_err(err)?;
        let mut state = self.fs.state.borrow_mut();
        if let Some(parent) = parent_of(&normalized) {
            if !state.dirs.contains_key(&parent) {
                return Err(err("no such directory".to_string()));
            }
        }
        state.log.push(format!("put {normalized}"));
        state.files.insert(normalized, (data.to_vec(), mode));
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), TransportError> {
        let err = |reason: String| TransportError::Remove {
            path: path.to_string(),
            reason,
        };
        let normalized = self.check(Op::Delete, path).map_err(err)?;
        let mut state = self.fs.state.borrow_mut();
        if state.files.remove(&normalized).is_none() {
            return Err(err("no such file".to_string()));
        }
        state.log.push(format!("delete {normalized}"));
        Ok(())
    }
}

/// Canonical key for a path: no `.` components, no repeated or trailing
/// separators. Absolute paths keep their leading `/`.
fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let parts: Vec<&str> = path
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

fn parent_of(normalized: &str) -> Option<String> {
    let idx = normalized.rfind('/')?;
    if idx == 0 {
        None
    } else {
        Some(normalized[..idx].to_string())
    }
}

fn ancestors(normalized: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = parent_of(normalized);
    while let Some(dir) = current {
        current = parent_of(&dir);
        out.push(dir);
    }
    out
}
