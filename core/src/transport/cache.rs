//! Request-scoped reuse of authenticated sessions.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::credential::CredentialSource;
use crate::errors::TransportError;

use super::selector::Endpoint;
use super::{BackendKind, SessionState, Transport, TransportFactory};

/// Holds at most one session per backend kind for the lifetime of one user
/// request.
///
/// A cached session is probed before reuse; a stale one is closed and
/// replaced by a fresh connect + authenticate, invisibly to the caller. Each
/// call makes at most one connection attempt. All sessions are closed when
/// the cache is dropped.
pub struct SessionCache {
    factory: Box<dyn TransportFactory>,
    sessions: HashMap<BackendKind, Box<dyn Transport>>,
}

impl SessionCache {
    pub fn new(factory: Box<dyn TransportFactory>) -> Self {
        Self {
            factory,
            sessions: HashMap::new(),
        }
    }

    /// Return an authenticated session for `endpoint`, reusing a live one.
    pub fn session(
        &mut self,
        endpoint: &Endpoint,
        credentials: &dyn CredentialSource,
    ) -> Result<&mut dyn Transport, TransportError> {
        let reusable = match self.sessions.get_mut(&endpoint.kind) {
            Some(existing) => {
                *existing.state() == SessionState::Authenticated && existing.probe()
            }
            None => false,
        };

        if reusable {
            debug!("Reusing {} session to {}", endpoint.kind, endpoint.target());
        } else {
            if let Some(mut stale) = self.sessions.remove(&endpoint.kind) {
                info!(
                    "Cached {} session to {} is no longer usable; reconnecting",
                    endpoint.kind,
                    endpoint.target()
                );
                stale.close();
            }
            let fresh = self.open(endpoint, credentials)?;
            self.sessions.insert(endpoint.kind, fresh);
        }

        match self.sessions.get_mut(&endpoint.kind) {
            Some(session) => Ok(session.as_mut()),
            None => Err(TransportError::Connect {
                target: endpoint.target(),
                reason: "session vanished from cache".to_string(),
            }),
        }
    }

    fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &dyn CredentialSource,
    ) -> Result<Box<dyn Transport>, TransportError> {
        debug!("Opening {} session to {}", endpoint.kind, endpoint.target());
        let mut transport = self.factory.create(endpoint.kind);
        transport.connect(&endpoint.host, endpoint.port)?;

        let creds = match credentials.credentials() {
            Ok(creds) => creds,
            Err(e) => {
                transport.close();
                return Err(e);
            }
        };
        if let Err(e) = transport.authenticate(&creds) {
            warn!(
                "Login as {} on {} failed: {e}",
                creds.username,
                endpoint.target()
            );
            transport.close();
            return Err(e);
        }
        info!(
            "Logged in as {} on {} via {}",
            creds.username,
            endpoint.target(),
            endpoint.kind
        );
        Ok(transport)
    }

    /// Close every cached session.
    pub fn close_all(&mut self) {
        for (kind, mut session) in self.sessions.drain() {
            debug!("Closing {kind} session");
            session.close();
        }
    }

    /// Number of sessions currently held.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Drop for SessionCache {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredentials;
    use crate::transport::memory::MemoryFs;

    fn endpoint() -> Endpoint {
        Endpoint {
            host: "mail.example.com".into(),
            kind: BackendKind::Sftp,
            port: 22,
        }
    }

    #[test]
    fn reuses_live_session() {
        let fs = MemoryFs::new();
        let mut cache = SessionCache::new(Box::new(fs.factory()));
        let creds = StaticCredentials::new("jdoe", "pw");

        cache.session(&endpoint(), &creds).unwrap();
        cache.session(&endpoint(), &creds).unwrap();

        assert_eq!(fs.connect_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rebuilds_stale_session() {
        let fs = MemoryFs::new();
        let mut cache = SessionCache::new(Box::new(fs.factory()));
        let creds = StaticCredentials::new("jdoe", "pw");

        cache.session(&endpoint(), &creds).unwrap();
        fs.drop_connections();
        let session = cache.session(&endpoint(), &creds).unwrap();

        assert_eq!(*session.state(), SessionState::Authenticated);
        assert_eq!(fs.connect_count(), 2);
    }

    #[test]
    fn failed_login_is_not_cached() {
        let fs = MemoryFs::new();
        fs.reject_logins(true);
        let mut cache = SessionCache::new(Box::new(fs.factory()));
        let creds = StaticCredentials::new("jdoe", "wrong");

        let err = cache.session(&endpoint(), &creds).err().unwrap();
        assert!(matches!(err, TransportError::Auth { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn drop_closes_sessions() {
        let fs = MemoryFs::new();
        {
            let mut cache = SessionCache::new(Box::new(fs.factory()));
            let creds = StaticCredentials::new("jdoe", "pw");
            cache.session(&endpoint(), &creds).unwrap();
        }
        assert_eq!(fs.close_count(), 1);
    }
}
