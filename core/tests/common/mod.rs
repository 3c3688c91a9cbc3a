//! Shared test utilities for the autorespond integration tests.
//!
//! Provides an in-memory remote account wired into an [`Autoresponder`],
//! and the Docker availability check used by the live SSH tests in
//! `ssh_transfer.rs` (containers from `tests/docker/docker-compose.yml`).

// Each integration test is compiled as its own crate, so not every test file
// uses every function from this shared module. Suppress dead_code warnings.
#![allow(dead_code)]

use std::net::TcpStream;
use std::time::Duration;

use autorespond_core::credential::StaticCredentials;
use autorespond_core::prefs::{MemoryPreferenceStore, PreferenceStore};
use autorespond_core::transport::memory::MemoryFs;
use autorespond_core::{AutorespondConfig, Autoresponder};

/// Check if a TCP port is reachable on the given host.
///
/// Returns `true` if a TCP connection can be established within 2 seconds.
pub fn is_port_reachable(host: &str, port: u16) -> bool {
    let addr = format!("{host}:{port}");
    if let Ok(addr) = addr.parse() {
        TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok()
    } else {
        false
    }
}

/// Skip the current test if a Docker container is not reachable on the given port.
///
/// Prints a message to stderr and returns early (runtime check instead of
/// `#[ignore]`).
macro_rules! require_docker {
    ($port:expr) => {
        if !common::is_port_reachable("127.0.0.1", $port) {
            eprintln!(
                "SKIPPED: Docker container not reachable on port {} \
                 (start with: cd tests/docker && docker compose up -d)",
                $port
            );
            return;
        }
    };
}
pub(crate) use require_docker;

/// openssh-server container with password login (SCP and SFTP).
pub const PORT_SSH_PASSWORD: u16 = 2201;
pub const SSH_USER: &str = "testuser";
pub const SSH_PASSWORD: &str = "testpass";

/// The user every in-memory scenario runs as.
pub const USER: &str = "jdoe";

/// A site configuration pointing at the in-memory host.
pub fn memory_config() -> AutorespondConfig {
    AutorespondConfig {
        ftphost: "mail.example.com".to_string(),
        ..Default::default()
    }
}

/// An [`Autoresponder`] for [`USER`] over `fs`.
pub fn autoresponder(
    fs: &MemoryFs,
    config: &AutorespondConfig,
    prefs: MemoryPreferenceStore,
) -> Autoresponder {
    Autoresponder::new(
        config,
        USER,
        Box::new(fs.factory()),
        Box::new(StaticCredentials::new(USER, "secret")),
        Box::new(prefs),
    )
    .expect("configuration should compile")
}

/// Preferences carrying a display name and address for the `From:` header.
pub fn prefs_with_identity() -> MemoryPreferenceStore {
    let mut prefs = MemoryPreferenceStore::new();
    prefs.set(USER, "full_name", "Jane Doe");
    prefs.set(USER, "email_address", "jdoe@example.org");
    prefs
}
