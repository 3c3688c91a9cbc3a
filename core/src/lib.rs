//! Remote management of a mail user's forward and vacation files.
//!
//! The files live on the mail host and are reached over FTP, FTP over TLS,
//! SCP or SFTP with the user's own credentials. [`reconcile::Autoresponder`]
//! is the entry point: it reads the current files into form defaults and
//! installs new choices.

pub mod config;
pub mod credential;
pub mod errors;
pub mod files;
pub mod form;
pub mod forward;
pub mod prefs;
pub mod reconcile;
pub mod transport;
pub mod vacation;

pub use config::AutorespondConfig;
pub use errors::{CoreError, ErrorKind, TransportError};
pub use reconcile::{Autoresponder, Choices, InstallReport};
