pub mod pattern;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CoreError;
use crate::transport::selector;

/// Placeholder substituted with the login name by [`AutorespondConfig::for_user`].
pub const USER_PLACEHOLDER: &str = "{user}";

/// Site configuration for the autoresponder.
///
/// Key names follow the options understood by the webmail plugin so an
/// existing configuration can be carried over verbatim. Every field has a
/// default; a configuration file only needs to name what differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutorespondConfig {
    /// Host holding the user's forward and vacation files.
    #[serde(default)]
    pub ftphost: String,
    /// One of `ftp`, `ftp/tls`, `ftps`, `ssh`, `scp`, `sftp`.
    #[serde(default = "default_ftp_method")]
    pub ftp_method: String,
    /// Explicit port; `None` picks the method's default.
    #[serde(default)]
    pub ftp_port: Option<u16>,
    #[serde(default = "default_forward_file")]
    pub forward_file: String,
    #[serde(default = "default_vacation_file")]
    pub vacation_file: String,
    #[serde(default = "default_vacation_cache")]
    pub vacation_cache: String,
    #[serde(default = "default_vacation_pattern")]
    pub vacation_pattern: String,
    /// Alternative vacation pattern; a token matching either is a vacation
    /// invocation.
    #[serde(default)]
    pub vacation_pcre: Option<String>,
    #[serde(default = "default_vacation_aliases_pat")]
    pub vacation_aliases_pat: String,
    /// Format for one alias option, `%s` is the alias.
    #[serde(default = "default_vacation_alias")]
    pub vacation_alias: String,
    /// Format for the whole vacation command, `%s` is the joined alias
    /// options.
    #[serde(default = "default_vacation_string")]
    pub vacation_string: String,
    #[serde(default = "default_filter_pattern")]
    pub filter_pattern: String,
    /// Filter command line. When unset the filtered keep type is not offered.
    #[serde(default = "default_filter_string")]
    pub filter_string: Option<String>,
    /// Human readable name of the filter, used in install summaries.
    #[serde(default = "default_filter_descr")]
    pub filter_descr: String,
    #[serde(default = "default_keep_string")]
    pub keep_string: String,
    #[serde(default)]
    pub keep_by_default: bool,
    /// Whether the vacation file gets a `From:` header.
    #[serde(default = "default_true")]
    pub vacation_from: bool,
    #[serde(default = "default_subject")]
    pub default_subject: String,
    #[serde(default = "default_message")]
    pub default_message: String,
    /// Mailbox that a trash redirect delivers into.
    #[serde(default = "default_trash_folder")]
    pub trash_folder: String,
    /// Largest remote file that is downloaded, in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Network timeout in seconds; 0 blocks indefinitely.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip certificate verification on FTP-over-TLS connections.
    #[serde(default)]
    pub tls_accept_invalid_certs: bool,
}

impl Default for AutorespondConfig {
    fn default() -> Self {
        Self {
            ftphost: String::new(),
            ftp_method: default_ftp_method(),
            ftp_port: None,
            forward_file: default_forward_file(),
            vacation_file: default_vacation_file(),
            vacation_cache: default_vacation_cache(),
            vacation_pattern: default_vacation_pattern(),
            vacation_pcre: None,
            vacation_aliases_pat: default_vacation_aliases_pat(),
            vacation_alias: default_vacation_alias(),
            vacation_string: default_vacation_string(),
            filter_pattern: default_filter_pattern(),
            filter_string: default_filter_string(),
            filter_descr: default_filter_descr(),
            keep_string: default_keep_string(),
            keep_by_default: false,
            vacation_from: true,
            default_subject: default_subject(),
            default_message: default_message(),
            trash_folder: default_trash_folder(),
            max_bytes: default_max_bytes(),
            timeout_secs: default_timeout_secs(),
            tls_accept_invalid_certs: false,
        }
    }
}

impl AutorespondConfig {
    /// Load a configuration from a JSON file.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        debug!(
            "Loaded autorespond config from {} (host {:?}, method {})",
            path.display(),
            config.ftphost,
            config.ftp_method
        );
        Ok(config)
    }

    /// Check the options that make every remote operation fail when wrong.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.ftphost.trim().is_empty() {
            return Err(CoreError::Config(
                "ftphost must be set to the host holding the users' files".to_string(),
            ));
        }
        selector::select(&self.ftp_method, self.ftp_port)
            .map_err(|e| CoreError::Config(e.to_string()))?;
        if self.max_bytes == 0 {
            return Err(CoreError::Config("max_bytes must be positive".to_string()));
        }
        Ok(())
    }

    /// Return a copy with every `{user}` placeholder replaced by `username`.
    pub fn for_user(&self, username: &str) -> Self {
        let expand = |s: &str| s.replace(USER_PLACEHOLDER, username);
        Self {
            ftphost: expand(&self.ftphost),
            forward_file: expand(&self.forward_file),
            vacation_file: expand(&self.vacation_file),
            vacation_cache: expand(&self.vacation_cache),
            vacation_string: expand(&self.vacation_string),
            filter_string: self.filter_string.as_deref().map(expand),
            keep_string: expand(&self.keep_string),
            default_subject: expand(&self.default_subject),
            default_message: expand(&self.default_message),
            trash_folder: expand(&self.trash_folder),
            ..self.clone()
        }
    }

    /// Network timeout, `None` when disabled.
    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_secs > 0).then(|| std::time::Duration::from_secs(self.timeout_secs))
    }
}

fn default_ftp_method() -> String {
    "ftp".to_string()
}

fn default_forward_file() -> String {
    ".forward".to_string()
}

fn default_vacation_file() -> String {
    ".vacation.msg".to_string()
}

fn default_vacation_cache() -> String {
    ".vacation.db".to_string()
}

fn default_vacation_pattern() -> String {
    r"/\|.*vacation/".to_string()
}

fn default_vacation_aliases_pat() -> String {
    r"/-a\s*(\S+)/".to_string()
}

fn default_vacation_alias() -> String {
    "-a %s ".to_string()
}

fn default_vacation_string() -> String {
    "\"|/usr/bin/vacation %s{user}\"".to_string()
}

fn default_filter_pattern() -> String {
    "/procmail/".to_string()
}

fn default_filter_string() -> Option<String> {
    Some("\"|/usr/bin/procmail\"".to_string())
}

fn default_filter_descr() -> String {
    "procmail".to_string()
}

fn default_keep_string() -> String {
    "\\{user}".to_string()
}

fn default_true() -> bool {
    true
}

fn default_subject() -> String {
    "Away from my mail".to_string()
}

fn default_message() -> String {
    "I am away and will read your message when I return.".to_string()
}

fn default_trash_folder() -> String {
    "Trash".to_string()
}

fn default_max_bytes() -> u64 {
    10240
}

fn default_timeout_secs() -> u64 {
    30
}
