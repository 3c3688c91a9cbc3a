//! Pre-filled state of the autoresponder options form.

use serde::Serialize;

use crate::config::AutorespondConfig;
use crate::errors::TransportError;
use crate::forward::{ForwardState, KeepType};
use crate::prefs::{PreferenceStore, PREF_ALIASES, PREF_FORWARD};
use crate::vacation::VacationMessage;

/// What the options form shows before the user changes anything.
///
/// Field names follow the form fields the choices are submitted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormDefaults {
    pub forward: bool,
    pub addr: String,
    pub vacation: bool,
    pub subject: String,
    pub message: String,
    pub aliases: String,
    pub keep: bool,
    pub keeptype: Option<KeepType>,
    /// Whether the filtered keep type can be chosen at all.
    pub filter_available: bool,
    pub trash: bool,
    /// Problems met while reading the remote files, ready for display.
    pub problems: Vec<String>,
}

impl FormDefaults {
    /// Combine the parsed remote files with the user's remembered
    /// preferences and the configured defaults.
    pub fn build(
        config: &AutorespondConfig,
        user: &str,
        forward: &ForwardState,
        vacation: VacationMessage,
        prefs: &dyn PreferenceStore,
    ) -> Self {
        let candidates = forward.candidate_addresses();
        let addr = if candidates.is_empty() {
            prefs.get(user, PREF_FORWARD).unwrap_or_default()
        } else {
            candidates.join(", ")
        };

        let aliases = if forward.aliases.is_empty() {
            prefs.get(user, PREF_ALIASES).unwrap_or_default()
        } else {
            forward.aliases.join(", ")
        };

        let keeptype = forward.effective_keep(config.keep_by_default);
        let vacation = vacation.or_defaults(&config.default_subject, &config.default_message);

        Self {
            forward: forward.forwarding(),
            addr,
            vacation: forward.vacation,
            subject: vacation.subject,
            message: vacation.body,
            aliases,
            keep: keeptype.is_some(),
            keeptype,
            filter_available: config.filter_string.is_some(),
            trash: forward.trash,
            problems: Vec::new(),
        }
    }
}

/// User-facing text for a failed download.
pub fn download_problem(err: &TransportError) -> String {
    format!(
        "There was a problem connecting to your FTP server: \"{err}\". \
         Please contact your support department."
    )
}
