//! Turning the user's choices into new remote files.
//!
//! [`plan`] is pure: it renders the forward file, the vacation file and the
//! confirmation lines from a set of [`Choices`]. [`Autoresponder`] performs
//! the I/O around it: reading the current files into [`FormDefaults`],
//! uploading a plan artifact by artifact, and remembering the submitted
//! address and aliases.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::pattern::format_printf;
use crate::config::AutorespondConfig;
use crate::credential::CredentialSource;
use crate::errors::{CoreError, ErrorKind, TransportError};
use crate::files::RemoteFiles;
use crate::form::{download_problem, FormDefaults};
use crate::forward::{Classifier, ForwardState, KeepType};
use crate::prefs::{PreferenceStore, PREF_ALIASES, PREF_EMAIL, PREF_FORWARD, PREF_FULL_NAME};
use crate::transport::TransportFactory;
use crate::vacation::{Sender, VacationMessage};

/// What the user submitted on the options form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Choices {
    pub forward: bool,
    pub addr: String,
    pub vacation: bool,
    pub subject: String,
    pub message: String,
    /// Aliases separated by commas and/or whitespace.
    pub aliases: String,
    pub reset_cache: bool,
    pub keep: bool,
    /// Unfiltered when not given.
    pub keeptype: Option<KeepType>,
    pub trash: bool,
}

impl From<&FormDefaults> for Choices {
    /// Submit the form unchanged.
    fn from(form: &FormDefaults) -> Self {
        Self {
            forward: form.forward,
            addr: form.addr.clone(),
            vacation: form.vacation,
            subject: form.subject.clone(),
            message: form.message.clone(),
            aliases: form.aliases.clone(),
            reset_cache: false,
            keep: form.keep,
            keeptype: form.keeptype,
            trash: form.trash,
        }
    }
}

/// Split a submitted alias list on commas and whitespace.
pub fn split_aliases(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|alias| !alias.is_empty())
        .map(str::to_string)
        .collect()
}

/// Everything an install would upload, plus the confirmation text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub forward_text: String,
    /// New vacation file; `None` leaves the existing one in place.
    pub vacation_text: Option<String>,
    pub reset_cache: bool,
    pub aliases: Vec<String>,
    pub summary: Vec<String>,
}

/// Render the new files for `choices`.
///
/// `config` must already be expanded for the user. The forward file is
/// built as: forward address, vacation invocation, then the keep directive
/// in front of both, and the trash redirect last.
pub fn plan(config: &AutorespondConfig, choices: &Choices, sender: Option<&Sender>) -> Plan {
    let addr = choices.addr.trim();
    let aliases = split_aliases(&choices.aliases);
    let mut summary = Vec::new();
    let mut forward_text = String::new();

    if choices.forward && !addr.is_empty() {
        forward_text.push_str(addr);
        forward_text.push('\n');
        summary.push(format!("New mail will be sent to {addr}."));
    } else {
        summary.push("New mail will be kept here in your Inbox.".to_string());
    }

    for alias in &aliases {
        summary.push(format!("... {alias} is recognized as an alias."));
    }

    let vacation_text = if choices.vacation {
        let options: String = aliases
            .iter()
            .map(|alias| format_printf(&config.vacation_alias, alias))
            .collect();
        forward_text.push_str(&format_printf(&config.vacation_string, &options));
        forward_text.push('\n');
        summary.push("Senders will get an automatic reply.".to_string());

        let message = VacationMessage {
            subject: choices.subject.clone(),
            body: choices.message.clone(),
        };
        Some(message.render(sender.filter(|_| config.vacation_from)))
    } else {
        summary.push("No automatic reply will be sent.".to_string());
        None
    };

    if choices.reset_cache {
        summary.push("Your reply cache has been reset.".to_string());
    }

    if choices.keep {
        let filter = match choices.keeptype {
            Some(KeepType::Filtered) => config.filter_string.as_deref(),
            _ => None,
        };
        match filter {
            Some(filter) => {
                forward_text.insert_str(0, &format!("{filter}\n"));
                if addr.is_empty() {
                    summary.push(format!("...filtered through {}.", config.filter_descr));
                } else {
                    summary.push(format!(
                        "Local copies will also be kept (and will be filtered through {}).",
                        config.filter_descr
                    ));
                }
            }
            None => {
                if !config.keep_string.is_empty() {
                    forward_text.insert_str(0, &format!("{}\n", config.keep_string));
                }
                if !addr.is_empty() {
                    summary.push("Local copies will also be kept.".to_string());
                }
            }
        }
    }

    if choices.trash {
        let folder = &config.trash_folder;
        if folder.starts_with(['.', '/', '\\']) {
            forward_text.push_str(folder);
        } else {
            forward_text.push_str("./");
            forward_text.push_str(folder);
        }
        forward_text.push('\n');
        summary.push("Mail will be kept in your Trash mailbox.".to_string());
    }

    Plan {
        forward_text,
        vacation_text,
        reset_cache: choices.reset_cache,
        aliases,
        summary,
    }
}

/// The remote files an install writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    VacationFile,
    VacationCache,
    ForwardFile,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Artifact::VacationFile => "vacation file",
            Artifact::VacationCache => "reply cache",
            Artifact::ForwardFile => "forward file",
        })
    }
}

/// Result of writing one artifact.
#[derive(Debug)]
pub struct ArtifactOutcome {
    pub artifact: Artifact,
    pub path: String,
    pub result: Result<(), TransportError>,
}

impl ArtifactOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// User-facing text for a failed upload.
    pub fn problem(&self) -> Option<String> {
        self.result.as_ref().err().map(|e| {
            format!(
                "There was a problem uploading your {}: \"{e}\". \
                 Please contact your support department.",
                self.artifact
            )
        })
    }
}

/// What an install did.
#[derive(Debug)]
pub struct InstallReport {
    /// Confirmation lines describing the new settings.
    pub summary: Vec<String>,
    /// One entry per artifact that was due to be written, in upload order.
    pub outcomes: Vec<ArtifactOutcome>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(ArtifactOutcome::is_success)
    }

    pub fn problems(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(ArtifactOutcome::problem)
            .collect()
    }

    pub fn outcome(&self, artifact: Artifact) -> Option<&ArtifactOutcome> {
        self.outcomes.iter().find(|o| o.artifact == artifact)
    }
}

/// One user's autoresponder settings on the remote host.
///
/// Holds the sessions of one request; they are closed by
/// [`close()`](Autoresponder::close) or on drop.
pub struct Autoresponder {
    config: AutorespondConfig,
    user: String,
    classifier: Classifier,
    files: RemoteFiles,
    prefs: Box<dyn PreferenceStore>,
}

impl Autoresponder {
    /// `config` is the site configuration; `{user}` placeholders are
    /// expanded for `user` here.
    pub fn new(
        config: &AutorespondConfig,
        user: &str,
        factory: Box<dyn TransportFactory>,
        credentials: Box<dyn CredentialSource>,
        prefs: Box<dyn PreferenceStore>,
    ) -> Result<Self, CoreError> {
        let config = config.for_user(user);
        let classifier = Classifier::from_config(&config)?;
        let files = RemoteFiles::new(&config, factory, credentials);
        Ok(Self {
            config,
            user: user.to_string(),
            classifier,
            files,
            prefs,
        })
    }

    /// Use the network backends.
    pub fn over_network(
        config: &AutorespondConfig,
        user: &str,
        credentials: Box<dyn CredentialSource>,
        prefs: Box<dyn PreferenceStore>,
    ) -> Result<Self, CoreError> {
        let config = config.for_user(user);
        let classifier = Classifier::from_config(&config)?;
        let files = RemoteFiles::over_network(&config, credentials);
        Ok(Self {
            config,
            user: user.to_string(),
            classifier,
            files,
            prefs,
        })
    }

    pub fn config(&self) -> &AutorespondConfig {
        &self.config
    }

    /// Read and parse the forward file. A missing file parses as empty.
    pub fn read_forward(&mut self) -> Result<ForwardState, TransportError> {
        let content = self.files.download(&self.config.forward_file)?;
        Ok(ForwardState::parse(content.lines(), &self.classifier))
    }

    /// Read and parse the vacation file, without applying defaults.
    pub fn read_vacation(&mut self) -> Result<VacationMessage, TransportError> {
        let content = self.files.download(&self.config.vacation_file)?;
        Ok(VacationMessage::parse(content.lines()))
    }

    /// Work out what the options form should show.
    ///
    /// Read failures do not abort; they are listed in
    /// [`FormDefaults::problems`] and the form falls back to preferences and
    /// configured defaults. Once the host has refused a connection or login
    /// no further attempt is made.
    pub fn load_form(&mut self) -> FormDefaults {
        let mut problems = Vec::new();

        let forward = match self.read_forward() {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Cannot read forward file for {}: {e}", self.user);
                problems.push((download_problem(&e), e.kind()));
                None
            }
        };

        let unreachable = problems
            .iter()
            .any(|(_, kind)| *kind != ErrorKind::RemoteIo);
        let vacation = if unreachable {
            None
        } else {
            match self.read_vacation() {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("Cannot read vacation file for {}: {e}", self.user);
                    problems.push((download_problem(&e), e.kind()));
                    None
                }
            }
        };

        let mut form = FormDefaults::build(
            &self.config,
            &self.user,
            &forward.unwrap_or_default(),
            vacation.unwrap_or_default(),
            self.prefs.as_ref(),
        );
        form.problems = problems.into_iter().map(|(text, _)| text).collect();
        form
    }

    /// Remember the submitted address and aliases, then upload the vacation
    /// file, the emptied reply cache and the forward file.
    ///
    /// Each artifact is attempted on its own and reported in the returned
    /// [`InstallReport`]. After a connection or login failure the remaining
    /// artifacts are reported with the same error instead of connecting
    /// again. A configuration problem fails the whole install up front.
    pub fn install(&mut self, choices: &Choices) -> Result<InstallReport, TransportError> {
        let sender = self.sender();
        let plan = plan(&self.config, choices, sender.as_ref());
        self.remember(choices, &plan);

        self.files.endpoint()?;

        let mut uploads = Vec::new();
        if let Some(text) = plan.vacation_text {
            uploads.push((Artifact::VacationFile, &self.config.vacation_file, text));
        }
        if plan.reset_cache {
            uploads.push((Artifact::VacationCache, &self.config.vacation_cache, String::new()));
        }
        uploads.push((Artifact::ForwardFile, &self.config.forward_file, plan.forward_text));

        let mut blocked: Option<TransportError> = None;
        let mut outcomes = Vec::new();
        for (artifact, path, content) in uploads {
            let result = match &blocked {
                Some(err) => Err(err.clone()),
                None => self.files.upload(path, &content),
            };
            match &result {
                Ok(()) => info!("Installed {artifact} {path} for {}", self.user),
                Err(e) => {
                    warn!("Cannot install {artifact} {path} for {}: {e}", self.user);
                    if blocked.is_none() && e.kind() != ErrorKind::RemoteIo {
                        blocked = Some(e.clone());
                    }
                }
            }
            outcomes.push(ArtifactOutcome {
                artifact,
                path: path.clone(),
                result,
            });
        }

        Ok(InstallReport {
            summary: plan.summary,
            outcomes,
        })
    }

    /// Edit only the vacation message.
    ///
    /// With an empty subject and message nothing is written and the current
    /// message is returned; otherwise a vacation file without `From:` header
    /// is uploaded. The result has the configured defaults filled in.
    pub fn edit_vacation(
        &mut self,
        subject: &str,
        message: &str,
    ) -> Result<VacationMessage, TransportError> {
        let edited = if subject.is_empty() && message.is_empty() {
            self.read_vacation()?
        } else {
            let edited = VacationMessage {
                subject: subject.to_string(),
                body: message.to_string(),
            };
            let text = edited.render(None);
            self.files.upload(&self.config.vacation_file, &text)?;
            info!("Updated vacation message for {}", self.user);
            edited
        };
        Ok(edited.or_defaults(&self.config.default_subject, &self.config.default_message))
    }

    /// Close every open session.
    pub fn close(&mut self) {
        self.files.close();
    }

    fn sender(&self) -> Option<Sender> {
        if !self.config.vacation_from {
            return None;
        }
        let name = self.prefs.get(&self.user, PREF_FULL_NAME)?;
        let email = self.prefs.get(&self.user, PREF_EMAIL)?;
        Sender::new(&name, &email)
    }

    fn remember(&mut self, choices: &Choices, plan: &Plan) {
        let addr = choices.addr.trim();
        if addr.is_empty() {
            self.prefs.remove(&self.user, PREF_FORWARD);
        } else {
            self.prefs.set(&self.user, PREF_FORWARD, addr);
        }

        if plan.aliases.is_empty() {
            self.prefs.remove(&self.user, PREF_ALIASES);
        } else {
            self.prefs
                .set(&self.user, PREF_ALIASES, &plan.aliases.join(", "));
        }
        debug!("Remembered forward address and aliases for {}", self.user);
    }
}
