//! Command-line interface definition.

use std::path::PathBuf;

use autorespond_core::forward::KeepType;
use autorespond_core::Choices;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Manage a user's mail forwarding and vacation reply on a remote host.
///
/// The password comes from `AUTORESPOND_PASSWORD`, or from the webmail's
/// encrypted pair `AUTORESPOND_KEY` + `AUTORESPOND_PAD`.
#[derive(Parser, Debug)]
#[command(name = "autorespond")]
#[command(version)]
pub struct Cli {
    /// Site configuration (JSON).
    #[arg(long, short, value_name = "FILE")]
    pub config: PathBuf,

    /// Login name; defaults to `AUTORESPOND_USER`.
    #[arg(long, short)]
    pub user: Option<String>,

    /// Preference file remembering the last address and aliases.
    #[arg(long, value_name = "FILE")]
    pub prefs: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print what the options form would show, as JSON.
    Show,

    /// Print the files an install would write, without connecting.
    Preview(ChoiceArgs),

    /// Write the forward file, vacation file and reply cache.
    Apply(ChoiceArgs),

    /// Show the vacation message, or replace it when a subject or message is given.
    EditVacation(EditArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KeepArg {
    Filtered,
    Unfiltered,
}

impl From<KeepArg> for KeepType {
    fn from(arg: KeepArg) -> Self {
        match arg {
            KeepArg::Filtered => KeepType::Filtered,
            KeepArg::Unfiltered => KeepType::Unfiltered,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ChoiceArgs {
    /// Forward new mail to this address.
    #[arg(long, value_name = "ADDR")]
    pub forward: Option<String>,

    /// Enable the automatic reply.
    #[arg(long)]
    pub vacation: bool,

    #[arg(long, default_value = "")]
    pub subject: String,

    /// Reply body.
    #[arg(long, default_value = "", conflicts_with = "message_file")]
    pub message: String,

    /// Read the reply body from a file.
    #[arg(long, value_name = "FILE")]
    pub message_file: Option<PathBuf>,

    /// Other addresses the reply answers for, separated by commas or spaces.
    #[arg(long, default_value = "")]
    pub aliases: String,

    /// Forget who has already been answered.
    #[arg(long)]
    pub reset_cache: bool,

    /// Keep a local copy of new mail.
    #[arg(long, value_enum, value_name = "TYPE")]
    pub keep: Option<KeepArg>,

    /// Deliver into the trash mailbox.
    #[arg(long)]
    pub trash: bool,
}

impl ChoiceArgs {
    /// `message` is the already resolved reply body.
    pub fn to_choices(&self, message: String) -> Choices {
        Choices {
            forward: self.forward.is_some(),
            addr: self.forward.clone().unwrap_or_default(),
            vacation: self.vacation,
            subject: self.subject.clone(),
            message,
            aliases: self.aliases.clone(),
            reset_cache: self.reset_cache,
            keep: self.keep.is_some(),
            keeptype: self.keep.map(KeepType::from),
            trash: self.trash,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct EditArgs {
    #[arg(long, default_value = "")]
    pub subject: String,

    #[arg(long, default_value = "")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn apply_flags_become_choices() {
        let cli = Cli::parse_from([
            "autorespond",
            "--config",
            "site.json",
            "apply",
            "--forward",
            "boss@example.org",
            "--vacation",
            "--subject",
            "Away",
            "--aliases",
            "sue,bob",
            "--keep",
            "filtered",
        ]);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        let choices = args.to_choices("Back soon".into());
        assert!(choices.forward);
        assert_eq!(choices.addr, "boss@example.org");
        assert!(choices.vacation);
        assert_eq!(choices.keeptype, Some(KeepType::Filtered));
        assert!(choices.keep);
        assert!(!choices.trash);
        assert_eq!(choices.message, "Back soon");
    }

    #[test]
    fn no_flags_clear_everything() {
        let choices = ChoiceArgs::default().to_choices(String::new());
        assert_eq!(choices, Choices::default());
    }
}
