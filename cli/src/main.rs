mod cli;

use anyhow::Context;
use autorespond_core::credential::{EnvCredentials, ENV_USER};
use autorespond_core::prefs::{JsonPreferenceStore, MemoryPreferenceStore, PreferenceStore};
use autorespond_core::reconcile::{plan, InstallReport};
use autorespond_core::{AutorespondConfig, Autoresponder};
use clap::Parser;
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{ChoiceArgs, Cli, Command};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON results.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!("autorespond {} starting", VERSION);

    let config = AutorespondConfig::load_from(&cli.config)?;
    let user = match cli.user.clone() {
        Some(user) => user,
        None => std::env::var(ENV_USER)
            .with_context(|| format!("no --user given and {ENV_USER} is not set"))?,
    };

    let prefs: Box<dyn PreferenceStore> = match &cli.prefs {
        Some(path) => Box::new(JsonPreferenceStore::open(path)),
        None => Box::new(MemoryPreferenceStore::new()),
    };

    if let Command::Preview(args) = &cli.command {
        let choices = args.to_choices(read_message(args)?);
        let expanded = config.for_user(&user);
        let planned = plan(&expanded, &choices, None);
        print_json(&json!({
            "forward_file": planned.forward_text,
            "vacation_file": planned.vacation_text,
            "reset_cache": planned.reset_cache,
            "summary": planned.summary,
        }))?;
        return Ok(());
    }

    config.validate()?;
    let mut autoresponder =
        Autoresponder::over_network(&config, &user, Box::new(EnvCredentials), prefs)?;

    let ok = match &cli.command {
        Command::Show => {
            let form = autoresponder.load_form();
            print_json(&serde_json::to_value(&form)?)?;
            form.problems.is_empty()
        }
        Command::Apply(args) => {
            let choices = args.to_choices(read_message(args)?);
            let report = autoresponder.install(&choices)?;
            print_json(&report_json(&report))?;
            info!(
                "Install for {user} finished with {} problem(s)",
                report.problems().len()
            );
            report.is_success()
        }
        Command::EditVacation(args) => {
            let message = autoresponder.edit_vacation(&args.subject, &args.message)?;
            print_json(&serde_json::to_value(&message)?)?;
            true
        }
        Command::Preview(_) => true,
    };
    autoresponder.close();

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn read_message(args: &ChoiceArgs) -> anyhow::Result<String> {
    match &args.message_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read message file {}", path.display())),
        None => Ok(args.message.clone()),
    }
}

fn report_json(report: &InstallReport) -> serde_json::Value {
    let outcomes: Vec<serde_json::Value> = report
        .outcomes
        .iter()
        .map(|outcome| {
            json!({
                "artifact": outcome.artifact,
                "path": outcome.path,
                "ok": outcome.is_success(),
                "problem": outcome.problem(),
            })
        })
        .collect();
    json!({
        "summary": report.summary,
        "outcomes": outcomes,
    })
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
