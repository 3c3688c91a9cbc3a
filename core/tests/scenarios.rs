//! End-to-end scenarios: read the form, submit choices, inspect the remote
//! files. Runs against the in-memory backend.

mod common;

use autorespond_core::forward::KeepType;
use autorespond_core::credential::StaticCredentials;
use autorespond_core::prefs::{JsonPreferenceStore, MemoryPreferenceStore, PreferenceStore};
use autorespond_core::reconcile::Artifact;
use autorespond_core::transport::memory::{MemoryFs, Op};
use autorespond_core::{AutorespondConfig, Choices, ErrorKind, TransportError};
use autorespond_core::Autoresponder;
use common::{autoresponder, memory_config, prefs_with_identity, USER};
use tempfile::TempDir;

#[test]
fn keep_by_default_then_enable_vacation() {
    let fs = MemoryFs::new();
    fs.insert_file(".forward", "");
    let config = AutorespondConfig {
        keep_by_default: true,
        vacation_from: false,
        ..memory_config()
    };
    let mut ar = autoresponder(&fs, &config, MemoryPreferenceStore::new());

    let form = ar.load_form();
    assert!(form.problems.is_empty(), "{:?}", form.problems);
    assert!(form.keep);
    assert_eq!(form.keeptype, Some(KeepType::Unfiltered));
    assert!(!form.forward);
    assert!(!form.vacation);

    let report = ar
        .install(&Choices {
            vacation: true,
            subject: "Away".into(),
            message: "Back soon\n".into(),
            ..Default::default()
        })
        .unwrap();
    assert!(report.is_success(), "{:?}", report.problems());

    assert_eq!(
        fs.file(".vacation.msg").as_deref(),
        Some("Subject: Away\n\nBack soon\n")
    );
    assert_eq!(
        fs.file(".forward").as_deref(),
        Some("\"|/usr/bin/vacation jdoe\"\n")
    );
    assert_eq!(fs.file_mode(".forward"), Some(0o600));
}

#[test]
fn disabled_forward_and_trash_prefill_the_form() {
    let fs = MemoryFs::new();
    fs.insert_file(".forward", "# forward: old@x.com\n./Trash\n");
    let mut ar = autoresponder(&fs, &memory_config(), MemoryPreferenceStore::new());

    let form = ar.load_form();
    assert!(form.trash);
    assert!(!form.keep);
    assert!(!form.forward);
    assert_eq!(form.addr, "old@x.com");
}

#[test]
fn absent_files_are_not_errors() {
    let fs = MemoryFs::new();
    let config = memory_config();
    let mut ar = autoresponder(&fs, &config, MemoryPreferenceStore::new());

    let form = ar.load_form();
    assert!(form.problems.is_empty());
    assert_eq!(form.subject, config.default_subject);
    assert_eq!(form.message, config.default_message);

    let report = ar.install(&Choices::from(&form)).unwrap();
    assert!(report.is_success());
    assert_eq!(
        report.summary,
        vec![
            "New mail will be kept here in your Inbox.",
            "No automatic reply will be sent."
        ]
    );
    // An empty forward file is removed, not written.
    assert!(fs.file(".forward").is_none());
    assert!(fs.log().is_empty());
}

#[test]
fn resubmitting_the_form_keeps_the_directives() {
    let fs = MemoryFs::new();
    fs.insert_file(
        ".forward",
        "# hand-written\n\"|/usr/bin/procmail\"\nboss@example.org, \"|/usr/bin/vacation -a sue -a bob jdoe\"\n./Trash\n",
    );
    fs.insert_file(".vacation.msg", "Subject: Gone\n\nfishing\n");
    let mut ar = autoresponder(&fs, &memory_config(), MemoryPreferenceStore::new());

    let before = ar.read_forward().unwrap();
    let form = ar.load_form();
    ar.install(&Choices::from(&form)).unwrap();
    let after = ar.read_forward().unwrap();

    assert_eq!(before, after);
    assert_eq!(
        fs.file(".forward").as_deref(),
        Some(
            "\"|/usr/bin/procmail\"\n\
             boss@example.org\n\
             \"|/usr/bin/vacation -a sue -a bob jdoe\"\n\
             ./Trash\n"
        )
    );
    assert_eq!(ar.read_vacation().unwrap().subject, "Gone");
}

#[test]
fn resubmitting_keeps_a_disabled_address_disabled() {
    let fs = MemoryFs::new();
    fs.insert_file(".forward", "# forward: old@x.com\nnew@x.com\n");
    let mut ar = autoresponder(&fs, &memory_config(), MemoryPreferenceStore::new());

    let before = ar.read_forward().unwrap();
    let form = ar.load_form();
    assert!(form.forward);
    assert_eq!(form.addr, "new@x.com");

    ar.install(&Choices::from(&form)).unwrap();
    let after = ar.read_forward().unwrap();
    assert_eq!(after.addresses, before.addresses);
    assert_eq!(fs.file(".forward").as_deref(), Some("new@x.com\n"));
}

#[test]
fn install_uses_one_session_and_remembers_choices() {
    let fs = MemoryFs::new();
    let mut ar = autoresponder(&fs, &memory_config(), prefs_with_identity());

    let report = ar
        .install(&Choices {
            forward: false,
            addr: "boss@example.org".into(),
            vacation: true,
            subject: "Away".into(),
            message: "Gone\r\nfishing".into(),
            aliases: "sue, bob".into(),
            reset_cache: true,
            ..Default::default()
        })
        .unwrap();
    assert!(report.is_success());
    assert_eq!(fs.connect_count(), 1);
    assert_eq!(
        fs.log(),
        vec!["put .vacation.msg", "put .forward"],
        "reply cache was absent, so nothing is deleted"
    );
    assert_eq!(
        fs.file(".vacation.msg").as_deref(),
        Some("From: Jane Doe <jdoe@example.org>\nSubject: Away\n\nGone\nfishing\n")
    );
    assert_eq!(
        fs.file(".forward").as_deref(),
        Some("\"|/usr/bin/vacation -a sue -a bob jdoe\"\n")
    );

    // The address was remembered even though forwarding is off.
    let form = ar.load_form();
    assert_eq!(form.addr, "boss@example.org");
    assert_eq!(form.aliases, "sue, bob");
    assert!(!form.forward);
}

#[test]
fn reset_cache_deletes_existing_cache() {
    let fs = MemoryFs::new();
    fs.insert_file(".vacation.db", "binary cache");
    let mut ar = autoresponder(&fs, &memory_config(), MemoryPreferenceStore::new());

    let report = ar
        .install(&Choices {
            reset_cache: true,
            ..Default::default()
        })
        .unwrap();
    assert!(report.outcome(Artifact::VacationCache).unwrap().is_success());
    assert!(fs.file(".vacation.db").is_none());
}

#[test]
fn failed_artifact_does_not_block_the_others() {
    let fs = MemoryFs::new();
    fs.fail(Op::Put, ".vacation.msg");
    let mut ar = autoresponder(&fs, &memory_config(), MemoryPreferenceStore::new());

    let report = ar
        .install(&Choices {
            vacation: true,
            subject: "Away".into(),
            ..Default::default()
        })
        .unwrap();
    assert!(!report.is_success());
    let vacation = report.outcome(Artifact::VacationFile).unwrap();
    assert!(matches!(vacation.result, Err(TransportError::Write { .. })));
    assert!(report.outcome(Artifact::ForwardFile).unwrap().is_success());
    assert_eq!(report.problems().len(), 1);
    assert!(report.problems()[0].contains("vacation file"));
}

#[test]
fn refused_login_is_tried_once() {
    let fs = MemoryFs::new();
    fs.reject_logins(true);
    let mut ar = autoresponder(&fs, &memory_config(), MemoryPreferenceStore::new());

    let report = ar
        .install(&Choices {
            vacation: true,
            reset_cache: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(report.outcomes.len(), 3);
    for outcome in &report.outcomes {
        let err = outcome.result.as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
    assert_eq!(fs.connect_count(), 1);

    let form = ar.load_form();
    assert_eq!(form.problems.len(), 1);
    assert!(form.problems[0].contains("cannot log in"));
}

#[test]
fn missing_host_fails_the_whole_install() {
    let fs = MemoryFs::new();
    let mut ar = autoresponder(&fs, &AutorespondConfig::default(), MemoryPreferenceStore::new());

    let err = ar.install(&Choices::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(fs.connect_count(), 0);
}

#[test]
fn stale_session_is_replaced_between_operations() {
    let fs = MemoryFs::new();
    let mut ar = autoresponder(&fs, &memory_config(), MemoryPreferenceStore::new());

    ar.load_form();
    fs.drop_connections();
    let report = ar.install(&Choices::default()).unwrap();
    assert!(report.is_success());
    assert_eq!(fs.connect_count(), 2);

    ar.close();
    assert_eq!(fs.close_count(), 2);
}

#[test]
fn files_in_subdirectories_get_private_parents() {
    let fs = MemoryFs::new();
    let config = AutorespondConfig {
        vacation_file: "mail/vacation/{user}.msg".into(),
        ..memory_config()
    };
    let mut ar = autoresponder(&fs, &config, MemoryPreferenceStore::new());

    // Reading below a missing directory is reported, not treated as absent.
    let form = ar.load_form();
    assert_eq!(form.problems.len(), 1);

    ar.install(&Choices {
        vacation: true,
        subject: "x".into(),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(fs.dir_mode("mail"), Some(0o700));
    assert_eq!(fs.dir_mode("mail/vacation"), Some(0o700));
    assert!(fs.file("mail/vacation/jdoe.msg").is_some());
}

#[test]
fn edit_vacation_only_touches_the_vacation_file() {
    let fs = MemoryFs::new();
    fs.insert_file(".forward", "\"|/usr/bin/vacation jdoe\"\n");
    let config = memory_config();
    let mut ar = autoresponder(&fs, &config, prefs_with_identity());

    let shown = ar.edit_vacation("", "").unwrap();
    assert_eq!(shown.subject, config.default_subject);
    assert!(fs.log().is_empty());

    let saved = ar.edit_vacation("Back Monday", "See you\r\n").unwrap();
    assert_eq!(saved.subject, "Back Monday");
    assert_eq!(
        fs.file(".vacation.msg").as_deref(),
        Some("Subject: Back Monday\n\nSee you\n")
    );
    assert_eq!(fs.log(), vec!["put .vacation.msg"]);
}

#[test]
fn submitted_address_and_aliases_survive_in_the_preference_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("prefs.json");
    let fs = MemoryFs::new();
    let config = memory_config();

    let mut ar = Autoresponder::new(
        &config,
        USER,
        Box::new(fs.factory()),
        Box::new(StaticCredentials::new(USER, "secret")),
        Box::new(JsonPreferenceStore::open(&path)),
    )
    .unwrap();
    ar.install(&Choices {
        addr: "  boss@example.org ".into(),
        aliases: "sue,bob  carol".into(),
        ..Default::default()
    })
    .unwrap();
    ar.close();

    let stored = JsonPreferenceStore::open(&path);
    assert_eq!(
        stored.get(USER, "autorespond_forward").as_deref(),
        Some("boss@example.org")
    );
    assert_eq!(
        stored.get(USER, "autorespond_aliases").as_deref(),
        Some("sue, bob, carol")
    );

    // Clearing both fields forgets them.
    let mut ar = Autoresponder::new(
        &config,
        USER,
        Box::new(fs.factory()),
        Box::new(StaticCredentials::new(USER, "secret")),
        Box::new(stored),
    )
    .unwrap();
    ar.install(&Choices::default()).unwrap();

    let stored = JsonPreferenceStore::open(&path);
    assert!(stored.get(USER, "autorespond_forward").is_none());
    assert!(stored.get(USER, "autorespond_aliases").is_none());
}
