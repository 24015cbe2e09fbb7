//! End-to-end rotation scenarios driven by scripted command and prompt
//! fakes. Installations live in per-test temp directories; no real
//! credentials are touched.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::Result;
use rotate::adapters::APP_SUCCESS_MARKER;
use rotate::command::{CommandRunner, Invocation, RunOutcome};
use rotate::config::RotateConfig;
use rotate::error::RotateError;
use rotate::install;
use rotate::ledger::{Outcome, TargetKind};
use rotate::orchestrator::{Orchestrator, Prompter, State};
use rotate::preflight;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

const ENV_PHP: &str = concat!(
    "<?php\nreturn [\n    'db' => [\n        'connection' => [\n",
    "            'password' => 'old-secret',\n",
    "        ],\n    ],\n];\n"
);

/// A fresh scratch directory for one test.
fn temp_dir(name: &str) -> PathBuf {
    let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = env::temp_dir().join(format!(
        "rotate_scenario_{}_{}_{}",
        std::process::id(),
        name,
        counter
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Create a site root under `base`, optionally with the config file and
/// the helper tool present.
fn site_root(base: &Path, name: &str, with_env: bool, with_helper: bool) -> PathBuf {
    let root = base.join(name);
    fs::create_dir_all(root.join("app/etc")).unwrap();
    if with_env {
        fs::write(root.join("app/etc/env.php"), ENV_PHP).unwrap();
    }
    if with_helper {
        fs::write(root.join("n98-magerun2.phar"), "stub").unwrap();
    }
    root
}

fn test_config(scratch: &Path, candidates: Vec<PathBuf>) -> RotateConfig {
    RotateConfig {
        app_users: vec!["alice".to_string(), "bob".to_string()],
        candidate_roots: candidates,
        scratch_dir: scratch.to_path_buf(),
        ..RotateConfig::default()
    }
}

/// Pops one scripted outcome per command; the expectation string must
/// appear in the rendered invocation.
struct ScriptRunner {
    script: RefCell<VecDeque<(&'static str, RunOutcome)>>,
    seen: RefCell<Vec<String>>,
}

impl ScriptRunner {
    fn new(script: Vec<(&'static str, RunOutcome)>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    fn assert_exhausted(&self) {
        assert!(
            self.script.borrow().is_empty(),
            "unused scripted outcomes remain"
        );
    }
}

impl CommandRunner for ScriptRunner {
    fn run(&self, invocation: &Invocation) -> Result<RunOutcome, RotateError> {
        let rendered = invocation.to_string();
        self.seen.borrow_mut().push(rendered.clone());
        let (expected, outcome) = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command: {}", rendered));
        assert!(
            rendered.contains(expected),
            "expected command containing {:?}, got {:?}",
            expected,
            rendered
        );
        Ok(outcome)
    }
}

/// Answers prompts from a fixed script. Confirms take "y"/"n"; inputs
/// take the literal answer.
struct ScriptPrompter {
    answers: VecDeque<String>,
}

impl ScriptPrompter {
    fn new(answers: Vec<&str>) -> Self {
        Self {
            answers: answers.into_iter().map(String::from).collect(),
        }
    }
}

impl Prompter for ScriptPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self
            .answers
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected confirm: {}", question));
        Ok(answer == "y")
    }

    fn input(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        let answer = self
            .answers
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected input: {}", question));
        if answer.is_empty() {
            return Ok(default.unwrap_or("").to_string());
        }
        Ok(answer.to_string())
    }
}

fn probe_ok() -> (&'static str, RunOutcome) {
    ("--version", RunOutcome::ok("n98-magerun2 version 7.0.0"))
}

// Scenario A: three candidates, only the second holds the config file,
// so the locator selects it without any manual selection prompt.
#[test]
fn test_locator_auto_selects_single_match() {
    let base = temp_dir("scenario_a");
    let first = site_root(&base, "first", false, false);
    let second = site_root(&base, "second", true, true);
    let third = site_root(&base, "third", false, false);
    let config = test_config(&base, vec![first, second.clone(), third]);

    let runner = ScriptRunner::new(vec![probe_ok()]);
    // Only menu interaction: exit. No selection prompt may occur.
    let mut prompter = ScriptPrompter::new(vec!["6"]);
    let mut orchestrator = Orchestrator::new(&config, &runner, &mut prompter);
    orchestrator.run().unwrap();

    assert_eq!(
        orchestrator.installation().unwrap().root,
        second,
        "the one matching candidate is selected"
    );
    assert_eq!(orchestrator.state(), State::Done);
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// Scenario B: helper tool absent; the validator downloads it, makes it
// executable, re-probes, and passes.
#[test]
fn test_validator_downloads_missing_helper() {
    let base = temp_dir("scenario_b");
    let root = site_root(&base, "site", true, false);
    let config = test_config(&base, vec![root.clone()]);
    let installation = install::from_manual_path(&root, &config.env_file).unwrap();

    let runner = ScriptRunner::new(vec![
        ("curl", RunOutcome::ok("")),
        ("chmod", RunOutcome::ok("")),
        probe_ok(),
    ]);
    let owner = preflight::validate(&installation, &config, &runner).unwrap();

    assert!(!owner.is_empty());
    let seen = runner.seen.borrow();
    assert!(seen[0].contains(&config.helper_url));
    assert!(seen[1].starts_with("chmod") && seen[1].contains("+x"));
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// The remediation is bounded: when the re-probe after a download still
// fails, the validator gives up instead of downloading again.
#[test]
fn test_validator_remediation_is_bounded() {
    let base = temp_dir("bounded");
    let root = site_root(&base, "site", true, true);
    let config = test_config(&base, vec![root.clone()]);
    let installation = install::from_manual_path(&root, &config.env_file).unwrap();

    let runner = ScriptRunner::new(vec![
        ("--version", RunOutcome::failed("not a phar")),
        ("curl", RunOutcome::ok("")),
        ("chmod", RunOutcome::ok("")),
        ("--version", RunOutcome::failed("still not a phar")),
    ]);
    let err = preflight::validate(&installation, &config, &runner).unwrap_err();
    assert!(matches!(err, RotateError::Prerequisite(_)));
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// Scenario C: the first admin user's change exits 0 but without the
// success marker, so it is a failure; the second user is still
// attempted and succeeds, and only the success is reported.
#[test]
fn test_app_rotation_marker_failure_does_not_stop_the_loop() {
    let base = temp_dir("scenario_c");
    let root = site_root(&base, "site", true, true);
    let config = test_config(&base, vec![root]);

    let runner = ScriptRunner::new(vec![
        probe_ok(),
        ("alice", RunOutcome::ok("Something unexpected happened")),
        ("bob", RunOutcome::ok(APP_SUCCESS_MARKER)),
    ]);
    let mut prompter = ScriptPrompter::new(vec!["1", "y", "y", "6"]);
    let mut orchestrator = Orchestrator::new(&config, &runner, &mut prompter);
    orchestrator.run().unwrap();

    assert_eq!(
        orchestrator
            .ledger()
            .outcome(TargetKind::ApplicationUser, "alice"),
        Some(&Outcome::Failed)
    );
    assert!(matches!(
        orchestrator
            .ledger()
            .outcome(TargetKind::ApplicationUser, "bob"),
        Some(&Outcome::Succeeded { .. })
    ));

    let report = fs::read_to_string(orchestrator.report_path().unwrap()).unwrap();
    assert!(report.contains("bob: "));
    assert!(!report.contains("alice"));
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// Scenario D: the database change succeeds but the config file rewrite
// cannot (no password field present), so the ledger records a partial
// success and the run carries on to a report with a warning.
#[test]
fn test_database_partial_failure_is_recorded_and_reported() {
    let base = temp_dir("scenario_d");
    let root = site_root(&base, "site", false, true);
    // Config file exists but holds no credential field, so the rewrite
    // precondition fails after the database step succeeds.
    fs::write(root.join("app/etc/env.php"), "<?php return [];\n").unwrap();
    let config = test_config(&base, vec![root]);

    let runner = ScriptRunner::new(vec![
        probe_ok(),
        ("ALTER USER", RunOutcome::ok("")),
    ]);
    let mut prompter = ScriptPrompter::new(vec!["3", "y", "y", "6"]);
    let mut orchestrator = Orchestrator::new(&config, &runner, &mut prompter);
    orchestrator.run().unwrap();

    match orchestrator
        .ledger()
        .outcome(TargetKind::Database, &config.db_user)
    {
        Some(Outcome::Succeeded { config_stale, .. }) => assert!(*config_stale),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let report = fs::read_to_string(orchestrator.report_path().unwrap()).unwrap();
    assert!(report.contains("--- Database ---"));
    assert!(report.contains("config file was NOT updated"));
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// Declining either confirmation leaves the category not-attempted and
// the other categories untouched.
#[test]
fn test_declined_confirmations_leave_ledger_untouched() {
    let base = temp_dir("decline");
    let root = site_root(&base, "site", true, true);
    let config = test_config(&base, vec![root]);

    let runner = ScriptRunner::new(vec![probe_ok()]);
    // Category 1: decline the first gate. Category 2: accept the first,
    // decline the final gate. Then exit.
    let mut prompter = ScriptPrompter::new(vec!["1", "n", "2", "y", "n", "6"]);
    let mut orchestrator = Orchestrator::new(&config, &runner, &mut prompter);
    orchestrator.run().unwrap();

    for user in &config.app_users {
        assert_eq!(
            orchestrator
                .ledger()
                .outcome(TargetKind::ApplicationUser, user),
            Some(&Outcome::NotAttempted)
        );
    }
    assert_eq!(
        orchestrator
            .ledger()
            .outcome(TargetKind::ControlPanel, &config.panel_user),
        Some(&Outcome::NotAttempted)
    );
    assert_eq!(
        orchestrator.ledger().outcome(TargetKind::Database, &config.db_user),
        None,
        "an unvisited category has no ledger entries at all"
    );
    assert!(orchestrator.report_path().is_none(), "nothing to report");
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// Rotate-all chains the three categories with independent gates: a
// decline in the middle skips that category only, and earlier successes
// are still reported.
#[test]
fn test_rotate_all_with_mid_chain_decline() {
    let base = temp_dir("rotate_all");
    let root = site_root(&base, "site", true, true);
    let config = test_config(&base, vec![root]);

    let runner = ScriptRunner::new(vec![
        probe_ok(),
        ("alice", RunOutcome::ok(APP_SUCCESS_MARKER)),
        ("bob", RunOutcome::ok(APP_SUCCESS_MARKER)),
        ("ALTER USER", RunOutcome::ok("")),
    ]);
    // Outer double gate, app category y/y, panel category declined at
    // its first gate, database y/y, exit.
    let mut prompter = ScriptPrompter::new(vec![
        "4", "y", "y", // outer gates
        "y", "y", // application users
        "n", // control panel declined
        "y", "y", // database
        "6",
    ]);
    let mut orchestrator = Orchestrator::new(&config, &runner, &mut prompter);
    orchestrator.run().unwrap();

    assert!(matches!(
        orchestrator
            .ledger()
            .outcome(TargetKind::ApplicationUser, "alice"),
        Some(&Outcome::Succeeded { .. })
    ));
    assert_eq!(
        orchestrator
            .ledger()
            .outcome(TargetKind::ControlPanel, &config.panel_user),
        Some(&Outcome::NotAttempted)
    );
    assert!(matches!(
        orchestrator.ledger().outcome(TargetKind::Database, &config.db_user),
        Some(&Outcome::Succeeded { config_stale: false, .. })
    ));

    let report = fs::read_to_string(orchestrator.report_path().unwrap()).unwrap();
    assert!(report.contains("--- Application admin users ---"));
    assert!(report.contains("--- Database ---"));
    assert!(!report.contains("--- Control panel ---"));
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// Several candidates hold the config file: the locator lists them and
// asks for a 1-based index, retrying on an out-of-range answer.
#[test]
fn test_ambiguous_match_requires_index_selection() {
    let base = temp_dir("ambiguous");
    let first = site_root(&base, "first", true, true);
    let second = site_root(&base, "second", true, true);
    let config = test_config(&base, vec![first, second.clone()]);

    let runner = ScriptRunner::new(vec![probe_ok()]);
    // First answer is out of range; the retry picks the second match.
    let mut prompter = ScriptPrompter::new(vec!["9", "2", "6"]);
    let mut orchestrator = Orchestrator::new(&config, &runner, &mut prompter);
    orchestrator.run().unwrap();

    assert_eq!(orchestrator.installation().unwrap().root, second);
    assert_eq!(orchestrator.state(), State::Done);
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// An empty answer at the selection prompt takes the default, the first
// listed match.
#[test]
fn test_ambiguous_match_defaults_to_first() {
    let base = temp_dir("ambiguous_default");
    let first = site_root(&base, "first", true, true);
    let second = site_root(&base, "second", true, true);
    let config = test_config(&base, vec![first.clone(), second]);

    let runner = ScriptRunner::new(vec![probe_ok()]);
    let mut prompter = ScriptPrompter::new(vec!["", "6"]);
    let mut orchestrator = Orchestrator::new(&config, &runner, &mut prompter);
    orchestrator.run().unwrap();

    assert_eq!(orchestrator.installation().unwrap().root, first);
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

/// Delegates to a [`ScriptRunner`] and raises the interruption flag
/// after the command whose rendering contains `trigger`, as if the
/// operator pressed Ctrl-C while that command was finishing.
struct InterruptAfter<'f> {
    inner: ScriptRunner,
    trigger: &'static str,
    flag: &'f AtomicBool,
}

impl CommandRunner for InterruptAfter<'_> {
    fn run(&self, invocation: &Invocation) -> Result<RunOutcome, RotateError> {
        let outcome = self.inner.run(invocation)?;
        if invocation.to_string().contains(self.trigger) {
            self.flag.store(true, Ordering::SeqCst);
        }
        Ok(outcome)
    }
}

// An interruption mid rotate-all stops before the next category and
// still produces a report of the credentials already changed.
#[test]
fn test_interruption_mid_chain_still_reports() {
    let base = temp_dir("interrupted");
    let root = site_root(&base, "site", true, true);
    let config = test_config(&base, vec![root]);

    let flag = AtomicBool::new(false);
    let runner = InterruptAfter {
        inner: ScriptRunner::new(vec![
            probe_ok(),
            ("alice", RunOutcome::ok(APP_SUCCESS_MARKER)),
            ("bob", RunOutcome::ok(APP_SUCCESS_MARKER)),
        ]),
        trigger: "bob",
        flag: &flag,
    };
    // Outer gates plus the application gates. The interruption lands
    // after the last application user, so the control-panel and
    // database categories are never offered and no further prompts are
    // scripted; a stray prompt would panic the fake.
    let mut prompter = ScriptPrompter::new(vec!["4", "y", "y", "y", "y"]);
    let mut orchestrator =
        Orchestrator::new(&config, &runner, &mut prompter).with_interrupt(&flag);
    orchestrator.run().unwrap();

    assert_eq!(orchestrator.state(), State::Done);
    assert!(matches!(
        orchestrator
            .ledger()
            .outcome(TargetKind::ApplicationUser, "bob"),
        Some(&Outcome::Succeeded { .. })
    ));
    assert_eq!(
        orchestrator
            .ledger()
            .outcome(TargetKind::ControlPanel, &config.panel_user),
        None,
        "the chain stopped before the control panel"
    );
    assert_eq!(
        orchestrator.ledger().outcome(TargetKind::Database, &config.db_user),
        None
    );

    let report = fs::read_to_string(orchestrator.report_path().unwrap()).unwrap();
    assert!(report.contains("--- Application admin users ---"));
    assert!(report.contains("alice: "));
    assert!(report.contains("bob: "));
    assert!(!report.contains("--- Database ---"));
    runner.inner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// An interruption while the menu is idle winds down through the normal
// report path; with nothing changed there is no report to write.
#[test]
fn test_interruption_at_menu_finishes_without_report() {
    let base = temp_dir("interrupted_menu");
    let root = site_root(&base, "site", true, true);
    let config = test_config(&base, vec![root]);

    let flag = AtomicBool::new(false);
    let runner = InterruptAfter {
        inner: ScriptRunner::new(vec![probe_ok()]),
        trigger: "--version",
        flag: &flag,
    };
    // No menu answers at all: the flag is raised during validation, so
    // the menu is never shown.
    let mut prompter = ScriptPrompter::new(vec![]);
    let mut orchestrator =
        Orchestrator::new(&config, &runner, &mut prompter).with_interrupt(&flag);
    orchestrator.run().unwrap();

    assert_eq!(orchestrator.state(), State::Done);
    assert!(orchestrator.report_path().is_none());
    runner.inner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}

// Zero candidates: the locator falls back to a manually supplied path.
#[test]
fn test_manual_path_fallback() {
    let base = temp_dir("manual");
    let root = site_root(&base, "site", true, true);
    let config = test_config(&base, vec![base.join("nowhere")]);

    let runner = ScriptRunner::new(vec![probe_ok()]);
    let root_str = root.to_string_lossy().into_owned();
    let mut prompter = ScriptPrompter::new(vec![root_str.as_str(), "6"]);
    let mut orchestrator = Orchestrator::new(&config, &runner, &mut prompter);
    orchestrator.run().unwrap();

    assert_eq!(orchestrator.installation().unwrap().root, root);
    runner.assert_exhausted();
    let _ = fs::remove_dir_all(&base);
}
