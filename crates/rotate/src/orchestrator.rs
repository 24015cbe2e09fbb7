//! Rotation orchestration
//!
//! The confirmation-gated state machine tying discovery, validation,
//! the per-target adapters, the change ledger, and the final report
//! together. Every mutating category sits behind two sequential
//! confirmations; declining either one cancels that category only and
//! returns to the menu. Whatever the run's fate, `finalize` renders a
//! best-effort report from the ledger accumulated so far.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{error, info, warn};

use crate::adapters::{AppUserAdapter, ControlPanelAdapter, DatabaseAdapter, DbRotation};
use crate::command::CommandRunner;
use crate::config::RotateConfig;
use crate::error::RotateError;
use crate::install::{self, Installation};
use crate::interrupt;
use crate::ledger::{ChangeLedger, TargetKind};
use crate::preflight;
use crate::report;

/// Interactive capability the orchestrator depends on. Implemented on
/// the console by the binary and by scripted fakes in tests.
pub trait Prompter {
    /// Yes/no gate. False is a decline, not an error.
    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Free-form input with an optional default.
    fn input(&mut self, question: &str, default: Option<&str>) -> Result<String>;
}

/// Run phases. Mostly bookkeeping for diagnostics, but `Done` also
/// makes `finalize` idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    LocatingInstallation,
    Validating,
    AwaitingSelection,
    RotatingApplicationUsers,
    RotatingControlPanel,
    RotatingDatabase,
    RotatingAll,
    ReportPending,
    Done,
}

pub struct Orchestrator<'a> {
    config: &'a RotateConfig,
    runner: &'a dyn CommandRunner,
    prompter: &'a mut dyn Prompter,
    state: State,
    installation: Option<Installation>,
    owner: Option<String>,
    ledger: ChangeLedger,
    report_path: Option<PathBuf>,
    interrupt: &'a AtomicBool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a RotateConfig,
        runner: &'a dyn CommandRunner,
        prompter: &'a mut dyn Prompter,
    ) -> Self {
        Self {
            config,
            runner,
            prompter,
            state: State::Idle,
            installation: None,
            owner: None,
            ledger: ChangeLedger::new(),
            report_path: None,
            interrupt: interrupt::flag(),
        }
    }

    /// Observe interruption from this flag instead of the process-wide
    /// one. Lets tests drive a wind-down without sending signals.
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = flag;
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn ledger(&self) -> &ChangeLedger {
        &self.ledger
    }

    /// The installation this run acts on, once located.
    pub fn installation(&self) -> Option<&Installation> {
        self.installation.as_ref()
    }

    /// Path of the notification artifact, once written.
    pub fn report_path(&self) -> Option<&Path> {
        self.report_path.as_deref()
    }

    /// Drive a full run: locate, validate, serve the menu until exit,
    /// then render the report. Discovery and prerequisite failures are
    /// fatal; the caller should still call [`finalize`] afterwards for
    /// the best-effort report.
    pub fn run(&mut self) -> Result<()> {
        self.state = State::LocatingInstallation;
        let installation = self.locate()?;
        println!("Using installation: {}", installation.root.display());
        self.installation = Some(installation);

        self.state = State::Validating;
        let installation = self.installation.clone().context("installation not set")?;
        let owner = preflight::validate(&installation, self.config, self.runner)?;
        println!("All system checks passed (site owner: {})", owner);
        self.owner = Some(owner);

        self.menu_loop()?;
        self.finalize()?;
        Ok(())
    }

    fn locate(&mut self) -> Result<Installation> {
        let matches = install::scan(&self.config.candidate_roots, &self.config.env_file);
        match matches.len() {
            0 => {
                println!("No installation auto-detected");
                loop {
                    let path = self
                        .prompter
                        .input("Enter the site root directory", None)?;
                    let path = path.trim();
                    if path.is_empty() {
                        return Err(RotateError::Discovery(
                            "no installation found and no path supplied".to_string(),
                        )
                        .into());
                    }
                    match install::from_manual_path(Path::new(path), &self.config.env_file) {
                        Ok(installation) => return Ok(installation),
                        Err(e) => println!("{}", e),
                    }
                }
            }
            1 => Ok(install::choose(&matches, 0, &self.config.env_file)?),
            n => {
                println!("Detected installations:");
                for (i, root) in matches.iter().enumerate() {
                    println!("{}. {}", i + 1, root.display());
                }
                loop {
                    let choice = self
                        .prompter
                        .input(&format!("Select installation (1-{})", n), Some("1"))?;
                    match choice.trim().parse::<usize>() {
                        Ok(index) if (1..=n).contains(&index) => {
                            return Ok(install::choose(
                                &matches,
                                index - 1,
                                &self.config.env_file,
                            )?);
                        }
                        _ => println!("Please enter a number between 1 and {}", n),
                    }
                }
            }
        }
    }

    fn menu_loop(&mut self) -> Result<()> {
        loop {
            if self.interrupted() {
                warn!("interrupted; winding down");
                println!();
                println!("Interrupted; reporting the work completed so far");
                return Ok(());
            }
            self.state = State::AwaitingSelection;
            println!();
            println!("{}", "=".repeat(50));
            println!("Credential Rotation Menu");
            println!("{}", "=".repeat(50));
            println!("1. Rotate application admin passwords");
            println!("2. Rotate control panel password");
            println!("3. Rotate database password");
            println!("4. Rotate ALL credentials");
            println!("5. Show current configuration");
            println!("6. Exit");

            let choice = self.prompter.input("Select option", Some("1"))?;
            match choice.trim() {
                "1" => self.rotate_application_users()?,
                "2" => self.rotate_control_panel()?,
                "3" => self.rotate_database()?,
                "4" => self.rotate_all()?,
                "5" => self.show_configuration(),
                "6" => {
                    println!("Exiting...");
                    return Ok(());
                }
                other => println!("Invalid option: {}", other),
            }
        }
    }

    fn rotate_application_users(&mut self) -> Result<()> {
        self.state = State::RotatingApplicationUsers;
        let users = self.config.app_users.clone();
        if users.is_empty() {
            println!("No application admin users configured");
            return Ok(());
        }
        for user in &users {
            self.ledger.register(TargetKind::ApplicationUser, user);
        }

        println!("The following users will be updated:");
        for user in &users {
            println!("  - {}", user);
        }
        if !self
            .prompter
            .confirm("Rotate passwords for these application admin users?")?
        {
            println!("Application password rotation cancelled");
            return Ok(());
        }
        if !self
            .prompter
            .confirm("CONFIRM: change these passwords now?")?
        {
            println!("Application password rotation cancelled");
            return Ok(());
        }

        let installation = self.installation.clone().context("installation not set")?;
        let owner = self.owner.clone().context("owner not resolved")?;
        let adapter = AppUserAdapter {
            runner: self.runner,
            root: &installation.root,
            owner: &owner,
            helper_tool: &self.config.helper_tool,
            secret_length: self.config.secret_length,
        };

        let mut updated = 0;
        for user in &users {
            if self.interrupted() {
                println!("Interrupted; stopping before {}", user);
                break;
            }
            println!("Updating password for {}...", user);
            match adapter.rotate(user) {
                Ok(secret) => {
                    println!("  {}: {}", user, secret.as_str());
                    self.ledger
                        .record_success(TargetKind::ApplicationUser, user, secret, false);
                    updated += 1;
                }
                Err(e) => {
                    self.fail_entry(TargetKind::ApplicationUser, user, e)?;
                }
            }
        }
        println!("Summary: {}/{} users updated", updated, users.len());
        Ok(())
    }

    fn rotate_control_panel(&mut self) -> Result<()> {
        self.state = State::RotatingControlPanel;
        let user = self.config.panel_user.clone();
        self.ledger.register(TargetKind::ControlPanel, &user);

        println!("Domain: {}", self.config.panel_domain);
        println!("User: {}", user);
        if !self
            .prompter
            .confirm(&format!("Rotate the control panel password for {}?", user))?
        {
            println!("Control panel password rotation cancelled");
            return Ok(());
        }
        if !self
            .prompter
            .confirm("CONFIRM: change the control panel password now?")?
        {
            println!("Control panel password rotation cancelled");
            return Ok(());
        }

        let adapter = ControlPanelAdapter {
            runner: self.runner,
            domain: &self.config.panel_domain,
            secret_length: self.config.secret_length,
        };
        match adapter.rotate(&user) {
            Ok(secret) => {
                println!("Control panel password updated for {}", user);
                println!("  {}: {}", user, secret.as_str());
                self.ledger
                    .record_success(TargetKind::ControlPanel, &user, secret, false);
            }
            Err(e) => {
                self.fail_entry(TargetKind::ControlPanel, &user, e)?;
            }
        }
        Ok(())
    }

    fn rotate_database(&mut self) -> Result<()> {
        self.state = State::RotatingDatabase;
        let user = self.config.db_user.clone();
        self.ledger.register(TargetKind::Database, &user);

        let installation = self.installation.clone().context("installation not set")?;
        println!("Database user: {}@{}", user, self.config.db_host);
        println!("Site config file: {}", installation.env_file.display());
        if !self
            .prompter
            .confirm(&format!("Rotate the database password for {}?", user))?
        {
            println!("Database password rotation cancelled");
            return Ok(());
        }
        if !self
            .prompter
            .confirm("CONFIRM: update the database password and site config file now?")?
        {
            println!("Database password rotation cancelled");
            return Ok(());
        }

        let adapter = DatabaseAdapter {
            runner: self.runner,
            db_user: &user,
            db_host: &self.config.db_host,
            env_file: &installation.env_file,
            secret_length: self.config.secret_length,
        };
        match adapter.rotate() {
            Ok(DbRotation::Rotated(secret)) => {
                println!("Database password updated for {}", user);
                println!("  {}: {}", user, secret.as_str());
                println!("Site config file updated");
                self.ledger
                    .record_success(TargetKind::Database, &user, secret, false);
            }
            Ok(DbRotation::RotatedConfigStale { secret, warning }) => {
                println!("Database password updated for {}", user);
                println!("  {}: {}", user, secret.as_str());
                println!("WARNING: {}", warning);
                println!(
                    "The database password was changed but {} was not updated; reconcile manually",
                    installation.env_file.display()
                );
                self.ledger
                    .record_success(TargetKind::Database, &user, secret, true);
            }
            Err(e) => {
                self.fail_entry(TargetKind::Database, &user, e)?;
            }
        }
        Ok(())
    }

    /// Chain all three categories. Each keeps its own confirmations, so
    /// declining one category never blocks the others, and whatever
    /// succeeded earlier in the chain stays in the ledger.
    fn rotate_all(&mut self) -> Result<()> {
        self.state = State::RotatingAll;
        println!("This will rotate:");
        println!("  - all application admin users");
        println!("  - the control panel account");
        println!("  - the database user (and the site config file)");
        if !self.prompter.confirm("Rotate ALL credentials?")? {
            println!("All rotations cancelled");
            return Ok(());
        }
        if !self
            .prompter
            .confirm("FINAL WARNING: this changes multiple system credentials. Continue?")?
        {
            println!("All rotations cancelled");
            return Ok(());
        }

        self.rotate_application_users()?;
        if self.interrupted() {
            println!("Interrupted; skipping the remaining categories");
            return Ok(());
        }
        self.rotate_control_panel()?;
        if self.interrupted() {
            println!("Interrupted; skipping the remaining categories");
            return Ok(());
        }
        self.rotate_database()?;
        println!("All rotations completed");
        Ok(())
    }

    fn show_configuration(&self) {
        println!("Current configuration:");
        if let Some(installation) = &self.installation {
            println!("  Site root: {}", installation.root.display());
            println!("  Config file: {}", installation.env_file.display());
        }
        if let Some(owner) = &self.owner {
            println!("  Site owner: {}", owner);
        }
        println!("  App users: {}", self.config.app_users.join(", "));
        println!("  Panel domain: {}", self.config.panel_domain);
        println!("  Panel user: {}", self.config.panel_user);
        println!(
            "  Database user: {}@{}",
            self.config.db_user, self.config.db_host
        );
        println!("  Scratch dir: {}", self.config.scratch_dir.display());
    }

    /// Record a local failure, unless the error is one that must abort
    /// the whole run (a lost audit entry, or a misconfigured secret
    /// length that would fail every identity the same way).
    fn fail_entry(
        &mut self,
        kind: TargetKind,
        identity: &str,
        error: RotateError,
    ) -> Result<()> {
        match error {
            e @ (RotateError::RunLog(_) | RotateError::InvalidArgument(_)) => Err(e.into()),
            e => {
                error!("{}", e);
                println!("FAILED: {}", e);
                self.ledger.record_failure(kind, identity);
                Ok(())
            }
        }
    }

    /// Render the notification from whatever the ledger holds, write it
    /// to the scratch location, and echo it. Idempotent; safe to call
    /// after a failed run for a best-effort report of partial work.
    pub fn finalize(&mut self) -> Result<Option<PathBuf>> {
        if self.state == State::Done {
            return Ok(self.report_path.clone());
        }
        self.state = State::ReportPending;

        match report::build(&self.ledger) {
            None => {
                println!("No credentials were changed.");
            }
            Some(text) => {
                let path = self.config.scratch_dir.join(format!(
                    "credential_report_{}.txt",
                    Local::now().format("%Y%m%d_%H%M%S")
                ));
                fs::write(&path, &text)
                    .with_context(|| format!("Failed to write report: {}", path.display()))?;
                println!();
                print!("{}", text);
                println!("Report written to {}", path.display());
                info!(report = %path.display(), "notification written");
                self.report_path = Some(path);
            }
        }

        self.state = State::Done;
        Ok(self.report_path.clone())
    }
}
