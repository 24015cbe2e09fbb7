//! rotate - Credential rotation CLI for a deployed site
//!
//! Rotates application admin, control-panel, and database credentials
//! for one site installation, then writes a consolidated notification.

use anyhow::{bail, Result};
use clap::Parser;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rotate::command::{RunLog, SystemRunner};
use rotate::config::RotateConfig;
use rotate::interrupt;
use rotate::orchestrator::{Orchestrator, Prompter};

#[derive(Parser)]
#[command(name = "rotate")]
#[command(about = "Confirmation-gated credential rotation for a deployed site")]
#[command(version)]
#[command(after_help = r#"WHAT IT ROTATES:
    Application admin accounts (via the site's admin helper tool),
    the hosting control-panel account, and the database user. The new
    database password is propagated into the site's config file, with a
    timestamped backup taken first.

SAFETY:
    Every mutating step requires two explicit confirmations. Declining
    either one cancels that category only. Every external command is
    recorded in an append-only run log under the scratch directory.

CONFIGURATION:
    Site users, domain, database account, candidate roots, and scratch
    locations come from a JSON config file
    (default: ~/.config/rotate/config.json; built-in defaults apply
    when absent).

EXAMPLES:
    rotate                          # auto-detect the installation
    rotate --root /home/site/public_html
    rotate --config ./shop.json --length 24

OUTPUT:
    A plain-text credential notification in the scratch directory,
    listing only what actually changed. Failures are shown during the
    run and never appear in the notification.
"#)]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip auto-detection and use this site root
    #[arg(long)]
    root: Option<PathBuf>,

    /// Length of generated secrets
    #[arg(long)]
    length: Option<usize>,
}

/// Console implementation of the orchestrator's prompting capability.
struct ConsolePrompter;

/// Read one line from stdin, byte by byte. `BufRead::read_line` retries
/// silently on EINTR, which would leave a SIGINT unnoticed until the
/// next keypress; reading through `Read::read` surfaces the
/// interruption so a blocked prompt aborts immediately.
fn read_prompt_line() -> Result<String> {
    let mut stdin = std::io::stdin();
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stdin.read(&mut byte) {
            Ok(0) => {
                if line.is_empty() {
                    bail!("input closed");
                }
                break;
            }
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                line.push(byte[0]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                if interrupt::is_requested() {
                    bail!("interrupted at prompt");
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(String::from_utf8_lossy(&line).trim().to_string())
}

impl Prompter for ConsolePrompter {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        loop {
            print!("{} (y/n): ", question);
            std::io::stdout().flush()?;
            match read_prompt_line()?.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => println!("Please answer with 'y' or 'n'"),
            }
        }
    }

    fn input(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(d) => print!("{} [{}]: ", question, d),
            None => print!("{}: ", question),
        }
        std::io::stdout().flush()?;
        let answer = read_prompt_line()?;
        if answer.is_empty() {
            return Ok(default.unwrap_or("").to_string());
        }
        Ok(answer)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    interrupt::install_sigint_handler();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Assuming the site owner's identity (su) needs root; refuse early
    // rather than failing halfway through a rotation.
    if unsafe { libc::geteuid() } != 0 {
        bail!("rotate must run as root so it can act as the site owner");
    }

    let mut config = RotateConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config = config.with_root(root);
    }
    if let Some(length) = cli.length {
        config.secret_length = length;
    }

    let run_log = RunLog::create(&config.scratch_dir)?;
    println!("Site Credential Rotation");
    println!("========================");
    println!("Started: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("Run log: {}", run_log.path().display());
    println!();

    let runner = SystemRunner::new(run_log);
    let mut prompter = ConsolePrompter;
    let mut orchestrator = Orchestrator::new(&config, &runner, &mut prompter);

    match orchestrator.run() {
        Ok(()) => {
            if interrupt::is_requested() {
                println!("Interrupted by user");
            }
            Ok(())
        }
        Err(e) => {
            // Whatever already changed still gets reported so the
            // operator can reconcile.
            let _ = orchestrator.finalize();
            if interrupt::is_requested() {
                println!("Interrupted by user");
                std::process::exit(130);
            }
            Err(e)
        }
    }
}
