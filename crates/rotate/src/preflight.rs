//! Prerequisite checks
//!
//! Validates a located installation before any rotation is offered:
//! root present, config file present, owning account derivable, admin
//! helper tool answering its version probe when run as the owner. A
//! missing or broken helper gets exactly one remediation cycle
//! (Missing -> Downloading -> Probing); a second failure is final.

use tracing::{info, warn};

use crate::command::{CommandRunner, Invocation, RunOutcome, ShellLineBuilder};
use crate::config::RotateConfig;
use crate::error::RotateError;
use crate::install::{self, Installation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HelperState {
    Probing,
    Missing,
    Downloading,
}

/// Run all prerequisite checks in order, short-circuiting on the first
/// failure. Returns the owning account name on success.
pub fn validate(
    installation: &Installation,
    config: &RotateConfig,
    runner: &dyn CommandRunner,
) -> Result<String, RotateError> {
    if !installation.root.is_dir() {
        return Err(RotateError::Prerequisite(format!(
            "site root not found: {}",
            installation.root.display()
        )));
    }
    info!(root = %installation.root.display(), "site root exists");

    if !installation.env_file.is_file() {
        return Err(RotateError::Prerequisite(format!(
            "site config file not found: {}",
            installation.env_file.display()
        )));
    }
    info!(env_file = %installation.env_file.display(), "site config file exists");

    let owner = install::owner_of(&installation.root).ok_or_else(|| {
        RotateError::Prerequisite(format!(
            "cannot determine owning account from path: {}",
            installation.root.display()
        ))
    })?;
    info!(owner = %owner, "site owner derived");

    ensure_helper_tool(installation, config, &owner, runner)?;
    info!(helper = %config.helper_tool, "admin helper tool is working");

    Ok(owner)
}

/// Probe the helper tool, downloading it once if absent or broken.
fn ensure_helper_tool(
    installation: &Installation,
    config: &RotateConfig,
    owner: &str,
    runner: &dyn CommandRunner,
) -> Result<(), RotateError> {
    let helper_path = installation.root.join(&config.helper_tool);
    let mut state = if helper_path.is_file() {
        HelperState::Probing
    } else {
        HelperState::Missing
    };
    let mut remediated = false;

    loop {
        match state {
            HelperState::Probing => {
                let outcome = probe(installation, config, owner, runner)?;
                if outcome.success {
                    return Ok(());
                }
                if remediated {
                    return Err(RotateError::Prerequisite(format!(
                        "helper tool still fails its version probe after download: {}",
                        outcome.output
                    )));
                }
                warn!(helper = %config.helper_tool, "version probe failed, attempting download");
                state = HelperState::Missing;
            }
            HelperState::Missing => {
                if remediated {
                    return Err(RotateError::Prerequisite(
                        "helper tool is missing and remediation is exhausted".to_string(),
                    ));
                }
                state = HelperState::Downloading;
            }
            HelperState::Downloading => {
                download_helper(installation, config, runner)?;
                remediated = true;
                state = HelperState::Probing;
            }
        }
    }
}

/// `su - <owner> -c 'cd <root> && php <helper> --version'`
fn probe(
    installation: &Installation,
    config: &RotateConfig,
    owner: &str,
    runner: &dyn CommandRunner,
) -> Result<RunOutcome, RotateError> {
    let inner = ShellLineBuilder::new()
        .word("cd")
        .quoted(&installation.root.to_string_lossy())
        .word("&&")
        .word("php")
        .quoted(&config.helper_tool)
        .word("--version")
        .into_line();
    let invocation = ShellLineBuilder::new()
        .word("su")
        .word("-")
        .quoted(owner)
        .word("-c")
        .quoted(&inner)
        .build();
    runner.run(&invocation)
}

fn download_helper(
    installation: &Installation,
    config: &RotateConfig,
    runner: &dyn CommandRunner,
) -> Result<(), RotateError> {
    let helper_path = installation.root.join(&config.helper_tool);
    let helper_str = helper_path.to_string_lossy().into_owned();

    info!(url = %config.helper_url, "downloading helper tool");
    let fetch = runner.run(&Invocation::argv(
        "curl",
        ["-fsSL", config.helper_url.as_str(), "-o", helper_str.as_str()],
    ))?;
    if !fetch.success {
        return Err(RotateError::Prerequisite(format!(
            "helper tool download failed: {}",
            fetch.output
        )));
    }

    let chmod = runner.run(&Invocation::argv("chmod", ["+x", helper_str.as_str()]))?;
    if !chmod.success {
        return Err(RotateError::Prerequisite(format!(
            "could not make helper tool executable: {}",
            chmod.output
        )));
    }
    Ok(())
}
