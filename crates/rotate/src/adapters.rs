//! Credential rotation adapters
//!
//! One adapter per target system. Each generates a fresh secret,
//! translates the rotation into an external command, and judges the
//! result. Adapters never prompt - confirmation gating is the
//! orchestrator's responsibility.

use std::path::Path;

use tracing::warn;

use crate::command::{CommandRunner, Invocation, ShellLineBuilder};
use crate::envfile;
use crate::error::RotateError;
use crate::secret::{self, Secret};

/// Some admin tools exit 0 even when the change was handled as an
/// internal error, so a zero exit alone is not success.
pub const APP_SUCCESS_MARKER: &str = "Password successfully changed";

/// Rotates an application admin account through the site's helper tool,
/// executed as the owning account.
pub struct AppUserAdapter<'a> {
    pub runner: &'a dyn CommandRunner,
    pub root: &'a Path,
    pub owner: &'a str,
    pub helper_tool: &'a str,
    pub secret_length: usize,
}

impl AppUserAdapter<'_> {
    pub fn rotate(&self, identity: &str) -> Result<Secret, RotateError> {
        let new_secret = secret::generate(self.secret_length)?;

        let inner = ShellLineBuilder::new()
            .word("cd")
            .quoted(&self.root.to_string_lossy())
            .word("&&")
            .word("php")
            .quoted(self.helper_tool)
            .word("admin:user:change-password")
            .quoted(identity)
            .quoted(new_secret.as_str())
            .into_line();
        let invocation = ShellLineBuilder::new()
            .word("su")
            .word("-")
            .quoted(self.owner)
            .word("-c")
            .quoted(&inner)
            .build();

        let outcome = self.runner.run(&invocation)?;
        if outcome.success && outcome.output.contains(APP_SUCCESS_MARKER) {
            Ok(new_secret)
        } else {
            let detail = if outcome.success {
                format!(
                    "command exited 0 without the expected success message: {}",
                    outcome.output
                )
            } else {
                outcome.output
            };
            Err(RotateError::Adapter {
                target: format!("application user {}", identity),
                detail,
            })
        }
    }
}

/// Rotates the control-panel account through the panel CLI. Arguments
/// travel as discrete tokens, so no shell quoting is involved.
pub struct ControlPanelAdapter<'a> {
    pub runner: &'a dyn CommandRunner,
    pub domain: &'a str,
    pub secret_length: usize,
}

impl ControlPanelAdapter<'_> {
    pub fn rotate(&self, identity: &str) -> Result<Secret, RotateError> {
        let new_secret = secret::generate(self.secret_length)?;

        let invocation = Invocation::argv(
            "virtualmin",
            [
                "modify-domain",
                "--domain",
                self.domain,
                "--pass",
                new_secret.as_str(),
            ],
        );

        let outcome = self.runner.run(&invocation)?;
        if outcome.success {
            Ok(new_secret)
        } else {
            Err(RotateError::Adapter {
                target: format!("control panel account {}", identity),
                detail: outcome.output,
            })
        }
    }
}

/// Result of a database rotation. The config file update is a dependent
/// second step, so its failure is reported as a distinct partial state
/// rather than an overall failure.
#[derive(Debug)]
pub enum DbRotation {
    /// Database changed and the config file now matches.
    Rotated(Secret),
    /// Database changed but the config file is stale; the operator must
    /// reconcile manually.
    RotatedConfigStale { secret: Secret, warning: String },
}

/// Rotates the database user and propagates the new secret into the
/// site config file.
pub struct DatabaseAdapter<'a> {
    pub runner: &'a dyn CommandRunner,
    pub db_user: &'a str,
    pub db_host: &'a str,
    pub env_file: &'a Path,
    pub secret_length: usize,
}

impl DatabaseAdapter<'_> {
    pub fn rotate(&self) -> Result<DbRotation, RotateError> {
        let new_secret = secret::generate(self.secret_length)?;

        // The secret alphabet contains no quotes or backslashes, so it
        // cannot break out of the statement's own single quoting.
        let statement = format!(
            "ALTER USER '{}'@'{}' IDENTIFIED BY '{}'; FLUSH PRIVILEGES;",
            self.db_user,
            self.db_host,
            new_secret.as_str()
        );
        let invocation = ShellLineBuilder::new()
            .word("mysql")
            .word("-e")
            .quoted(&statement)
            .build();

        let outcome = self.runner.run(&invocation)?;
        if !outcome.success {
            return Err(RotateError::Adapter {
                target: format!("database user {}", self.db_user),
                detail: outcome.output,
            });
        }

        match envfile::rewrite(self.env_file, new_secret.as_str()) {
            Ok(_backup) => Ok(DbRotation::Rotated(new_secret)),
            Err(e) => {
                let warning = RotateError::ConfigWrite(format!("{:#}", e)).to_string();
                warn!("{}", warning);
                Ok(DbRotation::RotatedConfigStale {
                    secret: new_secret,
                    warning,
                })
            }
        }
    }
}
