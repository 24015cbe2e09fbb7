//! Error taxonomy for a rotation run
//!
//! Discovery and prerequisite failures are fatal to the run. Adapter and
//! config-write failures are local to one category or identity and are
//! recorded in the ledger instead of aborting the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RotateError {
    /// No installation could be located, or an ambiguous selection was
    /// never resolved.
    #[error("installation not found: {0}")]
    Discovery(String),

    /// A prerequisite check failed and remediation is exhausted.
    #[error("prerequisite check failed: {0}")]
    Prerequisite(String),

    /// An external command exited non-zero or produced unexpected output.
    #[error("rotation failed for {target}: {detail}")]
    Adapter { target: String, detail: String },

    /// The database credential changed but the site config file could not
    /// be updated to match. Kept separate from Adapter so the operator
    /// knows a manual reconciliation is needed.
    #[error("config file update failed after database change: {0}")]
    ConfigWrite(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The append-only run log could not be written. Treated as an error
    /// because audit entries must never be lost.
    #[error("run log write failed: {0}")]
    RunLog(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
