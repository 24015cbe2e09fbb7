//! rotate - Credential rotation for a deployed site
//!
//! Rotates the credentials that belong to one site installation - the
//! application's admin accounts, the hosting control-panel account, and
//! the database user - then produces a single consolidated notification
//! of everything that changed.
//!
//! Every mutating step sits behind two explicit confirmations, every
//! external command is recorded in an append-only run log, and partial
//! failures are tracked in a change ledger so the final report always
//! reflects what actually happened.

pub mod adapters;
pub mod command;
pub mod config;
pub mod envfile;
pub mod error;
pub mod install;
pub mod interrupt;
pub mod ledger;
pub mod orchestrator;
pub mod preflight;
pub mod report;
pub mod secret;

pub use config::RotateConfig;
pub use error::RotateError;
pub use ledger::ChangeLedger;
pub use orchestrator::{Orchestrator, Prompter};
