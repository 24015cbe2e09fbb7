//! Installation discovery
//!
//! Finds the one site installation this run will act on: the root
//! directory holding the config file at its fixed relative path. The
//! candidate list is injected configuration; nothing here prompts -
//! ambiguity is surfaced to the caller as an ordered match list plus a
//! pure selection function.

use std::path::{Component, Path, PathBuf};

use crate::error::RotateError;

/// A located site installation. Discovered once per run and immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct Installation {
    /// Site root directory.
    pub root: PathBuf,
    /// The credential-bearing config file inside the root.
    pub env_file: PathBuf,
}

impl Installation {
    fn new(root: &Path, env_rel_path: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            env_file: root.join(env_rel_path),
        }
    }
}

/// The account that owns the site, taken from the second segment of the
/// root path (`/home/<owner>/...`). None when the path is too shallow
/// to carry one.
pub fn owner_of(root: &Path) -> Option<String> {
    let mut segments = root
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        });
    segments.next()?;
    segments.next()
}

/// Probe the candidate roots in order, returning every one that holds
/// the config file at the expected relative path. Duplicate candidates
/// are reported once, in first-seen order.
pub fn scan(candidates: &[PathBuf], env_rel_path: &Path) -> Vec<PathBuf> {
    let mut matches: Vec<PathBuf> = Vec::new();
    for root in candidates {
        if matches.contains(root) {
            continue;
        }
        if root.join(env_rel_path).is_file() {
            matches.push(root.clone());
        }
    }
    matches
}

/// Resolve one match from a scan result by index. The index comes from
/// the interactive layer; out-of-range selections are a discovery
/// failure, not a panic.
pub fn choose(
    matches: &[PathBuf],
    index: usize,
    env_rel_path: &Path,
) -> Result<Installation, RotateError> {
    let root = matches.get(index).ok_or_else(|| {
        RotateError::Discovery(format!(
            "selection {} is out of range (found {} installations)",
            index + 1,
            matches.len()
        ))
    })?;
    Ok(Installation::new(root, env_rel_path))
}

/// Accept a caller-supplied root when scanning found nothing, applying
/// the same config-file check the scan uses.
pub fn from_manual_path(root: &Path, env_rel_path: &Path) -> Result<Installation, RotateError> {
    if !root.join(env_rel_path).is_file() {
        return Err(RotateError::Discovery(format!(
            "no {} under {}",
            env_rel_path.display(),
            root.display()
        )));
    }
    Ok(Installation::new(root, env_rel_path))
}
