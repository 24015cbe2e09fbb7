//! Site config file rewriting
//!
//! Replaces the value of the single `'password' => '<value>'` field in
//! the site's config file. A timestamped backup copy is taken before
//! anything is written, and the rewrite goes through a temp file in the
//! same directory so the swap is atomic and the original permissions
//! survive.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use regex::Regex;
use tempfile::NamedTempFile;

const PASSWORD_FIELD: &str = r"'password' => '[^']*'";

/// Rewrite the credential field to hold `new_secret`, returning the
/// backup file path. The file must contain exactly one occurrence of
/// the field; everything else is preserved byte for byte.
pub fn rewrite(path: &Path, new_secret: &str) -> Result<PathBuf> {
    let original = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let field = Regex::new(PASSWORD_FIELD).unwrap();
    let occurrences = field.find_iter(&original).count();
    if occurrences != 1 {
        bail!(
            "expected exactly one password field in {}, found {}",
            path.display(),
            occurrences
        );
    }

    let backup = PathBuf::from(format!(
        "{}.backup.{}",
        path.display(),
        Local::now().format("%Y%m%d%H%M%S")
    ));
    fs::copy(path, &backup)
        .with_context(|| format!("Failed to back up config file to {}", backup.display()))?;

    let updated = field
        .replace(&original, format!("'password' => '{}'", new_secret))
        .into_owned();

    let dir = path
        .parent()
        .with_context(|| format!("Config file has no parent directory: {}", path.display()))?;
    let permissions = fs::metadata(path)?.permissions();

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    temp.write_all(updated.as_bytes())?;
    temp.as_file().set_permissions(permissions)?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace config file: {}", path.display()))?;

    Ok(backup)
}
