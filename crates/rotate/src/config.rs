//! Run configuration
//!
//! Everything site-specific - account lists, domain, database user,
//! candidate roots, scratch locations - is injected through this struct
//! rather than baked into the rotation flow, so one binary serves many
//! sites and tests can supply fakes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for one rotation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateConfig {
    /// Application admin accounts to rotate.
    pub app_users: Vec<String>,
    /// Domain the control-panel account manages.
    pub panel_domain: String,
    /// Control-panel account name (also seeds the default candidate
    /// roots).
    pub panel_user: String,
    /// Database account to rotate.
    pub db_user: String,
    /// Host part of the database account.
    pub db_host: String,
    /// Admin helper tool file name, resolved relative to the site root.
    pub helper_tool: String,
    /// Where to fetch the helper tool when it is missing or broken.
    pub helper_url: String,
    /// Credential-bearing config file, relative to the site root.
    pub env_file: PathBuf,
    /// Candidate site roots, probed in order.
    pub candidate_roots: Vec<PathBuf>,
    /// Where the run log and the notification artifact are written.
    pub scratch_dir: PathBuf,
    /// Length of generated secrets.
    pub secret_length: usize,
}

impl Default for RotateConfig {
    fn default() -> Self {
        let panel_user = "site".to_string();
        let panel_domain = "example.com".to_string();
        Self {
            app_users: vec!["admin".to_string()],
            candidate_roots: default_candidate_roots(&panel_user, &panel_domain),
            panel_domain,
            panel_user,
            db_user: "siteuser".to_string(),
            db_host: "localhost".to_string(),
            helper_tool: "n98-magerun2.phar".to_string(),
            helper_url: "https://files.magerun.net/n98-magerun2.phar".to_string(),
            env_file: PathBuf::from("app/etc/env.php"),
            scratch_dir: PathBuf::from("/tmp"),
            secret_length: 16,
        }
    }
}

/// The usual places a panel-managed site lands, plus the generic web
/// root and the current directory.
pub fn default_candidate_roots(panel_user: &str, panel_domain: &str) -> Vec<PathBuf> {
    let mut roots = vec![
        PathBuf::from(format!("/home/{}/public_html", panel_user)),
        PathBuf::from(format!(
            "/home/{}/domains/{}/public_html",
            panel_user, panel_domain
        )),
        PathBuf::from("/var/www/html"),
    ];
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    roots
}

impl RotateConfig {
    /// Load configuration. An explicit path must exist and parse; with
    /// no path, the default config file is used when present and the
    /// built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default_path = Self::default_path();
                if !default_path.is_file() {
                    return Ok(Self::default());
                }
                default_path
            }
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// Default config location (~/.config/rotate/config.json).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("rotate")
            .join("config.json")
    }

    /// Replace auto-detection with one operator-supplied root.
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.candidate_roots = vec![root];
        self
    }
}
