//! Site configuration module.
//!
//! Handles loading, validating, and merging `staticpress.toml`. Stock defaults
//! are the base layer; the user file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [site]
//! title = "My Blog"
//! url = "https://example.com"   # Base URL used for feed/sitemap links
//! description = ""
//! language = "en"
//! per_page = 20                 # Articles per index/tag page
//! # article_route_prefix = "posts"   # Nest articles under /posts/{slug}.html
//! # stylesheet = "/assets/application.css"
//!
//! [output]
//! dir = "public"
//!
//! [assets]
//! source_dir = "public/assets"
//! precompile = true
//! build_command = ["npm", "run", "build"]
//!
//! [uploads]
//! max_width = 1200
//! max_height = 1200
//! quality = 85
//!
//! [static_files]
//! source_dir = "storage/static"
//!
//! [rewrite]
//! storage_path = "/rails/active_storage"
//!
//! [schedule]
//! debounce_secs = 60
//! lock_file = "tmp/static_generation.lock"
//! max_workers = 2
//!
//! [deploy]
//! provider = "local"            # local | github | gitlab | gitea | codeberg | bitbucket
//! # repo_url = "owner/site"
//! branch = "main"
//! # token_env = "STATICPRESS_DEPLOY_TOKEN"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default file name looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "staticpress.toml";

/// Pipeline configuration loaded from `staticpress.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site identity and page layout.
    pub site: SiteSection,
    /// Where the output tree lives.
    pub output: OutputConfig,
    /// Compiled front-end assets.
    pub assets: AssetsConfig,
    /// Exported media variant settings.
    pub uploads: UploadsConfig,
    /// User-supplied static files copied into `static/`.
    pub static_files: StaticFilesConfig,
    /// Markup rewriting.
    pub rewrite: RewriteConfig,
    /// Debounce and locking.
    pub schedule: ScheduleConfig,
    /// Publishing target.
    pub deploy: DeployConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.per_page == 0 {
            return Err(ConfigError::Validation(
                "site.per_page must be greater than 0".into(),
            ));
        }
        if !(1..=100).contains(&self.uploads.quality) {
            return Err(ConfigError::Validation(
                "uploads.quality must be 1-100".into(),
            ));
        }
        if self.uploads.max_width == 0 || self.uploads.max_height == 0 {
            return Err(ConfigError::Validation(
                "uploads.max_width and uploads.max_height must be non-zero".into(),
            ));
        }
        if self.schedule.max_workers == 0 {
            return Err(ConfigError::Validation(
                "schedule.max_workers must be greater than 0".into(),
            ));
        }
        if !self.rewrite.storage_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "rewrite.storage_path must start with '/'".into(),
            ));
        }
        if let Some(prefix) = &self.site.article_route_prefix
            && (prefix.is_empty() || prefix.contains("..") || prefix.starts_with('/'))
        {
            return Err(ConfigError::Validation(format!(
                "site.article_route_prefix '{prefix}' must be a relative directory name"
            )));
        }
        self.deploy.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSection {
    pub title: String,
    /// Absolute base URL, used for feed items and sitemap locations.
    pub url: String,
    pub description: String,
    pub language: String,
    /// Articles per index/tag page.
    pub per_page: usize,
    /// Optional directory articles are nested under (`{prefix}/{slug}.html`).
    pub article_route_prefix: Option<String>,
    /// Stylesheet linked from every HTML page.
    pub stylesheet: Option<String>,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            title: "My Blog".to_string(),
            url: "https://example.com".to_string(),
            description: String::new(),
            language: "en".to_string(),
            per_page: 20,
            article_route_prefix: None,
            stylesheet: None,
        }
    }
}

impl SiteSection {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("public"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// Directory the front-end build writes to.
    pub source_dir: PathBuf,
    /// Run `build_command` when no compiled assets are found.
    pub precompile: bool,
    /// Argument vector for the asset build. Executed without a shell.
    pub build_command: Vec<String>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("public/assets"),
            precompile: true,
            build_command: vec!["npm".into(), "run".into(), "build".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    pub max_width: u32,
    pub max_height: u32,
    /// Lossy encoding quality (1-100).
    pub quality: u32,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_width: 1200,
            max_height: 1200,
            quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticFilesConfig {
    pub source_dir: PathBuf,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("storage/static"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteConfig {
    /// URL path prefix of the dynamic storage layer.
    pub storage_path: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            storage_path: "/rails/active_storage".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Quiet period before a scheduled run executes.
    pub debounce_secs: u64,
    /// File used for the cross-process generation lock.
    pub lock_file: PathBuf,
    /// Worker threads executing due jobs.
    pub max_workers: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            debounce_secs: 60,
            lock_file: PathBuf::from("tmp/static_generation.lock"),
            max_workers: 2,
        }
    }
}

/// Where generated output is published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployProvider {
    /// The output directory is the serving root; nothing to push.
    #[default]
    Local,
    Github,
    Gitlab,
    Gitea,
    Codeberg,
    Bitbucket,
}

impl DeployProvider {
    /// Default web host for short `owner/repo` URLs.
    pub fn default_server_url(self) -> Option<&'static str> {
        match self {
            Self::Github => Some("https://github.com"),
            Self::Gitlab => Some("https://gitlab.com"),
            Self::Codeberg => Some("https://codeberg.org"),
            Self::Bitbucket => Some("https://bitbucket.org"),
            Self::Gitea | Self::Local => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Gitea => "gitea",
            Self::Codeberg => "codeberg",
            Self::Bitbucket => "bitbucket",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    pub provider: DeployProvider,
    /// `https://…`, `git@host:owner/repo.git`, `owner/repo`, or a local path.
    pub repo_url: Option<String>,
    pub branch: String,
    /// Inline credential. Prefer `token_env`.
    pub token: Option<String>,
    /// Environment variable holding the credential.
    pub token_env: Option<String>,
    /// Required for bitbucket, optional for gitea/codeberg.
    pub username: Option<String>,
    /// Self-hosted server, required for gitea.
    pub server_url: Option<String>,
    pub author_name: String,
    pub author_email: String,
    /// Output entries to publish. Empty means the built-in list.
    pub publish: Vec<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            provider: DeployProvider::Local,
            repo_url: None,
            branch: "main".to_string(),
            token: None,
            token_env: None,
            username: None,
            server_url: None,
            author_name: "staticpress".to_string(),
            author_email: "staticpress@localhost".to_string(),
            publish: Vec::new(),
        }
    }
}

impl DeployConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.branch.trim().is_empty() {
            return Err(ConfigError::Validation(
                "deploy.branch must not be empty".into(),
            ));
        }
        // A leading dash would be parsed as a git option.
        if self.branch.starts_with('-') {
            return Err(ConfigError::Validation(format!(
                "deploy.branch '{}' must not start with '-'",
                self.branch
            )));
        }
        if self.provider == DeployProvider::Local {
            return Ok(());
        }
        match self.repo_url.as_deref() {
            None | Some("") => {
                return Err(ConfigError::Validation(format!(
                    "deploy.repo_url is required for provider '{}'",
                    self.provider.as_str()
                )));
            }
            Some(url) if url.starts_with('-') => {
                return Err(ConfigError::Validation(
                    "deploy.repo_url must not start with '-'".into(),
                ));
            }
            Some(_) => {}
        }
        if self.provider == DeployProvider::Gitea && self.server_url.is_none() {
            return Err(ConfigError::Validation(
                "deploy.server_url is required for provider 'gitea'".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the credential: inline token first, then `token_env`.
    pub fn credential(&self) -> Option<String> {
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            return Some(token.to_string());
        }
        self.token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|t| !t.is_empty())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` when the file is absent.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file, falling back to stock defaults when absent.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `staticpress.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# staticpress configuration
# ========================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Site identity
# ---------------------------------------------------------------------------
[site]
title = "My Blog"

# Absolute base URL. Feed items and sitemap entries are built from it.
url = "https://example.com"
description = ""
language = "en"

# Articles per index and tag page.
per_page = 20

# Nest article pages under a directory: posts/{slug}.html
# article_route_prefix = "posts"

# Stylesheet linked from every page.
# stylesheet = "/assets/application.css"

# ---------------------------------------------------------------------------
# Output tree
# ---------------------------------------------------------------------------
[output]
dir = "public"

# ---------------------------------------------------------------------------
# Compiled front-end assets
# ---------------------------------------------------------------------------
[assets]
# Where the front-end build writes its output.
source_dir = "public/assets"

# Run build_command when no compiled assets are found.
precompile = true

# Argument vector; executed directly, never through a shell.
build_command = ["npm", "run", "build"]

# ---------------------------------------------------------------------------
# Exported media (uploads/)
# ---------------------------------------------------------------------------
[uploads]
# Images larger than this are scaled down, keeping their aspect ratio.
max_width = 1200
max_height = 1200

# Lossy encoding quality (1 = worst, 100 = best).
quality = 85

# ---------------------------------------------------------------------------
# User static files (static/)
# ---------------------------------------------------------------------------
[static_files]
source_dir = "storage/static"

# ---------------------------------------------------------------------------
# Markup rewriting
# ---------------------------------------------------------------------------
[rewrite]
# URL path prefix of the dynamic storage layer whose links get rewritten.
storage_path = "/rails/active_storage"

# ---------------------------------------------------------------------------
# Scheduling
# ---------------------------------------------------------------------------
[schedule]
# Bursts of triggers for the same target within this window run once.
debounce_secs = 60

# Cross-process lock. Only one generation run at a time.
lock_file = "tmp/static_generation.lock"

# Worker threads executing due jobs.
max_workers = 2

# ---------------------------------------------------------------------------
# Deploy
# ---------------------------------------------------------------------------
[deploy]
# local | github | gitlab | gitea | codeberg | bitbucket
provider = "local"

# https://host/owner/repo.git, git@host:owner/repo.git, or owner/repo
# repo_url = "owner/site"

branch = "main"

# Credential. Prefer reading it from the environment.
# token_env = "STATICPRESS_DEPLOY_TOKEN"
# username = "deploy-bot"        # required for bitbucket
# server_url = "https://git.example.com"   # required for gitea

author_name = "staticpress"
author_email = "staticpress@localhost"

# Output entries to publish. Empty = built-in list.
publish = []
"##
}
