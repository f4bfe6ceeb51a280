//! Publishing the output tree to a git remote.
//!
//! For the `local` provider the output directory already is the serving
//! root and [`DeployService::deploy`] does nothing. For git providers a
//! deploy is:
//!
//! ```text
//! clone --depth 1 --branch B  ──fail──▶ clone default + checkout -b B
//!   │
//!   ▼
//! clear everything but .git ─▶ copy publish list ─▶ add -A ─▶ status
//!   │                                                          │
//!   │                                           empty ─▶ NoChanges
//!   ▼
//! commit "Deploy - <UTC timestamp>" ─▶ push ──rejected──▶ push --force-with-lease
//! ```
//!
//! The scratch clone lives in a [`tempfile::TempDir`] and is removed on every
//! path out. Every git invocation goes through [`CommandRunner`] as an
//! argument vector, and every message that can carry the credential passes
//! through the injected [`Redactor`] first.

use crate::command::{CommandOutput, CommandRunner, argv};
use crate::config::{DeployConfig, DeployProvider};
use crate::paths;
use chrono::Utc;
use regex::Regex;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{step} failed: {message}")]
    Git { step: &'static str, message: String },
}

// ============================================================================
// Redaction
// ============================================================================

/// Masks credentials in text bound for logs or results.
pub struct Redactor {
    userinfo: Regex,
    tokens: Vec<Regex>,
}

impl Redactor {
    /// A redactor for `credential`. URL userinfo and well-known token shapes
    /// are masked with or without a credential.
    pub fn new(credential: Option<&str>) -> Result<Self, regex::Error> {
        let mut tokens = vec![
            Regex::new(r"ghp_[a-zA-Z0-9]+")?,
            Regex::new(r"github_pat_[a-zA-Z0-9_]+")?,
            Regex::new(r"glpat-[a-zA-Z0-9\-_]+")?,
            Regex::new(r"[a-zA-Z0-9]{40}")?,
        ];
        if let Some(secret) = credential.filter(|c| !c.is_empty()) {
            tokens.push(Regex::new(&regex::escape(secret))?);
            // The URL-encoded form appears inside authenticated remotes.
            let encoded = urlencoding::encode(secret);
            if encoded != secret {
                tokens.push(Regex::new(&regex::escape(&encoded))?);
            }
        }
        Ok(Self {
            userinfo: Regex::new(r"https://[^@/]+@")?,
            tokens,
        })
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = self
            .userinfo
            .replace_all(text, "https://[REDACTED]@")
            .into_owned();
        for pattern in &self.tokens {
            result = pattern.replace_all(&result, "[REDACTED]").into_owned();
        }
        result
    }
}

// ============================================================================
// Target
// ============================================================================

/// Entries of the output tree copied into the repository by default.
pub const DEFAULT_PUBLISH_ITEMS: &[&str] = &[
    paths::INDEX_FILE,
    paths::SEARCH_HTML,
    paths::SEARCH_JSON,
    paths::FEED_FILE,
    paths::SITEMAP_FILE,
    "robots.txt",
    paths::ASSETS_DIR,
    paths::UPLOADS_DIR,
    paths::STATIC_DIR,
    "page",
    "pages",
    "tags",
    "400.html",
    "404.html",
    "422.html",
    "500.html",
    paths::NETLIFY_REDIRECTS,
    paths::HTACCESS,
    paths::REDIRECTS_JS,
];

/// The built-in publish list: fixed entries plus the articles, either as the
/// prefix directory or one `{slug}.html` per article.
pub fn default_publish_list<'s>(
    prefix: Option<&str>,
    article_slugs: impl IntoIterator<Item = &'s str>,
) -> Vec<String> {
    let mut items: Vec<String> = DEFAULT_PUBLISH_ITEMS.iter().map(|s| s.to_string()).collect();
    match prefix {
        Some(p) => items.push(p.trim_matches('/').to_string()),
        None => items.extend(article_slugs.into_iter().map(|s| format!("{s}.html"))),
    }
    items
}

/// Resolved publishing destination.
#[derive(Debug, Clone)]
pub struct DeployTarget {
    pub provider: DeployProvider,
    pub repo_url: String,
    pub branch: String,
    pub credential: Option<String>,
    pub username: Option<String>,
    pub server_url: Option<String>,
    pub author_name: String,
    pub author_email: String,
    /// Output-relative entries to publish.
    pub publish: Vec<String>,
}

impl DeployTarget {
    /// Resolve from config. `default_publish` is used when `deploy.publish` is empty.
    pub fn from_config(config: &DeployConfig, default_publish: Vec<String>) -> Self {
        Self {
            provider: config.provider,
            repo_url: config.repo_url.clone().unwrap_or_default(),
            branch: config.branch.clone(),
            credential: config.credential(),
            username: config.username.clone().filter(|u| !u.is_empty()),
            server_url: config.server_url.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            publish: if config.publish.is_empty() {
                default_publish
            } else {
                config.publish.clone()
            },
        }
    }

    pub fn is_local(&self) -> bool {
        self.provider == DeployProvider::Local
    }

    /// Configured server without a trailing slash, else the provider default.
    pub fn server_base_url(&self) -> Option<String> {
        self.server_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .or_else(|| self.provider.default_server_url().map(str::to_string))
    }

    /// Remote URL with the credential embedded for HTTPS auth.
    ///
    /// Returns `repo_url` unchanged when there is no credential, for the
    /// local provider, and for bitbucket without a username.
    pub fn authenticated_url(&self) -> String {
        let Some(token) = self.credential.as_deref() else {
            return self.repo_url.clone();
        };
        let userinfo = match (self.provider, self.username.as_deref()) {
            (DeployProvider::Local, _) => return self.repo_url.clone(),
            (DeployProvider::Github, _) => format!("x-access-token:{token}"),
            (DeployProvider::Gitlab, _) => format!("oauth2:{token}"),
            (DeployProvider::Gitea | DeployProvider::Codeberg, Some(user)) => {
                format!("{user}:{token}")
            }
            (DeployProvider::Gitea | DeployProvider::Codeberg, None) => token.to_string(),
            (DeployProvider::Bitbucket, Some(user)) => format!("{user}:{token}"),
            (DeployProvider::Bitbucket, None) => return self.repo_url.clone(),
        };
        self.build_https_auth_url(&escape_userinfo(&userinfo))
    }

    fn build_https_auth_url(&self, userinfo: &str) -> String {
        let url = self.repo_url.as_str();
        if let Some(rest) = url.strip_prefix("https://") {
            // Drop any userinfo already present.
            let rest = match (rest.find('@'), rest.find('/')) {
                (Some(at), Some(slash)) if at < slash => &rest[at + 1..],
                (Some(at), None) => &rest[at + 1..],
                _ => rest,
            };
            return format!("https://{userinfo}@{rest}");
        }
        if let Some(rest) = url.strip_prefix("git@")
            && let Some((host, path)) = rest.split_once(':')
        {
            return format!("https://{userinfo}@{host}/{path}");
        }
        if is_short_form(url) {
            let Some(base) = self.server_base_url() else {
                return url.to_string();
            };
            let host = base
                .strip_prefix("https://")
                .or_else(|| base.strip_prefix("http://"))
                .unwrap_or(&base);
            return format!("https://{userinfo}@{host}/{url}.git");
        }
        url.to_string()
    }
}

/// `owner/repo`
fn is_short_form(url: &str) -> bool {
    match url.split_once('/') {
        Some((owner, repo)) => !owner.is_empty() && !repo.is_empty() && !repo.contains('/'),
        None => false,
    }
}

fn escape_userinfo(userinfo: &str) -> String {
    match userinfo.split_once(':') {
        Some((user, pass)) => format!("{}:{}", urlencoding::encode(user), urlencoding::encode(pass)),
        None => urlencoding::encode(userinfo).into_owned(),
    }
}

// ============================================================================
// Service
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStatus {
    Pushed,
    NoChanges,
    /// Local provider, nothing to publish.
    Local,
    Failed,
}

/// Result of one deploy. Messages are already redacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub success: bool,
    pub message: String,
    pub status: DeployStatus,
}

pub struct DeployService<'a> {
    target: &'a DeployTarget,
    runner: &'a dyn CommandRunner,
    redactor: &'a Redactor,
}

impl<'a> DeployService<'a> {
    pub fn new(target: &'a DeployTarget, runner: &'a dyn CommandRunner, redactor: &'a Redactor) -> Self {
        Self {
            target,
            runner,
            redactor,
        }
    }

    /// Publish `output_dir`. Never returns an error; failures are reported
    /// in the outcome and leave the output tree untouched.
    pub fn deploy(&self, output_dir: &Path) -> DeployOutcome {
        if self.target.is_local() {
            return DeployOutcome {
                success: true,
                message: format!("output served in place from {}", output_dir.display()),
                status: DeployStatus::Local,
            };
        }
        let provider = self.target.provider.as_str();
        let result = tempfile::Builder::new()
            .prefix("staticpress-deploy-")
            .tempdir()
            .map_err(DeployError::from)
            .and_then(|scratch| {
                let result = self.publish(output_dir, &scratch.path().join("repo"));
                // Removed here on every path, including failure.
                drop(scratch);
                result
            });

        match result {
            Ok(DeployStatus::NoChanges) => {
                info!(event = "deploy.no_changes", provider, branch = %self.target.branch, "nothing to deploy");
                DeployOutcome {
                    success: true,
                    message: format!("no changes to deploy to {provider}"),
                    status: DeployStatus::NoChanges,
                }
            }
            Ok(status) => {
                info!(event = "deploy.pushed", provider, branch = %self.target.branch, "pushed output");
                DeployOutcome {
                    success: true,
                    message: format!("pushed to {provider} branch {}", self.target.branch),
                    status,
                }
            }
            Err(e) => {
                let message = self.redactor.redact(&format!("deploy to {provider} failed: {e}"));
                error!(event = "deploy.failed", provider, error = %message, "deploy failed");
                DeployOutcome {
                    success: false,
                    message,
                    status: DeployStatus::Failed,
                }
            }
        }
    }

    fn publish(&self, output_dir: &Path, repo: &Path) -> Result<DeployStatus, DeployError> {
        let scratch = repo.parent().unwrap_or(repo);
        self.clone_repository(repo, scratch)?;
        self.configure_author(repo)?;
        clear_worktree(repo)?;
        let copied = copy_publish_items(output_dir, repo, &self.target.publish)?;
        debug!(copied, "copied publish items");
        self.commit_and_push(repo)
    }

    fn clone_repository(&self, repo: &Path, scratch: &Path) -> Result<(), DeployError> {
        let url = self.target.authenticated_url();
        let dest = repo.to_string_lossy().into_owned();
        let branch = self.target.branch.as_str();

        let out = self.git(
            &["clone", "--depth", "1", "--branch", branch, "--", url.as_str(), dest.as_str()],
            scratch,
        )?;
        if out.success {
            return Ok(());
        }

        // Branch missing remotely (or an empty repository).
        if repo.exists() {
            fs::remove_dir_all(repo)?;
        }
        let out = self.git(&["clone", "--depth", "1", "--", url.as_str(), dest.as_str()], scratch)?;
        self.check("clone", out)?;
        let out = self.git(&["checkout", "-b", branch], repo)?;
        self.check("create branch", out)
    }

    fn configure_author(&self, repo: &Path) -> Result<(), DeployError> {
        let out = self.git(&["config", "user.email", self.target.author_email.as_str()], repo)?;
        self.check("configure author", out)?;
        let out = self.git(&["config", "user.name", self.target.author_name.as_str()], repo)?;
        self.check("configure author", out)
    }

    fn commit_and_push(&self, repo: &Path) -> Result<DeployStatus, DeployError> {
        let out = self.git(&["add", "-A"], repo)?;
        self.check("stage", out)?;
        let status = self.git(&["status", "--porcelain"], repo)?;
        if status.output.trim().is_empty() {
            return Ok(DeployStatus::NoChanges);
        }

        let message = format!("Deploy - {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        let out = self.git(&["commit", "-m", message.as_str()], repo)?;
        self.check("commit", out)?;

        let url = self.target.authenticated_url();
        let refspec = format!("HEAD:refs/heads/{}", self.target.branch);
        let mut out = self.git(&["push", url.as_str(), refspec.as_str()], repo)?;
        if !out.success
            && (out.output.contains("rejected") || out.output.contains("non-fast-forward"))
        {
            out = self.git(
                &["push", "--force-with-lease", url.as_str(), refspec.as_str()],
                repo,
            )?;
        }
        self.check("push", out)?;
        Ok(DeployStatus::Pushed)
    }

    fn git(&self, args: &[&str], cwd: &Path) -> Result<CommandOutput, DeployError> {
        let mut command = argv(["git"]);
        command.extend(args.iter().map(|a| a.to_string()));
        debug!(
            event = "deploy.git_command",
            command = %self.redactor.redact(&command.join(" ")),
            "running git"
        );
        Ok(self.runner.run(&command, cwd)?)
    }

    fn check(&self, step: &'static str, out: CommandOutput) -> Result<(), DeployError> {
        if out.success {
            Ok(())
        } else {
            Err(DeployError::Git {
                step,
                message: self.redactor.redact(out.output.trim()),
            })
        }
    }
}

/// Remove every entry of the worktree except `.git`.
fn clear_worktree(repo: &Path) -> Result<(), DeployError> {
    for entry in fs::read_dir(repo)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Copy the listed output entries that exist. Returns how many were copied.
fn copy_publish_items(output_dir: &Path, repo: &Path, items: &[String]) -> Result<usize, DeployError> {
    let mut copied = 0;
    for item in items {
        if !paths::is_safe_relative(item) || item == ".git" || item.starts_with(".git/") {
            continue;
        }
        let source = output_dir.join(item);
        let dest = repo.join(item);
        if source.is_dir() {
            for rel in crate::assets::relative_files(&source).map_err(std::io::Error::other)? {
                let to = dest.join(&rel);
                if let Some(parent) = to.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(source.join(&rel), to)?;
            }
        } else if source.is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &dest)?;
        } else {
            continue;
        }
        copied += 1;
    }
    Ok(copied)
}
