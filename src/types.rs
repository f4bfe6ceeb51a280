//! Content records and generation targets shared across the pipeline.
//!
//! The records mirror what the CMS content store hands over: rendered body
//! markup, slugs, publication status and the binary assets a body references.
//! The pipeline only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of an article, page or tag.
pub type ItemId = u64;

/// Identifier of a binary asset in the dynamic storage layer.
pub type BlobId = u64;

/// Publication status of an article or page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    #[default]
    Draft,
    Publish,
    /// Unlisted but reachable by URL.
    Shared,
    Schedule,
    Trash,
}

impl PublishStatus {
    /// Whether content with this status belongs in the output tree.
    pub fn is_publishable(self) -> bool {
        matches!(self, Self::Publish | Self::Shared)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ItemId,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: PublishStatus,
    /// Rendered rich-text body (HTML).
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub blob_ids: Vec<BlobId>,
    #[serde(default)]
    pub tag_ids: Vec<ItemId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: ItemId,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub status: PublishStatus,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub blob_ids: Vec<BlobId>,
    /// Pages that only point elsewhere get no HTML file.
    #[serde(default)]
    pub redirect_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn is_redirect(&self) -> bool {
        self.redirect_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: ItemId,
    pub slug: String,
    pub name: String,
}

/// Regex-based redirect rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub regex: String,
    pub replacement: String,
    #[serde(default)]
    pub permanent: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// A user-managed file published under `static/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticFile {
    pub filename: String,
    pub blob_id: BlobId,
}

/// A binary object owned by the dynamic storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryAsset {
    pub id: BlobId,
    /// Opaque reference token embedded in storage URLs.
    pub token: String,
    pub filename: String,
    pub content_type: String,
    #[serde(default)]
    pub byte_size: u64,
    /// Storage key; the file name under the snapshot's `blobs/` directory.
    #[serde(default)]
    pub key: String,
}

impl BinaryAsset {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

// ============================================================================
// Generation targets
// ============================================================================

/// What a generation run regenerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    All,
    Article(ItemId),
    Page(ItemId),
    Tag(ItemId),
    Index,
    Feed,
    Sitemap,
}

impl Target {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Article(_) => "article",
            Self::Page(_) => "page",
            Self::Tag(_) => "tag",
            Self::Index => "index",
            Self::Feed => "feed",
            Self::Sitemap => "sitemap",
        }
    }

    pub fn id(&self) -> Option<ItemId> {
        match self {
            Self::Article(id) | Self::Page(id) | Self::Tag(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}:{}", self.kind(), id),
            None => f.write_str(self.kind()),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("unknown target kind '{0}'")]
    UnknownKind(String),
    #[error("target '{0}' requires an id (e.g. {0}:42)")]
    MissingId(String),
    #[error("target '{0}' does not take an id")]
    UnexpectedId(String),
    #[error("invalid id '{0}'")]
    InvalidId(String),
}

impl FromStr for Target {
    type Err = TargetParseError;

    /// Parses `all`, `index`, `feed`, `sitemap`, `article:ID`, `page:ID`, `tag:ID`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, id) = match s.split_once(':') {
            Some((k, id)) => (k, Some(id)),
            None => (s, None),
        };
        let parse_id = |id: Option<&str>| -> Result<ItemId, TargetParseError> {
            let raw = id.ok_or_else(|| TargetParseError::MissingId(kind.to_string()))?;
            raw.parse()
                .map_err(|_| TargetParseError::InvalidId(raw.to_string()))
        };
        let no_id = |target: Target| -> Result<Target, TargetParseError> {
            match id {
                Some(_) => Err(TargetParseError::UnexpectedId(kind.to_string())),
                None => Ok(target),
            }
        };
        match kind {
            "all" => no_id(Self::All),
            "index" => no_id(Self::Index),
            "feed" => no_id(Self::Feed),
            "sitemap" => no_id(Self::Sitemap),
            "article" => Ok(Self::Article(parse_id(id)?)),
            "page" => Ok(Self::Page(parse_id(id)?)),
            "tag" => Ok(Self::Tag(parse_id(id)?)),
            other => Err(TargetParseError::UnknownKind(other.to_string())),
        }
    }
}

/// A trigger for regeneration, consumed once by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub target: Target,
    pub requested_at: DateTime<Utc>,
    /// When the debounced execution is due.
    pub run_at: DateTime<Utc>,
    pub debounce: bool,
}
