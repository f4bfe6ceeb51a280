//! Content and blob collaborators.
//!
//! The pipeline never talks to the CMS database directly. It reads content
//! through [`ContentStore`] and binary media through [`BlobStore`]. The
//! [`SnapshotStore`] implementation backs both with an exported snapshot:
//!
//! ```text
//! snapshot/
//! ├── content.json      # articles, pages, tags, redirects, static_files, blobs
//! └── blobs/            # one file per BinaryAsset, named by its `key`
//! ```

use crate::types::{
    Article, BinaryAsset, BlobId, ItemId, Page, Redirect, StaticFile, Tag,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("blob {0} has no stored bytes")]
    MissingBlob(BlobId),
}

/// Read-only access to the CMS content records.
pub trait ContentStore: Send + Sync {
    fn articles(&self) -> Result<Vec<Article>, ContentError>;
    fn pages(&self) -> Result<Vec<Page>, ContentError>;
    fn tags(&self) -> Result<Vec<Tag>, ContentError>;
    fn redirects(&self) -> Result<Vec<Redirect>, ContentError>;
    fn static_files(&self) -> Result<Vec<StaticFile>, ContentError>;

    /// Re-read the underlying source. Called once at the start of every run.
    fn refresh(&self) -> Result<(), ContentError> {
        Ok(())
    }

    fn article(&self, id: ItemId) -> Result<Option<Article>, ContentError> {
        Ok(self.articles()?.into_iter().find(|a| a.id == id))
    }

    fn page(&self, id: ItemId) -> Result<Option<Page>, ContentError> {
        Ok(self.pages()?.into_iter().find(|p| p.id == id))
    }

    fn tag(&self, id: ItemId) -> Result<Option<Tag>, ContentError> {
        Ok(self.tags()?.into_iter().find(|t| t.id == id))
    }

    /// Publishable articles, newest first.
    fn published_articles(&self) -> Result<Vec<Article>, ContentError> {
        let mut articles: Vec<Article> = self
            .articles()?
            .into_iter()
            .filter(|a| a.status.is_publishable())
            .collect();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(articles)
    }

    /// Publishable pages that render to HTML (redirect pages excluded).
    fn published_pages(&self) -> Result<Vec<Page>, ContentError> {
        let mut pages: Vec<Page> = self
            .pages()?
            .into_iter()
            .filter(|p| p.status.is_publishable() && !p.is_redirect())
            .collect();
        pages.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(pages)
    }
}

/// Binary media lookup and retrieval.
pub trait BlobStore: Send + Sync {
    fn find(&self, id: BlobId) -> Result<Option<BinaryAsset>, ContentError>;
    /// Resolve an opaque reference token to its asset.
    fn find_by_token(&self, token: &str) -> Result<Option<BinaryAsset>, ContentError>;
    fn read(&self, asset: &BinaryAsset) -> Result<Vec<u8>, ContentError>;
}

/// Serialized content export (`content.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub articles: Vec<Article>,
    pub pages: Vec<Page>,
    pub tags: Vec<Tag>,
    pub redirects: Vec<Redirect>,
    pub static_files: Vec<StaticFile>,
    pub blobs: Vec<BinaryAsset>,
}

/// [`ContentStore`] + [`BlobStore`] over a [`Snapshot`].
pub struct SnapshotStore {
    snapshot: RwLock<Snapshot>,
    /// Directory the snapshot was loaded from, if any.
    root: Option<PathBuf>,
    /// Blob bytes held in memory, keyed by blob id.
    inline_blobs: RwLock<HashMap<BlobId, Vec<u8>>>,
}

impl SnapshotStore {
    /// Load `content.json` from a snapshot directory.
    pub fn load(root: &Path) -> Result<Self, ContentError> {
        let snapshot = read_snapshot(root)?;
        Ok(Self {
            snapshot: RwLock::new(snapshot),
            root: Some(root.to_path_buf()),
            inline_blobs: RwLock::new(HashMap::new()),
        })
    }

    /// In-memory store; blob bytes must be supplied via [`Self::insert_blob`].
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            root: None,
            inline_blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register an asset together with its bytes.
    pub fn insert_blob(&self, asset: BinaryAsset, bytes: Vec<u8>) {
        let id = asset.id;
        {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            snapshot.blobs.retain(|b| b.id != id);
            snapshot.blobs.push(asset);
        }
        self.inline_blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, bytes);
    }

    /// Mutate the in-memory snapshot (edits between runs).
    pub fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut snapshot);
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_snapshot<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        f(&snapshot)
    }
}

fn read_snapshot(root: &Path) -> Result<Snapshot, ContentError> {
    let content = fs::read_to_string(root.join("content.json"))?;
    Ok(serde_json::from_str(&content)?)
}

impl ContentStore for SnapshotStore {
    fn articles(&self) -> Result<Vec<Article>, ContentError> {
        Ok(self.with_snapshot(|s| s.articles.clone()))
    }

    fn pages(&self) -> Result<Vec<Page>, ContentError> {
        Ok(self.with_snapshot(|s| s.pages.clone()))
    }

    fn tags(&self) -> Result<Vec<Tag>, ContentError> {
        Ok(self.with_snapshot(|s| s.tags.clone()))
    }

    fn redirects(&self) -> Result<Vec<Redirect>, ContentError> {
        Ok(self.with_snapshot(|s| s.redirects.clone()))
    }

    fn static_files(&self) -> Result<Vec<StaticFile>, ContentError> {
        Ok(self.with_snapshot(|s| s.static_files.clone()))
    }

    fn refresh(&self) -> Result<(), ContentError> {
        if let Some(root) = &self.root {
            let fresh = read_snapshot(root)?;
            *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        }
        Ok(())
    }
}

impl BlobStore for SnapshotStore {
    fn find(&self, id: BlobId) -> Result<Option<BinaryAsset>, ContentError> {
        Ok(self.with_snapshot(|s| s.blobs.iter().find(|b| b.id == id).cloned()))
    }

    fn find_by_token(&self, token: &str) -> Result<Option<BinaryAsset>, ContentError> {
        Ok(self.with_snapshot(|s| s.blobs.iter().find(|b| b.token == token).cloned()))
    }

    fn read(&self, asset: &BinaryAsset) -> Result<Vec<u8>, ContentError> {
        if let Some(bytes) = self
            .inline_blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&asset.id)
        {
            return Ok(bytes.clone());
        }
        match &self.root {
            Some(root) if !asset.key.is_empty() => {
                Ok(fs::read(root.join("blobs").join(&asset.key))?)
            }
            _ => Err(ContentError::MissingBlob(asset.id)),
        }
    }
}
