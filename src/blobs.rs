//! Exporting binary media into `uploads/`.
//!
//! A [`BlobExporter`] lives for exactly one generation run. Its memo map
//! guarantees each asset is exported at most once per run no matter how
//! many articles reference it; the map is dropped with the exporter.
//!
//! ## Export rules
//!
//! - Output file: `uploads/{asset-id}-{filename}`, so re-exporting across
//!   runs overwrites in place and two assets never collide.
//! - Raster images get a bounded, re-encoded, metadata-free variant.
//! - If the variant fails, the original bytes are copied instead
//!   (degraded success, logged as a warning).
//! - Only when the original cannot be read or written either does the
//!   export yield no path; callers keep their old reference.

use crate::content::BlobStore;
use crate::imaging::{self, ImageBackend, VariantParams};
use crate::ledger::digest_bytes;
use crate::paths;
use crate::rewrite::ReferenceResolver;
use crate::types::{BinaryAsset, BlobId};
use crate::writer::{WriteStatus, write_if_changed};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// One file written under `uploads/` during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// Path relative to the output root.
    pub path: String,
    pub digest: String,
    pub status: WriteStatus,
    /// The variant failed and the original bytes were exported instead.
    pub degraded: bool,
}

/// Per-run exporter with an at-most-once memo.
pub struct BlobExporter<'a> {
    store: &'a dyn BlobStore,
    backend: &'a dyn ImageBackend,
    output_root: &'a Path,
    params: VariantParams,
    /// asset id → public path (`None` when both export paths failed).
    exported: Mutex<HashMap<BlobId, Option<String>>>,
    files: Mutex<BTreeMap<BlobId, ExportedFile>>,
}

impl<'a> BlobExporter<'a> {
    pub fn new(
        store: &'a dyn BlobStore,
        backend: &'a dyn ImageBackend,
        output_root: &'a Path,
        params: VariantParams,
    ) -> Self {
        Self {
            store,
            backend,
            output_root,
            params,
            exported: Mutex::new(HashMap::new()),
            files: Mutex::new(BTreeMap::new()),
        }
    }

    /// Export `asset` and return its root-relative URL (`/uploads/…`).
    ///
    /// Idempotent within the run: later calls return the memoized result
    /// without touching the store or the filesystem.
    pub fn export(&self, asset: &BinaryAsset) -> Option<String> {
        // Held for the whole export so concurrent callers cannot both write.
        let mut exported = self.exported.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(memo) = exported.get(&asset.id) {
            return memo.clone();
        }
        let result = self.export_uncached(asset);
        exported.insert(asset.id, result.clone());
        result
    }

    /// Export assets by id. Unknown ids are logged and skipped.
    pub fn export_ids(&self, ids: &[BlobId]) -> usize {
        let mut count = 0;
        for &id in ids {
            match self.store.find(id) {
                Ok(Some(asset)) => {
                    if self.export(&asset).is_some() {
                        count += 1;
                    }
                }
                Ok(None) => warn!(event = "blob.export_failed", blob_id = id, "asset not found"),
                Err(e) => {
                    warn!(event = "blob.export_failed", blob_id = id, error = %e, "asset lookup failed")
                }
            }
        }
        count
    }

    /// Files written (or confirmed unchanged) this run, by asset id.
    pub fn exported_files(&self) -> Vec<ExportedFile> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of distinct assets successfully exported.
    pub fn exported_count(&self) -> usize {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn export_uncached(&self, asset: &BinaryAsset) -> Option<String> {
        let file_name = paths::upload_filename(asset.id, &asset.filename);
        let rel_path = format!("{}/{file_name}", paths::UPLOADS_DIR);
        let url = paths::upload_url(&file_name);

        let original = match self.store.read(asset) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    event = "blob.export_failed",
                    blob_id = asset.id,
                    filename = %asset.filename,
                    error = %e,
                    "could not read asset bytes"
                );
                return None;
            }
        };

        let mut degraded = false;
        let bytes = if imaging::supports_variants(&asset.content_type) {
            match self.backend.reduce(&original, &self.params) {
                Ok(reduced) => {
                    debug!(
                        blob_id = asset.id,
                        original_bytes = original.len(),
                        variant_bytes = reduced.len(),
                        saved_pct = imaging::compression_ratio(original.len(), reduced.len()),
                        "image variant created"
                    );
                    reduced
                }
                Err(e) => {
                    warn!(
                        event = "blob.export_degraded",
                        blob_id = asset.id,
                        path = %rel_path,
                        error = %e,
                        "variant processing failed, exporting original bytes"
                    );
                    degraded = true;
                    original
                }
            }
        } else {
            original
        };

        let full = self.output_root.join(&rel_path);
        match write_if_changed(&full, &bytes) {
            Ok(status) => {
                info!(
                    event = "blob.exported",
                    blob_id = asset.id,
                    path = %rel_path,
                    bytes = bytes.len(),
                    "exported asset"
                );
                self.files
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(
                        asset.id,
                        ExportedFile {
                            path: rel_path,
                            digest: digest_bytes(&bytes),
                            status,
                            degraded,
                        },
                    );
                Some(url)
            }
            Err(e) => {
                error!(
                    event = "blob.export_failed",
                    blob_id = asset.id,
                    path = %rel_path,
                    error = %e,
                    "could not write asset"
                );
                None
            }
        }
    }
}

impl ReferenceResolver for BlobExporter<'_> {
    /// Fail-open: any lookup or export failure returns `original`.
    fn resolve(&self, token: &str, original: &str) -> String {
        match self.store.find_by_token(token) {
            Ok(Some(asset)) => self.export(&asset).unwrap_or_else(|| original.to_string()),
            Ok(None) => {
                debug!(event = "blob.resolve_failed", token, "unknown reference token");
                original.to_string()
            }
            Err(e) => {
                warn!(event = "blob.resolve_failed", token, error = %e, "token lookup failed");
                original.to_string()
            }
        }
    }
}

impl BlobExporter<'_> {
    /// Resolve an opaque reference token to a static path (see [`ReferenceResolver`]).
    pub fn resolve_by_reference_token(&self, token: &str, original: &str) -> String {
        self.resolve(token, original)
    }
}
