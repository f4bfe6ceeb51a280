//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the one operation the exporter needs:
//! reduce. It works on in-memory bytes because assets come out of a
//! [`BlobStore`](crate::content::BlobStore), not the filesystem.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::VariantParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Unsupported format: {0}")]
    Unsupported(String),
}

/// Trait for image processing backends.
///
/// `Sync` so one backend can serve a whole run from any thread.
pub trait ImageBackend: Send + Sync {
    /// Produce a bounded, re-encoded variant with metadata stripped.
    fn reduce(&self, bytes: &[u8], params: &VariantParams) -> Result<Vec<u8>, BackendError>;
}
