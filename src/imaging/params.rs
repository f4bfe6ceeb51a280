//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`BlobExporter`](crate::blobs::BlobExporter) (which
//! decides which assets get a variant) and the [`backend`](super::backend)
//! (which does the pixel work).

use crate::config::UploadsConfig;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Bounded-dimension, quality-reduced web variant of an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantParams {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: Quality,
}

impl Default for VariantParams {
    fn default() -> Self {
        Self {
            max_width: 1200,
            max_height: 1200,
            quality: Quality::default(),
        }
    }
}

impl From<&UploadsConfig> for VariantParams {
    fn from(config: &UploadsConfig) -> Self {
        Self {
            max_width: config.max_width,
            max_height: config.max_height,
            quality: Quality::new(config.quality),
        }
    }
}
