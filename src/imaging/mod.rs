//! Image processing for exported uploads, in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Sniff** | `image::guess_format` |
//! | **Reduce** | Lanczos3 downscale + same-format re-encode |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a variant
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{compression_ratio, fit_within};
pub use params::{Quality, VariantParams};
pub use rust_backend::{RustBackend, supports_variants};
