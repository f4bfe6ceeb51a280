//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Dimensions that fit `source` inside `bounds`, preserving aspect ratio.
///
/// Returns `None` when the source already fits; images are never upscaled.
///
/// # Examples
/// ```
/// # use staticpress::imaging::fit_within;
/// // 2400x1600 into 1200x1200 → 1200x800
/// assert_eq!(fit_within((2400, 1600), (1200, 1200)), Some((1200, 800)));
///
/// // Already small enough
/// assert_eq!(fit_within((640, 480), (1200, 1200)), None);
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w == 0 || src_h == 0 || (src_w <= max_w && src_h <= max_h) {
        return None;
    }

    let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h);
    Some((w, h))
}

/// Percentage of bytes saved by a variant, for logging.
///
/// Negative when the variant is larger than the original.
pub fn compression_ratio(original: usize, reduced: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let saved = (original as f64 - reduced as f64) / original as f64 * 100.0;
    (saved * 10.0).round() / 10.0
}
