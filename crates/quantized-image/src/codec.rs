//! Codec adapters: three header-sniffed readers (PNG, JPEG, GIF) plus a
//! generic fallback, and PNG/JPEG writers. Everything is byte-in/byte-out
//! around the `image` and `jpeg-encoder` crates.

use {
    crate::Image,
    anyhow::{Context, Result},
    std::path::Path,
};

pub mod fallback;
pub mod gif;
pub mod jpg;
pub mod png;

/// Encoder knobs, already resolved by the caller (normal maps pass the
/// higher JPEG quality and subsampling 0).
#[derive(Debug, Clone, Copy)]
pub struct EncodeSettings {
    /// PNG compression level [0=fastest, 9=smallest].
    pub png_level: u8,
    /// JPEG quality [1=worst, 100=best].
    pub jpg_quality: u8,
    /// JPEG chroma subsampling: 0 → 4:4:4, 1 → 4:2:2, 2 → 4:2:0.
    pub jpg_subsamp: u8,
}

/// Decode by header sniffing. Source files routinely intermingle images
/// with incorrect extensions and MIME types, so the header decides.
pub(crate) fn read(bytes: &[u8]) -> Result<Image> {
    if png::has_header(bytes) {
        png::read(bytes).context("decoding as png")
    } else if jpg::has_header(bytes) {
        jpg::read(bytes).context("decoding as jpg")
    } else if gif::has_header(bytes) {
        gif::read(bytes).context("decoding as gif")
    } else {
        tracing::debug!("no recognized image header, trying the fallback reader");
        fallback::read(bytes).context("decoding with the fallback reader")
    }
}

/// Encode to `path`: `.png` extension selects PNG, anything else JPEG.
pub(crate) fn write(path: &Path, image: &Image, settings: &EncodeSettings) -> Result<()> {
    let is_png = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if is_png {
        png::write(path, image, settings.png_level)
    } else {
        jpg::write(path, image, settings.jpg_quality, settings.jpg_subsamp)
    }
}
