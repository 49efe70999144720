use {
    crate::Image,
    anyhow::{Context, Result},
    image::DynamicImage,
};

/// Last-resort reader: let the codec registry guess the format from the
/// payload. Gray stays single-channel; gray+alpha widens to RGBA so only
/// 1-, 3-, and 4-channel images leave the decoder layer.
pub fn read(bytes: &[u8]) -> Result<Image> {
    image::load_from_memory(bytes)
        .context("decoding with guessed format")
        .map(|decoded| match decoded {
            DynamicImage::ImageLuma8(gray) => Image::from_parts(gray.width(), gray.height(), 1, gray.into_raw()),
            DynamicImage::ImageRgb8(rgb) => Image::from_parts(rgb.width(), rgb.height(), 3, rgb.into_raw()),
            DynamicImage::ImageRgba8(rgba) => Image::from_parts(rgba.width(), rgba.height(), 4, rgba.into_raw()),
            other if other.color().has_alpha() => {
                let rgba = other.to_rgba8();
                Image::from_parts(rgba.width(), rgba.height(), 4, rgba.into_raw())
            }
            other => {
                let rgb = other.to_rgb8();
                Image::from_parts(rgb.width(), rgb.height(), 3, rgb.into_raw())
            }
        })
}
