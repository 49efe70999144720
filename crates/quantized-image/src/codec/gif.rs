use {
    crate::Image,
    anyhow::{Context, Result},
    image::{codecs::gif::GifDecoder, DynamicImage},
    std::io::Cursor,
};

pub fn has_header(bytes: &[u8]) -> bool {
    // "GIF87a" or "GIF89a". See: https://en.wikipedia.org/wiki/GIF
    bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")
}

/// Decode only the first frame, upsampled to RGBA. The decoder honors the
/// transparent-color index, background color, and interlaced line order;
/// structural errors (bad records, out-of-bounds frames) surface as decode
/// failures.
pub fn read(bytes: &[u8]) -> Result<Image> {
    GifDecoder::new(Cursor::new(bytes))
        .context("reading gif header")
        .and_then(|decoder| DynamicImage::from_decoder(decoder).context("decoding first gif frame"))
        .map(|decoded| {
            let rgba = decoded.to_rgba8();
            Image::from_parts(rgba.width(), rgba.height(), 4, rgba.into_raw())
        })
}
