use {
    crate::Image,
    anyhow::{bail, Context, Result},
    image::{
        codecs::png::{CompressionType, FilterType, PngDecoder, PngEncoder},
        DynamicImage, ExtendedColorType, ImageEncoder,
    },
    std::{fs::File, io::BufWriter, io::Cursor, path::Path},
};

// "\x89PNG\r\n\x1a\n"
const HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

pub fn has_header(bytes: &[u8]) -> bool {
    bytes.starts_with(&HEADER)
}

pub fn read(bytes: &[u8]) -> Result<Image> {
    PngDecoder::new(Cursor::new(bytes))
        .context("reading png header")
        .and_then(|decoder| DynamicImage::from_decoder(decoder).context("decoding png"))
        .map(normalize)
}

// Palette and low-bit-depth images are expanded by the decoder; here gray
// promotes to RGB and wide components narrow to 8 bits, so PNG sources
// always surface as 3 or 4 channels.
fn normalize(decoded: DynamicImage) -> Image {
    match decoded {
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
    }
}

pub fn write(path: &Path, image: &Image, level: u8) -> Result<()> {
    let color_type = match image.channel_count() {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        4 => ExtendedColorType::Rgba8,
        other => bail!("png write of [{other}]-channel image"),
    };
    File::create(path)
        .context("creating file")
        .map(BufWriter::new)
        .and_then(|writer| {
            PngEncoder::new_with_quality(writer, compression(level), FilterType::Adaptive)
                .write_image(image.data(), image.width(), image.height(), color_type)
                .context("encoding png")
        })
}

// The png backend exposes three compression tiers; the 0–9 level setting
// maps onto them.
fn compression(level: u8) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=7 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}
