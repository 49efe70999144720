use {
    crate::{Image, CHANNEL_COUNT},
    anyhow::{bail, Context, Result},
    image::{codecs::jpeg::JpegDecoder, DynamicImage},
    jpeg_encoder::{ColorType, Encoder, SamplingFactor},
    std::{io::Cursor, path::Path},
    tap::prelude::*,
};

pub fn has_header(bytes: &[u8]) -> bool {
    // SOI marker.
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

pub fn read(bytes: &[u8]) -> Result<Image> {
    JpegDecoder::new(Cursor::new(bytes))
        .context("reading jpg header")
        .and_then(|decoder| DynamicImage::from_decoder(decoder).context("decoding jpg"))
        .map(|decoded| match decoded {
            DynamicImage::ImageLuma8(gray) => Image::from_parts(gray.width(), gray.height(), 1, gray.into_raw()),
            // JPEG never carries alpha; CMYK and friends land here.
            other => {
                let rgb = other.to_rgb8();
                Image::from_parts(rgb.width(), rgb.height(), 3, rgb.into_raw())
            }
        })
}

pub fn write(path: &Path, image: &Image, quality: u8, subsamp: u8) -> Result<()> {
    let width = u16::try_from(image.width()).context("image too wide for jpg")?;
    let height = u16::try_from(image.height()).context("image too tall for jpg")?;
    let (color_type, data) = match image.channel_count() {
        1 => (ColorType::Luma, image.data().to_vec()),
        3 => (ColorType::Rgb, image.data().to_vec()),
        4 => (
            // JPEG has no alpha; keep the RGB components.
            ColorType::Rgb,
            image
                .data()
                .chunks_exact(CHANNEL_COUNT)
                .flat_map(|pixel| &pixel[..3])
                .copied()
                .collect(),
        ),
        other => bail!("jpg write of [{other}]-channel image"),
    };
    Encoder::new_file(path, quality)
        .context("creating jpg encoder")
        .and_then(|encoder| {
            encoder
                .tap_mut(|encoder| encoder.set_sampling_factor(sampling_factor(subsamp)))
                .encode(&data, width, height, color_type)
                .context("encoding jpg")
        })
}

fn sampling_factor(subsamp: u8) -> SamplingFactor {
    match subsamp {
        0 => SamplingFactor::F_1_1, // 4:4:4
        1 => SamplingFactor::F_2_1, // 4:2:2
        _ => SamplingFactor::F_2_2, // 4:2:0
    }
}
