//! Quantized 8-bit image containers and the numeric plumbing around them:
//! tightly packed RGBA-order pixel buffers, sRGB⇄linear conversion tables,
//! a linear floating-point working image, and codec adapters for reading
//! PNG/JPEG/GIF payloads and writing PNG/JPEG outputs.

use {
    anyhow::{Context, Result},
    std::path::Path,
};

pub mod codec;
pub mod color;
pub mod float_image;

pub use {
    codec::EncodeSettings,
    color::ColorSpace,
    float_image::FloatImage,
};

/// Channel indices, indicating RGBA component ordering in the uncompressed
/// buffer.
pub const CHANNEL_R: usize = 0;
pub const CHANNEL_G: usize = 1;
pub const CHANNEL_B: usize = 2;
pub const CHANNEL_A: usize = 3;
pub const CHANNEL_COUNT: usize = 4;

pub const COMPONENT_MAX: u8 = u8::MAX;
pub const COMPONENT_TO_FLOAT_SCALE: f32 = 1.0 / COMPONENT_MAX as f32;

#[inline]
pub const fn component_to_float(c: u8) -> f32 {
    c as f32 * COMPONENT_TO_FLOAT_SCALE
}

#[inline]
pub fn float_to_component(f: f32) -> u8 {
    if f <= 0.0 {
        0
    } else if f >= 1.0 {
        COMPONENT_MAX
    } else {
        (f * COMPONENT_MAX as f32 + 0.5) as u8
    }
}

/// Per-channel copy transform applied when extracting a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    #[default]
    None,
    /// `c ↦ 255 − c`
    Invert,
}

impl Transform {
    #[inline]
    fn apply(self, value: u8) -> u8 {
        match self {
            Self::None => value,
            Self::Invert => COMPONENT_MAX - value,
        }
    }
}

/// Classification of the values observed in a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content {
    /// All values 0.0.
    Solid0,
    /// All values 1.0.
    Solid1,
    /// All values equal, strictly inside (0.0, 1.0).
    Solid,
    /// All values either 0.0 or 1.0.
    Binary,
    /// Values vary over the open range.
    Varying,
}

impl Content {
    pub fn is_solid(self) -> bool {
        matches!(self, Self::Solid0 | Self::Solid1 | Self::Solid)
    }

    pub fn is_binary(self) -> bool {
        matches!(self, Self::Solid0 | Self::Solid1 | Self::Binary)
    }
}

// Edge pixels may contribute a significant area proportion for small
// textures, so accidental-alpha detection only kicks in above this size.
const ACCIDENTAL_ALPHA_PADDING: usize = 1;
const ACCIDENTAL_ALPHA_SIZE_MIN: u32 = 32;

/// Tightly packed `width × height × channel_count` 8-bit image with 1–4
/// channels in R,G,B,A order. 2-channel buffers occur only as decoder
/// intermediates and never cross the crate boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    channel_count: u8,
    buffer: Vec<u8>,
}

impl Image {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_count as u32
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub(crate) fn from_parts(width: u32, height: u32, channel_count: u8, buffer: Vec<u8>) -> Self {
        debug_assert_eq!(buffer.len(), width as usize * height as usize * channel_count as usize);
        Self {
            width,
            height,
            channel_count,
            buffer,
        }
    }

    /// Decode an image payload, choosing the codec by header sniffing (source
    /// files routinely carry wrong extensions and MIME types). Errors are
    /// tagged with `origin` so the host log names the offending image.
    pub fn read(bytes: &[u8], origin: &str) -> Result<Self> {
        codec::read(bytes).with_context(|| format!("decoding image [{origin}]"))
    }

    /// Encode to `path`: `.png` extension selects PNG, anything else JPEG.
    pub fn write(&self, path: &Path, settings: &EncodeSettings) -> Result<()> {
        codec::write(path, self, settings).with_context(|| format!("writing image [{}]", path.display()))
    }

    /// Single-channel image extracting `channel`, optionally inverted.
    pub fn from_channel(src: &Image, channel: usize, transform: Transform) -> Self {
        let stride = src.channel_count as usize;
        assert!(channel < stride);
        let buffer = src
            .buffer
            .chunks_exact(stride)
            .map(|pixel| transform.apply(pixel[channel]))
            .collect();
        Self::from_parts(src.width, src.height, 1, buffer)
    }

    /// RGB copy, dropping alpha. Source must have at least 3 channels.
    pub fn from_rgb(src: &Image) -> Self {
        let stride = src.channel_count as usize;
        assert!(stride >= 3);
        let mut buffer = Vec::with_capacity(src.pixel_count() * 3);
        for pixel in src.buffer.chunks_exact(stride) {
            buffer.extend_from_slice(&pixel[..3]);
        }
        Self::from_parts(src.width, src.height, 3, buffer)
    }

    /// RGBA copy; a 3-channel source is promoted using `default_alpha`.
    pub fn from_rgba(src: &Image, default_alpha: u8) -> Self {
        let stride = src.channel_count as usize;
        assert!(stride == 3 || stride == 4);
        let mut buffer = Vec::with_capacity(src.pixel_count() * 4);
        for pixel in src.buffer.chunks_exact(stride) {
            buffer.extend_from_slice(&pixel[..3]);
            buffer.push(if stride == 4 { pixel[3] } else { default_alpha });
        }
        Self::from_parts(src.width, src.height, 4, buffer)
    }

    /// Per-channel `(src & keep_mask) | (replace_value & !keep_mask)`.
    pub fn from_masked(src: &Image, keep_mask: [u8; CHANNEL_COUNT], replace_value: [u8; CHANNEL_COUNT]) -> Self {
        let stride = src.channel_count as usize;
        let mut or_value = [0; CHANNEL_COUNT];
        for (or, (keep, replace)) in or_value.iter_mut().zip(keep_mask.iter().zip(replace_value)) {
            *or = replace & !keep;
        }
        let mut buffer = Vec::with_capacity(src.buffer.len());
        for pixel in src.buffer.chunks_exact(stride) {
            buffer.extend(
                pixel
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c & keep_mask[i]) | or_value[i]),
            );
        }
        Self::from_parts(src.width, src.height, src.channel_count, buffer)
    }

    /// 1×1 image with the given per-channel color.
    pub fn solid_1x1(color: &[u8]) -> Self {
        assert!(!color.is_empty() && color.len() <= CHANNEL_COUNT);
        Self::from_parts(1, 1, color.len() as u8, color.to_vec())
    }

    /// `width × height` image filled with `color[..channel_count]`.
    pub fn solid_wxh(width: u32, height: u32, color: &[u8], channel_count: usize) -> Self {
        assert!(width > 0 && height > 0);
        assert!(channel_count > 0 && channel_count <= color.len());
        let pixel_count = width as usize * height as usize;
        let mut buffer = Vec::with_capacity(pixel_count * channel_count);
        for _ in 0..pixel_count {
            buffer.extend_from_slice(&color[..channel_count]);
        }
        Self::from_parts(width, height, channel_count as u8, buffer)
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Classify each channel and report the solid-color candidate (the first
    /// scanned pixel). Channels beyond `channel_count` keep the opaque-black
    /// defaults, so a 3-channel image always reports a `Solid1` alpha.
    ///
    /// With `fix_accidental_alpha` set, 4-channel images with both dimensions
    /// ≥ 32 ignore a one-pixel border so that re-save artifacts do not flip
    /// an opaque texture to having translucent edges.
    pub fn contents(&self, fix_accidental_alpha: bool) -> ([Content; CHANNEL_COUNT], [u8; CHANNEL_COUNT]) {
        let mut content = [Content::Solid0, Content::Solid0, Content::Solid0, Content::Solid1];
        let mut solid_color = [0, 0, 0, COMPONENT_MAX];

        let width = self.width as usize;
        let height = self.height as usize;
        let channel_count = self.channel_count as usize;
        if self.buffer.is_empty() {
            return (content, solid_color);
        }

        let ignore_rgba_edges = fix_accidental_alpha
            && channel_count == CHANNEL_COUNT
            && self.width >= ACCIDENTAL_ALPHA_SIZE_MIN
            && self.height >= ACCIDENTAL_ALPHA_SIZE_MIN;
        let pad = if ignore_rgba_edges { ACCIDENTAL_ALPHA_PADDING } else { 0 };
        let (x_begin, x_end) = (pad, width - pad);
        let (y_begin, y_end) = (pad, height - pad);

        let row_stride = width * channel_count;
        let first_offset = y_begin * row_stride + x_begin * channel_count;
        let mut first = [0u8; CHANNEL_COUNT];
        first[..channel_count].copy_from_slice(&self.buffer[first_offset..first_offset + channel_count]);

        // Bitmasks over channels: which observed values hit the extremes,
        // something in between, or deviated from the first scanned pixel.
        let mut mins = 0u32;
        let mut maxs = 0u32;
        let mut others = 0u32;
        let mut varyings = 0u32;
        for y in y_begin..y_end {
            let row = &self.buffer[y * row_stride..(y + 1) * row_stride];
            for pixel in row[x_begin * channel_count..x_end * channel_count].chunks_exact(channel_count) {
                for (i, &c) in pixel.iter().enumerate() {
                    let bit = 1 << i;
                    if c == 0 {
                        mins |= bit;
                    } else if c == COMPONENT_MAX {
                        maxs |= bit;
                    } else {
                        others |= bit;
                    }
                    if c != first[i] {
                        varyings |= bit;
                    }
                }
            }
        }

        for i in 0..channel_count {
            let bit = 1 << i;
            solid_color[i] = first[i];
            content[i] = if others & bit != 0 {
                if varyings & bit != 0 {
                    Content::Varying
                } else {
                    Content::Solid
                }
            } else if (mins & bit != 0) && (maxs & bit != 0) {
                Content::Binary
            } else if mins & bit != 0 {
                Content::Solid0
            } else if maxs & bit != 0 {
                Content::Solid1
            } else {
                // Channel unused; keep the default.
                content[i]
            };
        }
        (content, solid_color)
    }

    /// The solid color if every present channel classifies as solid.
    pub fn channels_solid(&self, fix_accidental_alpha: bool) -> Option<[u8; CHANNEL_COUNT]> {
        let (content, solid_color) = self.contents(fix_accidental_alpha);
        content[..self.channel_count as usize]
            .iter()
            .all(|c| c.is_solid())
            .then_some(solid_color)
    }

    /// Decode RGB as `c·2/255 − 1`, renormalize to unit length, re-encode.
    pub fn normalize_normals(&mut self) {
        let channel_count = self.channel_count as usize;
        assert!(channel_count >= 3);
        const IN_OFFSET: f32 = -0.5 * COMPONENT_MAX as f32;
        const OUT_SCALE: f32 = 0.5 * COMPONENT_MAX as f32;
        const OUT_OFFSET: f32 = 0.5 * COMPONENT_MAX as f32 + 0.5;
        for pixel in self.buffer.chunks_exact_mut(channel_count) {
            let x = pixel[CHANNEL_R] as f32 + IN_OFFSET;
            let y = pixel[CHANNEL_G] as f32 + IN_OFFSET;
            let z = pixel[CHANNEL_B] as f32 + IN_OFFSET;
            // m can never be 0 because 0 isn't precisely expressible in the
            // quantized encoding.
            let m = (x * x + y * y + z * z).sqrt();
            let s = OUT_SCALE / m;
            pixel[CHANNEL_R] = (x * s + OUT_OFFSET) as u8;
            pixel[CHANNEL_G] = (y * s + OUT_OFFSET) as u8;
            pixel[CHANNEL_B] = (z * s + OUT_OFFSET) as u8;
        }
    }

    /// `A ← (A ≥ cutoff) ? 255 : 0`
    pub fn apply_alpha_cutoff(&mut self, cutoff: u8) {
        let channel_count = self.channel_count as usize;
        assert!(channel_count > CHANNEL_A);
        for pixel in self.buffer.chunks_exact_mut(channel_count) {
            pixel[CHANNEL_A] = if pixel[CHANNEL_A] >= cutoff { COMPONENT_MAX } else { 0 };
        }
    }

    /// `c ← 255 − c` on every component.
    pub fn invert(&mut self) {
        for c in &mut self.buffer {
            *c = COMPONENT_MAX - *c;
        }
    }

    /// Linear float buffer; with `srgb_to_linear` the RGB channels pass
    /// through the sRGB→linear lookup while alpha stays linear.
    pub fn to_float(&self, srgb_to_linear: bool) -> Vec<f32> {
        let channel_count = self.channel_count as usize;
        if !srgb_to_linear {
            return self.buffer.iter().map(|&c| component_to_float(c)).collect();
        }
        let table = &*color::SRGB_TO_LINEAR;
        if channel_count == CHANNEL_COUNT {
            let mut out = Vec::with_capacity(self.buffer.len());
            for pixel in self.buffer.chunks_exact(CHANNEL_COUNT) {
                out.push(table[pixel[CHANNEL_R] as usize]);
                out.push(table[pixel[CHANNEL_G] as usize]);
                out.push(table[pixel[CHANNEL_B] as usize]);
                out.push(component_to_float(pixel[CHANNEL_A]));
            }
            out
        } else {
            self.buffer.iter().map(|&c| table[c as usize]).collect()
        }
    }

    /// Quantize a linear float buffer back to 8-bit; with `linear_to_srgb`
    /// the RGB channels pass through the reverse lookup, alpha stays linear.
    pub fn from_float(data: &[f32], width: u32, height: u32, channel_count: usize, linear_to_srgb: bool) -> Self {
        assert_eq!(data.len(), width as usize * height as usize * channel_count);
        let buffer = if !linear_to_srgb {
            data.iter().map(|&f| float_to_component(f)).collect()
        } else if channel_count == CHANNEL_COUNT {
            let mut out = Vec::with_capacity(data.len());
            for pixel in data.chunks_exact(CHANNEL_COUNT) {
                out.push(color::linear_to_srgb(pixel[CHANNEL_R]));
                out.push(color::linear_to_srgb(pixel[CHANNEL_G]));
                out.push(color::linear_to_srgb(pixel[CHANNEL_B]));
                out.push(float_to_component(pixel[CHANNEL_A]));
            }
            out
        } else {
            data.iter().map(|&f| color::linear_to_srgb(f)).collect()
        };
        Self::from_parts(width, height, channel_count as u8, buffer)
    }
}
