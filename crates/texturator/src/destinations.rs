//! Destination naming: quantized scale/bias interning for short stable
//! suffixes, source-name sanitation, and suffix/extension assembly. Every
//! distinct parameter combination maps to exactly one output name.

use {
    crate::gltf_cache::{ImageId, MimeType, SourceOrigin},
    itertools::Itertools,
    std::collections::BTreeMap,
};

// Scale/bias vectors are interned at 10-bit-per-channel precision purely to
// generate short, stable filename suffixes without embedding float values.
const QUANTIZE_BITS: u32 = 10;
pub(crate) const QUANTIZE_UNITS: i32 = 1 << QUANTIZE_BITS;

pub(crate) const QUANTIZE_SCALE_IDENTITY: [i32; 4] = [QUANTIZE_UNITS; 4];
pub(crate) const QUANTIZE_BIAS_IDENTITY: [i32; 4] = [0; 4];

fn quantize(color: [f32; 4]) -> [i32; 4] {
    color.map(|c| (c * QUANTIZE_UNITS as f32 + 0.5) as i32)
}

/// Interning table for quantized color vectors. The identity maps to `None`
/// (it never produces a suffix); all other distinct quantizations receive
/// ascending ids starting at 0.
#[derive(Debug, Default)]
pub(crate) struct ColorIdMap {
    identity: [i32; 4],
    ids: BTreeMap<[i32; 4], u32>,
}

impl ColorIdMap {
    pub fn new(identity: [i32; 4]) -> Self {
        Self {
            identity,
            ids: BTreeMap::new(),
        }
    }

    pub fn intern(&mut self, color: [f32; 4]) -> Option<u32> {
        let quantized = quantize(color);
        if quantized == self.identity {
            return None;
        }
        let next_id = self.ids.len() as u32;
        Some(*self.ids.entry(quantized).or_insert(next_id))
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Destination base name and MIME type for a source image. URI-backed images
/// use their sanitized relative path; embedded/buffer-backed payloads get a
/// synthetic `bin/image<N>` name.
pub(crate) fn source_name(origin: &SourceOrigin, image_id: ImageId) -> (String, Option<MimeType>) {
    match origin {
        SourceOrigin::Uri { path } => (sanitize_path(path), MimeType::from_path(path)),
        SourceOrigin::Embedded { mime } => (
            format!("bin/image{image_id}{}", mime.map(MimeType::extension).unwrap_or_default()),
            *mime,
        ),
    }
}

// Keep destination names inside the output directory: forward slashes only,
// no empty, ".", or ".." components.
fn sanitize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .join("/")
}

/// Split off a recognized image extension; unrecognized extensions stay part
/// of the base name.
fn split_image_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if MimeType::from_path(name).is_some() => name.split_at(dot),
        _ => (name, ""),
    }
}

/// Assemble the destination name: base, derived suffix, then the canonical
/// extension for the destination type (which also canonicalizes ".jpeg" to
/// ".jpg"). With no destination type the source extension is kept verbatim.
pub(crate) fn derive_name(src_name: &str, suffix: &str, dst_mime: Option<MimeType>) -> String {
    let (base, old_extension) = split_image_extension(src_name);
    match dst_mime {
        Some(mime) => format!("{base}{suffix}{}", mime.extension()),
        None => format!("{base}{suffix}{old_extension}"),
    }
}
