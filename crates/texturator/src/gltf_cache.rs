//! Interface to the host-owned glTF image cache: the pipeline reads source
//! payloads through it and asks it for path-identity facts (stomp
//! protection, redundant-copy detection). Names are UTF-8 filesystem paths.

use {
    crate::utils::PathIdentityExt,
    anyhow::{Context, Result},
    std::{
        borrow::Cow,
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
};

/// Opaque stable identifier assigned to a source image by the glTF loader.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::Constructor,
)]
pub struct ImageId(pub usize);

/// Image MIME types the pipeline distinguishes; anything else is decoded by
/// the fallback reader and re-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeType {
    Png,
    Jpeg,
    Gif,
}

impl MimeType {
    /// Canonical extension. Some downstream tooling recognizes ".jpg" but
    /// not ".jpeg", so JPEG always canonicalizes to ".jpg".
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => ".png",
            Self::Jpeg => ".jpg",
            Self::Gif => ".gif",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let extension = path.rsplit('.').next()?;
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

/// How the glTF document references a source image; this determines the
/// destination base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    /// External file referenced by a (relative) URI.
    Uri { path: String },
    /// Buffer-view- or data-URI-backed payload with no filename of its own.
    Embedded { mime: Option<MimeType> },
}

/// Read-only operations the pipeline needs from the glTF image cache. The
/// host owns the cache; the pipeline never writes through it.
pub trait GltfImageCache {
    /// Reference facts for name derivation, or `None` when the glTF has no
    /// such image record.
    fn origin(&self, image: ImageId) -> Option<SourceOrigin>;

    /// Raw payload plus declared MIME type (the decoder sniffs headers and
    /// treats the MIME as a hint only).
    fn get_image(&self, image: ImageId) -> Option<(Cow<'_, [u8]>, Option<MimeType>)>;

    fn image_exists(&self, image: ImageId) -> bool;

    /// Copy the raw payload to `dst` (used for pass-free direct copies).
    fn copy_image(&self, image: ImageId, dst: &Path) -> Result<()>;

    /// Whether `path` is one of the conversion's own source files (writing
    /// there would stomp an input).
    fn is_source_path(&self, path: &Path) -> bool;

    /// Whether the image already resides at `dir`/`name`, making a copy
    /// redundant.
    fn is_image_at_path(&self, image: ImageId, dir: &Path, name: &str) -> bool;
}

#[derive(Debug, Clone)]
struct MemImage {
    origin: SourceOrigin,
    bytes: Vec<u8>,
    mime: Option<MimeType>,
}

/// In-memory cache implementation, primarily for tests and small embedded
/// conversions.
#[derive(Debug, Default)]
pub struct MemImageCache {
    images: BTreeMap<ImageId, MemImage>,
}

impl MemImageCache {
    pub fn insert_uri(&mut self, image: ImageId, path: impl Into<String>, bytes: Vec<u8>) -> &mut Self {
        let path = path.into();
        let mime = MimeType::from_path(&path);
        self.images.insert(
            image,
            MemImage {
                origin: SourceOrigin::Uri { path },
                bytes,
                mime,
            },
        );
        self
    }

    pub fn insert_embedded(&mut self, image: ImageId, mime: Option<MimeType>, bytes: Vec<u8>) -> &mut Self {
        self.images.insert(
            image,
            MemImage {
                origin: SourceOrigin::Embedded { mime },
                bytes,
                mime,
            },
        );
        self
    }
}

impl GltfImageCache for MemImageCache {
    fn origin(&self, image: ImageId) -> Option<SourceOrigin> {
        self.images.get(&image).map(|entry| entry.origin.clone())
    }

    fn get_image(&self, image: ImageId) -> Option<(Cow<'_, [u8]>, Option<MimeType>)> {
        self.images
            .get(&image)
            .map(|entry| (Cow::Borrowed(entry.bytes.as_slice()), entry.mime))
    }

    fn image_exists(&self, image: ImageId) -> bool {
        self.images.contains_key(&image)
    }

    fn copy_image(&self, image: ImageId, dst: &Path) -> Result<()> {
        self.images
            .get(&image)
            .with_context(|| format!("no payload for image [{image}]"))
            .and_then(|entry| {
                std::fs::write(dst, &entry.bytes).with_context(|| format!("copying image [{image}] to [{}]", dst.display()))
            })
    }

    fn is_source_path(&self, _path: &Path) -> bool {
        false
    }

    fn is_image_at_path(&self, _image: ImageId, _dir: &Path, _name: &str) -> bool {
        false
    }
}

/// Directory-backed variant used when sources live next to the glTF file.
#[derive(Debug)]
pub struct DirImageCache {
    root: PathBuf,
    images: BTreeMap<ImageId, String>,
}

impl DirImageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            images: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, image: ImageId, relative_path: impl Into<String>) -> &mut Self {
        self.images.insert(image, relative_path.into());
        self
    }

    fn full_path(&self, image: ImageId) -> Option<PathBuf> {
        self.images.get(&image).map(|relative| self.root.join(relative))
    }
}

impl GltfImageCache for DirImageCache {
    fn origin(&self, image: ImageId) -> Option<SourceOrigin> {
        self.images.get(&image).map(|path| SourceOrigin::Uri { path: path.clone() })
    }

    fn get_image(&self, image: ImageId) -> Option<(Cow<'_, [u8]>, Option<MimeType>)> {
        let relative = self.images.get(&image)?;
        std::fs::read(self.root.join(relative))
            .ok()
            .map(|bytes| (Cow::Owned(bytes), MimeType::from_path(relative)))
    }

    fn image_exists(&self, image: ImageId) -> bool {
        self.full_path(image).is_some_and(|path| path.exists())
    }

    fn copy_image(&self, image: ImageId, dst: &Path) -> Result<()> {
        self.full_path(image)
            .with_context(|| format!("no path for image [{image}]"))
            .and_then(|src| {
                std::fs::copy(&src, dst)
                    .map(drop)
                    .with_context(|| format!("copying [{}] to [{}]", src.display(), dst.display()))
            })
    }

    fn is_source_path(&self, path: &Path) -> bool {
        self.images
            .values()
            .any(|relative| self.root.join(relative).is_same_file_as(path))
    }

    fn is_image_at_path(&self, image: ImageId, dir: &Path, name: &str) -> bool {
        self.full_path(image)
            .is_some_and(|src| src.is_same_file_as(&dir.join(name)))
    }
}
