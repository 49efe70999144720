//! Source registry entries: lazily decoded pixels plus caches for content
//! classification and normal-map normalization status. Every source image
//! decodes at most once per pipeline instance.

use {
    crate::gltf_cache::{GltfImageCache, ImageId, MimeType},
    quantized_image::{Content, Image, CHANNEL_COUNT},
    tracing::error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum LoadState {
    #[default]
    New,
    Loaded,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum NormalContent {
    #[default]
    Unknown,
    Normalized,
    NonNormalized,
}

// Maximum normalization error in squared fixed-point units; the effective
// linear tolerance is sqrt(ERR_SQ_TOL/ONE)/ONE ≈ 0.008.
const NORMAL_ONE: i32 = 255;
const NORMAL_ERR_SQ_TOL: i32 = 4 * NORMAL_ONE;

#[derive(Debug, Default)]
pub(crate) struct Source {
    pub name: String,
    pub mime: Option<MimeType>,
    pub state: LoadState,
    pub image: Option<Image>,
    contents: Option<([Content; CHANNEL_COUNT], [u8; CHANNEL_COUNT])>,
    normal_content: NormalContent,
}

impl Source {
    pub fn new(name: String, mime: Option<MimeType>) -> Self {
        Self {
            name,
            mime,
            ..Default::default()
        }
    }

    /// Decode the payload on first access; `New → Loaded` or `New → Missing`.
    pub fn load(&mut self, image_id: ImageId, cache: &impl GltfImageCache) {
        if self.state != LoadState::New {
            return;
        }
        let Some((bytes, _mime)) = cache.get_image(image_id) else {
            self.state = LoadState::Missing;
            return;
        };
        match Image::read(&bytes, &self.name) {
            Ok(image) => {
                self.image = Some(image);
                self.state = LoadState::Loaded;
            }
            Err(error) => {
                error!("{error:#}");
                self.state = LoadState::Missing;
            }
        }
    }

    fn ensure_contents(&mut self, image_id: ImageId, cache: &impl GltfImageCache, fix_accidental_alpha: bool) {
        self.load(image_id, cache);
        if self.contents.is_none() {
            if let Some(image) = &self.image {
                self.contents = Some(image.contents(fix_accidental_alpha));
            }
        }
    }

    /// Cached channel classification; a missing image classifies as
    /// `Varying` (neither solid nor binary, so no pass is skipped on its
    /// account).
    pub fn content(
        &mut self,
        channel: usize,
        image_id: ImageId,
        cache: &impl GltfImageCache,
        fix_accidental_alpha: bool,
    ) -> Content {
        self.ensure_contents(image_id, cache, fix_accidental_alpha);
        self.contents
            .map(|(content, _)| content[channel])
            .unwrap_or(Content::Varying)
    }

    /// The cached solid color, valid per-channel wherever the channel's
    /// content classifies as solid.
    pub fn solid_color(
        &mut self,
        image_id: ImageId,
        cache: &impl GltfImageCache,
        fix_accidental_alpha: bool,
    ) -> Option<([Content; CHANNEL_COUNT], [u8; CHANNEL_COUNT])> {
        self.ensure_contents(image_id, cache, fix_accidental_alpha);
        self.contents
    }

    /// Whether the normal map needs a renormalization pass. Scans every
    /// pixel in fixed point and rejects as soon as `|x²+y²+z² − 1|` exceeds
    /// the tolerance; the verdict is cached.
    pub fn needs_normalization(&mut self, image_id: ImageId, cache: &impl GltfImageCache) -> bool {
        self.load(image_id, cache);
        match self.normal_content {
            NormalContent::Normalized => false,
            NormalContent::NonNormalized => true,
            NormalContent::Unknown => {
                let verdict = self.scan_normals();
                self.normal_content = if verdict {
                    NormalContent::NonNormalized
                } else {
                    NormalContent::Normalized
                };
                verdict
            }
        }
    }

    fn scan_normals(&self) -> bool {
        let Some(image) = &self.image else {
            return false;
        };
        let channel_count = image.channel_count() as usize;
        assert!(channel_count >= 3);
        for pixel in image.data().chunks_exact(channel_count) {
            let x = 2 * pixel[0] as i32 - NORMAL_ONE;
            let y = 2 * pixel[1] as i32 - NORMAL_ONE;
            let z = 2 * pixel[2] as i32 - NORMAL_ONE;
            let m_sq = x * x + y * y + z * z;
            if (m_sq - NORMAL_ONE * NORMAL_ONE).abs() > NORMAL_ERR_SQ_TOL {
                return true;
            }
        }
        false
    }
}
