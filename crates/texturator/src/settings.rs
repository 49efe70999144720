use {
    anyhow::{Context, Result},
    quantized_image::EncodeSettings,
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
    tap::prelude::*,
    tracing::{debug, info, warn},
};

/// Per-texture resize controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, derivative::Derivative)]
#[derivative(Default)]
#[serde(deny_unknown_fields)]
pub struct ImageResizeSettings {
    pub force_power_of_2: bool,
    #[derivative(Default(value = "1.0"))]
    pub scale: f32,
    #[derivative(Default(value = "ImageResizeSettings::DEFAULT_SIZE_MIN"))]
    pub size_min: u32,
    #[derivative(Default(value = "ImageResizeSettings::DEFAULT_SIZE_MAX"))]
    pub size_max: u32,
}

impl ImageResizeSettings {
    pub const DEFAULT_SIZE_MIN: u32 = 1;
    pub const DEFAULT_SIZE_MAX: u32 = 16 * 1024;

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Options recognized by the texture pipeline. Workaround flags default to
/// the iOS-viewer-friendly values.
#[derive(Debug, Clone, Serialize, Deserialize, derivative::Derivative)]
#[derivative(Default)]
#[serde(deny_unknown_fields)]
pub struct ConvertSettings {
    /// Bake material color scale/bias into textures (and emit `_scale<n>` /
    /// `_bias<n>` suffixes) instead of passing them to the shader.
    #[derivative(Default(value = "true"))]
    pub bake_texture_color_scale_bias: bool,

    /// Bake alpha cutoff into the alpha channel.
    #[derivative(Default(value = "true"))]
    pub bake_alpha_cutoff: bool,

    /// Detect and renormalize non-unit normal map vectors.
    #[derivative(Default(value = "true"))]
    pub normalize_normals: bool,

    /// Output emissive textures in linear space.
    #[derivative(Default(value = "true"))]
    pub emissive_is_linear: bool,

    /// Convert specular/glossiness materials to metallic/roughness.
    #[derivative(Default(value = "true"))]
    pub emulate_specular_workflow: bool,

    /// Ignore border pixels when classifying 4-channel content, so editor
    /// re-save artifacts don't flip an opaque texture to translucent.
    #[derivative(Default(value = "true"))]
    pub fix_accidental_alpha: bool,

    /// Replace all-zero occlusion with all-one.
    #[derivative(Default(value = "true"))]
    pub black_occlusion_is_white: bool,

    /// Prefer JPEG output whenever the effective alpha permits it.
    #[derivative(Default(value = "true"))]
    pub prefer_jpeg: bool,

    /// JPEG quality [1=worst, 100=best].
    #[derivative(Default(value = "85"))]
    pub jpg_quality: u8,

    /// JPEG quality for normal maps; these are more sensitive to compression
    /// error, so this should usually exceed `jpg_quality`.
    #[derivative(Default(value = "96"))]
    pub jpg_quality_norm: u8,

    /// JPEG chroma subsampling: 0 → 4:4:4, 1 → 4:2:2, 2 → 4:2:0. Grayscale
    /// and normal-map writes never subsample.
    pub jpg_subsamp: u8,

    /// PNG compression level [0=fastest, 9=smallest].
    #[derivative(Default(value = "9"))]
    pub png_level: u8,

    /// Explicit per-texture resize settings.
    pub image_resize: ImageResizeSettings,

    /// Limit on the total decompressed size of all output images, in bytes.
    /// When exceeded, images are uniformly scaled down until the estimate
    /// fits. 0 disables the limit.
    #[derivative(Default(value = "160 * 1024 * 1024"))]
    pub limit_total_image_decompressed_size: u64,

    /// Per-axis scale decrement used while searching for a fitting total.
    /// 0.5 preserves power-of-2 sizes; smaller steps fit the limit more
    /// tightly. Capped at 0.5.
    #[derivative(Default(value = "0.5"))]
    pub limit_total_image_scale_step: f32,
}

pub static SETTINGS_FILE_NAME: &str = "texturator.yaml";

impl ConvertSettings {
    pub fn read(path: &Path) -> Result<(PathBuf, Self)> {
        path.exists()
            .then(|| path.to_owned())
            .with_context(|| format!("settings path [{}] does not exist", path.display()))
            .tap_ok(|settings| info!("found settings at '{}'", settings.display()))
            .and_then(|settings_path| {
                std::fs::read_to_string(&settings_path)
                    .context("reading file")
                    .and_then(|settings| serde_yaml::from_str::<Self>(&settings).context("parsing settings file"))
                    .map(|settings| (settings_path, settings))
            })
            .with_context(|| format!("getting [{SETTINGS_FILE_NAME}]"))
            .tap_err(|e| warn!("{e:?}"))
            .tap_ok(|settings| {
                debug!("{settings:?}");
            })
    }

    pub fn write_default() -> Result<String> {
        Self::default()
            .pipe_ref(serde_yaml::to_string)
            .context("serialization failed")
            .map(|settings| format!("\n# default {SETTINGS_FILE_NAME} file, edit it according to your needs:\n{settings}"))
    }

    /// Encoder knobs for one write; normal maps take the higher JPEG quality
    /// and no chroma subsampling.
    pub fn encode_settings(&self, is_norm: bool) -> EncodeSettings {
        EncodeSettings {
            png_level: self.png_level.min(9),
            jpg_quality: if is_norm { self.jpg_quality_norm } else { self.jpg_quality }.clamp(1, 100),
            jpg_subsamp: if is_norm { 0 } else { self.jpg_subsamp.min(2) },
        }
    }

    /// Budget-solver step, capped at 0.5 and guarded against nonsense input.
    pub(crate) fn scale_step(&self) -> f32 {
        if self.limit_total_image_scale_step <= 0.0 {
            0.5
        } else {
            self.limit_total_image_scale_step.min(0.5)
        }
    }
}
