//! Processing arguments and the static per-usage / per-fallback policy
//! tables. The tables are the single source of truth for suffixes, channel
//! limits, and color spaces.

use {
    crate::settings::ImageResizeSettings,
    quantized_image::{ColorSpace, CHANNEL_A, CHANNEL_B, CHANNEL_G, CHANNEL_R},
};

/// Source channels the combined metal/rough/occlusion and spec/gloss
/// textures pack their scalars into.
pub const CHANNEL_OCCLUSION: usize = CHANNEL_R;
pub const CHANNEL_METALLIC: usize = CHANNEL_B;
pub const CHANNEL_ROUGHNESS: usize = CHANNEL_G;
pub const CHANNEL_GLOSSINESS: usize = CHANNEL_A;

/// What the texture is used for; selects the destination suffix, channel
/// policy, and color spaces via [`Usage::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Usage {
    #[default]
    Default,
    Linear,
    DiffToBase,
    Norm,
    Occl,
    Metal,
    Rough,
    Spec,
    SpecToMetal,
    Gloss,
    GlossToRough,
    UnlitA,
}

pub type RelevanceMask = u8;
pub const RELEVANCE_R: RelevanceMask = 1 << CHANNEL_R;
pub const RELEVANCE_G: RelevanceMask = 1 << CHANNEL_G;
pub const RELEVANCE_B: RelevanceMask = 1 << CHANNEL_B;
pub const RELEVANCE_A: RelevanceMask = 1 << CHANNEL_A;
pub const RELEVANCE_RGB: RelevanceMask = RELEVANCE_R | RELEVANCE_G | RELEVANCE_B;
pub const RELEVANCE_RGBA: RelevanceMask = RELEVANCE_RGB | RELEVANCE_A;

#[derive(Debug, Clone, Copy)]
pub struct UsageInfo {
    /// Destination image name suffix.
    pub dst_suffix: &'static str,
    /// Max number of color components in the destination image.
    pub dst_channel_max: u32,
    /// Which source channels are relevant to the output.
    pub relevance_mask: RelevanceMask,
    /// Color space for source and destination RGB components. A is always
    /// linear.
    pub src_rgb_color_space: ColorSpace,
    pub dst_rgb_color_space: ColorSpace,
}

const fn usage_info(
    dst_suffix: &'static str,
    dst_channel_max: u32,
    relevance_mask: RelevanceMask,
    src_rgb_color_space: ColorSpace,
    dst_rgb_color_space: ColorSpace,
) -> UsageInfo {
    UsageInfo {
        dst_suffix,
        dst_channel_max,
        relevance_mask,
        src_rgb_color_space,
        dst_rgb_color_space,
    }
}

use ColorSpace::{Linear, Srgb};

#[rustfmt::skip]
static USAGE_INFOS: [UsageInfo; 12] = [
    usage_info(""        , 4, RELEVANCE_RGBA, Srgb  , Srgb  ), // Default
    usage_info("_lin"    , 4, RELEVANCE_RGBA, Srgb  , Linear), // Linear
    usage_info("_base"   , 4, RELEVANCE_RGBA, Srgb  , Srgb  ), // DiffToBase
    usage_info(""        , 3, RELEVANCE_RGB , Linear, Linear), // Norm
    usage_info("_occl"   , 1, RELEVANCE_R   , Linear, Linear), // Occl
    usage_info("_metal"  , 1, RELEVANCE_B   , Linear, Linear), // Metal
    usage_info("_rough"  , 1, RELEVANCE_G   , Linear, Linear), // Rough
    usage_info("_spec"   , 3, RELEVANCE_RGB , Srgb  , Srgb  ), // Spec
    usage_info("_metal"  , 3, RELEVANCE_RGB , Srgb  , Linear), // SpecToMetal
    usage_info("_gloss"  , 1, RELEVANCE_A   , Linear, Linear), // Gloss
    usage_info("_rough"  , 1, RELEVANCE_A   , Linear, Linear), // GlossToRough
    usage_info("_unlit_a", 4, RELEVANCE_A   , Srgb  , Srgb  ), // UnlitA
];

impl Usage {
    pub fn info(self) -> &'static UsageInfo {
        &USAGE_INFOS[self as usize]
    }
}

/// Alpha blending mode declared by the source material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

/// Constant-color stand-in substituted when a source image is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Fallback {
    #[default]
    Black,
    Magenta,
    R0,
    R1,
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackInfo {
    pub name: &'static str,
    pub r_only: bool,
    pub color: [u8; 3],
}

#[rustfmt::skip]
static FALLBACK_INFOS: [FallbackInfo; 4] = [
    FallbackInfo { name: "fallback_black.png"  , r_only: false, color: [  0,   0,   0] }, // Black
    FallbackInfo { name: "fallback_magenta.png", r_only: false, color: [255,   0, 255] }, // Magenta
    FallbackInfo { name: "fallback_r0.png"     , r_only: true , color: [  0,   0,   0] }, // R0
    FallbackInfo { name: "fallback_r1.png"     , r_only: true , color: [255, 255, 255] }, // R1
];

impl Fallback {
    pub fn info(self) -> &'static FallbackInfo {
        &FALLBACK_INFOS[self as usize]
    }
}

/// Requested transform for one material-texture reference. Two references
/// with equal quantized arguments map to the same destination image.
#[derive(Debug, Clone, PartialEq, derivative::Derivative)]
#[derivative(Default)]
pub struct Args {
    pub usage: Usage,
    #[derivative(Default(value = "[1.0; 4]"))]
    pub scale: [f32; 4],
    pub bias: [f32; 4],
    pub alpha_mode: AlphaMode,
    #[derivative(Default(value = "0.5"))]
    pub alpha_cutoff: f32,
    pub fallback: Fallback,
    /// Scalar material opacity carried alongside the texture when alpha
    /// baking moves a constant factor out of the texture.
    #[derivative(Default(value = "1.0"))]
    pub opacity: f32,
    pub resize: ImageResizeSettings,
}

#[cfg(test)]
mod tests {
    use {super::*, pretty_assertions::assert_eq};

    #[test_log::test]
    fn usage_table_rows_match_their_usages() {
        assert_eq!(Usage::Default.info().dst_suffix, "");
        assert_eq!(Usage::Linear.info().dst_suffix, "_lin");
        assert_eq!(Usage::Norm.info().dst_channel_max, 3);
        assert_eq!(Usage::Occl.info().dst_channel_max, 1);
        assert_eq!(Usage::Occl.info().relevance_mask, RELEVANCE_R);
        assert_eq!(Usage::Metal.info().relevance_mask, RELEVANCE_B);
        assert_eq!(Usage::GlossToRough.info().dst_suffix, "_rough");
        assert_eq!(Usage::SpecToMetal.info().src_rgb_color_space, ColorSpace::Srgb);
        assert_eq!(Usage::SpecToMetal.info().dst_rgb_color_space, ColorSpace::Linear);
        assert_eq!(Usage::UnlitA.info().dst_suffix, "_unlit_a");
    }

    #[test_log::test]
    fn default_args_are_the_identity_transform() {
        let args = Args::default();
        assert_eq!(args.scale, [1.0; 4]);
        assert_eq!(args.bias, [0.0; 4]);
        assert_eq!(args.alpha_cutoff, 0.5);
        assert_eq!(args.opacity, 1.0);
        assert!(args.resize.is_default());
    }
}
