//! Job execution: applies the planned passes to produce output pixels and
//! writes the files. Runs strictly after the budget pass, in job insertion
//! order.

use {
    crate::{
        args::{Args, Usage, CHANNEL_GLOSSINESS, CHANNEL_METALLIC, CHANNEL_OCCLUSION, CHANNEL_ROUGHNESS},
        gltf_cache::{GltfImageCache, ImageId},
        jobs::{Job, Op},
        passes::PassMask,
        settings::ConvertSettings,
        sources::Source,
    },
    quantized_image::{float_to_component, ColorSpace, FloatImage, Image, Transform, CHANNEL_R, COMPONENT_MAX},
    std::collections::BTreeMap,
    tracing::error,
};

// Resizing weights colors by opacity so fully transparent pixels do not
// contribute unweighted color.
const RESIZE_PREMUL_ALPHA: bool = true;

pub(crate) fn process_job(
    cache: &impl GltfImageCache,
    settings: &ConvertSettings,
    sources: &BTreeMap<ImageId, Source>,
    job: &Job,
) {
    match job {
        Job::Add(op) => process_add(cache, settings, sources, op),
        Job::AddSpecToMetal { spec, diff } => process_spec_to_metal(settings, sources, spec, diff),
    }
}

fn source_image<'a>(sources: &'a BTreeMap<ImageId, Source>, op: &Op) -> Option<&'a Image> {
    sources.get(&op.image_id).and_then(|source| source.image.as_ref())
}

fn process_add(cache: &impl GltfImageCache, settings: &ConvertSettings, sources: &BTreeMap<ImageId, Source>, op: &Op) {
    // A pass-free op with an unchanged payload type copies bytes as-is.
    if op.direct_copy {
        debug_assert!(op.pass_mask.is_empty());
        if op.need_copy {
            if let Err(error) = cache.copy_image(op.image_id, &op.dst_path) {
                error!("{error:#}");
            }
        }
        return;
    }

    let Some(src_image) = source_image(sources, op) else {
        return;
    };
    let args = &op.args;
    let mut image = copy_image_by_usage(src_image, args.usage, op.pass_mask);
    if op.pass_mask.intersects(PassMask::FLOAT) {
        let usage_info = args.usage.info();
        let mut float_image = FloatImage::from_image(&image, usage_info.src_rgb_color_space);
        apply_float_passes(args, op.pass_mask, op.resize_width, op.resize_height, &mut float_image);
        image = float_image.to_image(usage_info.dst_rgb_color_space);
    }
    if op.pass_mask.contains(PassMask::NORMALIZE_NORMALS) {
        image.normalize_normals();
    }
    if args.usage == Usage::GlossToRough {
        image.invert();
    }
    if op.pass_mask.contains(PassMask::ALPHA_CUTOFF) {
        image.apply_alpha_cutoff(float_to_component(args.alpha_cutoff));
    }

    let is_norm = args.usage == Usage::Norm;
    if !is_norm {
        image = collapse_if_solid(image, settings, args.usage);
    }

    write_image(&image, op, settings, is_norm);
}

fn process_spec_to_metal(settings: &ConvertSettings, sources: &BTreeMap<ImageId, Source>, spec_op: &Op, diff_op: &Op) {
    // A constant side had its image id repointed at the partner during
    // planning, so both lookups resolve to decoded pixels.
    let (Some(spec_src), Some(diff_src)) = (source_image(sources, spec_op), source_image(sources, diff_op)) else {
        return;
    };

    // Specular color in transformed linear space.
    let spec_image = if spec_op.is_constant {
        white_image_by_usage(spec_src, spec_op.args.usage)
    } else {
        copy_image_by_usage(spec_src, spec_op.args.usage, spec_op.pass_mask)
    };
    let mut spec_float = FloatImage::from_image(&spec_image, ColorSpace::Srgb);
    apply_float_passes(
        &spec_op.args,
        spec_op.pass_mask,
        spec_op.resize_width,
        spec_op.resize_height,
        &mut spec_float,
    );

    // Diffuse color in transformed linear space.
    let diff_image = if diff_op.is_constant {
        white_image_by_usage(diff_src, diff_op.args.usage)
    } else {
        copy_image_by_usage(diff_src, diff_op.args.usage, diff_op.pass_mask)
    };
    let mut diff_float = FloatImage::from_image(&diff_image, ColorSpace::Srgb);
    apply_float_passes(
        &diff_op.args,
        diff_op.pass_mask,
        diff_op.resize_width,
        diff_op.resize_height,
        &mut diff_float,
    );

    // Specular+diffuse → metallic+base.
    let metal_float = FloatImage::spec_diff_to_metal_base(&spec_float, &mut diff_float);

    if spec_op.is_new {
        debug_assert!(!spec_op.direct_copy);
        // Metallic is stored linear per the glTF material model.
        let mut metal_image = metal_float.to_image(ColorSpace::Linear);
        if let Some(solid) = metal_image.channels_solid(settings.fix_accidental_alpha) {
            metal_image = Image::solid_1x1(&solid[..1]);
        }
        if !write_image(&metal_image, spec_op, settings, false) {
            return;
        }
    }

    if diff_op.is_new {
        debug_assert!(!diff_op.direct_copy);
        let mut base_image = diff_float.to_image(ColorSpace::Srgb);
        if diff_op.pass_mask.contains(PassMask::ALPHA_CUTOFF) {
            base_image.apply_alpha_cutoff(float_to_component(diff_op.args.alpha_cutoff));
        }
        if let Some(solid) = base_image.channels_solid(settings.fix_accidental_alpha) {
            base_image = Image::solid_1x1(&solid[..base_image.channel_count() as usize]);
        }
        write_image(&base_image, diff_op, settings, false);
    }
}

/// Build the quantized working image for an op: single-channel usages
/// extract their packed channel, spec/diff usages keep RGB only, unlit
/// opacity masks to alpha, and the plain color usages honor the
/// remove/add-alpha bits.
fn copy_image_by_usage(src: &Image, usage: Usage, pass_mask: PassMask) -> Image {
    // Gray sources collapse the packed-channel selectors onto R.
    let channel = |wanted: usize| wanted.min(src.channel_count() as usize - 1);
    match usage {
        Usage::DiffToBase | Usage::Spec | Usage::SpecToMetal => Image::from_rgb(src),
        Usage::Occl => Image::from_channel(src, channel(CHANNEL_OCCLUSION), Transform::None),
        Usage::Metal => Image::from_channel(src, channel(CHANNEL_METALLIC), Transform::None),
        Usage::Rough => Image::from_channel(src, channel(CHANNEL_ROUGHNESS), Transform::None),
        Usage::Gloss | Usage::GlossToRough => Image::from_channel(src, channel(CHANNEL_GLOSSINESS), Transform::None),
        Usage::UnlitA => Image::from_masked(src, [0, 0, 0, 0xff], [0, 0, 0, 0]),
        Usage::Default | Usage::Linear | Usage::Norm => {
            if pass_mask.contains(PassMask::REMOVE_ALPHA) {
                Image::from_rgb(src)
            } else if pass_mask.contains(PassMask::ADD_ALPHA) {
                Image::from_rgba(src, COMPONENT_MAX)
            } else {
                src.clone()
            }
        }
    }
}

/// White stand-in for the constant side of a spec/diff pair, sized from the
/// partner image.
fn white_image_by_usage(partner: &Image, usage: Usage) -> Image {
    let channel_count = partner.channel_count().min(usage.info().dst_channel_max) as usize;
    Image::solid_wxh(partner.width(), partner.height(), &[COMPONENT_MAX; 4], channel_count)
}

fn apply_float_passes(args: &Args, pass_mask: PassMask, width: u32, height: u32, image: &mut FloatImage) {
    if pass_mask.contains(PassMask::SCALE_BIAS) {
        if args.usage == Usage::Norm {
            image.scale_bias_normals(args.scale, args.bias);
        } else {
            image.scale_bias(args.scale, args.bias);
        }
    }
    if pass_mask.contains(PassMask::RESIZE) {
        image.resize(width, height, RESIZE_PREMUL_ALPHA);
    }
}

/// Shrink solid textures to 1×1 to save space, substituting white for
/// all-zero occlusion when configured.
fn collapse_if_solid(image: Image, settings: &ConvertSettings, usage: Usage) -> Image {
    match image.channels_solid(settings.fix_accidental_alpha) {
        Some(mut solid) => {
            if settings.black_occlusion_is_white && usage == Usage::Occl && solid[CHANNEL_R] == 0 {
                solid[CHANNEL_R] = COMPONENT_MAX;
            }
            Image::solid_1x1(&solid[..image.channel_count() as usize])
        }
        None => image,
    }
}

fn write_image(image: &Image, op: &Op, settings: &ConvertSettings, is_norm: bool) -> bool {
    image
        .write(&op.dst_path, &settings.encode_settings(is_norm))
        .map_err(|error| error!("{error:#}"))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use {super::*, pretty_assertions::assert_eq};

    fn rgba(width: u32, height: u32, pixels: &[[u8; 4]]) -> Image {
        Image::from_float(
            &pixels
                .iter()
                .flatten()
                .map(|&c| c as f32 / 255.0)
                .collect::<Vec<_>>(),
            width,
            height,
            4,
            false,
        )
    }

    #[test_log::test]
    fn usage_selects_the_working_channels() {
        let src = rgba(1, 1, &[[10, 20, 30, 40]]);
        assert_eq!(copy_image_by_usage(&src, Usage::Occl, PassMask::EMPTY).data(), &[10]);
        assert_eq!(copy_image_by_usage(&src, Usage::Rough, PassMask::EMPTY).data(), &[20]);
        assert_eq!(copy_image_by_usage(&src, Usage::Metal, PassMask::EMPTY).data(), &[30]);
        assert_eq!(copy_image_by_usage(&src, Usage::Gloss, PassMask::EMPTY).data(), &[40]);
        assert_eq!(copy_image_by_usage(&src, Usage::SpecToMetal, PassMask::EMPTY).data(), &[10, 20, 30]);
        assert_eq!(copy_image_by_usage(&src, Usage::UnlitA, PassMask::EMPTY).data(), &[0, 0, 0, 40]);
    }

    #[test_log::test]
    fn alpha_bits_govern_the_default_usage_copy() {
        let src = rgba(1, 1, &[[1, 2, 3, 4]]);
        assert_eq!(
            copy_image_by_usage(&src, Usage::Default, PassMask::REMOVE_ALPHA).data(),
            &[1, 2, 3]
        );
        assert_eq!(copy_image_by_usage(&src, Usage::Default, PassMask::EMPTY).data(), &[1, 2, 3, 4]);
        let rgb = copy_image_by_usage(&src, Usage::Default, PassMask::REMOVE_ALPHA);
        assert_eq!(
            copy_image_by_usage(&rgb, Usage::Default, PassMask::ADD_ALPHA).data(),
            &[1, 2, 3, 255]
        );
    }

    #[test_log::test]
    fn white_stand_in_inherits_partner_shape() {
        let partner = rgba(2, 3, &[[0, 0, 0, 0]; 6]);
        let white = white_image_by_usage(&partner, Usage::SpecToMetal);
        assert_eq!((white.width(), white.height()), (2, 3));
        assert_eq!(white.channel_count(), 3);
        assert!(white.data().iter().all(|&c| c == COMPONENT_MAX));
    }

    #[test_log::test]
    fn solid_collapse_substitutes_white_occlusion() {
        let settings = ConvertSettings::default();
        let black = Image::solid_wxh(8, 8, &[0], 1);
        let collapsed = collapse_if_solid(black, &settings, Usage::Occl);
        assert_eq!((collapsed.width(), collapsed.height()), (1, 1));
        assert_eq!(collapsed.data(), &[COMPONENT_MAX]);

        let varying = Image::from_channel(&rgba(2, 1, &[[0; 4], [9, 0, 0, 0]]), CHANNEL_R, Transform::None);
        let kept = collapse_if_solid(varying.clone(), &settings, Usage::Occl);
        assert_eq!(kept, varying);
    }
}
