//! The pipeline façade: owns the source/destination registries, the
//! scale/bias interning maps, and the job list; drives planning and the
//! single finalization pass.

use {
    crate::{
        args::{AlphaMode, Args, Fallback, Usage},
        budget::{self, EstimateInput},
        destinations::{self, ColorIdMap, QUANTIZE_BIAS_IDENTITY, QUANTIZE_SCALE_IDENTITY},
        executor,
        gltf_cache::{GltfImageCache, ImageId, MimeType},
        jobs::{Job, Op},
        passes::PassMask,
        settings::{ConvertSettings, ImageResizeSettings},
        sources::{LoadState, Source},
        utils::create_dir_for_file,
    },
    indexmap::IndexSet,
    quantized_image::{
        color::COLOR_TOL, component_to_float, float_to_component, Content, Image, CHANNEL_A, COMPONENT_MAX,
    },
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
    tracing::{error, instrument, warn},
};

/// Two-phase texture conversion pipeline. Planning (`add`,
/// `add_spec_to_metal`) returns shader-graph-ready filenames immediately;
/// execution (`end`) fits the size budget and writes the files.
pub struct Texturator<'a, C> {
    cache: &'a C,
    settings: &'a ConvertSettings,
    dst_dir: PathBuf,
    sources: BTreeMap<ImageId, Source>,
    dsts: IndexSet<String>,
    scale_ids: ColorIdMap,
    bias_ids: ColorIdMap,
    jobs: Vec<Job>,
    written: Vec<PathBuf>,
    created_dirs: Vec<PathBuf>,
}

impl<'a, C: GltfImageCache> Texturator<'a, C> {
    pub fn new(cache: &'a C, settings: &'a ConvertSettings, dst_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            settings,
            dst_dir: dst_dir.into(),
            sources: BTreeMap::new(),
            dsts: IndexSet::new(),
            scale_ids: ColorIdMap::new(QUANTIZE_SCALE_IDENTITY),
            bias_ids: ColorIdMap::new(QUANTIZE_BIAS_IDENTITY),
            jobs: Vec::new(),
            written: Vec::new(),
            created_dirs: Vec::new(),
        }
    }

    /// Drop all per-conversion state, keeping the cache and settings.
    pub fn clear(&mut self) {
        self.sources.clear();
        self.dsts.clear();
        self.scale_ids.clear();
        self.bias_ids.clear();
        self.jobs.clear();
        self.written.clear();
        self.created_dirs.clear();
    }

    /// Destination paths prepared for writing, in planning order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Directories created for outputs, for potential cleanup by the host.
    pub fn created_dirs(&self) -> &[PathBuf] {
        &self.created_dirs
    }

    /// Plan one texture conversion and return its stable output filename.
    /// A missing or undecodable source returns the [`Args::fallback`] name
    /// instead; the caller can use either immediately.
    #[instrument(level = "debug", skip(self, args), fields(usage = ?args.usage))]
    pub fn add(&mut self, image_id: ImageId, args: &Args) -> String {
        let mut op = Op::new(image_id, args.clone());
        let Some(dst_name) = self.add_dst(image_id, args, &mut op) else {
            return self.add_fallback(args.fallback);
        };
        if op.is_new {
            self.jobs.push(Job::Add(op));
        }
        dst_name
    }

    /// Plan a specular+diffuse → metallic+base pair, returning
    /// `(metal_name, base_name)`. If one source is absent its op derives
    /// from the other source and the executor substitutes a white image of
    /// that partner's size; if both are absent, both names fall back.
    #[instrument(level = "debug", skip(self, spec_args, diff_args))]
    pub fn add_spec_to_metal(
        &mut self,
        spec_image_id: ImageId,
        spec_args: &Args,
        diff_image_id: ImageId,
        diff_args: &Args,
    ) -> (String, String) {
        debug_assert_eq!(spec_args.usage, Usage::SpecToMetal);
        debug_assert_eq!(diff_args.usage, Usage::DiffToBase);

        let mut spec_op = Op::new(spec_image_id, spec_args.clone());
        let mut diff_op = Op::new(diff_image_id, diff_args.clone());
        let mut spec_dst = self.add_dst(spec_image_id, spec_args, &mut spec_op);
        let mut diff_dst = self.add_dst(diff_image_id, diff_args, &mut diff_op);
        if spec_dst.is_none() && diff_dst.is_none() {
            return (self.add_fallback(spec_args.fallback), self.add_fallback(diff_args.fallback));
        }

        // If either source is absent, derive that side's name (and pixels)
        // from the other source.
        spec_op.is_constant = spec_dst.is_none();
        if spec_op.is_constant {
            spec_dst = self.add_dst(diff_image_id, spec_args, &mut spec_op);
        }
        diff_op.is_constant = diff_dst.is_none();
        if diff_op.is_constant {
            diff_dst = self.add_dst(spec_image_id, diff_args, &mut diff_op);
        }
        let (Some(spec_dst), Some(diff_dst)) = (spec_dst, diff_dst) else {
            return (self.add_fallback(spec_args.fallback), self.add_fallback(diff_args.fallback));
        };

        if spec_op.is_new || diff_op.is_new {
            self.jobs.push(Job::AddSpecToMetal {
                spec: spec_op,
                diff: diff_op,
            });
        }
        (spec_dst, diff_dst)
    }

    /// The constant alpha value of a source, if its alpha channel is solid.
    /// An image id with no glTF record reads as opaque.
    pub fn solid_alpha(&mut self, image_id: ImageId) -> Option<u8> {
        let cache = self.cache;
        let fix_accidental_alpha = self.settings.fix_accidental_alpha;
        match self.find_or_add_src(image_id) {
            None => Some(COMPONENT_MAX),
            Some(src) => src
                .solid_color(image_id, cache, fix_accidental_alpha)
                .filter(|(content, _)| content[CHANNEL_A].is_solid())
                .map(|(_, solid)| solid[CHANNEL_A]),
        }
    }

    /// Whether `solid_alpha·scale + bias` is within tolerance of fully
    /// opaque. Varying alpha is never opaque.
    pub fn is_alpha_opaque(&mut self, image_id: ImageId, scale: f32, bias: f32) -> bool {
        self.solid_alpha(image_id)
            .map(|alpha| component_to_float(alpha) * scale + bias >= 1.0 - COLOR_TOL)
            .unwrap_or(false)
    }

    /// Symmetric lower test; used to drop invisible geometry upstream.
    pub fn is_alpha_fully_transparent(&mut self, image_id: ImageId, scale: f32, bias: f32) -> bool {
        self.solid_alpha(image_id)
            .map(|alpha| component_to_float(alpha) * scale + bias <= COLOR_TOL)
            .unwrap_or(false)
    }

    /// Execute all planned jobs: choose the global budget scale, prepare
    /// output directories, then process jobs sequentially in insertion
    /// order. Errors are logged and skipped; nothing unwinds outputs that
    /// were already written.
    #[instrument(skip(self))]
    pub fn end(&mut self) {
        let global_scale = self.choose_global_scale();
        let mut jobs = std::mem::take(&mut self.jobs);

        // Fold the global scale into each op's resize target.
        if global_scale != 1.0 {
            for job in &mut jobs {
                for op in job.ops_mut() {
                    let Some(image) = self.sources.get(&op.image_id).and_then(|source| source.image.as_ref()) else {
                        continue;
                    };
                    let (src_width, src_height) = (image.width(), image.height());
                    let (width, height) = budget::dst_size(src_width, src_height, &op.args.resize, global_scale);
                    op.resize_width = width;
                    op.resize_height = height;
                    if (width, height) != (src_width, src_height) {
                        op.pass_mask.insert(PassMask::RESIZE);
                        op.direct_copy = false;
                    }
                }
            }
        }

        // Create output directories up-front; skip execution wholesale when
        // preparation fails.
        let mut prep_failed = false;
        for job in &jobs {
            for op in job.ops() {
                if op.writes_output() && !self.prepare_write(&op.dst_path) {
                    prep_failed = true;
                }
            }
        }
        if prep_failed {
            warn!("output preparation failed, skipping image processing");
            return;
        }

        // Jobs run sequentially: the log and cache substrates are not safe
        // for concurrent use, and the surrounding batch driver already
        // parallelizes per-process.
        for job in &jobs {
            executor::process_job(self.cache, self.settings, &self.sources, job);
        }
    }

    fn find_or_add_src(&mut self, image_id: ImageId) -> Option<&mut Source> {
        let cache = self.cache;
        let origin = cache.origin(image_id)?;
        let (name, mime) = destinations::source_name(&origin, image_id);
        let newly_added = !self.sources.contains_key(&image_id);
        let src = self
            .sources
            .entry(image_id)
            .or_insert_with(|| Source::new(name.clone(), mime));
        if newly_added && !cache.image_exists(image_id) {
            error!("missing source image [{name}]");
        }
        Some(src)
    }

    fn add_dst(&mut self, image_id: ImageId, args: &Args, op: &mut Op) -> Option<String> {
        let Self {
            cache,
            settings,
            dst_dir,
            sources,
            dsts,
            scale_ids,
            bias_ids,
            ..
        } = self;
        add_dst(*cache, settings, dst_dir, sources, dsts, scale_ids, bias_ids, image_id, args, op)
    }

    /// Create the fallback file on demand, the first time its selector is
    /// referenced.
    fn add_fallback(&mut self, fallback: Fallback) -> String {
        let info = fallback.info();
        if !self.dsts.insert(info.name.to_string()) {
            return info.name.to_string();
        }
        let image = if info.r_only {
            Image::solid_1x1(&info.color[..1])
        } else {
            Image::solid_1x1(&info.color)
        };
        let dst_path = self.dst_dir.join(info.name);
        if self.prepare_write(&dst_path) {
            if let Err(error) = image.write(&dst_path, &self.settings.encode_settings(false)) {
                error!("{error:#}");
            }
        }
        info.name.to_string()
    }

    fn prepare_write(&mut self, dst_path: &Path) -> bool {
        if self.cache.is_source_path(dst_path) {
            error!("destination [{}] would stomp a source file", dst_path.display());
            return false;
        }
        match create_dir_for_file(dst_path) {
            Ok(created) => {
                self.written.push(dst_path.to_owned());
                self.created_dirs.extend(created);
                true
            }
            Err(error) => {
                error!("{error:#}");
                false
            }
        }
    }

    fn choose_global_scale(&self) -> f32 {
        let estimate_inputs: Vec<Vec<EstimateInput>> = self
            .jobs
            .iter()
            .map(|job| {
                job.ops()
                    .filter_map(|op| {
                        self.sources
                            .get(&op.image_id)
                            .and_then(|source| source.image.as_ref())
                            .map(|image| EstimateInput {
                                width: image.width(),
                                height: image.height(),
                                channel_count: image.channel_count(),
                                dst_channel_max: op.args.usage.info().dst_channel_max,
                                resize: op.args.resize,
                            })
                    })
                    .collect()
            })
            .collect();
        budget::choose_global_scale(
            &estimate_inputs,
            self.settings.limit_total_image_decompressed_size,
            self.settings.scale_step(),
        )
    }
}

/// Derive the destination suffix for `args`, recording passes and the
/// resize target on `op`. The suffix sequence is canonical: usage, scale,
/// bias, added alpha, resize, normalization, cutoff.
#[allow(clippy::too_many_arguments)]
fn dst_suffix<C: GltfImageCache>(
    cache: &C,
    settings: &ConvertSettings,
    scale_ids: &mut ColorIdMap,
    bias_ids: &mut ColorIdMap,
    image_id: ImageId,
    src: &mut Source,
    args: &Args,
    op: &mut Op,
) -> String {
    let mut pass_mask = PassMask::EMPTY;
    let mut suffix = String::new();
    let usage_info = args.usage.info();

    if args.usage == Usage::Default {
        let remove_alpha = args.alpha_mode == AlphaMode::Opaque
            && src.content(CHANNEL_A, image_id, cache, settings.fix_accidental_alpha) != Content::Solid1;
        if remove_alpha {
            suffix.push_str("_rgb");
            pass_mask.insert(PassMask::REMOVE_ALPHA);
        }
    } else {
        suffix.push_str(usage_info.dst_suffix);
    }

    if usage_info.src_rgb_color_space != usage_info.dst_rgb_color_space {
        pass_mask.insert(PassMask::COLOR_SPACE);
    }
    if args.usage == Usage::SpecToMetal {
        pass_mask.insert(PassMask::SPEC_TO_METAL);
    }

    if settings.bake_texture_color_scale_bias {
        if let Some(scale_id) = scale_ids.intern(args.scale) {
            suffix.push_str(&format!("_scale{scale_id}"));
            pass_mask.insert(PassMask::SCALE_BIAS);
        }
        if let Some(bias_id) = bias_ids.intern(args.bias) {
            suffix.push_str(&format!("_bias{bias_id}"));
            pass_mask.insert(PassMask::SCALE_BIAS);
        }
    }

    // Add an alpha channel if the source lacks one but alpha participates
    // in the baked scale/bias.
    if args.usage == Usage::Default
        && args.alpha_mode != AlphaMode::Opaque
        && pass_mask.contains(PassMask::SCALE_BIAS)
        && (args.scale[CHANNEL_A] != 1.0 || args.bias[CHANNEL_A] != 0.0)
    {
        src.load(image_id, cache);
        if src.image.as_ref().is_some_and(|image| image.channel_count() < 4) {
            suffix.push_str("_rgba");
            pass_mask.insert(PassMask::ADD_ALPHA);
        }
    }

    if let Some((width, height)) = resize_size(cache, image_id, &args.resize, src) {
        op.resize_width = width;
        op.resize_height = height;
        suffix.push_str(&format!("_{width}x{height}"));
        pass_mask.insert(PassMask::RESIZE);
    }

    if settings.normalize_normals
        && args.usage == Usage::Norm
        && (pass_mask.contains(PassMask::SCALE_BIAS) || src.needs_normalization(image_id, cache))
    {
        suffix.push_str("_norm");
        pass_mask.insert(PassMask::NORMALIZE_NORMALS);
    }

    if settings.bake_alpha_cutoff && args.alpha_mode == AlphaMode::Mask {
        let content = src.content(CHANNEL_A, image_id, cache, settings.fix_accidental_alpha);
        if !content.is_binary() {
            let cutoff = float_to_component(args.alpha_cutoff);
            suffix.push_str(&format!("_cutoff{cutoff}"));
            pass_mask.insert(PassMask::ALPHA_CUTOFF);
        }
    }

    op.pass_mask = pass_mask;
    suffix
}

fn resize_size<C: GltfImageCache>(
    cache: &C,
    image_id: ImageId,
    resize: &ImageResizeSettings,
    src: &mut Source,
) -> Option<(u32, u32)> {
    if resize.is_default() {
        return None;
    }
    src.load(image_id, cache);
    let image = src.image.as_ref()?;
    let (width, height) = budget::dst_size(image.width(), image.height(), resize, 1.0);
    ((width, height) != (image.width(), image.height())).then_some((width, height))
}

/// Derive the unique destination for `(image_id, args)`. Returns `None`
/// when the source is unusable (no record, missing payload, decode error),
/// in which case the caller substitutes a fallback.
#[allow(clippy::too_many_arguments)]
fn add_dst<C: GltfImageCache>(
    cache: &C,
    settings: &ConvertSettings,
    dst_dir: &Path,
    sources: &mut BTreeMap<ImageId, Source>,
    dsts: &mut IndexSet<String>,
    scale_ids: &mut ColorIdMap,
    bias_ids: &mut ColorIdMap,
    image_id: ImageId,
    args: &Args,
    op: &mut Op,
) -> Option<String> {
    op.is_new = false;

    let origin = cache.origin(image_id)?;
    let (src_name, mime) = destinations::source_name(&origin, image_id);

    let newly_added = !sources.contains_key(&image_id);
    let src = sources
        .entry(image_id)
        .or_insert_with(|| Source::new(src_name.clone(), mime));
    if newly_added && !cache.image_exists(image_id) {
        error!("missing source image [{src_name}]");
        src.state = LoadState::Missing;
        return None;
    }
    op.image_id = image_id;

    let suffix = dst_suffix(cache, settings, scale_ids, bias_ids, image_id, src, args, op);

    // Choose the output type from the source type and effective alpha: keep
    // PNG/JPEG sources, rewrite everything else; JPEG only when alpha is
    // irrelevant; adding an alpha channel forces PNG.
    let mut dst_mime = mime;
    let is_supported_output = matches!(dst_mime, Some(MimeType::Png) | Some(MimeType::Jpeg));
    let override_jpg = settings.prefer_jpeg && dst_mime != Some(MimeType::Jpeg);
    if !is_supported_output || override_jpg {
        let alpha_solid_one =
            src.content(CHANNEL_A, image_id, cache, settings.fix_accidental_alpha) == Content::Solid1;
        dst_mime = if args.alpha_mode == AlphaMode::Opaque || alpha_solid_one {
            Some(MimeType::Jpeg)
        } else {
            Some(MimeType::Png)
        };
    }
    if op.pass_mask.contains(PassMask::ADD_ALPHA) {
        dst_mime = Some(MimeType::Png);
    }

    let dst_name = destinations::derive_name(&src_name, &suffix, dst_mime);

    // First insert wins; a hit is an exact prior reference and needs no new
    // work.
    if !dsts.insert(dst_name.clone()) {
        return Some(dst_name);
    }
    op.is_new = true;
    op.dst_path = dst_dir.join(&dst_name);

    if suffix.is_empty() && dst_mime == mime {
        if settings.limit_total_image_decompressed_size != 0 {
            // The budget pass needs source dimensions even for plain copies.
            src.load(image_id, cache);
        }
        op.direct_copy = true;
        op.need_copy = !cache.is_image_at_path(image_id, dst_dir, &dst_name);
        return Some(dst_name);
    }

    src.load(image_id, cache);
    if src.state == LoadState::Missing {
        return None;
    }
    Some(dst_name)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::gltf_cache::{DirImageCache, MemImageCache},
        pretty_assertions::assert_eq,
        quantized_image::color::{linear_to_srgb, SRGB_TO_LINEAR},
        std::io::Cursor,
    };

    fn png_rgba(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
        let image = image::RgbaImage::from_fn(width, height, |x, y| image::Rgba(pixel(x, y)));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encoding fixture");
        bytes
    }

    fn png_rgb(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
        let image = image::RgbImage::from_fn(width, height, |x, y| image::Rgb(pixel(x, y)));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encoding fixture");
        bytes
    }

    fn gradient_rgb(x: u32, y: u32) -> [u8; 3] {
        [(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) * 3 % 256) as u8]
    }

    fn read_output(dir: &Path, name: &str) -> Image {
        Image::read(&std::fs::read(dir.join(name)).expect("output file"), name).expect("decoding output")
    }

    // The pipeline's own PNG reader promotes gray to RGB, so single-channel
    // outputs are verified with a raw decode.
    fn read_output_gray(dir: &Path, name: &str) -> (u32, u32, Vec<u8>) {
        let decoded = image::load_from_memory(&std::fs::read(dir.join(name)).expect("output file")).expect("decoding output");
        match decoded {
            image::DynamicImage::ImageLuma8(gray) => (gray.width(), gray.height(), gray.into_raw()),
            other => panic!("expected a grayscale output, got {:?}", other.color()),
        }
    }

    fn no_jpeg() -> ConvertSettings {
        ConvertSettings {
            prefer_jpeg: false,
            ..Default::default()
        }
    }

    #[test_log::test]
    fn identical_references_share_one_name_and_one_job() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "tex.png", png_rgb(8, 8, gradient_rgb));
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let args = Args::default();
        let first = texturator.add(ImageId(0), &args);
        let second = texturator.add(ImageId(0), &args);
        assert_eq!(first, "tex.png");
        assert_eq!(first, second);
        assert_eq!(texturator.jobs.len(), 1);

        let linear = texturator.add(ImageId(0), &Args {
            usage: Usage::Linear,
            ..Default::default()
        });
        assert_eq!(linear, "tex_lin.png");
        assert_eq!(texturator.jobs.len(), 2);

        texturator.end();
        // The identity reference is a byte-for-byte copy of the source.
        let source_bytes = cache.get_image(ImageId(0)).unwrap().0.into_owned();
        assert_eq!(std::fs::read(dir.path().join("tex.png"))?, source_bytes);
        assert!(dir.path().join("tex_lin.png").exists());
        Ok(())
    }

    #[test_log::test]
    fn solid_opaque_alpha_transcodes_to_jpg_without_rgb_suffix() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(
            ImageId(0),
            "tex.png",
            png_rgba(64, 64, |x, y| {
                let [r, g, b] = gradient_rgb(x, y);
                [r, g, b, 255]
            }),
        );
        let settings = ConvertSettings::default();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args::default());
        assert_eq!(name, "tex.jpg");
        texturator.end();

        let output = read_output(dir.path(), &name);
        assert_eq!(output.channel_count(), 3);
        assert_eq!((output.width(), output.height()), (64, 64));
        Ok(())
    }

    #[test_log::test]
    fn varying_alpha_under_opaque_mode_strips_to_rgb_jpg() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(
            ImageId(0),
            "tex.png",
            png_rgba(8, 8, |x, y| [100, 150, 200, if (x + y) % 2 == 0 { 255 } else { 200 }]),
        );
        let settings = ConvertSettings::default();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args::default());
        assert_eq!(name, "tex_rgb.jpg");
        texturator.end();
        assert_eq!(read_output(dir.path(), &name).channel_count(), 3);
        Ok(())
    }

    #[test_log::test]
    fn blended_alpha_stays_png() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(
            ImageId(0),
            "tex.png",
            png_rgba(8, 8, |x, _| [10, 20, 30, (x * 30 % 256) as u8]),
        );
        let settings = ConvertSettings::default();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args {
            alpha_mode: AlphaMode::Blend,
            ..Default::default()
        });
        assert_eq!(name, "tex.png");
        Ok(())
    }

    #[test_log::test]
    fn missing_sources_fall_back_to_generated_constants() -> anyhow::Result<()> {
        let cache = MemImageCache::default();
        let settings = ConvertSettings::default();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(42), &Args {
            fallback: Fallback::Magenta,
            ..Default::default()
        });
        assert_eq!(name, "fallback_magenta.png");
        // Fallbacks are written during planning so the shader graph can
        // reference them immediately.
        let output = read_output(dir.path(), &name);
        assert_eq!((output.width(), output.height(), output.channel_count()), (1, 1, 3));
        assert_eq!(output.data(), &[255, 0, 255]);

        let r1 = texturator.add(ImageId(42), &Args {
            usage: Usage::Occl,
            fallback: Fallback::R1,
            ..Default::default()
        });
        assert_eq!(r1, "fallback_r1.png");
        assert_eq!(read_output_gray(dir.path(), &r1), (1, 1, vec![255]));
        Ok(())
    }

    #[test_log::test]
    fn baked_scale_suffixes_and_scales_in_linear_space() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "tex.png", png_rgb(4, 4, |_, _| [200, 200, 200]));
        cache.insert_uri(ImageId(1), "other.png", png_rgb(4, 4, |_, _| [90, 90, 90]));
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let half = Args {
            scale: [0.5, 0.5, 0.5, 1.0],
            ..Default::default()
        };
        let name = texturator.add(ImageId(0), &half);
        assert_eq!(name, "tex_scale0.png");
        assert!(!name.contains("_bias"));
        assert!(!name.contains("_rgba"));

        // The same quantized scale reuses its id on another source; a new
        // scale gets the next id.
        assert_eq!(texturator.add(ImageId(1), &half), "other_scale0.png");
        let quarter = Args {
            scale: [0.25, 0.25, 0.25, 1.0],
            ..Default::default()
        };
        assert_eq!(texturator.add(ImageId(0), &quarter), "tex_scale1.png");

        texturator.end();
        let output = read_output(dir.path(), &name);
        assert_eq!((output.width(), output.height()), (1, 1));
        let expected = linear_to_srgb(SRGB_TO_LINEAR[200] * 0.5);
        for &channel in output.data() {
            assert!(channel.abs_diff(expected) <= 1, "{channel} vs {expected}");
        }
        Ok(())
    }

    #[test_log::test]
    fn identity_scale_and_bias_never_suffix() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "tex.png", png_rgb(4, 4, gradient_rgb));
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());
        let name = texturator.add(ImageId(0), &Args::default());
        assert!(!name.contains("_scale0"));
        assert!(!name.contains("_bias0"));
        Ok(())
    }

    #[test_log::test]
    fn missing_alpha_is_added_when_alpha_scale_bakes() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "tex.png", png_rgb(4, 4, gradient_rgb));
        let settings = ConvertSettings::default();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args {
            alpha_mode: AlphaMode::Blend,
            scale: [1.0, 1.0, 1.0, 0.5],
            ..Default::default()
        });
        assert_eq!(name, "tex_scale0_rgba.png");
        texturator.end();

        let output = read_output(dir.path(), &name);
        assert_eq!(output.channel_count(), 4);
        // The synthesized alpha starts opaque and bakes the 0.5 scale.
        assert_eq!(output.data()[CHANNEL_A], 128);
        Ok(())
    }

    #[test_log::test]
    fn black_occlusion_collapses_to_white() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "ao.png", png_rgb(8, 8, |_, _| [0, 0, 0]));
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args {
            usage: Usage::Occl,
            ..Default::default()
        });
        assert_eq!(name, "ao_occl.png");
        texturator.end();

        assert_eq!(read_output_gray(dir.path(), &name), (1, 1, vec![COMPONENT_MAX]));
        Ok(())
    }

    #[test_log::test]
    fn alpha_cutoff_bakes_a_binary_alpha_channel() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(
            ImageId(0),
            "leaf.png",
            png_rgba(8, 8, |x, _| [50, 120, 60, (x * 36 % 256) as u8]),
        );
        let settings = ConvertSettings::default();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args {
            alpha_mode: AlphaMode::Mask,
            alpha_cutoff: 0.5,
            ..Default::default()
        });
        assert_eq!(name, "leaf_cutoff128.png");
        texturator.end();

        let output = read_output(dir.path(), &name);
        for alpha in output.data().iter().skip(CHANNEL_A).step_by(4) {
            assert!([0, 255].contains(alpha), "alpha {alpha}");
        }
        Ok(())
    }

    #[test_log::test]
    fn unit_normal_maps_direct_copy_with_no_passes() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        let bytes = png_rgb(16, 16, |_, _| [128, 128, 255]);
        cache.insert_uri(ImageId(0), "n.png", bytes.clone());
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args {
            usage: Usage::Norm,
            ..Default::default()
        });
        assert_eq!(name, "n.png");
        let Job::Add(op) = &texturator.jobs[0] else {
            panic!("expected a plain job");
        };
        assert!(op.pass_mask.is_empty());
        assert!(op.direct_copy);

        texturator.end();
        assert_eq!(std::fs::read(dir.path().join("n.png"))?, bytes);
        Ok(())
    }

    #[test_log::test]
    fn non_unit_normal_maps_get_the_norm_pass() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "n.png", png_rgb(4, 4, |_, _| [128, 128, 192]));
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args {
            usage: Usage::Norm,
            ..Default::default()
        });
        assert_eq!(name, "n_norm.png");
        texturator.end();

        // Renormalized pixels scan as unit-length.
        let output = read_output(dir.path(), &name);
        let pixel = &output.data()[..3];
        let v: Vec<f32> = pixel.iter().map(|&c| c as f32 * 2.0 / 255.0 - 1.0).collect();
        let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        assert!((len - 1.0).abs() < 0.02, "length {len}");
        Ok(())
    }

    #[test_log::test]
    fn explicit_resize_suffixes_the_target_size() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "tex.png", png_rgb(32, 16, gradient_rgb));
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args {
            resize: ImageResizeSettings {
                scale: 0.5,
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(name, "tex_16x8.png");
        texturator.end();
        let output = read_output(dir.path(), &name);
        assert_eq!((output.width(), output.height()), (16, 8));
        Ok(())
    }

    #[test_log::test]
    fn budget_limit_scales_outputs_without_renaming() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(
            ImageId(0),
            "big.png",
            png_rgba(256, 256, |x, y| {
                let [r, g, b] = gradient_rgb(x, y);
                [r, g, b, 255]
            }),
        );
        let settings = ConvertSettings {
            prefer_jpeg: false,
            limit_total_image_decompressed_size: 300_000,
            limit_total_image_scale_step: 0.25,
            ..Default::default()
        };
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        // Planned as a direct copy; the budget pass turns it into a resize.
        let name = texturator.add(ImageId(0), &Args::default());
        assert_eq!(name, "big.png");
        texturator.end();

        let output = read_output(dir.path(), &name);
        assert_eq!((output.width(), output.height()), (192, 192));
        Ok(())
    }

    #[test_log::test]
    fn spec_gloss_pair_produces_metal_and_base() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "spec.png", png_rgb(128, 128, |_, _| [26, 26, 26]));
        cache.insert_uri(ImageId(1), "diff.png", png_rgb(128, 128, |_, _| [128, 128, 128]));
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let spec_args = Args {
            usage: Usage::SpecToMetal,
            ..Default::default()
        };
        let diff_args = Args {
            usage: Usage::DiffToBase,
            ..Default::default()
        };
        let (metal_name, base_name) = texturator.add_spec_to_metal(ImageId(0), &spec_args, ImageId(1), &diff_args);
        assert_eq!(metal_name, "spec_metal.png");
        assert_eq!(base_name, "diff_base.png");
        assert_ne!(metal_name, base_name);

        texturator.end();

        // Dim specular decodes below the dielectric constant, so metallic
        // solves to 0 and collapses solid.
        assert_eq!(read_output_gray(dir.path(), &metal_name), (1, 1, vec![0]));

        let base = read_output(dir.path(), &base_name);
        assert_eq!((base.width(), base.height(), base.channel_count()), (1, 1, 3));
        for &channel in base.data() {
            assert!(channel.abs_diff(128) <= 4, "base channel {channel}");
        }
        Ok(())
    }

    #[test_log::test]
    fn absent_specular_side_borrows_the_diffuse_source() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(1), "diff.png", png_rgb(16, 16, |_, _| [128, 128, 128]));
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let spec_args = Args {
            usage: Usage::SpecToMetal,
            ..Default::default()
        };
        let diff_args = Args {
            usage: Usage::DiffToBase,
            ..Default::default()
        };
        let (metal_name, base_name) = texturator.add_spec_to_metal(ImageId(99), &spec_args, ImageId(1), &diff_args);
        assert_eq!(metal_name, "diff_metal.png");
        assert_eq!(base_name, "diff_base.png");

        texturator.end();
        // The white specular stand-in solves to fully metallic.
        assert_eq!(read_output_gray(dir.path(), &metal_name), (1, 1, vec![255]));
        assert!(dir.path().join(&base_name).exists());
        Ok(())
    }

    #[test_log::test]
    fn both_sides_missing_fall_back() -> anyhow::Result<()> {
        let cache = MemImageCache::default();
        let settings = ConvertSettings::default();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let (metal_name, base_name) = texturator.add_spec_to_metal(
            ImageId(0),
            &Args {
                usage: Usage::SpecToMetal,
                fallback: Fallback::R0,
                ..Default::default()
            },
            ImageId(1),
            &Args {
                usage: Usage::DiffToBase,
                fallback: Fallback::Magenta,
                ..Default::default()
            },
        );
        assert_eq!(metal_name, "fallback_r0.png");
        assert_eq!(base_name, "fallback_magenta.png");
        assert!(texturator.jobs.is_empty());
        Ok(())
    }

    #[test_log::test]
    fn destination_never_stomps_a_source_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let original = png_rgb(8, 8, gradient_rgb);
        std::fs::write(dir.path().join("tex.png"), &original)?;
        std::fs::write(dir.path().join("tex_lin.png"), b"irreplaceable")?;
        let mut cache = DirImageCache::new(dir.path());
        cache.insert(ImageId(0), "tex.png");
        cache.insert(ImageId(1), "tex_lin.png");
        let settings = no_jpeg();
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        // The derived name collides with an existing source file.
        let name = texturator.add(ImageId(0), &Args {
            usage: Usage::Linear,
            ..Default::default()
        });
        assert_eq!(name, "tex_lin.png");
        texturator.end();
        assert_eq!(std::fs::read(dir.path().join("tex_lin.png"))?, b"irreplaceable");
        Ok(())
    }

    #[test_log::test]
    fn redundant_direct_copies_are_skipped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("tex.png"), png_rgb(8, 8, gradient_rgb))?;
        let mut cache = DirImageCache::new(dir.path());
        cache.insert(ImageId(0), "tex.png");
        let settings = no_jpeg();
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let name = texturator.add(ImageId(0), &Args::default());
        assert_eq!(name, "tex.png");
        let Job::Add(op) = &texturator.jobs[0] else {
            panic!("expected a plain job");
        };
        assert!(op.direct_copy);
        assert!(!op.need_copy);
        Ok(())
    }

    #[test_log::test]
    fn solid_alpha_queries_use_the_classification_cache() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "const.png", png_rgba(4, 4, |_, _| [9, 9, 9, 100]));
        cache.insert_uri(
            ImageId(1),
            "vary.png",
            png_rgba(4, 4, |x, _| [9, 9, 9, (x * 60 % 256) as u8]),
        );
        let settings = ConvertSettings::default();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        assert_eq!(texturator.solid_alpha(ImageId(0)), Some(100));
        assert!(!texturator.is_alpha_opaque(ImageId(0), 1.0, 0.0));
        assert!(texturator.is_alpha_opaque(ImageId(0), 1.0, 0.7));
        assert!(!texturator.is_alpha_fully_transparent(ImageId(0), 1.0, 0.0));
        assert!(texturator.is_alpha_fully_transparent(ImageId(0), 0.0, 0.0));

        assert_eq!(texturator.solid_alpha(ImageId(1)), None);
        assert!(!texturator.is_alpha_opaque(ImageId(1), 1.0, 0.0));

        // An id with no glTF record reads as opaque.
        assert_eq!(texturator.solid_alpha(ImageId(7)), Some(255));
        assert!(texturator.is_alpha_opaque(ImageId(7), 1.0, 0.0));
        Ok(())
    }

    #[test_log::test]
    fn written_paths_cover_all_produced_files() -> anyhow::Result<()> {
        let mut cache = MemImageCache::default();
        cache.insert_uri(ImageId(0), "a/tex.png", png_rgb(8, 8, gradient_rgb));
        let settings = no_jpeg();
        let dir = tempfile::tempdir()?;
        let mut texturator = Texturator::new(&cache, &settings, dir.path());

        let plain = texturator.add(ImageId(0), &Args::default());
        let lin = texturator.add(ImageId(0), &Args {
            usage: Usage::Linear,
            ..Default::default()
        });
        let fallback = texturator.add(ImageId(5), &Args::default());
        texturator.end();

        for name in [&plain, &lin, &fallback] {
            assert!(
                texturator.written().contains(&dir.path().join(name)),
                "missing [{name}] in written set"
            );
            assert!(dir.path().join(name).exists(), "no file for [{name}]");
        }
        assert!(texturator.created_dirs().contains(&dir.path().join("a")));
        Ok(())
    }
}
