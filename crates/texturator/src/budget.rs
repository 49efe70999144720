//! Global size-budget solver: estimates the decompressed footprint of every
//! planned output cheaply, then searches for the largest global scale whose
//! total fits the configured limit before any pixel work runs.

use {crate::settings::ImageResizeSettings, tracing::warn};

/// Round down to a power-of-2.
pub(crate) fn power2_floor(v: u32) -> u32 {
    let ceil = (v.max(1)).next_power_of_two();
    if ceil == v {
        ceil
    } else {
        ceil / 2
    }
}

/// Align up to the nearest interval of `align` (must be a power-of-2).
pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    let mask = align - 1;
    (value + mask) & !mask
}

/// Final destination dimensions for a source size under the resize settings
/// and a global scale: round, optionally floor to power-of-2, clamp to
/// `[size_min, size_max]`, never below 1. These operations can change the
/// aspect ratio.
pub(crate) fn dst_size(src_width: u32, src_height: u32, resize: &ImageResizeSettings, global_scale: f32) -> (u32, u32) {
    let scale = resize.scale * global_scale;
    let mut width = ((src_width as f32 * scale + 0.5) as u32).max(1);
    let mut height = ((src_height as f32 * scale + 0.5) as u32).max(1);
    if resize.force_power_of_2 {
        width = power2_floor(width);
        height = power2_floor(height);
    }
    let size_min = resize.size_min.max(1);
    let size_max = resize.size_max.max(size_min);
    (width.clamp(size_min, size_max), height.clamp(size_min, size_max))
}

/// Everything the estimate needs about one planned op. For the constant side
/// of a spec/diff pair the dimensions are the partner's (the synthesized
/// white image inherits them).
#[derive(Debug, Clone, Copy)]
pub(crate) struct EstimateInput {
    pub width: u32,
    pub height: u32,
    pub channel_count: u32,
    pub dst_channel_max: u32,
    pub resize: ImageResizeSettings,
}

// Texture alignment observed on the target viewer.
const ALIGN_SIZE: u64 = 64;

/// Decompressed footprint of one output image: 64-aligned base dimensions,
/// R8 for single-channel destinations and RGBA8 otherwise, plus a third for
/// the mip pyramid.
pub(crate) fn estimate_decompressed_size(input: &EstimateInput, global_scale: f32) -> u64 {
    let (width, height) = dst_size(input.width, input.height, &input.resize, global_scale);
    let channel_count = input.channel_count.min(input.dst_channel_max);
    let aligned_channel_count: u64 = if channel_count == 1 { 1 } else { 4 };
    let base_pixels = align_up(width as u64, ALIGN_SIZE) * align_up(height as u64, ALIGN_SIZE);
    let mip_pixels = base_pixels / 3;
    (base_pixels + mip_pixels) * aligned_channel_count
}

/// Search for a global scale `g ∈ (0, 1]` whose estimated total fits
/// `limit`. Scales step linearly down to `step`, then the floor is pushed
/// into the power term and the linear sequence restarts, e.g. with
/// step=0.25: 1.0, 0.75, 0.50, 0.25, 0.25·0.75, 0.25·0.50, …
/// Terminates at the monotonic floor (no job estimate changed between
/// iterations) with a warning. A limit of 0 disables the solver.
pub(crate) fn choose_global_scale(jobs: &[Vec<EstimateInput>], limit: u64, step: f32) -> f32 {
    if limit == 0 {
        return 1.0;
    }
    let mut job_sizes = vec![0u64; jobs.len()];
    let mut scale_power = 1.0f32;
    let mut scale_increment = 1.0f32;
    loop {
        let global_scale = scale_power * scale_increment;
        let mut total = 0u64;
        let mut any_changed = false;
        for (job_size, inputs) in job_sizes.iter_mut().zip(jobs) {
            let size = inputs
                .iter()
                .map(|input| estimate_decompressed_size(input, global_scale))
                .sum();
            total += size;
            if *job_size != size {
                *job_size = size;
                any_changed = true;
            }
        }
        if total <= limit {
            break;
        }
        if !any_changed {
            warn!(
                job_count = jobs.len(),
                limit, total, "image decompressed-size limit not reachable, proceeding at the floor scale"
            );
            break;
        }
        if scale_increment < 1.5 * step {
            // End of the linear sequence: push the scale and start over.
            scale_power = global_scale;
            scale_increment = 1.0;
        }
        scale_increment -= step;
    }
    scale_power * scale_increment
}

#[cfg(test)]
mod tests {
    use {super::*, pretty_assertions::assert_eq};

    fn input(width: u32, height: u32, channel_count: u32) -> EstimateInput {
        EstimateInput {
            width,
            height,
            channel_count,
            dst_channel_max: 4,
            resize: ImageResizeSettings::default(),
        }
    }

    #[test_log::test]
    fn power2_floor_rounds_down() {
        assert_eq!(power2_floor(1), 1);
        assert_eq!(power2_floor(2), 2);
        assert_eq!(power2_floor(3), 2);
        assert_eq!(power2_floor(1023), 512);
        assert_eq!(power2_floor(1024), 1024);
    }

    #[test_log::test]
    fn dst_size_applies_scale_power2_and_clamps() {
        let resize = ImageResizeSettings {
            force_power_of_2: true,
            scale: 0.4,
            size_min: 8,
            size_max: 64,
        };
        // 300·0.4 = 120 → power-of-2 floor 64; 20·0.4 = 8.
        assert_eq!(dst_size(300, 20, &resize, 1.0), (64, 8));
        // The global scale multiplies in before clamping.
        assert_eq!(dst_size(300, 300, &resize, 0.5), (32, 32));
        // Clamp floor.
        assert_eq!(dst_size(4, 4, &resize, 1.0), (8, 8));
    }

    #[test_log::test]
    fn estimate_uses_alignment_and_mip_allowance() {
        // 64×64 RGBA: base 4096 texels + 1365 mip texels, 4 bytes each.
        assert_eq!(estimate_decompressed_size(&input(64, 64, 4), 1.0), (4096 + 4096 / 3) * 4);
        // Single-channel destinations pack as R8.
        let gray = EstimateInput {
            dst_channel_max: 1,
            ..input(64, 64, 3)
        };
        assert_eq!(estimate_decompressed_size(&gray, 1.0), 4096 + 4096 / 3);
        // Small images still pay the 64-texel alignment.
        assert_eq!(estimate_decompressed_size(&input(1, 1, 4), 1.0), (4096 + 4096 / 3) * 4);
    }

    #[test_log::test]
    fn zero_limit_disables_the_solver() {
        assert_eq!(choose_global_scale(&[vec![input(4096, 4096, 4)]], 0, 0.5), 1.0);
    }

    #[test_log::test]
    fn solver_scales_down_until_the_total_fits() {
        let jobs = vec![vec![input(4096, 4096, 4)]];
        let limit = 1024 * 1024; // 1 MiB
        let scale = choose_global_scale(&jobs, limit, 0.5);
        assert!(scale > 0.0 && scale < 1.0, "scale = {scale}");
        let total = estimate_decompressed_size(&jobs[0][0], scale);
        assert!(total <= limit, "total {total} over limit {limit}");
    }

    #[test_log::test]
    fn solver_stops_at_the_monotonic_floor() {
        // size_min pins the output at 64×64 RGBA ≈ 21845·4 bytes, which can
        // never fit a 1-byte limit; the solver must still terminate.
        let resize = ImageResizeSettings {
            size_min: 64,
            ..Default::default()
        };
        let jobs = vec![vec![EstimateInput {
            resize,
            ..input(4096, 4096, 4)
        }]];
        let scale = choose_global_scale(&jobs, 1, 0.5);
        assert!(scale > 0.0, "scale = {scale}");
    }
}
