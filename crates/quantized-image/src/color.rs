//! sRGB⇄linear conversion tables and the specular/diffuse → metallic/base
//! per-pixel solver.

use {
    crate::{component_to_float, COMPONENT_MAX, COMPONENT_TO_FLOAT_SCALE},
    once_cell::sync::Lazy,
};

/// The two color spaces handled by the pipeline. Alpha is always linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// Tolerance used to compare color components.
pub const COLOR_TOL: f32 = 0.001;

// https://en.wikipedia.org/wiki/SRGB
fn srgb_to_linear_exact(srgb: f32) -> f32 {
    const SCALE: f32 = 1.0 / 1.055;
    const BIAS: f32 = 0.055 / 1.055;
    const LIN: f32 = 1.0 / 12.92;
    if srgb <= 0.04045 {
        srgb * LIN
    } else {
        (srgb * SCALE + BIAS).powf(2.4)
    }
}

/// Precomputed linear value for every 8-bit sRGB input.
pub static SRGB_TO_LINEAR: Lazy<[f32; COMPONENT_MAX as usize + 1]> = Lazy::new(|| {
    let mut table = [0.0; COMPONENT_MAX as usize + 1];
    for (srgb, linear) in table.iter_mut().enumerate() {
        *linear = srgb_to_linear_exact(component_to_float(srgb as u8));
    }
    table
});

// Size chosen to be large enough to prevent hash conflicts between
// sRGB-as-linear values. For u8 [0, 255] this works out to:
//   1 / (srgb_to_linear(1/255) - srgb_to_linear(0)) = 1 / 0.000303526991 < 3296.
// This sizing only holds for 8-bit outputs; 16-bit components need a larger
// table or a binary search over the boundary array.
const LINEAR_TO_SRGB_ENTRY_COUNT: usize = 3296;
const LINEAR_TO_SRGB_ENTRY_SCALE: f32 = (LINEAR_TO_SRGB_ENTRY_COUNT - 1) as f32;

/// Each entry holds the lower of the (at most two) quantized sRGB results
/// mapping into its bucket, and the linear threshold at which the result
/// transitions to `lower + 1`.
#[derive(Clone, Copy)]
struct LinearToSrgbEntry {
    srgb_lower: u8,
    lin_upper: f32,
}

// Non-minimal perfect hash: linear inputs in [0, 1] map straight to array
// indices, gaps are filled with duplicates, and no bucket ever spans more
// than two output values.
static LINEAR_TO_SRGB: Lazy<[LinearToSrgbEntry; LINEAR_TO_SRGB_ENTRY_COUNT]> = Lazy::new(|| {
    let mut entries = [LinearToSrgbEntry {
        srgb_lower: COMPONENT_MAX,
        lin_upper: f32::MAX,
    }; LINEAR_TO_SRGB_ENTRY_COUNT];
    // Bias by 0.5 to account for rounding.
    const LIN_UPPER_BIAS: f32 = 0.5 * COMPONENT_TO_FLOAT_SCALE;
    let mut entry_index = 0;
    for srgb_lower in 0..COMPONENT_MAX {
        let lin_upper = srgb_to_linear_exact(srgb_lower as f32 * COMPONENT_TO_FLOAT_SCALE + LIN_UPPER_BIAS);
        let entry_upper = (lin_upper * LINEAR_TO_SRGB_ENTRY_SCALE) as usize;
        while entry_index <= entry_upper {
            entries[entry_index] = LinearToSrgbEntry { srgb_lower, lin_upper };
            entry_index += 1;
        }
    }
    entries
});

/// Quantize a linear value to its 8-bit sRGB encoding.
#[inline]
pub fn linear_to_srgb(lin: f32) -> u8 {
    if lin < 0.0 {
        return 0;
    }
    let entry_index = ((lin * LINEAR_TO_SRGB_ENTRY_SCALE) as usize).min(LINEAR_TO_SRGB_ENTRY_COUNT - 1);
    let entry = LINEAR_TO_SRGB[entry_index];
    // Refine based on the linear threshold between adjacent sRGB values.
    if lin < entry.lin_upper {
        entry.srgb_lower
    } else {
        entry.srgb_lower + 1
    }
}

/// `0.299·R + 0.587·G + 0.114·B`
#[inline]
pub fn perceived_brightness(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

// Specular+diffuse → metallic+base conversion based on:
// https://github.com/bghgary/glTF-Tools-for-Unity/blob/master/UnityProject/Assets/Gltf/PbrUtilities.cs#L24
// Linked from here: https://github.com/AnalyticalGraphicsInc/gltf-pipeline/issues/331
const SPEC_DIELECTRIC: f32 = 0.04;
const SPEC_METAL_ZERO_TOL: f32 = 0.000001;

fn solve_metallic(dielectric_spec: f32, diffuse: f32, spec_bright: f32, inv_spec_max: f32) -> f32 {
    if spec_bright < dielectric_spec {
        return 0.0;
    }
    let a = dielectric_spec;
    let b = diffuse * inv_spec_max / (1.0 - dielectric_spec) + spec_bright - 2.0 * dielectric_spec;
    let c = dielectric_spec - spec_bright;
    let det = b * b - 4.0 * a * c;
    let result = (-b + det.sqrt()) / (2.0 * a);
    result.clamp(0.0, 1.0)
}

/// Per-pixel specular/diffuse → metallic/base solve. Solves metallic as the
/// larger quadratic root, then derives base color from the metallic blend.
pub fn spec_diff_to_metal_base(spec: [f32; 3], diff: [f32; 3]) -> (f32, [f32; 3]) {
    let [spec_r, spec_g, spec_b] = spec;
    let [diff_r, diff_g, diff_b] = diff;

    let spec_max = spec_r.max(spec_g).max(spec_b);
    let spec_bright = perceived_brightness(spec_r, spec_g, spec_b);
    let inv_spec_max = 1.0 - spec_max;
    let diff_bright = perceived_brightness(diff_r, diff_g, diff_b);
    let metal = solve_metallic(SPEC_DIELECTRIC, diff_bright, spec_bright, inv_spec_max);
    let inv_metal = 1.0 - metal;
    let metal_sq = metal * metal;
    let a = (1.0 - metal_sq) * inv_spec_max / ((1.0 - SPEC_DIELECTRIC) * inv_metal.max(SPEC_METAL_ZERO_TOL));
    let b = metal_sq / metal.max(SPEC_METAL_ZERO_TOL);
    let c = -SPEC_DIELECTRIC * inv_metal * b;
    (
        metal,
        [
            diff_r * a + spec_r * b + c,
            diff_g * a + spec_g * b + c,
            diff_b * a + spec_b * b + c,
        ],
    )
}
