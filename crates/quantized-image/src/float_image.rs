//! Linear floating-point working image: the numeric workhorse for
//! scale/bias, filtered resizing, and the specular→metallic fusion.

use crate::{
    color::{self, ColorSpace, COLOR_TOL},
    Image, CHANNEL_A, CHANNEL_B, CHANNEL_G, CHANNEL_R,
};

/// `width × height × channel_count` f32 buffer in linear space.
#[derive(Debug, Clone, Default)]
pub struct FloatImage {
    width: u32,
    height: u32,
    channel_count: u8,
    pixels: Vec<f32>,
}

/// Per-channel-count accumulator for the box resize filter.
trait ResizeSum: Default {
    const CHANNEL_COUNT: usize;
    fn add_scaled(&mut self, src_pixel: &[f32], scale: f32);
    fn store_scaled(&self, scale: f32, dst: &mut [f32]);
}

#[derive(Default)]
struct ResizeSum1 {
    sum: [f32; 1],
}

#[derive(Default)]
struct ResizeSum2 {
    sum: [f32; 2],
}

#[derive(Default)]
struct ResizeSum3 {
    sum: [f32; 3],
}

#[derive(Default)]
struct ResizeSum4 {
    sum: [f32; 4],
}

macro_rules! impl_resize_sum {
    ($name:ident, $channels:expr) => {
        impl ResizeSum for $name {
            const CHANNEL_COUNT: usize = $channels;

            fn add_scaled(&mut self, src_pixel: &[f32], scale: f32) {
                for (sum, src) in self.sum.iter_mut().zip(src_pixel) {
                    *sum += src * scale;
                }
            }

            fn store_scaled(&self, scale: f32, dst: &mut [f32]) {
                for (dst, sum) in dst.iter_mut().zip(self.sum) {
                    *dst = sum * scale;
                }
            }
        }
    };
}

impl_resize_sum!(ResizeSum1, 1);
impl_resize_sum!(ResizeSum2, 2);
impl_resize_sum!(ResizeSum3, 3);
impl_resize_sum!(ResizeSum4, 4);

/// 4-channel accumulator weighting colors by opacity, so fully transparent
/// source pixels do not contribute unweighted color.
#[derive(Default)]
struct ResizeSum4Premul {
    sum: [f32; 4],
    premul_sum: [f32; 3],
}

impl ResizeSum for ResizeSum4Premul {
    const CHANNEL_COUNT: usize = 4;

    fn add_scaled(&mut self, src_pixel: &[f32], scale: f32) {
        let a_scaled = src_pixel[CHANNEL_A] * scale;
        for (sum, src) in self.sum.iter_mut().zip(src_pixel) {
            *sum += src * scale;
        }
        for (premul, src) in self.premul_sum.iter_mut().zip(src_pixel) {
            *premul += src * a_scaled;
        }
    }

    fn store_scaled(&self, scale: f32, dst: &mut [f32]) {
        let a = self.sum[CHANNEL_A];
        if a < COLOR_TOL {
            // Alpha of 0 is not invertible; use the non-premultiplied RGB.
            for (dst, sum) in dst.iter_mut().zip(self.sum) {
                *dst = sum * scale;
            }
        } else {
            let s = 1.0 / a;
            for (dst, premul) in dst.iter_mut().zip(self.premul_sum) {
                *dst = premul * s;
            }
        }
        dst[CHANNEL_A] = a * scale;
    }
}

// Box-averaging filter: each destination pixel accumulates the weighted sum
// of source pixels over its fractional footprint, divided by footprint area.
// Accurate for minification; magnification degrades to nearest-neighbor.
fn resize_plane<Sum: ResizeSum>(
    src_width: usize,
    src_height: usize,
    src_pixels: &[f32],
    dst_width: usize,
    dst_height: usize,
    dst_pixels: &mut [f32],
) {
    assert!(src_width > 0 && src_height > 0);
    assert!(dst_width > 0 && dst_height > 0);
    let channel_count = Sum::CHANNEL_COUNT;

    // Each destination pixel maps to a fixed-size area in the source image.
    let dst_to_src_x = src_width as f32 / dst_width as f32;
    let dst_to_src_y = src_height as f32 / dst_height as f32;
    let recip_area = 1.0 / (dst_to_src_x * dst_to_src_y);
    let src_row_stride = src_width * channel_count;

    for dst_iy in 0..dst_height {
        let src_y0 = dst_iy as f32 * dst_to_src_y;
        let src_y1 = src_y0 + dst_to_src_y;
        let src_iy_begin = src_y0 as usize;
        let src_iy_end = (src_y1 as usize + 1).min(src_height);

        let dst_row = &mut dst_pixels[dst_iy * dst_width * channel_count..][..dst_width * channel_count];
        for dst_ix in 0..dst_width {
            let src_x0 = dst_ix as f32 * dst_to_src_x;
            let src_x1 = src_x0 + dst_to_src_x;
            let src_ix_begin = src_x0 as usize;
            let src_ix_end = (src_x1 as usize + 1).min(src_width);

            let mut sum = Sum::default();
            for src_iy in src_iy_begin..src_iy_end {
                // Overlap of the destination footprint with this source row.
                let weight_y = src_y1.min((src_iy + 1) as f32) - src_y0.max(src_iy as f32);
                if weight_y <= 0.0 {
                    continue;
                }
                let src_row = &src_pixels[src_iy * src_row_stride..][..src_row_stride];
                for src_ix in src_ix_begin..src_ix_end {
                    let weight_x = src_x1.min((src_ix + 1) as f32) - src_x0.max(src_ix as f32);
                    if weight_x <= 0.0 {
                        continue;
                    }
                    sum.add_scaled(&src_row[src_ix * channel_count..][..channel_count], weight_y * weight_x);
                }
            }
            sum.store_scaled(recip_area, &mut dst_row[dst_ix * channel_count..][..channel_count]);
        }
    }
}

impl FloatImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_count as u32
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Decode a quantized image into linear floats. sRGB sources pass their
    /// RGB channels through the sRGB→linear lookup; alpha is always linear.
    pub fn from_image(src: &Image, src_color_space: ColorSpace) -> Self {
        Self {
            width: src.width(),
            height: src.height(),
            channel_count: src.channel_count() as u8,
            pixels: src.to_float(src_color_space == ColorSpace::Srgb),
        }
    }

    /// Quantize back to 8-bit, symmetric to [`Self::from_image`].
    pub fn to_image(&self, dst_color_space: ColorSpace) -> Image {
        Image::from_float(
            &self.pixels,
            self.width,
            self.height,
            self.channel_count as usize,
            dst_color_space == ColorSpace::Srgb,
        )
    }

    /// Per-channel `c ← c·s + b`.
    pub fn scale_bias(&mut self, scale: [f32; 4], bias: [f32; 4]) {
        let channel_count = self.channel_count as usize;
        for pixel in self.pixels.chunks_exact_mut(channel_count) {
            for (i, c) in pixel.iter_mut().enumerate() {
                *c = *c * scale[i] + bias[i];
            }
        }
    }

    /// Scale/bias for normal maps: transform into [−1, 1]-space, apply, then
    /// rescale so the vector fits within ±0.5 before the +0.5 re-encoding
    /// bias. Preserves direction, not magnitude.
    pub fn scale_bias_normals(&mut self, scale: [f32; 4], bias: [f32; 4]) {
        let channel_count = self.channel_count as usize;
        assert!(channel_count >= 3);
        // Only the bias is affected by the [0, 1] → [−1, 1] change of
        // variables, so it can be folded up front.
        let [s0, s1, s2, _] = scale;
        let b0 = 0.5 * (bias[0] - s0);
        let b1 = 0.5 * (bias[1] - s1);
        let b2 = 0.5 * (bias[2] - s2);
        for pixel in self.pixels.chunks_exact_mut(channel_count) {
            let x = pixel[CHANNEL_R] * s0 + b0;
            let y = pixel[CHANNEL_G] * s1 + b1;
            let z = pixel[CHANNEL_B] * s2 + b2;
            let m = 0.5f32.max(x.abs()).max(y.abs()).max(z.abs());
            let dst_scale = 0.5 / m;
            pixel[CHANNEL_R] = x * dst_scale + 0.5;
            pixel[CHANNEL_G] = y * dst_scale + 0.5;
            pixel[CHANNEL_B] = z * dst_scale + 0.5;
        }
    }

    /// Box-filtered resize; see [`resize_plane`] for filter semantics.
    pub fn resize(&mut self, width: u32, height: u32, premul_alpha: bool) {
        let channel_count = self.channel_count as usize;
        let mut dst_pixels = vec![0.0; width as usize * height as usize * channel_count];
        let (sw, sh) = (self.width as usize, self.height as usize);
        let (dw, dh) = (width as usize, height as usize);
        match (channel_count, premul_alpha) {
            (1, _) => resize_plane::<ResizeSum1>(sw, sh, &self.pixels, dw, dh, &mut dst_pixels),
            (2, _) => resize_plane::<ResizeSum2>(sw, sh, &self.pixels, dw, dh, &mut dst_pixels),
            (3, _) => resize_plane::<ResizeSum3>(sw, sh, &self.pixels, dw, dh, &mut dst_pixels),
            (4, false) => resize_plane::<ResizeSum4>(sw, sh, &self.pixels, dw, dh, &mut dst_pixels),
            (4, true) => resize_plane::<ResizeSum4Premul>(sw, sh, &self.pixels, dw, dh, &mut dst_pixels),
            (n, _) => unreachable!("resize of {n}-channel image"),
        }
        self.width = width;
        self.height = height;
        self.pixels = dst_pixels;
    }

    /// Convert a specular image plus a diffuse image into a single-channel
    /// metallic image (at the specular resolution) and base color written
    /// over the diffuse pixels (at the diffuse resolution). Inputs of equal
    /// size iterate paired pixels; otherwise both are point-sampled over a
    /// common grid sized to the max of each axis.
    pub fn spec_diff_to_metal_base(in_spec: &FloatImage, in_diff_out_base: &mut FloatImage) -> FloatImage {
        const SPEC_CHANNEL_COUNT: usize = 3;
        assert_eq!(in_spec.channel_count as usize, SPEC_CHANNEL_COUNT);

        let spec_width = in_spec.width as usize;
        let spec_height = in_spec.height as usize;
        let spec_pixels = &in_spec.pixels;

        let diff_width = in_diff_out_base.width as usize;
        let diff_height = in_diff_out_base.height as usize;
        let diff_channel_count = in_diff_out_base.channel_count as usize;

        let mut out_metal = FloatImage {
            width: in_spec.width,
            height: in_spec.height,
            channel_count: 1,
            pixels: vec![0.0; spec_width * spec_height],
        };

        let solve = |spec: &[f32], diff_base: &mut [f32], metal: &mut f32| {
            let (m, base) = color::spec_diff_to_metal_base(
                [spec[CHANNEL_R], spec[CHANNEL_G], spec[CHANNEL_B]],
                [diff_base[CHANNEL_R], diff_base[CHANNEL_G], diff_base[CHANNEL_B]],
            );
            *metal = m;
            diff_base[..3].copy_from_slice(&base);
        };

        if (spec_width, spec_height) == (diff_width, diff_height) {
            for i in 0..spec_width * spec_height {
                solve(
                    &spec_pixels[i * SPEC_CHANNEL_COUNT..][..SPEC_CHANNEL_COUNT],
                    &mut in_diff_out_base.pixels[i * diff_channel_count..][..diff_channel_count],
                    &mut out_metal.pixels[i],
                );
            }
        } else {
            // Diffuse pixels may be sampled multiple times, so the in-place
            // update needs a pristine copy to read from.
            let diff_pixels = in_diff_out_base.pixels.clone();

            // Sample at a rate high enough to touch every pixel of both
            // images.
            let max_width = spec_width.max(diff_width);
            let max_height = spec_height.max(diff_height);
            let x_to_u = 1.0 / max_width as f32;
            let y_to_v = 1.0 / max_height as f32;
            for y in 0..max_height {
                let v = y as f32 * y_to_v;
                let spec_y = ((v * spec_height as f32 + 0.5) as usize).min(spec_height - 1);
                let diff_y = ((v * diff_height as f32 + 0.5) as usize).min(diff_height - 1);
                for x in 0..max_width {
                    let u = x as f32 * x_to_u;
                    let spec_x = ((u * spec_width as f32 + 0.5) as usize).min(spec_width - 1);
                    let diff_x = ((u * diff_width as f32 + 0.5) as usize).min(diff_width - 1);
                    let spec_offset = (spec_y * spec_width + spec_x) * SPEC_CHANNEL_COUNT;
                    let diff_offset = (diff_y * diff_width + diff_x) * diff_channel_count;
                    let diff = &diff_pixels[diff_offset..][..diff_channel_count];
                    let base = &mut in_diff_out_base.pixels[diff_offset..][..diff_channel_count];
                    base.copy_from_slice(diff);
                    solve(
                        &spec_pixels[spec_offset..][..SPEC_CHANNEL_COUNT],
                        base,
                        &mut out_metal.pixels[spec_y * spec_width + spec_x],
                    );
                }
            }
        }
        out_metal
    }
}
