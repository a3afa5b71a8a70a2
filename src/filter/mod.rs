//! Image-space post-processing of baked texel buffers.
//!
//! All filters are pure functions over [`TexelBuffer`]s:
//! - [`gaussian_blur`] - separable blur of the final HDR colour
//! - [`box_mean`] / [`guided_filter`] - edge-aware smoothing of light directions
//! - [`pad`] - clamp-to-edge border for atlas-safe bilinear sampling
//! - [`denoise`] - Monte Carlo noise removal behind the [`Denoiser`] trait

pub mod denoise;

use std::ops::{Add, Mul, Sub};

use crate::util::{luminance, Error, Result, Vec3};

pub use denoise::{create_denoiser, BilateralDenoiser, Denoiser, Passthrough};

/// Pixel types the filters can operate on.
pub trait Texel: Copy + Default + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self> {}

impl<T> Texel for T where T: Copy + Default + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T> {}

/// Row-major 2D buffer of texels.
#[derive(Debug, Clone, PartialEq)]
pub struct TexelBuffer<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> TexelBuffer<T> {
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::SizeMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Build a buffer by evaluating `f(x, y)` for every texel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.data[y * self.width + x] = value;
    }

    /// Read with coordinates clamped to the nearest edge texel.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.get(cx, cy)
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> TexelBuffer<U> {
        TexelBuffer {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn zip_map<U: Copy, V: Copy>(&self, other: &TexelBuffer<U>, f: impl Fn(T, U) -> V) -> TexelBuffer<V> {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        TexelBuffer {
            width: self.width,
            height: self.height,
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect(),
        }
    }
}

impl TexelBuffer<Vec3> {
    /// True when every texel is exactly zero.
    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|v| *v == Vec3::ZERO)
    }

    /// Grayscale luminance image.
    pub fn luminance(&self) -> TexelBuffer<f32> {
        self.map(luminance)
    }
}

/// Copy `src` into the centre of a buffer grown by `border` texels on every
/// side; border texels repeat the nearest real edge texel.
pub fn pad<T: Copy>(src: &TexelBuffer<T>, border: usize) -> TexelBuffer<T> {
    let b = border as isize;
    TexelBuffer::from_fn(src.width + 2 * border, src.height + 2 * border, |x, y| {
        src.get_clamped(x as isize - b, y as isize - b)
    })
}

/// Normalized 1D Gaussian kernel covering `[-radius, radius]`.
fn gaussian_kernel(radius: usize) -> Vec<f32> {
    let sigma = (radius as f32 * 0.5).max(0.5);
    let denom = 2.0 * sigma * sigma;
    let mut k: Vec<f32> = (-(radius as isize)..=radius as isize)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = k.iter().sum();
    k.iter_mut().for_each(|w| *w /= sum);
    k
}

/// Separable Gaussian blur with clamp-to-edge borders.
pub fn gaussian_blur<T: Texel>(src: &TexelBuffer<T>, radius: usize) -> TexelBuffer<T> {
    if radius == 0 || src.data.is_empty() {
        return src.clone();
    }
    let kernel = gaussian_kernel(radius);
    let r = radius as isize;

    let horizontal = TexelBuffer::from_fn(src.width, src.height, |x, y| {
        kernel.iter().enumerate().fold(T::default(), |acc, (i, &w)| {
            acc + src.get_clamped(x as isize + i as isize - r, y as isize) * w
        })
    });
    TexelBuffer::from_fn(src.width, src.height, |x, y| {
        kernel.iter().enumerate().fold(T::default(), |acc, (i, &w)| {
            acc + horizontal.get_clamped(x as isize, y as isize + i as isize - r) * w
        })
    })
}

/// Mean over the `(2r+1)^2` window, restricted to texels inside the image.
pub fn box_mean<T: Texel>(src: &TexelBuffer<T>, radius: usize) -> TexelBuffer<T> {
    if src.data.is_empty() {
        return src.clone();
    }
    let (w, h) = (src.width, src.height);
    let window = |c: usize, n: usize| (c.saturating_sub(radius), (c + radius).min(n - 1));

    let horizontal = TexelBuffer::from_fn(w, h, |x, y| {
        let (lo, hi) = window(x, w);
        let sum = (lo..=hi).fold(T::default(), |acc, i| acc + src.get(i, y));
        sum * (1.0 / (hi - lo + 1) as f32)
    });
    TexelBuffer::from_fn(w, h, |x, y| {
        let (lo, hi) = window(y, h);
        let sum = (lo..=hi).fold(T::default(), |acc, j| acc + horizontal.get(x, j));
        sum * (1.0 / (hi - lo + 1) as f32)
    })
}

/// Guided filter (He et al.) with a grayscale guide.
///
/// Smooths `input` inside regions where `guide` is flat and keeps the edges
/// that `guide` has.
pub fn guided_filter<T: Texel>(
    input: &TexelBuffer<T>,
    guide: &TexelBuffer<f32>,
    radius: usize,
    epsilon: f32,
) -> Result<TexelBuffer<T>> {
    if (input.width, input.height) != (guide.width, guide.height) {
        return Err(Error::SizeMismatch {
            expected: input.data.len(),
            actual: guide.data.len(),
        });
    }

    let mean_i = box_mean(guide, radius);
    let mean_p = box_mean(input, radius);
    let corr_ii = box_mean(&guide.map(|g| g * g), radius);
    let corr_ip = box_mean(&input.zip_map(guide, |p, g| p * g), radius);

    let mut a = Vec::with_capacity(input.data.len());
    let mut b = Vec::with_capacity(input.data.len());
    for i in 0..input.data.len() {
        let mi = mean_i.data[i];
        let var_i = corr_ii.data[i] - mi * mi;
        let cov_ip = corr_ip.data[i] - mean_p.data[i] * mi;
        let ai = cov_ip * (1.0 / (var_i + epsilon));
        a.push(ai);
        b.push(mean_p.data[i] - ai * mi);
    }
    let mean_a = box_mean(&TexelBuffer::from_vec(input.width, input.height, a)?, radius);
    let mean_b = box_mean(&TexelBuffer::from_vec(input.width, input.height, b)?, radius);

    Ok(TexelBuffer::from_fn(input.width, input.height, |x, y| {
        mean_a.get(x, y) * guide.get(x, y) + mean_b.get(x, y)
    }))
}
