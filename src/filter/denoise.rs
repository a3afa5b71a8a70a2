//! Denoising of the noisy indirect-light estimate.
//!
//! Provides multiple denoising strategies:
//! - Intel Open Image Denoise (`oidn` feature) - ML denoiser configured for
//!   HDR input with clean albedo and normal guides
//! - Bilateral - cross-bilateral filter steered by the same guides
//! - Passthrough - baseline comparison / debugging
//!
//! Denoisers are created once per bake and shared by every worker.

use tracing::info;

use super::TexelBuffer;
use crate::config::DenoiserKind;
use crate::util::{luminance, Error, Result, Vec3};

/// Removes Monte Carlo noise from an HDR buffer using auxiliary guides.
pub trait Denoiser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Denoise `color`; `albedo` and `normal` have the same dimensions.
    fn denoise(
        &self,
        color: &TexelBuffer<Vec3>,
        albedo: &TexelBuffer<Vec3>,
        normal: &TexelBuffer<Vec3>,
    ) -> Result<TexelBuffer<Vec3>>;
}

/// Create the denoiser selected by `kind`.
///
/// Device creation failure is fatal ([`Error::DenoiserDevice`]).
pub fn create_denoiser(kind: DenoiserKind) -> Result<Box<dyn Denoiser>> {
    let denoiser: Box<dyn Denoiser> = match kind {
        DenoiserKind::None => Box::new(Passthrough),
        DenoiserKind::Bilateral => Box::new(BilateralDenoiser::default()),
        #[cfg(feature = "oidn")]
        DenoiserKind::Oidn | DenoiserKind::Auto => Box::new(oidn_backend::OidnDenoiser::new()?),
        #[cfg(not(feature = "oidn"))]
        DenoiserKind::Oidn => {
            return Err(Error::DenoiserDevice(
                "OIDN support not compiled in (enable the `oidn` feature)".into(),
            ))
        }
        #[cfg(not(feature = "oidn"))]
        DenoiserKind::Auto => Box::new(BilateralDenoiser::default()),
    };
    info!(denoiser = denoiser.name(), "Denoiser ready");
    Ok(denoiser)
}

fn check_dims(color: &TexelBuffer<Vec3>, aux: &TexelBuffer<Vec3>) -> Result<()> {
    if (color.width(), color.height()) != (aux.width(), aux.height()) {
        return Err(Error::SizeMismatch {
            expected: color.data().len(),
            actual: aux.data().len(),
        });
    }
    Ok(())
}

/// Returns the input unchanged.
pub struct Passthrough;

impl Denoiser for Passthrough {
    fn name(&self) -> &'static str {
        "none"
    }

    fn denoise(
        &self,
        color: &TexelBuffer<Vec3>,
        _albedo: &TexelBuffer<Vec3>,
        _normal: &TexelBuffer<Vec3>,
    ) -> Result<TexelBuffer<Vec3>> {
        Ok(color.clone())
    }
}

/// Cross-bilateral filter.
///
/// Neighbour weights fall off with distance, with normal and albedo
/// differences (the guides), and with relative luminance difference.
#[derive(Debug, Clone)]
pub struct BilateralDenoiser {
    pub spatial_sigma: f32,
    /// Relative luminance tolerance.
    pub range_sigma: f32,
    pub normal_sigma: f32,
    pub albedo_sigma: f32,
}

impl Default for BilateralDenoiser {
    fn default() -> Self {
        Self {
            spatial_sigma: 2.0,
            range_sigma: 0.6,
            normal_sigma: 0.3,
            albedo_sigma: 0.2,
        }
    }
}

impl Denoiser for BilateralDenoiser {
    fn name(&self) -> &'static str {
        "bilateral"
    }

    fn denoise(
        &self,
        color: &TexelBuffer<Vec3>,
        albedo: &TexelBuffer<Vec3>,
        normal: &TexelBuffer<Vec3>,
    ) -> Result<TexelBuffer<Vec3>> {
        check_dims(color, albedo)?;
        check_dims(color, normal)?;

        let radius = (self.spatial_sigma * 2.0).ceil() as isize;
        let spatial_coef = -0.5 / (self.spatial_sigma * self.spatial_sigma);
        let range_coef = -0.5 / (self.range_sigma * self.range_sigma);
        let normal_coef = -0.5 / (self.normal_sigma * self.normal_sigma);
        let albedo_coef = -0.5 / (self.albedo_sigma * self.albedo_sigma);
        let (w, h) = (color.width() as isize, color.height() as isize);

        Ok(TexelBuffer::from_fn(color.width(), color.height(), |x, y| {
            let c0 = color.get(x, y);
            let l0 = luminance(c0);
            let n0 = normal.get(x, y);
            let a0 = albedo.get(x, y);

            let mut sum = Vec3::ZERO;
            let mut weight_sum = 0.0f32;
            for dy in -radius..=radius {
                let sy = y as isize + dy;
                if sy < 0 || sy >= h {
                    continue;
                }
                for dx in -radius..=radius {
                    let sx = x as isize + dx;
                    if sx < 0 || sx >= w {
                        continue;
                    }
                    let (sx, sy) = (sx as usize, sy as usize);
                    let c = color.get(sx, sy);
                    let dl = (luminance(c) - l0) / (l0.max(luminance(c)) + 1e-3);
                    let dn = (normal.get(sx, sy) - n0).length_squared();
                    let da = (albedo.get(sx, sy) - a0).length_squared();
                    let d2 = (dx * dx + dy * dy) as f32;
                    let wgt = (d2 * spatial_coef
                        + dl * dl * range_coef
                        + dn * normal_coef
                        + da * albedo_coef)
                        .exp();
                    sum += c * wgt;
                    weight_sum += wgt;
                }
            }
            if weight_sum > 0.0 {
                sum / weight_sum
            } else {
                c0
            }
        }))
    }
}

#[cfg(feature = "oidn")]
mod oidn_backend {
    use parking_lot::Mutex;

    use super::*;

    /// Intel Open Image Denoise, ray-tracing filter in HDR mode.
    ///
    /// OIDN parallelises each filter call internally, so calls from
    /// different workers are serialised on the device.
    pub struct OidnDenoiser {
        device: Mutex<oidn::Device>,
    }

    impl OidnDenoiser {
        pub fn new() -> Result<Self> {
            let device = oidn::Device::new();
            if let Err((_, msg)) = device.get_error() {
                return Err(Error::DenoiserDevice(msg));
            }
            Ok(Self {
                device: Mutex::new(device),
            })
        }
    }

    fn flatten(buf: &TexelBuffer<Vec3>) -> Vec<f32> {
        buf.data().iter().flat_map(|v| v.to_array()).collect()
    }

    impl Denoiser for OidnDenoiser {
        fn name(&self) -> &'static str {
            "oidn"
        }

        fn denoise(
            &self,
            color: &TexelBuffer<Vec3>,
            albedo: &TexelBuffer<Vec3>,
            normal: &TexelBuffer<Vec3>,
        ) -> Result<TexelBuffer<Vec3>> {
            check_dims(color, albedo)?;
            check_dims(color, normal)?;

            let input = flatten(color);
            let albedo = flatten(albedo);
            let normal = flatten(normal);
            let mut output = vec![0.0f32; input.len()];

            let device = self.device.lock();
            let mut filter = oidn::RayTracing::new(&device);
            filter
                .srgb(false)
                .hdr(true)
                .image_dimensions(color.width(), color.height())
                .albedo_normal(&albedo, &normal);
            filter
                .filter(&input, &mut output)
                .map_err(|e| Error::Denoise(format!("{e:?}")))?;
            if let Err((_, msg)) = device.get_error() {
                return Err(Error::Denoise(msg));
            }

            let texels = output
                .chunks_exact(3)
                .map(|c| Vec3::new(c[0], c[1], c[2]))
                .collect();
            TexelBuffer::from_vec(color.width(), color.height(), texels)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guides(w: usize, h: usize) -> (TexelBuffer<Vec3>, TexelBuffer<Vec3>) {
        (TexelBuffer::new(w, h, Vec3::splat(0.5)), TexelBuffer::new(w, h, Vec3::Z))
    }

    #[test]
    fn test_passthrough() {
        let color = TexelBuffer::from_fn(4, 4, |x, y| Vec3::splat((x + y) as f32));
        let (albedo, normal) = guides(4, 4);
        let out = Passthrough.denoise(&color, &albedo, &normal).unwrap();
        assert_eq!(out, color);
    }

    #[test]
    fn test_bilateral_reduces_noise() {
        let color = TexelBuffer::from_fn(16, 16, |x, y| {
            if (x * 7 + y * 3) % 5 == 0 { Vec3::splat(1.4) } else { Vec3::splat(0.9) }
        });
        let (albedo, normal) = guides(16, 16);
        let out = BilateralDenoiser::default().denoise(&color, &albedo, &normal).unwrap();

        let variance = |b: &TexelBuffer<Vec3>| {
            let mean: f32 = b.data().iter().map(|v| v.x).sum::<f32>() / b.data().len() as f32;
            b.data().iter().map(|v| (v.x - mean).powi(2)).sum::<f32>()
        };
        assert!(variance(&out) < variance(&color) * 0.5);
    }

    #[test]
    fn test_bilateral_respects_normal_edges() {
        let color = TexelBuffer::from_fn(8, 4, |x, _| if x < 4 { Vec3::ZERO } else { Vec3::ONE });
        let albedo = TexelBuffer::new(8, 4, Vec3::splat(0.5));
        let normal = TexelBuffer::from_fn(8, 4, |x, _| if x < 4 { Vec3::X } else { Vec3::Y });
        let out = BilateralDenoiser::default().denoise(&color, &albedo, &normal).unwrap();
        assert!(out.get(3, 1).x < 0.05);
        assert!(out.get(4, 1).x > 0.95);
    }

    #[test]
    fn test_dimension_mismatch() {
        let color = TexelBuffer::new(4, 4, Vec3::ONE);
        let (albedo, _) = guides(4, 4);
        let normal = TexelBuffer::new(3, 4, Vec3::Z);
        assert!(BilateralDenoiser::default().denoise(&color, &albedo, &normal).is_err());
    }

    #[cfg(not(feature = "oidn"))]
    #[test]
    fn test_oidn_request_without_feature_is_fatal() {
        let err = create_denoiser(DenoiserKind::Oidn).err().unwrap();
        assert!(err.is_fatal());
        assert!(create_denoiser(DenoiserKind::Auto).is_ok());
    }
}
