//! Lightmap texture encoders.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::hdr::HdrEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb};

use crate::filter::TexelBuffer;
use crate::util::{Error, Result, Vec3};

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| Error::write_file(path, e))?;
    Ok(BufWriter::new(file))
}

/// Write an HDR colour buffer as a Radiance `.hdr` file.
///
/// Negative and non-finite values are written as zero.
pub fn write_hdr(path: &Path, color: &TexelBuffer<Vec3>) -> Result<()> {
    let pixels: Vec<Rgb<f32>> = color
        .data()
        .iter()
        .map(|c| {
            let c = if c.is_finite() { c.max(Vec3::ZERO) } else { Vec3::ZERO };
            Rgb(c.to_array())
        })
        .collect();
    let writer = create(path)?;
    HdrEncoder::new(writer)
        .encode(&pixels, color.width(), color.height())
        .map_err(|e| Error::write_file(path, e))
}

/// Map a unit direction to RGBA8: `(dir * 0.5 + 0.5) * 255`, alpha 255.
#[inline]
pub fn encode_direction(dir: Vec3) -> [u8; 4] {
    let enc = ((dir * 0.5 + 0.5) * 255.0).clamp(Vec3::ZERO, Vec3::splat(255.0));
    [enc.x as u8, enc.y as u8, enc.z as u8, 255]
}

/// Write a direction buffer as an RGBA8 PNG.
pub fn write_direction_png(path: &Path, dirs: &TexelBuffer<Vec3>) -> Result<()> {
    let bytes: Vec<u8> = dirs.data().iter().flat_map(|&d| encode_direction(d)).collect();
    let writer = create(path)?;
    PngEncoder::new(writer)
        .write_image(
            &bytes,
            dirs.width() as u32,
            dirs.height() as u32,
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| Error::write_file(path, e))
}
