//! Ambient probe file (`ambient_probes.amp`).
//!
//! ```text
//! "AMBI"  u32 count
//! count × { position: 3×f32, colors: 6 × 3×f32 (+X -X +Y -Y +Z -Z), dominant_direction: 3×f32 }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{eof, read_header};
use crate::util::{Error, Result, Vec3};

pub const PROBE_MAGIC: [u8; 4] = *b"AMBI";
/// Bytes per probe record.
pub const PROBE_RECORD_SIZE: usize = 96;

/// Ambient light sampled at a point in empty space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientProbe {
    pub position: Vec3,
    /// Irradiance seen along +X, -X, +Y, -Y, +Z, -Z.
    pub colors: [Vec3; 6],
    pub dominant_direction: Vec3,
}

fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> std::io::Result<()> {
    w.write_f32::<LittleEndian>(v.x)?;
    w.write_f32::<LittleEndian>(v.y)?;
    w.write_f32::<LittleEndian>(v.z)
}

fn read_vec3<R: Read>(r: &mut R) -> std::io::Result<Vec3> {
    let mut c = [0.0f32; 3];
    r.read_f32_into::<LittleEndian>(&mut c)?;
    Ok(Vec3::from_array(c))
}

fn read_probe<R: Read>(r: &mut R) -> std::io::Result<AmbientProbe> {
    let position = read_vec3(r)?;
    let mut colors = [Vec3::ZERO; 6];
    for c in &mut colors {
        *c = read_vec3(r)?;
    }
    let dominant_direction = read_vec3(r)?;
    Ok(AmbientProbe {
        position,
        colors,
        dominant_direction,
    })
}

pub fn write_probes(path: &Path, probes: &[AmbientProbe]) -> Result<()> {
    let write = || -> std::io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_all(&PROBE_MAGIC)?;
        w.write_u32::<LittleEndian>(probes.len() as u32)?;
        for p in probes {
            write_vec3(&mut w, p.position)?;
            for c in p.colors {
                write_vec3(&mut w, c)?;
            }
            write_vec3(&mut w, p.dominant_direction)?;
        }
        w.flush()
    };
    write().map_err(|e| Error::write_file(path, e))
}

pub fn read_probes(path: &Path) -> Result<Vec<AmbientProbe>> {
    let mut r = BufReader::new(File::open(path)?);
    let count = read_header(&mut r, &PROBE_MAGIC, path)? as usize;
    let mut out = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        out.push(read_probe(&mut r).map_err(|e| eof(e, path))?);
    }
    Ok(out)
}
