//! Per-vertex light files for static models.
//!
//! Both files share one layout: 4-byte magic, u32 count, then `count`
//! records of four little-endian f32.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{eof, read_header};
use crate::util::{Error, Result, Vec4};

/// Magic of `vertex_colors.vlm`.
pub const VLM_MAGIC: [u8; 4] = *b"VLM1";
/// Magic of `vertex_directions.vld`.
pub const VLD_MAGIC: [u8; 4] = *b"VLD1";

fn write_records(path: &Path, magic: &[u8; 4], records: &[Vec4]) -> Result<()> {
    let write = || -> std::io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_all(magic)?;
        w.write_u32::<LittleEndian>(records.len() as u32)?;
        for v in records {
            for c in v.to_array() {
                w.write_f32::<LittleEndian>(c)?;
            }
        }
        w.flush()
    };
    write().map_err(|e| Error::write_file(path, e))
}

fn read_records(path: &Path, magic: &[u8; 4]) -> Result<Vec<Vec4>> {
    let mut r = BufReader::new(File::open(path)?);
    let count = read_header(&mut r, magic, path)? as usize;
    let mut out = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        let mut c = [0.0f32; 4];
        r.read_f32_into::<LittleEndian>(&mut c).map_err(|e| eof(e, path))?;
        out.push(Vec4::from_array(c));
    }
    Ok(out)
}

/// Write `(r, g, b, 1)` records.
pub fn write_vertex_colors(path: &Path, colors: &[Vec4]) -> Result<()> {
    write_records(path, &VLM_MAGIC, colors)
}

/// Write `(x, y, z, 1)` records.
pub fn write_vertex_directions(path: &Path, directions: &[Vec4]) -> Result<()> {
    write_records(path, &VLD_MAGIC, directions)
}

pub fn read_vertex_colors(path: &Path) -> Result<Vec<Vec4>> {
    read_records(path, &VLM_MAGIC)
}

pub fn read_vertex_directions(path: &Path) -> Result<Vec<Vec4>> {
    read_records(path, &VLD_MAGIC)
}
