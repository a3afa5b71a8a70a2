//! On-disk formats written by the baker.
//!
//! ## Layout
//! ```text
//! <root>/<map>/<object>/face_<i>_color.hdr      Radiance RGBE, padded
//! <root>/<map>/<object>/face_<i>_dir.png        RGBA8 dominant direction, padded
//! <root>/<map>/decal_<i>/lightmap_color.hdr
//! <root>/<map>/decal_<i>/lightmap_dir.png
//! <root>/<map>/<model>/vertex_colors.vlm        "VLM1" u32 count, count × Vec4
//! <root>/<map>/<model>/vertex_directions.vld    "VLD1" u32 count, count × Vec4
//! <root>/<map>/ambient_probes.amp               "AMBI" u32 count, count × 96-byte probe
//! ```
//! All binary values are little-endian.

pub mod lightmap;
pub mod probes;
pub mod vertex;

use std::io::Read;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::util::{Error, Result};

pub use lightmap::{encode_direction, write_direction_png, write_hdr};
pub use probes::{read_probes, write_probes, AmbientProbe, PROBE_MAGIC, PROBE_RECORD_SIZE};
pub use vertex::{
    read_vertex_colors, read_vertex_directions, write_vertex_colors, write_vertex_directions,
    VLD_MAGIC, VLM_MAGIC,
};

/// Read and check a 4-byte magic followed by a u32 record count.
pub(crate) fn read_header<R: Read>(reader: &mut R, magic: &[u8; 4], path: &Path) -> Result<u32> {
    let mut actual = [0u8; 4];
    reader.read_exact(&mut actual).map_err(|e| eof(e, path))?;
    if &actual != magic {
        return Err(Error::InvalidMagic {
            expected: *magic,
            actual,
        });
    }
    reader.read_u32::<LittleEndian>().map_err(|e| eof(e, path))
}

/// Map a short read to [`Error::UnexpectedEof`].
pub(crate) fn eof(e: std::io::Error, path: &Path) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEof(path.to_path_buf())
    } else {
        Error::Io(e)
    }
}
