//! Geometry gathering: brushes and static models into one world-space soup.

use tracing::debug;

use crate::accel::TriangleSoup;
use crate::scene::{FaceRef, Scene};
use crate::util::Vec3;

/// Flatten every light-blocking surface of `scene` into a [`TriangleSoup`].
///
/// Volume brushes (trigger, reflection probe, DSP, water), dynamic models
/// and models that do not cast shadows are left out. Brush faces are fan
/// triangulated around their first corner.
#[tracing::instrument(skip_all, fields(brushes = scene.brushes.len(), objects = scene.objects.len()))]
pub fn gather_geometry(scene: &Scene) -> TriangleSoup {
    let mut soup = TriangleSoup::default();

    for (bi, brush) in scene.brushes.iter().enumerate() {
        if brush.kind.is_volume() {
            continue;
        }
        for (fi, face) in brush.faces.iter().enumerate() {
            let verts = brush.world_vertices(face);
            for tri in fan(&verts) {
                soup.push_triangle(tri, Some(FaceRef::new(bi, fi)), None);
            }
        }
    }
    let brush_tris = soup.triangle_count();

    for object in &scene.objects {
        if !object.cast_shadows {
            continue;
        }
        let Some(mesh) = object.static_mesh() else {
            continue;
        };
        let world: Vec<Vec3> = mesh
            .positions
            .iter()
            .map(|&p| object.transform.transform_point3(p))
            .collect();
        let mut skipped = 0usize;
        for idx in mesh.indices.chunks_exact(3) {
            let corner = |i: u32| world.get(i as usize).copied();
            match (corner(idx[0]), corner(idx[1]), corner(idx[2])) {
                (Some(a), Some(b), Some(c)) => soup.push_triangle([a, b, c], None, mesh.material),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(model = %object.name, skipped, "Dropped triangles with out-of-range indices");
        }
    }

    debug!(
        brush_triangles = brush_tris,
        model_triangles = soup.triangle_count() - brush_tris,
        "Gathered geometry"
    );
    soup
}

/// Fan triangulation `(v0, vi, vi+1)`.
pub(crate) fn fan(verts: &[Vec3]) -> impl Iterator<Item = [Vec3; 3]> + '_ {
    (1..verts.len().saturating_sub(1)).map(move |i| [verts[0], verts[i], verts[i + 1]])
}
