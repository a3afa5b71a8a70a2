//! End-to-end bakes of a small closed room.

use std::path::Path;

use lightbake::io::{read_probes, read_vertex_colors, read_vertex_directions};
use lightbake::prelude::*;

/// Quad with its winding flipped if needed so its normal is `facing`.
fn face(mut vertices: Vec<Vec3>, facing: Vec3) -> BrushFace {
    let n = (vertices[1] - vertices[0]).cross(vertices[2] - vertices[0]);
    if n.dot(facing) < 0.0 {
        vertices.reverse();
    }
    BrushFace {
        vertices,
        ..Default::default()
    }
}

/// Closed box from `lo` to `hi` with every face pointing inwards.
fn room(lo: Vec3, hi: Vec3) -> Brush {
    let v = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
    let (a, b) = (lo, hi);
    Brush {
        name: "room".into(),
        faces: vec![
            face(vec![v(a.x, a.y, a.z), v(a.x, a.y, b.z), v(b.x, a.y, b.z), v(b.x, a.y, a.z)], Vec3::Y),
            face(vec![v(a.x, b.y, a.z), v(a.x, b.y, b.z), v(b.x, b.y, b.z), v(b.x, b.y, a.z)], Vec3::NEG_Y),
            face(vec![v(a.x, a.y, a.z), v(a.x, b.y, a.z), v(a.x, b.y, b.z), v(a.x, a.y, b.z)], Vec3::X),
            face(vec![v(b.x, a.y, a.z), v(b.x, b.y, a.z), v(b.x, b.y, b.z), v(b.x, a.y, b.z)], Vec3::NEG_X),
            face(vec![v(a.x, a.y, a.z), v(b.x, a.y, a.z), v(b.x, b.y, a.z), v(a.x, b.y, a.z)], Vec3::Z),
            face(vec![v(a.x, a.y, b.z), v(b.x, a.y, b.z), v(b.x, b.y, b.z), v(a.x, b.y, b.z)], Vec3::NEG_Z),
        ],
        ..Default::default()
    }
}

/// Small upward-facing quad floating inside the room.
fn crate_model() -> SceneObject {
    SceneObject {
        name: "crate".into(),
        mesh: Some(Mesh {
            positions: vec![
                Vec3::new(1.25, 1.5, 1.25),
                Vec3::new(1.25, 1.5, 1.75),
                Vec3::new(1.75, 1.5, 1.75),
                Vec3::new(1.75, 1.5, 1.25),
            ],
            normals: vec![Vec3::Y; 4],
            indices: vec![0, 1, 2, 0, 2, 3],
            material: None,
        }),
        ..Default::default()
    }
}

fn test_scene(lit: bool) -> Scene {
    Scene {
        name: "testmap".into(),
        brushes: vec![room(Vec3::splat(-0.3), Vec3::new(3.3, 2.3, 3.3))],
        decals: vec![Decal {
            position: Vec3::new(1.5, -0.29, 1.5),
            ..Default::default()
        }],
        objects: vec![crate_model()],
        lights: if lit {
            vec![Light {
                position: Vec3::new(1.5, 2.0, 1.5),
                radius: 8.0,
                ..Default::default()
            }]
        } else {
            Vec::new()
        },
        ..Default::default()
    }
}

fn test_settings(root: &Path) -> BakeSettings {
    BakeSettings {
        resolution: 16,
        indirect_samples: 16,
        probe_indirect_samples: 16,
        probe_validation_rays: 256,
        probe_max_hit_ratio: 0.1,
        denoiser: DenoiserKind::Bilateral,
        output_root: root.to_path_buf(),
        lights_file: root.join("no_lights.rad"),
        threads: 3,
        ..BakeSettings::default()
    }
}

fn hdr_pixels(path: &Path) -> Vec<f32> {
    image::open(path).unwrap().to_rgb32f().into_raw()
}

#[test]
fn test_room_bake_outputs() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut scene = test_scene(true);
    let report = generate_with(&mut scene, &test_settings(tmp.path()))?;

    // 6 faces + 1 decal + 4 model vertices
    assert_eq!(report.jobs, 11);
    assert_eq!(report.processed, report.jobs);
    assert_eq!(report.per_thread.len(), 3);
    assert_eq!(report.per_thread.iter().sum::<usize>(), report.jobs);
    assert!(report.is_clean(), "failures: {:?}", report.failures);

    let map = tmp.path().join("testmap");
    assert_eq!(report.map_dir.as_deref(), Some(map.as_path()));
    for i in 0..6 {
        assert!(map.join("room").join(format!("face_{i}_color.hdr")).is_file());
        assert!(map.join("room").join(format!("face_{i}_dir.png")).is_file());
    }
    assert!(map.join("decal_0/lightmap_color.hdr").is_file());
    assert!(map.join("decal_0/lightmap_dir.png").is_file());

    // the floor sees the light
    let floor = hdr_pixels(&map.join("room/face_0_color.hdr"));
    assert!(floor.iter().any(|&c| c > 0.0));
    assert!(floor.iter().all(|c| c.is_finite() && *c >= 0.0));

    // padded lightmap: 16 + 2 * 2 texels per edge at most
    let dir = image::open(map.join("room/face_0_dir.png")).unwrap();
    assert!(dir.width() <= 20 && dir.height() <= 20);

    let colors = read_vertex_colors(&map.join("crate/vertex_colors.vlm"))?;
    let dirs = read_vertex_directions(&map.join("crate/vertex_directions.vld"))?;
    assert_eq!(colors.len(), 4);
    assert_eq!(dirs.len(), 4);
    for (c, d) in colors.iter().zip(&dirs) {
        assert!(c.x > 0.0);
        assert_eq!(c.w, 1.0);
        assert_eq!(d.w, 1.0);
        // light is overhead
        assert!(d.y > 0.0);
    }

    let probe_file = map.join("ambient_probes.amp");
    assert_eq!(scene.ambient_probe_file.as_deref(), Some(probe_file.as_path()));
    assert_eq!(report.probe_file.as_deref(), Some(probe_file.as_path()));
    let probes = read_probes(&probe_file)?;
    assert_eq!(probes.len(), report.probes);
    Ok(())
}

#[test]
fn test_probes_keep_clear_of_walls() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut scene = test_scene(true);
    let report = generate_with(&mut scene, &test_settings(tmp.path()))?;

    // Lattice points 0.3 from a wall see it with ~20% of their rays and are
    // dropped; only the four interior points survive.
    let probes = read_probes(report.probe_file.as_deref().unwrap())?;
    let positions: Vec<Vec3> = probes.iter().map(|p| p.position).collect();
    assert_eq!(
        positions,
        vec![
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(2.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 2.0),
            Vec3::new(2.0, 1.0, 2.0),
        ]
    );
    for p in &probes {
        // light sits above every probe
        assert!(p.colors[2].x > 0.0);
        assert!(p.dominant_direction.y > 0.0);
    }
    Ok(())
}

#[test]
fn test_bake_is_deterministic() -> Result<()> {
    let (a, b) = (tempfile::tempdir()?, tempfile::tempdir()?);
    generate_with(&mut test_scene(true), &test_settings(a.path()))?;
    let mut settings = test_settings(b.path());
    settings.threads = 1;
    generate_with(&mut test_scene(true), &settings)?;

    for rel in [
        "room/face_0_color.hdr",
        "room/face_3_dir.png",
        "decal_0/lightmap_color.hdr",
        "crate/vertex_colors.vlm",
        "crate/vertex_directions.vld",
        "ambient_probes.amp",
    ] {
        let x = std::fs::read(a.path().join("testmap").join(rel))?;
        let y = std::fs::read(b.path().join("testmap").join(rel))?;
        assert_eq!(x, y, "{rel} differs between runs");
    }
    Ok(())
}

#[test]
fn test_unlit_scene_bakes_black() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let report = generate_with(&mut test_scene(false), &test_settings(tmp.path()))?;
    assert!(report.is_clean());

    let map = tmp.path().join("testmap");
    for i in 0..6 {
        let px = hdr_pixels(&map.join("room").join(format!("face_{i}_color.hdr")));
        assert!(px.iter().all(|&c| c == 0.0), "face {i} not black");
    }
    assert!(hdr_pixels(&map.join("decal_0/lightmap_color.hdr")).iter().all(|&c| c == 0.0));
    let colors = read_vertex_colors(&map.join("crate/vertex_colors.vlm"))?;
    assert!(colors.iter().all(|c| c.truncate() == Vec3::ZERO));
    Ok(())
}

#[test]
fn test_zero_bounces() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut settings = test_settings(tmp.path());
    settings.bounces = 0;
    let report = generate_with(&mut test_scene(true), &settings)?;
    assert!(report.is_clean());
    assert_eq!(report.processed, 11);

    // direct light alone still reaches the floor
    let floor = hdr_pixels(&tmp.path().join("testmap/room/face_0_color.hdr"));
    assert!(floor.iter().any(|&c| c > 0.0));
    Ok(())
}

#[test]
fn test_empty_scene_exits_early() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut scene = Scene {
        name: "empty".into(),
        ..Default::default()
    };
    let report = generate_with(&mut scene, &test_settings(tmp.path()))?;
    assert_eq!(report.jobs, 0);
    assert_eq!(report.triangles, 0);
    assert!(report.map_dir.is_none());
    assert!(scene.ambient_probe_file.is_none());
    assert!(!tmp.path().join("empty").exists());
    Ok(())
}

#[test]
fn test_scene_from_json() -> Result<()> {
    let scene = Scene::from_json_str(
        r#"{
            "name": "json_map",
            "brushes": [{ "name": "slab", "faces": [
                { "vertices": [[0,0,0],[0,0,1],[1,0,1],[1,0,0]] }
            ]}],
            "lights": [{ "position": [0.5, 1.0, 0.5] }]
        }"#,
    )?;
    assert_eq!(scene.brushes[0].faces[0].vertices.len(), 4);
    assert_eq!(scene.lights[0].radius, 10.0);

    let tmp = tempfile::tempdir()?;
    let mut scene = scene;
    let report = generate_with(&mut scene, &test_settings(tmp.path()))?;
    assert_eq!(report.jobs, 1);
    assert!(tmp.path().join("json_map/slab/face_0_color.hdr").is_file());
    Ok(())
}

/// Single upward-facing square brush at height `y`.
fn slab(name: &str, y: f32, half: f32) -> Brush {
    Brush {
        name: name.into(),
        faces: vec![face(
            vec![
                Vec3::new(-half, y, -half),
                Vec3::new(-half, y, half),
                Vec3::new(half, y, half),
                Vec3::new(half, y, -half),
            ],
            Vec3::Y,
        )],
        ..Default::default()
    }
}

#[test]
fn test_blocker_casts_shadow() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut scene = Scene {
        name: "shadow".into(),
        brushes: vec![slab("floor", 0.0, 2.0), slab("blocker", 1.0, 0.5)],
        lights: vec![Light {
            position: Vec3::new(0.0, 3.0, 0.0),
            ..Default::default()
        }],
        ..Default::default()
    };
    let mut settings = test_settings(tmp.path());
    settings.bounces = 0;
    settings.blur_radius = 0;
    let report = generate_with(&mut scene, &settings)?;
    assert!(report.is_clean());

    let img = image::open(tmp.path().join("shadow/floor/face_0_color.hdr")).unwrap().to_rgb32f();
    // 16x16 texels plus a 2-texel border
    assert_eq!(img.dimensions(), (20, 20));
    let centre = img.get_pixel(10, 10).0;
    let corner = img.get_pixel(2, 2).0;
    assert_eq!(centre, [0.0; 3]);
    assert!(corner[0] > 0.0);
    Ok(())
}

#[test]
fn test_sun_shows_in_direction_only() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut scene = Scene {
        name: "sunny".into(),
        brushes: vec![slab("ground", 0.0, 2.0)],
        ..Default::default()
    };
    scene.sun.enabled = true;
    let mut settings = test_settings(tmp.path());
    settings.bounces = 0;
    generate_with(&mut scene, &settings)?;

    // runtime adds the sun itself, so the baked colour excludes it
    let px = hdr_pixels(&tmp.path().join("sunny/ground/face_0_color.hdr"));
    assert!(px.iter().all(|&c| c.abs() < 1e-6));

    // but the dominant direction points at it
    let dir = image::open(tmp.path().join("sunny/ground/face_0_dir.png")).unwrap().to_rgba8();
    assert!(dir.pixels().all(|p| p.0[1] >= 250 && p.0[3] == 255));
    Ok(())
}

/// Closed box from `lo` to `hi` with every face pointing outwards.
fn solid_box(name: &str, lo: Vec3, hi: Vec3) -> Brush {
    let centre = (lo + hi) * 0.5;
    let mut brush = room(lo, hi);
    brush.name = name.into();
    for f in &mut brush.faces {
        let n = (f.vertices[1] - f.vertices[0]).cross(f.vertices[2] - f.vertices[0]);
        if n.dot(f.vertices[0] - centre) < 0.0 {
            f.vertices.reverse();
        }
    }
    brush
}

#[test]
fn test_no_probes_on_grid_aligned_faces() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut scene = Scene {
        name: "slab".into(),
        brushes: vec![solid_box("slab", Vec3::new(-2.0, -1.0, -2.0), Vec3::new(2.0, 0.0, 2.0))],
        ..Default::default()
    };
    scene.sun.enabled = true;
    // default probe validation, small lightmaps to keep the bake quick
    let settings = BakeSettings {
        resolution: 8,
        indirect_samples: 8,
        output_root: tmp.path().to_path_buf(),
        lights_file: tmp.path().join("no_lights.rad"),
        ..BakeSettings::default()
    };
    let report = generate_with(&mut scene, &settings)?;
    assert!(report.is_clean());

    // every lattice point in the slab's bounds lies on its top or bottom face
    let probes = read_probes(report.probe_file.as_deref().unwrap())?;
    let on_face: Vec<Vec3> = probes
        .iter()
        .map(|p| p.position)
        .filter(|p| p.y == 0.0 || p.y == -1.0)
        .collect();
    assert!(on_face.is_empty(), "probes on faces: {on_face:?}");
    assert_eq!(report.probes, 0);
    Ok(())
}
