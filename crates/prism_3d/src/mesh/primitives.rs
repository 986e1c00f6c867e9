//! Primitive mesh generators

use prism_core::{Vec2, Vec3};

use super::Mesh;

/// One quad of a generated mesh: outward normal plus the in-plane axes,
/// ordered so `right × up = normal` and the quad winds counter-clockwise
struct Face {
    normal: Vec3,
    right: Vec3,
    up: Vec3,
}

const CUBOID_FACES: [Face; 6] = [
    // +Z
    Face {
        normal: Vec3::new(0.0, 0.0, 1.0),
        right: Vec3::new(1.0, 0.0, 0.0),
        up: Vec3::new(0.0, 1.0, 0.0),
    },
    // -Z
    Face {
        normal: Vec3::new(0.0, 0.0, -1.0),
        right: Vec3::new(-1.0, 0.0, 0.0),
        up: Vec3::new(0.0, 1.0, 0.0),
    },
    // +X
    Face {
        normal: Vec3::new(1.0, 0.0, 0.0),
        right: Vec3::new(0.0, 0.0, -1.0),
        up: Vec3::new(0.0, 1.0, 0.0),
    },
    // -X
    Face {
        normal: Vec3::new(-1.0, 0.0, 0.0),
        right: Vec3::new(0.0, 0.0, 1.0),
        up: Vec3::new(0.0, 1.0, 0.0),
    },
    // +Y
    Face {
        normal: Vec3::new(0.0, 1.0, 0.0),
        right: Vec3::new(1.0, 0.0, 0.0),
        up: Vec3::new(0.0, 0.0, -1.0),
    },
    // -Y
    Face {
        normal: Vec3::new(0.0, -1.0, 0.0),
        right: Vec3::new(1.0, 0.0, 0.0),
        up: Vec3::new(0.0, 0.0, 1.0),
    },
];

const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

impl Mesh {
    /// Axis-aligned box centered on the origin, 24 vertices and 36 indices
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Mesh {
        let half = Vec3::new(width * 0.5, height * 0.5, depth * 0.5);
        let mut mesh = Mesh::new("cuboid");
        for face in &CUBOID_FACES {
            push_face(&mut mesh, face, half);
        }
        mesh.dirty = true;
        mesh
    }

    /// Quad in the XZ plane facing +Y, centered on the origin
    pub fn plane(width: f32, depth: f32) -> Mesh {
        let half = Vec3::new(width * 0.5, 0.0, depth * 0.5);
        let mut mesh = Mesh::new("plane");
        push_face(&mut mesh, &CUBOID_FACES[4], half);
        // The +Y face sits on y = half.y, which is zero here
        mesh.dirty = true;
        mesh
    }
}

fn push_face(mesh: &mut Mesh, face: &Face, half: Vec3) {
    let base = mesh.positions.len() as u32;
    for (u, v) in CORNERS {
        let corner = face.normal + face.right * u + face.up * v;
        mesh.positions.push(corner.mul_elements(half));
        mesh.normals.push(face.normal);
        mesh.uvs.push(Vec2::new((u + 1.0) * 0.5, (1.0 - v) * 0.5));
    }
    mesh.indices
        .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_counts_and_bounds() {
        let mesh = Mesh::cuboid(2.0, 4.0, 6.0);
        let positions = mesh.positions().unwrap();
        assert_eq!(positions.len(), 24);
        assert_eq!(mesh.indices().unwrap().len(), 36);
        assert_eq!(mesh.normals().unwrap().len(), 24);
        assert_eq!(mesh.uvs().unwrap().len(), 24);
        for p in positions {
            assert!(p.x.abs() <= 1.0 && p.y.abs() <= 2.0 && p.z.abs() <= 3.0);
        }
        assert!(mesh.needs_upload());
    }

    #[test]
    fn test_cuboid_winds_outward() {
        let mesh = Mesh::cuboid(1.0, 1.0, 1.0);
        let positions = mesh.positions().unwrap();
        let normals = mesh.normals().unwrap();
        for tri in mesh.indices().unwrap().chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| positions[i as usize]);
            let face_normal = (b - a).cross(c - a).normalize();
            assert!(face_normal.approx_eq(normals[tri[0] as usize], 1e-5));
        }
    }

    #[test]
    fn test_plane_is_flat() {
        let mesh = Mesh::plane(10.0, 4.0);
        let positions = mesh.positions().unwrap();
        assert_eq!(positions.len(), 4);
        assert!(positions.iter().all(|p| p.y == 0.0));
        assert!(mesh.normals().unwrap().iter().all(|n| *n == Vec3::UP));
    }
}
