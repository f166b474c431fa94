//! Coordinate convention conversion

use glam::{Mat3, Mat4};

use crate::context::UpAxis;
use crate::scene::{Convention, Handedness, Scene};

/// Basis change from `convention` into Y-up right-handed
fn to_canonical(convention: Convention) -> Mat3 {
    // Mirror the depth axis first, while still in the source frame.
    let mirror = match (convention.handedness, convention.up) {
        (Handedness::Right, _) => Mat3::IDENTITY,
        (Handedness::Left, UpAxis::Y) => Mat3::from_diagonal(glam::Vec3::new(1.0, 1.0, -1.0)),
        (Handedness::Left, UpAxis::Z) => Mat3::from_diagonal(glam::Vec3::new(1.0, -1.0, 1.0)),
    };
    let up = match convention.up {
        UpAxis::Y => Mat3::IDENTITY,
        // (x, y, z) -> (x, z, -y)
        UpAxis::Z => Mat3::from_cols(glam::Vec3::X, glam::Vec3::NEG_Z, glam::Vec3::Y),
    };
    up * mirror
}

/// Matrix taking vectors in `from` to vectors in `to`
pub fn remap_matrix(from: Convention, to: Convention) -> Mat3 {
    to_canonical(to).inverse() * to_canonical(from)
}

/// Re-express the whole scene in `target`.
///
/// Every local transform `L` becomes `R L R^-1`, and mesh data, camera and
/// light direction vectors are multiplied by `R`. World-space results are
/// therefore `R` applied to the old ones. Returns `R`.
pub fn convert_axes(scene: &mut Scene, target: Convention) -> Mat3 {
    use rayon::prelude::*;

    let r = remap_matrix(scene.convention, target);
    scene.convention = target;
    if r == Mat3::IDENTITY {
        return r;
    }

    let r4 = Mat4::from_mat3(r);
    let r4_inv = Mat4::from_mat3(r.inverse());
    for node in scene.nodes_mut() {
        node.transform = r4 * node.transform * r4_inv;
    }
    scene.meshes.par_iter_mut().for_each(|mesh| mesh.transform(&r4));
    for camera in &mut scene.cameras {
        camera.forward = r * camera.forward;
        camera.up = r * camera.up;
    }
    for light in &mut scene.lights {
        light.forward = r * light.forward;
        light.up = r * light.up;
    }

    tracing::debug!("Remapped axes with {:?}", r);
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    const Z_UP: Convention = Convention {
        up: UpAxis::Z,
        handedness: Handedness::Right,
    };

    #[test]
    fn test_z_up_to_y_up() {
        let r = remap_matrix(Z_UP, Convention::Y_UP_RIGHT);
        assert_eq!(r * Vec3::Z, Vec3::Y);
        assert_eq!(r * Vec3::Y, Vec3::NEG_Z);
        assert_eq!(r * Vec3::X, Vec3::X);
        assert!(r.determinant() > 0.0);
    }

    #[test]
    fn test_left_handed_mirrors_depth() {
        let left = Convention {
            up: UpAxis::Y,
            handedness: Handedness::Left,
        };
        let r = remap_matrix(left, Convention::Y_UP_RIGHT);
        assert_eq!(r * Vec3::Z, Vec3::NEG_Z);
        assert!(r.determinant() < 0.0);
    }

    #[test]
    fn test_identity_for_same_convention() {
        assert_eq!(remap_matrix(Z_UP, Z_UP), Mat3::IDENTITY);
    }
}
