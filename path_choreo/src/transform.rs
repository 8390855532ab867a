use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

use crate::ErrorStack;

pub type Vec3 = Vector3<f32>;
pub type Quat = UnitQuaternion<f32>;

pub(crate) const NORMALIZE_EPSILON: f32 = 1e-6;

#[inline]
pub(crate) fn is_finite_vec(v: &Vec3) -> bool {
  v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[inline]
pub(crate) fn is_finite_quat(q: &Quat) -> bool {
  q.coords.iter().all(|c| c.is_finite())
}

/// Normalizes `v`, returning `None` if it is too short or contains non-finite components.
#[inline]
pub(crate) fn try_normalize(v: &Vec3) -> Option<Vec3> {
  if !is_finite_vec(v) {
    return None;
  }
  v.try_normalize(NORMALIZE_EPSILON)
}

#[inline]
pub(crate) fn normalize_or(v: &Vec3, fallback: Vec3) -> Vec3 {
  try_normalize(v).unwrap_or(fallback)
}

/// Spherical interpolation that degrades to a hard switch when the two rotations are opposite
/// and no unique great-circle arc exists.
pub(crate) fn slerp_or_snap(from: &Quat, to: &Quat, t: f32) -> Quat {
  from
    .try_slerp(to, t, NORMALIZE_EPSILON)
    .unwrap_or(if t < 0.5 { *from } else { *to })
}

/// Builds a rotation whose local axes map onto the given orthonormal world axes.
pub(crate) fn quat_from_basis(x_axis: &Vec3, y_axis: &Vec3, z_axis: &Vec3) -> Quat {
  let m = Matrix3::from_columns(&[*x_axis, *y_axis, *z_axis]);
  UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m))
}

/// Rotation for an observer looking along `forward` with its local -Z axis, the camera convention
/// used by the renderer.  Returns `None` if `forward` is degenerate or parallel to `up`.
pub(crate) fn look_rotation(forward: &Vec3, up: &Vec3) -> Option<Quat> {
  let z_axis = try_normalize(&-forward)?;
  let x_axis = try_normalize(&up.cross(&z_axis))?;
  let y_axis = z_axis.cross(&x_axis);
  Some(quat_from_basis(&x_axis, &y_axis, &z_axis))
}

/// World transform of the node the whole path is parented to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupTransform {
  pub position: Vec3,
  pub orientation: Quat,
  pub scale: Vec3,
}

impl Default for GroupTransform {
  fn default() -> Self {
    Self::identity()
  }
}

impl GroupTransform {
  pub fn identity() -> Self {
    GroupTransform {
      position: Vec3::zeros(),
      orientation: Quat::identity(),
      scale: Vec3::new(1., 1., 1.),
    }
  }

  pub fn transform_point(&self, local: &Vec3) -> Vec3 {
    self.position + self.orientation * local.component_mul(&self.scale)
  }

  pub fn transform_vector(&self, local: &Vec3) -> Vec3 {
    self.orientation * local.component_mul(&self.scale)
  }

  /// Decomposes a column-major 4x4 affine matrix into translation, rotation, and per-axis scale.
  /// Shear is not representable and is discarded.
  pub fn from_column_major(elements: &[f32]) -> Result<Self, ErrorStack> {
    if elements.len() != 16 {
      return Err(ErrorStack::new(format!(
        "Group transform must be a 4x4 matrix; got {} elements",
        elements.len()
      )));
    }
    if elements.iter().any(|e| !e.is_finite()) {
      return Err(ErrorStack::new(
        "Group transform contains non-finite elements",
      ));
    }

    let m = Matrix4::from_column_slice(elements);
    let position = Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    let linear: Matrix3<f32> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let scale = Vec3::new(
      linear.column(0).norm(),
      linear.column(1).norm(),
      linear.column(2).norm(),
    );
    if scale.iter().any(|s| *s < NORMALIZE_EPSILON) {
      return Err(ErrorStack::new(format!(
        "Group transform has a degenerate scale: {scale:?}"
      )));
    }

    let rotation = Matrix3::from_columns(&[
      linear.column(0) / scale.x,
      linear.column(1) / scale.y,
      linear.column(2) / scale.z,
    ]);

    Ok(GroupTransform {
      position,
      orientation: UnitQuaternion::from_matrix(&rotation),
      scale,
    })
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
  pub position: Vec3,
  pub orientation: Quat,
}

impl Default for CameraPose {
  fn default() -> Self {
    CameraPose {
      position: Vec3::zeros(),
      orientation: Quat::identity(),
    }
  }
}

impl CameraPose {
  pub fn is_finite(&self) -> bool {
    is_finite_vec(&self.position) && is_finite_quat(&self.orientation)
  }

  /// Position lerp + orientation slerp.  `t` is clamped to `[0, 1]`.
  pub fn blend(&self, other: &CameraPose, t: f32) -> CameraPose {
    let t = common::clamp(t, 0., 1.);
    CameraPose {
      position: self.position.lerp(&other.position, t),
      orientation: slerp_or_snap(&self.orientation, &other.orientation, t),
    }
  }

  /// Direction the camera looks along (its local -Z axis).
  pub fn forward(&self) -> Vec3 {
    self.orientation * Vec3::new(0., 0., -1.)
  }

  /// Flat `[px, py, pz, qx, qy, qz, qw]` layout for handing to a renderer.
  pub fn to_array(&self) -> [f32; 7] {
    let q = self.orientation.quaternion();
    [
      self.position.x,
      self.position.y,
      self.position.z,
      q.i,
      q.j,
      q.k,
      q.w,
    ]
  }
}
