use std::f32::consts::TAU;

use common::build_rng;
use rand::Rng;

use crate::{
  curve::{Curve, PathCurve},
  transform::{
    is_finite_vec, normalize_or, quat_from_basis, slerp_or_snap, try_normalize, Quat, Vec3,
  },
};

/// Seed for the per-instance idle motion phases.  Each instance uses its index as the PCG stream.
const PHASE_SEED: u64 = 8938;
/// Upper bound on the number of laid out segments.
pub const MAX_SEGMENT_COUNT: usize = 1 << 12;

fn finite_or(value: f32, fallback: f32) -> f32 {
  if value.is_finite() {
    value
  } else {
    fallback
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentSpec {
  pub width: f32,
  pub height: f32,
  pub depth: f32,
}

impl Default for SegmentSpec {
  fn default() -> Self {
    SegmentSpec {
      width: 2.,
      height: 0.5,
      depth: 1.,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutParams {
  /// Negative counts are treated as zero
  pub count: i32,
  pub spec: SegmentSpec,
  /// Extra outward push from the curve, on top of half the segment depth
  pub radial_offset: f32,
  pub scale: f32,
  /// Global placement offset added after scaling
  pub offset: Vec3,
}

impl Default for LayoutParams {
  fn default() -> Self {
    LayoutParams {
      count: 24,
      spec: SegmentSpec::default(),
      radial_offset: 0.,
      scale: 1.,
      offset: Vec3::zeros(),
    }
  }
}

impl LayoutParams {
  pub fn segment_count(&self) -> usize {
    (self.count.max(0) as usize).min(MAX_SEGMENT_COUNT)
  }

  /// Copy with every non-finite field replaced by its default and the count capped.  A
  /// non-positive scale also falls back to 1.
  pub fn sanitized(&self) -> LayoutParams {
    let defaults = SegmentSpec::default();
    LayoutParams {
      count: self.segment_count() as i32,
      spec: SegmentSpec {
        width: finite_or(self.spec.width, defaults.width),
        height: finite_or(self.spec.height, defaults.height),
        depth: finite_or(self.spec.depth, defaults.depth),
      },
      radial_offset: finite_or(self.radial_offset, 0.),
      scale: if self.scale.is_finite() && self.scale > 0. {
        self.scale
      } else {
        1.
      },
      offset: self.offset.map(|c| finite_or(c, 0.)),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentInstance {
  pub index: usize,
  /// Curve parameter of the segment's center
  pub curve_t: f32,
  pub base_position: Vec3,
  pub base_rotation: Quat,
  /// Current vertical displacement from `base_position`, driven by the activation field
  pub rise_offset: f32,
  pub float_phase: f32,
  pub rot_phase: f32,
}

/// Horizontal direction from the curve's vertical axis out to `point`.  Points on the axis itself
/// have no such direction and get +X.
pub(crate) fn radial_direction(point: &Vec3) -> Vec3 {
  try_normalize(&Vec3::new(point.x, 0., point.z)).unwrap_or_else(Vec3::x)
}

/// Orientation for a segment whose local Z (depth) axis points along `radial` with Y kept as close
/// to world up as possible.  Local X (width) then runs roughly along the path.
pub(crate) fn segment_basis(radial: &Vec3) -> Quat {
  let z_axis = *radial;
  let y_candidate = Vec3::y();
  let x_axis = normalize_or(&y_candidate.cross(&z_axis), Vec3::x());
  let y_axis = normalize_or(&z_axis.cross(&x_axis), Vec3::y());
  quat_from_basis(&x_axis, &y_axis, &z_axis)
}

/// Places `params.count` segments at evenly spaced centers along `curve`.
///
/// This is a pure function of its inputs; identical inputs produce bit-identical output.  If the
/// outward push or the scale overflows, the segment falls back to a less displaced position so
/// every base position stays finite.
pub fn layout_instances(curve: &Curve, params: &LayoutParams) -> Vec<SegmentInstance> {
  let params = params.sanitized();
  let count = params.segment_count();
  let scale = params.scale;
  let outward_distance = params.spec.depth / 2. + params.radial_offset;

  (0..count)
    .map(|index| {
      let curve_t = (index as f32 + 0.5) / count as f32;
      let local = curve.position(curve_t);
      let radial = radial_direction(&local);
      let scaled = local * scale;
      let candidates = [
        scaled + radial * (outward_distance * scale) + params.offset,
        scaled + params.offset,
        local + params.offset,
        local,
      ];
      let base_position = candidates
        .into_iter()
        .find(is_finite_vec)
        .unwrap_or_else(Vec3::zeros);

      let mut rng = build_rng((PHASE_SEED, index as u64));
      SegmentInstance {
        index,
        curve_t,
        base_position,
        base_rotation: segment_basis(&radial),
        rise_offset: 0.,
        float_phase: rng.gen::<f32>() * TAU,
        rot_phase: rng.gen::<f32>() * TAU,
      }
    })
    .collect()
}

/// Base pose of the segment sequence at a fractional active index.
///
/// Segment `i` is centered at index `i + 0.5`.  Between centers the position is lerped and the
/// rotation slerped; beyond the first or last center the end segment is returned as-is.
pub fn interpolate_base(instances: &[SegmentInstance], active_index: f32) -> Option<(Vec3, Quat)> {
  let last_ix = instances.len().checked_sub(1)?;
  let center = if active_index.is_finite() {
    common::clamp(active_index - 0.5, 0., last_ix as f32)
  } else {
    0.
  };
  let ix0 = (center.floor() as usize).min(last_ix);
  let ix1 = (ix0 + 1).min(last_ix);
  let frac = center - ix0 as f32;

  let a = &instances[ix0];
  let b = &instances[ix1];
  Some((
    a.base_position.lerp(&b.base_position, frac),
    slerp_or_snap(&a.base_rotation, &b.base_rotation, frac),
  ))
}

#[derive(Clone, Debug, PartialEq)]
struct LayoutKey {
  curve: Curve,
  params: LayoutParams,
}

/// Memoized segment layout.  Rise offsets live in the instance buffer and are reset whenever a
/// re-layout happens.
#[derive(Default)]
pub struct InstancePlacer {
  key: Option<LayoutKey>,
  instances: Vec<SegmentInstance>,
}

impl InstancePlacer {
  /// Re-lays out the segments if the curve or layout params differ from the previous call.
  /// Returns `true` if a re-layout happened.
  pub fn ensure(&mut self, curve: &Curve, params: &LayoutParams) -> bool {
    let params = params.sanitized();
    if let Some(key) = &self.key {
      if key.params == params && key.curve == *curve {
        return false;
      }
    }

    self.instances = layout_instances(curve, &params);
    log::info!("Laid out {} segments", self.instances.len());
    self.key = Some(LayoutKey {
      curve: curve.clone(),
      params,
    });
    true
  }

  pub fn instances(&self) -> &[SegmentInstance] {
    &self.instances
  }

  pub fn instances_mut(&mut self) -> &mut [SegmentInstance] {
    &mut self.instances
  }
}
