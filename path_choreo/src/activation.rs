//! Proximity-driven rise/recede animation of the placed segments, plus the idle motion layers
//! applied on top of it when producing final transforms.

use std::f32::consts::TAU;

use common::{damp_factor, lerp};
use nalgebra::Matrix4;

use crate::{
  placement::SegmentInstance,
  transform::{is_finite_quat, is_finite_vec, GroupTransform, Quat, Vec3},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActivationParams {
  /// Segments within this many index units of the active index are fully risen
  pub radius: f32,
  /// Width of the band beyond `radius` over which segments recede
  pub fade: f32,
  /// How far a fully receded segment sits below its base position
  pub amplitude: f32,
  /// Index units ahead of the active index that are still treated as "at" the active index
  pub front_hold: f32,
  /// Per-frame smoothing rate at 60fps
  pub smoothing: f32,
}

impl Default for ActivationParams {
  fn default() -> Self {
    ActivationParams {
      radius: 3.,
      fade: 2.,
      amplitude: 7.,
      front_hold: 1.,
      smoothing: 0.12,
    }
  }
}

/// Distance in index units between a segment and the active index.  Segments ahead of the active
/// index get a `front_hold` grace zone.
pub fn activation_distance(index: usize, active_index: f32, front_hold: f32) -> f32 {
  let center = index as f32 + 0.5;
  if center > active_index {
    (center - (active_index + front_hold)).max(0.)
  } else {
    (center - active_index).abs()
  }
}

/// Target vertical displacement of a segment relative to its base position: `0` when within
/// `radius`, ramping linearly down to `-amplitude` over the following `fade` units.
pub fn target_rise_offset(index: usize, active_index: f32, params: &ActivationParams) -> f32 {
  let distance = activation_distance(index, active_index, params.front_hold);
  if distance <= params.radius {
    return 0.;
  }

  let over = distance - params.radius;
  let factor = if params.fade > 0. {
    (over / params.fade).min(1.)
  } else {
    1.
  };
  -params.amplitude * factor
}

/// Smooths every segment's rise offset toward its activation target.
#[derive(Default)]
pub struct ActivationField {
  last_good_active_index: Option<f32>,
}

impl ActivationField {
  pub fn reset(&mut self) {
    self.last_good_active_index = None;
  }

  pub fn update(
    &mut self,
    instances: &mut [SegmentInstance],
    active_index: f32,
    params: &ActivationParams,
    dt_secs: f32,
  ) {
    let active_index = if active_index.is_finite() {
      self.last_good_active_index = Some(active_index);
      active_index
    } else {
      match self.last_good_active_index {
        Some(last) => {
          log::debug!("Non-finite active index; holding {last}");
          last
        }
        None => return,
      }
    };

    let k = damp_factor(params.smoothing, dt_secs);
    for instance in instances.iter_mut() {
      let target = target_rise_offset(instance.index, active_index, params);
      let next = lerp(instance.rise_offset, target, k);
      if next.is_finite() {
        instance.rise_offset = next;
      } else if !instance.rise_offset.is_finite() {
        instance.rise_offset = 0.;
      }
    }
  }
}

/// Additive motion layered on top of the smoothed rise offsets.  Everything here is a pure
/// function of elapsed time and the per-instance phases.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IdleMotionParams {
  pub float_amplitude: f32,
  /// Radians per second
  pub float_speed: f32,
  /// Max yaw sway in radians
  pub sway_amplitude: f32,
  pub sway_speed: f32,
  /// Lateral displacement along each segment's width axis
  pub wiggle_amplitude: f32,
  /// Wave cycles over the full path
  pub wiggle_frequency: f32,
  pub wiggle_speed: f32,
}

impl Default for IdleMotionParams {
  fn default() -> Self {
    IdleMotionParams {
      float_amplitude: 0.08,
      float_speed: 1.3,
      sway_amplitude: 0.03,
      sway_speed: 0.7,
      wiggle_amplitude: 0.,
      wiggle_frequency: 3.,
      wiggle_speed: 1.,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentTransform {
  pub index: usize,
  pub position: Vec3,
  pub rotation: Quat,
  pub scale: Vec3,
}

impl SegmentTransform {
  pub fn to_matrix(&self) -> Matrix4<f32> {
    Matrix4::new_translation(&self.position)
      * self.rotation.to_homogeneous()
      * Matrix4::new_nonuniform_scaling(&self.scale)
  }
}

fn idle_layers(instance: &SegmentInstance, idle: &IdleMotionParams, elapsed_secs: f32) -> (Vec3, Quat) {
  let bob = (elapsed_secs * idle.float_speed + instance.float_phase).sin() * idle.float_amplitude;
  let wiggle = (elapsed_secs * idle.wiggle_speed + instance.curve_t * idle.wiggle_frequency * TAU)
    .sin()
    * idle.wiggle_amplitude;
  let sway = (elapsed_secs * idle.sway_speed + instance.rot_phase).sin() * idle.sway_amplitude;

  let width_axis = instance.base_rotation * Vec3::x();
  let offset = Vec3::new(0., bob, 0.) + width_axis * wiggle;
  let rotation = Quat::from_axis_angle(&Vec3::y_axis(), sway);
  (offset, rotation)
}

/// Writes the final world transform of every segment into `out`, reusing its allocation.
///
/// A layer that would push a segment to a non-finite position or rotation is dropped for that
/// segment; if even the base pose overflows through the group transform, the local base pose is
/// written instead.
pub fn compose_segment_transforms(
  instances: &[SegmentInstance],
  idle: &IdleMotionParams,
  elapsed_secs: f32,
  group: &GroupTransform,
  out: &mut Vec<SegmentTransform>,
) {
  out.clear();
  out.extend(instances.iter().map(|instance| {
    let (idle_offset, idle_rotation) = if elapsed_secs.is_finite() {
      idle_layers(instance, idle, elapsed_secs)
    } else {
      (Vec3::zeros(), Quat::identity())
    };
    let local_position = instance.base_position + Vec3::new(0., instance.rise_offset, 0.) + idle_offset;
    let local_rotation = instance.base_rotation * idle_rotation;

    let position = [local_position, instance.base_position]
      .iter()
      .map(|local| group.transform_point(local))
      .find(is_finite_vec)
      .unwrap_or(instance.base_position);
    let rotation = [
      group.orientation * local_rotation,
      group.orientation * instance.base_rotation,
    ]
    .into_iter()
    .find(is_finite_quat)
    .unwrap_or(instance.base_rotation);

    SegmentTransform {
      index: instance.index,
      position,
      rotation,
      scale: group.scale,
    }
  }));
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    curve::{Curve, CurveParams},
    placement::{layout_instances, LayoutParams},
  };

  fn scenario_instances() -> Vec<SegmentInstance> {
    let curve = Curve::helix(CurveParams {
      turns: 1.,
      radius: 5.,
      height: 10.,
    });
    layout_instances(
      &curve,
      &LayoutParams {
        count: 10,
        ..Default::default()
      },
    )
  }

  fn scenario_params() -> ActivationParams {
    ActivationParams {
      radius: 3.,
      fade: 2.,
      amplitude: 7.,
      front_hold: 0.,
      smoothing: 0.12,
    }
  }

  #[test]
  fn scenario_targets() {
    let params = scenario_params();
    assert_eq!(activation_distance(8, 4.5, 0.), 4.);
    assert_eq!(target_rise_offset(8, 4.5, &params), -3.5);
    assert_eq!(target_rise_offset(4, 4.5, &params), 0.);
    // beyond radius + fade the segment is fully receded
    assert_eq!(target_rise_offset(0, 9.5, &params), -7.);
  }

  #[test]
  fn front_hold_keeps_segments_ahead_risen() {
    let params = ActivationParams {
      front_hold: 2.,
      ..scenario_params()
    };
    // center 9.5 is 4.5 ahead, minus the 2 unit hold = 2.5 => still within radius
    assert_eq!(target_rise_offset(9, 5., &params), 0.);
    // the same gap behind is not held
    assert_eq!(target_rise_offset(0, 5., &params), -5.25);
  }

  #[test]
  fn zero_fade_is_a_hard_step() {
    let params = ActivationParams {
      fade: 0.,
      ..scenario_params()
    };
    assert_eq!(target_rise_offset(8, 4.5, &params), -7.);
    assert_eq!(target_rise_offset(7, 4.5, &params), 0.);
  }

  #[test]
  fn targets_never_rise_with_distance() {
    let params = ActivationParams {
      front_hold: 1.5,
      ..scenario_params()
    };
    for active in [0., 2.25, 4.5, 7.9, 12.] {
      let mut by_distance: Vec<(f32, f32)> = (0..20)
        .map(|ix| {
          (
            activation_distance(ix, active, params.front_hold),
            target_rise_offset(ix, active, &params),
          )
        })
        .collect();
      by_distance.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
      for pair in by_distance.windows(2) {
        assert!(pair[1].1 <= pair[0].1, "active={active}: {pair:?}");
      }
    }
  }

  #[test]
  fn smoothing_is_frame_rate_independent() {
    let params = scenario_params();
    let mut fine = scenario_instances();
    let mut coarse = scenario_instances();
    let mut field_fine = ActivationField::default();
    let mut field_coarse = ActivationField::default();

    for _ in 0..240 {
      field_fine.update(&mut fine, 4.5, &params, 1. / 240.);
    }
    for _ in 0..20 {
      field_coarse.update(&mut coarse, 4.5, &params, 1. / 20.);
    }

    for (a, b) in fine.iter().zip(&coarse) {
      assert!(
        (a.rise_offset - b.rise_offset).abs() < 1e-3,
        "ix={}: {} vs {}",
        a.index,
        a.rise_offset,
        b.rise_offset
      );
    }
    // partway to the -3.5 target after one second
    assert!(fine[8].rise_offset < -3.4 && fine[8].rise_offset > -3.5);
  }

  #[test]
  fn non_finite_active_index_holds_last_good_value() {
    let params = scenario_params();
    let mut instances = scenario_instances();
    let mut field = ActivationField::default();

    field.update(&mut instances, f32::NAN, &params, 1. / 60.);
    assert!(instances.iter().all(|i| i.rise_offset == 0.));

    field.update(&mut instances, 0.5, &params, 1. / 60.);
    let after_good = instances.clone();
    field.update(&mut instances, f32::INFINITY, &params, 1. / 60.);
    for (a, b) in instances.iter().zip(&after_good) {
      assert!(a.rise_offset.is_finite());
      assert!(a.rise_offset <= b.rise_offset);
    }
  }

  #[test]
  fn idle_layers_do_not_accumulate() {
    let mut instances = scenario_instances();
    instances[3].rise_offset = -2.;
    let idle = IdleMotionParams {
      wiggle_amplitude: 0.2,
      ..Default::default()
    };
    let group = GroupTransform::identity();

    let mut first = Vec::new();
    let mut second = Vec::new();
    compose_segment_transforms(&instances, &idle, 3.25, &group, &mut first);
    compose_segment_transforms(&instances, &idle, 9., &group, &mut second);
    compose_segment_transforms(&instances, &idle, 3.25, &group, &mut second);
    assert_eq!(first, second);
    assert_eq!(instances[3].rise_offset, -2.);

    let still = IdleMotionParams {
      float_amplitude: 0.,
      sway_amplitude: 0.,
      wiggle_amplitude: 0.,
      ..Default::default()
    };
    compose_segment_transforms(&instances, &still, 3.25, &group, &mut first);
    assert_eq!(
      first[3].position,
      instances[3].base_position + Vec3::new(0., -2., 0.)
    );
  }

  #[test]
  fn overflowing_layers_are_dropped() {
    let mut instances = scenario_instances();
    instances[2].rise_offset = f32::MAX;
    let idle = IdleMotionParams {
      float_amplitude: f32::MAX,
      sway_amplitude: f32::NAN,
      ..Default::default()
    };
    let group = GroupTransform::identity();

    let mut out = Vec::new();
    compose_segment_transforms(&instances, &idle, 1.5, &group, &mut out);
    for (transform, instance) in out.iter().zip(&instances) {
      assert!(is_finite_vec(&transform.position), "{:?}", transform.position);
      assert!(is_finite_quat(&transform.rotation));
      assert_eq!(transform.rotation, instance.base_rotation);
    }
  }
}
