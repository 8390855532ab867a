use common::damp_factor;
use strum::{Display, EnumIter, EnumString, FromRepr};

use crate::{
  placement::{interpolate_base, SegmentInstance},
  transform::{
    is_finite_vec, slerp_or_snap, try_normalize, CameraPose, GroupTransform, Quat, Vec3,
  },
};

/// How the camera frames the segment it's following.
#[derive(
  Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, FromRepr,
)]
#[strum(serialize_all = "camelCase")]
#[repr(u8)]
pub enum CameraMode {
  /// Outward side of the path, looking in at it
  #[default]
  Normal = 0,
  /// Inward side of the path, turned around to look back out at it
  OppositeSide = 1,
  /// Like `OppositeSide` with an extra displacement along the path
  OppositeSideMove = 2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModeProfile {
  /// Multiplier on the configured side offset
  pub side_sign: f32,
  /// Multiplier on the configured lateral move distance
  pub lateral_move: f32,
  pub flip_yaw: bool,
}

const MODE_PROFILES: [ModeProfile; 3] = [
  ModeProfile {
    side_sign: 1.,
    lateral_move: 0.,
    flip_yaw: false,
  },
  ModeProfile {
    side_sign: -1.,
    lateral_move: 0.,
    flip_yaw: true,
  },
  ModeProfile {
    side_sign: -1.,
    lateral_move: 1.,
    flip_yaw: true,
  },
];

impl CameraMode {
  pub fn profile(self) -> &'static ModeProfile {
    &MODE_PROFILES[self as usize]
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigTuning {
  /// Distance out from the path along the segment's depth axis
  pub side_offset: f32,
  pub up_offset: f32,
  /// Displacement along the segment's width axis, applied in every mode
  pub extra_move: f32,
  /// Extra displacement along the width axis for [`CameraMode::OppositeSideMove`]
  pub side_move: f32,
  pub yaw_deg: f32,
  pub pitch_deg: f32,
  pub roll_deg: f32,
  pub max_pitch_deg: f32,
  pub min_y: f32,
  pub max_y: f32,
  pub min_distance: f32,
  pub max_move_factor: f32,
  pub position_smoothing: f32,
  pub rotation_smoothing: f32,
}

impl Default for RigTuning {
  fn default() -> Self {
    RigTuning {
      side_offset: 6.,
      up_offset: 1.5,
      extra_move: 0.,
      side_move: 3.,
      yaw_deg: 0.,
      pitch_deg: -8.,
      roll_deg: 0.,
      max_pitch_deg: 45.,
      min_y: -1000.,
      max_y: 1000.,
      min_distance: 2.,
      max_move_factor: 1.5,
      position_smoothing: 0.1,
      rotation_smoothing: 0.08,
    }
  }
}

/// A camera pose some strategy wants, together with the world-space point it is framing.  The
/// subject is what the distance clamp measures against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DesiredPose {
  pub pose: CameraPose,
  pub subject: Vec3,
}

impl DesiredPose {
  pub fn is_finite(&self) -> bool {
    self.pose.is_finite() && is_finite_vec(&self.subject)
  }

  pub fn blend(&self, other: &DesiredPose, t: f32) -> DesiredPose {
    DesiredPose {
      pose: self.pose.blend(&other.pose, t),
      subject: self.subject.lerp(&other.subject, common::clamp(t, 0., 1.)),
    }
  }
}

fn bias_rotation(tuning: &RigTuning) -> Quat {
  let max_pitch = tuning.max_pitch_deg.abs();
  let pitch = tuning.pitch_deg.clamp(-max_pitch, max_pitch);
  Quat::from_axis_angle(&Vec3::y_axis(), tuning.yaw_deg.to_radians())
    * Quat::from_axis_angle(&Vec3::x_axis(), pitch.to_radians())
    * Quat::from_axis_angle(&Vec3::z_axis(), tuning.roll_deg.to_radians())
}

/// Builds the camera pose framing the segment sequence at a fractional `active_index`.
///
/// In [`CameraMode::Normal`] the camera's forward (-Z) is the segment's inward radial direction,
/// not the path tangent; the opposite-side modes turn it around to face outward.
///
/// The offset is expressed in the followed segment's basis (X along the path, Y up, Z outward),
/// carried into world space through the group orientation, and added to the segment's world
/// position.  With no group transform the path is assumed to sit at the world origin.
pub fn compute_pose(
  instances: &[SegmentInstance],
  active_index: f32,
  group: Option<&GroupTransform>,
  mode: CameraMode,
  tuning: &RigTuning,
) -> Option<DesiredPose> {
  let identity = GroupTransform::identity();
  let group = group.unwrap_or(&identity);
  let (local_position, local_rotation) = interpolate_base(instances, active_index)?;

  let subject = group.transform_point(&local_position);
  let basis = group.orientation * local_rotation;
  let profile = mode.profile();

  let local_offset = Vec3::new(
    tuning.extra_move + tuning.side_move * profile.lateral_move,
    tuning.up_offset,
    tuning.side_offset * profile.side_sign,
  );
  let position = subject + basis * local_offset;

  // The renderer's camera looks down its local -Z, so the unrotated segment basis already faces
  // inward at the path from the outward side.
  let facing = if profile.flip_yaw {
    basis * Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::PI)
  } else {
    basis
  };

  Some(DesiredPose {
    pose: CameraPose {
      position,
      orientation: facing * bias_rotation(tuning),
    },
    subject,
  })
}

/// Applies safety clamps and smoothing to desired poses, one frame at a time.
#[derive(Default)]
pub struct CameraRig {
  current: Option<CameraPose>,
  last_target: Option<Vec3>,
  last_good_desired: Option<DesiredPose>,
  goal: Option<CameraPose>,
}

impl CameraRig {
  pub fn current(&self) -> Option<&CameraPose> {
    self.current.as_ref()
  }

  /// Pose the camera is converging on: the latest desired pose after the vertical and distance
  /// clamps, ignoring the per-frame displacement cap.
  pub fn goal(&self) -> Option<&CameraPose> {
    self.goal.as_ref()
  }

  pub fn reset(&mut self) {
    *self = CameraRig::default();
  }

  /// Vertical bounds, then minimum distance from the subject.
  fn bounded_target(desired: &DesiredPose, tuning: &RigTuning) -> Vec3 {
    let mut target = desired.pose.position;

    if tuning.min_y <= tuning.max_y {
      target.y = target.y.clamp(tuning.min_y, tuning.max_y);
    }

    if tuning.min_distance > 0. {
      let offset = target - desired.subject;
      if offset.norm() < tuning.min_distance {
        let dir = try_normalize(&offset)
          .or_else(|| try_normalize(&(desired.pose.orientation * Vec3::z())))
          .unwrap_or_else(Vec3::z);
        target = desired.subject + dir * tuning.min_distance;
      }
    }

    target
  }

  /// Limits how far `target` may move from the previous frame's target.
  fn cap_step(&self, mut target: Vec3, dt_secs: f32, tuning: &RigTuning) -> Vec3 {
    if let Some(prev) = self.last_target {
      if tuning.min_distance > 0. && tuning.max_move_factor > 0. {
        let dt = if dt_secs.is_finite() { dt_secs.max(0.) } else { 0. };
        let max_step = tuning.min_distance * (dt * 60.) * tuning.max_move_factor;
        let delta = target - prev;
        let dist = delta.norm();
        if dist > max_step {
          target = if max_step > 0. {
            prev + delta * (max_step / dist)
          } else {
            prev
          };
        }
      }
    }

    target
  }

  /// Moves the camera one frame toward `desired` and returns the pose to apply.
  ///
  /// Non-finite desired poses are replaced by the last finite one.  The first finite pose the rig
  /// receives is applied directly so the camera doesn't sweep in from the origin.
  pub fn step(&mut self, desired: &DesiredPose, dt_secs: f32, tuning: &RigTuning) -> CameraPose {
    let desired = if desired.is_finite() {
      self.last_good_desired = Some(*desired);
      *desired
    } else {
      match self.last_good_desired {
        Some(last) => {
          log::warn!("Rejected non-finite desired camera pose; reusing last good pose");
          last
        }
        None => return self.current.unwrap_or_default(),
      }
    };

    let bounded = Self::bounded_target(&desired, tuning);
    let target = self.cap_step(bounded, dt_secs, tuning);
    if !is_finite_vec(&target) {
      return self.current.unwrap_or_default();
    }
    self.last_target = Some(target);
    self.goal = Some(CameraPose {
      position: bounded,
      orientation: desired.pose.orientation,
    });

    let next = match self.current {
      None => CameraPose {
        position: target,
        orientation: desired.pose.orientation,
      },
      Some(current) => CameraPose {
        position: current.position.lerp(
          &target,
          damp_factor(tuning.position_smoothing, dt_secs),
        ),
        orientation: slerp_or_snap(
          &current.orientation,
          &desired.pose.orientation,
          damp_factor(tuning.rotation_smoothing, dt_secs),
        ),
      },
    };

    if next.is_finite() {
      self.current = Some(next);
    }
    self.current.unwrap_or(next)
  }
}
