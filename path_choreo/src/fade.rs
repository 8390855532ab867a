//! Reference consumer of phase transition events: an overlay that fades in when a phase is
//! entered and asks for the session to be exited once the camera has settled.

use crate::{
  phase::{PhaseTransitionEvent, SessionId, TransitionKind},
  transform::CameraPose,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FadeParams {
  pub fade_in_secs: f32,
  pub fade_out_secs: f32,
  pub max_opacity: f32,
}

impl Default for FadeParams {
  fn default() -> Self {
    FadeParams {
      fade_in_secs: 0.35,
      fade_out_secs: 0.6,
      max_opacity: 1.,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StabilityParams {
  /// Max distance from the rig's goal still considered settled
  pub position_threshold: f32,
  pub angle_threshold_deg: f32,
  /// Consecutive settled frames required
  pub frames: u32,
}

impl Default for StabilityParams {
  fn default() -> Self {
    StabilityParams {
      position_threshold: 0.01,
      angle_threshold_deg: 0.1,
      frames: 12,
    }
  }
}

/// Counts consecutive frames in which the camera sat within the thresholds of its goal pose.
#[derive(Default)]
pub struct StabilityTracker {
  stable_frames: u32,
}

impl StabilityTracker {
  pub fn reset(&mut self) {
    self.stable_frames = 0;
  }

  /// Records one frame and returns whether the camera has now been settled on `goal` long enough.
  /// With no goal the camera is never settled.
  pub fn observe(
    &mut self,
    pose: &CameraPose,
    goal: Option<&CameraPose>,
    params: &StabilityParams,
  ) -> bool {
    let settled = match goal {
      Some(goal) if pose.is_finite() && goal.is_finite() => {
        let distance = (pose.position - goal.position).norm();
        let angle = pose.orientation.angle_to(&goal.orientation).to_degrees();
        distance <= params.position_threshold && angle <= params.angle_threshold_deg
      },
      _ => false,
    };

    self.stable_frames = if settled {
      self.stable_frames.saturating_add(1)
    } else {
      0
    };
    settled && self.stable_frames >= params.frames
  }
}

#[derive(Default)]
pub struct FadeOverlay {
  /// Newest session whose enter has been acted on.  Ids only grow, so any enter at or below this
  /// has already been seen.
  max_consumed: Option<SessionId>,
  active: Option<SessionId>,
  exit_requested: bool,
  opacity: f32,
  target_opacity: f32,
  stability: StabilityTracker,
}

impl FadeOverlay {
  pub fn opacity(&self) -> f32 {
    self.opacity
  }

  pub fn active_session(&self) -> Option<SessionId> {
    self.active
  }

  /// Reacts to a transition event.  Each session's enter is acted on at most once; returns
  /// `true` if the event changed the overlay's state.
  pub fn handle_event(&mut self, evt: &PhaseTransitionEvent, params: &FadeParams) -> bool {
    match evt.kind {
      TransitionKind::Enter => {
        if self.max_consumed.is_some_and(|seen| evt.session_id <= seen) {
          return false;
        }
        self.max_consumed = Some(evt.session_id);
        self.active = Some(evt.session_id);
        self.exit_requested = false;
        self.target_opacity = params.max_opacity;
        self.stability.reset();
        true
      },
      TransitionKind::Exit => {
        if self.active != Some(evt.session_id) {
          return false;
        }
        self.active = None;
        self.target_opacity = 0.;
        true
      },
    }
  }

  /// Advances the opacity animation.  Once the overlay is fully faded in and the camera has
  /// settled on `goal` for long enough, returns the id of the session the engine should exit.
  /// Each session is returned at most once.
  pub fn update(
    &mut self,
    camera: &CameraPose,
    goal: Option<&CameraPose>,
    dt_secs: f32,
    fade: &FadeParams,
    stability: &StabilityParams,
  ) -> Option<SessionId> {
    let dt = if dt_secs.is_finite() { dt_secs.max(0.) } else { 0. };
    let duration = if self.target_opacity > self.opacity {
      fade.fade_in_secs
    } else {
      fade.fade_out_secs
    };
    let max_delta = if duration > 0. {
      dt / duration * fade.max_opacity.max(f32::EPSILON)
    } else {
      f32::INFINITY
    };
    let delta = self.target_opacity - self.opacity;
    self.opacity += delta.clamp(-max_delta, max_delta);

    let is_stable = self.stability.observe(camera, goal, stability);
    let id = self.active?;
    if self.exit_requested || self.opacity < self.target_opacity || !is_stable {
      return None;
    }

    self.exit_requested = true;
    Some(id)
  }
}
