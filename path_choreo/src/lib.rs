//! Scroll-driven choreography of a camera and a set of placed segments along a procedural path.
//!
//! A single [`ChoreoEngine`] owns every piece of state.  The host calls
//! [`ChoreoEngine::update`] once per rendered frame with the current progress in `[0, 1]` and the
//! frame delta, then reads back the camera pose, the per-segment transforms and any queued phase
//! transition events.

use std::fmt::{Debug, Display};

pub mod activation;
pub mod camera_rig;
pub mod config;
pub mod curve;
pub mod engine;
pub mod fade;
pub mod frames;
pub mod phase;
pub mod placement;
pub mod transform;

pub use activation::{ActivationField, ActivationParams, IdleMotionParams, SegmentTransform};
pub use camera_rig::{CameraMode, CameraRig, DesiredPose, RigTuning};
pub use config::ChoreoConfig;
pub use curve::{CatmullRom, Curve, CurveParams, CurvePoint, Helix, Sample};
pub use engine::{ChoreoEngine, MonitorSnapshot};
pub use fade::{FadeOverlay, StabilityTracker};
pub use frames::FrameSampler;
pub use phase::{
  Direction, Phase, PhaseBlender, PhaseSession, PhaseTransitionEvent, SessionId, SessionState,
  TransitionKind,
};
pub use placement::{InstancePlacer, LayoutParams, SegmentInstance, SegmentSpec};
pub use transform::{CameraPose, GroupTransform, Quat, Vec3};

#[derive(Clone)]
pub struct ErrorStack {
  pub errors: Vec<String>,
}

impl ErrorStack {
  #[cold]
  pub fn new(msg: impl Into<String>) -> Self {
    ErrorStack {
      errors: vec![msg.into()],
    }
  }

  #[cold]
  pub fn wrap(mut self, msg: impl Into<String>) -> Self {
    self.errors.push(msg.into());
    self
  }
}

impl Display for ErrorStack {
  #[cold]
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let indent = "  ";
    for (ix, err) in self.errors.iter().rev().enumerate() {
      let mut lines = err.lines().peekable();
      while let Some(line) = lines.next() {
        for _ in 0..ix {
          write!(f, "{indent}")?;
        }

        write!(f, "{line}")?;

        if lines.peek().is_some() {
          writeln!(f)?;
        }
      }

      if ix < self.errors.len() - 1 {
        writeln!(f)?;
      }
    }
    Ok(())
  }
}

impl Debug for ErrorStack {
  #[cold]
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{self}")
  }
}

impl std::error::Error for ErrorStack {}
