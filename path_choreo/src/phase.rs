//! Switches the camera between following the raw curve and following the placed segments.
//!
//! Which strategy is "active" is a discrete state with hysteresis and one-shot session events; how
//! much of each strategy's pose ends up in the output is a separate continuous blend weight that
//! depends only on progress, so the camera never jumps when the state flips.

use common::{clamp, ease_out_cubic, lerp, smoothstep};
use nanoserde::SerJson;
use strum::{Display, EnumString};

use crate::{
  camera_rig::{compute_pose, CameraMode, DesiredPose, RigTuning},
  frames::FrameSampler,
  placement::{radial_direction, SegmentInstance},
  transform::{look_rotation, try_normalize, CameraPose, GroupTransform, Quat, Vec3},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum Phase {
  Curve,
  Segment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum Direction {
  Forward,
  Backward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
  Entered,
  Exited,
}

/// Record of one phase change.  At most one session is open at a time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseSession {
  pub id: SessionId,
  pub phase: Phase,
  pub direction: Direction,
  /// Engine-elapsed seconds at which the phase was entered
  pub entered_at: f32,
  pub state: SessionState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "camelCase")]
pub enum TransitionKind {
  Enter,
  Exit,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseTransitionEvent {
  pub session_id: SessionId,
  pub direction: Direction,
  pub kind: TransitionKind,
  pub phase: Phase,
}

#[derive(SerJson)]
struct SerializableTransitionEvent {
  #[nserde(rename = "sessionId")]
  session_id: u64,
  direction: String,
  kind: String,
  phase: String,
}

impl From<&PhaseTransitionEvent> for SerializableTransitionEvent {
  fn from(evt: &PhaseTransitionEvent) -> Self {
    SerializableTransitionEvent {
      session_id: evt.session_id.0,
      direction: evt.direction.to_string(),
      kind: evt.kind.to_string(),
      phase: evt.phase.to_string(),
    }
  }
}

/// Serializes events as a JSON array of `{sessionId, direction, kind, phase}` objects.
pub fn events_to_json(events: &[PhaseTransitionEvent]) -> String {
  let serializable: Vec<SerializableTransitionEvent> = events.iter().map(Into::into).collect();
  SerJson::serialize_json(&serializable)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseParams {
  /// Progress value dividing the curve phase from the segment phase
  pub split: f32,
  /// Half-width of the cross-fade band around `split`
  pub band: f32,
  /// How far past `split` progress has to go before the phase flips
  pub hysteresis: f32,
}

impl Default for PhaseParams {
  fn default() -> Self {
    PhaseParams {
      split: 0.3,
      band: 0.02,
      hysteresis: 0.005,
    }
  }
}

impl PhaseParams {
  fn sanitized_split(&self) -> f32 {
    if self.split.is_finite() {
      clamp(self.split, 0., 1.)
    } else {
      0.
    }
  }

  /// Sub-progress within the curve phase
  pub fn curve_t(&self, progress: f32) -> f32 {
    let split = self.sanitized_split();
    if split <= 0. {
      return 1.;
    }
    clamp(progress / split, 0., 1.)
  }

  /// Sub-progress within the segment phase
  pub fn segment_t(&self, progress: f32) -> f32 {
    let split = self.sanitized_split();
    if split >= 1. {
      return 0.;
    }
    clamp((progress - split) / (1. - split), 0., 1.)
  }

  /// Share of the segment-follow pose in the output, `0` well before `split` and `1` well after.
  pub fn segment_weight(&self, progress: f32) -> f32 {
    let split = self.sanitized_split();
    let band = if self.band.is_finite() {
      self.band.max(0.)
    } else {
      0.
    };
    ease_out_cubic(smoothstep(split - band, split + band, progress))
  }
}

/// Parameters of the curve-follow strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveFollowParams {
  pub height_offset: f32,
  /// Outward distance from the curve's vertical axis
  pub side_offset: f32,
  /// How far ahead along the curve (in `t`) the camera looks
  pub lookahead: f32,
}

impl Default for CurveFollowParams {
  fn default() -> Self {
    CurveFollowParams {
      height_offset: 2.,
      side_offset: 8.,
      lookahead: 0.04,
    }
  }
}

/// Everything a pose strategy may read for one frame.
pub struct StrategyInputs<'a> {
  pub frames: &'a FrameSampler,
  pub instances: &'a [SegmentInstance],
  pub group: Option<&'a GroupTransform>,
  pub mode: CameraMode,
  pub tuning: &'a RigTuning,
  pub curve_follow: &'a CurveFollowParams,
}

pub trait PoseStrategy {
  /// Desired pose at `local_t`, the strategy's own sub-progress in `[0, 1]`.  Returns `None` if
  /// the strategy has nothing to frame.
  fn desired_pose(&self, local_t: f32, inputs: &StrategyInputs) -> Option<DesiredPose>;
}

/// Rides alongside the curve itself, looking a little way ahead along it.
pub struct CurveFollow;

impl PoseStrategy for CurveFollow {
  fn desired_pose(&self, local_t: f32, inputs: &StrategyInputs) -> Option<DesiredPose> {
    if inputs.frames.samples().is_empty() {
      return None;
    }
    let identity = GroupTransform::identity();
    let group = inputs.group.unwrap_or(&identity);
    let params = inputs.curve_follow;

    let here = inputs.frames.at(local_t);
    let ahead = inputs.frames.at(local_t + params.lookahead);
    let outward = radial_direction(&here.position);

    let subject = group.transform_point(&here.position);
    let local_eye = here.position + Vec3::y() * params.height_offset + outward * params.side_offset;
    let position = group.transform_point(&local_eye);
    let target = group.transform_point(&ahead.position);

    let world_up = group.orientation * Vec3::y();
    let forward = try_normalize(&(target - position))
      .or_else(|| try_normalize(&(subject - position)))
      .unwrap_or_else(|| group.orientation * -outward);
    let orientation = look_rotation(&forward, &world_up)
      .or_else(|| look_rotation(&forward, &(group.orientation * here.normal)))
      .unwrap_or_else(Quat::identity);

    Some(DesiredPose {
      pose: CameraPose {
        position,
        orientation,
      },
      subject,
    })
  }
}

/// Frames the segment sequence through the camera rig's mode table.
pub struct SegmentFollow;

impl PoseStrategy for SegmentFollow {
  fn desired_pose(&self, local_t: f32, inputs: &StrategyInputs) -> Option<DesiredPose> {
    let active_index = local_t * inputs.instances.len() as f32;
    compute_pose(
      inputs.instances,
      active_index,
      inputs.group,
      inputs.mode,
      inputs.tuning,
    )
  }
}

/// Result of advancing the blender by one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendState {
  pub progress: f32,
  pub phase: Phase,
  pub curve_t: f32,
  pub segment_t: f32,
  /// Share of the segment-follow pose, `0..=1`
  pub weight: f32,
}

impl BlendState {
  /// Fractional segment index the camera is at, blended the same way as the pose.
  pub fn active_index(&self, segment_count: usize) -> f32 {
    let n = segment_count as f32;
    lerp(self.curve_t * n, self.segment_t * n, self.weight)
  }

  /// Blends the two strategies' poses by `weight`.  Strategies with zero weight aren't evaluated,
  /// and if one strategy has nothing to frame the other is used alone.
  pub fn desired_pose(
    &self,
    curve: &dyn PoseStrategy,
    segment: &dyn PoseStrategy,
    inputs: &StrategyInputs,
  ) -> Option<DesiredPose> {
    if self.weight <= 0. {
      return curve
        .desired_pose(self.curve_t, inputs)
        .or_else(|| segment.desired_pose(self.segment_t, inputs));
    }
    if self.weight >= 1. {
      return segment
        .desired_pose(self.segment_t, inputs)
        .or_else(|| curve.desired_pose(self.curve_t, inputs));
    }

    match (
      curve.desired_pose(self.curve_t, inputs),
      segment.desired_pose(self.segment_t, inputs),
    ) {
      (Some(a), Some(b)) => Some(a.blend(&b, self.weight)),
      (a, b) => a.or(b),
    }
  }
}

/// Phase state machine plus the session/event queue.
#[derive(Default)]
pub struct PhaseBlender {
  phase: Option<Phase>,
  last_progress: Option<f32>,
  next_session_id: u64,
  session: Option<PhaseSession>,
  events: Vec<PhaseTransitionEvent>,
}

impl PhaseBlender {
  pub fn phase(&self) -> Option<Phase> {
    self.phase
  }

  pub fn session(&self) -> Option<&PhaseSession> {
    self.session.as_ref()
  }

  /// The open session, if any; a session stays open until its exit is acknowledged.
  pub fn open_session(&self) -> Option<&PhaseSession> {
    self
      .session
      .as_ref()
      .filter(|s| s.state == SessionState::Entered)
  }

  fn next_phase(&self, progress: f32, params: &PhaseParams) -> Phase {
    let split = params.sanitized_split();
    let margin = if params.hysteresis.is_finite() {
      params.hysteresis.max(0.)
    } else {
      0.
    };

    match self.phase {
      None =>
        if progress <= split {
          Phase::Curve
        } else {
          Phase::Segment
        },
      Some(Phase::Curve) =>
        if progress > split + margin {
          Phase::Segment
        } else {
          Phase::Curve
        },
      Some(Phase::Segment) =>
        if progress <= split - margin {
          Phase::Curve
        } else {
          Phase::Segment
        },
    }
  }

  fn open_new_session(&mut self, phase: Phase, direction: Direction, elapsed_secs: f32) {
    if let Some(stale) = self.open_session() {
      log::debug!(
        "Session {} superseded by a new phase change before it exited",
        stale.id
      );
    }

    self.next_session_id += 1;
    let session = PhaseSession {
      id: SessionId(self.next_session_id),
      phase,
      direction,
      entered_at: elapsed_secs,
      state: SessionState::Entered,
    };
    self.session = Some(session);
    self.events.push(PhaseTransitionEvent {
      session_id: session.id,
      direction,
      kind: TransitionKind::Enter,
      phase,
    });
  }

  /// Advances the phase state for this frame's progress.  Non-finite progress holds the previous
  /// value; out-of-range progress is clamped.
  pub fn advance(&mut self, progress: f32, elapsed_secs: f32, params: &PhaseParams) -> BlendState {
    let progress = if progress.is_finite() {
      clamp(progress, 0., 1.)
    } else {
      log::debug!("Non-finite progress; holding previous value");
      self.last_progress.unwrap_or(0.)
    };

    let next = self.next_phase(progress, params);
    if let Some(prev) = self.phase {
      if prev != next {
        let delta = progress - self.last_progress.unwrap_or(progress);
        let direction = if delta > 0. {
          Direction::Forward
        } else if delta < 0. {
          Direction::Backward
        } else if next == Phase::Segment {
          Direction::Forward
        } else {
          Direction::Backward
        };
        self.open_new_session(next, direction, elapsed_secs);
      }
    }
    self.phase = Some(next);
    self.last_progress = Some(progress);

    BlendState {
      progress,
      phase: next,
      curve_t: params.curve_t(progress),
      segment_t: params.segment_t(progress),
      weight: params.segment_weight(progress),
    }
  }

  /// Marks the open session as exited and queues its exit event.  Acknowledgements for any other
  /// id, or repeated acknowledgements, are ignored and return `false`.
  pub fn acknowledge_exit(&mut self, id: SessionId) -> bool {
    let Some(session) = self.session.as_mut() else {
      log::debug!("Ignoring exit for session {id}; no session is open");
      return false;
    };
    if session.id != id || session.state == SessionState::Exited {
      log::debug!("Ignoring stale exit for session {id}");
      return false;
    }

    session.state = SessionState::Exited;
    self.events.push(PhaseTransitionEvent {
      session_id: id,
      direction: session.direction,
      kind: TransitionKind::Exit,
      phase: session.phase,
    });
    true
  }

  pub fn drain_events(&mut self) -> Vec<PhaseTransitionEvent> {
    std::mem::take(&mut self.events)
  }

  pub fn pending_events(&self) -> &[PhaseTransitionEvent] {
    &self.events
  }

  pub(crate) fn drop_oldest_events(&mut self, count: usize) {
    let count = count.min(self.events.len());
    self.events.drain(..count);
  }
}
