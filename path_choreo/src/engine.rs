use nanoserde::SerJson;

use crate::{
  activation::{compose_segment_transforms, ActivationField, SegmentTransform},
  camera_rig::CameraRig,
  config::ChoreoConfig,
  curve::Curve,
  fade::FadeOverlay,
  frames::FrameSampler,
  phase::{
    BlendState, CurveFollow, Phase, PhaseBlender, PhaseTransitionEvent, SegmentFollow, SessionId,
    StrategyInputs,
  },
  placement::{InstancePlacer, SegmentInstance},
  transform::{CameraPose, GroupTransform},
  ErrorStack,
};

/// Queued events beyond this are dropped oldest-first if the host never drains them
const MAX_QUEUED_EVENTS: usize = 64;

/// Read-only view of the engine's per-frame state, for debug overlays.
#[derive(Clone, Debug, PartialEq, SerJson)]
pub struct MonitorSnapshot {
  pub position: Vec<f32>,
  /// `[x, y, z, w]`
  pub orientation: Vec<f32>,
  pub phase: Option<String>,
  pub progress: f32,
  #[nserde(rename = "blendWeight")]
  pub blend_weight: f32,
  #[nserde(rename = "activeIndex")]
  pub active_index: f32,
  #[nserde(rename = "openSession")]
  pub open_session: Option<u64>,
  #[nserde(rename = "segmentCount")]
  pub segment_count: u32,
}

/// Owns all choreography state and advances it one frame at a time.
pub struct ChoreoEngine {
  config: ChoreoConfig,
  /// Set when the host supplies its own control points; otherwise the path is a helix built from
  /// the config.
  custom_curve: Option<Curve>,
  curve: Curve,
  frames: FrameSampler,
  placer: InstancePlacer,
  activation: ActivationField,
  rig: CameraRig,
  blender: PhaseBlender,
  group: Option<GroupTransform>,
  warned_missing_group: bool,
  elapsed_secs: f32,
  camera: CameraPose,
  last_state: Option<BlendState>,
  active_index: f32,
  segment_transforms: Vec<SegmentTransform>,
}

impl Default for ChoreoEngine {
  fn default() -> Self {
    Self::new(ChoreoConfig::default())
  }
}

impl ChoreoEngine {
  pub fn new(config: ChoreoConfig) -> Self {
    let curve = Curve::helix(config.curve);
    ChoreoEngine {
      config,
      custom_curve: None,
      curve,
      frames: FrameSampler::default(),
      placer: InstancePlacer::default(),
      activation: ActivationField::default(),
      rig: CameraRig::default(),
      blender: PhaseBlender::default(),
      group: None,
      warned_missing_group: false,
      elapsed_secs: 0.,
      camera: CameraPose::default(),
      last_state: None,
      active_index: 0.,
      segment_transforms: Vec::new(),
    }
  }

  pub fn config(&self) -> &ChoreoConfig {
    &self.config
  }

  /// Changes made here take effect on the next [`ChoreoEngine::update`].
  pub fn config_mut(&mut self) -> &mut ChoreoConfig {
    &mut self.config
  }

  pub fn set_param(&mut self, key: &str, value: f32) -> Result<(), ErrorStack> {
    self
      .config
      .set(key, value)
      .map_err(|err| err.wrap("Error setting engine parameter"))
  }

  pub fn set_camera_mode(&mut self, name: &str) -> Result<(), ErrorStack> {
    self.config.set_camera_mode(name)
  }

  /// `None` means the path's parent sits at the world origin.
  pub fn set_group_transform(&mut self, group: Option<GroupTransform>) {
    self.group = group;
  }

  /// Replaces the helix with a custom curve; `None` goes back to the configured helix.
  pub fn set_curve(&mut self, curve: Option<Curve>) {
    self.custom_curve = curve;
  }

  pub fn curve(&self) -> &Curve {
    &self.curve
  }

  fn sync_curve(&mut self) {
    if let Some(custom) = &self.custom_curve {
      if self.curve != *custom {
        self.curve = custom.clone();
      }
      return;
    }

    let wanted = self.config.curve.sanitized();
    let is_current = matches!(&self.curve, Curve::Helix(helix) if *helix.params() == wanted);
    if !is_current {
      self.curve = Curve::helix(self.config.curve);
    }
  }

  /// Advances everything by one frame.
  ///
  /// `progress` is the normalized scroll position; values outside `[0, 1]` are clamped and
  /// non-finite values hold the previous frame's progress.  Negative or non-finite `dt_secs` is
  /// treated as zero.
  pub fn update(&mut self, progress: f32, dt_secs: f32) {
    let dt = if dt_secs.is_finite() {
      dt_secs.max(0.)
    } else {
      0.
    };
    self.elapsed_secs += dt;

    self.sync_curve();
    let closed = self.config.closed || self.curve.is_closed();
    self
      .frames
      .ensure(&self.curve, self.config.sample_count, closed);
    if self.placer.ensure(&self.curve, &self.config.layout) {
      self.activation.reset();
    }

    if self.group.is_none() && !self.warned_missing_group {
      log::warn!("No group transform set; placing the path at the world origin");
      self.warned_missing_group = true;
    }

    let state = self
      .blender
      .advance(progress, self.elapsed_secs, &self.config.phase);
    self.active_index = state.active_index(self.placer.instances().len());

    let inputs = StrategyInputs {
      frames: &self.frames,
      instances: self.placer.instances(),
      group: self.group.as_ref(),
      mode: self.config.camera_mode,
      tuning: &self.config.rig,
      curve_follow: &self.config.curve_follow,
    };
    let desired = state.desired_pose(&CurveFollow, &SegmentFollow, &inputs);
    if let Some(desired) = desired {
      self.camera = self.rig.step(&desired, dt, &self.config.rig);
    }
    self.last_state = Some(state);

    self.activation.update(
      self.placer.instances_mut(),
      self.active_index,
      &self.config.activation,
      dt,
    );

    let identity = GroupTransform::identity();
    compose_segment_transforms(
      self.placer.instances(),
      &self.config.idle,
      self.elapsed_secs,
      self.group.as_ref().unwrap_or(&identity),
      &mut self.segment_transforms,
    );

    self.trim_event_queue();
  }

  fn trim_event_queue(&mut self) {
    let pending = self.blender.pending_events().len();
    if pending > MAX_QUEUED_EVENTS {
      log::warn!(
        "{} transition events were never drained; dropping the oldest",
        pending - MAX_QUEUED_EVENTS
      );
      self.blender.drop_oldest_events(pending - MAX_QUEUED_EVENTS);
    }
  }

  pub fn camera_pose(&self) -> &CameraPose {
    &self.camera
  }

  /// Where the camera is heading once smoothing and the displacement cap catch up.
  pub fn camera_goal(&self) -> Option<&CameraPose> {
    self.rig.goal()
  }

  pub fn segment_transforms(&self) -> &[SegmentTransform] {
    &self.segment_transforms
  }

  pub fn instances(&self) -> &[SegmentInstance] {
    self.placer.instances()
  }

  pub fn frames(&self) -> &FrameSampler {
    &self.frames
  }

  pub fn active_index(&self) -> f32 {
    self.active_index
  }

  pub fn phase(&self) -> Option<Phase> {
    self.blender.phase()
  }

  pub fn elapsed_secs(&self) -> f32 {
    self.elapsed_secs
  }

  pub fn pending_events(&self) -> &[PhaseTransitionEvent] {
    self.blender.pending_events()
  }

  pub fn drain_events(&mut self) -> Vec<PhaseTransitionEvent> {
    self.blender.drain_events()
  }

  pub fn acknowledge_exit(&mut self, id: SessionId) -> bool {
    self.blender.acknowledge_exit(id)
  }

  /// Feeds queued events to `overlay` without draining them and acknowledges the exit it asks
  /// for, if any.  Returns the overlay's opacity.
  pub fn drive_overlay(&mut self, overlay: &mut FadeOverlay, dt_secs: f32) -> f32 {
    for evt in self.blender.pending_events() {
      overlay.handle_event(evt, &self.config.fade);
    }
    if let Some(id) = overlay.update(
      &self.camera,
      self.rig.goal(),
      dt_secs,
      &self.config.fade,
      &self.config.stability,
    ) {
      if self.blender.acknowledge_exit(id) {
        if let Some(evt) = self.blender.pending_events().last() {
          overlay.handle_event(evt, &self.config.fade);
        }
      }
    }
    overlay.opacity()
  }

  pub fn snapshot(&self) -> MonitorSnapshot {
    let q = self.camera.orientation.quaternion();
    let state = self.last_state;
    MonitorSnapshot {
      position: self.camera.position.iter().copied().collect(),
      orientation: vec![q.i, q.j, q.k, q.w],
      phase: state.map(|s| s.phase.to_string()),
      progress: state.map(|s| s.progress).unwrap_or(0.),
      blend_weight: state.map(|s| s.weight).unwrap_or(0.),
      active_index: self.active_index,
      open_session: self.blender.open_session().map(|s| s.id.0),
      segment_count: self.placer.instances().len() as u32,
    }
  }
}
