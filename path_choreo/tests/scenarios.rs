use path_choreo::{
  camera_rig::{CameraMode, RigTuning},
  curve::CurveParams,
  phase::{
    CurveFollow, CurveFollowParams, Direction, Phase, PhaseBlender, PhaseParams, SegmentFollow,
    StrategyInputs, TransitionKind,
  },
  placement::{layout_instances, LayoutParams},
  ChoreoConfig, ChoreoEngine, Curve, FadeOverlay, FrameSampler, SessionId,
};

const DT: f32 = 1. / 60.;

fn scenario_config() -> ChoreoConfig {
  let mut config = ChoreoConfig::default();
  config.curve = CurveParams {
    turns: 1.,
    radius: 5.,
    height: 10.,
  };
  config.layout.count = 10;
  config.sample_count = 256;
  config.phase = PhaseParams {
    split: 0.4,
    band: 0.03,
    hysteresis: 0.005,
  };
  config
}

#[test]
fn desired_pose_is_continuous_across_split() {
  let curve = Curve::helix(CurveParams {
    turns: 1.,
    radius: 5.,
    height: 10.,
  });
  let frames = FrameSampler::new(&curve, 256, false);
  let instances = layout_instances(
    &curve,
    &LayoutParams {
      count: 10,
      ..Default::default()
    },
  );
  let tuning = RigTuning::default();
  let curve_follow = CurveFollowParams::default();
  let params = PhaseParams {
    split: 0.4,
    band: 0.03,
    hysteresis: 0.,
  };

  for mode in [
    CameraMode::Normal,
    CameraMode::OppositeSide,
    CameraMode::OppositeSideMove,
  ] {
    let inputs = StrategyInputs {
      frames: &frames,
      instances: &instances,
      group: None,
      mode,
      tuning: &tuning,
      curve_follow: &curve_follow,
    };

    let mut blender = PhaseBlender::default();
    let eps = 1e-5;
    let before = blender.advance(params.split - eps, 0., &params);
    let after = blender.advance(params.split + eps, 0., &params);
    assert_eq!(before.phase, Phase::Curve);
    assert_eq!(after.phase, Phase::Segment);

    let a = before
      .desired_pose(&CurveFollow, &SegmentFollow, &inputs)
      .unwrap();
    let b = after
      .desired_pose(&CurveFollow, &SegmentFollow, &inputs)
      .unwrap();
    let jump = (a.pose.position - b.pose.position).norm();
    assert!(jump < 0.05, "mode={mode}: position jumped by {jump}");
    let turn = a.pose.orientation.angle_to(&b.pose.orientation);
    assert!(turn < 0.01, "mode={mode}: orientation jumped by {turn}");

    // the band is wide enough that its edges really are different poses
    let start = blender.advance(params.split - params.band, 0., &params);
    let end = blender.advance(params.split + params.band, 0., &params);
    assert_eq!(start.weight, 0.);
    assert_eq!(end.weight, 1.);
  }
}

#[test]
fn scrolling_through_emits_session_handshake() {
  let mut engine = ChoreoEngine::new(scenario_config());

  for frame in 0..=300 {
    engine.update(frame as f32 / 300., DT);
    assert!(engine.camera_pose().is_finite(), "frame {frame}");
  }
  let events = engine.drain_events();
  assert_eq!(events.len(), 1);
  let entered = events[0];
  assert_eq!(entered.kind, TransitionKind::Enter);
  assert_eq!(entered.direction, Direction::Forward);
  assert_eq!(entered.phase, Phase::Segment);

  assert!(engine.acknowledge_exit(entered.session_id));
  assert!(!engine.acknowledge_exit(entered.session_id));
  let exits = engine.drain_events();
  assert_eq!(exits.len(), 1);
  assert_eq!(exits[0].kind, TransitionKind::Exit);

  for frame in (0..=300).rev() {
    engine.update(frame as f32 / 300., DT);
  }
  let events = engine.drain_events();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].direction, Direction::Backward);
  assert_eq!(events[0].phase, Phase::Curve);
  assert_ne!(events[0].session_id, entered.session_id);
}

#[test]
fn jitter_at_split_does_not_flap() {
  let mut engine = ChoreoEngine::new(scenario_config());
  engine.update(0.2, DT);
  for frame in 0..120 {
    let jitter = if frame % 2 == 0 { 0.003 } else { -0.003 };
    engine.update(0.4 + jitter, DT);
  }
  assert!(engine.drain_events().is_empty());
  assert_eq!(engine.phase(), Some(Phase::Curve));
}

#[test]
fn rapid_reversal_supersedes_open_session() {
  let mut engine = ChoreoEngine::new(scenario_config());
  engine.update(0.1, DT);
  engine.update(0.9, DT);
  engine.update(0.1, DT);
  engine.update(0.9, DT);

  let events = engine.drain_events();
  let ids: Vec<SessionId> = events.iter().map(|e| e.session_id).collect();
  assert_eq!(ids, vec![SessionId(1), SessionId(2), SessionId(3)]);
  assert!(events.iter().all(|e| e.kind == TransitionKind::Enter));

  // only the newest session can be exited
  assert!(!engine.acknowledge_exit(SessionId(1)));
  assert!(!engine.acknowledge_exit(SessionId(2)));
  assert!(engine.acknowledge_exit(SessionId(3)));
  assert_eq!(engine.snapshot().open_session, None);
}

#[test]
fn overlay_exits_once_camera_settles() {
  let mut engine = ChoreoEngine::new(scenario_config());
  let mut overlay = FadeOverlay::default();

  engine.update(0.1, DT);
  engine.update(0.8, DT);
  assert_eq!(engine.snapshot().open_session, Some(1));

  let mut peak_opacity: f32 = 0.;
  for _ in 0..900 {
    engine.update(0.8, DT);
    peak_opacity = peak_opacity.max(engine.drive_overlay(&mut overlay, DT));
    if engine.snapshot().open_session.is_none() {
      break;
    }
  }
  assert_eq!(peak_opacity, 1.);
  assert_eq!(engine.snapshot().open_session, None);

  let kinds: Vec<TransitionKind> = engine.drain_events().iter().map(|e| e.kind).collect();
  assert_eq!(kinds, vec![TransitionKind::Enter, TransitionKind::Exit]);

  for _ in 0..120 {
    engine.update(0.8, DT);
    engine.drive_overlay(&mut overlay, DT);
  }
  assert_eq!(overlay.opacity(), 0.);
}

#[test]
fn hostile_inputs_never_produce_nan() {
  let mut engine = ChoreoEngine::new(scenario_config());
  let inputs = [
    (0.5, DT),
    (f32::NAN, DT),
    (f32::INFINITY, DT),
    (-4., DT),
    (7., f32::NAN),
    (0.3, -1.),
    (0.6, 10.),
    (f32::NEG_INFINITY, f32::INFINITY),
  ];
  for (progress, dt) in inputs {
    engine.update(progress, dt);
    assert!(engine.camera_pose().is_finite(), "progress={progress} dt={dt}");
    for transform in engine.segment_transforms() {
      assert!(transform.position.iter().all(|c| c.is_finite()));
      assert!(transform.rotation.coords.iter().all(|c| c.is_finite()));
    }
    assert!(engine.active_index().is_finite());
  }

  for key in ["radius", "segmentCount", "turns", "height"] {
    engine.set_param(key, 0.).unwrap();
    engine.update(0.5, DT);
    assert!(engine.camera_pose().is_finite(), "{key}=0");
  }
}

#[test]
fn extreme_layout_params_still_give_finite_transforms() {
  let assert_finite = |engine: &ChoreoEngine, label: &str| {
    assert!(engine.camera_pose().is_finite(), "{label}");
    assert!(!engine.segment_transforms().is_empty(), "{label}");
    for transform in engine.segment_transforms() {
      assert!(transform.position.iter().all(|c| c.is_finite()), "{label}");
      assert!(transform.rotation.coords.iter().all(|c| c.is_finite()), "{label}");
    }
  };

  let mut engine = ChoreoEngine::new(scenario_config());
  engine.set_param("scale", 1e20).unwrap();
  engine.set_param("radialOffset", 1e20).unwrap();
  engine.update(0.5, DT);
  assert_finite(&engine, "huge scale and radial offset");

  let mut engine = ChoreoEngine::new(scenario_config());
  engine.config_mut().layout.offset.x = f32::NAN;
  engine.config_mut().layout.spec.depth = f32::INFINITY;
  engine.update(0.5, DT);
  assert_finite(&engine, "non-finite offset and depth");

  let mut engine = ChoreoEngine::new(scenario_config());
  engine.set_param("riseAmplitude", f32::MAX).unwrap();
  engine.set_param("floatAmplitude", f32::MAX).unwrap();
  for _ in 0..10 {
    engine.update(0.5, DT);
  }
  assert_finite(&engine, "huge rise and float amplitudes");
}

fn overlay_exit_time_and_drift(dt: f32) -> (f32, f32) {
  let mut engine = ChoreoEngine::new(scenario_config());
  let mut overlay = FadeOverlay::default();
  engine.update(0.1, dt);

  let mut exit = None;
  let steps = (6. / dt) as usize;
  for step in 0..steps {
    engine.update(0.9, dt);
    engine.drive_overlay(&mut overlay, dt);
    if exit.is_none() && engine.snapshot().open_session.is_none() {
      exit = Some(((step + 1) as f32 * dt, engine.camera_pose().position));
    }
  }

  let (secs, position_at_exit) = exit.expect("session never exited");
  let settled = engine.camera_pose().position;
  (secs, (settled - position_at_exit).norm())
}

#[test]
fn overlay_exit_waits_for_settle_at_any_frame_rate() {
  let threshold = ChoreoConfig::default().stability.position_threshold;
  let (coarse_secs, coarse_drift) = overlay_exit_time_and_drift(1. / 60.);
  let (fine_secs, fine_drift) = overlay_exit_time_and_drift(1. / 2000.);

  assert!(coarse_drift <= threshold * 2., "drift at 60fps: {coarse_drift}");
  assert!(fine_drift <= threshold * 2., "drift at 2000fps: {fine_drift}");
  assert!(
    (coarse_secs - fine_secs).abs() < 0.3,
    "exit at {coarse_secs}s vs {fine_secs}s"
  );
}

#[test]
fn identical_inputs_give_identical_frames() {
  let mut a = ChoreoEngine::new(scenario_config());
  let mut b = ChoreoEngine::new(scenario_config());
  for frame in 0..200 {
    let progress = ((frame as f32) * 0.05).sin() * 0.5 + 0.5;
    a.update(progress, DT);
    b.update(progress, DT);
  }
  assert_eq!(a.camera_pose(), b.camera_pose());
  assert_eq!(a.segment_transforms(), b.segment_transforms());
}

#[test]
fn segments_near_camera_rise_and_distant_ones_recede() {
  let mut config = scenario_config();
  config.activation.front_hold = 0.;
  config.idle.float_amplitude = 0.;
  config.idle.sway_amplitude = 0.;
  config.idle.wiggle_amplitude = 0.;
  let mut engine = ChoreoEngine::new(config);

  // progress 0.7 => segmentT 0.5 => active index 5
  for _ in 0..600 {
    engine.update(0.7, DT);
  }
  assert!((engine.active_index() - 5.).abs() < 1e-4);

  let instances = engine.instances();
  let transforms = engine.segment_transforms();
  let rise = |ix: usize| transforms[ix].position.y - instances[ix].base_position.y;
  assert!(rise(5).abs() < 1e-3);
  assert!(rise(4).abs() < 1e-3);
  // index 0: center 0.5, distance 4.5, over 1.5 of a 2 wide fade
  assert!((rise(0) - -7. * 0.75).abs() < 1e-2, "rise={}", rise(0));
}
