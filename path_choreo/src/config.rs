use std::{collections::HashMap, str::FromStr};

use nanoserde::DeJson;
use strum::IntoEnumIterator;

use crate::{
  activation::{ActivationParams, IdleMotionParams},
  camera_rig::{CameraMode, RigTuning},
  curve::{CurveParams, MAX_SAMPLE_COUNT},
  fade::{FadeParams, StabilityParams},
  phase::{CurveFollowParams, PhaseParams},
  placement::{LayoutParams, MAX_SEGMENT_COUNT},
  ErrorStack,
};

/// Every tunable of the engine.  Values can be set individually by their camelCase key, which is
/// how hosts drive the engine from a flat parameter panel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChoreoConfig {
  pub curve: CurveParams,
  pub sample_count: usize,
  pub closed: bool,
  pub layout: LayoutParams,
  pub activation: ActivationParams,
  pub idle: IdleMotionParams,
  pub camera_mode: CameraMode,
  pub rig: RigTuning,
  pub curve_follow: CurveFollowParams,
  pub phase: PhaseParams,
  pub fade: FadeParams,
  pub stability: StabilityParams,
}

impl Default for ChoreoConfig {
  fn default() -> Self {
    ChoreoConfig {
      curve: CurveParams::default(),
      sample_count: 512,
      closed: false,
      layout: LayoutParams::default(),
      activation: ActivationParams::default(),
      idle: IdleMotionParams::default(),
      camera_mode: CameraMode::default(),
      rig: RigTuning::default(),
      curve_follow: CurveFollowParams::default(),
      phase: PhaseParams::default(),
      fade: FadeParams::default(),
      stability: StabilityParams::default(),
    }
  }
}

macro_rules! float_fields {
  ($($key:literal => $($path:ident).+),* $(,)?) => {
    const FLOAT_KEYS: &[&str] = &[$($key),*];

    impl ChoreoConfig {
      fn float_field(&self, key: &str) -> Option<f32> {
        match key {
          $($key => Some(self.$($path).+),)*
          _ => None,
        }
      }

      fn float_field_mut(&mut self, key: &str) -> Option<&mut f32> {
        match key {
          $($key => Some(&mut self.$($path).+),)*
          _ => None,
        }
      }
    }
  };
}

float_fields! {
  "turns" => curve.turns,
  "radius" => curve.radius,
  "height" => curve.height,
  "segmentWidth" => layout.spec.width,
  "segmentHeight" => layout.spec.height,
  "segmentDepth" => layout.spec.depth,
  "radialOffset" => layout.radial_offset,
  "scale" => layout.scale,
  "offsetX" => layout.offset.x,
  "offsetY" => layout.offset.y,
  "offsetZ" => layout.offset.z,
  "activeRadius" => activation.radius,
  "activeFade" => activation.fade,
  "riseAmplitude" => activation.amplitude,
  "frontHold" => activation.front_hold,
  "riseSmoothing" => activation.smoothing,
  "floatAmplitude" => idle.float_amplitude,
  "floatSpeed" => idle.float_speed,
  "swayAmplitude" => idle.sway_amplitude,
  "swaySpeed" => idle.sway_speed,
  "wiggleAmplitude" => idle.wiggle_amplitude,
  "wiggleFrequency" => idle.wiggle_frequency,
  "wiggleSpeed" => idle.wiggle_speed,
  "sideOffset" => rig.side_offset,
  "upOffset" => rig.up_offset,
  "extraMove" => rig.extra_move,
  "sideMove" => rig.side_move,
  "yaw" => rig.yaw_deg,
  "pitch" => rig.pitch_deg,
  "roll" => rig.roll_deg,
  "maxPitch" => rig.max_pitch_deg,
  "minY" => rig.min_y,
  "maxY" => rig.max_y,
  "minCameraDistance" => rig.min_distance,
  "maxMoveFactor" => rig.max_move_factor,
  "positionSmoothing" => rig.position_smoothing,
  "rotationSmoothing" => rig.rotation_smoothing,
  "curveHeightOffset" => curve_follow.height_offset,
  "curveSideOffset" => curve_follow.side_offset,
  "lookahead" => curve_follow.lookahead,
  "split" => phase.split,
  "blendBand" => phase.band,
  "hysteresis" => phase.hysteresis,
  "fadeInSecs" => fade.fade_in_secs,
  "fadeOutSecs" => fade.fade_out_secs,
  "maxOpacity" => fade.max_opacity,
  "stablePositionThreshold" => stability.position_threshold,
  "stableAngleThreshold" => stability.angle_threshold_deg,
}

/// Keys holding integers, flags, or enum indices rather than plain floats
const DISCRETE_KEYS: &[&str] = &[
  "sampleCount",
  "closed",
  "segmentCount",
  "cameraMode",
  "stableFrames",
];

fn to_count(key: &str, value: f32, min: f32, max: f32) -> Result<f32, ErrorStack> {
  if value.fract() != 0. {
    return Err(ErrorStack::new(format!(
      "`{key}` must be a whole number; got {value}"
    )));
  }
  Ok(value.clamp(min, max))
}

impl ChoreoConfig {
  /// Builds a config from the defaults overlaid with a flat JSON object of numbers.
  pub fn from_json(json: &str) -> Result<Self, ErrorStack> {
    let mut config = ChoreoConfig::default();
    config.apply_json(json)?;
    Ok(config)
  }

  /// All keys accepted by [`ChoreoConfig::set`] and [`ChoreoConfig::get`].
  pub fn keys() -> impl Iterator<Item = &'static str> {
    FLOAT_KEYS.iter().chain(DISCRETE_KEYS.iter()).copied()
  }

  pub fn get(&self, key: &str) -> Option<f32> {
    if let Some(val) = self.float_field(key) {
      return Some(val);
    }

    match key {
      "sampleCount" => Some(self.sample_count as f32),
      "closed" => Some(if self.closed { 1. } else { 0. }),
      "segmentCount" => Some(self.layout.count as f32),
      "cameraMode" => Some(self.camera_mode as u8 as f32),
      "stableFrames" => Some(self.stability.frames as f32),
      _ => None,
    }
  }

  /// Sets a single parameter by key.  Integer-valued keys reject fractional values and are clamped
  /// into their valid range; `cameraMode` takes the mode's index.
  pub fn set(&mut self, key: &str, value: f32) -> Result<(), ErrorStack> {
    if !value.is_finite() {
      return Err(ErrorStack::new(format!(
        "Value for `{key}` must be finite; got {value}"
      )));
    }

    if let Some(field) = self.float_field_mut(key) {
      *field = value;
      return Ok(());
    }

    match key {
      "sampleCount" => {
        self.sample_count = to_count(key, value, 1., MAX_SAMPLE_COUNT as f32)? as usize;
      },
      "closed" => {
        self.closed = value != 0.;
      },
      "segmentCount" => {
        self.layout.count = to_count(key, value, 0., MAX_SEGMENT_COUNT as f32)? as i32;
      },
      "cameraMode" => {
        let ix = to_count(key, value, 0., u8::MAX as f32)? as u8;
        self.camera_mode = CameraMode::from_repr(ix).ok_or_else(|| {
          ErrorStack::new(format!(
            "Invalid camera mode index {ix}; expected 0..{}",
            CameraMode::iter().count()
          ))
        })?;
      },
      "stableFrames" => {
        self.stability.frames = to_count(key, value, 0., u32::MAX as f32)? as u32;
      },
      _ => return Err(ErrorStack::new(format!("Unknown config key `{key}`"))),
    }
    Ok(())
  }

  pub fn set_camera_mode(&mut self, name: &str) -> Result<(), ErrorStack> {
    self.camera_mode = CameraMode::from_str(name).map_err(|_| {
      let valid = CameraMode::iter()
        .map(|mode| mode.to_string())
        .collect::<Vec<_>>()
        .join(", ");
      ErrorStack::new(format!(
        "Unknown camera mode `{name}`; expected one of: {valid}"
      ))
    })?;
    Ok(())
  }

  /// Applies every entry of a flat `{"key": number}` JSON object.  Either all entries apply or, if
  /// any of them is invalid, none do.
  pub fn apply_json(&mut self, json: &str) -> Result<(), ErrorStack> {
    let entries: HashMap<String, f32> = HashMap::deserialize_json(json).map_err(|err| {
      ErrorStack::new(format!("{err:?}")).wrap("Error parsing config JSON")
    })?;

    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort();

    let mut next = self.clone();
    for key in keys {
      next
        .set(key, entries[key])
        .map_err(|err| err.wrap("Error applying config JSON"))?;
    }
    *self = next;
    Ok(())
  }
}
