use nanoserde::SerJson;
use path_choreo::{
  phase::events_to_json, ChoreoConfig, ChoreoEngine, Curve, FadeOverlay, GroupTransform,
  SessionId, Vec3,
};
use wasm_bindgen::prelude::*;

static mut DID_INIT: bool = false;

fn maybe_init() {
  unsafe {
    if DID_INIT {
      return;
    }
    DID_INIT = true;
  }

  console_error_panic_hook::set_once();
  wasm_logger::init(wasm_logger::Config::new(log::Level::Info));
}

pub struct ChoreoCtx {
  pub engine: ChoreoEngine,
  pub overlay: FadeOverlay,
  pub last_result: Result<(), String>,
}

impl ChoreoCtx {
  fn record<T>(&mut self, res: Result<T, path_choreo::ErrorStack>) -> bool {
    match res {
      Ok(_) => {
        self.last_result = Ok(());
        true
      },
      Err(err) => {
        log::error!("{err}");
        self.last_result = Err(err.to_string());
        false
      },
    }
  }
}

/// Creates an engine from a flat JSON object of numeric params.  An empty string uses the
/// defaults; invalid JSON also falls back to the defaults and is reported via
/// `choreo_get_err`.
#[wasm_bindgen]
pub fn choreo_init(config_json: &str) -> *mut ChoreoCtx {
  maybe_init();

  let config = if config_json.trim().is_empty() {
    Ok(ChoreoConfig::default())
  } else {
    ChoreoConfig::from_json(config_json)
  };
  let mut ctx = ChoreoCtx {
    engine: ChoreoEngine::default(),
    overlay: FadeOverlay::default(),
    last_result: Ok(()),
  };
  match config {
    Ok(config) => ctx.engine = ChoreoEngine::new(config),
    Err(err) => {
      ctx.record::<()>(Err(err.wrap("Falling back to default config")));
    },
  }

  Box::into_raw(Box::new(ctx))
}

#[wasm_bindgen]
pub fn choreo_free(ctx: *mut ChoreoCtx) {
  drop(unsafe { Box::from_raw(ctx) });
}

/// Empty if the last fallible call succeeded
#[wasm_bindgen]
pub fn choreo_get_err(ctx: *const ChoreoCtx) -> String {
  let ctx = unsafe { &*ctx };
  match &ctx.last_result {
    Ok(_) => String::new(),
    Err(err) => err.clone(),
  }
}

#[wasm_bindgen]
pub fn choreo_set_param(ctx: *mut ChoreoCtx, key: &str, value: f32) -> bool {
  let ctx = unsafe { &mut *ctx };
  let res = ctx.engine.set_param(key, value);
  ctx.record(res)
}

#[wasm_bindgen]
pub fn choreo_get_param(ctx: *const ChoreoCtx, key: &str) -> f32 {
  let ctx = unsafe { &*ctx };
  ctx.engine.config().get(key).unwrap_or(f32::NAN)
}

#[wasm_bindgen]
pub fn choreo_set_camera_mode(ctx: *mut ChoreoCtx, name: &str) -> bool {
  let ctx = unsafe { &mut *ctx };
  let res = ctx.engine.set_camera_mode(name);
  ctx.record(res)
}

/// Sets the path's parent transform from a column-major 4x4 matrix.  An empty slice clears it.
#[wasm_bindgen]
pub fn choreo_set_group_transform(ctx: *mut ChoreoCtx, matrix: &[f32]) -> bool {
  let ctx = unsafe { &mut *ctx };
  if matrix.is_empty() {
    ctx.engine.set_group_transform(None);
    ctx.last_result = Ok(());
    return true;
  }

  let res = GroupTransform::from_column_major(matrix)
    .map(|group| ctx.engine.set_group_transform(Some(group)));
  ctx.record(res)
}

/// Replaces the helix with a Catmull-Rom spline through `[x, y, z, x, y, z, ...]`.  Fewer than two
/// points restores the helix.
#[wasm_bindgen]
pub fn choreo_set_spline(ctx: *mut ChoreoCtx, points: &[f32], closed: bool) {
  let ctx = unsafe { &mut *ctx };
  if points.len() < 6 {
    ctx.engine.set_curve(None);
    return;
  }

  let points = points
    .chunks_exact(3)
    .map(|c| Vec3::new(c[0], c[1], c[2]));
  ctx.engine.set_curve(Some(Curve::spline(points, closed)));
}

#[wasm_bindgen]
pub fn choreo_update(ctx: *mut ChoreoCtx, progress: f32, dt_secs: f32) {
  let ctx = unsafe { &mut *ctx };
  ctx.engine.update(progress, dt_secs);
}

/// Runs the built-in fade overlay for one frame and returns its opacity.  The overlay acknowledges
/// session exits on its own; hosts that handle transitions themselves should not call this.
#[wasm_bindgen]
pub fn choreo_update_overlay(ctx: *mut ChoreoCtx, dt_secs: f32) -> f32 {
  let ctx = unsafe { &mut *ctx };
  ctx.engine.drive_overlay(&mut ctx.overlay, dt_secs)
}

/// `[px, py, pz, qx, qy, qz, qw]`
#[wasm_bindgen]
pub fn choreo_get_camera_pose(ctx: *const ChoreoCtx) -> Vec<f32> {
  let ctx = unsafe { &*ctx };
  ctx.engine.camera_pose().to_array().to_vec()
}

/// One column-major 4x4 matrix per segment, in index order
#[wasm_bindgen]
pub fn choreo_get_segment_transforms(ctx: *const ChoreoCtx) -> Vec<f32> {
  let ctx = unsafe { &*ctx };
  let transforms = ctx.engine.segment_transforms();
  let mut out = Vec::with_capacity(transforms.len() * 16);
  for transform in transforms {
    out.extend_from_slice(transform.to_matrix().as_slice());
  }
  out
}

#[wasm_bindgen]
pub fn choreo_get_active_index(ctx: *const ChoreoCtx) -> f32 {
  let ctx = unsafe { &*ctx };
  ctx.engine.active_index()
}

/// Drains queued transition events as a JSON array
#[wasm_bindgen]
pub fn choreo_take_events(ctx: *mut ChoreoCtx) -> String {
  let ctx = unsafe { &mut *ctx };
  events_to_json(&ctx.engine.drain_events())
}

#[wasm_bindgen]
pub fn choreo_ack_exit(ctx: *mut ChoreoCtx, session_id: u64) -> bool {
  let ctx = unsafe { &mut *ctx };
  ctx.engine.acknowledge_exit(SessionId(session_id))
}

#[wasm_bindgen]
pub fn choreo_snapshot(ctx: *const ChoreoCtx) -> String {
  let ctx = unsafe { &*ctx };
  ctx.engine.snapshot().serialize_json()
}
