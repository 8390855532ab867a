pub extern crate rand;
pub extern crate rand_pcg;

use rand::Rng;
use rand_pcg::Pcg32;

/// Reference frame rate that per-frame smoothing rates are tuned against.
pub const REFERENCE_FPS: f32 = 60.;

/// Builds a deterministic RNG.  `seed` is split into the PCG state and stream selector, so two
/// seeds differing only in their second component produce independent sequences.
pub fn build_rng(seed: (u64, u64)) -> Pcg32 {
  let mut rng = Pcg32::new(seed.0, seed.1);

  // pump the rng a few times to avoid possible issues with seeding
  for _ in 0..8 {
    let _ = rng.gen::<f32>();
  }

  rng
}

pub fn clamp(val: f32, min: f32, max: f32) -> f32 {
  if val < min {
    return min;
  }
  if val > max {
    return max;
  }
  val
}

#[inline(always)]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
  a + (b - a) * t
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
  if edge1 == edge0 {
    return if x < edge0 { 0. } else { 1. };
  }
  let t = clamp((x - edge0) / (edge1 - edge0), 0.0, 1.0);
  return t * t * (3.0 - 2.0 * t);
}

pub fn ease_out_cubic(t: f32) -> f32 {
  let inv = 1. - clamp(t, 0., 1.);
  1. - inv * inv * inv
}

/// Interpolation factor for exponential smoothing toward a target.
///
/// `rate` is the fraction of the remaining distance covered per frame at 60fps; scaling the
/// exponent by `dt * 60` makes the decay depend only on elapsed time, not on how that time was
/// split into frames.
pub fn damp_factor(rate: f32, dt_secs: f32) -> f32 {
  if !dt_secs.is_finite() || dt_secs <= 0. || !rate.is_finite() || rate <= 0. {
    return 0.;
  }
  1. - (-rate * REFERENCE_FPS * dt_secs).exp()
}
