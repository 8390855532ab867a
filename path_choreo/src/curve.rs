use std::f32::consts::TAU;

use nalgebra::Unit;

use crate::transform::{is_finite_vec, try_normalize, Quat, Vec3};

/// Helix radii are clamped to at least this so the curve never collapses onto its axis.
pub const MIN_RADIUS: f32 = 1e-4;
/// Upper bound on frame table resolution.
pub const MAX_SAMPLE_COUNT: usize = 1 << 16;

const FRAME_EPSILON: f32 = 1e-6;
/// Below this horizontal tangent magnitude the world up axis can't seed the first normal.
const SEED_EPSILON: f32 = 1e-3;
const FINITE_DIFF_STEP: f32 = 1e-3;

#[inline]
pub(crate) fn clamp_t(t: f32) -> f32 {
  if t.is_nan() {
    return 0.;
  }
  t.clamp(0., 1.)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveParams {
  /// Number of revolutions over the full `[0, 1]` parameter range
  pub turns: f32,
  pub radius: f32,
  pub height: f32,
}

impl Default for CurveParams {
  fn default() -> Self {
    CurveParams {
      turns: 1.,
      radius: 5.,
      height: 10.,
    }
  }
}

impl CurveParams {
  /// Replaces non-finite values and clamps the radius to [`MIN_RADIUS`].
  pub fn sanitized(&self) -> Self {
    let finite_or_zero = |v: f32| if v.is_finite() { v } else { 0. };
    CurveParams {
      turns: finite_or_zero(self.turns),
      radius: if self.radius.is_finite() {
        self.radius.max(MIN_RADIUS)
      } else {
        MIN_RADIUS
      },
      height: finite_or_zero(self.height),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurvePoint {
  pub position: Vec3,
  /// Unit length
  pub tangent: Vec3,
}

/// A point on the curve along with its transported orthonormal frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
  pub t: f32,
  pub position: Vec3,
  pub tangent: Vec3,
  pub normal: Vec3,
  pub binormal: Vec3,
}

/// Parametric curve over `t` in `[0, 1]`.
pub trait PathCurve {
  fn position(&self, t: f32) -> Vec3;

  /// Derivative of [`PathCurve::position`] with respect to `t`.  Doesn't need to be normalized
  /// and may be zero at degenerate points.
  fn derivative(&self, t: f32) -> Vec3;

  fn evaluate(&self, t: f32) -> CurvePoint {
    let t = clamp_t(t);
    let position = self.position(t);
    let tangent = try_normalize(&self.derivative(t))
      .or_else(|| {
        let a = self.position((t - FINITE_DIFF_STEP).max(0.));
        let b = self.position((t + FINITE_DIFF_STEP).min(1.));
        try_normalize(&(b - a))
      })
      .unwrap_or_else(Vec3::x);
    CurvePoint { position, tangent }
  }

  /// Samples `sample_count + 1` evenly spaced points and builds rotation-minimizing frames for
  /// them.
  ///
  /// Each frame is derived from the previous one by applying the smallest rotation that takes the
  /// previous tangent onto the current one, so the normal never flips between adjacent samples
  /// the way an independently computed Frenet normal does at inflection points or near-vertical
  /// stretches.  When `closed` is set, the angular mismatch accumulated between the first and last
  /// frame is spread evenly over the whole sequence so the loop joins without a seam.
  fn compute_frames(&self, sample_count: usize, closed: bool) -> Vec<Sample> {
    let n = sample_count.clamp(1, MAX_SAMPLE_COUNT);
    let points: Vec<CurvePoint> = (0..=n)
      .map(|i| self.evaluate(i as f32 / n as f32))
      .collect();

    let t0 = points[0].tangent;
    let mut normal = seed_normal(&t0);
    let mut binormal = t0.cross(&normal).normalize();

    let mut samples = Vec::with_capacity(n + 1);
    samples.push(Sample {
      t: 0.,
      position: points[0].position,
      tangent: t0,
      normal,
      binormal,
    });

    for i in 1..=n {
      let prev_tangent = points[i - 1].tangent;
      let ti = points[i].tangent;

      // `rotation_between` has no answer for antiparallel tangents (a cusp); falling through to
      // the projection below handles that case.
      let rotated = match Quat::rotation_between(&prev_tangent, &ti) {
        Some(rot) => rot * normal,
        None => normal,
      };
      normal = orthogonalize(&rotated, &ti, &binormal);
      binormal = ti.cross(&normal).normalize();

      samples.push(Sample {
        t: i as f32 / n as f32,
        position: points[i].position,
        tangent: ti,
        normal,
        binormal,
      });
    }

    if closed {
      close_frames(&mut samples);
    }

    samples
  }
}

/// Picks the initial normal as world up projected onto the plane orthogonal to `tangent`.  If the
/// tangent is (nearly) vertical, +X is used instead.
fn seed_normal(tangent: &Vec3) -> Vec3 {
  let horizontal = (tangent.x * tangent.x + tangent.z * tangent.z).sqrt();
  let reference = if horizontal < SEED_EPSILON {
    Vec3::x()
  } else {
    Vec3::y()
  };
  orthogonalize(&reference, tangent, &tangent.cross(&reference))
}

/// Projects `normal` onto the plane orthogonal to `tangent` and normalizes it.  If the projection
/// vanishes, `tangent x binormal` is tried, then any vector perpendicular to the tangent.
pub(crate) fn orthogonalize(normal: &Vec3, tangent: &Vec3, binormal: &Vec3) -> Vec3 {
  let mut proj = normal - tangent * tangent.dot(normal);
  if !is_finite_vec(&proj) || proj.norm_squared() < FRAME_EPSILON {
    proj = tangent.cross(binormal);
    if !is_finite_vec(&proj) || proj.norm_squared() < FRAME_EPSILON {
      let arbitrary = if tangent.dot(&Vec3::y()).abs() > 0.999 {
        Vec3::x()
      } else {
        Vec3::y()
      };
      proj = tangent.cross(&arbitrary);
    }
  }
  try_normalize(&proj).unwrap_or_else(Vec3::y)
}

fn close_frames(samples: &mut [Sample]) {
  let n = samples.len() - 1;
  if n == 0 {
    return;
  }
  let first = samples[0];
  let last = samples[n];

  let mut theta = common::clamp(first.normal.dot(&last.normal), -1., 1.).acos() / n as f32;
  if first.tangent.dot(&first.normal.cross(&last.normal)) > 0. {
    theta = -theta;
  }
  if theta.abs() < FRAME_EPSILON {
    return;
  }

  for (i, sample) in samples.iter_mut().enumerate().skip(1) {
    let axis = Unit::new_normalize(sample.tangent);
    let twisted = Quat::from_axis_angle(&axis, theta * i as f32) * sample.normal;
    sample.normal = orthogonalize(&twisted, &sample.tangent, &sample.binormal);
    sample.binormal = sample.tangent.cross(&sample.normal).normalize();
  }
}

/// `position(t) = (cos(2π·turns·t)·radius, (t − 0.5)·height, sin(2π·turns·t)·radius)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Helix {
  params: CurveParams,
}

impl Helix {
  pub fn new(params: CurveParams) -> Self {
    Helix {
      params: params.sanitized(),
    }
  }

  pub fn params(&self) -> &CurveParams {
    &self.params
  }
}

impl PathCurve for Helix {
  fn position(&self, t: f32) -> Vec3 {
    let CurveParams {
      turns,
      radius,
      height,
    } = self.params;
    let theta = TAU * turns * t;
    Vec3::new(theta.cos() * radius, (t - 0.5) * height, theta.sin() * radius)
  }

  fn derivative(&self, t: f32) -> Vec3 {
    let CurveParams {
      turns,
      radius,
      height,
    } = self.params;
    let omega = TAU * turns;
    let theta = omega * t;
    Vec3::new(
      -theta.sin() * radius * omega,
      height,
      theta.cos() * radius * omega,
    )
  }
}

/// Uniform Catmull-Rom spline through an ordered list of control points.  The parameter is spread
/// evenly over the spans between control points.
#[derive(Clone, Debug, PartialEq)]
pub struct CatmullRom {
  points: Vec<Vec3>,
  closed: bool,
}

impl CatmullRom {
  pub fn new(points: impl IntoIterator<Item = Vec3>, closed: bool) -> Self {
    let mut dropped = 0usize;
    let points = points
      .into_iter()
      .filter(|p| {
        let keep = is_finite_vec(p);
        if !keep {
          dropped += 1;
        }
        keep
      })
      .collect();
    if dropped > 0 {
      log::warn!("Dropped {dropped} non-finite spline control points");
    }
    CatmullRom { points, closed }
  }

  pub fn points(&self) -> &[Vec3] {
    &self.points
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }

  fn span_count(&self) -> usize {
    match self.points.len() {
      0 | 1 => 0,
      n if self.closed => n,
      n => n - 1,
    }
  }

  /// Returns the four control points of the span containing `t` and the local parameter within
  /// that span.  Open splines mirror phantom points across their ends so the curve passes through
  /// the first and last control points.
  fn span(&self, t: f32) -> ([Vec3; 4], f32) {
    let n = self.points.len();
    let spans = self.span_count();
    let u = clamp_t(t) * spans as f32;
    let span_ix = (u.floor() as usize).min(spans - 1);
    let local_t = u - span_ix as f32;

    if self.closed {
      let at = |offset: isize| {
        let ix = (span_ix as isize + offset).rem_euclid(n as isize) as usize;
        self.points[ix]
      };
      return ([at(-1), at(0), at(1), at(2)], local_t);
    }

    let p1 = self.points[span_ix];
    let p2 = self.points[span_ix + 1];
    let p0 = if span_ix == 0 {
      2. * p1 - p2
    } else {
      self.points[span_ix - 1]
    };
    let p3 = if span_ix + 2 < n {
      self.points[span_ix + 2]
    } else {
      2. * p2 - p1
    };
    ([p0, p1, p2, p3], local_t)
  }
}

impl PathCurve for CatmullRom {
  fn position(&self, t: f32) -> Vec3 {
    match self.points.len() {
      0 => return Vec3::zeros(),
      1 => return self.points[0],
      _ => (),
    }

    let ([p0, p1, p2, p3], t) = self.span(t);
    let t2 = t * t;
    let t3 = t2 * t;
    0.5
      * ((2. * p1)
        + (-p0 + p2) * t
        + (2. * p0 - 5. * p1 + 4. * p2 - p3) * t2
        + (-p0 + 3. * p1 - 3. * p2 + p3) * t3)
  }

  fn derivative(&self, t: f32) -> Vec3 {
    if self.points.len() < 2 {
      return Vec3::zeros();
    }

    let spans = self.span_count() as f32;
    let ([p0, p1, p2, p3], t) = self.span(t);
    let d_local = 0.5
      * ((-p0 + p2)
        + (2. * p0 - 5. * p1 + 4. * p2 - p3) * (2. * t)
        + (-p0 + 3. * p1 - 3. * p2 + p3) * (3. * t * t));
    d_local * spans
  }
}

/// The curve the path is built on.
#[derive(Clone, Debug, PartialEq)]
pub enum Curve {
  Helix(Helix),
  Spline(CatmullRom),
}

impl Default for Curve {
  fn default() -> Self {
    Curve::Helix(Helix::new(CurveParams::default()))
  }
}

impl Curve {
  pub fn helix(params: CurveParams) -> Self {
    Curve::Helix(Helix::new(params))
  }

  pub fn spline(points: impl IntoIterator<Item = Vec3>, closed: bool) -> Self {
    Curve::Spline(CatmullRom::new(points, closed))
  }

  pub fn is_closed(&self) -> bool {
    match self {
      Curve::Helix(_) => false,
      Curve::Spline(spline) => spline.is_closed(),
    }
  }
}

impl PathCurve for Curve {
  fn position(&self, t: f32) -> Vec3 {
    match self {
      Curve::Helix(helix) => helix.position(t),
      Curve::Spline(spline) => spline.position(t),
    }
  }

  fn derivative(&self, t: f32) -> Vec3 {
    match self {
      Curve::Helix(helix) => helix.derivative(t),
      Curve::Spline(spline) => spline.derivative(t),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assert_vec3_close(actual: Vec3, expected: Vec3) {
    let diff = (actual - expected).norm();
    assert!(
      diff < 1e-4,
      "Expected {expected:?}, got {actual:?} (diff {diff})"
    );
  }

  fn assert_orthonormal(sample: &Sample) {
    let Sample {
      tangent,
      normal,
      binormal,
      ..
    } = sample;
    for v in [tangent, normal, binormal] {
      assert!((v.norm() - 1.).abs() < 1e-4, "not unit: {v:?} at t={}", sample.t);
    }
    assert!(tangent.dot(normal).abs() < 1e-4, "t.n at t={}", sample.t);
    assert!(tangent.dot(binormal).abs() < 1e-4, "t.b at t={}", sample.t);
    assert!(normal.dot(binormal).abs() < 1e-4, "n.b at t={}", sample.t);
  }

  #[test]
  fn helix_endpoints() {
    let helix = Helix::new(CurveParams {
      turns: 1.,
      radius: 5.,
      height: 10.,
    });
    assert_vec3_close(helix.position(0.), Vec3::new(5., -5., 0.));
    assert_vec3_close(helix.position(0.25), Vec3::new(0., -2.5, 5.));
    assert_vec3_close(helix.position(1.), Vec3::new(5., 5., 0.));
  }

  #[test]
  fn helix_tangent_matches_finite_difference() {
    let helix = Helix::new(CurveParams {
      turns: 2.5,
      radius: 3.,
      height: 7.,
    });
    for i in 1..20 {
      let t = i as f32 / 20.;
      let point = helix.evaluate(t);
      let h = 1e-3;
      let fd = (helix.position(t + h) - helix.position(t - h)).normalize();
      assert!((point.tangent.norm() - 1.).abs() < 1e-5);
      assert!(point.tangent.dot(&fd) > 0.999, "t={t}");
    }
  }

  #[test]
  fn radius_is_clamped_positive() {
    let helix = Helix::new(CurveParams {
      turns: 1.,
      radius: -4.,
      height: 1.,
    });
    assert_eq!(helix.params().radius, MIN_RADIUS);
    let nan = Helix::new(CurveParams {
      turns: f32::NAN,
      radius: f32::NAN,
      height: f32::INFINITY,
    });
    assert_eq!(
      *nan.params(),
      CurveParams {
        turns: 0.,
        radius: MIN_RADIUS,
        height: 0.
      }
    );
  }

  #[test]
  fn catmull_rom_passes_through_control_points() {
    let points = vec![
      Vec3::new(0., 0., 0.),
      Vec3::new(1., 2., 0.),
      Vec3::new(3., 2., 1.),
      Vec3::new(4., 0., -1.),
    ];
    let open = CatmullRom::new(points.clone(), false);
    for (ix, p) in points.iter().enumerate() {
      assert_vec3_close(open.position(ix as f32 / 3.), *p);
    }

    let closed = CatmullRom::new(points.clone(), true);
    for (ix, p) in points.iter().enumerate() {
      assert_vec3_close(closed.position(ix as f32 / 4.), *p);
    }
    assert_vec3_close(closed.position(1.), points[0]);
  }

  #[test]
  fn catmull_rom_degenerate_point_counts() {
    let empty = CatmullRom::new(Vec::new(), false);
    assert_vec3_close(empty.evaluate(0.3).position, Vec3::zeros());
    assert_vec3_close(empty.evaluate(0.3).tangent, Vec3::x());

    let single = CatmullRom::new(vec![Vec3::new(1., 2., 3.)], false);
    assert_vec3_close(single.evaluate(0.9).position, Vec3::new(1., 2., 3.));

    let with_nan = CatmullRom::new(vec![Vec3::zeros(), Vec3::new(f32::NAN, 0., 0.)], false);
    assert_eq!(with_nan.points().len(), 1);
  }

  #[test]
  fn helix_frames_are_orthonormal() {
    let curve = Curve::helix(CurveParams {
      turns: 3.,
      radius: 5.,
      height: 20.,
    });
    let samples = curve.compute_frames(300, false);
    assert_eq!(samples.len(), 301);
    samples.iter().for_each(assert_orthonormal);
  }

  #[test]
  fn frames_are_continuous_through_vertical_stretch() {
    // rises straight up then bends over; a per-sample Frenet or fixed-up frame flips here
    let curve = Curve::spline(
      vec![
        Vec3::new(0., 0., 0.),
        Vec3::new(0., 5., 0.),
        Vec3::new(0., 10., 0.),
        Vec3::new(3., 12., 1.),
        Vec3::new(6., 12., -2.),
      ],
      false,
    );
    let samples = curve.compute_frames(400, false);
    samples.iter().for_each(assert_orthonormal);
    for pair in samples.windows(2) {
      let angle = common::clamp(pair[0].normal.dot(&pair[1].normal), -1., 1.).acos();
      assert!(angle < 0.1, "normal jumped by {angle} rad at t={}", pair[1].t);
    }
  }

  #[test]
  fn vertical_line_seeds_from_fallback_axis() {
    let curve = Curve::helix(CurveParams {
      turns: 0.,
      radius: 0.,
      height: 10.,
    });
    let samples = curve.compute_frames(16, false);
    for sample in &samples {
      assert_orthonormal(sample);
      assert_vec3_close(sample.tangent, Vec3::y());
      assert_vec3_close(sample.normal, Vec3::x());
    }
  }

  #[test]
  fn closed_frames_join_without_seam() {
    let curve = Curve::spline(
      vec![
        Vec3::new(4., 0., 0.),
        Vec3::new(0., 3., 4.),
        Vec3::new(-4., 0., 0.),
        Vec3::new(0., -3., -4.),
      ],
      true,
    );
    let samples = curve.compute_frames(512, true);
    samples.iter().for_each(assert_orthonormal);
    let first = samples.first().unwrap();
    let last = samples.last().unwrap();
    assert_vec3_close(first.position, last.position);
    assert!(
      first.normal.dot(&last.normal) > 0.999,
      "seam: {:?} vs {:?}",
      first.normal,
      last.normal
    );
  }
}
