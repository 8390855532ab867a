use crate::{
  curve::{clamp_t, orthogonalize, Curve, PathCurve, Sample},
  transform::{try_normalize, Vec3},
};

#[derive(Clone, Debug, PartialEq)]
struct TableKey {
  curve: Curve,
  sample_count: usize,
  closed: bool,
}

/// Dense table of transported frames along a curve with constant-time interpolated lookups.
///
/// The table is rebuilt only when the curve, resolution, or closedness changes; calling
/// [`FrameSampler::ensure`] every frame with unchanged inputs is free.
#[derive(Default)]
pub struct FrameSampler {
  key: Option<TableKey>,
  samples: Vec<Sample>,
}

impl FrameSampler {
  pub fn new(curve: &Curve, sample_count: usize, closed: bool) -> Self {
    let mut sampler = FrameSampler::default();
    sampler.ensure(curve, sample_count, closed);
    sampler
  }

  /// Rebuilds the table if any input differs from the last build.  Returns `true` if a rebuild
  /// happened.
  pub fn ensure(&mut self, curve: &Curve, sample_count: usize, closed: bool) -> bool {
    if let Some(key) = &self.key {
      if key.sample_count == sample_count && key.closed == closed && key.curve == *curve {
        return false;
      }
    }

    self.samples = curve.compute_frames(sample_count, closed);
    log::debug!(
      "Rebuilt frame table with {} samples (closed={closed})",
      self.samples.len()
    );
    self.key = Some(TableKey {
      curve: curve.clone(),
      sample_count,
      closed,
    });
    true
  }

  pub fn samples(&self) -> &[Sample] {
    &self.samples
  }

  /// Interpolated frame at `t`, which is clamped into `[0, 1]`.
  ///
  /// Positions and frame vectors are blended linearly between the two bracketing samples.  The
  /// blended normal is then projected back onto the plane orthogonal to the blended tangent before
  /// the binormal is derived from the two, which keeps the result orthonormal.
  pub fn at(&self, t: f32) -> Sample {
    let Some(last_ix) = self.samples.len().checked_sub(1) else {
      return Sample {
        t: clamp_t(t),
        position: Vec3::zeros(),
        tangent: Vec3::x(),
        normal: Vec3::y(),
        binormal: Vec3::z(),
      };
    };
    let t = clamp_t(t);
    if last_ix == 0 {
      return Sample { t, ..self.samples[0] };
    }

    let scaled = t * last_ix as f32;
    let ix0 = (scaled.floor() as usize).min(last_ix);
    let ix1 = (ix0 + 1).min(last_ix);
    let frac = scaled - ix0 as f32;

    let a = &self.samples[ix0];
    let b = &self.samples[ix1];

    let position = a.position.lerp(&b.position, frac);
    let tangent = try_normalize(&a.tangent.lerp(&b.tangent, frac)).unwrap_or(a.tangent);
    let normal = orthogonalize(&a.normal.lerp(&b.normal, frac), &tangent, &a.binormal);
    let binormal = tangent.cross(&normal).normalize();

    Sample {
      t,
      position,
      tangent,
      normal,
      binormal,
    }
  }
}
