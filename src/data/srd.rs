// ============================================================
// Layer 4 — Semantic-Relative Distance (SRD)
// ============================================================
// The local branch of the model only looks at words "near" the
// aspect. Nearness is measured per word as the SRD: the
// distance to the closest aspect word.
//
// Given a threshold t (the `SRD` hyperparameter), two weighting
// vectors are derived:
//
//   CDM (context dynamic mask)
//       CDM[i] = 1                      if SRD[i] <= t
//                0                      otherwise
//
//   CDW (context dynamic weighting)
//       CDW[i] = 1                      if SRD[i] <= t
//                exp(-(SRD[i] - t) / s) otherwise
//
// where s is the decay scale. Both vectors are zero past the
// end of the context, and both are all-zero when there is no
// aspect (extraction mode).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::domain::error::AbsaError;

/// Distance assigned to words that cannot reach any aspect word.
pub const UNREACHABLE: usize = usize::MAX;

// ─── LcfMode ──────────────────────────────────────────────────────────────────
/// Which fusion vector the local branch is weighted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LcfMode {
    Cdm,
    Cdw,
    Fusion,
}

impl LcfMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LcfMode::Cdm => "cdm",
            LcfMode::Cdw => "cdw",
            LcfMode::Fusion => "fusion",
        }
    }
}

impl fmt::Display for LcfMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LcfMode {
    type Err = AbsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cdm" => Ok(LcfMode::Cdm),
            "cdw" => Ok(LcfMode::Cdw),
            "fusion" => Ok(LcfMode::Fusion),
            other => Err(AbsaError::config(format!(
                "unknown lcf mode '{other}', expected cdm, cdw or fusion"
            ))),
        }
    }
}

// ─── Distances ────────────────────────────────────────────────────────────────
/// Word-index distance of each of `n` words to the nearest word in `aspect`.
pub fn positional_distances(n: usize, aspect: &Range<usize>) -> Vec<usize> {
    if aspect.is_empty() {
        return vec![UNREACHABLE; n];
    }
    let last = aspect.end - 1;
    (0..n)
        .map(|i| {
            if i < aspect.start {
                aspect.start - i
            } else if i > last {
                i - last
            } else {
                0
            }
        })
        .collect()
}

// ─── Fusion vectors ───────────────────────────────────────────────────────────
/// Binary mask of length `len`, 1 where the distance is within `threshold`.
pub fn cdm_vec(distances: &[usize], threshold: usize, len: usize) -> Vec<f32> {
    let mut out = vec![0.0; len];
    for (slot, &d) in out.iter_mut().zip(distances) {
        if d <= threshold {
            *slot = 1.0;
        }
    }
    out
}

/// Decayed weights of length `len`; identical to the mask inside the window.
pub fn cdw_vec(distances: &[usize], threshold: usize, scale: f32, len: usize) -> Vec<f32> {
    let scale = scale.max(f32::EPSILON);
    let mut out = vec![0.0; len];
    for (slot, &d) in out.iter_mut().zip(distances) {
        *slot = if d <= threshold {
            1.0
        } else if d == UNREACHABLE {
            0.0
        } else {
            (-((d - threshold) as f32) / scale).exp()
        };
    }
    out
}
