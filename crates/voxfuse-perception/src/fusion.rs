//! Weighted TSDF fusion.
//!
//! Each voxel keeps a running weighted mean of every truncated signed
//! distance observed for it, plus the accumulated weight:
//!
//! ```text
//! w_new = w_old + ω
//! d_new = (w_old · d_old + ω · d_obs) / w_new
//! ```
//!
//! where ω is the per-frame observation weight.  Colors follow the same rule
//! per channel and must use the weights produced for the same voxels by the
//! distance update, so [`fuse_colors`] takes the [`DistanceUpdate`] returned
//! by [`fuse_tsdf`] rather than raw weights.
//!
//! # Example
//!
//! ```rust
//! use voxfuse_perception::fusion::{fuse_colors, fuse_tsdf};
//!
//! let w_old = [0.0, 1.0];
//! let update = fuse_tsdf(&[1.0, 0.5], &[0.2, -0.5], &w_old, 1.0);
//! assert_eq!(update.weight, vec![1.0, 2.0]);
//! assert!((update.distance[0] - 0.2).abs() < 1e-6);
//! assert!(update.distance[1].abs() < 1e-6);
//!
//! let colors = fuse_colors(&[[0.0; 3], [100.0; 3]], &[[10.0; 3], [200.0; 3]], &w_old, &update, 1.0);
//! assert_eq!(colors[1], [150.0; 3]);
//! ```

use rayon::prelude::*;

/// Largest value a fused color channel can take.
pub const MAX_COLOR: f32 = 255.0;

// ────────────────────────────────────────────────────────────────────────────
// Distance
// ────────────────────────────────────────────────────────────────────────────

/// Fuse one observation into one voxel; returns `(d_new, w_new)`.
///
/// With `w_old == 0` the result is exactly `d_obs`.
pub fn fuse(d_old: f32, w_old: f32, d_obs: f32, observation_weight: f32) -> (f32, f32) {
    let w_new = w_old + observation_weight;
    let d_new = (w_old * d_old + observation_weight * d_obs) / w_new;
    (d_new, w_new)
}

/// Fused distances and the new weights they were computed with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistanceUpdate {
    pub distance: Vec<f32>,
    pub weight: Vec<f32>,
}

impl DistanceUpdate {
    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }
}

/// Fuse a batch of observations, one per voxel.
///
/// `tsdf_old`, `observed` and `w_old` are co-indexed over the voxels being
/// integrated this frame.
pub fn fuse_tsdf(
    tsdf_old: &[f32],
    observed: &[f32],
    w_old: &[f32],
    observation_weight: f32,
) -> DistanceUpdate {
    debug_assert_eq!(tsdf_old.len(), observed.len());
    debug_assert_eq!(tsdf_old.len(), w_old.len());
    let (distance, weight) = tsdf_old
        .par_iter()
        .zip(observed)
        .zip(w_old)
        .map(|((&d_old, &d_obs), &w)| fuse(d_old, w, d_obs, observation_weight))
        .unzip();
    DistanceUpdate { distance, weight }
}

// ────────────────────────────────────────────────────────────────────────────
// Color
// ────────────────────────────────────────────────────────────────────────────

/// Fuse one color channel: weighted mean rounded to the nearest integer
/// (ties to even) and clamped to `[0, 255]`.
pub fn fuse_color_channel(
    c_old: f32,
    w_old: f32,
    c_new: f32,
    w_new: f32,
    observation_weight: f32,
) -> f32 {
    ((w_old * c_old + observation_weight * c_new) / w_new)
        .round_ties_even()
        .clamp(0.0, MAX_COLOR)
}

/// Fuse a batch of RGB observations using the weights of `update`.
///
/// `update` must come from [`fuse_tsdf`] over the same voxels, in the same
/// order, with the same `w_old` and `observation_weight`.
pub fn fuse_colors(
    color_old: &[[f32; 3]],
    color_new: &[[f32; 3]],
    w_old: &[f32],
    update: &DistanceUpdate,
    observation_weight: f32,
) -> Vec<[f32; 3]> {
    debug_assert_eq!(color_old.len(), color_new.len());
    debug_assert_eq!(color_old.len(), update.len());
    color_old
        .par_iter()
        .zip(color_new)
        .zip(w_old)
        .zip(&update.weight)
        .map(|(((old, new), &w), &w_new)| {
            [0usize, 1, 2].map(|ch| fuse_color_channel(old[ch], w, new[ch], w_new, observation_weight))
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
