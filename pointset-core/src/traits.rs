//! Core traits for pointset

use crate::error::Result;
use ndarray::{Array4, ArrayView4};

/// A per-neighborhood feature transform with weights shared across slots
///
/// The transform maps a grouped tensor `[B, C_in, M, K]` to
/// `[B, C_out, M, K]` and must treat every `(m, k)` slot identically, so the
/// max-reduction that follows is invariant to neighbor order and to duplicate
/// padding slots.
pub trait SharedTransform: Send + Sync {
    /// Channels expected on axis 1 of the input
    fn in_channels(&self) -> usize;

    /// Channels produced on axis 1 of the output
    fn out_channels(&self) -> usize;

    /// Apply the transform to every neighbor slot
    fn forward(&self, grouped: ArrayView4<f32>) -> Result<Array4<f32>>;
}
