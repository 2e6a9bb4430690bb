//! Point and index table types

use nalgebra::Point3;
use ndarray::{Array2, Array3};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// Point indices chosen by farthest point sampling, shape `[B, M]`
pub type SampledCenters = Array2<usize>;

/// Neighbor indices per sampled center, shape `[B, M, K]`
///
/// Slots past the number of points found inside the ball repeat the first
/// qualifying index. A center with no qualifying point holds index 0 in
/// every slot.
pub type IndexTable = Array3<usize>;

/// Number of coordinate channels in a point buffer
pub const COORD_CHANNELS: usize = 3;
