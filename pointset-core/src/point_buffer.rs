//! Batched point buffer shared by every kernel

use crate::error::{Error, Result};
use crate::point::{Point3f, COORD_CHANNELS};
use ndarray::{Array3, ArrayView3};

/// A batch of point clouds stored channel-first
///
/// Coordinates have shape `[B, 3, N]` and the optional features `[B, C, N]`.
/// Both arrays share the same batch and point indexing, so
/// `coords[[b, .., n]]` and `features[[b, .., n]]` describe the same point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointBuffer {
    coords: Array3<f32>,
    features: Option<Array3<f32>>,
}

impl PointBuffer {
    /// Create a buffer from channel-first coordinates and optional features
    ///
    /// # Arguments
    /// * `coords` - Coordinates with shape `[B, 3, N]`
    /// * `features` - Optional per-point features with shape `[B, C, N]`
    ///
    /// # Returns
    /// * `Result<PointBuffer>` - `ShapeMismatch` when the coordinate axis is not 3
    ///   or the feature batch/point counts disagree with the coordinates
    pub fn new(coords: Array3<f32>, features: Option<Array3<f32>>) -> Result<Self> {
        validate_coords(coords.view(), "coordinates")?;
        if let Some(features) = &features {
            validate_features(coords.view(), features.view())?;
        }
        Ok(Self { coords, features })
    }

    /// Create a coordinate-only buffer
    pub fn from_coords(coords: Array3<f32>) -> Result<Self> {
        Self::new(coords, None)
    }

    /// Create a buffer from channel-last arrays (`[B, N, 3]` and `[B, N, C]`)
    pub fn from_channels_last(coords: Array3<f32>, features: Option<Array3<f32>>) -> Result<Self> {
        let to_channel_first = |array: Array3<f32>| {
            array
                .permuted_axes([0, 2, 1])
                .as_standard_layout()
                .into_owned()
        };
        Self::new(to_channel_first(coords), features.map(to_channel_first))
    }

    /// Create a coordinate-only buffer from one point list per cloud
    ///
    /// Every cloud must hold the same number of points.
    ///
    /// # Example
    /// ```rust
    /// use pointset_core::{PointBuffer, Point3f};
    ///
    /// let clouds = vec![
    ///     vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 0.0, 0.0)],
    ///     vec![Point3f::new(0.0, 2.0, 0.0), Point3f::new(0.0, 0.0, 3.0)],
    /// ];
    /// let buffer = PointBuffer::from_clouds(&clouds).unwrap();
    /// assert_eq!(buffer.batch_size(), 2);
    /// assert_eq!(buffer.num_points(), 2);
    /// assert_eq!(buffer.point(1, 1), Point3f::new(0.0, 0.0, 3.0));
    /// ```
    pub fn from_clouds(clouds: &[Vec<Point3f>]) -> Result<Self> {
        let num_points = clouds.first().map_or(0, Vec::len);
        if let Some((index, cloud)) = clouds
            .iter()
            .enumerate()
            .find(|(_, cloud)| cloud.len() != num_points)
        {
            return Err(Error::ShapeMismatch(format!(
                "cloud {} has {} points, expected {}",
                index,
                cloud.len(),
                num_points
            )));
        }

        let mut coords = Array3::zeros((clouds.len(), COORD_CHANNELS, num_points));
        for (b, cloud) in clouds.iter().enumerate() {
            for (n, point) in cloud.iter().enumerate() {
                coords[[b, 0, n]] = point.x;
                coords[[b, 1, n]] = point.y;
                coords[[b, 2, n]] = point.z;
            }
        }

        Ok(Self { coords, features: None })
    }

    /// Attach per-point features with shape `[B, C, N]`
    pub fn with_features(self, features: Array3<f32>) -> Result<Self> {
        Self::new(self.coords, Some(features))
    }

    /// Number of clouds in the batch
    pub fn batch_size(&self) -> usize {
        self.coords.dim().0
    }

    /// Number of points per cloud
    pub fn num_points(&self) -> usize {
        self.coords.dim().2
    }

    /// Number of feature channels, 0 when the buffer carries no features
    pub fn feature_channels(&self) -> usize {
        self.features.as_ref().map_or(0, |features| features.dim().1)
    }

    pub fn has_features(&self) -> bool {
        self.features.is_some()
    }

    /// Coordinates `[B, 3, N]`
    pub fn coords(&self) -> ArrayView3<'_, f32> {
        self.coords.view()
    }

    /// Features `[B, C, N]`, if any
    pub fn features(&self) -> Option<ArrayView3<'_, f32>> {
        self.features.as_ref().map(|features| features.view())
    }

    /// Coordinates of point `n` in cloud `b`
    ///
    /// Panics when `b` or `n` is out of range, like slice indexing.
    pub fn point(&self, b: usize, n: usize) -> Point3f {
        Point3f::new(
            self.coords[[b, 0, n]],
            self.coords[[b, 1, n]],
            self.coords[[b, 2, n]],
        )
    }

    /// All points of cloud `b`
    pub fn cloud(&self, b: usize) -> Vec<Point3f> {
        (0..self.num_points()).map(|n| self.point(b, n)).collect()
    }

    /// Split the buffer into its coordinate and feature arrays
    pub fn into_parts(self) -> (Array3<f32>, Option<Array3<f32>>) {
        (self.coords, self.features)
    }
}

/// Check that `coords` is a `[B, 3, N]` array
pub fn validate_coords(coords: ArrayView3<f32>, name: &str) -> Result<()> {
    let (_, channels, _) = coords.dim();
    if channels != COORD_CHANNELS {
        return Err(Error::ShapeMismatch(format!(
            "{} must have shape [B, 3, N], got {:?}",
            name,
            coords.shape()
        )));
    }
    Ok(())
}

/// Check that `features` shares the batch and point axes of `coords`
pub fn validate_features(coords: ArrayView3<f32>, features: ArrayView3<f32>) -> Result<()> {
    let (batch, _, num_points) = coords.dim();
    let (feature_batch, _, feature_points) = features.dim();
    if feature_batch != batch || feature_points != num_points {
        return Err(Error::ShapeMismatch(format!(
            "features have shape {:?} but coordinates have batch {} and {} points",
            features.shape(),
            batch,
            num_points
        )));
    }
    Ok(())
}
