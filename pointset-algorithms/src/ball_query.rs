//! Fixed-radius neighbor search around sampled centers
//!
//! For every center the whole cloud is scanned in ascending index order and
//! points with squared distance at most `radius²` are collected until
//! `nsample` slots are filled. Centers receive no special treatment: a center
//! that is itself a cloud point qualifies at distance 0 and shows up at its
//! own index position.
//!
//! Padding: unfilled slots repeat the first qualifying index, which leaves any
//! max-reduction over the slots unchanged. A center with no qualifying point
//! gets index 0 in every slot and a count of 0.

use nalgebra::distance_squared;
use pointset_core::{
    validate_coords, Array2, ArrayView3, Error, IndexTable, Point3f, Result,
};
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::parallel;
use crate::sampling::cloud_points;

/// Ball query with a fixed radius and neighbor capacity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallQuery {
    radius: f32,
    nsample: usize,
}

/// Neighbor table produced by a ball query
#[derive(Debug, Clone, PartialEq)]
pub struct BallQueryResult {
    /// Neighbor indices `[B, M, K]`, padded as described in the module docs
    pub indices: IndexTable,
    /// Number of non-padding slots per center `[B, M]`
    pub counts: Array2<usize>,
}

impl BallQueryResult {
    /// The non-padding neighbors of center `m` in cloud `b`
    pub fn neighbors(&self, b: usize, m: usize) -> Vec<usize> {
        let count = self.counts[[b, m]];
        (0..count).map(|k| self.indices[[b, m, k]]).collect()
    }

    /// Number of centers with no point inside their ball
    pub fn empty_centers(&self) -> usize {
        self.counts.iter().filter(|&&count| count == 0).count()
    }
}

impl BallQuery {
    /// Create a ball query
    ///
    /// Fails with `InvalidArgument` when the radius is not positive and
    /// finite or `nsample` is 0.
    pub fn new(radius: f32, nsample: usize) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "radius must be positive and finite, got {}",
                radius
            )));
        }
        if nsample == 0 {
            return Err(Error::InvalidArgument(
                "nsample must be greater than 0".to_string(),
            ));
        }
        Ok(Self { radius, nsample })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn nsample(&self) -> usize {
        self.nsample
    }

    /// Find up to `nsample` neighbors of each center
    ///
    /// # Arguments
    /// * `coords` - Cloud coordinates `[B, 3, N]`
    /// * `centers` - Center coordinates `[B, 3, M]`
    ///
    /// # Returns
    /// * `Result<BallQueryResult>` - `[B, M, K]` neighbor table and per-center counts
    ///
    /// # Example
    /// ```rust
    /// use pointset_core::{PointBuffer, Point3f};
    /// use pointset_algorithms::BallQuery;
    ///
    /// let cloud = PointBuffer::from_clouds(&[vec![
    ///     Point3f::new(0.0, 0.0, 0.0),
    ///     Point3f::new(1.0, 0.0, 0.0),
    ///     Point3f::new(0.0, 1.0, 0.0),
    ///     Point3f::new(5.0, 5.0, 5.0),
    /// ]]).unwrap();
    /// let centers = PointBuffer::from_clouds(&[vec![Point3f::origin()]]).unwrap();
    ///
    /// let result = BallQuery::new(1.5, 2).unwrap()
    ///     .query(cloud.coords(), centers.coords())
    ///     .unwrap();
    /// assert_eq!(result.neighbors(0, 0), vec![0, 1]);
    /// ```
    #[instrument(skip_all, fields(
        batch = coords.dim().0,
        num_points = coords.dim().2,
        num_centers = centers.dim().2,
        radius = self.radius,
        nsample = self.nsample,
    ))]
    pub fn query(&self, coords: ArrayView3<f32>, centers: ArrayView3<f32>) -> Result<BallQueryResult> {
        validate_coords(coords, "coordinates")?;
        validate_coords(centers, "center coordinates")?;

        let batch = coords.dim().0;
        let num_centers = centers.dim().2;
        if centers.dim().0 != batch {
            return Err(Error::ShapeMismatch(format!(
                "center batch size {} does not match cloud batch size {}",
                centers.dim().0,
                batch
            )));
        }

        let rows: Vec<(Vec<usize>, usize)> = parallel::install(|| {
            let clouds: Vec<Vec<Point3f>> = (0..batch)
                .into_par_iter()
                .map(|b| cloud_points(coords, b))
                .collect();
            let center_points: Vec<Vec<Point3f>> = (0..batch)
                .into_par_iter()
                .map(|b| cloud_points(centers, b))
                .collect();

            (0..batch * num_centers)
                .into_par_iter()
                .map(|slot| {
                    let b = slot / num_centers;
                    let m = slot % num_centers;
                    ball_neighbors(&clouds[b], &center_points[b][m], self.radius, self.nsample)
                })
                .collect()
        })?;

        let mut indices = Vec::with_capacity(rows.len() * self.nsample);
        let mut counts = Vec::with_capacity(rows.len());
        for (slots, count) in rows {
            indices.extend(slots);
            counts.push(count);
        }

        let result = BallQueryResult {
            indices: IndexTable::from_shape_vec((batch, num_centers, self.nsample), indices)?,
            counts: Array2::from_shape_vec((batch, num_centers), counts)?,
        };

        let empty = result.empty_centers();
        if empty > 0 {
            debug!(empty_centers = empty, "centers without neighbors padded with index 0");
        }

        Ok(result)
    }
}

/// Convenience wrapper building a [`BallQuery`] and running it once
pub fn ball_query(
    coords: ArrayView3<f32>,
    centers: ArrayView3<f32>,
    radius: f32,
    nsample: usize,
) -> Result<BallQueryResult> {
    BallQuery::new(radius, nsample)?.query(coords, centers)
}

/// Neighbor slots of a single center and the number of qualifying points
///
/// Returns exactly `nsample` slots: qualifying indices in ascending order,
/// then copies of the first one (or 0 when nothing qualified).
pub fn ball_neighbors(
    points: &[Point3f],
    center: &Point3f,
    radius: f32,
    nsample: usize,
) -> (Vec<usize>, usize) {
    let radius_squared = radius * radius;

    let mut slots: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, point)| distance_squared(center, *point) <= radius_squared)
        .map(|(idx, _)| idx)
        .take(nsample)
        .collect();

    let count = slots.len();
    let pad = slots.first().copied().unwrap_or(0);
    slots.resize(nsample, pad);

    (slots, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointset_core::PointBuffer;

    fn example_cloud() -> PointBuffer {
        PointBuffer::from_clouds(&[vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(5.0, 5.0, 5.0),
        ]])
        .unwrap()
    }

    fn centers(points: Vec<Point3f>) -> PointBuffer {
        PointBuffer::from_clouds(&[points]).unwrap()
    }

    #[test]
    fn test_truncates_in_ascending_index_order() {
        let cloud = example_cloud();
        let query_centers = centers(vec![Point3f::origin()]);

        let result = ball_query(cloud.coords(), query_centers.coords(), 1.5, 2).unwrap();
        assert_eq!(result.indices.shape(), &[1, 1, 2]);
        assert_eq!(result.neighbors(0, 0), vec![0, 1]);
        assert_eq!(result.counts[[0, 0]], 2);
    }

    #[test]
    fn test_pads_with_first_neighbor() {
        let cloud = example_cloud();
        let query_centers = centers(vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(5.0, 5.0, 5.0)]);

        let result = ball_query(cloud.coords(), query_centers.coords(), 1.5, 5).unwrap();
        assert_eq!(result.indices.slice(ndarray::s![0, 0, ..]).to_vec(), vec![0, 1, 2, 0, 0]);
        assert_eq!(result.indices.slice(ndarray::s![0, 1, ..]).to_vec(), vec![3, 3, 3, 3, 3]);
        assert_eq!(result.counts.row(0).to_vec(), vec![3, 1]);
    }

    #[test]
    fn test_no_neighbors_fills_with_zero() {
        let cloud = example_cloud();
        let query_centers = centers(vec![Point3f::new(100.0, 100.0, 100.0)]);

        let result = ball_query(cloud.coords(), query_centers.coords(), 1.0, 4).unwrap();
        assert_eq!(result.indices.iter().copied().collect::<Vec<_>>(), vec![0, 0, 0, 0]);
        assert_eq!(result.counts[[0, 0]], 0);
        assert!(result.neighbors(0, 0).is_empty());
        assert_eq!(result.empty_centers(), 1);
    }

    #[test]
    fn test_boundary_distance_is_inclusive() {
        let cloud = example_cloud();
        let query_centers = centers(vec![Point3f::origin()]);

        let result = ball_query(cloud.coords(), query_centers.coords(), 1.0, 4).unwrap();
        assert_eq!(result.neighbors(0, 0), vec![0, 1, 2]);
    }

    #[test]
    fn test_large_radius_takes_first_k() {
        let cloud = example_cloud();
        let query_centers = centers(vec![Point3f::new(5.0, 5.0, 5.0)]);

        let result = ball_query(cloud.coords(), query_centers.coords(), 100.0, 3).unwrap();
        assert_eq!(result.neighbors(0, 0), vec![0, 1, 2]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(BallQuery::new(0.0, 4), Err(Error::InvalidArgument(_))));
        assert!(matches!(BallQuery::new(-0.5, 4), Err(Error::InvalidArgument(_))));
        assert!(matches!(BallQuery::new(f32::NAN, 4), Err(Error::InvalidArgument(_))));
        assert!(matches!(BallQuery::new(0.5, 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_batch_mismatch() {
        let cloud = example_cloud();
        let query_centers = PointBuffer::from_clouds(&[
            vec![Point3f::origin()],
            vec![Point3f::origin()],
        ])
        .unwrap();

        let result = ball_query(cloud.coords(), query_centers.coords(), 1.0, 4);
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }
}
