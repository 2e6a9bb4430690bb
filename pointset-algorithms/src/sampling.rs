//! Farthest point sampling
//!
//! Greedily picks `npoint` indices per cloud so that each new center is the
//! point farthest from every center chosen before it. A running array holds
//! each point's squared distance to its nearest selected center and is
//! updated after every pick, giving O(npoint * N) work per cloud. Clouds in
//! a batch are sampled in parallel.

use pointset_core::{
    validate_coords, Array2, ArrayView3, Error, FpsStart, Point3f, Result, SampledCenters,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::instrument;

use crate::parallel;

/// Farthest point sampler for batched clouds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FarthestPointSampler {
    npoint: usize,
    start: FpsStart,
}

impl FarthestPointSampler {
    /// Create a sampler selecting `npoint` centers, starting from point 0
    pub fn new(npoint: usize) -> Self {
        Self {
            npoint,
            start: FpsStart::First,
        }
    }

    /// Choose how the first center is picked
    pub fn with_start(mut self, start: FpsStart) -> Self {
        self.start = start;
        self
    }

    pub fn npoint(&self) -> usize {
        self.npoint
    }

    pub fn start(&self) -> FpsStart {
        self.start
    }

    /// Sample centers from coordinates `[B, 3, N]`
    ///
    /// # Returns
    /// * `Result<SampledCenters>` - `[B, npoint]` indices, pairwise distinct per cloud.
    ///   Fails with `InvalidArgument` when `npoint` is 0 or exceeds N.
    ///
    /// # Example
    /// ```rust
    /// use pointset_core::{PointBuffer, Point3f};
    /// use pointset_algorithms::FarthestPointSampler;
    ///
    /// let buffer = PointBuffer::from_clouds(&[vec![
    ///     Point3f::new(0.0, 0.0, 0.0),
    ///     Point3f::new(1.0, 0.0, 0.0),
    ///     Point3f::new(0.0, 1.0, 0.0),
    ///     Point3f::new(5.0, 5.0, 5.0),
    /// ]]).unwrap();
    ///
    /// let centers = FarthestPointSampler::new(2).sample(buffer.coords()).unwrap();
    /// assert_eq!(centers.row(0).to_vec(), vec![0, 3]);
    /// ```
    #[instrument(skip_all, fields(batch = coords.dim().0, num_points = coords.dim().2, npoint = self.npoint))]
    pub fn sample(&self, coords: ArrayView3<f32>) -> Result<SampledCenters> {
        validate_coords(coords, "coordinates")?;
        let (batch, _, num_points) = coords.dim();

        if self.npoint == 0 {
            return Err(Error::InvalidArgument(
                "npoint must be greater than 0".to_string(),
            ));
        }
        if self.npoint > num_points {
            return Err(Error::InvalidArgument(format!(
                "cannot sample {} centers from {} points",
                self.npoint, num_points
            )));
        }

        let rows: Vec<Vec<usize>> = parallel::install(|| {
            (0..batch)
                .into_par_iter()
                .map(|b| {
                    let points = cloud_points(coords, b);
                    let start = self.start_index(b, num_points);
                    farthest_point_indices(&points, self.npoint, start)
                })
                .collect::<Result<Vec<_>>>()
        })??;

        let flat: Vec<usize> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((batch, self.npoint), flat)?)
    }

    fn start_index(&self, batch_index: usize, num_points: usize) -> usize {
        match self.start {
            FpsStart::First => 0,
            FpsStart::Seeded(seed) => {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(batch_index as u64));
                rng.gen_range(0..num_points)
            }
        }
    }
}

/// Copy cloud `b` of a `[B, 3, N]` array into contiguous points
pub(crate) fn cloud_points(coords: ArrayView3<f32>, b: usize) -> Vec<Point3f> {
    let cloud = coords.index_axis(pointset_core::Axis(0), b);
    cloud
        .columns()
        .into_iter()
        .map(|column| Point3f::new(column[0], column[1], column[2]))
        .collect()
}

/// Greedy farthest point selection over a single cloud
///
/// Already selected points are excluded from the argmax and ties go to the
/// lowest index, so the result is deterministic and free of duplicates even
/// when coordinates repeat. `count` is clamped to the number of points;
/// a `start` outside the cloud is rejected with `InvalidArgument`.
pub fn farthest_point_indices(points: &[Point3f], count: usize, start: usize) -> Result<Vec<usize>> {
    let count = count.min(points.len());
    let mut indices = Vec::with_capacity(count);
    if count == 0 {
        return Ok(indices);
    }
    if start >= points.len() {
        return Err(Error::InvalidArgument(format!(
            "start index {} is out of range for {} points",
            start,
            points.len()
        )));
    }

    let mut min_dist = vec![f32::INFINITY; points.len()];
    let mut selected = vec![false; points.len()];
    let mut current = start;

    loop {
        indices.push(current);
        selected[current] = true;
        if indices.len() == count {
            break;
        }

        let center = points[current];
        let mut farthest: Option<(usize, f32)> = None;
        for (q, point) in points.iter().enumerate() {
            if selected[q] {
                continue;
            }
            let dist = nalgebra::distance_squared(&center, point);
            if dist < min_dist[q] {
                min_dist[q] = dist;
            }
            match farthest {
                Some((_, best)) if min_dist[q] <= best => {}
                _ => farthest = Some((q, min_dist[q])),
            }
        }

        match farthest {
            Some((next, _)) => current = next,
            None => break,
        }
    }

    Ok(indices)
}
