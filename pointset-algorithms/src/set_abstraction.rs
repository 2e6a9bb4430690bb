//! Multi-scale set abstraction layer
//!
//! One forward pass samples `npoint` centers with farthest point sampling,
//! then for every radius branch in order: ball query around the centers,
//! group coordinates (and features, appended after the coordinates), apply
//! the branch's shared transform, and max-pool over the neighbor slots. The
//! pooled branch outputs share the same centers in the same order and are
//! concatenated along the channel axis.

use ndarray::concatenate;
use pointset_core::{
    validate_coords, validate_features, Array3, Array4, ArrayView3, Axis, Error, PointBuffer,
    Result, SampledCenters, SetAbstractionConfig, SharedTransform, COORD_CHANNELS,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, instrument, trace};

use crate::ball_query::{BallQuery, BallQueryResult};
use crate::grouping::{gather_points, group_points};
use crate::parallel;
use crate::sampling::FarthestPointSampler;
use crate::shared_mlp::{SharedMlp, SharedMlpConfig};

/// Grouped neighborhoods of one radius branch
#[derive(Debug, Clone)]
pub struct GroupedBranch {
    /// Ball query table that drove the grouping
    pub neighbors: BallQueryResult,
    /// Grouped coordinates followed by grouped features `[B, 3 + C, M, K]`
    pub grouped: Array4<f32>,
}

/// Sampling and grouping results before any transform
#[derive(Debug, Clone)]
pub struct SampledGroups {
    /// Farthest point sampling indices `[B, M]`
    pub centers: SampledCenters,
    /// Coordinates of the sampled centers `[B, 3, M]`
    pub new_coords: Array3<f32>,
    /// One entry per radius branch, in configuration order
    pub branches: Vec<GroupedBranch>,
}

/// PointNet++ multi-scale grouping set abstraction
///
/// Generic over the per-branch transform; [`SetAbstractionLayer::new`] builds
/// the default [`SharedMlp`] transforms.
#[derive(Debug, Clone)]
pub struct SetAbstractionLayer<T = SharedMlp> {
    config: SetAbstractionConfig,
    in_feature_channels: usize,
    sampler: FarthestPointSampler,
    queries: Vec<BallQuery>,
    transforms: Vec<T>,
}

impl SetAbstractionLayer<SharedMlp> {
    /// Create a layer with seeded shared MLPs
    ///
    /// # Arguments
    /// * `config` - Center count and radius branches
    /// * `in_feature_channels` - Feature channels of the input (0 for coordinates only)
    ///
    /// # Returns
    /// * `Result<SetAbstractionLayer>` - `InvalidArgument` for any invalid configuration value
    ///
    /// # Example
    /// ```rust
    /// use pointset_core::{BranchConfig, Point3f, PointBuffer, SetAbstractionConfig};
    /// use pointset_algorithms::SetAbstractionLayer;
    ///
    /// let cloud: Vec<Point3f> = (0..32)
    ///     .map(|i| Point3f::new((i % 4) as f32, (i / 4 % 4) as f32, (i / 16) as f32))
    ///     .collect();
    /// let input = PointBuffer::from_clouds(&[cloud]).unwrap();
    ///
    /// let config = SetAbstractionConfig::new(8, vec![
    ///     BranchConfig::new(1.0, 4, vec![8, 16]),
    ///     BranchConfig::new(2.0, 8, vec![16, 32]),
    /// ]);
    /// let layer = SetAbstractionLayer::new(config, 0).unwrap();
    /// let output = layer.forward(&input).unwrap();
    ///
    /// assert_eq!(output.coords().shape(), &[1, 3, 8]);
    /// assert_eq!(output.features().unwrap().shape(), &[1, 48, 8]);
    /// ```
    pub fn new(config: SetAbstractionConfig, in_feature_channels: usize) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.init_seed);
        let transforms = config
            .branches
            .iter()
            .map(|branch| {
                SharedMlpConfig::new(COORD_CHANNELS + in_feature_channels, branch.mlp.clone())
                    .with_batch_norm(config.batch_norm)
                    .init(&mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::with_transforms(config, in_feature_channels, transforms)
    }
}

impl<T: SharedTransform> SetAbstractionLayer<T> {
    /// Create a layer with caller-supplied transforms, one per branch
    ///
    /// Each transform must take `3 + in_feature_channels` channels and produce
    /// the last width of its branch's `mlp`.
    pub fn with_transforms(
        config: SetAbstractionConfig,
        in_feature_channels: usize,
        transforms: Vec<T>,
    ) -> Result<Self> {
        config.validate()?;

        if transforms.len() != config.branches.len() {
            return Err(Error::InvalidArgument(format!(
                "{} transforms supplied for {} radius branches",
                transforms.len(),
                config.branches.len()
            )));
        }

        let in_channels = COORD_CHANNELS + in_feature_channels;
        for (index, (branch, transform)) in config.branches.iter().zip(&transforms).enumerate() {
            if transform.in_channels() != in_channels {
                return Err(Error::InvalidArgument(format!(
                    "branch {} transform expects {} input channels, layer provides {}",
                    index,
                    transform.in_channels(),
                    in_channels
                )));
            }
            if transform.out_channels() != branch.out_channels() {
                return Err(Error::InvalidArgument(format!(
                    "branch {} transform produces {} channels, configuration expects {}",
                    index,
                    transform.out_channels(),
                    branch.out_channels()
                )));
            }
        }

        let queries = config
            .branches
            .iter()
            .map(|branch| BallQuery::new(branch.radius, branch.nsample))
            .collect::<Result<Vec<_>>>()?;
        let sampler = FarthestPointSampler::new(config.npoint).with_start(config.fps_start);

        Ok(Self {
            config,
            in_feature_channels,
            sampler,
            queries,
            transforms,
        })
    }

    pub fn config(&self) -> &SetAbstractionConfig {
        &self.config
    }

    /// Number of centers produced per cloud
    pub fn npoint(&self) -> usize {
        self.config.npoint
    }

    /// Feature channels expected on the input
    pub fn in_feature_channels(&self) -> usize {
        self.in_feature_channels
    }

    /// Feature channels of the output, summed over branches
    pub fn out_channels(&self) -> usize {
        self.config.out_channels()
    }

    pub fn transforms(&self) -> &[T] {
        &self.transforms
    }

    /// Run the layer on a point buffer
    ///
    /// Returns a buffer with `npoint` points per cloud: the sampled center
    /// coordinates and the concatenated branch features.
    pub fn forward(&self, input: &PointBuffer) -> Result<PointBuffer> {
        let (new_coords, features) = self.forward_parts(input.coords(), input.features())?;
        PointBuffer::new(new_coords, Some(features))
    }

    /// Run the layer on raw arrays
    ///
    /// # Arguments
    /// * `coords` - Coordinates `[B, 3, N]`
    /// * `features` - Optional features `[B, C, N]`, required when the layer
    ///   was built with `in_feature_channels > 0`
    ///
    /// # Returns
    /// * `Result<(Array3<f32>, Array3<f32>)>` - Center coordinates `[B, 3, M]`
    ///   and features `[B, sum of branch widths, M]`
    #[instrument(skip_all, fields(
        batch = coords.dim().0,
        num_points = coords.dim().2,
        npoint = self.config.npoint,
        branches = self.queries.len(),
    ))]
    pub fn forward_parts(
        &self,
        coords: ArrayView3<f32>,
        features: Option<ArrayView3<f32>>,
    ) -> Result<(Array3<f32>, Array3<f32>)> {
        self.check_inputs(coords, features)?;
        let (new_coords, new_features) = parallel::install(|| self.run(coords, features))??;
        debug!(
            coords = ?new_coords.shape(),
            features = ?new_features.shape(),
            "set abstraction complete"
        );
        Ok((new_coords, new_features))
    }

    /// Sample centers and group every branch without transforming
    pub fn sample_and_group(
        &self,
        coords: ArrayView3<f32>,
        features: Option<ArrayView3<f32>>,
    ) -> Result<SampledGroups> {
        self.check_inputs(coords, features)?;
        parallel::install(|| {
            let (centers, new_coords) = self.sample_centers(coords)?;
            let branches = self
                .queries
                .iter()
                .map(|query| self.group_branch(query, coords, features, new_coords.view()))
                .collect::<Result<Vec<_>>>()?;
            Ok(SampledGroups {
                centers,
                new_coords,
                branches,
            })
        })?
    }

    fn check_inputs(&self, coords: ArrayView3<f32>, features: Option<ArrayView3<f32>>) -> Result<()> {
        validate_coords(coords, "coordinates")?;

        match features {
            Some(features) => {
                validate_features(coords, features)?;
                let channels = features.dim().1;
                if channels != self.in_feature_channels {
                    return Err(Error::ShapeMismatch(format!(
                        "layer expects {} feature channels, got {}",
                        self.in_feature_channels, channels
                    )));
                }
            }
            None if self.in_feature_channels > 0 => {
                return Err(Error::ShapeMismatch(format!(
                    "layer expects {} feature channels but no features were given",
                    self.in_feature_channels
                )));
            }
            None => {}
        }

        let num_points = coords.dim().2;
        if self.config.npoint > num_points {
            return Err(Error::InvalidArgument(format!(
                "cannot sample {} centers from {} points",
                self.config.npoint, num_points
            )));
        }
        Ok(())
    }

    fn sample_centers(&self, coords: ArrayView3<f32>) -> Result<(SampledCenters, Array3<f32>)> {
        let centers = self.sampler.sample(coords)?;
        let new_coords = gather_points(coords, centers.view())?;
        Ok((centers, new_coords))
    }

    fn group_branch(
        &self,
        query: &BallQuery,
        coords: ArrayView3<f32>,
        features: Option<ArrayView3<f32>>,
        new_coords: ArrayView3<f32>,
    ) -> Result<GroupedBranch> {
        let neighbors = query.query(coords, new_coords)?;
        let grouped_coords = group_points(coords, neighbors.indices.view())?;

        let grouped = match features {
            Some(features) => {
                let grouped_features = group_points(features, neighbors.indices.view())?;
                concatenate(Axis(1), &[grouped_coords.view(), grouped_features.view()])?
            }
            None => grouped_coords,
        };

        Ok(GroupedBranch { neighbors, grouped })
    }

    fn run(
        &self,
        coords: ArrayView3<f32>,
        features: Option<ArrayView3<f32>>,
    ) -> Result<(Array3<f32>, Array3<f32>)> {
        let (_, new_coords) = self.sample_centers(coords)?;
        let (batch, _, npoint) = new_coords.dim();

        let mut pooled = Vec::with_capacity(self.queries.len());
        for (index, (query, transform)) in self.queries.iter().zip(&self.transforms).enumerate() {
            let branch = self.group_branch(query, coords, features, new_coords.view())?;
            let transformed = transform.forward(branch.grouped.view())?;

            let expected = [batch, transform.out_channels(), npoint, query.nsample()];
            if transformed.shape() != &expected[..] {
                return Err(Error::ShapeMismatch(format!(
                    "branch {} transform returned {:?}, expected {:?}",
                    index,
                    transformed.shape(),
                    expected
                )));
            }

            let reduced = transformed.fold_axis(Axis(3), f32::NEG_INFINITY, |&acc, &value| acc.max(value));
            trace!(branch = index, channels = reduced.dim().1, "branch pooled");
            pooled.push(reduced);
        }

        let views: Vec<ArrayView3<f32>> = pooled.iter().map(|branch| branch.view()).collect();
        let new_features = concatenate(Axis(1), &views)?;
        Ok((new_coords, new_features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pointset_core::{Array4, ArrayView4, BranchConfig, FpsStart, Point3f};
    use rand::Rng;

    /// Passes grouped tensors through unchanged
    struct Identity {
        channels: usize,
    }

    impl SharedTransform for Identity {
        fn in_channels(&self) -> usize {
            self.channels
        }

        fn out_channels(&self) -> usize {
            self.channels
        }

        fn forward(&self, grouped: ArrayView4<f32>) -> Result<Array4<f32>> {
            Ok(grouped.to_owned())
        }
    }

    fn example_buffer() -> PointBuffer {
        PointBuffer::from_clouds(&[vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(5.0, 5.0, 5.0),
        ]])
        .unwrap()
    }

    fn grid_buffer(batch: usize) -> PointBuffer {
        let clouds: Vec<Vec<Point3f>> = (0..batch)
            .map(|b| {
                (0..64)
                    .map(|i| {
                        Point3f::new(
                            (i % 4) as f32 * 0.25,
                            (i / 4 % 4) as f32 * 0.25,
                            (i / 16) as f32 * 0.25 + b as f32,
                        )
                    })
                    .collect()
            })
            .collect();
        PointBuffer::from_clouds(&clouds).unwrap()
    }

    #[test]
    fn test_identity_transform_pools_neighbor_maxima() {
        let config = SetAbstractionConfig::new(2, vec![BranchConfig::new(1.5, 2, vec![3])]);
        let layer =
            SetAbstractionLayer::with_transforms(config, 0, vec![Identity { channels: 3 }]).unwrap();

        let output = layer.forward(&example_buffer()).unwrap();
        assert_eq!(output.cloud(0), vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(5.0, 5.0, 5.0)]);

        // center 0 groups points [0, 1]; center 3 groups [3, 3]
        let features = output.features().unwrap();
        assert_eq!(features.shape(), &[1, 3, 2]);
        assert_relative_eq!(features[[0, 0, 0]], 1.0);
        assert_relative_eq!(features[[0, 1, 0]], 0.0);
        assert_relative_eq!(features[[0, 2, 0]], 0.0);
        assert_relative_eq!(features[[0, 0, 1]], 5.0);
        assert_relative_eq!(features[[0, 1, 1]], 5.0);
        assert_relative_eq!(features[[0, 2, 1]], 5.0);
    }

    #[test]
    fn test_features_follow_coordinates() {
        let input = example_buffer()
            .with_features(Array3::from_shape_vec((1, 1, 4), vec![10.0, 20.0, 30.0, 40.0]).unwrap())
            .unwrap();
        let config = SetAbstractionConfig::new(2, vec![BranchConfig::new(1.5, 4, vec![4])]);
        let layer =
            SetAbstractionLayer::with_transforms(config, 1, vec![Identity { channels: 4 }]).unwrap();

        let groups = layer.sample_and_group(input.coords(), input.features()).unwrap();
        let grouped = &groups.branches[0].grouped;
        assert_eq!(grouped.shape(), &[1, 4, 2, 4]);
        // channel 3 holds the feature, slots [0, 1, 2, 0] around center 0
        let slots: Vec<f32> = (0..4).map(|k| grouped[[0, 3, 0, k]]).collect();
        assert_eq!(slots, vec![10.0, 20.0, 30.0, 10.0]);

        let output = layer.forward(&input).unwrap();
        let features = output.features().unwrap();
        assert_relative_eq!(features[[0, 3, 0]], 30.0);
        assert_relative_eq!(features[[0, 3, 1]], 40.0);
    }

    #[test]
    fn test_multi_branch_shapes() {
        let config = SetAbstractionConfig::new(
            16,
            vec![
                BranchConfig::new(0.3, 8, vec![16, 32]),
                BranchConfig::new(0.6, 16, vec![32, 64]),
            ],
        );
        let layer = SetAbstractionLayer::new(config, 0).unwrap();
        assert_eq!(layer.out_channels(), 96);

        let output = layer.forward(&grid_buffer(2)).unwrap();
        assert_eq!(output.coords().shape(), &[2, 3, 16]);
        assert_eq!(output.features().unwrap().shape(), &[2, 96, 16]);
    }

    #[test]
    fn test_forward_is_bit_identical() {
        let config = SetAbstractionConfig::new(8, vec![BranchConfig::new(0.5, 8, vec![8, 16])])
            .with_init_seed(11);
        let layer = SetAbstractionLayer::new(config, 0).unwrap();
        let input = grid_buffer(3);

        let first = layer.forward(&input).unwrap();
        let second = layer.forward(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_seeded_fps_start_reaches_sampler() {
        let input = grid_buffer(2);
        let start_for = |seed: u64, b: u64| StdRng::seed_from_u64(seed + b).gen_range(0..64usize);
        let seed = (0..64u64)
            .find(|&seed| start_for(seed, 0) != 0)
            .unwrap();

        let base = SetAbstractionConfig::new(8, vec![BranchConfig::new(0.5, 8, vec![8, 16])]);
        let default_layer = SetAbstractionLayer::new(base.clone(), 0).unwrap();
        let seeded_layer =
            SetAbstractionLayer::new(base.with_fps_start(FpsStart::Seeded(seed)), 0).unwrap();

        let default_groups = default_layer.sample_and_group(input.coords(), None).unwrap();
        let seeded_groups = seeded_layer.sample_and_group(input.coords(), None).unwrap();
        for b in 0..2 {
            assert_eq!(default_groups.centers[[b, 0]], 0);
            assert_eq!(seeded_groups.centers[[b, 0]], start_for(seed, b as u64));
        }
        assert_ne!(default_groups.centers, seeded_groups.centers);

        let first = seeded_layer.forward(&input).unwrap();
        let second = seeded_layer.forward(&input).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, default_layer.forward(&input).unwrap());
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let config = SetAbstractionConfig::new(2, vec![BranchConfig::new(1.0, 4, vec![8])]);
        let coords_only = SetAbstractionLayer::new(config.clone(), 0).unwrap();
        let with_features = SetAbstractionLayer::new(config, 2).unwrap();
        let input = example_buffer();

        let missing = with_features.forward(&input);
        assert!(matches!(missing, Err(Error::ShapeMismatch(_))));

        let extra = input
            .clone()
            .with_features(Array3::zeros((1, 5, 4)))
            .unwrap();
        assert!(matches!(coords_only.forward(&extra), Err(Error::ShapeMismatch(_))));
        assert!(matches!(with_features.forward(&extra), Err(Error::ShapeMismatch(_))));

        let too_few = SetAbstractionLayer::new(
            SetAbstractionConfig::new(5, vec![BranchConfig::new(1.0, 4, vec![8])]),
            0,
        )
        .unwrap();
        assert!(matches!(too_few.forward(&input), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_mismatched_transforms() {
        let config = SetAbstractionConfig::new(
            2,
            vec![
                BranchConfig::new(1.0, 4, vec![3]),
                BranchConfig::new(2.0, 4, vec![3]),
            ],
        );

        let too_few = SetAbstractionLayer::with_transforms(config.clone(), 0, vec![Identity { channels: 3 }]);
        assert!(matches!(too_few, Err(Error::InvalidArgument(_))));

        let wrong_width = SetAbstractionLayer::with_transforms(
            config,
            1,
            vec![Identity { channels: 4 }, Identity { channels: 4 }],
        );
        assert!(matches!(wrong_width, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_invalid_config_eagerly() {
        let config = SetAbstractionConfig::new(4, vec![BranchConfig::new(0.0, 4, vec![8])]);
        assert!(matches!(
            SetAbstractionLayer::new(config, 0),
            Err(Error::InvalidArgument(_))
        ));
    }
}
