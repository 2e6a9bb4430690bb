//! Set abstraction configuration
//!
//! A layer is described by the number of centers to sample and an ordered list
//! of radius branches. Every check runs when the configuration is validated,
//! before any forward pass.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// How farthest point sampling picks its first center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FpsStart {
    /// Always start from point 0 of every cloud
    #[default]
    First,
    /// Start from a point drawn from a generator seeded with `seed + batch_index`
    Seeded(u64),
}

/// One grouping scale: ball radius, neighbor capacity and transform widths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Ball query radius
    pub radius: f32,
    /// Neighbor slots per center (K)
    pub nsample: usize,
    /// Output widths of the shared transform, in order
    pub mlp: Vec<usize>,
}

impl BranchConfig {
    pub fn new(radius: f32, nsample: usize, mlp: Vec<usize>) -> Self {
        Self { radius, nsample, mlp }
    }

    /// Channels this branch contributes to the layer output
    pub fn out_channels(&self) -> usize {
        self.mlp.last().copied().unwrap_or(0)
    }

    /// Validate radius, capacity and widths
    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "radius must be positive and finite, got {}",
                self.radius
            )));
        }
        if self.nsample == 0 {
            return Err(Error::InvalidArgument(
                "nsample must be greater than 0".to_string(),
            ));
        }
        if self.mlp.is_empty() {
            return Err(Error::InvalidArgument(
                "mlp must contain at least one width".to_string(),
            ));
        }
        if self.mlp.contains(&0) {
            return Err(Error::InvalidArgument(format!(
                "mlp widths must be positive, got {:?}",
                self.mlp
            )));
        }
        Ok(())
    }
}

/// Configuration of a multi-scale set abstraction layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAbstractionConfig {
    /// Number of centers sampled per cloud (M)
    pub npoint: usize,
    /// Radius branches, concatenated in this order
    pub branches: Vec<BranchConfig>,
    /// Batch normalization inside the shared transforms
    #[serde(default = "default_batch_norm")]
    pub batch_norm: bool,
    /// First-center policy for farthest point sampling
    #[serde(default)]
    pub fps_start: FpsStart,
    /// Seed for shared transform parameter initialization
    #[serde(default)]
    pub init_seed: u64,
}

fn default_batch_norm() -> bool {
    true
}

impl SetAbstractionConfig {
    /// Create a configuration with batch norm, start point 0 and init seed 0
    pub fn new(npoint: usize, branches: Vec<BranchConfig>) -> Self {
        Self {
            npoint,
            branches,
            batch_norm: default_batch_norm(),
            fps_start: FpsStart::default(),
            init_seed: 0,
        }
    }

    /// Build from parallel lists of radii, capacities and widths
    ///
    /// # Example
    /// ```rust
    /// use pointset_core::SetAbstractionConfig;
    ///
    /// let config = SetAbstractionConfig::from_lists(
    ///     512,
    ///     &[0.1, 0.2, 0.4],
    ///     &[16, 32, 128],
    ///     &[vec![32, 32, 64], vec![64, 64, 128], vec![64, 96, 128]],
    /// ).unwrap();
    /// assert_eq!(config.out_channels(), 320);
    ///
    /// assert!(SetAbstractionConfig::from_lists(512, &[0.1], &[16, 32], &[vec![32]]).is_err());
    /// ```
    pub fn from_lists(
        npoint: usize,
        radii: &[f32],
        nsamples: &[usize],
        mlps: &[Vec<usize>],
    ) -> Result<Self> {
        if radii.len() != nsamples.len() || radii.len() != mlps.len() {
            return Err(Error::InvalidArgument(format!(
                "radius, nsample and mlp lists must have equal lengths, got {}, {} and {}",
                radii.len(),
                nsamples.len(),
                mlps.len()
            )));
        }

        let branches = radii
            .iter()
            .zip(nsamples)
            .zip(mlps)
            .map(|((&radius, &nsample), mlp)| BranchConfig::new(radius, nsample, mlp.clone()))
            .collect();

        let config = Self::new(npoint, branches);
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Enable or disable batch normalization
    pub fn with_batch_norm(mut self, batch_norm: bool) -> Self {
        self.batch_norm = batch_norm;
        self
    }

    /// Set the farthest point sampling start policy
    pub fn with_fps_start(mut self, fps_start: FpsStart) -> Self {
        self.fps_start = fps_start;
        self
    }

    /// Set the parameter initialization seed
    pub fn with_init_seed(mut self, init_seed: u64) -> Self {
        self.init_seed = init_seed;
        self
    }

    /// Total output channels across all branches
    pub fn out_channels(&self) -> usize {
        self.branches.iter().map(BranchConfig::out_channels).sum()
    }

    /// Validate the center count and every branch
    pub fn validate(&self) -> Result<()> {
        if self.npoint == 0 {
            return Err(Error::InvalidArgument(
                "npoint must be greater than 0".to_string(),
            ));
        }
        if self.branches.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one radius branch is required".to_string(),
            ));
        }
        for (index, branch) in self.branches.iter().enumerate() {
            branch.validate().map_err(|e| match e {
                Error::InvalidArgument(msg) => {
                    Error::InvalidArgument(format!("branch {}: {}", index, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}
