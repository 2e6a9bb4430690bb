//! Shared multilayer perceptron over neighbor slots
//!
//! Each layer is a 1x1 convolution followed by inference-mode batch
//! normalization and ReLU. The same weights apply to every `(center, slot)`
//! position, so the transform commutes with permutations of the neighbors.
//! Parameters are plain arrays: they come either from seeded initialization
//! or from an external source through [`SharedMlp::from_layers`].

use ndarray::Array1;
use pointset_core::{
    Array2, Array4, ArrayView2, ArrayView4, Axis, Error, Result, SharedTransform,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::instrument;

use crate::parallel;

/// Default batch normalization epsilon
pub const BATCH_NORM_EPS: f32 = 1e-5;

/// Configuration for a shared MLP
#[derive(Debug, Clone, PartialEq)]
pub struct SharedMlpConfig {
    /// Input channels
    pub in_channels: usize,
    /// Output width of each layer
    pub widths: Vec<usize>,
    /// Batch normalization after each convolution
    pub batch_norm: bool,
}

impl SharedMlpConfig {
    pub fn new(in_channels: usize, widths: Vec<usize>) -> Self {
        Self {
            in_channels,
            widths,
            batch_norm: true,
        }
    }

    pub fn with_batch_norm(mut self, batch_norm: bool) -> Self {
        self.batch_norm = batch_norm;
        self
    }

    /// Initialize the MLP
    ///
    /// Convolution weights (and biases when batch norm is off) are uniform in
    /// `±1/sqrt(fan_in)`. Batch norm starts as the identity: unit scale, zero
    /// shift, zero running mean and unit running variance.
    pub fn init<R: Rng>(&self, rng: &mut R) -> Result<SharedMlp> {
        if self.in_channels == 0 {
            return Err(Error::InvalidArgument(
                "shared MLP needs at least one input channel".to_string(),
            ));
        }
        if self.widths.is_empty() || self.widths.contains(&0) {
            return Err(Error::InvalidArgument(format!(
                "shared MLP widths must be non-empty and positive, got {:?}",
                self.widths
            )));
        }

        let mut layers = Vec::with_capacity(self.widths.len());
        let mut in_dim = self.in_channels;

        for &out_dim in &self.widths {
            let bound = 1.0 / (in_dim as f32).sqrt();
            let weight = Array2::from_shape_fn((out_dim, in_dim), |_| rng.gen_range(-bound..bound));
            let layer = if self.batch_norm {
                ConvBnRelu::new(weight, None, Some(BatchNorm::identity(out_dim)))?
            } else {
                let bias = Array1::from_shape_fn(out_dim, |_| rng.gen_range(-bound..bound));
                ConvBnRelu::new(weight, Some(bias), None)?
            };
            layers.push(layer);
            in_dim = out_dim;
        }

        SharedMlp::from_layers(layers)
    }

    /// Initialize from a fresh generator seeded with `seed`
    pub fn init_seeded(&self, seed: u64) -> Result<SharedMlp> {
        self.init(&mut StdRng::seed_from_u64(seed))
    }
}

/// Batch normalization parameters used with running statistics
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNorm {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub running_mean: Array1<f32>,
    pub running_var: Array1<f32>,
    pub eps: f32,
}

impl BatchNorm {
    /// Normalization that leaves its input unchanged (up to `eps`)
    pub fn identity(channels: usize) -> Self {
        Self {
            gamma: Array1::ones(channels),
            beta: Array1::zeros(channels),
            running_mean: Array1::zeros(channels),
            running_var: Array1::ones(channels),
            eps: BATCH_NORM_EPS,
        }
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    fn validate(&self) -> Result<()> {
        let channels = self.channels();
        if self.beta.len() != channels
            || self.running_mean.len() != channels
            || self.running_var.len() != channels
        {
            return Err(Error::ShapeMismatch(format!(
                "batch norm parameter lengths differ: gamma {}, beta {}, mean {}, var {}",
                channels,
                self.beta.len(),
                self.running_mean.len(),
                self.running_var.len()
            )));
        }
        Ok(())
    }

    /// Per-channel affine form `(scale, shift)` of the normalization
    fn scale_shift(&self) -> (Array1<f32>, Array1<f32>) {
        let scale = &self.gamma / &self.running_var.mapv(|var| (var + self.eps).sqrt());
        let shift = &self.beta - &(&self.running_mean * &scale);
        (scale, shift)
    }
}

/// One shared layer: 1x1 convolution, optional batch norm, ReLU
#[derive(Debug, Clone, PartialEq)]
pub struct ConvBnRelu {
    /// Convolution weight `[out, in]`
    pub weight: Array2<f32>,
    /// Convolution bias `[out]`
    pub bias: Option<Array1<f32>>,
    pub norm: Option<BatchNorm>,
}

impl ConvBnRelu {
    pub fn new(weight: Array2<f32>, bias: Option<Array1<f32>>, norm: Option<BatchNorm>) -> Result<Self> {
        let out_dim = weight.nrows();
        if let Some(bias) = &bias {
            if bias.len() != out_dim {
                return Err(Error::ShapeMismatch(format!(
                    "bias has {} entries for {} output channels",
                    bias.len(),
                    out_dim
                )));
            }
        }
        if let Some(norm) = &norm {
            norm.validate()?;
            if norm.channels() != out_dim {
                return Err(Error::ShapeMismatch(format!(
                    "batch norm has {} channels for {} output channels",
                    norm.channels(),
                    out_dim
                )));
            }
        }
        Ok(Self { weight, bias, norm })
    }

    pub fn in_channels(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_channels(&self) -> usize {
        self.weight.nrows()
    }

    /// Apply to columns of `x` (`[in, S]` to `[out, S]`)
    fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let mut y = self.weight.dot(&x);

        if let Some(bias) = &self.bias {
            y += &bias.view().insert_axis(Axis(1));
        }

        if let Some(norm) = &self.norm {
            let (scale, shift) = norm.scale_shift();
            y *= &scale.insert_axis(Axis(1));
            y += &shift.insert_axis(Axis(1));
        }

        y.mapv_inplace(|value| value.max(0.0));
        y
    }
}

/// Stack of [`ConvBnRelu`] layers applied to every neighbor slot
#[derive(Debug, Clone, PartialEq)]
pub struct SharedMlp {
    layers: Vec<ConvBnRelu>,
}

impl SharedMlp {
    /// Assemble an MLP from existing layers
    ///
    /// Fails when the list is empty or a layer's input width differs from the
    /// previous layer's output width.
    pub fn from_layers(layers: Vec<ConvBnRelu>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidArgument(
                "shared MLP needs at least one layer".to_string(),
            ));
        }
        for (index, pair) in layers.windows(2).enumerate() {
            if pair[0].out_channels() != pair[1].in_channels() {
                return Err(Error::ShapeMismatch(format!(
                    "layer {} outputs {} channels but layer {} expects {}",
                    index,
                    pair[0].out_channels(),
                    index + 1,
                    pair[1].in_channels()
                )));
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[ConvBnRelu] {
        &self.layers
    }
}

impl SharedTransform for SharedMlp {
    fn in_channels(&self) -> usize {
        self.layers.first().map_or(0, ConvBnRelu::in_channels)
    }

    fn out_channels(&self) -> usize {
        self.layers.last().map_or(0, ConvBnRelu::out_channels)
    }

    #[instrument(skip_all, fields(shape = ?grouped.shape(), out_channels = self.out_channels()))]
    fn forward(&self, grouped: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch, channels, num_centers, nsample) = grouped.dim();
        if channels != self.in_channels() {
            return Err(Error::ShapeMismatch(format!(
                "shared MLP expects {} input channels, got {}",
                self.in_channels(),
                channels
            )));
        }

        let slots = num_centers * nsample;
        let blocks: Vec<Array2<f32>> = parallel::install(|| {
            (0..batch)
                .into_par_iter()
                .map(|b| -> Result<Array2<f32>> {
                    let cloud = grouped.index_axis(Axis(0), b);
                    let mut x =
                        Array2::from_shape_vec((channels, slots), cloud.iter().copied().collect())?;
                    for layer in &self.layers {
                        x = layer.forward(x.view());
                    }
                    Ok(x)
                })
                .collect::<Result<Vec<_>>>()
        })??;

        let out_channels = self.out_channels();
        let mut data = Vec::with_capacity(batch * out_channels * slots);
        for block in &blocks {
            data.extend(block.iter().copied());
        }

        Ok(Array4::from_shape_vec(
            (batch, out_channels, num_centers, nsample),
            data,
        )?)
    }
}
