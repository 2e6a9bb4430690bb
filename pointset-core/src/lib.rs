//! Core data structures and traits for pointset
//!
//! This crate provides the batch point buffer, the index tables produced by the
//! sampling and grouping kernels, the layer configuration, and the
//! `SharedTransform` trait implemented by per-neighborhood feature transforms.

pub mod point;
pub mod point_buffer;
pub mod config;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_buffer::*;
pub use config::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::Point3;

/// Re-export the array types the kernels exchange
pub use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Axis};
