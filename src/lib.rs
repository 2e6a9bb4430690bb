//! # pointset
//!
//! Multi-scale set abstraction (PointNet++) building blocks for point clouds.
//!
//! This is the umbrella crate that re-exports the data model and the kernels.
//! You can use this crate to get everything in one place, or depend on
//! `pointset-core` alone when only the types and the transform trait are needed.
//!
//! ## Features
//!
//! - **Core**: `PointBuffer`, index tables, configuration, errors, the `SharedTransform` trait
//! - **Algorithms**: farthest point sampling, ball query, grouping, the shared MLP
//!   and the `SetAbstractionLayer`
//!
//! ## Quick Start
//!
//! ```rust
//! use pointset::prelude::*;
//!
//! let clouds = vec![vec![
//!     Point3f::new(0.0, 0.0, 0.0),
//!     Point3f::new(1.0, 0.0, 0.0),
//!     Point3f::new(0.0, 1.0, 0.0),
//!     Point3f::new(5.0, 5.0, 5.0),
//! ]];
//! let input = PointBuffer::from_clouds(&clouds)?;
//!
//! let config = SetAbstractionConfig::new(2, vec![BranchConfig::new(1.5, 2, vec![8, 16])]);
//! let layer = SetAbstractionLayer::new(config, 0)?;
//! let output = layer.forward(&input)?;
//!
//! assert_eq!(output.num_points(), 2);
//! assert_eq!(output.feature_channels(), 16);
//! # Ok::<(), pointset::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables algorithms
//! - `algorithms`: Sampling, grouping and the set abstraction layer

// Re-export core functionality
pub use pointset_core::*;

#[cfg(feature = "algorithms")]
pub use pointset_algorithms as algorithms;

/// Convenient imports for common use cases
pub mod prelude {
    pub use pointset_core::*;

    #[cfg(feature = "algorithms")]
    pub use pointset_algorithms::*;
}
