//! # Pointset Algorithms
//!
//! Sampling, grouping and set abstraction kernels for batched point clouds.
//!
//! The pieces compose into a PointNet++ multi-scale grouping layer:
//! farthest point sampling picks well-spread centers, ball query finds each
//! center's neighbors per radius, grouping gathers the neighborhoods, and a
//! shared MLP with max-pooling turns each neighborhood into a feature vector.

pub mod sampling;
pub mod ball_query;
pub mod grouping;
pub mod shared_mlp;
pub mod set_abstraction;
pub mod parallel;

// Re-export commonly used items
pub use sampling::{farthest_point_indices, FarthestPointSampler};
pub use ball_query::{ball_neighbors, ball_query, BallQuery, BallQueryResult};
pub use grouping::{gather_points, group_points};
pub use shared_mlp::{BatchNorm, ConvBnRelu, SharedMlp, SharedMlpConfig, BATCH_NORM_EPS};
pub use set_abstraction::{GroupedBranch, SampledGroups, SetAbstractionLayer};
pub use parallel::{init_thread_pool, ThreadPoolConfig};
