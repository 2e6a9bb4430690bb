//! Thread pool configuration tests
//!
//! Kept in their own binary because the pool is process-global.

use pointset_algorithms::parallel::{
    get_config, init_thread_pool, install, is_parallel_enabled, ThreadPoolConfig,
};
use pointset_algorithms::{ball_query, gather_points, FarthestPointSampler, SetAbstractionLayer};
use pointset_core::{BranchConfig, Point3f, PointBuffer, SetAbstractionConfig};

fn spiral_buffer() -> PointBuffer {
    let clouds: Vec<Vec<Point3f>> = (0..3)
        .map(|b| {
            (0..128)
                .map(|i| {
                    let t = i as f32 * 0.1 + b as f32;
                    Point3f::new(t.cos(), t.sin(), i as f32 * 0.01)
                })
                .collect()
        })
        .collect();
    PointBuffer::from_clouds(&clouds).unwrap()
}

#[test]
fn test_serial_and_parallel_outputs_match() {
    init_thread_pool(ThreadPoolConfig::default().with_threads(4)).unwrap();
    assert!(is_parallel_enabled());
    assert_eq!(get_config().num_threads, Some(4));

    let layer = SetAbstractionLayer::new(
        SetAbstractionConfig::new(
            32,
            vec![
                BranchConfig::new(0.2, 8, vec![16, 32]),
                BranchConfig::new(0.5, 16, vec![32, 32]),
            ],
        ),
        0,
    )
    .unwrap();
    let input = spiral_buffer();

    let sampler = FarthestPointSampler::new(16);

    let parallel = layer.forward(&input).unwrap();
    let parallel_centers = sampler.sample(input.coords()).unwrap();
    assert_eq!(install(rayon::current_num_threads).unwrap(), 4);

    init_thread_pool(ThreadPoolConfig::default().with_enabled(false)).unwrap();
    assert!(!is_parallel_enabled());
    assert_eq!(install(rayon::current_num_threads).unwrap(), 1);

    let serial = layer.forward(&input).unwrap();
    assert_eq!(parallel, serial);

    // kernels called directly follow the same switch
    let serial_centers = sampler.sample(input.coords()).unwrap();
    assert_eq!(parallel_centers, serial_centers);
    let center_coords = gather_points(input.coords(), serial_centers.view()).unwrap();
    let neighbors = ball_query(input.coords(), center_coords.view(), 0.3, 8).unwrap();
    assert_eq!(neighbors.indices.shape(), &[3, 16, 8]);
}
