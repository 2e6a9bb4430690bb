//! Demo running a multi-scale set abstraction layer on synthetic clouds
//!
//! The layer configuration is read from a JSON file when `--config` is given,
//! otherwise a three-scale default is used.

use anyhow::{Context, Result};
use clap::Parser;
use pointset_algorithms::{init_thread_pool, SetAbstractionLayer, ThreadPoolConfig};
use pointset_core::{BranchConfig, Point3f, PointBuffer, SetAbstractionConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "set_abstraction_demo", about = "Run a set abstraction layer on random point clouds")]
struct Args {
    /// JSON layer configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Clouds per batch
    #[arg(long, default_value_t = 4)]
    batch: usize,

    /// Points per cloud
    #[arg(long, default_value_t = 2048)]
    points: usize,

    /// Seed for the synthetic clouds
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Worker threads (defaults to one per CPU)
    #[arg(long)]
    threads: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn default_config() -> SetAbstractionConfig {
    SetAbstractionConfig::new(
        512,
        vec![
            BranchConfig::new(0.1, 16, vec![32, 32, 64]),
            BranchConfig::new(0.2, 32, vec![64, 64, 128]),
            BranchConfig::new(0.4, 128, vec![64, 96, 128]),
        ],
    )
}

/// Points on the surface of a unit sphere with a little radial noise
fn sphere_clouds(batch: usize, num_points: usize, seed: u64) -> Result<PointBuffer> {
    let mut rng = StdRng::seed_from_u64(seed);
    let clouds: Vec<Vec<Point3f>> = (0..batch)
        .map(|_| {
            (0..num_points)
                .map(|_| {
                    let theta = rng.gen_range(0.0..std::f32::consts::TAU);
                    let z: f32 = rng.gen_range(-1.0..1.0);
                    let r = 1.0 + rng.gen_range(-0.02f32..0.02);
                    let ring = (1.0 - z * z).sqrt();
                    Point3f::new(r * ring * theta.cos(), r * ring * theta.sin(), r * z)
                })
                .collect()
        })
        .collect();
    Ok(PointBuffer::from_clouds(&clouds)?)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut pool_config = ThreadPoolConfig::default();
    if let Some(threads) = args.threads {
        pool_config = pool_config.with_threads(threads);
    }
    init_thread_pool(pool_config)?;

    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            SetAbstractionConfig::from_json_str(&json)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => default_config(),
    };
    info!(
        npoint = config.npoint,
        branches = config.branches.len(),
        out_channels = config.out_channels(),
        "layer configuration"
    );

    let input = sphere_clouds(args.batch, args.points, args.seed)?;
    let layer = SetAbstractionLayer::new(config, 0)?;

    let start = Instant::now();
    let output = layer.forward(&input)?;
    let elapsed = start.elapsed();

    info!(
        input = ?input.coords().shape(),
        coords = ?output.coords().shape(),
        features = ?output.features().map(|features| features.shape().to_vec()),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "forward pass complete"
    );

    let first_center = output.point(0, 0);
    println!(
        "First center of cloud 0: ({:.3}, {:.3}, {:.3})",
        first_center.x, first_center.y, first_center.z
    );

    Ok(())
}
