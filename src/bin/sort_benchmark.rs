use particle_sort::logging::init_logging;
use particle_sort::prelude::*;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sort random particle clouds on every available backend.
///
/// Optional first argument: a TOML settings file.
fn main() -> anyhow::Result<()> {
    init_logging("info");

    println!("Particle Depth Sort Benchmark");
    println!("=============================\n");

    let settings = match std::env::args().nth(1) {
        Some(path) => SortSettings::from_file(&path)?,
        None => SortSettings::default(),
    };
    println!(
        "Config: group size {}, {} key bits, {:?}, {:?}\n",
        settings.sorter.group_size,
        settings.sorter.key_bits,
        settings.sorter.quantization,
        settings.sorter.direction
    );

    // Test parameters
    const PARTICLE_COUNTS: [u32; 4] = [1_000, 10_000, 100_000, 500_000];
    const ITERATIONS: u32 = 5;

    let max = settings.sorter.max_element_count();
    let mut rng = rand::thread_rng();
    let clouds: Vec<Vec<Vec3>> = PARTICLE_COUNTS
        .iter()
        .filter(|&&count| count <= max)
        .map(|&count| {
            (0..count)
                .map(|_| {
                    Vec3::new(
                        rng.gen_range(-100.0..100.0),
                        rng.gen_range(-100.0..100.0),
                        rng.gen_range(-100.0..100.0),
                    )
                })
                .collect()
        })
        .collect();
    let origin = Vec3::new(0.0, 20.0, -150.0);

    println!("1. CPU reference backend");
    println!("------------------------");
    let cpu = Arc::new(CpuBackend::new(settings.sorter.clone())?);
    for cloud in &clouds {
        run_backend(&cpu, &settings, cloud, origin, ITERATIONS)?;
    }

    println!("\n2. wgpu backend");
    println!("---------------");
    match WgpuBackend::request(settings.sorter.clone())? {
        Some(gpu) => {
            let gpu = Arc::new(gpu);
            for cloud in &clouds {
                run_backend(&gpu, &settings, cloud, origin, ITERATIONS)?;
            }
        }
        None => println!("No GPU adapter available, skipped"),
    }

    Ok(())
}

fn run_backend<B: ComputeBackend>(
    backend: &Arc<B>,
    settings: &SortSettings,
    cloud: &[Vec3],
    origin: Vec3,
    iterations: u32,
) -> anyhow::Result<()> {
    let count = cloud.len() as u32;
    let pool = BufferPool::new(Arc::clone(backend), settings.pool.clone());
    let mut sorter = Sorter::new(Arc::clone(backend));

    let words = positions_to_words(cloud);
    let positions = backend.create_buffer("Benchmark Positions", words.len() as u32)?;
    backend.write_buffer(&positions, 0, &words)?;

    let mut total = Duration::ZERO;
    let mut sorted = Vec::new();
    for _ in 0..iterations {
        let start = Instant::now();
        let mut encoder = backend.create_encoder("Benchmark Sort");
        sorter.prepare(&pool, count)?;
        // Two batches to exercise the write cursor
        let half = count / 2;
        sorter.generate_batch(
            &mut encoder,
            &GenerateParams::new(half, &positions).with_sort_origin(origin),
        )?;
        sorter.generate_batch(
            &mut encoder,
            &GenerateParams::new(count - half, &positions)
                .with_indices(half, 1)
                .with_input_offset(half)
                .with_sort_origin(origin),
        )?;
        sorter.sort(&mut encoder)?;
        backend.flush(encoder)?;
        sorted = sorter.read_sorted_values()?;
        total += start.elapsed();
    }

    let violations = order_violations(settings, cloud, origin, &sorted);
    let average = total / iterations;
    println!(
        "{:>4} {:>8} particles: {:>10.3?} avg, {:>8.1} M/s, {}",
        backend.name(),
        count,
        average,
        count as f64 / average.as_secs_f64() / 1e6,
        if violations == 0 {
            "order OK".to_string()
        } else {
            format!("{} ORDER VIOLATIONS", violations)
        }
    );

    let stats = pool.stats();
    log::debug!(
        "[Benchmark] Pool: {} allocations, {} reuses, {} bytes",
        stats.allocations,
        stats.reuses,
        stats.allocated_bytes
    );
    Ok(())
}

/// Duplicate or missing indices, else adjacent pairs whose keys are out of order
fn order_violations(settings: &SortSettings, cloud: &[Vec3], origin: Vec3, sorted: &[u32]) -> usize {
    if sorted.len() != cloud.len() {
        return sorted.len().abs_diff(cloud.len()).max(1);
    }
    let mut seen = vec![false; cloud.len()];
    let mut violations = 0;
    let key = |index: u32| depth_key_of(settings, cloud[index as usize], origin);
    for &index in sorted {
        match seen.get_mut(index as usize) {
            Some(slot) if !*slot => *slot = true,
            _ => violations += 1,
        }
    }
    if violations > 0 {
        return violations;
    }
    // One key step of slack: device distances may differ in the last ulp
    sorted
        .windows(2)
        .filter(|pair| key(pair[0]) > key(pair[1]).saturating_add(1))
        .count()
}

fn depth_key_of(settings: &SortSettings, position: Vec3, origin: Vec3) -> u32 {
    particle_sort::sort::depth_key(&settings.sorter, position.distance(origin))
}
