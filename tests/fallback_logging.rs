/// Fallback Logging Tests
///
/// A batch that cannot be sorted frame after frame reports it once, then
/// stays quiet until a sort succeeds again.

use particle_sort::prelude::*;
use std::cell::Cell;
use std::sync::{Arc, Once};

thread_local! {
    static WARNINGS: Cell<usize> = const { Cell::new(0) };
    static ERRORS: Cell<usize> = const { Cell::new(0) };
}

/// Counts warn and error records per thread, so tests in this file don't
/// see each other's output
struct CountingLogger;

impl log::Log for CountingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        match record.level() {
            log::Level::Warn => WARNINGS.with(|count| count.set(count.get() + 1)),
            log::Level::Error => ERRORS.with(|count| count.set(count.get() + 1)),
            _ => {}
        }
    }

    fn flush(&self) {}
}

static LOGGER: CountingLogger = CountingLogger;
static INIT: Once = Once::new();

fn install_logger() {
    INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Debug);
        }
    });
}

/// (warnings, errors) logged on this thread so far
fn counts() -> (usize, usize) {
    (WARNINGS.with(Cell::get), ERRORS.with(Cell::get))
}

fn small_backend() -> Arc<CpuBackend> {
    // Capacity of 4² * 1 = 16 elements
    Arc::new(
        CpuBackend::new(SorterConfig {
            group_size: 4,
            max_scan_chunks: 1,
            ..SorterConfig::default()
        })
        .unwrap(),
    )
}

fn build_frames(
    backend: &Arc<CpuBackend>,
    pool: &BufferPool<CpuBackend>,
    batch: &mut BillboardSortBatch<CpuBackend>,
    particles: u32,
    frames: usize,
) {
    let positions = backend.create_buffer("positions", particles * 3).unwrap();
    for _ in 0..frames {
        let requests = [DrawRequest::new(particles, BillboardMode::ScreenAligned, &positions)];
        let mut encoder = backend.create_encoder("frame");
        let layout = batch.build(pool, &mut encoder, &requests, Vec3::ZERO).unwrap();
        assert_eq!(layout.total_particles, particles);
        backend.flush(encoder).unwrap();
        batch.end_frame();
    }
}

#[test]
fn test_over_capacity_batch_warns_once() {
    install_logger();
    let backend = small_backend();
    let pool = BufferPool::new(Arc::clone(&backend), PoolConfig::default());
    let mut batch = BillboardSortBatch::new(Arc::clone(&backend));

    let before = counts();
    build_frames(&backend, &pool, &mut batch, 100, 1);
    let first_frame = counts();
    assert!(first_frame.0 > before.0, "first over-capacity frame should warn");

    build_frames(&backend, &pool, &mut batch, 100, 9);
    assert_eq!(counts(), first_frame, "later frames should not warn again");
}

#[test]
fn test_exhausted_pool_reports_once() {
    install_logger();
    let backend = small_backend();
    // 12 elements need 4 * 48 + 16 bytes of storage
    let pool = BufferPool::new(
        Arc::clone(&backend),
        PoolConfig {
            max_bytes: 64,
            ..PoolConfig::default()
        },
    );
    let mut batch = BillboardSortBatch::new(Arc::clone(&backend));

    let before = counts();
    build_frames(&backend, &pool, &mut batch, 12, 1);
    let first_frame = counts();
    assert!(first_frame.1 > before.1, "first failed allocation should log an error");

    build_frames(&backend, &pool, &mut batch, 12, 9);
    assert_eq!(counts(), first_frame);
}

#[test]
fn test_successful_sort_rearms_the_report() {
    install_logger();
    let backend = small_backend();
    let pool = BufferPool::new(Arc::clone(&backend), PoolConfig::default());
    let mut batch = BillboardSortBatch::new(Arc::clone(&backend));

    build_frames(&backend, &pool, &mut batch, 100, 3);
    let after_failures = counts();
    build_frames(&backend, &pool, &mut batch, 8, 1);
    assert!(batch.sorter().is_empty(), "end_frame clears the sorter");

    build_frames(&backend, &pool, &mut batch, 100, 3);
    assert!(counts().0 > after_failures.0, "a new run of failures warns again");
}
