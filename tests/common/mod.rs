#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regime_engine::domain::market::feature_table::FeatureTable;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

pub const SPIKE_START: usize = 150;
pub const SPIKE_END: usize = 200;

pub fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-12);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Returns and rolling volatility with a 3x volatility spike over
/// `SPIKE_START..SPIKE_END`. One-minute bars starting at epoch 0.
pub fn spike_table(n: usize, seed: u64) -> FeatureTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(n);
    for t in 0..n {
        let sigma = if (SPIKE_START..SPIKE_END).contains(&t) {
            0.03
        } else {
            0.01
        };
        let ret = sigma * normal(&mut rng);
        let vol = sigma + 0.001 * normal(&mut rng);
        rows.push(vec![ret, vol]);
    }
    let index = (0..n as i64).map(|t| t * 60_000).collect();
    FeatureTable::from_rows(index, vec!["ret".to_string(), "vol".to_string()], &rows)
        .expect("synthetic table is well formed")
}

/// Fresh directory under the system temp dir.
pub fn temp_dir(prefix: &str) -> PathBuf {
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), id));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}
