//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use binlog_core::{Connection, ConnectionRegistry, Entry, LogConfig, Position, Registry};
use rand::seq::SliceRandom;
use rand::Rng;
use tempfile::TempDir;

/// Generate random blob data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` entries with an `idx` field and a random `kind`.
pub fn generate_entries(count: usize) -> Vec<Entry> {
    let mut rng = rand::thread_rng();
    let kinds = ["click", "view", "buy"];
    (0..count)
        .map(|i| {
            let kind = kinds.choose(&mut rng).copied().unwrap_or("click");
            Entry::default().with("idx", i as i64).with("kind", kind)
        })
        .collect()
}

/// A registry holding a random `fraction` of the positions below `bound`,
/// added in random order.
pub fn random_registry(bound: Position, fraction: f64) -> Registry {
    let mut rng = rand::thread_rng();
    let mut positions: Vec<Position> = (0..bound).filter(|_| rng.gen_bool(fraction)).collect();
    positions.shuffle(&mut rng);
    let mut registry = Registry::new();
    for position in positions {
        registry.add(position).expect("position below MAX");
    }
    registry
}

/// A log in a temporary directory, filled with `count` entries.
pub struct BenchLog {
    /// The open connection.
    pub conn: Connection,
    _registry: ConnectionRegistry,
    _temp_dir: TempDir,
}

impl BenchLog {
    /// Opens a fresh log and appends `count` entries.
    pub fn new(count: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let registry = ConnectionRegistry::new();
        let conn = registry
            .open(temp_dir.path(), LogConfig::new().map_size(256 * 1024 * 1024))
            .expect("Failed to open log");
        conn.bulk_create(generate_entries(count))
            .expect("Failed to fill log");
        Self {
            conn,
            _registry: registry,
            _temp_dir: temp_dir,
        }
    }
}
