//! Purge command implementation.

use binlog_core::Connection;

/// Runs the purge command.
pub fn run(conn: &Connection, chunk_size: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let stats = match chunk_size {
        Some(size) => conn.purge_chunked(size)?,
        None => conn.purge()?,
    };
    println!("Removed {} entries", stats.removed);
    if stats.not_found > 0 {
        println!("{} acknowledged entries were already gone", stats.not_found);
    }
    Ok(())
}
