//! Append command implementation.

use binlog_core::Connection;
use std::io::Read;

/// Runs the append command.
pub fn run(conn: &Connection) -> Result<(), Box<dyn std::error::Error>> {
    let mut raw = Vec::new();
    std::io::stdin().lock().read_to_end(&mut raw)?;
    let position = conn.append(&raw)?;
    println!("{position}");
    Ok(())
}
