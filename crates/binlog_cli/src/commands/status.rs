//! Status command implementation.

use binlog_core::{Connection, Position};
use serde::Serialize;

/// Log status.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Log directory.
    pub path: String,
    /// Number of live entries.
    pub entries: u64,
    /// Lowest live position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_position: Option<Position>,
    /// Highest live position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_position: Option<Position>,
    /// Registered readers.
    pub readers: Vec<ReaderStatus>,
}

/// Backlog of one reader.
#[derive(Debug, Serialize)]
pub struct ReaderStatus {
    /// Reader name.
    pub name: String,
    /// Live entries the reader has not acknowledged.
    pub pending: u64,
}

/// Runs the status command.
pub fn run(conn: &Connection, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut readers = Vec::new();
    for name in conn.list_readers()? {
        let pending = conn.reader(Some(&name))?.pending()?;
        readers.push(ReaderStatus { name, pending });
    }

    let result = StatusResult {
        path: conn.path()?.display().to_string(),
        entries: conn.len()?,
        first_position: conn.first_position()?,
        last_position: conn.last_position()?,
        readers,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &StatusResult) {
    println!("Log: {}", result.path);
    println!("Entries: {}", result.entries);
    if let (Some(first), Some(last)) = (result.first_position, result.last_position) {
        println!("Positions: {first}..={last}");
    }

    if result.readers.is_empty() {
        println!("No readers registered");
        return;
    }
    println!();
    println!("{:<32} {:>12}", "Reader", "Pending");
    println!("{}", "-".repeat(45));
    for reader in &result.readers {
        println!("{:<32} {:>12}", reader.name, reader.pending);
    }
}
