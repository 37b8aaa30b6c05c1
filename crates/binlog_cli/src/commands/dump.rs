//! Dump command implementation.

use binlog_core::{Connection, Entry, Fields, Position, Value};
use serde::Serialize;

/// Entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Position in the log.
    pub position: Position,
    /// Stored fields.
    pub fields: Fields,
}

/// Runs the dump command.
///
/// Without `reader` every live entry is printed; with one, only the
/// entries it has not acknowledged.
pub fn run(
    conn: &Connection,
    reader: Option<&str>,
    limit: Option<usize>,
    reverse: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = conn.reader(reader)?;
    let entries = if reverse {
        reader.iter_rev()?
    } else {
        reader.iter()?
    };

    let mut records = Vec::new();
    for entry in entries.take(limit.unwrap_or(usize::MAX)) {
        records.push(info(entry?)?);
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

fn info(entry: Entry) -> Result<EntryInfo, Box<dyn std::error::Error>> {
    let position = entry.position().ok_or("entry without a position")?;
    Ok(EntryInfo {
        position,
        fields: entry.into_fields(),
    })
}

fn print_text_output(records: &[EntryInfo]) {
    for record in records {
        let fields: Vec<String> = record
            .fields
            .iter()
            .map(|(name, value)| format!("{name}={}", render(value)))
            .collect();
        println!("{:>10}  {}", record.position, fields.join(" "));
    }
    println!("\nTotal: {} entries", records.len());
}

fn render(value: &Value) -> String {
    match value {
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => format!("{text:?}"),
            Err(_) => format!("<{} bytes>", bytes.len()),
        },
        Value::Text(text) => format!("{text:?}"),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.type_name().to_string()),
    }
}
