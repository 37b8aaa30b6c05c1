//! Readers command implementation.

use binlog_core::Connection;

/// Prints every registered reader, one per line.
pub fn list(conn: &Connection) -> Result<(), Box<dyn std::error::Error>> {
    for name in conn.list_readers()? {
        println!("{name}");
    }
    Ok(())
}

/// Registers `name`.
pub fn register(conn: &Connection, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    if conn.register_reader(name)? {
        println!("Registered reader {name}");
    } else {
        println!("Reader {name} already registered");
    }
    Ok(())
}

/// Unregisters `name` and its children.
pub fn unregister(conn: &Connection, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    conn.unregister_reader(name)?;
    println!("Unregistered reader {name}");
    Ok(())
}

/// Copies `source` to `destination`.
pub fn clone(
    conn: &Connection,
    source: &str,
    destination: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    conn.clone_reader(source, destination)?;
    println!("Cloned reader {source} into {destination}");
    Ok(())
}
