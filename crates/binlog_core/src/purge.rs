//! Reclaiming entries every reader has acknowledged.

use crate::error::{CoreError, CoreResult};
use crate::iterseek::{And, IterSeek, SegmentWalk};
use crate::store::Stores;
use crate::types::{Direction, Position};
use tracing::{debug, info};

/// Outcome of a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Entries deleted.
    pub removed: u64,
    /// Acknowledged positions whose entry was already gone when its chunk ran.
    pub not_found: u64,
}

/// Deletes the entries in the intersection of every committed registry.
///
/// The common positions are walked together with the live entries and
/// deleted `chunk_size` at a time, one write transaction per chunk.
pub(crate) fn purge(stores: &Stores, chunk_size: usize) -> CoreResult<PurgeStats> {
    if chunk_size == 0 {
        return Err(CoreError::invalid_value("purge chunk size must be positive"));
    }

    let readers = stores.readers.list()?;
    let Some((first, rest)) = readers.split_first() else {
        debug!("no readers registered, nothing to purge");
        return Ok(PurgeStats::default());
    };

    let mut common = stores.readers.load(first)?;
    for name in rest {
        if common.is_empty() {
            break;
        }
        common = common.intersection(&stores.readers.load(name)?);
    }
    if common.is_empty() {
        return Ok(PurgeStats::default());
    }

    let mut stream = And::pair(
        stores.data.cursor(Direction::Forward),
        SegmentWalk::new(common, Direction::Forward),
    )?;

    let mut stats = PurgeStats::default();
    let mut chunk: Vec<Position> = Vec::with_capacity(chunk_size);
    loop {
        chunk.clear();
        while chunk.len() < chunk_size {
            match stream.next_position()? {
                Some(position) => chunk.push(position),
                None => break,
            }
        }
        if chunk.is_empty() {
            break;
        }

        let (removed, not_found) = stores.data.remove_many(&chunk)?;
        stats.removed += removed;
        stats.not_found += not_found;
        debug!(chunk = chunk.len(), removed, not_found, "purge chunk deleted");

        if chunk.len() < chunk_size {
            break;
        }
    }

    info!(removed = stats.removed, not_found = stats.not_found, "purge finished");
    Ok(stats)
}
