//! `list`: enumerate versions and files.

use crate::archive::Archive;
use crate::config::Config;
use crate::error::ArchiveError;

/// One reported file: its path, the most recent uncompressed size
/// known at `config.until` (or `-1` if unrecorded), and the version it
/// was last touched in.
pub struct ListEntry {
    pub name: String,
    pub size: i64,
    pub version: u32,
}

/// Enumerate every file surviving at `config.until`, sorted by name.
/// Version bounds/date bounds that select nothing are not an error —
/// they simply yield an empty list.
pub fn list(config: &Config, parts: Vec<Vec<u8>>) -> Result<Vec<ListEntry>, ArchiveError> {
    let archive = Archive::open(parts, &config.until)?;
    let bound = match config.until {
        crate::config::Until::Latest => u32::MAX,
        crate::config::Until::Version(v) => v,
        crate::config::Until::Date(_) => u32::MAX,
    };
    let mut entries: Vec<ListEntry> = archive
        .files()
        .values()
        .filter_map(|entry| {
            entry.state_at(bound).map(|dtv| ListEntry { name: entry.name.clone(), size: dtv.size, version: dtv.version })
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
