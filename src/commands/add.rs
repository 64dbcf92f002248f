//! `add`: append a new version to an archive.
//!
//! Filesystem traversal and attribute collection are out of scope —
//! the caller hands in already-read `(name, bytes)` pairs, treating
//! the command surface as the one boundary the core actually owns.

use tracing::info;

use crate::archive::Archive;
use crate::config::{Config, Until};
use crate::error::ArchiveError;

/// Result of a successful `add`: the new archive bytes (ready to be
/// written back to disk by the caller) and the version number just
/// created.
pub struct AddOutcome {
    pub bytes: Vec<u8>,
    pub version: u32,
}

/// Open `parts`, append `files` as a new version dated `date`
/// (`YYYYMMDDHHMMSS` UTC), and return the updated archive bytes.
/// `parts` is empty to create a brand-new archive.
pub fn add(config: &Config, parts: Vec<Vec<u8>>, files: &[(String, Vec<u8>)], date: u64) -> Result<AddOutcome, ArchiveError> {
    let mut archive = Archive::open(parts, &Until::Latest)?;
    let version = archive.add(config, files, date)?;
    info!(version, files = files.len(), "add complete");
    Ok(AddOutcome { bytes: archive.bytes().to_vec(), version })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_to_empty_archive_creates_version_one() {
        let outcome = add(&Config::default(), Vec::new(), &[("a.txt".to_string(), b"hi".to_vec())], 1).unwrap();
        assert_eq!(outcome.version, 1);
        assert!(!outcome.bytes.is_empty());
    }

    #[test]
    fn second_add_creates_version_two_on_top_of_the_first() {
        let first = add(&Config::default(), Vec::new(), &[("a.txt".to_string(), b"hi".to_vec())], 1).unwrap();
        let second = add(&Config::default(), vec![first.bytes], &[("b.txt".to_string(), b"bye".to_vec())], 2).unwrap();
        assert_eq!(second.version, 2);
    }
}
