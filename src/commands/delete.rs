//! `delete`: append a version that logically removes named files.
//!
//! As with `add`, filesystem traversal (deciding which names are
//! "gone" by diffing a directory) is the caller's job — this command
//! takes the names to delete as an explicit list.

use tracing::info;

use crate::archive::Archive;
use crate::config::Until;
use crate::error::ArchiveError;

/// Result of a successful `delete`: the new archive bytes and the
/// version number just created.
pub struct DeleteOutcome {
    pub bytes: Vec<u8>,
    pub version: u32,
}

/// Open `parts`, append a version dated `date` that marks every name
/// in `names` deleted, and return the updated archive bytes.
pub fn delete(parts: Vec<Vec<u8>>, names: &[String], date: u64) -> Result<DeleteOutcome, ArchiveError> {
    let mut archive = Archive::open(parts, &Until::Latest)?;
    let version = archive.delete(names, date)?;
    info!(version, names = names.len(), "delete complete");
    Ok(DeleteOutcome { bytes: archive.bytes().to_vec(), version })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::add::add;
    use crate::commands::list::list;
    use crate::config::Config;

    #[test]
    fn deleted_file_no_longer_lists_at_the_latest_version() {
        let added = add(&Config::default(), Vec::new(), &[("a.txt".to_string(), b"hi".to_vec())], 1).unwrap();
        let deleted = delete(vec![added.bytes], &["a.txt".to_string()], 2).unwrap();
        assert_eq!(deleted.version, 2);

        let entries = list(&Config::default(), vec![deleted.bytes]).unwrap();
        assert!(entries.is_empty());
    }
}
