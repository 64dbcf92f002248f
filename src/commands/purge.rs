//! `purge`: rewrite referenced blocks only into a fresh archive.

use tracing::info;

use crate::archive::Archive;
use crate::config::{Config, Until};
use crate::error::ArchiveError;

pub struct PurgeOutcome {
    pub bytes: Vec<u8>,
}

/// Build a new archive containing only the fragments reachable at
/// `config.until`, renumbered from 1, dated `date`. Never mutates the
/// source archive bytes.
pub fn purge(config: &Config, parts: Vec<Vec<u8>>, date: u64) -> Result<PurgeOutcome, ArchiveError> {
    let archive = Archive::open(parts, &Until::Latest)?;
    let purged = archive.purge(config, &config.until, date)?;
    info!(bytes = purged.bytes().len(), "purge complete");
    Ok(PurgeOutcome { bytes: purged.bytes().to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::add::add;
    use crate::commands::list::list;

    #[test]
    fn purge_preserves_the_latest_surviving_files() {
        let first = add(&Config::default(), Vec::new(), &[("a".to_string(), b"one".to_vec())], 1).unwrap();
        let second = add(&Config::default(), vec![first.bytes], &[("b".to_string(), b"two".to_vec())], 2).unwrap();

        let purged = purge(&Config::default(), vec![second.bytes], 3).unwrap();
        let entries = list(&Config::default(), vec![purged.bytes]).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
