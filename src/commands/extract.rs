//! `extract`: materialise files at a chosen version.

use tracing::{info, warn};

use crate::archive::Archive;
use crate::config::Config;
use crate::error::ArchiveError;

/// One file's extraction result: the name plus either its bytes or the
/// error that made it unrecoverable. A bad fragment fails only the
/// files that depend on it; the pass continues for the rest.
pub struct ExtractOutcome {
    pub files: Vec<(String, Result<Vec<u8>, ArchiveError>)>,
}

/// Reconstruct every surviving file at `config.until` from `parts`.
/// Never returns an error for a per-file failure — those are carried
/// in [`ExtractOutcome::files`]; this function only errors if the
/// archive itself cannot be opened (a format error).
pub fn extract(config: &Config, parts: Vec<Vec<u8>>) -> Result<ExtractOutcome, ArchiveError> {
    let archive = Archive::open(parts, &config.until)?;
    let files = archive.extract(&config.until);
    let failed = files.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        warn!(failed, "extract completed with failures");
    }
    info!(total = files.len(), failed, "extract complete");
    Ok(ExtractOutcome { files })
}
