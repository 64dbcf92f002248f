//! The journal's in-memory data model: what a reconstructed view of
//! the archive's file tree looks like, independent of how it was
//! serialized into c/d/h/i blocks.

/// One version of one file. `date == 0` marks a deletion at this
/// version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dtv {
    /// UTC `YYYYMMDDHHMMSS`, or 0 for "deleted at this version".
    pub date: u64,
    /// Uncompressed size in bytes, or `-1` if unknown.
    pub size: i64,
    /// Platform attribute bits, or 0 if none recorded.
    pub attr: u32,
    pub version: u32,
    /// Ordered fragment IDs making up this file's content. Empty for a
    /// deletion record.
    pub fragments: Vec<u32>,
}

impl Dtv {
    pub fn is_deletion(&self) -> bool {
        self.date == 0
    }
}

/// One archive path plus its ordered history of [`Dtv`] records.
#[derive(Debug, Clone, Default)]
pub struct FileEntry {
    pub name: String,
    pub versions: Vec<Dtv>,
}

impl FileEntry {
    /// The most recent `Dtv` at or before `at_version`, if the file
    /// existed (and was not deleted) then.
    pub fn state_at(&self, at_version: u32) -> Option<&Dtv> {
        self.versions
            .iter()
            .rev()
            .find(|dtv| dtv.version <= at_version)
            .filter(|dtv| !dtv.is_deletion())
    }
}

/// One archive version's summary. Versions are numbered from 1;
/// version 0 is a sentinel meaning "before anything was added".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version {
    pub number: u32,
    pub date: u64,
    pub files_updated: u32,
    pub files_deleted: u32,
    pub first_fragment: u32,
    /// Archive byte offset where this version's `c` block begins.
    pub offset: u64,
    pub compressed_size: u64,
}
