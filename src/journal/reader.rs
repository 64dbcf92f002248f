//! Journal reconstruction: decodes `c`/`h`/`i` block payloads and
//! folds them into a [`Version`] list, a
//! [`crate::fragment::FragmentTable`], and a map of [`FileEntry`]
//! histories, honoring a `-until` bound along the way.

use rustc_hash::FxHashMap;

use crate::config::Until;
use crate::error::FormatError;
use crate::fragment::{Fragment, FragmentTable};

use super::version::{Dtv, FileEntry, Version};
use super::IndexRecord;

/// Decode a `c` block payload: an 8-byte little-endian compressed-size
/// hint. Purely informational — [`JournalReader::apply_commit`] records
/// it on the [`super::Version`] it opens but a version's completeness
/// is decided by whether a later `c` block (or EOF) follows, not by
/// this value.
pub fn decode_commit(payload: &[u8]) -> Result<u64, FormatError> {
    let bytes: [u8; 8] = payload
        .get(0..8)
        .and_then(|s| s.try_into().ok())
        .ok_or(FormatError::HeaderSizeMismatch { declared: 8, actual: payload.len() })?;
    Ok(u64::from_le_bytes(bytes))
}

/// Decode an `h` block payload into its `(sha1, usize)` entries.
pub fn decode_hash_block(payload: &[u8]) -> Result<Vec<([u8; 20], u32)>, FormatError> {
    let err = || FormatError::HeaderSizeMismatch { declared: 0, actual: payload.len() };
    let count = u32::from_le_bytes(payload.get(0..4).ok_or_else(err)?.try_into().unwrap()) as usize;
    let mut pos = 4;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let sha1: [u8; 20] = payload.get(pos..pos + 20).ok_or_else(err)?.try_into().unwrap();
        let usize_bytes: [u8; 4] = payload.get(pos + 20..pos + 24).ok_or_else(err)?.try_into().unwrap();
        out.push((sha1, u32::from_le_bytes(usize_bytes)));
        pos += 24;
    }
    Ok(out)
}

/// Decode an `i` block payload into its file-index delta records.
pub fn decode_index_block(payload: &[u8]) -> Result<Vec<IndexRecord>, FormatError> {
    let err = || FormatError::HeaderSizeMismatch { declared: 0, actual: payload.len() };
    let mut pos = 0usize;
    let mut out = Vec::new();
    while pos < payload.len() {
        let date = u64::from_le_bytes(payload.get(pos..pos + 8).ok_or_else(err)?.try_into().unwrap());
        pos += 8;
        let name_end = payload[pos..].iter().position(|&b| b == 0).map(|i| pos + i).ok_or_else(err)?;
        let name = String::from_utf8(payload[pos..name_end].to_vec()).map_err(|_| err())?;
        pos = name_end + 1;
        let attr_len = u32::from_le_bytes(payload.get(pos..pos + 4).ok_or_else(err)?.try_into().unwrap()) as usize;
        pos += 4;
        let attr_bytes = payload.get(pos..pos + attr_len).ok_or_else(err)?;
        let mut attr = 0u32;
        for (i, &b) in attr_bytes.iter().take(4).enumerate() {
            attr |= (b as u32) << (8 * i);
        }
        pos += attr_len;
        let frag_count = u32::from_le_bytes(payload.get(pos..pos + 4).ok_or_else(err)?.try_into().unwrap()) as usize;
        pos += 4;
        let mut fragments = Vec::with_capacity(frag_count);
        for _ in 0..frag_count {
            let id = u32::from_le_bytes(payload.get(pos..pos + 4).ok_or_else(err)?.try_into().unwrap());
            fragments.push(id);
            pos += 4;
        }
        out.push(IndexRecord { name, date, attr, fragments });
    }
    Ok(out)
}

/// Walks a sequence of journal block payloads, accumulating the
/// reconstructed view of the archive: every [`Version`], the
/// [`FragmentTable`] and every [`FileEntry`]'s history.
#[derive(Debug)]
pub struct JournalReader {
    pub fragments: FragmentTable,
    pub versions: Vec<Version>,
    pub files: FxHashMap<String, FileEntry>,
    current: Option<Version>,
    stopped: bool,
}

impl JournalReader {
    pub fn new() -> Self {
        Self {
            fragments: FragmentTable::new(),
            versions: Vec::new(),
            files: FxHashMap::default(),
            current: None,
            stopped: false,
        }
    }

    /// True once a `-until` bound has caused the reader to stop
    /// applying further blocks. The caller should stop feeding blocks
    /// once this is set.
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    fn finish_current(&mut self) {
        if let Some(version) = self.current.take() {
            self.versions.push(version);
        }
    }

    /// Fold in a `c` block: closes out the previous in-progress version
    /// (if any) and opens a new one, unless `until` says to stop first.
    /// An unknown or future-dated `c` block truncates the view rather
    /// than erroring.
    pub fn apply_commit(&mut self, date: u64, offset: u64, end_offset: u64, until: &Until) {
        if self.stopped {
            return;
        }
        let would_be = self.versions.len() as u32 + 1;
        let out_of_bounds = match until {
            Until::Latest => false,
            Until::Version(v) => would_be > *v,
            Until::Date(d) => date > *d,
        };
        if out_of_bounds {
            self.stopped = true;
            return;
        }
        self.finish_current();
        self.current = Some(Version {
            number: would_be,
            date,
            files_updated: 0,
            files_deleted: 0,
            first_fragment: self.fragments.len() as u32 + 1,
            offset,
            compressed_size: end_offset,
        });
    }

    /// Fold in an `h` block: appends each entry to the fragment table
    /// in order, matching the IDs the writer assigned when it
    /// registered them.
    pub fn apply_hash_block(&mut self, entries: &[([u8; 20], u32)]) {
        if self.stopped {
            return;
        }
        for &(sha1, usize) in entries {
            if self.fragments.find(&sha1).is_none() {
                self.fragments.insert(Fragment { sha1, usize: usize as i64, csize: -1 });
            }
        }
    }

    /// Fold in an `i` block: appends a [`Dtv`] to each named file's
    /// history and updates the in-progress version's counters.
    pub fn apply_index_block(&mut self, records: &[IndexRecord]) {
        if self.stopped {
            return;
        }
        let version_number = self.current.as_ref().map(|v| v.number).unwrap_or(0);
        for record in records {
            let dtv = Dtv {
                date: record.date,
                size: -1,
                attr: record.attr,
                version: version_number,
                fragments: record.fragments.clone(),
            };
            let entry = self.files.entry(record.name.clone()).or_insert_with(|| FileEntry {
                name: record.name.clone(),
                versions: Vec::new(),
            });
            entry.versions.push(dtv.clone());
            if let Some(version) = self.current.as_mut() {
                if dtv.is_deletion() {
                    version.files_deleted += 1;
                } else {
                    version.files_updated += 1;
                }
            }
        }
    }

    /// Call once every block has been walked, to flush a final
    /// in-progress version into the version list.
    pub fn finish(&mut self) {
        self.finish_current();
    }
}

impl Default for JournalReader {
    fn default() -> Self {
        Self::new()
    }
}
