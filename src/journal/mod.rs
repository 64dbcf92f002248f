//! The journal layout: the c/d/h/i block taxonomy that turns a
//! sequence of independently decodable [`crate::block::Block`]s into a
//! versioned file tree, plus the journal-specific filename and comment
//! encodings the reader/writer use to recognize them.

pub mod reader;
pub mod version;
pub mod writer;

use crate::error::FormatError;

pub use reader::JournalReader;
pub use version::{Dtv, FileEntry, Version};
pub use writer::JournalWriter;

/// One of the four journal block kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Transaction header.
    Commit,
    /// Raw fragment data.
    Data,
    /// Fragment hash table entries.
    Hashes,
    /// File index deltas.
    Index,
}

impl BlockKind {
    fn as_char(self) -> u8 {
        match self {
            BlockKind::Commit => b'c',
            BlockKind::Data => b'd',
            BlockKind::Hashes => b'h',
            BlockKind::Index => b'i',
        }
    }

    fn from_char(c: u8) -> Option<Self> {
        match c {
            b'c' => Some(BlockKind::Commit),
            b'd' => Some(BlockKind::Data),
            b'h' => Some(BlockKind::Hashes),
            b'i' => Some(BlockKind::Index),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        match self {
            BlockKind::Commit => 0,
            BlockKind::Data => 1,
            BlockKind::Hashes => 2,
            BlockKind::Index => 3,
        }
    }
}

/// The five-byte suffix that marks a journal comment: a space, then
/// the literal `jDC`, then `0x01`.
pub const JOURNAL_COMMENT_SUFFIX: &[u8; 5] = b" jDC\x01";

/// One file-index delta record, as carried by an `i` block: a path
/// plus the [`version::Dtv`] fields flattened alongside it. `date == 0`
/// is a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub name: String,
    pub date: u64,
    pub attr: u32,
    pub fragments: Vec<u32>,
}

/// Build the 28-byte journal filename `jDC<14-digit date><kind><10-digit seq>`.
pub fn journal_filename(date: u64, kind: BlockKind, seq: u64) -> String {
    format!("jDC{date:014}{}{seq:010}", kind.as_char() as char)
}

/// Parse a journal filename back into its date, kind, and sequence
/// number. Any deviation from the fixed 28-byte shape is a format
/// error.
pub fn parse_journal_filename(name: &str) -> Result<(u64, BlockKind, u64), FormatError> {
    let bytes = name.as_bytes();
    let bad = || FormatError::BadJournalFilename(name.to_string());
    if bytes.len() != 28 || &bytes[0..3] != b"jDC" {
        return Err(bad());
    }
    let date_str = name.get(3..17).ok_or_else(bad)?;
    let date: u64 = date_str.parse().map_err(|_| bad())?;
    let kind = BlockKind::from_char(bytes[17]).ok_or_else(bad)?;
    let seq_str = name.get(18..28).ok_or_else(bad)?;
    let seq: u64 = seq_str.parse().map_err(|_| bad())?;
    Ok((date, kind, seq))
}
