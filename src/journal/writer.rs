//! Journal block payload encoding: turns commit offsets, fragment-hash
//! runs, and file-index deltas into the raw
//! bytes a `c`/`h`/`i` block's single segment carries, and hands out
//! the journal filenames that mark a block as one of these kinds.

use crate::fragment::Fragment;

use super::{journal_filename, BlockKind, IndexRecord};

/// Assigns sequence numbers and filenames for the journal blocks of one
/// writer session. One `JournalWriter` is used for the whole lifetime
/// of an `add` operation, so sequence numbers keep climbing across
/// versions within the same run.
#[derive(Debug, Default)]
pub struct JournalWriter {
    next_seq: [u64; 4],
}

impl JournalWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self, kind: BlockKind) -> u64 {
        let seq = self.next_seq[kind.slot()];
        self.next_seq[kind.slot()] += 1;
        seq
    }

    /// Build a `c` block's filename and payload: an 8-byte little-endian
    /// compressed-size hint, recorded verbatim into the reconstructed
    /// [`super::Version`] but never consulted to decide whether a
    /// version is complete (that only depends on whether a later `c`
    /// block, or EOF, follows it). This writer always passes 0; nothing
    /// downstream needs the true end offset at write time, since the
    /// replay loop derives it from block boundaries instead.
    pub fn commit_block(&mut self, date: u64, end_offset: u64) -> (String, Vec<u8>) {
        (journal_filename(date, BlockKind::Commit, self.next(BlockKind::Commit)), end_offset.to_le_bytes().to_vec())
    }

    /// Build a `d` block's filename for a run of raw fragment bytes.
    /// `payload` is the caller-assembled fragment bytes, with the
    /// per-fragment size table footer already appended unless running
    /// in fragile mode.
    pub fn data_block(&mut self, date: u64, payload: Vec<u8>) -> (String, Vec<u8>) {
        (journal_filename(date, BlockKind::Data, self.next(BlockKind::Data)), payload)
    }

    /// Build an `h` block's filename and payload for one contiguous run
    /// of newly registered fragments: `count[4] (sha1[20] usize[4])*`.
    pub fn hash_block(&mut self, date: u64, fragments: &[Fragment]) -> (String, Vec<u8>) {
        let mut payload = Vec::with_capacity(4 + fragments.len() * 24);
        payload.extend_from_slice(&(fragments.len() as u32).to_le_bytes());
        for frag in fragments {
            payload.extend_from_slice(&frag.sha1);
            payload.extend_from_slice(&(frag.usize as u32).to_le_bytes());
        }
        (journal_filename(date, BlockKind::Hashes, self.next(BlockKind::Hashes)), payload)
    }

    /// Build an `i` block's filename and payload for a run of file
    /// index deltas: `(date[8] name\0 attr_len[4] attr[attr_len]
    /// frag_count[4] frag_id[4]*)*`.
    pub fn index_block(&mut self, date: u64, records: &[IndexRecord]) -> (String, Vec<u8>) {
        let mut payload = Vec::new();
        for record in records {
            payload.extend_from_slice(&record.date.to_le_bytes());
            payload.extend_from_slice(record.name.as_bytes());
            payload.push(0);
            let attr_bytes = record.attr.to_le_bytes();
            payload.extend_from_slice(&(attr_bytes.len() as u32).to_le_bytes());
            payload.extend_from_slice(&attr_bytes);
            payload.extend_from_slice(&(record.fragments.len() as u32).to_le_bytes());
            for &id in &record.fragments {
                payload.extend_from_slice(&id.to_le_bytes());
            }
        }
        (journal_filename(date, BlockKind::Index, self.next(BlockKind::Index)), payload)
    }

    /// Append the per-fragment size-table footer to a `d` block's
    /// payload (omitted entirely when `Config::fragile` is set): the
    /// uncompressed size of each fragment packed into this block,
    /// followed by the fragment count.
    pub fn append_size_table(payload: &mut Vec<u8>, sizes: &[u32]) {
        for &size in sizes {
            payload.extend_from_slice(&size.to_le_bytes());
        }
        payload.extend_from_slice(&(sizes.len() as u32).to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_blocks_get_climbing_sequence_numbers() {
        let mut w = JournalWriter::new();
        let (n0, p0) = w.commit_block(20260101000000, 0);
        let (n1, _) = w.commit_block(20260101000000, 1234);
        assert_ne!(n0, n1);
        assert_eq!(p0, 0u64.to_le_bytes());
    }

    #[test]
    fn hash_block_payload_is_count_prefixed() {
        let mut w = JournalWriter::new();
        let frags = vec![
            Fragment { sha1: [1; 20], usize: 10, csize: 4 },
            Fragment { sha1: [2; 20], usize: 20, csize: 8 },
        ];
        let (_, payload) = w.hash_block(20260101000000, &frags);
        assert_eq!(u32::from_le_bytes(payload[0..4].try_into().unwrap()), 2);
        assert_eq!(payload.len(), 4 + 2 * 24);
    }

    #[test]
    fn index_block_round_trips_a_deletion_record() {
        let mut w = JournalWriter::new();
        let records = vec![IndexRecord { name: "gone.txt".into(), date: 0, attr: 0, fragments: vec![] }];
        let (_, payload) = w.index_block(20260101000000, &records);
        assert_eq!(u64::from_le_bytes(payload[0..8].try_into().unwrap()), 0);
    }
}
