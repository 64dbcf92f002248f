//! Content-defined fragmentation and the dedup fragment table.
//!
//! Incoming file bytes are split at content-defined cut points rather
//! than fixed offsets, so a small edit in the middle of a large file
//! only changes the fragments touching the edit. Each fragment is keyed
//! by its SHA-1 digest in a dedup index; a fragment already present
//! anywhere in the archive is referenced by id instead of being stored
//! again.

use rustc_hash::FxHashMap;
use sha1::{Digest, Sha1};
use tracing::instrument;

/// One entry of the fragment table. Index `0` is never assigned to a
/// real fragment; fragment ids are 1-based and 0 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub sha1: [u8; 20],
    /// Uncompressed size in bytes.
    pub usize: i64,
    /// Compressed size within its owning data block, or `-1` if unknown
    /// (e.g. the fragment was looked up by hash before its owning block
    /// was finalized).
    pub csize: i64,
}

/// The append-only table mapping fragment id -> [`Fragment`], plus the
/// SHA-1 dedup index used to detect a fragment the archive has already
/// stored.
#[derive(Debug, Default)]
pub struct FragmentTable {
    entries: Vec<Fragment>,
    by_hash: FxHashMap<[u8; 20], u32>,
}

impl FragmentTable {
    pub fn new() -> Self {
        // Index 0 is reserved; push a dummy placeholder so real ids
        // start at 1 and line up with `entries[id as usize]`.
        Self {
            entries: vec![Fragment { sha1: [0; 20], usize: 0, csize: 0 }],
            by_hash: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u32) -> Option<&Fragment> {
        self.entries.get(id as usize)
    }

    /// Look up a fragment by content hash, without registering anything.
    pub fn find(&self, sha1: &[u8; 20]) -> Option<u32> {
        self.by_hash.get(sha1).copied()
    }

    /// Register a brand-new fragment and return its id. Caller must have
    /// already checked [`FragmentTable::find`] to avoid duplicates.
    pub fn insert(&mut self, fragment: Fragment) -> u32 {
        let id = self.entries.len() as u32;
        self.by_hash.insert(fragment.sha1, id);
        self.entries.push(fragment);
        id
    }

    /// Fill in the compressed size of an already-registered fragment,
    /// once its owning data block has been finalized.
    pub fn set_csize(&mut self, id: u32, csize: i64) {
        if let Some(entry) = self.entries.get_mut(id as usize) {
            entry.csize = csize;
        }
    }
}

/// The outcome of fragmenting one file's worth of bytes: every
/// fragment is resolved to an id, either reused from a prior add or
/// newly inserted and queued for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// This fragment's bytes already exist somewhere in the archive.
    Duplicate(u32),
    /// This fragment is new; it was inserted with `csize == -1` and
    /// still needs to flow through the compress/write scheduler.
    New(u32),
}

/// Splits byte streams into content-defined fragments and resolves each
/// one against a [`FragmentTable`], in the order callers hand it bytes.
///
/// `fragment_log` controls the target granularity: fragments are
/// biased toward `64 * 2^fragment_log` bytes and forced closed at
/// `8128 * 2^fragment_log` bytes.
pub struct Fragmenter<'a> {
    table: &'a mut FragmentTable,
    fragment_log: u8,
}

impl<'a> Fragmenter<'a> {
    pub fn new(table: &'a mut FragmentTable, fragment_log: u8) -> Self {
        Self { table, fragment_log }
    }

    /// Split `data` at content-defined cut points and resolve each
    /// resulting fragment against the dedup index, inserting new
    /// entries as needed. Returns one [`Resolved`] per fragment, and the
    /// raw bytes of the fragments that were newly inserted (in the same
    /// relative order), which the caller still owes a data block.
    #[instrument(skip_all, fields(len = data.len()))]
    pub fn fragment(&mut self, data: &[u8]) -> (Vec<Resolved>, Vec<Vec<u8>>) {
        let mut resolved = Vec::new();
        let mut pending = Vec::new();
        let mut start = 0usize;
        for &end in &cut_points(data, self.fragment_log) {
            let chunk = &data[start..end];
            let hash = sha1_of(chunk);
            let outcome = match self.table.find(&hash) {
                Some(id) => Resolved::Duplicate(id),
                None => {
                    let id = self.table.insert(Fragment { sha1: hash, usize: chunk.len() as i64, csize: -1 });
                    pending.push(chunk.to_vec());
                    Resolved::New(id)
                }
            };
            resolved.push(outcome);
            start = end;
        }
        (resolved, pending)
    }
}

/// Compute content-defined cut offsets within `data` (each offset marks
/// the end of a fragment, exclusive). Uses a rolling hash fed by two
/// order-1 hit/miss predictor tables: on each byte, `h` is
/// multiplied by one of two large odd constants depending on whether
/// the byte matched what last followed the previous byte, and a cut
/// point is taken whenever `h` drops below a size-dependent threshold
/// and the fragment has reached its minimum size. The final offset is
/// always `data.len()`, even if the last fragment is short.
pub fn cut_points(data: &[u8], fragment_log: u8) -> Vec<usize> {
    const BIAS: u32 = 1 << 22;
    const HIT_MULTIPLIER: u32 = 314_159_265;
    const MISS_MULTIPLIER: u32 = 271_828_182;

    let threshold = BIAS >> fragment_log;
    let min_size = 64usize << fragment_log;
    let max_size = 8128usize << fragment_log;

    let mut order1 = [0u8; 256];
    let mut prev = 0u8;
    let mut h = 0u32;
    let mut fragment_start = 0usize;
    let mut cuts = Vec::new();

    for (i, &c) in data.iter().enumerate() {
        let predicted = order1[prev as usize];
        h = h
            .wrapping_add(c as u32)
            .wrapping_add(1)
            .wrapping_mul(if predicted == c { HIT_MULTIPLIER } else { MISS_MULTIPLIER });
        order1[prev as usize] = c;
        prev = c;

        let fragment_len = i + 1 - fragment_start;
        let at_eof = i + 1 == data.len();
        if (h < threshold && fragment_len >= min_size) || fragment_len >= max_size || at_eof {
            cuts.push(i + 1);
            fragment_start = i + 1;
        }
    }
    cuts
}

pub fn sha1_of(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// One group of fragments destined to share a single `d` block, as
/// decided by [`pack_into_blocks`].
pub struct PackedBlock {
    pub ids: Vec<u32>,
    pub bytes: Vec<Vec<u8>>,
}

fn order1_of(data: &[u8]) -> [u32; 256] {
    let mut table = [0u32; 256];
    for &b in data {
        table[b as usize] += 1;
    }
    table
}

fn order1_distance(a: &[u32; 256], b: &[u32; 256]) -> u64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| (x as i64 - y as i64).unsigned_abs()).sum()
}

/// Pack newly registered fragments into one or more data blocks. A new
/// block begins when appending the next fragment would exceed
/// `target_size`, or when the current block is at least half full and
/// a heuristic predicts poor mutual information between it and the
/// next fragment: the L1 distance between the current block's
/// accumulated order-1 byte table and the next fragment's own order-1
/// table exceeds `split_threshold`. Fragment order is preserved, so the
/// ids within and across groups stay strictly ascending.
pub fn pack_into_blocks(ids: &[u32], bytes: &[Vec<u8>], target_size: usize, split_threshold: u32) -> Vec<PackedBlock> {
    let mut blocks = Vec::new();
    let mut cur_ids: Vec<u32> = Vec::new();
    let mut cur_bytes: Vec<Vec<u8>> = Vec::new();
    let mut cur_size = 0usize;
    let mut cur_order1 = [0u32; 256];

    for (&id, data) in ids.iter().zip(bytes.iter()) {
        let frag_order1 = order1_of(data);
        let would_exceed = !cur_ids.is_empty() && cur_size + data.len() > target_size;
        let largely_full = cur_size * 2 >= target_size;
        let poor_fit = !cur_ids.is_empty() && largely_full && order1_distance(&cur_order1, &frag_order1) > split_threshold as u64;
        if would_exceed || poor_fit {
            blocks.push(PackedBlock { ids: std::mem::take(&mut cur_ids), bytes: std::mem::take(&mut cur_bytes) });
            cur_size = 0;
            cur_order1 = [0u32; 256];
        }
        cur_size += data.len();
        for (slot, &count) in cur_order1.iter_mut().zip(frag_order1.iter()) {
            *slot += count;
        }
        cur_ids.push(id);
        cur_bytes.push(data.clone());
    }
    if !cur_ids.is_empty() {
        blocks.push(PackedBlock { ids: cur_ids, bytes: cur_bytes });
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_points_always_cover_the_whole_input_and_end_at_eof() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let cuts = cut_points(&data, 0);
        assert_eq!(*cuts.last().unwrap(), data.len());
        assert!(cuts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn empty_input_produces_no_cut_points() {
        assert!(cut_points(&[], 0).is_empty());
    }

    #[test]
    fn identical_repeated_content_yields_stable_fragment_boundaries() {
        // A small edit mid-stream should not reshuffle fragment
        // boundaries far away from the edit (content-defined, not
        // offset-defined, chunking).
        let mut data = vec![0u8; 20_000];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i * 37 % 253) as u8;
        }
        let before = cut_points(&data, 0);

        let mut edited = data.clone();
        edited.insert(100, 0xAB);

        let after = cut_points(&edited, 0);
        let tail_before: Vec<usize> = before.iter().rev().take(3).copied().collect();
        let tail_after: Vec<usize> = after.iter().rev().take(3).map(|&c| c.saturating_sub(1)).collect();
        assert_eq!(tail_before, tail_after);
    }

    #[test]
    fn fragmenter_deduplicates_identical_chunks() {
        let mut table = FragmentTable::new();
        let mut fragmenter = Fragmenter::new(&mut table, 0);
        let chunk = vec![7u8; 200];
        let mut data = chunk.clone();
        data.extend_from_slice(&chunk);
        // force a cut between the two identical halves
        let (resolved, pending) = fragmenter.fragment(&data);
        assert!(resolved.len() >= 1);
        // whatever the fragmentation, total new fragments <= total fragments
        assert!(pending.len() <= resolved.len());
    }

    #[test]
    fn reinserting_the_same_bytes_resolves_as_a_duplicate() {
        let mut table = FragmentTable::new();
        let hash = sha1_of(b"same content twice");
        let id = table.insert(Fragment { sha1: hash, usize: 18, csize: 4 });
        assert_eq!(table.find(&hash), Some(id));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn fragment_table_ids_start_at_one() {
        let mut table = FragmentTable::new();
        let id = table.insert(Fragment { sha1: [1; 20], usize: 1, csize: 1 });
        assert_eq!(id, 1);
        assert!(table.get(0).is_some()); // reserved slot
        assert_eq!(table.get(1).unwrap().sha1, [1; 20]);
    }

    #[test]
    fn pack_into_blocks_keeps_small_input_in_one_block() {
        let ids = vec![1u32, 2, 3];
        let bytes = vec![vec![1u8; 10], vec![2u8; 10], vec![3u8; 10]];
        let packed = pack_into_blocks(&ids, &bytes, 1 << 20, 1 << 16);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].ids, ids);
    }

    #[test]
    fn pack_into_blocks_splits_once_target_size_is_exceeded() {
        let ids = vec![1u32, 2, 3];
        let bytes = vec![vec![0u8; 60], vec![0u8; 60], vec![0u8; 60]];
        let packed = pack_into_blocks(&ids, &bytes, 100, 1 << 16);
        assert!(packed.len() >= 2);
        let flattened: Vec<u32> = packed.iter().flat_map(|b| b.ids.clone()).collect();
        assert_eq!(flattened, ids);
    }

    #[test]
    fn pack_into_blocks_never_drops_or_reorders_a_fragment() {
        let ids: Vec<u32> = (1..=20).collect();
        let bytes: Vec<Vec<u8>> = ids.iter().map(|&i| vec![i as u8; 50]).collect();
        let packed = pack_into_blocks(&ids, &bytes, 300, 10);
        let flattened: Vec<u32> = packed.iter().flat_map(|b| b.ids.clone()).collect();
        assert_eq!(flattened, ids);
    }
}
