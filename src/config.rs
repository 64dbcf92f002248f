//! Explicit configuration, threaded through commands instead of living as
//! process globals.

use zeroize::Zeroizing;

/// Verbosity requested by the caller. Distinct from `tracing`'s own level
/// filter: this controls what `commands::*` choose to print/return as
/// structured results, not what gets logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// A version/date bound used to reconstruct a historical view of the
/// archive. `None` means "latest".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Until {
    #[default]
    Latest,
    Version(u32),
    Date(u64),
}

/// Everything the original carries as process globals or CLI-parsed
/// ambient state, collected into one explicit, `Clone`-able record.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads used by the compress/write scheduler and
    /// by parallel extraction. `0` means "use the available parallelism".
    pub threads: usize,
    /// log2 of the fragment granularity. Cut points are biased toward
    /// `64 * 2^fragment_log` bytes, forced at `8128 * 2^fragment_log`.
    pub fragment_log: u8,
    /// Data blocks target `(1 << (20 + block_log)) - 4096` bytes before
    /// a new block is opened.
    pub block_log: u8,
    /// Selects the predictor-bank topology used for new data. Reserved
    /// for future method presets; the current writer always uses the
    /// single built-in topology described in `archive.rs`'s
    /// `journal_block_header`.
    pub method: String,
    /// If set, the archive file is transparently encrypted/decrypted with
    /// AES-256-CTR keyed by scrypt-stretching this password. Zeroized on
    /// drop.
    pub password: Option<Zeroizing<String>>,
    /// Bounds `extract`/`list`/`test` to a historical view.
    pub until: Until,
    pub verbosity: Verbosity,
    /// If true, data blocks omit the per-fragment size-table footer
    /// (smaller, but unrecoverable if the `h` blocks are lost).
    pub fragile: bool,
    /// Ring-buffer capacity for the compress/write scheduler.
    pub queue_depth: usize,
    /// L1-distance threshold over two order-1 byte tables above which
    /// the fragmenter starts a new data block rather than appending to
    /// one that looks unlikely to share redundancy with the new
    /// fragment. A tuning knob, not an invariant.
    pub block_split_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 0,
            fragment_log: 6,
            block_log: 0,
            method: "1".to_string(),
            password: None,
            until: Until::Latest,
            verbosity: Verbosity::Normal,
            fragile: false,
            queue_depth: 16,
            block_split_threshold: 1 << 16,
        }
    }
}

impl Config {
    /// Resolve `threads == 0` to the host's available parallelism so the
    /// scheduler always operates with a concrete worker count.
    pub fn worker_count(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.threads
        }
    }

    /// Target size of a data block in bytes, `(1 << (20 + b)) - 4096`.
    pub fn target_block_size(&self) -> usize {
        (1usize << (20 + self.block_log as u32)).saturating_sub(4096)
    }
}
