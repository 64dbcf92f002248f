//! Errors
//!
//! Error kinds are grouped by failure model:
//! format errors (malformed on-disk structure), integrity errors (hash or
//! range-coder verification failures), resource errors (I/O and
//! allocation), and semantic errors (a valid request that simply selects
//! nothing). `ArchiveError` combines all four into one enum so call sites
//! that only care about success/failure can use `?` uniformly, while
//! callers that need to distinguish "this archive is corrupt" from "this
//! disk is full" can match on the grouping.

use std::{io, string};

use thiserror::Error;

/// Errors generated by this crate.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("std io error: {0}")]
    StdIo(#[from] io::Error),

    #[error("string error: {0:?}")]
    StringUtf8(#[from] string::FromUtf8Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Not a failure: the caller's selection (version, date, filename)
    /// matched nothing. Command implementations treat this as "0 files
    /// selected", not as an error to propagate.
    #[error("no files selected")]
    NoneSelected,
}

/// Malformed on-disk structure. Fatal to the operation that hit it.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("block header declares size {declared} but sections summed to {actual}")]
    HeaderSizeMismatch { declared: usize, actual: usize },

    #[error("unknown predictor component type {0}")]
    UnknownComponent(u8),

    #[error("component {index} references component {target}, which is not strictly earlier")]
    BadComponentReference { index: usize, target: usize },

    #[error("missing segment terminator")]
    MissingSegmentTerminator,

    #[error("missing block terminator")]
    MissingBlockTerminator,

    #[error("invalid journal block filename: {0:?}")]
    BadJournalFilename(String),

    #[error("unsupported post-processor selector byte {0:#04x}")]
    BadPostprocessorSelector(u8),

    #[error("unsupported block format level {0}")]
    UnsupportedLevel(u8),

    #[error("segment size disagreement: stored {stored}, actual {actual}")]
    SegmentSizeMismatch { stored: u64, actual: u64 },
}

/// Verification failures: hash mismatches, range-coder drift, VM faults.
#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("sha1 mismatch for fragment {fragment_id}: expected {expected:?}, got {actual:?}")]
    FragmentHashMismatch {
        fragment_id: u32,
        expected: [u8; 20],
        actual: [u8; 20],
    },

    #[error("sha1 mismatch for segment: expected {expected:?}, got {actual:?}")]
    SegmentHashMismatch {
        expected: [u8; 20],
        actual: [u8; 20],
    },

    #[error("arithmetic coder interval left [low, high] at byte offset {0}")]
    CoderOutOfRange(u64),

    #[error("ZPAQL jump to {target} out of bounds for program of length {len}")]
    VmJumpOutOfBounds { target: usize, len: usize },

    #[error("ZPAQL program executed an ERROR instruction")]
    VmError,

    #[error("data block marked bad after a prior verification failure")]
    BlockMarkedBad,
}

/// Allocation and I/O failures, and password derivation failures.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("allocation failure: {0}")]
    Allocation(#[from] std::collections::TryReserveError),

    #[error("password required but not provided")]
    PasswordRequired,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

impl From<ArchiveError> for io::Error {
    fn from(value: ArchiveError) -> Self {
        use ArchiveError::*;
        match value {
            StdIo(io) => io,
            StringUtf8(e) => Self::new(io::ErrorKind::InvalidData, e),
            e @ Format(_) => Self::new(io::ErrorKind::InvalidData, e),
            e @ Integrity(_) => Self::new(io::ErrorKind::InvalidData, e),
            e @ Resource(_) => Self::new(io::ErrorKind::Other, e),
            e @ NoneSelected => Self::new(io::ErrorKind::NotFound, e),
        }
    }
}
