//! Custom error types for the mobi-reader crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
///
/// Errors are internal plumbing: [`Document`](crate::Document) swallows them
/// into its validity flag, but every parsing layer reports failure through
/// this enum so the cause is available to logs and lower-level callers.
#[derive(Debug, Error)]
pub enum MobiError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// A fixed-size structure ended before its declared size.
    #[error("Truncated {what}: need at least {needed} bytes")]
    Truncated { what: &'static str, needed: usize },

    /// The PDB container declares no records at all.
    #[error("PDB container has no records")]
    NoRecords,

    /// A record offset points before the end of the previous record.
    #[error("Record offset table regresses at index {index}: {offset:#x} < {previous:#x}")]
    OffsetRegression {
        index: usize,
        offset: u32,
        previous: u32,
    },

    /// The database type is not one this crate reads.
    #[error("Unsupported database type: {0:?}")]
    UnsupportedDatabaseType(String),

    /// The PalmDoc compression id names no known codec.
    #[error("Unsupported compression type: {0}")]
    UnsupportedCompression(u16),

    /// The HUFF/CDIC auxiliary records failed a structural check.
    #[error("Huffdic setup failed: {0}")]
    HuffdicSetup(&'static str),

    /// A Huffdic bitstream produced an impossible code or tripped a cap.
    #[error("Huffdic decode failed: {0}")]
    HuffdicDecode(&'static str),
}

/// A convenience `Result` type alias using the crate's [`MobiError`] type.
pub type Result<T> = std::result::Result<T, MobiError>;
