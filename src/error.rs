//! Error types for the xref resolver and object index.
//!
//! This module defines all error types that can occur while discovering,
//! repairing, and indexing the object locations of a PDF/FDF file.

/// Result type alias for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while resolving a PDF/FDF cross-reference index.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// IO error from the underlying random-access source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error (e.g. while interpreting a name or keyword).
    #[error("UTF-8 decoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Neither `%PDF-` nor `%FDF-` found within the header lookahead window.
    #[error("Malformed header: expected '%PDF-' or '%FDF-', found '{0}'")]
    MalformedHeader(String),

    /// PDF version in the header is not recognised.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// The resolved trailer does not have a `/Size`, or has no trailer at all.
    #[error("Missing trailer: {0}")]
    MissingTrailer(String),

    /// The resolved trailer has no `/Root` entry (or it does not resolve).
    #[error("Missing /Root entry in trailer")]
    MissingRoot,

    /// The cross-reference table/stream is corrupt and unrecoverable even
    /// after brute-force reconstruction.
    #[error("Corrupt xref at offset {offset}: {reason}")]
    CorruptXref {
        /// Reason the xref could not be recovered.
        reason: String,
        /// Byte offset at which the corruption was detected.
        offset: u64,
    },

    /// A `/Prev` chain revisited an offset already seen during the walk.
    #[error("/Prev loop detected at offset {offset}")]
    LoopDetected {
        /// Byte offset that was visited twice.
        offset: u64,
    },

    /// An object stream is missing `/N` or `/First`.
    #[error("Invalid object stream: {0}")]
    InvalidObjectStream(String),

    /// A recognised-but-unsupported construct (xref-stream filter other
    /// than FlateDecode, unrecognised xref entry type code, etc).
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Low-level tokenization failure: unexpected bytes at a given location.
    #[error("Malformed token at {location}: {detail}")]
    Malformed {
        /// Human-readable description of where parsing was happening.
        location: String,
        /// Description of the unexpected input.
        detail: String,
    },

    /// Failed to parse an object at a specific byte offset.
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred.
        offset: usize,
        /// Reason for parse failure.
        reason: String,
    },

    /// Referenced object not found in the resolved index.
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has the wrong PDF object type for the operation attempted.
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type.
        expected: String,
        /// Actual object type found.
        found: String,
    },

    /// Unexpected end of input while a read was expected to succeed.
    #[error("End of source reached unexpectedly")]
    UnexpectedEof,

    /// Generic malformed-PDF condition not covered by a more specific variant.
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error (filter pipeline / predictor failure).
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter for this crate's narrow decoder set.
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected while resolving an indirect reference.
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded while resolving nested references.
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}
