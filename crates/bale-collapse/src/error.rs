//! Error types for the collapse engine and range driver.

use crate::encoding::EncodingClass;

/// The result type used throughout bale-collapse.
pub type Result<T> = std::result::Result<T, CollapseError>;

/// Errors that abort a collapse operation or a range run.
///
/// Every variant is fatal to the current operation; none of them leaves
/// source objects deleted without a verified output (deletion is the last
/// step of the pipeline).
#[derive(Debug, thiserror::Error)]
pub enum CollapseError {
    /// Objects under one prefix resolved to different encoding classes.
    #[error("mixed encodings under prefix: {key} is {found}, expected {expected}")]
    MixedEncoding {
        /// The key whose class differed from the operation's expected class.
        key: String,
        /// The class fixed by the first object.
        expected: EncodingClass,
        /// The class of the offending object.
        found: EncodingClass,
    },

    /// The accumulation file grew past the configured ceiling.
    #[error("output size {actual} B exceeds the configured maximum of {limit} B")]
    SizeCeilingExceeded {
        /// Configured maximum output size in bytes.
        limit: u64,
        /// Accumulated size at the point of the breach.
        actual: u64,
    },

    /// The concatenated byte count disagrees with the sum of reported source
    /// sizes; signals a streaming bug or store inconsistency.
    #[error("collapsed file is {actual} B but sources reported {expected} B in total")]
    SizeMismatchLocal {
        /// Sum of the sizes the store reported for the sources.
        expected: u64,
        /// Actual size of the local accumulation file.
        actual: u64,
    },

    /// The store reported a different size for the uploaded object than the
    /// local file holds. The uploaded object is left in place for inspection.
    #[error("uploaded {key} reported as {reported} B but local file is {local} B")]
    SizeMismatchUpload {
        /// Output key that was uploaded.
        key: String,
        /// Local accumulation file size.
        local: u64,
        /// Size the store reported (0 if it reported none).
        reported: u64,
    },

    /// An unrecognized granularity token, or one that cannot step a range.
    #[error("granularity '{token}' is not usable here")]
    InvalidGranularity {
        /// The offending token.
        token: String,
    },

    /// The requested time range is not well-ordered.
    #[error("invalid time range: {message}")]
    InvalidRange {
        /// Description of what made the range invalid.
        message: String,
    },

    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] bale_core::Error),

    /// A local file operation failed.
    #[error("local i/o error: {0}")]
    Io(#[from] std::io::Error),
}
