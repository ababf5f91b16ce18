//! The collapse engine.
//!
//! Collapses all objects under one key prefix into a single output object:
//! stream each source into a bounded spool, classify its encoding, append it
//! to a local accumulation file in fixed-size chunks, verify the total
//! against the store-reported sizes, upload, verify the uploaded size, and
//! only then delete the sources.
//!
//! ORDERING INVARIANT: sources are deleted only after the uploaded object's
//! size has been confirmed equal to the local file's size. No failure path
//! deletes an input before the output is verified.
//!
//! The accumulation file is transient and removed on every exit path,
//! success or failure.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::TryStreamExt;
use serde::Serialize;
use tracing::Instrument;

use bale_core::observability::collapse_span;
use bale_core::spool::SpoolBuffer;
use bale_core::storage::{DurabilityClass, StorageBackend};

use crate::encoding::{self, EncodingClass};
use crate::error::{CollapseError, Result};

/// Default output-size ceiling: 2 GiB, matching common single-request upload
/// limits. Set `max_output_size` to 0 to disable the ceiling.
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Parameters of one collapse operation. Immutable for its duration.
#[derive(Debug, Clone)]
pub struct CollapseRequest {
    /// Key prefix selecting the source objects.
    pub input_prefix: String,
    /// Local path of the accumulation file.
    pub output_path: PathBuf,
    /// Destination key for the collapsed object.
    pub output_key: String,
    /// Maximum allowed output size in bytes; 0 means unbounded.
    pub max_output_size: u64,
    /// Durability class for the collapsed object.
    pub durability: DurabilityClass,
}

impl CollapseRequest {
    /// Creates a request with the default 2 GiB ceiling and standard
    /// durability.
    pub fn new(
        input_prefix: impl Into<String>,
        output_path: impl Into<PathBuf>,
        output_key: impl Into<String>,
    ) -> Self {
        Self {
            input_prefix: input_prefix.into(),
            output_path: output_path.into(),
            output_key: output_key.into(),
            max_output_size: DEFAULT_MAX_OUTPUT_BYTES,
            durability: DurabilityClass::Standard,
        }
    }

    /// Sets the output-size ceiling (0 disables it).
    #[must_use]
    pub fn with_max_output_size(mut self, max_output_size: u64) -> Self {
        self.max_output_size = max_output_size;
        self
    }

    /// Sets the durability class for the collapsed object.
    #[must_use]
    pub fn with_durability(mut self, durability: DurabilityClass) -> Self {
        self.durability = durability;
        self
    }
}

/// Result of a collapse operation.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CollapseOutcome {
    /// Total bytes written to the collapsed object.
    pub bytes_written: u64,
    /// Number of source objects collapsed (and subsequently deleted).
    pub objects_collapsed: usize,
}

/// Local accumulation file, removed when dropped.
///
/// All exit paths of a collapse operation run through this guard, so the
/// file can never outlive the operation.
struct Accumulation {
    path: PathBuf,
    file: File,
}

impl Accumulation {
    fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            file: File::create(path)?,
        })
    }
}

impl Drop for Accumulation {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove local accumulation file"
            );
        }
    }
}

/// Collapses all objects under a prefix into one output object.
pub struct CollapseEngine {
    store: Arc<dyn StorageBackend>,
}

impl CollapseEngine {
    /// Creates a new engine over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self { store }
    }

    /// Runs one collapse operation.
    ///
    /// Zero matching sources is a clean no-op: no local file is created,
    /// nothing is uploaded, and a zero outcome is returned. Re-running after
    /// a successful collapse is therefore also a no-op (the sources are
    /// gone).
    ///
    /// # Errors
    ///
    /// Returns [`CollapseError::MixedEncoding`] if sources disagree on
    /// compression, [`CollapseError::SizeCeilingExceeded`] if the output
    /// grows past a positive `max_output_size`,
    /// [`CollapseError::SizeMismatchLocal`] /
    /// [`CollapseError::SizeMismatchUpload`] on size-verification failures,
    /// and storage or I/O errors from the transfer itself. No source object
    /// is deleted on any error path; on upload-verification failure the
    /// uploaded object is left in place for inspection.
    pub async fn collapse(&self, request: &CollapseRequest) -> Result<CollapseOutcome> {
        let span = collapse_span("collapse", &request.input_prefix);
        self.collapse_inner(request).instrument(span).await
    }

    async fn collapse_inner(&self, request: &CollapseRequest) -> Result<CollapseOutcome> {
        let sources = self.store.list(&request.input_prefix).await?;
        if sources.is_empty() {
            tracing::info!("no objects match the prefix; nothing to collapse");
            return Ok(CollapseOutcome::default());
        }

        let expected_total: u64 = sources.iter().map(|m| m.size).sum();
        tracing::info!(
            objects = sources.len(),
            expected_bytes = expected_total,
            "downloading and concatenating sources"
        );

        let mut accumulation = Accumulation::create(&request.output_path)?;
        let mut expected_class: Option<EncodingClass> = None;
        let mut bytes_written = 0u64;

        for meta in &sources {
            let mut spool = SpoolBuffer::new();
            let mut stream = self.store.get(&meta.key).await?;
            while let Some(chunk) = stream.try_next().await? {
                spool.write_all(&chunk)?;
            }

            let class = encoding::classify(spool.magic(), Some(&meta.key));
            match expected_class {
                None => expected_class = Some(class),
                Some(expected) if expected != class => {
                    return Err(CollapseError::MixedEncoding {
                        key: meta.key.clone(),
                        expected,
                        found: class,
                    });
                }
                Some(_) => {}
            }

            bytes_written += spool.copy_to(&mut accumulation.file)?;

            if request.max_output_size > 0 && bytes_written > request.max_output_size {
                return Err(CollapseError::SizeCeilingExceeded {
                    limit: request.max_output_size,
                    actual: bytes_written,
                });
            }
        }

        // Transfer errors should already have interrupted the loop; this
        // guards against silent truncation in the streaming path.
        if bytes_written != expected_total {
            return Err(CollapseError::SizeMismatchLocal {
                expected: expected_total,
                actual: bytes_written,
            });
        }

        tracing::info!(
            bytes = bytes_written,
            output_key = %request.output_key,
            durability = %request.durability,
            "uploading collapsed file"
        );
        let progress = |transferred: u64, total: u64| {
            let percent = if total == 0 {
                100
            } else {
                transferred * 100 / total
            };
            tracing::info!(transferred, total, percent, "transfer progress");
        };
        let reported = self
            .store
            .put(
                &request.output_key,
                &request.output_path,
                request.durability,
                Some(&progress),
            )
            .await?
            .unwrap_or(0);

        if reported != bytes_written {
            return Err(CollapseError::SizeMismatchUpload {
                key: request.output_key.clone(),
                local: bytes_written,
                reported,
            });
        }

        tracing::info!(objects = sources.len(), "removing source objects");
        for meta in &sources {
            self.store.delete(&meta.key).await?;
        }

        // The accumulation guard removes the local file on return.
        Ok(CollapseOutcome {
            bytes_written,
            objects_collapsed: sources.len(),
        })
    }
}
