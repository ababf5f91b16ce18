//! Bucket-range driver.
//!
//! Expands a `[start, end]` time range at a granularity into one collapse
//! operation per bucket and runs them strictly sequentially. A failure in
//! any bucket aborts the whole range: partial completion is visible as
//! "some buckets collapsed, some not", and re-running the range redoes the
//! completed buckets as safe no-ops and finishes the rest.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use tracing::Instrument;

use bale_core::observability::range_span;
use bale_core::storage::{DurabilityClass, StorageBackend};

use crate::bucket::{self, Granularity};
use crate::engine::{CollapseEngine, CollapseOutcome, CollapseRequest, DEFAULT_MAX_OUTPUT_BYTES};
use crate::error::{CollapseError, Result};

/// Supplies "now" for default-range computation; injectable so tests can
/// pin it.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Parameters of one range run.
#[derive(Debug, Clone)]
pub struct RangeRequest {
    /// Store directory holding the source objects.
    pub input_dir: String,
    /// Store directory receiving the collapsed objects.
    pub output_dir: String,
    /// Local directory for the per-bucket accumulation files.
    pub local_dir: PathBuf,
    /// Inclusive `[start, end]` range; `None` selects the whole of
    /// yesterday (00:00:00 through 23:59:59 of the previous calendar day).
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Bucket granularity; must be one of the steppable granularities.
    pub granularity: Granularity,
    /// Per-bucket output-size ceiling; 0 means unbounded.
    pub max_output_size: u64,
    /// Durability class for the collapsed objects.
    pub durability: DurabilityClass,
}

impl RangeRequest {
    /// Creates a request collapsing yesterday's daily bucket with default
    /// limits.
    pub fn new(
        input_dir: impl Into<String>,
        output_dir: impl Into<String>,
        local_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            local_dir: local_dir.into(),
            range: None,
            granularity: Granularity::Day,
            max_output_size: DEFAULT_MAX_OUTPUT_BYTES,
            durability: DurabilityClass::Standard,
        }
    }

    /// Sets an explicit inclusive range.
    #[must_use]
    pub fn with_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.range = Some((start, end));
        self
    }

    /// Sets the bucket granularity.
    #[must_use]
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Sets the per-bucket output-size ceiling (0 disables it).
    #[must_use]
    pub fn with_max_output_size(mut self, max_output_size: u64) -> Self {
        self.max_output_size = max_output_size;
        self
    }

    /// Sets the durability class for the collapsed objects.
    #[must_use]
    pub fn with_durability(mut self, durability: DurabilityClass) -> Self {
        self.durability = durability;
        self
    }
}

/// Aggregate result of a range run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RangeOutcome {
    /// Number of buckets processed (including empty no-op buckets).
    pub buckets_processed: usize,
    /// Total bytes written across all collapsed objects.
    pub bytes_written: u64,
    /// Total source objects collapsed across all buckets.
    pub objects_collapsed: usize,
}

impl RangeOutcome {
    fn absorb(&mut self, bucket: CollapseOutcome) {
        self.buckets_processed += 1;
        self.bytes_written += bucket.bytes_written;
        self.objects_collapsed += bucket.objects_collapsed;
    }
}

/// Runs the collapse engine over every bucket in a time range.
pub struct RangeDriver {
    engine: CollapseEngine,
    clock: Arc<dyn Clock>,
}

impl RangeDriver {
    /// Creates a driver over the given store with the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Creates a driver with an injected clock.
    #[must_use]
    pub fn with_clock(store: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: CollapseEngine::new(store),
            clock,
        }
    }

    /// Collapses every bucket in the requested range, sequentially.
    ///
    /// # Errors
    ///
    /// Returns [`CollapseError::InvalidGranularity`] before any I/O if the
    /// granularity cannot step a range, [`CollapseError::InvalidRange`] if
    /// start is after end, and otherwise propagates the first bucket
    /// failure, aborting the remainder of the range.
    pub async fn collapse_range(&self, request: &RangeRequest) -> Result<RangeOutcome> {
        let span = range_span(
            "collapse_range",
            request.granularity.as_str(),
            &request.input_dir,
        );
        self.collapse_range_inner(request).instrument(span).await
    }

    async fn collapse_range_inner(&self, request: &RangeRequest) -> Result<RangeOutcome> {
        let step =
            request
                .granularity
                .step()
                .ok_or_else(|| CollapseError::InvalidGranularity {
                    token: request.granularity.as_str().to_string(),
                })?;

        let (start, end) = match request.range {
            Some((start, end)) => {
                if start > end {
                    return Err(CollapseError::InvalidRange {
                        message: format!("start {start} is after end {end}"),
                    });
                }
                (start, end)
            }
            None => yesterday(self.clock.as_ref()),
        };

        tracing::info!(start = %start, end = %end, "collapsing range");

        let mut outcome = RangeOutcome::default();
        let mut current = start;
        while current <= end {
            let stamp = request.granularity.format_prefix(current);
            let collapse_request = CollapseRequest::new(
                bucket::input_prefix(&request.input_dir, &stamp),
                request.local_dir.join(bucket::local_file_name(&stamp)),
                bucket::output_key(&request.output_dir, &stamp),
            )
            .with_max_output_size(request.max_output_size)
            .with_durability(request.durability);

            tracing::info!(prefix = %collapse_request.input_prefix, "collapsing bucket");
            let bucket_outcome = self.engine.collapse(&collapse_request).await?;
            outcome.absorb(bucket_outcome);

            current += step;
        }

        tracing::info!(
            buckets = outcome.buckets_processed,
            bytes = outcome.bytes_written,
            objects = outcome.objects_collapsed,
            "range complete"
        );
        Ok(outcome)
    }
}

/// The whole of the previous calendar day, per the given clock.
fn yesterday(clock: &dyn Clock) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = clock.now().date_naive().and_time(NaiveTime::MIN).and_utc();
    (midnight - Duration::days(1), midnight - Duration::seconds(1))
}
