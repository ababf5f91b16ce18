//! Test storage implementation with operation tracing.
//!
//! Records all operations for test assertions and supports fault injection:
//! failing key prefixes, misreported listing sizes (to exercise local size
//! verification), and misreported upload sizes (to exercise delete-ordering
//! guarantees).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use bale_core::error::{Error, Result};
use bale_core::storage::{ByteStream, DurabilityClass, ObjectMeta, ProgressFn, StorageBackend};

/// Chunk size for streamed reads, small enough that multi-chunk delivery is
/// exercised by ordinary test fixtures.
const STREAM_CHUNK: usize = 4096;

/// Record of a storage operation for test assertions.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// List operation.
    List {
        /// Prefix that was listed.
        prefix: String,
    },
    /// Get operation.
    Get {
        /// Key that was read.
        key: String,
    },
    /// Put operation.
    Put {
        /// Key that was written.
        key: String,
        /// Size of data written.
        size: u64,
        /// Durability class requested.
        durability: DurabilityClass,
    },
    /// Delete operation.
    Delete {
        /// Key that was deleted.
        key: String,
    },
}

/// In-memory storage backend with operation tracing.
///
/// Records all operations for later assertion in tests. Listings are
/// returned in lexicographic key order, per the `StorageBackend` contract.
#[derive(Debug, Clone, Default)]
pub struct TracingMemoryBackend {
    data: Arc<Mutex<BTreeMap<String, Bytes>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_prefixes: Arc<Mutex<Vec<String>>>,
    listed_size_overrides: Arc<Mutex<HashMap<String, u64>>>,
    put_size_override: Arc<Mutex<Option<Option<u64>>>>,
    latency: Option<Duration>,
}

impl TracingMemoryBackend {
    /// Creates a new empty tracing storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage with simulated latency.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Seeds an object directly, without recording a Put operation.
    pub fn seed(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.data.lock().expect("lock").insert(key.into(), data.into());
    }

    /// Returns the stored bytes for a key, if present.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.data.lock().expect("lock").get(key).cloned()
    }

    /// Returns all stored keys in lexicographic order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.lock().expect("lock").keys().cloned().collect()
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Injects a failure for the given key prefix.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.fail_prefixes.lock().expect("lock").push(prefix.into());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.fail_prefixes.lock().expect("lock").clear();
    }

    /// Makes `list` report `size` for `key` instead of the true size.
    ///
    /// Simulates store metadata inconsistency; exercises local size
    /// verification.
    pub fn misreport_listed_size(&self, key: impl Into<String>, size: u64) {
        self.listed_size_overrides
            .lock()
            .expect("lock")
            .insert(key.into(), size);
    }

    /// Makes every subsequent `put` report `reported` as the stored size.
    ///
    /// `Some(None)` simulates a store that reports no size at all. Exercises
    /// upload verification and delete ordering.
    pub fn misreport_put_size(&self, reported: Option<u64>) {
        *self.put_size_override.lock().expect("lock") = Some(reported);
    }

    /// Number of recorded Delete operations.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Delete { .. }))
            .count()
    }

    /// Number of recorded Put operations.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Put { .. }))
            .count()
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, key: &str) -> Result<()> {
        let fail_prefixes = self.fail_prefixes.lock().expect("lock");
        if fail_prefixes.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(Error::Internal {
                message: format!("injected failure for key: {key}"),
            });
        }
        Ok(())
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl StorageBackend for TracingMemoryBackend {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.maybe_delay().await;
        self.check_failure(prefix)?;
        self.record(StoreOp::List {
            prefix: prefix.to_string(),
        });

        let overrides = self.listed_size_overrides.lock().expect("lock");
        let data = self.data.lock().expect("lock");
        Ok(data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(key, bytes)| ObjectMeta {
                key: key.clone(),
                size: overrides
                    .get(key)
                    .copied()
                    .unwrap_or(bytes.len() as u64),
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        self.maybe_delay().await;
        self.check_failure(key)?;
        self.record(StoreOp::Get {
            key: key.to_string(),
        });

        let data = self
            .data
            .lock()
            .expect("lock")
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object not found: {key}")))?;

        // Deliver in small chunks so callers see multi-chunk streams.
        let chunks: Vec<Result<Bytes>> = (0..data.len())
            .step_by(STREAM_CHUNK)
            .map(|start| Ok(data.slice(start..(start + STREAM_CHUNK).min(data.len()))))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn put(
        &self,
        key: &str,
        source: &Path,
        durability: DurabilityClass,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Option<u64>> {
        self.maybe_delay().await;
        self.check_failure(key)?;

        let data = std::fs::read(source).map_err(|e| {
            Error::storage_with_source(format!("failed to read local file {}", source.display()), e)
        })?;
        let total = data.len() as u64;

        self.record(StoreOp::Put {
            key: key.to_string(),
            size: total,
            durability,
        });

        if let Some(report) = progress {
            report(0, total);
            report(total, total);
        }

        self.data
            .lock()
            .expect("lock")
            .insert(key.to_string(), Bytes::from(data));

        let reported = self
            .put_size_override
            .lock()
            .expect("lock")
            .unwrap_or(Some(total));
        Ok(reported)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.maybe_delay().await;
        self.check_failure(key)?;
        self.record(StoreOp::Delete {
            key: key.to_string(),
        });

        self.data.lock().expect("lock").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn records_operations_in_order() {
        let storage = TracingMemoryBackend::new();
        storage.seed("logs/a", "hello");

        let _ = storage.list("logs/").await;
        let _ = storage.get("logs/a").await;
        let _ = storage.delete("logs/a").await;

        let ops = storage.operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], StoreOp::List { .. }));
        assert!(matches!(ops[1], StoreOp::Get { .. }));
        assert!(matches!(ops[2], StoreOp::Delete { .. }));
    }

    #[tokio::test]
    async fn failure_injection_by_prefix() {
        let storage = TracingMemoryBackend::new();
        storage.seed("fail/x", "data");
        storage.seed("ok/x", "data");
        storage.inject_failure("fail/");

        assert!(storage.get("fail/x").await.is_err());
        assert!(storage.get("ok/x").await.is_ok());

        storage.clear_failures();
        assert!(storage.get("fail/x").await.is_ok());
    }

    #[tokio::test]
    async fn latency_delays_every_operation() {
        let storage = TracingMemoryBackend::with_latency(Duration::from_millis(10));
        storage.seed("k", "v");

        let started = std::time::Instant::now();
        storage.get("k").await.expect("get");
        assert!(
            started.elapsed() >= Duration::from_millis(10),
            "simulated latency must be applied"
        );
    }

    #[tokio::test]
    async fn cleared_operations_start_a_fresh_log() {
        let storage = TracingMemoryBackend::new();
        storage.seed("k", "v");
        let _ = storage.get("k").await;
        let _ = storage.list("").await;

        storage.clear_operations();
        assert!(storage.operations().is_empty());

        let _ = storage.get("k").await;
        assert_eq!(storage.operations().len(), 1);
    }

    #[tokio::test]
    async fn listed_size_can_be_misreported() {
        let storage = TracingMemoryBackend::new();
        storage.seed("logs/a", "12345");
        storage.misreport_listed_size("logs/a", 99);

        let metas = storage.list("logs/").await.expect("list");
        assert_eq!(metas[0].size, 99);
    }

    #[tokio::test]
    async fn put_size_can_be_misreported() {
        let storage = TracingMemoryBackend::new();
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"data").expect("write");
        file.flush().expect("flush");

        storage.misreport_put_size(Some(1));
        let reported = storage
            .put("k", file.path(), DurabilityClass::Standard, None)
            .await
            .expect("put");
        assert_eq!(reported, Some(1));

        // Content is stored faithfully regardless of the reported size.
        assert_eq!(storage.object("k").expect("stored"), Bytes::from("data"));
    }

    #[tokio::test]
    async fn get_streams_in_chunks() {
        let storage = TracingMemoryBackend::new();
        let payload = vec![7u8; STREAM_CHUNK + 10];
        storage.seed("big", payload.clone());

        let stream = storage.get("big").await.expect("get");
        let chunks: Vec<Bytes> = stream.try_collect().await.expect("collect");
        assert!(chunks.len() > 1, "large objects stream in multiple chunks");
        assert_eq!(chunks.concat(), payload);
    }
}
