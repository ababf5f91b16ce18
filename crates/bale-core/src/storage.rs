//! Storage backend abstraction for object storage (S3, GCS, local).
//!
//! This module defines the storage contract the collapse engine depends on:
//! prefix enumeration with authoritative sizes, streamed full-content reads,
//! local-file uploads that report the stored size, and idempotent deletes.
//!
//! ## Listing Order
//!
//! The engine concatenates objects in the order the listing yields them, so
//! a backend must return a stable order for a given prefix. Both in-tree
//! backends return keys in lexicographic order; custom backends must provide
//! an equivalent guarantee.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::buffered::BufWriter;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::spool::COPY_CHUNK_BYTES;

/// Storage tier selected at write time.
///
/// Reduced durability trades redundancy for cost (e.g. S3 Reduced Redundancy
/// Storage). Backends without a storage-class knob treat it as advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityClass {
    /// Standard redundancy (the store's default).
    #[default]
    Standard,
    /// Reduced redundancy, where the backend supports it.
    Reduced,
}

impl DurabilityClass {
    /// Returns the string name for this durability class.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Reduced => "reduced",
        }
    }
}

impl std::fmt::Display for DurabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata about a stored object, as reported by the store.
///
/// The size is authoritative: the engine verifies transferred byte counts
/// against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// A streamed full-content read of one object.
///
/// Chunk boundaries are backend-defined and carry no meaning.
pub type ByteStream = futures::stream::BoxStream<'static, Result<Bytes>>;

/// Coarse upload progress callback: `(bytes_transferred, bytes_total)`.
///
/// Backends invoke this at a handful of points during a transfer; callers
/// must not rely on any particular cadence.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Storage backend trait for object storage.
///
/// All storage backends (S3/GCS via [`ObjectStoreBackend`], memory) implement
/// this trait. The contract is designed for cloud object storage semantics.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Lists objects whose key starts with `prefix`, with their sizes.
    ///
    /// Returns an empty vec if nothing matches. The prefix is a raw string
    /// match and may end mid-filename. Order must be stable for a given
    /// prefix (see module docs).
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Opens a streamed read of the object's full content.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get(&self, key: &str) -> Result<ByteStream>;

    /// Uploads a local file to `key`, honoring the requested durability.
    ///
    /// Must not silently truncate or resize the content. Returns the stored
    /// size as reported by the store, or `None` if the backend cannot report
    /// one (callers verifying sizes treat `None` as 0).
    async fn put(
        &self,
        key: &str,
        source: &Path,
        durability: DurabilityClass,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Option<u64>>;

    /// Deletes an object.
    ///
    /// Succeeds even if the object doesn't exist (idempotent).
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory storage backend for tests and examples.
///
/// Thread-safe via `RwLock`. Not suitable for production. Records the
/// durability class of the most recent put so tests can assert it was
/// propagated.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    last_durability: Arc<RwLock<Option<DurabilityClass>>>,
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object directly, bypassing the upload path.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects
            .write()
            .expect("lock")
            .insert(key.into(), data.into());
    }

    /// Returns the stored bytes for a key, if present.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.read().expect("lock").get(key).cloned()
    }

    /// Returns the durability class of the most recent put, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn last_durability(&self) -> Option<DurabilityClass> {
        *self.last_durability.read().expect("lock")
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let mut metas: Vec<ObjectMeta> = objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(key, data)| ObjectMeta {
                key: key.clone(),
                size: data.len() as u64,
            })
            .collect();
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metas)
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        let data = {
            let objects = self.objects.read().map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?;
            objects
                .get(key)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("object not found: {key}")))?
        };

        Ok(futures::stream::once(async move { Ok(data) }).boxed())
    }

    async fn put(
        &self,
        key: &str,
        source: &Path,
        durability: DurabilityClass,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Option<u64>> {
        let data = std::fs::read(source).map_err(|e| {
            Error::storage_with_source(format!("failed to read local file {}", source.display()), e)
        })?;
        let total = data.len() as u64;

        if let Some(report) = progress {
            report(0, total);
            report(total, total);
        }

        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .insert(key.to_string(), Bytes::from(data));
        *self.last_durability.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })? = Some(durability);

        Ok(Some(total))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .remove(key);
        Ok(())
    }
}

/// Storage backend over the [`object_store`] crate (S3, GCS, local, memory).
///
/// Keys are resolved relative to the base path parsed from the storage URL.
/// Two contract gaps in `object_store` are bridged here:
///
/// - its `list` matches on path-part boundaries, so partial-filename prefixes
///   are handled by listing the parent directory and filtering client-side;
/// - its put result carries no size, so the stored size is read back with a
///   `head` request after the upload.
///
/// Uploads stream through [`object_store::buffered::BufWriter`] in fixed-size
/// chunks, keeping peak memory independent of the file size.
pub struct ObjectStoreBackend {
    inner: Arc<dyn object_store::ObjectStore>,
    base: object_store::path::Path,
}

impl ObjectStoreBackend {
    /// Creates a backend from a storage URL such as `s3://bucket/prefix`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the URL does not parse, or a storage
    /// error if the scheme is not supported by the enabled `object_store`
    /// features.
    pub fn from_url(storage_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(storage_url).map_err(|e| {
            Error::InvalidInput(format!("invalid storage url '{storage_url}': {e}"))
        })?;
        let (store, base) = object_store::parse_url(&parsed).map_err(|e| {
            Error::storage_with_source(format!("unsupported storage url '{storage_url}'"), e)
        })?;
        Ok(Self {
            inner: Arc::from(store),
            base,
        })
    }

    /// Wraps an existing `object_store` instance with no base path.
    #[must_use]
    pub fn new(inner: Arc<dyn object_store::ObjectStore>) -> Self {
        Self {
            inner,
            base: object_store::path::Path::default(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        let base = self.base.as_ref();
        if base.is_empty() {
            key.to_string()
        } else {
            format!("{base}/{key}")
        }
    }

    fn location(&self, key: &str) -> object_store::path::Path {
        object_store::path::Path::from(self.full_key(key))
    }

    fn relative_key(&self, location: &object_store::path::Path) -> String {
        let raw = location.as_ref();
        let base = self.base.as_ref();
        if base.is_empty() {
            raw.to_string()
        } else {
            raw.strip_prefix(base)
                .map_or(raw, |rest| rest.trim_start_matches('/'))
                .to_string()
        }
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let full = self.full_key(prefix);

        // The prefix may end mid-filename; list the enclosing directory and
        // filter on the raw key string.
        let parent = full
            .rsplit_once('/')
            .map(|(dir, _)| object_store::path::Path::from(dir));

        let mut stream = self.inner.list(parent.as_ref());
        let mut metas = Vec::new();
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| Error::storage_with_source(format!("failed to list '{prefix}'"), e))?
        {
            if meta.location.as_ref().starts_with(&full) {
                metas.push(ObjectMeta {
                    key: self.relative_key(&meta.location),
                    size: meta.size as u64,
                });
            }
        }
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metas)
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        let location = self.location(key);
        let result = self.inner.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                Error::NotFound(format!("object not found: {key}"))
            }
            other => Error::storage_with_source(format!("failed to read {key}"), other),
        })?;

        let key = key.to_string();
        Ok(result
            .into_stream()
            .map_err(move |e| Error::storage(format!("read of {key} interrupted: {e}")))
            .boxed())
    }

    async fn put(
        &self,
        key: &str,
        source: &Path,
        durability: DurabilityClass,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Option<u64>> {
        if durability == DurabilityClass::Reduced {
            tracing::debug!(
                key = %key,
                "reduced durability requested; backend exposes no storage class, using default"
            );
        }

        let total = std::fs::metadata(source)
            .map_err(|e| {
                Error::storage_with_source(
                    format!("failed to stat local file {}", source.display()),
                    e,
                )
            })?
            .len();

        if let Some(report) = progress {
            report(0, total);
        }

        // Stream the file through a buffered writer in fixed-size chunks, so
        // peak memory stays at the writer's capacity rather than the file
        // size.
        let mut file = std::fs::File::open(source).map_err(|e| {
            Error::storage_with_source(format!("failed to open local file {}", source.display()), e)
        })?;
        let location = self.location(key);
        let mut writer = BufWriter::new(Arc::clone(&self.inner), location.clone());
        let mut buf = vec![0u8; COPY_CHUNK_BYTES];
        loop {
            let n = file.read(&mut buf).map_err(|e| {
                Error::storage_with_source(
                    format!("failed to read local file {}", source.display()),
                    e,
                )
            })?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buf[..n])
                .await
                .map_err(|e| Error::storage_with_source(format!("failed to upload {key}"), e))?;
        }
        writer.shutdown().await.map_err(|e| {
            Error::storage_with_source(format!("failed to finish upload of {key}"), e)
        })?;

        if let Some(report) = progress {
            report(total, total);
        }

        let meta = self.inner.head(&location).await.map_err(|e| {
            Error::storage_with_source(format!("failed to stat uploaded object {key}"), e)
        })?;
        Ok(Some(meta.size as u64))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let location = self.location(key);
        match self.inner.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(Error::storage_with_source(
                format!("failed to delete {key}"),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.try_next().await.expect("stream chunk") {
            out.extend_from_slice(&chunk);
        }
        out
    }

    fn local_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content).expect("write");
        file.flush().expect("flush");
        file
    }

    #[tokio::test]
    async fn memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        let file = local_file(b"hello world");

        let stored = backend
            .put("logs/a.log", file.path(), DurabilityClass::Standard, None)
            .await
            .expect("put should succeed");
        assert_eq!(stored, Some(11));

        let stream = backend.get("logs/a.log").await.expect("get should succeed");
        assert_eq!(collect(stream).await, b"hello world");
    }

    #[tokio::test]
    async fn memory_backend_get_missing_is_not_found() {
        let backend = MemoryBackend::new();
        let result = backend.get("missing").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn list_returns_sorted_matches_with_sizes() {
        let backend = MemoryBackend::new();
        backend.insert("logs/2024-01-01-b", "bb");
        backend.insert("logs/2024-01-01-a", "a");
        backend.insert("logs/2024-01-02-a", "ccc");

        let metas = backend.list("logs/2024-01-01-").await.expect("list");
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].key, "logs/2024-01-01-a");
        assert_eq!(metas[0].size, 1);
        assert_eq!(metas[1].key, "logs/2024-01-01-b");
        assert_eq!(metas[1].size, 2);
    }

    #[tokio::test]
    async fn list_with_no_matches_is_empty() {
        let backend = MemoryBackend::new();
        backend.insert("other/key", "x");
        let metas = backend.list("logs/").await.expect("list");
        assert!(metas.is_empty());
    }

    #[tokio::test]
    async fn put_records_durability_and_reports_progress() {
        let backend = MemoryBackend::new();
        let file = local_file(b"data");

        let calls = Arc::new(RwLock::new(Vec::new()));
        let calls_clone = Arc::clone(&calls);
        let report = move |transferred: u64, total: u64| {
            calls_clone.write().expect("lock").push((transferred, total));
        };

        backend
            .put("k", file.path(), DurabilityClass::Reduced, Some(&report))
            .await
            .expect("put");

        assert_eq!(backend.last_durability(), Some(DurabilityClass::Reduced));
        let calls = calls.read().expect("lock");
        assert!(!calls.is_empty(), "progress must be reported");
        assert_eq!(calls.last(), Some(&(4, 4)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.insert("k", "v");

        backend.delete("k").await.expect("first delete");
        backend.delete("k").await.expect("second delete");
        assert!(backend.object("k").is_none());
    }

    #[tokio::test]
    async fn object_store_backend_handles_partial_filename_prefix() {
        let inner = Arc::new(object_store::memory::InMemory::new());
        let backend = ObjectStoreBackend::new(inner);

        let file_a = local_file(b"aa");
        let file_b = local_file(b"bbb");
        backend
            .put(
                "logs/2024-01-01-x",
                file_a.path(),
                DurabilityClass::Standard,
                None,
            )
            .await
            .expect("put a");
        backend
            .put(
                "logs/2024-01-02-y",
                file_b.path(),
                DurabilityClass::Standard,
                None,
            )
            .await
            .expect("put b");

        let metas = backend.list("logs/2024-01-01-").await.expect("list");
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].key, "logs/2024-01-01-x");
        assert_eq!(metas[0].size, 2);
    }

    #[tokio::test]
    async fn object_store_backend_streams_uploads_larger_than_one_chunk() {
        let inner = Arc::new(object_store::memory::InMemory::new());
        let backend = ObjectStoreBackend::new(inner);

        let payload = vec![0x5au8; COPY_CHUNK_BYTES * 2 + 17];
        let file = local_file(&payload);
        let stored = backend
            .put("out/big", file.path(), DurabilityClass::Standard, None)
            .await
            .expect("put");
        assert_eq!(stored, Some(payload.len() as u64));

        let stream = backend.get("out/big").await.expect("get");
        assert_eq!(collect(stream).await, payload);
    }

    #[tokio::test]
    async fn object_store_backend_reports_stored_size() {
        let inner = Arc::new(object_store::memory::InMemory::new());
        let backend = ObjectStoreBackend::new(inner);

        let file = local_file(b"payload");
        let stored = backend
            .put("out/merged", file.path(), DurabilityClass::Standard, None)
            .await
            .expect("put");
        assert_eq!(stored, Some(7));

        let stream = backend.get("out/merged").await.expect("get");
        assert_eq!(collect(stream).await, b"payload");
    }
}
