//! # bale-core
//!
//! Core abstractions for bale, the log-object collapsing toolkit.
//!
//! This crate provides the foundational pieces shared by the collapse engine
//! and its drivers:
//!
//! - **Storage Backends**: an async object-store contract with in-memory and
//!   `object_store`-backed implementations
//! - **Spooling Buffers**: bounded-memory transfer buffers that spill to disk
//! - **Error Types**: shared error definitions and result types
//! - **Observability**: logging initialization and span constructors
//!
//! ## Crate Boundary
//!
//! `bale-core` is the only crate allowed to define shared primitives. The
//! collapse engine consumes storage exclusively through the
//! [`StorageBackend`] trait defined here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod observability;
pub mod spool;
pub mod storage;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use bale_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::spool::SpoolBuffer;
    pub use crate::storage::{
        ByteStream, DurabilityClass, MemoryBackend, ObjectMeta, ObjectStoreBackend, ProgressFn,
        StorageBackend,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use observability::{LogFormat, init_logging};
pub use spool::SpoolBuffer;
pub use storage::{
    ByteStream, DurabilityClass, MemoryBackend, ObjectMeta, ObjectStoreBackend, ProgressFn,
    StorageBackend,
};
