//! Test utilities for bale.
//!
//! Provides an in-memory storage backend that records every operation and
//! can inject the faults the collapse engine must guard against: failing
//! paths, misreported listing sizes, and misreported upload sizes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod storage;

pub use storage::{StoreOp, TracingMemoryBackend};
