//! # bale-collapse
//!
//! Collapse engine for bale: concatenates many small timestamped objects in
//! an object store into one larger object per time bucket, verifiably, and
//! deletes the originals only after the uploaded copy is confirmed
//! size-correct.
//!
//! Two components:
//!
//! - [`CollapseEngine`]: the streamed download → classify → concatenate →
//!   verify → upload → verify → delete pipeline for one bucket of inputs
//! - [`RangeDriver`]: expands a `[start, end]` time range at a granularity
//!   into per-bucket prefixes and runs the engine once per bucket
//!
//! The core safety property: source objects are deleted only after the
//! uploaded object's size has been verified against the local concatenation.
//! A failure anywhere aborts the operation with the originals intact.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod bucket;
pub mod driver;
pub mod encoding;
pub mod engine;
pub mod error;

pub use bucket::Granularity;
pub use driver::{Clock, RangeDriver, RangeOutcome, RangeRequest, SystemClock};
pub use encoding::EncodingClass;
pub use engine::{CollapseEngine, CollapseOutcome, CollapseRequest};
pub use error::{CollapseError, Result};
