//! Collapses one day's objects over an in-memory store.
//!
//! Run with: `cargo run --example collapse_day`

use std::sync::Arc;

use bale_collapse::{CollapseEngine, CollapseRequest};
use bale_core::{init_logging, LogFormat, MemoryBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::Pretty);

    // Seed a store with a day's worth of small log objects.
    let store = Arc::new(MemoryBackend::new());
    store.insert("logs/2014-12-31-10-00-00-AAAA", "morning traffic\n");
    store.insert("logs/2014-12-31-18-00-00-BBBB", "evening traffic\n");

    let scratch = tempfile::tempdir()?;
    let engine = CollapseEngine::new(store.clone());
    let request = CollapseRequest::new(
        "logs/2014-12-31-",
        scratch.path().join("2014-12-31_collapsed"),
        "merged/2014-12-31_collapsed",
    );

    let outcome = engine.collapse(&request).await?;
    println!(
        "collapsed {} objects into {} bytes at merged/2014-12-31_collapsed",
        outcome.objects_collapsed, outcome.bytes_written
    );

    Ok(())
}
