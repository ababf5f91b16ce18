//! End-to-end range collapse over an in-memory store.

use std::sync::Arc;

use bale_collapse::{Granularity, RangeDriver, RangeRequest};
use bale_test_utils::{StoreOp, TracingMemoryBackend};
use chrono::{TimeZone, Utc};

#[tokio::test]
async fn collapses_a_three_day_range_end_to_end() {
    let store = TracingMemoryBackend::new();

    // Two objects per day for three days, plus a neighbor that must survive.
    store.seed("logs/s3logs/2014-12-29-10-00-00-AAAA", "day1 morning\n");
    store.seed("logs/s3logs/2014-12-29-18-00-00-BBBB", "day1 evening\n");
    store.seed("logs/s3logs/2014-12-30-09-00-00-CCCC", "day2 morning\n");
    store.seed("logs/s3logs/2014-12-30-21-00-00-DDDD", "day2 evening\n");
    store.seed("logs/s3logs/2014-12-31-12-00-00-EEEE", "day3 noon\n");
    store.seed("logs/s3logs/2014-12-31-23-59-59-FFFF", "day3 last\n");
    store.seed("logs/s3logs/2015-01-01-00-00-00-GGGG", "next year\n");

    let dir = tempfile::tempdir().expect("tempdir");
    let driver = RangeDriver::new(Arc::new(store.clone()));
    let request = RangeRequest::new("logs/s3logs", "logs/merged", dir.path())
        .with_granularity(Granularity::Day)
        .with_range(
            Utc.with_ymd_and_hms(2014, 12, 29, 0, 0, 0).single().expect("start"),
            Utc.with_ymd_and_hms(2014, 12, 31, 0, 0, 0).single().expect("end"),
        );

    let outcome = driver.collapse_range(&request).await.expect("range");

    assert_eq!(outcome.buckets_processed, 3);
    assert_eq!(outcome.objects_collapsed, 6);

    let day1 = store
        .object("logs/merged/2014-12-29_collapsed")
        .expect("day1 output");
    assert_eq!(&day1[..], b"day1 morning\nday1 evening\n".as_slice());
    let day2 = store
        .object("logs/merged/2014-12-30_collapsed")
        .expect("day2 output");
    assert_eq!(&day2[..], b"day2 morning\nday2 evening\n".as_slice());
    let day3 = store
        .object("logs/merged/2014-12-31_collapsed")
        .expect("day3 output");
    assert_eq!(&day3[..], b"day3 noon\nday3 last\n".as_slice());

    assert_eq!(
        outcome.bytes_written,
        (day1.len() + day2.len() + day3.len()) as u64
    );

    // Exactly the collapsed objects plus the untouched neighbor remain.
    assert_eq!(
        store.keys(),
        vec![
            "logs/merged/2014-12-29_collapsed".to_string(),
            "logs/merged/2014-12-30_collapsed".to_string(),
            "logs/merged/2014-12-31_collapsed".to_string(),
            "logs/s3logs/2015-01-01-00-00-00-GGGG".to_string(),
        ]
    );

    // Every deletion happened after the bucket's upload.
    let ops = store.operations();
    for (i, op) in ops.iter().enumerate() {
        if let StoreOp::Delete { key } = op {
            let bucket_stamp = &key["logs/s3logs/".len().."logs/s3logs/".len() + 10];
            let uploaded_before = ops[..i].iter().any(|earlier| {
                matches!(
                    earlier,
                    StoreOp::Put { key, .. } if key.contains(bucket_stamp)
                )
            });
            assert!(uploaded_before, "delete of {key} preceded its upload");
        }
    }
}

#[tokio::test]
async fn rerunning_a_completed_range_changes_nothing() {
    let store = TracingMemoryBackend::new();
    store.seed("logs/s3logs/2014-12-29-10-00-00-AAAA", "once\n");

    let dir = tempfile::tempdir().expect("tempdir");
    let driver = RangeDriver::new(Arc::new(store.clone()));
    let request = RangeRequest::new("logs/s3logs", "logs/merged", dir.path()).with_range(
        Utc.with_ymd_and_hms(2014, 12, 29, 0, 0, 0).single().expect("start"),
        Utc.with_ymd_and_hms(2014, 12, 29, 0, 0, 0).single().expect("end"),
    );

    let first = driver.collapse_range(&request).await.expect("first run");
    assert_eq!(first.objects_collapsed, 1);
    let keys_after_first = store.keys();

    let second = driver.collapse_range(&request).await.expect("second run");
    assert_eq!(second.objects_collapsed, 0);
    assert_eq!(second.bytes_written, 0);
    assert_eq!(store.keys(), keys_after_first);
}
