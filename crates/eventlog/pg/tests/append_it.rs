//! Integration tests for appends.
//!
//! These tests require a running PostgreSQL instance (via Testcontainers).
//! Run with: cargo test -p eventlog-pg --test append_it -- --ignored

mod common;

use eventlog_core::{
    AppendOptions, Event, EventLog, EventLogError, ExpectedRevision, Middleware,
    MiddlewareChain, PartitionCatalog, ReadOptions, Result, Stream,
};
use eventlog_pg::AppendBatch;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

fn order(id: &str) -> Stream {
    Stream::new("Order", "OrderCreated", id)
}

fn events(types: &[&str]) -> Vec<Event> {
    types
        .iter()
        .map(|event_type| Event::new(*event_type))
        .collect()
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_append_assigns_contiguous_revisions() {
    let (_db, log) = common::event_log().await;
    let stream = order("abc");

    let persisted = log
        .append(&stream, events(&["A", "B", "C"]), AppendOptions::default())
        .await
        .expect("append");

    let revisions: Vec<i32> = persisted.iter().filter_map(|e| e.stream_revision).collect();
    assert_eq!(revisions, vec![0, 1, 2]);
    let types: Vec<&str> = persisted.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["A", "B", "C"]);
    assert!(persisted.iter().all(|e| e.is_persisted()));

    let positions: Vec<i64> = persisted.iter().filter_map(|e| e.global_position).collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

    let forward = log.read(&stream, ReadOptions::new()).await.expect("read");
    let types: Vec<&str> = forward.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["A", "B", "C"]);

    let backward = log
        .read(&stream, ReadOptions::new().backward())
        .await
        .expect("read backward");
    let types: Vec<&str> = backward.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["C", "B", "A"]);

    let forward_ids: Vec<_> = forward.iter().map(|e| e.id).collect();
    let mut backward_ids: Vec<_> = backward.iter().map(|e| e.id).collect();
    backward_ids.reverse();
    assert_eq!(forward_ids, backward_ids);
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_append_continues_after_existing_revisions() {
    let (_db, log) = common::event_log().await;
    let stream = order("1");

    log.append(&stream, events(&["A", "B"]), AppendOptions::default())
        .await
        .expect("first append");
    let persisted = log
        .append(
            &stream,
            events(&["C"]),
            AppendOptions::expected_revision(ExpectedRevision::Exact(1)),
        )
        .await
        .expect("second append");

    assert_eq!(persisted[0].stream_revision, Some(2));
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_wrong_expected_revision_is_reported_with_both_revisions() {
    let (_db, log) = common::event_log().await;
    let stream = order("1");
    log.append(&stream, events(&["A", "B", "C"]), AppendOptions::default())
        .await
        .expect("append");

    let err = log
        .append(
            &stream,
            events(&["D"]),
            AppendOptions::expected_revision(ExpectedRevision::Exact(0)),
        )
        .await
        .unwrap_err();

    match err {
        EventLogError::WrongExpectedVersion {
            expected, actual, ..
        } => {
            assert_eq!(expected, ExpectedRevision::Exact(0));
            assert_eq!(actual, Some(2));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_no_stream_and_stream_exists_expectations() {
    let (_db, log) = common::event_log().await;
    let stream = order("1");

    let err = log
        .append(
            &stream,
            events(&["A"]),
            AppendOptions::expected_revision(ExpectedRevision::StreamExists),
        )
        .await
        .unwrap_err();
    assert!(err.is_wrong_expected_version());

    log.append(
        &stream,
        events(&["A"]),
        AppendOptions::expected_revision(ExpectedRevision::NoStream),
    )
    .await
    .expect("first append to an empty stream");

    let err = log
        .append(
            &stream,
            events(&["B"]),
            AppendOptions::expected_revision(ExpectedRevision::NoStream),
        )
        .await
        .unwrap_err();
    assert!(err.is_wrong_expected_version());

    log.append(
        &stream,
        events(&["B"]),
        AppendOptions::expected_revision(ExpectedRevision::StreamExists),
    )
    .await
    .expect("append to an existing stream");
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_first_append_creates_three_partitions() {
    let (_db, log) = common::event_log().await;
    let stream = order("1");

    log.append(&stream, events(&["A"]), AppendOptions::default())
        .await
        .expect("append");

    let partitions = log.catalog().list().await.expect("list partitions");
    assert_eq!(partitions.len(), 3);
    assert!(partitions[0].table_name.starts_with("contexts_"));
    assert!(partitions[1].table_name.starts_with("stream_names_"));
    assert!(partitions[2].table_name.starts_with("event_types_"));
    assert!(partitions[2].is_leaf());

    let leaf = log
        .catalog()
        .find_leaf("Order", "OrderCreated", "A")
        .await
        .expect("find leaf");
    assert_eq!(leaf.as_ref(), Some(&partitions[2]));

    log.append(&order("2"), events(&["A", "B"]), AppendOptions::default())
        .await
        .expect("append to a sibling stream");
    let partitions = log.catalog().list().await.expect("list partitions");
    assert_eq!(partitions.len(), 4, "only the new event type needs a leaf");
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_concurrent_appends_get_distinct_positions_and_revisions() {
    let (_db, log) = common::event_log().await;
    let log = Arc::new(log);
    let stream = order("concurrent");

    let mut handles = Vec::new();
    for n in 0..10 {
        let log = log.clone();
        let stream = stream.clone();
        handles.push(tokio::spawn(async move {
            log.append(
                &stream,
                vec![Event::new("A").with_data(json!({ "n": n }))],
                AppendOptions::default(),
            )
            .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("append");
    }

    let read = log.read(&stream, ReadOptions::new()).await.expect("read");
    assert_eq!(read.len(), 10);

    let revisions: Vec<i32> = read.iter().filter_map(|e| e.stream_revision).collect();
    assert_eq!(revisions, (0..10).collect::<Vec<_>>());

    let positions: HashSet<i64> = read.iter().filter_map(|e| e.global_position).collect();
    assert_eq!(positions.len(), 10);
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_concurrent_appends_to_distinct_streams_never_share_positions() {
    let (_db, log) = common::event_log().await;
    let log = Arc::new(log);

    let mut handles = Vec::new();
    for n in 0..10 {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            log.append(&order(&n.to_string()), events(&["A"]), AppendOptions::default())
                .await
        }));
    }

    let mut positions = HashSet::new();
    for handle in handles {
        let persisted = handle.await.expect("join").expect("append");
        assert_eq!(persisted[0].stream_revision, Some(0));
        positions.extend(persisted.iter().filter_map(|e| e.global_position));
    }
    assert_eq!(positions.len(), 10);
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_append_keeps_client_ids_and_payloads() {
    let (_db, log) = common::event_log().await;
    let stream = order("1");
    let id = uuid::Uuid::new_v4();
    let event = Event::new("A")
        .with_id(id)
        .with_data(json!({"total": 10, "items": [1, 2]}))
        .with_metadata(json!({"user": "u-1"}));

    log.append(&stream, vec![event], AppendOptions::default())
        .await
        .expect("append");

    let read = log.read(&stream, ReadOptions::new()).await.expect("read");
    assert_eq!(read[0].id, Some(id));
    assert_eq!(read[0].data, json!({"total": 10, "items": [1, 2]}));
    assert_eq!(read[0].metadata, json!({"user": "u-1"}));
    assert!(read[0].created_at.is_some());
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_system_streams_cannot_be_appended_to() {
    let (_db, log) = common::event_log().await;

    for stream in [Stream::all(), Stream::streams()] {
        let err = log
            .append(&stream, events(&["A"]), AppendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EventLogError::SystemStream { .. }));
    }
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_empty_append_is_still_validated() {
    let (_db, log) = common::event_log().await;

    let err = log
        .append(&Stream::all(), Vec::new(), AppendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EventLogError::SystemStream { .. }));

    let stream = order("1");
    let persisted = log
        .append(&stream, Vec::new(), AppendOptions::default())
        .await
        .expect("empty append to a new stream");
    assert!(persisted.is_empty());
    assert!(!log.stream_exists(&stream).await.expect("exists"));

    log.append(&stream, events(&["A"]), AppendOptions::default())
        .await
        .expect("append");
    let err = log
        .append(
            &stream,
            Vec::new(),
            AppendOptions::expected_revision(ExpectedRevision::NoStream),
        )
        .await
        .unwrap_err();
    match err {
        EventLogError::WrongExpectedVersion { actual, .. } => assert_eq!(actual, Some(0)),
        other => panic!("unexpected error: {other}"),
    }

    log.append(
        &stream,
        Vec::new(),
        AppendOptions::expected_revision(ExpectedRevision::Exact(0)),
    )
    .await
    .expect("empty append with a matching revision");
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_append_many_is_atomic() {
    let (_db, log) = common::event_log().await;
    let first = order("1");
    let second = Stream::new("Invoice", "InvoiceIssued", "9");

    let results = log
        .append_many(vec![
            AppendBatch::new(first.clone(), events(&["A"])),
            AppendBatch::new(second.clone(), events(&["X", "Y"])),
        ])
        .await
        .expect("append many");
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].len(), 2);

    let err = log
        .append_many(vec![
            AppendBatch::new(first.clone(), events(&["B"])),
            AppendBatch::new(second.clone(), events(&["Z"]))
                .with_options(AppendOptions::expected_revision(ExpectedRevision::NoStream)),
        ])
        .await
        .unwrap_err();
    assert!(err.is_wrong_expected_version());

    let read = log.read(&first, ReadOptions::new()).await.expect("read");
    assert_eq!(read.len(), 1, "the failed batch must not leave events behind");
}

struct Envelope;

impl Middleware for Envelope {
    fn serialize(&self, event: &mut Event) -> Result<()> {
        event.data = json!({ "sealed": event.data.take() });
        Ok(())
    }

    fn deserialize(&self, event: &mut Event) -> Result<()> {
        if let Some(inner) = event.data.get_mut("sealed") {
            event.data = inner.take();
        }
        Ok(())
    }
}

#[tokio::test]
#[ignore = "Requires Docker/Testcontainers"]
async fn test_middlewares_wrap_persisted_payloads() {
    let (_db, log) = common::event_log().await;
    let log = log.with_middlewares(MiddlewareChain::new().with(Arc::new(Envelope)));
    let stream = order("1");

    let persisted = log
        .append(
            &stream,
            vec![Event::new("A").with_data(json!({"k": "v"}))],
            AppendOptions::default(),
        )
        .await
        .expect("append");
    assert_eq!(persisted[0].data, json!({"k": "v"}));

    let stored: serde_json::Value = sqlx::query_scalar("SELECT data FROM events")
        .fetch_one(log.pool().pool())
        .await
        .expect("raw row");
    assert_eq!(stored, json!({"sealed": {"k": "v"}}));

    let read = log.read(&stream, ReadOptions::new()).await.expect("read");
    assert_eq!(read[0].data, json!({"k": "v"}));
}
