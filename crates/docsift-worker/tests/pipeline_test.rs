mod helpers;

use docsift_core::{document_id, IndexUnavailablePolicy, MalformedMessagePolicy, PipelineError};
use docsift_worker::{process_message, MessageOutcome, Stage};
use helpers::{direct_record, eventbridge_event, png_bytes, s3_event, Harness, BUCKET};

#[tokio::test]
async fn indexes_document_and_acknowledges() {
    let h = Harness::new();
    h.storage.put_object(BUCKET, "team/notes.txt", "hello search world");
    h.queue.send(direct_record("team/notes.txt"));

    let outcome = h.run_one().await;
    assert!(matches!(outcome, MessageOutcome::Success { indexed: true }));

    let doc = h.index.get(&document_id(BUCKET, "team/notes.txt")).unwrap();
    assert_eq!(doc.extracted_text, "hello search world");
    assert_eq!(doc.word_count, 3);
    assert_eq!(doc.file_type, "txt");
    assert_eq!(doc.mime_type, "text/plain");
    assert_eq!(doc.folder, "team");
    assert_eq!(doc.processor_name, "text");
    assert!(doc.thumbnail_url.is_none());

    assert!(h.queue.is_empty());
    assert_eq!(h.queue.deleted_count(), 1);
    assert!(h.temp_files().is_empty());
    assert_eq!(h.state.statistics().succeeded, 1);
}

#[tokio::test]
async fn reprocessing_the_same_object_overwrites_one_document() {
    let h = Harness::new();
    h.storage.put_object(BUCKET, "reports/q1 summary.txt", "v1");
    h.queue.send(direct_record("reports/q1 summary.txt"));
    // the same object announced by an S3 notification with an encoded key
    h.queue.send(s3_event(BUCKET, "reports/q1+summary.txt"));

    assert!(matches!(h.run_one().await, MessageOutcome::Success { .. }));
    h.storage.put_object(BUCKET, "reports/q1 summary.txt", "v2");
    assert!(matches!(h.run_one().await, MessageOutcome::Success { .. }));

    assert_eq!(h.index.len(), 1);
    assert_eq!(h.index.write_count(), 2);
    let doc = h
        .index
        .get(&document_id(BUCKET, "reports/q1 summary.txt"))
        .unwrap();
    assert_eq!(doc.extracted_text, "v2");
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn eventbridge_event_is_indexed_with_its_key_verbatim() {
    let h = Harness::new();
    h.storage.put_object(BUCKET, "team/q1 notes.txt", "quarterly notes");
    h.queue.send(eventbridge_event(BUCKET, "team/q1 notes.txt"));

    let outcome = h.run_one().await;
    assert!(matches!(outcome, MessageOutcome::Success { indexed: true }));

    let doc = h.index.get(&document_id(BUCKET, "team/q1 notes.txt")).unwrap();
    assert_eq!(doc.extracted_text, "quarterly notes");
    assert_eq!(doc.folder, "team");
    assert!(h.queue.is_empty());
    assert_eq!(h.queue.deleted_count(), 1);
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
async fn acknowledge_failure_keeps_message_and_counts_outcome() {
    let h = Harness::new();
    h.queue.set_fail_deletes(true);
    h.storage.put_object(BUCKET, "a.txt", "content");
    h.queue.send(direct_record("a.txt"));

    let outcome = h.run_one().await;
    assert!(matches!(outcome, MessageOutcome::Success { indexed: true }));

    // indexed, but the message stays hidden until redelivery
    assert_eq!(h.index.len(), 1);
    assert_eq!(h.queue.deleted_count(), 0);
    assert_eq!(h.queue.in_flight_count(), 1);
    assert!(h.temp_files().is_empty());

    let stats = h.state.statistics();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn unsupported_type_is_skipped_and_deleted() {
    let h = Harness::new();
    h.storage.put_object(BUCKET, "archive.zip", vec![0x50, 0x4b, 0x03, 0x04]);
    h.queue.send(direct_record("archive.zip"));

    let outcome = h.run_one().await;
    assert!(matches!(outcome, MessageOutcome::Skipped(_)));
    assert!(h.index.is_empty());
    assert!(h.queue.is_empty());
    assert!(h.temp_files().is_empty());

    let stats = h.state.statistics();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn malformed_body_is_deleted_under_delete_policy() {
    let h = Harness::new();
    h.queue.send("not json");

    let outcome = h.run_one().await;
    assert!(matches!(
        outcome,
        MessageOutcome::Dropped(PipelineError::MalformedMessage(_))
    ));
    assert!(h.queue.is_empty());
    assert_eq!(h.state.statistics().failed, 1);
}

#[tokio::test]
async fn malformed_body_is_left_under_retry_policy() {
    let h = Harness::with_settings(|s| s.malformed_message_policy = MalformedMessagePolicy::Retry);
    h.queue.send("not json");

    let outcome = h.run_one().await;
    assert!(matches!(
        outcome,
        MessageOutcome::Retry(PipelineError::MalformedMessage(_))
    ));
    assert_eq!(h.queue.deleted_count(), 0);
    assert_eq!(h.queue.in_flight_count(), 1);
}

#[tokio::test]
async fn download_failure_leaves_message_and_no_file() {
    let h = Harness::new();
    h.storage.put_object(BUCKET, "a.txt", "content");
    h.storage.set_fail_downloads(true);
    h.queue.send(direct_record("a.txt"));

    let outcome = h.run_one().await;
    assert!(matches!(
        outcome,
        MessageOutcome::Retry(PipelineError::DownloadFailed(_))
    ));
    assert_eq!(h.queue.deleted_count(), 0);
    assert!(h.index.is_empty());
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
async fn missing_object_is_skipped() {
    let h = Harness::new();
    h.queue.send(direct_record("deleted-meanwhile.txt"));

    assert!(matches!(h.run_one().await, MessageOutcome::Skipped(_)));
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn oversized_object_is_skipped() {
    let h = Harness::with_settings(|s| s.max_file_size_bytes = 4);
    h.storage.put_object(BUCKET, "big.txt", "more than four bytes");
    h.queue.send(direct_record("big.txt"));

    assert!(matches!(h.run_one().await, MessageOutcome::Skipped(_)));
    assert!(h.index.is_empty());
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn extraction_failure_leaves_message_and_no_file() {
    let h = Harness::new();
    h.storage.put_object(BUCKET, "broken.pdf", "definitely not a pdf");
    h.queue.send(direct_record("broken.pdf"));

    let outcome = h.run_one().await;
    assert!(matches!(
        outcome,
        MessageOutcome::Retry(PipelineError::ExtractionFailed(_))
    ));
    assert_eq!(h.queue.deleted_count(), 0);
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
async fn unreachable_index_acknowledges_without_writing() {
    let h = Harness::new();
    h.index.set_connected(false);
    h.storage.put_object(BUCKET, "a.txt", "content");
    h.queue.send(direct_record("a.txt"));

    let outcome = h.run_one().await;
    assert!(matches!(outcome, MessageOutcome::Success { indexed: false }));
    assert!(h.index.is_empty());
    assert!(h.queue.is_empty());
    assert_eq!(h.state.statistics().succeeded, 1);
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
async fn unreachable_index_retries_under_fail_policy() {
    let h = Harness::with_settings(|s| s.index_unavailable_policy = IndexUnavailablePolicy::Fail);
    h.index.set_connected(false);
    h.storage.put_object(BUCKET, "a.txt", "content");
    h.queue.send(direct_record("a.txt"));

    let outcome = h.run_one().await;
    assert!(matches!(
        outcome,
        MessageOutcome::Retry(PipelineError::IndexUnavailable(_))
    ));
    assert_eq!(h.queue.deleted_count(), 0);
}

#[tokio::test]
async fn index_write_failure_leaves_message() {
    let h = Harness::new();
    h.index.set_fail_writes(true);
    h.storage.put_object(BUCKET, "a.txt", "content");
    h.queue.send(direct_record("a.txt"));

    let outcome = h.run_one().await;
    assert!(matches!(
        outcome,
        MessageOutcome::Retry(PipelineError::IndexWriteFailed(_))
    ));
    assert_eq!(h.queue.deleted_count(), 0);
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
async fn image_thumbnail_is_uploaded_and_linked() {
    let h = Harness::new();
    h.storage.put_object(BUCKET, "photos/cat.png", png_bytes(400, 300));
    h.queue.send(direct_record("photos/cat.png"));

    assert!(matches!(h.run_one().await, MessageOutcome::Success { indexed: true }));

    let thumb = h
        .storage
        .get_object(BUCKET, "thumbnails/photos/cat.png.jpg")
        .unwrap();
    assert_eq!(thumb.content_type, "image/jpeg");
    assert_eq!(thumb.metadata.get("original-key").unwrap(), "photos/cat.png");

    let doc = h.index.get(&document_id(BUCKET, "photos/cat.png")).unwrap();
    assert_eq!(
        doc.thumbnail_url.as_deref(),
        Some("s3://docs/thumbnails/photos/cat.png.jpg")
    );
    assert_eq!(doc.metadata["width"], 400);
}

#[tokio::test]
async fn thumbnail_upload_failure_is_not_fatal() {
    let h = Harness::new();
    h.storage.fail_uploads_with_prefix("thumbnails/");
    h.storage.put_object(BUCKET, "photos/cat.png", png_bytes(64, 64));
    h.queue.send(direct_record("photos/cat.png"));

    assert!(matches!(h.run_one().await, MessageOutcome::Success { indexed: true }));
    let doc = h.index.get(&document_id(BUCKET, "photos/cat.png")).unwrap();
    assert!(doc.thumbnail_url.is_none());
    assert!(h.queue.is_empty());
    assert!(h.temp_files().is_empty());
}

#[tokio::test]
async fn any_retryable_record_keeps_a_multi_record_message() {
    let h = Harness::new();
    h.storage.put_object(BUCKET, "ok.txt", "fine");
    h.storage.put_object(BUCKET, "bad.pdf", "not a pdf");
    let body = serde_json::json!({
        "Records": [
            { "s3": { "bucket": { "name": BUCKET }, "object": { "key": "ok.txt" } } },
            { "s3": { "bucket": { "name": BUCKET }, "object": { "key": "bad.pdf" } } }
        ]
    });
    h.queue.send(body.to_string());

    let outcome = h.run_one().await;
    assert!(matches!(outcome, MessageOutcome::Retry(_)));
    // the good record was still indexed; redelivery overwrites it
    assert_eq!(h.index.len(), 1);
    assert_eq!(h.queue.deleted_count(), 0);
}

#[tokio::test]
async fn cancelled_task_stops_at_checkpoint_and_keeps_message() {
    let h = Harness::new();
    h.storage.put_object(BUCKET, "a.txt", "content");
    h.queue.send(direct_record("a.txt"));

    let message = h.receive_one().await;
    let task = h.state.register(&message);
    h.state.cancel_all();

    let outcome = process_message(&h.ctx, &message, &task).await;
    h.state.finish(task.id(), &outcome);

    assert!(matches!(outcome, MessageOutcome::Cancelled(Stage::Validated)));
    assert_eq!(h.queue.deleted_count(), 0);
    assert!(h.index.is_empty());

    let snapshot = h.state.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].interrupted);
    assert!(!snapshot[0].acknowledged);
    assert_eq!(snapshot[0].receipt_handle, message.receipt_handle);
    assert_eq!(h.state.statistics().interrupted, 1);
}
