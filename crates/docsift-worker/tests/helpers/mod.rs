#![allow(dead_code)]

use docsift_core::QueueMessage;
use docsift_index::MemoryIndex;
use docsift_processing::ContentRouter;
use docsift_queue::{MemoryQueue, MessageQueue};
use docsift_storage::MemoryStorage;
use docsift_worker::{process_message, MessageOutcome, PipelineSettings, WorkerContext, WorkerPoolState};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const BUCKET: &str = "docs";

/// In-memory queue, storage and index wired into a worker context.
pub struct Harness {
    pub queue: MemoryQueue,
    pub storage: MemoryStorage,
    pub index: MemoryIndex,
    pub state: Arc<WorkerPoolState>,
    pub ctx: WorkerContext,
    pub temp: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(configure: impl FnOnce(&mut PipelineSettings)) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let mut settings = PipelineSettings {
            default_bucket: BUCKET.to_string(),
            temp_dir: temp.path().to_path_buf(),
            ..PipelineSettings::default()
        };
        configure(&mut settings);

        let queue = MemoryQueue::new("memory://test", 5);
        let storage = MemoryStorage::new();
        let index = MemoryIndex::new("file-index");
        let ctx = WorkerContext::new(
            Arc::new(queue.clone()),
            Arc::new(storage.clone()),
            Arc::new(index.clone()),
            ContentRouter::default(),
            settings,
        );

        Self {
            queue,
            storage,
            index,
            state: Arc::new(WorkerPoolState::new()),
            ctx,
            temp,
        }
    }

    pub async fn receive_one(&self) -> QueueMessage {
        let mut batch = self.queue.receive_batch(1, 0, 30).await.unwrap();
        assert_eq!(batch.len(), 1, "expected one visible message");
        batch.remove(0)
    }

    /// Receive one message and run it through the pipeline like a worker would.
    pub async fn run_one(&self) -> MessageOutcome {
        let message = self.receive_one().await;
        let task = self.state.register(&message);
        let outcome = process_message(&self.ctx, &message, &task).await;
        self.state.finish(task.id(), &outcome);
        outcome
    }

    /// Files currently in the task temp directory.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

pub fn direct_record(key: &str) -> String {
    serde_json::json!({ "bucket": BUCKET, "key": key }).to_string()
}

pub fn s3_event(bucket: &str, encoded_key: &str) -> String {
    serde_json::json!({
        "Records": [{
            "eventName": "ObjectCreated:Put",
            "s3": {
                "bucket": { "name": bucket },
                "object": { "key": encoded_key }
            }
        }]
    })
    .to_string()
}

pub fn eventbridge_event(bucket: &str, key: &str) -> String {
    serde_json::json!({
        "version": "0",
        "detail-type": "Object Created",
        "source": "aws.s3",
        "detail": {
            "bucket": { "name": bucket },
            "object": { "key": key, "size": 18 },
            "reason": "PutObject"
        }
    })
    .to_string()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 255) as u8, (y % 255) as u8, 64])
    });
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}
