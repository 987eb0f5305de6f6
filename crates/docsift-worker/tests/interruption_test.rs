mod helpers;

use async_trait::async_trait;
use docsift_infra::{LifecycleHook, NoopLifecycleHook};
use docsift_queue::MessageQueue;
use docsift_worker::{
    InterruptionHandler, InterruptionPhase, Scheduler, SchedulerConfig, ShutdownConfig, Stage,
    TaskHandle,
};
use helpers::{direct_record, Harness, BUCKET};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const EVACUATION_BUCKET: &str = "evacuated";
const HOST: &str = "test-host";

fn shutdown_config() -> ShutdownConfig {
    ShutdownConfig {
        budget: Duration::from_secs(120),
        drain_timeout: Duration::from_secs(2),
        evacuation_timeout: Duration::from_secs(30),
        upload_timeout: Duration::from_secs(10),
        visibility_extension_seconds: 300,
        visibility_call_timeout: Duration::from_secs(5),
        evacuation_bucket: EVACUATION_BUCKET.to_string(),
        evacuation_prefix: "interrupted/".to_string(),
        host_id: HOST.to_string(),
    }
}

#[derive(Default)]
struct RecordingHook {
    completed: Mutex<Vec<String>>,
}

#[async_trait]
impl LifecycleHook for RecordingHook {
    async fn complete(&self, instance_id: &str) -> anyhow::Result<()> {
        self.completed.lock().unwrap().push(instance_id.to_string());
        Ok(())
    }
}

fn handler(h: &Harness, lifecycle: Arc<dyn LifecycleHook>) -> InterruptionHandler {
    InterruptionHandler::new(
        h.state.clone(),
        Arc::new(h.queue.clone()),
        Arc::new(h.storage.clone()),
        lifecycle,
        shutdown_config(),
        h.temp.path().to_path_buf(),
    )
}

#[tokio::test(start_paused = true)]
async fn hanging_evacuation_does_not_block_visibility_extension() {
    let h = Harness::new();
    for i in 0..3 {
        h.queue.send(direct_record(&format!("stuck-{}.txt", i)));
    }
    let messages = h.queue.receive_batch(3, 0, 600).await.unwrap();
    assert_eq!(messages.len(), 3);

    // workers that never reach another checkpoint
    let tasks: Vec<TaskHandle> = messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let task = h.state.register(message);
            task.update(|p| {
                p.bucket = Some(BUCKET.to_string());
                p.key = Some(format!("stuck-{}.txt", i));
                p.partial_text = Some(format!("partial {}", i));
            });
            task.reach(Stage::Extracted);
            task
        })
        .collect();
    h.storage
        .hang_uploads_with_prefix(&format!("interrupted/{}/{}/", HOST, tasks[0].id()));

    let handler = handler(&h, Arc::new(NoopLifecycleHook));
    let started = tokio::time::Instant::now();
    let report = handler.run("test interruption").await;
    let elapsed = started.elapsed();

    let config = shutdown_config();
    assert!(elapsed < config.budget, "protocol took {:?}", elapsed);
    assert!(elapsed <= config.drain_timeout + config.evacuation_timeout + Duration::from_secs(1));
    assert_eq!(handler.phase(), InterruptionPhase::Terminated);
    assert!(!h.state.is_accepting());
    assert!(tasks.iter().all(|t| t.is_cancelled()));

    assert_eq!(report.cancelled_tasks, 3);
    assert!(!report.drained);
    assert_eq!(report.evacuated, 2);
    assert_eq!(report.evacuation_failures, 1);
    assert_eq!(report.visibility_extended, 3);
    assert!(report.lifecycle_acknowledged);

    let mut extended = h.queue.visibility_changes();
    extended.sort();
    let mut expected: Vec<(String, i32)> = messages
        .iter()
        .map(|m| (m.message_id.clone(), 300))
        .collect();
    expected.sort();
    assert_eq!(extended, expected);

    let evacuated = h.storage.keys(EVACUATION_BUCKET);
    for task in &tasks[1..] {
        let key = format!("interrupted/{}/{}/partial.json", HOST, task.id());
        assert!(evacuated.contains(&key), "missing {}", key);
    }
    assert_eq!(h.queue.deleted_count(), 0);
}

#[tokio::test]
async fn interrupted_worker_is_evacuated_and_handed_back() {
    let h = Harness::new();
    h.storage.set_download_delay(Duration::from_millis(300));
    h.storage.put_object(BUCKET, "reports/annual.txt", "annual report body");
    let message_id = h.queue.send(direct_record("reports/annual.txt"));

    let consumer = tokio::spawn(
        Scheduler::new(
            h.ctx.clone(),
            h.state.clone(),
            SchedulerConfig {
                max_workers: 2,
                batch_size: 10,
                wait_time_seconds: 1,
                visibility_timeout_seconds: 600,
                receive_error_backoff: Duration::from_millis(100),
            },
        )
        .run(),
    );

    // wait until the worker is inside its (slow) download
    while !h
        .state
        .snapshot()
        .iter()
        .any(|t| t.progress.stage == Some(Stage::Validated))
    {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let hook = Arc::new(RecordingHook::default());
    let handler = handler(&h, hook.clone());
    let report = handler.run("SIGTERM").await;

    // the worker finished its download, then stopped at the next checkpoint
    assert!(report.drained);
    assert_eq!(report.cancelled_tasks, 1);
    assert_eq!(report.evacuated, 1);
    assert_eq!(report.visibility_extended, 1);
    assert_eq!(report.statistics.interrupted, 1);
    assert_eq!(*hook.completed.lock().unwrap(), vec![HOST.to_string()]);

    let keys = h.storage.keys(EVACUATION_BUCKET);
    let partial = keys.iter().find(|k| k.ends_with("/partial.json")).unwrap();
    let source = keys.iter().find(|k| k.ends_with("/source.txt")).unwrap();
    assert!(partial.starts_with(&format!("interrupted/{}/", HOST)));

    let record: serde_json::Value =
        serde_json::from_slice(&h.storage.get_object(EVACUATION_BUCKET, partial).unwrap().data)
            .unwrap();
    assert_eq!(record["key"], "reports/annual.txt");
    assert_eq!(record["stage"], "downloaded");
    assert_eq!(record["still_running"], false);

    let copy = h.storage.get_object(EVACUATION_BUCKET, source).unwrap();
    assert_eq!(copy.data, b"annual report body");
    assert_eq!(copy.metadata.get("original-key").unwrap(), "reports/annual.txt");

    assert_eq!(h.queue.deleted_count(), 0);
    assert_eq!(h.queue.visibility_changes(), vec![(message_id, 300)]);
    assert!(h.index.is_empty());
    assert!(h.temp_files().is_empty());

    tokio::time::timeout(Duration::from_secs(3), consumer)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn idle_instance_vacates_immediately() {
    let h = Harness::new();
    let report = handler(&h, Arc::new(NoopLifecycleHook)).run("preemption notice").await;

    assert!(report.drained);
    assert_eq!(report.cancelled_tasks, 0);
    assert_eq!(report.evacuated, 0);
    assert_eq!(report.visibility_extended, 0);
    assert!(report.elapsed_seconds < 5.0);
    assert!(h.queue.visibility_changes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn visibility_failure_does_not_abort_protocol() {
    let h = Harness::new();
    h.queue.set_fail_visibility_changes(true);
    for i in 0..2 {
        h.queue.send(direct_record(&format!("doc-{}.txt", i)));
    }
    let messages = h.queue.receive_batch(2, 0, 600).await.unwrap();
    let tasks: Vec<TaskHandle> = messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let task = h.state.register(message);
            task.update(|p| {
                p.bucket = Some(BUCKET.to_string());
                p.key = Some(format!("doc-{}.txt", i));
            });
            task.reach(Stage::Downloaded);
            task
        })
        .collect();
    std::fs::write(h.temp.path().join("docsift-leftover.txt"), b"stale").unwrap();

    let hook = Arc::new(RecordingHook::default());
    let handler = handler(&h, hook.clone());
    let report = handler.run("SIGTERM").await;

    assert_eq!(report.visibility_extended, 0);
    assert_eq!(report.visibility_failures, 2);
    assert!(h.queue.visibility_changes().is_empty());

    // later steps still ran
    assert_eq!(report.evacuated, 2);
    assert!(report.lifecycle_acknowledged);
    assert_eq!(*hook.completed.lock().unwrap(), vec![HOST.to_string()]);
    assert!(report.files_removed >= 1);
    assert!(h.temp_files().is_empty());
    assert_eq!(handler.phase(), InterruptionPhase::Terminated);

    let evacuated = h.storage.keys(EVACUATION_BUCKET);
    for task in &tasks {
        let key = format!("interrupted/{}/{}/partial.json", HOST, task.id());
        assert!(evacuated.contains(&key), "missing {}", key);
    }
}
