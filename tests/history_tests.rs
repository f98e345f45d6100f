//! Integration tests for chat history persistence

use async_trait::async_trait;
use relaychat::history::{
    HistoryError, HistoryRecord, HistoryRecorder, HistorySink, JsonlHistorySink,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// Sink that keeps every record in memory
#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<HistoryRecord>>,
}

impl CollectingSink {
    fn bodies(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.body.clone())
            .collect()
    }
}

#[async_trait]
impl HistorySink for CollectingSink {
    async fn record(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Sink that fails every other write
#[derive(Default)]
struct FlakySink {
    calls: AtomicUsize,
    stored: Mutex<Vec<String>>,
}

#[async_trait]
impl HistorySink for FlakySink {
    async fn record(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call % 2 == 0 {
            return Err(HistoryError::Io(std::io::Error::other("database down")));
        }
        self.stored.lock().unwrap().push(record.body.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_jsonl_sink_appends_lines() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("logs").join("history.jsonl");

    let sink = JsonlHistorySink::open(&path).await?;
    sink.record(&HistoryRecord::new("A", "hi")).await?;
    sink.record(&HistoryRecord::new("B", "hello A")).await?;

    let content = std::fs::read_to_string(&path)?;
    let records: Vec<HistoryRecord> = content
        .lines()
        .map(serde_json::from_str::<HistoryRecord>)
        .collect::<Result<_, _>>()?;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].sender, "A");
    assert_eq!(records[0].body, "hi");
    assert_eq!(records[1].sender, "B");
    assert!(records[0].timestamp <= records[1].timestamp);

    Ok(())
}

#[tokio::test]
async fn test_jsonl_sink_appends_to_existing_file() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("history.jsonl");

    JsonlHistorySink::open(&path)
        .await?
        .record(&HistoryRecord::new("A", "first"))
        .await?;
    JsonlHistorySink::open(&path)
        .await?
        .record(&HistoryRecord::new("A", "second"))
        .await?;

    let content = std::fs::read_to_string(&path)?;
    assert_eq!(content.lines().count(), 2);

    Ok(())
}

#[tokio::test]
async fn test_open_with_retry_gives_up() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let blocker = temp_dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"")?;

    let result =
        JsonlHistorySink::open_with_retry(blocker.join("history.jsonl"), 3, Duration::ZERO).await;

    match result {
        Err(HistoryError::Unavailable { attempts, .. }) => assert_eq!(attempts, 3),
        Err(e) => panic!("Expected Unavailable, got {}", e),
        Ok(_) => panic!("Opening below a regular file should fail"),
    }

    Ok(())
}

#[tokio::test]
async fn test_recorder_writes_in_order() {
    let sink = Arc::new(CollectingSink::default());
    let recorder = HistoryRecorder::spawn(sink.clone(), 16);

    for i in 0..5 {
        recorder.submit(HistoryRecord::new("A", format!("m{}", i)));
    }
    recorder.shutdown().await;

    assert_eq!(sink.bodies(), vec!["m0", "m1", "m2", "m3", "m4"]);
    assert_eq!(recorder.dropped(), 0);
}

// Single-threaded runtime: the drain task cannot run until the test yields,
// so every submission below lands in the queue first.
#[tokio::test(flavor = "current_thread")]
async fn test_recorder_drops_oldest_when_full() {
    let sink = Arc::new(CollectingSink::default());
    let recorder = HistoryRecorder::spawn(sink.clone(), 3);

    for i in 0..5 {
        recorder.submit(HistoryRecord::new("A", format!("m{}", i)));
    }
    assert_eq!(recorder.pending(), 3);
    assert_eq!(recorder.dropped(), 2);

    recorder.shutdown().await;
    assert_eq!(sink.bodies(), vec!["m2", "m3", "m4"]);
}

#[tokio::test]
async fn test_recorder_survives_sink_failures() {
    let sink = Arc::new(FlakySink::default());
    let recorder = HistoryRecorder::spawn(sink.clone(), 16);

    for i in 0..4 {
        recorder.submit(HistoryRecord::new("A", format!("m{}", i)));
    }
    recorder.shutdown().await;

    assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
    assert_eq!(*sink.stored.lock().unwrap(), vec!["m1", "m3"]);
}

#[tokio::test]
async fn test_submit_after_shutdown_is_ignored() {
    let sink = Arc::new(CollectingSink::default());
    let recorder = HistoryRecorder::spawn(sink.clone(), 4);

    recorder.shutdown().await;
    assert!(!recorder.submit(HistoryRecord::new("A", "late")));

    assert_eq!(recorder.pending(), 0);
    assert!(sink.bodies().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_accepted_record_is_written_across_shutdown() {
    let sink = Arc::new(CollectingSink::default());
    let recorder = HistoryRecorder::spawn(sink.clone(), 100_000);

    let submitters: Vec<_> = (0..8)
        .map(|t| {
            let recorder = recorder.clone();
            tokio::spawn(async move {
                let mut accepted = 0usize;
                for i in 0..500 {
                    if recorder.submit(HistoryRecord::new("A", format!("t{}-m{}", t, i))) {
                        accepted += 1;
                    }
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                accepted
            })
        })
        .collect();

    tokio::task::yield_now().await;
    recorder.shutdown().await;

    let mut accepted = 0;
    for submitter in submitters {
        accepted += submitter.await.unwrap();
    }

    assert_eq!(recorder.dropped(), 0);
    assert_eq!(recorder.pending(), 0);
    assert_eq!(sink.bodies().len(), accepted);
}
