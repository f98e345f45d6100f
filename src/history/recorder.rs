//! Bounded, drop-oldest queue in front of a history sink

use super::{HistoryRecord, HistorySink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Shared {
    queue: Mutex<VecDeque<HistoryRecord>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<HistoryRecord>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle for submitting history records without waiting on the sink
#[derive(Clone)]
pub struct HistoryRecorder {
    shared: Arc<Shared>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl HistoryRecorder {
    /// Start the drain task for `sink`
    pub fn spawn(sink: Arc<dyn HistorySink>, capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });

        let handle = tokio::spawn(drain_task(Arc::clone(&shared), sink));

        Self {
            shared,
            task: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Queue a record, evicting the oldest one when the queue is full
    ///
    /// Returns `false` when the recorder has been shut down and the record
    /// was discarded.
    pub fn submit(&self, record: HistoryRecord) -> bool {
        {
            // `closed` only changes under this lock
            let mut queue = self.shared.queue();
            if self.shared.closed.load(Ordering::Acquire) {
                tracing::debug!("History recorder closed, discarding record");
                return false;
            }
            if queue.len() >= self.shared.capacity {
                queue.pop_front();
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!("History queue full, dropped oldest record ({} total)", dropped);
            }
            queue.push_back(record);
        }

        self.shared.notify.notify_one();
        true
    }

    /// Records waiting to be written
    pub fn pending(&self) -> usize {
        self.shared.queue().len()
    }

    /// Records discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting records, write out what is queued and stop the task
    pub async fn shutdown(&self) {
        {
            let _queue = self.shared.queue();
            self.shared.closed.store(true, Ordering::Release);
        }
        self.shared.notify.notify_one();

        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("History drain task failed: {}", e);
            }
        }
    }
}

async fn drain_task(shared: Arc<Shared>, sink: Arc<dyn HistorySink>) {
    loop {
        let (next, closed) = {
            let mut queue = shared.queue();
            (queue.pop_front(), shared.closed.load(Ordering::Acquire))
        };
        match next {
            Some(record) => {
                if let Err(e) = sink.record(&record).await {
                    tracing::warn!("Could not save message from '{}': {}", record.sender, e);
                }
            }
            None => {
                if closed {
                    break;
                }
                shared.notify.notified().await;
            }
        }
    }

    tracing::debug!("History drain task finished");
}
