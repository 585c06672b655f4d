//! Engine-owned timer service.
//!
//! All timers in the machine (render ticks, rule timers, schedules, the
//! legacy interval loop, duration auto-transitions) run through one
//! scheduler task holding a min-heap of deadlines, instead of one OS
//! thread or task per timer. Cancellation is deterministic: once
//! `cancel(id)` is processed, that id fires nothing.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Handle to a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Msg {
    Schedule { id: TimerId, at: Instant, job: Job },
    Cancel(TimerId),
    CancelAll,
    Shutdown,
}

/// Cheaply-cloneable handle to the scheduler task.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Msg>,
    next_id: Arc<AtomicU64>,
}

impl Scheduler {
    /// Spawn the scheduler task onto the current tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Schedule `job` to run after `delay`. Jobs must be short; long work
    /// belongs on its own task.
    pub fn schedule_after(
        &self,
        delay: Duration,
        job: impl FnOnce() + Send + 'static,
    ) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let _ = self.tx.send(Msg::Schedule {
            id,
            at: Instant::now() + delay,
            job: Box::new(job),
        });
        id
    }

    /// Cancel a scheduled job. Cancelling an already-fired or unknown id
    /// is a no-op.
    pub fn cancel(&self, id: TimerId) {
        let _ = self.tx.send(Msg::Cancel(id));
    }

    /// Cancel every outstanding job.
    pub fn cancel_all(&self) {
        let _ = self.tx.send(Msg::CancelAll);
    }

    /// Stop the scheduler task. Pending jobs are dropped.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Msg::Shutdown);
    }
}

#[derive(PartialEq, Eq)]
struct Entry {
    at: Instant,
    seq: u64,
    id: TimerId,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Msg>) {
    let mut heap: BinaryHeap<Reverse<Entry>> = BinaryHeap::new();
    let mut jobs: HashMap<TimerId, Job> = HashMap::new();
    let mut seq: u64 = 0;

    loop {
        // Skip heap entries whose job was cancelled.
        while let Some(Reverse(head)) = heap.peek() {
            if jobs.contains_key(&head.id) {
                break;
            }
            heap.pop();
        }
        let deadline = heap.peek().map(|Reverse(e)| e.at);

        tokio::select! {
            msg = rx.recv() => match msg {
                Some(Msg::Schedule { id, at, job }) => {
                    trace!(id = id.0, "scheduler_arm");
                    jobs.insert(id, job);
                    seq += 1;
                    heap.push(Reverse(Entry { at, seq, id }));
                }
                Some(Msg::Cancel(id)) => {
                    jobs.remove(&id);
                }
                Some(Msg::CancelAll) => {
                    debug!(pending = jobs.len(), "scheduler_cancel_all");
                    jobs.clear();
                    heap.clear();
                }
                Some(Msg::Shutdown) | None => break,
            },
            _ = sleep_until_opt(deadline), if deadline.is_some() => {
                if let Some(Reverse(entry)) = heap.pop() {
                    if let Some(job) = jobs.remove(&entry.id) {
                        trace!(id = entry.id.0, "scheduler_fire");
                        job();
                    }
                }
            }
        }
    }
    debug!("scheduler_stopped");
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
