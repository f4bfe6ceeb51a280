//! Debounced, serialized generation runs.
//!
//! Content edits arrive in bursts: saving an article touches the article,
//! its tags and its attachments within a second or two. Regenerating on every
//! trigger would rebuild the same pages several times and race on the output
//! tree. The [`GenerationScheduler`] fixes both:
//!
//! ```text
//! schedule(target) ──▶ DebounceStore[target] = (run_at, generation)
//!        │
//!        └──▶ dispatcher (min-heap on run_at) ──mpsc──▶ worker pool
//!                                                         │
//!                            superseded? ──yes──▶ skip     │
//!                                 │ no                     │
//!                                 ▼                        │
//!                      GenerationLock::acquire ◀───────────┘
//!                                 │
//!                      GenerationRunner::run(target)
//! ```
//!
//! Every `schedule` call overwrites the debounce record for its target with a
//! fresh generation number. When a deferred job comes due it compares its own
//! generation with the record: if a newer request has been made since, the job
//! is a no-op and only the newest request runs.
//!
//! ## Locking
//!
//! Runs are serialized by one global [`GenerationLock`]: an in-process mutex
//! plus an advisory file lock, so a CLI invocation and a long-running
//! scheduler never write the output tree at the same time. A contended
//! acquire blocks; it never fails the run. The kernel drops the file lock
//! when the holding process dies, so there is no lease to expire.
//!
//! Shared pages (index, feed, sitemap) belong to almost every target, which
//! is why the lock is global rather than per target.

use crate::config::ScheduleConfig;
use crate::generate::{GenerateError, GenerationRunner, RunReport};
use crate::types::{GenerationRequest, Target};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("could not acquire generation lock: {0}")]
    Lock(#[from] io::Error),
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error("generation run panicked")]
    Panicked,
}

// ============================================================================
// Lock
// ============================================================================

/// Process-wide and cross-process mutual exclusion for generation runs.
pub struct GenerationLock {
    path: PathBuf,
    local: Mutex<()>,
}

/// Held for the duration of one run. Dropping it releases both locks.
pub struct LockGuard<'a> {
    file: File,
    _local: MutexGuard<'a, ()>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(error = %e, "could not release generation file lock");
        }
    }
}

impl GenerationLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            local: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until this caller holds the lock.
    pub fn acquire(&self) -> io::Result<LockGuard<'_>> {
        let local = match self.local.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::Poisoned(p)) => p.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => {
                info!(event = "schedule.lock_wait", holder = "in-process", "waiting for generation lock");
                self.local.lock().unwrap_or_else(PoisonError::into_inner)
            }
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(fs::TryLockError::WouldBlock) => {
                info!(
                    event = "schedule.lock_wait",
                    holder = "other process",
                    path = %self.path.display(),
                    "waiting for generation lock"
                );
                file.lock()?;
            }
            Err(fs::TryLockError::Error(e)) => return Err(e),
        }

        // Diagnostics only; the lock itself is the flock.
        file.set_len(0)?;
        writeln!(file, "pid={}", std::process::id())?;
        writeln!(file, "acquired_at={}", Utc::now().to_rfc3339())?;
        debug!(path = %self.path.display(), "generation lock acquired");

        Ok(LockGuard {
            file,
            _local: local,
        })
    }
}

// ============================================================================
// Debounce store
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceRecord {
    pub run_at: DateTime<Utc>,
    /// Monotone across all targets, so "newer" is total even for equal timestamps.
    pub generation: u64,
}

#[derive(Default)]
struct DebounceStore {
    records: Mutex<HashMap<Target, DebounceRecord>>,
    counter: AtomicU64,
}

impl DebounceStore {
    fn touch(&self, target: Target, run_at: DateTime<Utc>) -> DebounceRecord {
        let record = DebounceRecord {
            run_at,
            generation: self.counter.fetch_add(1, AtomicOrdering::SeqCst) + 1,
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target, record);
        record
    }

    /// Claim the record if `generation` is still the newest for `target`.
    fn claim(&self, target: &Target, generation: u64) -> bool {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match records.get(target) {
            Some(r) if r.generation == generation => {
                records.remove(target);
                true
            }
            _ => false,
        }
    }

    fn get(&self, target: &Target) -> Option<DebounceRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .copied()
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Job {
    target: Target,
    generation: u64,
    due: Instant,
}

// BinaryHeap is a max-heap; reverse so the earliest job is on top.
impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Job>,
    shutdown: bool,
}

struct Shared {
    runner: Arc<dyn GenerationRunner>,
    lock: GenerationLock,
    debounce: DebounceStore,
    queue: Mutex<Queue>,
    queue_ready: Condvar,
    /// Jobs scheduled but not yet finished.
    outstanding: Mutex<usize>,
    idle: Condvar,
    completed: Mutex<Vec<RunReport>>,
}

impl Shared {
    fn execute(&self, target: &Target) -> Result<RunReport, ScheduleError> {
        let guard = self.lock.acquire()?;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.runner.run(target)));
        drop(guard);
        match result {
            Ok(report) => Ok(report?),
            Err(_) => {
                error!(target = %target, "generation run panicked");
                Err(ScheduleError::Panicked)
            }
        }
    }

    fn finish_job(&self) {
        let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.idle.notify_all();
        }
    }
}

/// Debounces regeneration triggers and runs them one at a time.
pub struct GenerationScheduler {
    shared: Arc<Shared>,
    default_delay: Duration,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl GenerationScheduler {
    /// Start the dispatcher and `config.max_workers` workers.
    pub fn new(runner: Arc<dyn GenerationRunner>, config: &ScheduleConfig, lock_path: impl Into<PathBuf>) -> Self {
        let shared = Arc::new(Shared {
            runner,
            lock: GenerationLock::new(lock_path),
            debounce: DebounceStore::default(),
            queue: Mutex::new(Queue::default()),
            queue_ready: Condvar::new(),
            outstanding: Mutex::new(0),
            idle: Condvar::new(),
            completed: Mutex::new(Vec::new()),
        });

        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..config.max_workers.max(1))
            .map(|_| {
                let shared = Arc::clone(&shared);
                let rx = Arc::clone(&rx);
                thread::spawn(move || worker_loop(&shared, &rx))
            })
            .collect();
        let dispatcher = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || dispatch_loop(&shared, tx))
        };

        Self {
            shared,
            default_delay: Duration::from_secs(config.debounce_secs),
            dispatcher: Some(dispatcher),
            workers,
        }
    }

    /// Queue a run for `target` after `delay` (default: `schedule.debounce_secs`).
    ///
    /// Any earlier request for the same target that has not started yet is
    /// superseded.
    pub fn schedule(&self, target: Target, delay: Option<Duration>) -> GenerationRequest {
        let delay = delay.unwrap_or(self.default_delay);
        let requested_at = Utc::now();
        let run_at = requested_at + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        let record = self.shared.debounce.touch(target, run_at);
        info!(
            event = "schedule.queued",
            target = %target,
            run_at = %run_at.to_rfc3339(),
            generation = record.generation,
            "generation queued"
        );

        *self.shared.outstanding.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        {
            let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.heap.push(Job {
                target,
                generation: record.generation,
                due: Instant::now() + delay,
            });
        }
        self.shared.queue_ready.notify_one();

        GenerationRequest {
            target,
            requested_at,
            run_at,
            debounce: !delay.is_zero(),
        }
    }

    /// Run `target` immediately on the calling thread, still under the lock.
    pub fn run_now(&self, target: Target) -> Result<RunReport, ScheduleError> {
        self.shared.execute(&target)
    }

    /// The pending debounce record for `target`, if a run is still queued.
    pub fn pending(&self, target: &Target) -> Option<DebounceRecord> {
        self.shared.debounce.get(target)
    }

    /// Block until every scheduled job has run or been superseded.
    ///
    /// Returns the reports of runs completed since the previous drain.
    pub fn drain(&self) -> Vec<RunReport> {
        let mut outstanding = self.shared.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        while *outstanding > 0 {
            outstanding = self
                .shared
                .idle
                .wait(outstanding)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(outstanding);
        std::mem::take(&mut *self.shared.completed.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for GenerationScheduler {
    /// Stops the threads. Jobs that are not due yet are discarded.
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.shutdown = true;
            if !queue.heap.is_empty() {
                warn!(discarded = queue.heap.len(), "scheduler stopped with pending jobs");
            }
        }
        self.shared.queue_ready.notify_all();
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Moves due jobs from the heap to the workers. Dropping `tx` on exit stops them.
fn dispatch_loop(shared: &Shared, tx: Sender<Job>) {
    let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        if queue.shutdown {
            return;
        }
        let now = Instant::now();
        match queue.heap.peek().copied() {
            None => {
                queue = shared
                    .queue_ready
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(job) if job.due <= now => {
                queue.heap.pop();
                if tx.send(job).is_err() {
                    return;
                }
            }
            Some(job) => {
                queue = shared
                    .queue_ready
                    .wait_timeout(queue, job.due - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }
    }
}

fn worker_loop(shared: &Shared, rx: &Mutex<Receiver<Job>>) {
    loop {
        let job = {
            let rx = rx.lock().unwrap_or_else(PoisonError::into_inner);
            rx.recv()
        };
        let Ok(job) = job else {
            return;
        };
        if !shared.debounce.claim(&job.target, job.generation) {
            info!(
                event = "schedule.superseded",
                target = %job.target,
                generation = job.generation,
                "skipping superseded generation"
            );
            shared.finish_job();
            continue;
        }
        match shared.execute(&job.target) {
            Ok(report) => shared
                .completed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(report),
            Err(e) => error!(target = %job.target, error = %e, "scheduled generation failed"),
        }
        shared.finish_job();
    }
}
