// Preview coordinator
//
// One tokio task owns every pending job. Callers talk to it through a
// bounded request channel and wait on a oneshot for their outcome.
//
// - Requests for a hash that is queued or in flight only add a waiter.
// - At most `preview_workers` jobs run at once, on the blocking pool.
// - Once more than `preview_queue_limit` jobs are queued the task stops
//   reading requests; senders then wait on the full channel.
// - Shutdown fails queued jobs with `ShuttingDown` and lets running jobs
//   finish and deliver normally.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::GalleryConfig;
use crate::constants::PREVIEW_INBOUND_CAPACITY;
use crate::error::PreviewError;
use crate::hash::short_hash;
use crate::preview::worker::PreviewWorker;

type Outcome = std::result::Result<(), PreviewError>;

struct Request {
    hash: String,
    reply: oneshot::Sender<Outcome>,
}

/// Read-only gauges published by the coordinator task.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    waiters: AtomicUsize,
    completed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub queued: usize,
    pub in_flight: usize,
    pub waiters: usize,
    pub completed: u64,
}

impl CoordinatorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queued: self.queued.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
            waiters: self.waiters.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
        }
    }
}

struct Control {
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the coordinator task. Cheap to clone.
#[derive(Clone)]
pub struct PreviewCoordinator {
    requests: mpsc::Sender<Request>,
    stats: Arc<CoordinatorStats>,
    control: Arc<Control>,
}

impl PreviewCoordinator {
    /// Start the coordinator task. Must be called inside a tokio runtime.
    pub fn spawn(worker: Arc<PreviewWorker>, config: &GalleryConfig) -> Self {
        let (requests, inbound) = mpsc::channel(PREVIEW_INBOUND_CAPACITY);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(CoordinatorStats::default());

        let actor = Actor {
            worker,
            workers: config.preview_workers.max(1),
            queue_limit: config.preview_queue_limit,
            queue: VecDeque::new(),
            waiters: HashMap::new(),
            waiter_count: 0,
            working: 0,
            done_tx,
            stats: Arc::clone(&stats),
        };
        log::info!(
            "Starting preview coordinator ({} workers, queue limit {})",
            actor.workers,
            actor.queue_limit
        );
        let task = tokio::spawn(actor.run(inbound, done_rx, shutdown_rx));

        Self {
            requests,
            stats,
            control: Arc::new(Control {
                shutdown: Mutex::new(Some(shutdown_tx)),
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Wait until previews for `hash` exist, generating them if needed.
    pub async fn request(&self, hash: &str) -> Outcome {
        let (reply, outcome) = oneshot::channel();
        let request = Request { hash: hash.to_string(), reply };
        if self.requests.send(request).await.is_err() {
            return Err(PreviewError::ShuttingDown);
        }
        // A dropped reply sender means the task went away without answering
        outcome.await.unwrap_or(Err(PreviewError::ShuttingDown))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting requests, fail queued jobs, and wait for running jobs.
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        let signal = self.control.shutdown.lock().ok().and_then(|mut s| s.take());
        if let Some(signal) = signal {
            let _ = signal.send(());
        }

        let task = self.control.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("Preview coordinator task failed: {}", e);
            }
        }
    }
}

struct Actor {
    worker: Arc<PreviewWorker>,
    workers: usize,
    queue_limit: usize,
    /// Hashes waiting for a worker, in arrival order
    queue: VecDeque<String>,
    /// Waiters per queued or running hash
    waiters: HashMap<String, Vec<oneshot::Sender<Outcome>>>,
    waiter_count: usize,
    working: usize,
    done_tx: mpsc::UnboundedSender<(String, Outcome)>,
    stats: Arc<CoordinatorStats>,
}

impl Actor {
    async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Request>,
        mut done_rx: mpsc::UnboundedReceiver<(String, Outcome)>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some((hash, outcome)) = done_rx.recv() => {
                    self.finish_job();
                    self.deliver(&hash, outcome);
                    self.dispatch();
                }
                // Fires on an explicit shutdown and when every handle is dropped
                _ = &mut shutdown_rx => break,
                request = inbound.recv(), if self.queue.len() <= self.queue_limit => {
                    match request {
                        Some(request) => self.accept(request),
                        None => break,
                    }
                }
            }
            self.publish();
        }

        log::info!(
            "Preview coordinator shutting down ({} queued, {} running)",
            self.queue.len(),
            self.working
        );

        inbound.close();
        while let Some(hash) = self.queue.pop_front() {
            self.deliver(&hash, Err(PreviewError::ShuttingDown));
        }
        while let Ok(request) = inbound.try_recv() {
            let _ = request.reply.send(Err(PreviewError::ShuttingDown));
        }
        self.publish();

        while self.working > 0 {
            match done_rx.recv().await {
                Some((hash, outcome)) => {
                    self.finish_job();
                    self.deliver(&hash, outcome);
                    self.publish();
                }
                None => break,
            }
        }

        log::info!("Preview coordinator stopped");
    }

    fn accept(&mut self, request: Request) {
        self.waiter_count += 1;
        if let Some(waiters) = self.waiters.get_mut(&request.hash) {
            log::debug!("Joining pending preview job for {}", short_hash(&request.hash));
            waiters.push(request.reply);
            return;
        }

        self.waiters.insert(request.hash.clone(), vec![request.reply]);
        self.queue.push_back(request.hash);
        self.dispatch();
    }

    fn dispatch(&mut self) {
        while self.working < self.workers {
            let Some(hash) = self.queue.pop_front() else {
                break;
            };
            self.working += 1;

            let worker = Arc::clone(&self.worker);
            let done = self.done_tx.clone();
            tokio::spawn(async move {
                let job_hash = hash.clone();
                let joined = tokio::task::spawn_blocking(move || worker.run(&job_hash)).await;
                let outcome = match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(PreviewError::Failed {
                        hash: hash.clone(),
                        message: e.to_string(),
                    }),
                    Err(e) => Err(PreviewError::Failed {
                        hash: hash.clone(),
                        message: format!("worker panicked: {}", e),
                    }),
                };
                let _ = done.send((hash, outcome));
            });
        }
    }

    fn finish_job(&mut self) {
        self.working -= 1;
        self.stats.completed.fetch_add(1, Ordering::AcqRel);
    }

    /// Hand one outcome to every waiter of `hash` and forget the job.
    fn deliver(&mut self, hash: &str, outcome: Outcome) {
        if let Err(e) = &outcome {
            if *e != PreviewError::ShuttingDown {
                log::warn!("{}", e);
            }
        }

        let Some(waiters) = self.waiters.remove(hash) else {
            return;
        };
        self.waiter_count -= waiters.len();
        for waiter in waiters {
            // Receiver gone means the caller stopped waiting
            let _ = waiter.send(outcome.clone());
        }
    }

    fn publish(&self) {
        self.stats.queued.store(self.queue.len(), Ordering::Release);
        self.stats.in_flight.store(self.working, Ordering::Release);
        self.stats.waiters.store(self.waiter_count, Ordering::Release);
    }
}
