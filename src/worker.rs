//! The background frame-processing loop.
//!
//! The worker owns the frame source and the active chain. It talks to the
//! rest of the program only through two single-slot mailboxes:
//!
//! * `pending`: the next chain, written by `set_chain`, taken by the loop at
//!   the top of an iteration;
//! * `latest`: the last processed frame and its keypoints, replaced after
//!   every chain pass.
//!
//! Both slots are swapped as whole `Arc`s, so a reader sees either the old
//! or the new value and never blocks the loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arc_swap::{ArcSwap, ArcSwapOption};
use tracing::{debug, info, warn};

use crate::camera::{self, DeviceId, FrameSource, SourceOptions};
use crate::error::VisionError;
use crate::pipeline::Chain;
use crate::registry::AlgorithmRegistry;
use crate::types::Published;

#[derive(Default)]
struct Shared {
    pending: ArcSwapOption<Chain>,
    latest: ArcSwapOption<Published>,
    active: ArcSwap<Vec<String>>,
    stop: AtomicBool,
    stats: WorkerStats,
}

#[derive(Default)]
struct WorkerStats {
    frames_read: AtomicU64,
    empty_reads: AtomicU64,
    published: AtomicU64,
    stage_faults: AtomicU64,
    chain_swaps: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_read: u64,
    pub empty_reads: u64,
    pub published: u64,
    pub stage_faults: u64,
    pub chain_swaps: u64,
}

impl WorkerStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_read: self.frames_read.load(Ordering::Relaxed),
            empty_reads: self.empty_reads.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            stage_faults: self.stage_faults.load(Ordering::Relaxed),
            chain_swaps: self.chain_swaps.load(Ordering::Relaxed),
        }
    }
}

pub struct PipelineWorker {
    shared: Arc<Shared>,
    registry: Arc<AlgorithmRegistry>,
    handle: Option<JoinHandle<()>>,
    source_name: String,
    resolution: (u32, u32),
}

impl PipelineWorker {
    /// Start the worker thread and open the source on it with `open`.
    ///
    /// Returns once the source is open; an open failure is returned here and
    /// no thread is left behind. The loop starts with an empty chain.
    pub fn spawn<F>(registry: Arc<AlgorithmRegistry>, open: F) -> Result<Self, VisionError>
    where
        F: FnOnce() -> Result<Box<dyn FrameSource>, VisionError> + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let loop_shared = shared.clone();

        let handle = thread::Builder::new()
            .name("pipeline-worker".to_string())
            .spawn(move || {
                let mut source = match open() {
                    Ok(source) => source,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok((source.name(), source.resolution())));
                run_loop(&loop_shared, source.as_mut());
                source.close();
                debug!("pipeline worker exited");
            })
            .map_err(|e| VisionError::device("pipeline worker", format!("cannot start thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok((source_name, resolution))) => {
                info!(source = %source_name, "pipeline worker started");
                Ok(Self {
                    shared,
                    registry,
                    handle: Some(handle),
                    source_name,
                    resolution,
                })
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(VisionError::device("pipeline worker", "source open aborted"))
            }
        }
    }

    /// Start on an already opened source.
    pub fn start(
        registry: Arc<AlgorithmRegistry>,
        source: Box<dyn FrameSource + Send>,
    ) -> Result<Self, VisionError> {
        Self::spawn(registry, move || Ok(source as Box<dyn FrameSource>))
    }

    /// Open `id` on the worker thread and start processing.
    pub fn open_device(
        registry: Arc<AlgorithmRegistry>,
        id: &DeviceId,
        options: SourceOptions,
    ) -> Result<Self, VisionError> {
        let id = id.clone();
        Self::spawn(registry, move || camera::open(&id, &options))
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn registry(&self) -> &Arc<AlgorithmRegistry> {
        &self.registry
    }

    /// Queue a new chain built from `names`. Names that do not resolve are
    /// dropped from the chain and returned. Takes effect at the start of the
    /// worker's next iteration; the frame in flight finishes on the old chain.
    pub fn set_chain<S: AsRef<str>>(&self, names: &[S]) -> Vec<VisionError> {
        let mut stages = Vec::with_capacity(names.len());
        let mut skipped = Vec::new();
        for name in names {
            match self.registry.resolve(name.as_ref()) {
                Ok(unit) => stages.push(unit),
                Err(err) => {
                    warn!(%err, "chain entry skipped");
                    skipped.push(err);
                }
            }
        }

        let chain = Chain::new(stages);
        debug!(?chain, "chain replacement queued");
        self.shared.pending.store(Some(Arc::new(chain)));
        skipped
    }

    /// Names of the chain the loop is currently running.
    pub fn chain_names(&self) -> Vec<String> {
        self.shared.active.load().to_vec()
    }

    /// Most recent published result, if any frame has been processed yet.
    pub fn latest(&self) -> Option<Arc<Published>> {
        self.shared.latest.load_full()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Ask the loop to exit after its current iteration.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop and wait for the thread; the source is closed when this returns.
    pub fn join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("pipeline worker panicked");
            }
            let stats = self.stats();
            info!(
                frames = stats.frames_read,
                published = stats.published,
                faults = stats.stage_faults,
                "pipeline worker stopped"
            );
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_loop(shared: &Shared, source: &mut dyn FrameSource) {
    let stats = &shared.stats;
    let mut chain = Arc::new(Chain::default());
    let mut sequence = 0u64;

    while !shared.stop.load(Ordering::Acquire) {
        if let Some(next) = shared.pending.swap(None) {
            debug!(chain = ?next, "chain swapped in");
            shared.active.store(Arc::new(next.names()));
            chain = next;
            stats.chain_swaps.fetch_add(1, Ordering::Relaxed);
        }

        let Some(frame) = source.get_frame() else {
            stats.empty_reads.fetch_add(1, Ordering::Relaxed);
            thread::yield_now();
            continue;
        };
        sequence += 1;
        stats.frames_read.fetch_add(1, Ordering::Relaxed);

        let pass = chain.apply(frame);
        if !pass.faults.is_empty() {
            stats
                .stage_faults
                .fetch_add(pass.faults.len() as u64, Ordering::Relaxed);
        }

        // Counted first so a reader that sees the result also sees the count.
        stats.published.fetch_add(1, Ordering::Relaxed);
        shared.latest.store(Some(Arc::new(Published {
            sequence,
            frame: pass.frame,
            keypoints: pass.auxiliary.into_keypoints(),
        })));
    }
}
