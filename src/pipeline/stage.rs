//! Single-purpose worker stages over bounded channels.
//!
//! Per PIPELINE.md:
//! - §1 each stage owns its worker threads; stages share no mutable state
//! - §2 all work from one source routes to one fixed partition, so
//!   per-source ordering is preserved end to end
//! - §3 channels are bounded; a full partition blocks the producer
//!   (backpressure), it never drops or reorders

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};

use super::errors::{PipelineError, PipelineResult};

/// Processes one unit of work. Implementations run on stage workers.
pub trait StageHandler<T>: Send + Sync + 'static {
    fn handle(&self, item: T);
}

impl<T, F> StageHandler<T> for F
where
    F: Fn(T) + Send + Sync + 'static,
{
    fn handle(&self, item: T) {
        self(item)
    }
}

/// One pipeline stage: N workers, each with its own bounded queue.
pub struct Stage<T> {
    name: String,
    senders: Vec<Sender<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> Stage<T> {
    /// Spawn a stage with `worker_count` workers and per-worker queue
    /// capacity `capacity`.
    pub fn spawn(
        name: impl Into<String>,
        worker_count: usize,
        capacity: usize,
        handler: Arc<dyn StageHandler<T>>,
    ) -> PipelineResult<Stage<T>> {
        let name = name.into();
        let worker_count = worker_count.max(1);
        let mut senders = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let (sender, receiver) = bounded::<T>(capacity.max(1));
            let handler = Arc::clone(&handler);
            let thread_name = format!("{}-{}", name, index);
            let handle = thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    while let Ok(item) = receiver.recv() {
                        handler.handle(item);
                    }
                })
                .map_err(|_| PipelineError::SpawnFailed(name.clone()))?;
            senders.push(sender);
            workers.push(handle);
        }

        Ok(Stage {
            name,
            senders,
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Enqueue one item. Items sharing a `source_key` land on the same
    /// worker and are processed in dispatch order. Blocks when the target
    /// partition is full.
    pub fn dispatch(&self, source_key: u64, item: T) -> PipelineResult<()> {
        let partition = (source_key % self.senders.len() as u64) as usize;
        self.senders[partition]
            .send(item)
            .map_err(|_| PipelineError::Closed(self.name.clone()))
    }

    /// Close the intake and wait for workers to drain their queues.
    pub fn shutdown(self) {
        drop(self.senders);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}
