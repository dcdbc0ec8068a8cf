//! Eviction Dispatch Module
//!
//! Background worker that runs eviction callbacks, expiration sweeps and
//! compaction off the caller's thread. Jobs travel over a bounded crossbeam
//! channel; when the queue is full the work runs inline instead.

use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::cache::entry::CacheEntry;
use crate::cache::store::CacheInner;

pub(crate) enum DispatchJob<V> {
    /// Run the callbacks of already evicted entries.
    Callbacks(Vec<Arc<CacheEntry<V>>>),
    /// Evict every entry whose expiration has passed.
    ScanExpired,
    /// Relieve capacity pressure.
    Compact,
}

pub(crate) struct EvictionDispatcher<V> {
    sender: Option<Sender<DispatchJob<V>>>,
}

impl<V> EvictionDispatcher<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Spawns the worker thread. If the thread cannot be spawned every job runs inline.
    pub(crate) fn start(cache: Weak<CacheInner<V>>, capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        let spawned = thread::Builder::new()
            .name("linkcache-dispatch".to_string())
            .spawn(move || run_worker(cache, receiver));

        match spawned {
            Ok(_) => Self {
                sender: Some(sender),
            },
            Err(err) => {
                warn!(error = %err, "failed to spawn eviction dispatcher, callbacks run inline");
                Self { sender: None }
            }
        }
    }

    /// Queues callbacks for evicted entries.
    pub(crate) fn dispatch_callbacks(&self, entries: Vec<Arc<CacheEntry<V>>>) {
        if entries.is_empty() {
            return;
        }
        if let Err(job) = self.try_submit(DispatchJob::Callbacks(entries)) {
            warn!("eviction dispatch queue saturated, delivering callbacks inline");
            if let DispatchJob::Callbacks(entries) = job {
                invoke_all(&entries);
            }
        }
    }

    /// Queues a sweep or compaction. Returns the job back if it could not be queued.
    pub(crate) fn try_submit(&self, job: DispatchJob<V>) -> Result<(), DispatchJob<V>> {
        let Some(sender) = &self.sender else {
            return Err(job);
        };
        sender.try_send(job).map_err(|err| match err {
            TrySendError::Full(job) | TrySendError::Disconnected(job) => job,
        })
    }
}

/// Runs the callbacks of each entry in order.
pub(crate) fn invoke_all<V>(entries: &[Arc<CacheEntry<V>>]) {
    for entry in entries {
        entry.invoke_eviction_callbacks();
    }
}

fn run_worker<V>(cache: Weak<CacheInner<V>>, receiver: Receiver<DispatchJob<V>>)
where
    V: Clone + Send + Sync + 'static,
{
    info!("eviction dispatcher started");

    for job in receiver.iter() {
        match job {
            DispatchJob::Callbacks(entries) => invoke_all(&entries),
            DispatchJob::ScanExpired => {
                let Some(inner) = cache.upgrade() else {
                    continue;
                };
                let evicted = inner.remove_expired(inner.now());
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "background scan evicted expired entries");
                }
                invoke_all(&evicted);
            }
            DispatchJob::Compact => {
                let Some(inner) = cache.upgrade() else {
                    continue;
                };
                let evicted = inner.compact_to_size_limit();
                invoke_all(&evicted);
            }
        }
    }

    info!("eviction dispatcher stopped");
}
