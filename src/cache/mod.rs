//! Index cache: lazy materialization and write-back consistency.
//!
//! [`IndexCache`] owns the process's [`VectorIndex`] and its local on-disk
//! serialized copy. It materializes the index from the remote store on
//! first use (exactly once, no matter how many callers race the cold
//! start), serves searches and appends against the in-memory copy with
//! read-your-writes consistency, and pushes full-snapshot write-backs to
//! the remote store from a single background worker.
//!
//! The remote copy may lag the in-memory index by one or more appends at
//! any time; that staleness window is accepted and bounded only by
//! "eventually written back". The in-memory index stays authoritative for
//! reads regardless of write-back outcome.

use std::path::PathBuf;
use std::sync::mpsc::{self, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use tracing::{debug, info, warn};

use crate::index::VectorIndex;
use crate::models::Embedding;
use crate::remote::RemoteIndexStore;
use crate::{Error, Result};

/// Observable lifecycle state of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No initialization attempt has happened yet.
    Uninitialized,
    /// The index is loaded and serving.
    Ready,
    /// The last initialization attempt failed; sticky until [`IndexCache::reset`].
    Failed,
}

/// Internal init state; `Failed` keeps the rendered cause for re-raising.
enum InitState {
    Uninitialized,
    Ready,
    Failed(String),
}

struct CacheInner {
    /// Embedding dimensions the index must carry.
    dimensions: usize,
    /// Local staging path for the serialized index.
    local_path: PathBuf,
    /// Fixed key of the canonical blob in the remote store.
    remote_key: String,
    /// Durable remote copy; source of truth at cold start.
    remote: Arc<dyn RemoteIndexStore>,
    /// Initialization critical section. Held across the remote fetch so
    /// concurrent cold-start callers wait for one outcome instead of
    /// racing into duplicate downloads.
    state: Mutex<InitState>,
    /// The index itself. Searches share the read side; appends and
    /// snapshot serialization take their respective sides exclusively.
    index: RwLock<Option<VectorIndex>>,
}

impl CacheInner {
    /// Loads the index: local file fast path, remote fetch slow path.
    fn materialize(&self) -> Result<VectorIndex> {
        let index = match VectorIndex::load(&self.local_path) {
            Ok(index) => {
                info!(path = %self.local_path.display(), vectors = index.len(), "loaded index from local copy");
                index
            }
            Err(Error::NotFound(_)) => {
                info!(key = %self.remote_key, "no local index copy, fetching from remote store");
                let bytes = self.remote.fetch(&self.remote_key)?;
                let index = VectorIndex::from_bytes(&bytes)?;

                // Stage the canonical bytes locally so the next cold start
                // skips the network entirely.
                if let Some(parent) = self.local_path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                        operation: "create_index_dir".to_string(),
                        cause: e.to_string(),
                    })?;
                }
                std::fs::write(&self.local_path, &bytes).map_err(|e| Error::OperationFailed {
                    operation: "stage_index_locally".to_string(),
                    cause: e.to_string(),
                })?;

                info!(vectors = index.len(), "materialized index from remote store");
                index
            }
            // A corrupt local file is surfaced, never papered over with an
            // empty index or a silent re-fetch.
            Err(e) => return Err(e),
        };

        if index.dimensions() != self.dimensions {
            return Err(Error::CorruptIndex(format!(
                "index carries {} dimensions, deployment expects {}",
                index.dimensions(),
                self.dimensions
            )));
        }
        Ok(index)
    }

    /// Serializes the current snapshot and writes it local-first, then to
    /// the remote store. Local durable state is never dropped before the
    /// remote write succeeds, so retry is always possible from local state.
    fn persist_snapshot(&self) -> Result<()> {
        let bytes = {
            let guard = read_lock(&self.index)?;
            let Some(index) = guard.as_ref() else {
                // Nothing materialized yet; nothing to persist.
                return Ok(());
            };
            index.to_bytes()?
        };

        std::fs::write(&self.local_path, &bytes).map_err(|e| Error::OperationFailed {
            operation: "write_local_index".to_string(),
            cause: e.to_string(),
        })?;

        self.remote.store(&self.remote_key, &bytes)?;
        debug!(bytes = bytes.len(), key = %self.remote_key, "index snapshot written back");
        Ok(())
    }
}

/// Concurrency-safe cache around the process's vector index.
///
/// One instance per process; instances in different processes converge
/// only through the shared remote store and their own cold-start reloads.
pub struct IndexCache {
    inner: Arc<CacheInner>,
    /// Capacity-1 signal channel to the write-back worker. A pending
    /// signal already covers any append that happens before the worker
    /// snapshots, so bursts coalesce into one write.
    persist_tx: Option<mpsc::SyncSender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl IndexCache {
    /// Creates a cache in the `Uninitialized` state and starts its
    /// write-back worker. No I/O happens until first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new(
        dimensions: usize,
        local_path: impl Into<PathBuf>,
        remote_key: impl Into<String>,
        remote: Arc<dyn RemoteIndexStore>,
    ) -> Result<Self> {
        let inner = Arc::new(CacheInner {
            dimensions,
            local_path: local_path.into(),
            remote_key: remote_key.into(),
            remote,
            state: Mutex::new(InitState::Uninitialized),
            index: RwLock::new(None),
        });

        let (persist_tx, persist_rx) = mpsc::sync_channel::<()>(1);
        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("index-writeback".to_string())
            .spawn(move || {
                while persist_rx.recv().is_ok() {
                    if let Err(e) = worker_inner.persist_snapshot() {
                        // The in-memory index stays authoritative; the next
                        // mutation schedules another attempt.
                        warn!(error = %e, "background index write-back failed, remote copy is stale");
                    }
                }
            })
            .map_err(|e| Error::OperationFailed {
                operation: "spawn_writeback_worker".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            inner,
            persist_tx: Some(persist_tx),
            worker: Some(worker),
        })
    }

    /// Initializes the cache if it has not been initialized yet.
    ///
    /// Fast path when `Ready`. On a cold cache, loads the local serialized
    /// copy if present, otherwise fetches the canonical blob from the
    /// remote store and stages it locally. Callers that arrive while
    /// initialization is in flight block for its single outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] carrying the recorded cause. A failure
    /// is sticky: every subsequent call re-raises it until [`Self::reset`]
    /// permits a new attempt. There is no automatic retry; under a
    /// sustained remote outage that would only stack unbounded latency
    /// onto every request.
    pub fn ensure_ready(&self) -> Result<()> {
        let mut state = lock(&self.inner.state)?;
        match &*state {
            InitState::Ready => Ok(()),
            InitState::Failed(cause) => Err(Error::NotReady {
                cause: cause.clone(),
            }),
            InitState::Uninitialized => match self.inner.materialize() {
                Ok(index) => {
                    *write_lock(&self.inner.index)? = Some(index);
                    *state = InitState::Ready;
                    Ok(())
                }
                Err(e) => {
                    let cause = e.to_string();
                    warn!(error = %cause, "index initialization failed");
                    *state = InitState::Failed(cause.clone());
                    Err(Error::NotReady { cause })
                }
            },
        }
    }

    /// Searches the k nearest neighbors of `query`.
    ///
    /// The first call after cold start pays initialization latency instead
    /// of failing. Searches run concurrently with each other, but never
    /// concurrently with an in-progress append.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if initialization failed, otherwise the
    /// [`VectorIndex::search`] errors.
    pub fn search(&self, query: &Embedding, k: usize) -> Result<Vec<(f32, usize)>> {
        self.ensure_ready()?;
        let guard = read_lock(&self.inner.index)?;
        let index = guard.as_ref().ok_or_else(not_ready_unmaterialized)?;
        index.search(query, k)
    }

    /// Appends a vector and returns its assigned position.
    ///
    /// The append is visible to subsequent local searches immediately
    /// (read-your-writes within the process). Persistence of the new
    /// snapshot to the remote store is scheduled asynchronously and never
    /// blocks the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if initialization failed, or
    /// [`Error::DimensionMismatch`] for a vector of the wrong width.
    pub fn add(&self, vector: &Embedding) -> Result<usize> {
        self.ensure_ready()?;
        let position = {
            let mut guard = write_lock(&self.inner.index)?;
            let index = guard.as_mut().ok_or_else(not_ready_unmaterialized)?;
            index.add(vector)?
        };
        self.schedule_persist();
        Ok(position)
    }

    /// Number of vectors currently held; also the next position to be
    /// assigned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if initialization failed.
    pub fn len(&self) -> Result<usize> {
        self.ensure_ready()?;
        let guard = read_lock(&self.inner.index)?;
        Ok(guard.as_ref().map_or(0, VectorIndex::len))
    }

    /// Returns `true` if the index holds no vectors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if initialization failed.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Current lifecycle state, for observability and operator tooling.
    #[must_use]
    pub fn state(&self) -> CacheState {
        match self.inner.state.lock() {
            Ok(guard) => match &*guard {
                InitState::Uninitialized => CacheState::Uninitialized,
                InitState::Ready => CacheState::Ready,
                InitState::Failed(_) => CacheState::Failed,
            },
            Err(_) => CacheState::Failed,
        }
    }

    /// Clears a sticky failure so the next request re-attempts
    /// initialization. Retry is a caller-driven decision; the cache never
    /// retries on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn reset(&self) -> Result<()> {
        let mut state = lock(&self.inner.state)?;
        if matches!(&*state, InitState::Failed(_)) {
            info!("clearing failed cache state for re-initialization");
            *state = InitState::Uninitialized;
            *write_lock(&self.inner.index)? = None;
        }
        Ok(())
    }

    /// Synchronously persists the current snapshot, local file first, then
    /// the remote store.
    ///
    /// Request paths never call this; it exists for operator tooling and
    /// orderly shutdown, where "eventually written back" needs an explicit
    /// "now".
    ///
    /// # Errors
    ///
    /// Returns the underlying serialization, filesystem, or remote errors.
    pub fn flush(&self) -> Result<()> {
        self.inner.persist_snapshot()
    }

    /// Signals the write-back worker. A full queue means a persist is
    /// already pending that will cover this mutation's state.
    fn schedule_persist(&self) {
        if let Some(tx) = &self.persist_tx {
            match tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Disconnected(())) => {
                    warn!("write-back worker is gone, remote copy will go stale");
                }
            }
        }
    }
}

impl Drop for IndexCache {
    fn drop(&mut self) {
        // Close the channel, then wait for the worker to drain any pending
        // persist so shutdown does not lose the last append.
        self.persist_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn not_ready_unmaterialized() -> Error {
    Error::NotReady {
        cause: "index not materialized".to_string(),
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> Result<std::sync::MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| Error::OperationFailed {
        operation: "lock_cache_state".to_string(),
        cause: "state lock poisoned".to_string(),
    })
}

fn read_lock<'a, T>(lock: &'a RwLock<T>) -> Result<std::sync::RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| Error::OperationFailed {
        operation: "lock_index_read".to_string(),
        cause: "index lock poisoned".to_string(),
    })
}

fn write_lock<'a, T>(lock: &'a RwLock<T>) -> Result<std::sync::RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| Error::OperationFailed {
        operation: "lock_index_write".to_string(),
        cause: "index lock poisoned".to_string(),
    })
}
