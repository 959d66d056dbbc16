//! Per-aggregate reader/writer locking
//!
//! Every aggregate gets a pool of `max_readers` permits plus a separate
//! writer gate:
//!
//! - A reader takes one permit and gives exactly one back.
//! - A writer takes the gate, drains the pool one permit at a time until it
//!   holds all of them, then lets go of the gate. Holding every permit keeps
//!   readers and other writers out until it returns the whole pool.
//!
//! The gate only serializes writer admission. Without it two writers could
//! each drain half of the pool and wait on each other forever.
//!
//! The pool is process-local. To coordinate with other processes sharing the
//! same root, each guard additionally holds an advisory lock on the
//! aggregate's `.lock` file: shared for readers, exclusive for writers. There
//! is no fairness between waiting readers and writers.
//!
//! The reader bound is per process. Shared file locks admit any number of
//! readers, so with P processes up to P * `max_readers` readers can hold an
//! aggregate at once. Writer exclusion holds across all of them.

use crate::error::{QuireError, Result};
use crate::observe;
use crate::path::PathResolver;
use crate::types::AggregateId;
use dashmap::DashMap;
use fs2::FileExt;
use parking_lot::{Condvar, Mutex};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default number of concurrent readers per aggregate
pub const DEFAULT_MAX_READERS: usize = 10;

const MIN_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(50);

type LockTable = DashMap<AggregateId, Arc<AggregateLock>>;

/// Counting semaphore over a parking_lot mutex and condvar
struct PermitPool {
    available: Mutex<usize>,
    freed: Condvar,
}

impl PermitPool {
    fn new(capacity: usize) -> Self {
        Self {
            available: Mutex::new(capacity),
            freed: Condvar::new(),
        }
    }

    /// Take one permit. Returns false if the deadline passed first.
    fn acquire(&self, deadline: Option<Instant>) -> bool {
        let mut available = self.available.lock();
        while *available == 0 {
            match deadline {
                None => self.freed.wait(&mut available),
                Some(deadline) => {
                    if self.freed.wait_until(&mut available, deadline).timed_out() && *available == 0 {
                        return false;
                    }
                }
            }
        }
        *available -= 1;
        true
    }

    fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut available = self.available.lock();
        *available += count;
        drop(available);
        if count == 1 {
            self.freed.notify_one();
        } else {
            self.freed.notify_all();
        }
    }

    fn available(&self) -> usize {
        *self.available.lock()
    }
}

struct AggregateLock {
    permits: PermitPool,
    writer_gate: Mutex<()>,
}

impl AggregateLock {
    /// Writer admission: take the gate, then every permit one by one.
    ///
    /// On timeout the permits taken so far go back to the pool.
    fn drain(&self, count: usize, deadline: Option<Instant>) -> bool {
        let gate = match deadline {
            None => self.writer_gate.lock(),
            Some(deadline) => match self.writer_gate.try_lock_until(deadline) {
                Some(gate) => gate,
                None => return false,
            },
        };

        let mut taken = 0;
        while taken < count {
            if !self.permits.acquire(deadline) {
                self.permits.release(taken);
                return false;
            }
            taken += 1;
        }
        drop(gate);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileLockMode {
    Shared,
    Exclusive,
}

/// Lock manager handing out per-aggregate read and write guards
pub struct LockManager {
    table: Arc<LockTable>,
    max_readers: usize,
    timeout: Option<Duration>,
    lock_files: Option<PathResolver>,
}

impl LockManager {
    /// Create a process-local lock manager.
    ///
    /// # Panics
    ///
    /// Panics if `max_readers` is 0.
    pub fn new(max_readers: usize, timeout: Option<Duration>) -> Self {
        assert!(max_readers > 0, "max_readers must be positive");
        Self {
            table: Arc::new(DashMap::new()),
            max_readers,
            timeout,
            lock_files: None,
        }
    }

    /// Also take advisory file locks next to each aggregate's log so other
    /// processes using the same root are excluded too.
    pub fn with_lock_files(mut self, resolver: PathResolver) -> Self {
        self.lock_files = Some(resolver);
        self
    }

    pub fn max_readers(&self) -> usize {
        self.max_readers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Free read permits for an aggregate in this process
    pub fn available_permits(&self, id: &AggregateId) -> usize {
        self.table
            .get(id)
            .map(|lock| lock.permits.available())
            .unwrap_or(self.max_readers)
    }

    fn entry(&self, id: &AggregateId) -> Arc<AggregateLock> {
        self.table
            .entry(*id)
            .or_insert_with(|| {
                Arc::new(AggregateLock {
                    permits: PermitPool::new(self.max_readers),
                    writer_gate: Mutex::new(()),
                })
            })
            .clone()
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|timeout| Instant::now() + timeout)
    }

    fn timeout_error(&self, id: &AggregateId) -> QuireError {
        let timeout_ms = self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        tracing::warn!(aggregate_id = %id, timeout_ms, "lock acquisition timed out");
        QuireError::LockTimeout {
            aggregate_id: *id,
            timeout_ms,
        }
    }

    /// Take one read permit, blocking while all are in use.
    ///
    /// The permit is returned when the guard is dropped.
    pub fn acquire_read(&self, id: &AggregateId) -> Result<ReadGuard> {
        let started = Instant::now();
        let deadline = self.deadline();
        let lock = self.entry(id);

        if !lock.permits.acquire(deadline) {
            prune(&self.table, id, lock);
            return Err(self.timeout_error(id));
        }

        let mut held = Held {
            table: Arc::clone(&self.table),
            id: *id,
            lock,
            permits: 1,
            file: None,
        };
        if let Some(resolver) = &self.lock_files {
            // on failure `held` drops and gives the permit back
            held.file = Some(self.lock_file(id, &resolver.lock_path(id), FileLockMode::Shared, deadline)?);
        }

        observe::record_lock_wait(started.elapsed(), "read");
        tracing::trace!(aggregate_id = %id, "read lock acquired");
        Ok(ReadGuard { _held: held })
    }

    /// Take every permit of the aggregate, blocking until no reader or
    /// writer holds any.
    pub fn acquire_write(&self, id: &AggregateId) -> Result<WriteGuard> {
        let started = Instant::now();
        let deadline = self.deadline();
        let lock = self.entry(id);

        if !lock.drain(self.max_readers, deadline) {
            prune(&self.table, id, lock);
            return Err(self.timeout_error(id));
        }

        let mut held = Held {
            table: Arc::clone(&self.table),
            id: *id,
            lock,
            permits: self.max_readers,
            file: None,
        };
        if let Some(resolver) = &self.lock_files {
            held.file = Some(self.lock_file(id, &resolver.lock_path(id), FileLockMode::Exclusive, deadline)?);
        }

        observe::record_lock_wait(started.elapsed(), "write");
        tracing::trace!(aggregate_id = %id, "write lock acquired");
        Ok(WriteGuard { _held: held })
    }

    fn lock_file(
        &self,
        id: &AggregateId,
        path: &Path,
        mode: FileLockMode,
        deadline: Option<Instant>,
    ) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| QuireError::storage(*id, "open lock file", e))?;

        let Some(deadline) = deadline else {
            let locked = match mode {
                FileLockMode::Shared => FileExt::lock_shared(&file),
                FileLockMode::Exclusive => FileExt::lock_exclusive(&file),
            };
            locked.map_err(|e| QuireError::storage(*id, "lock file", e))?;
            return Ok(file);
        };

        let mut backoff = MIN_BACKOFF;
        loop {
            let attempt = match mode {
                FileLockMode::Shared => FileExt::try_lock_shared(&file),
                FileLockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => return Ok(file),
                Err(e) if is_contended(&e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(self.timeout_error(id));
                    }
                    std::thread::sleep(backoff.min(deadline - now));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(QuireError::storage(*id, "lock file", e)),
            }
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Drop the table entry once nobody but the table references it
fn prune(table: &LockTable, id: &AggregateId, lock: Arc<AggregateLock>) {
    drop(lock);
    table.remove_if(id, |_, entry| Arc::strong_count(entry) == 1);
}

/// Permits and file lock owned by a guard
struct Held {
    table: Arc<LockTable>,
    id: AggregateId,
    lock: Arc<AggregateLock>,
    permits: usize,
    file: Option<File>,
}

impl Drop for Held {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!(aggregate_id = %self.id, error = %e, "failed to unlock lock file");
            }
        }
        self.lock.permits.release(self.permits);
        // The entry is only removable when the table holds the sole other reference.
        self.table
            .remove_if(&self.id, |_, entry| Arc::strong_count(entry) == 2);
    }
}

/// One read permit on an aggregate. Released on drop.
#[must_use = "the read permit is released as soon as the guard is dropped"]
pub struct ReadGuard {
    _held: Held,
}

impl ReadGuard {
    /// Return the permit now
    pub fn release(self) {}
}

/// Exclusive access to an aggregate. Released on drop.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard {
    _held: Held,
}

impl WriteGuard {
    /// Return every permit now
    pub fn release(self) {}
}
