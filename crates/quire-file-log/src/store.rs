use crate::codec::{self, HEADER_LEN};
use quire_core::{
    error::{QuireError, Result},
    event_store::{EventStore, EventStream, LogStatus},
    lock_manager::{LockManager, ReadGuard},
    observe,
    path::PathResolver,
    AggregateId, AppendRequest, StoreConfig, StoredEvent, SyncMode, Version,
};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::time::Instant;

/// File-based event store: one append-only log file per aggregate
///
/// Appends write the new record lines after the committed records first and
/// only then rewrite the version header, so the header never describes
/// records that are not fully on disk. Readers stop at the header's version,
/// which makes any bytes left behind by an interrupted append invisible; the
/// next append truncates them.
pub struct FileEventStore {
    config: StoreConfig,
    paths: PathResolver,
    locks: LockManager,
}

/// Where the committed part of a log file ends
#[derive(Debug, Clone, Copy)]
struct Committed {
    version: Version,
    header_len: u64,
    end: u64,
}

impl FileEventStore {
    /// Open or create a file-based event store
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.root)?;

        let paths = PathResolver::new(config.root.clone());
        let mut locks = LockManager::new(config.max_readers, config.lock_timeout());
        if config.cross_process_locks {
            locks = locks.with_lock_files(paths.clone());
        }

        tracing::debug!(
            root = %config.root.display(),
            max_readers = config.max_readers,
            cross_process = config.cross_process_locks,
            "opened file event store"
        );

        Ok(Self {
            config,
            paths,
            locks,
        })
    }

    /// Open a store at `root` with default settings
    pub fn open_at(root: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::open(StoreConfig::new(root))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Whether the aggregate has a log file yet
    pub fn exists(&self, id: &AggregateId) -> bool {
        self.paths.resolve(id).is_file()
    }

    /// Inspect an aggregate's log file under a read lock
    pub fn status(&self, id: &AggregateId) -> Result<LogStatus> {
        let path = self.paths.resolve(id);
        if !path.is_file() {
            return Ok(LogStatus {
                path,
                exists: false,
                version: 0,
                committed_bytes: 0,
                uncommitted_bytes: 0,
            });
        }

        let _guard = self.locks.acquire_read(id)?;
        let file = File::open(&path).map_err(|e| QuireError::storage(*id, "open", e))?;
        let len = file
            .metadata()
            .map_err(|e| QuireError::storage(*id, "stat", e))?
            .len();
        let committed = scan_committed(&file, id)?.unwrap_or(Committed {
            version: 0,
            header_len: 0,
            end: 0,
        });

        Ok(LogStatus {
            path,
            exists: true,
            version: committed.version,
            committed_bytes: committed.end,
            uncommitted_bytes: len.saturating_sub(committed.end),
        })
    }

    fn sync(&self, file: &File, id: &AggregateId) -> Result<()> {
        let synced = match self.config.sync_mode {
            SyncMode::Full => file.sync_all(),
            SyncMode::Data => file.sync_data(),
            SyncMode::None => Ok(()),
        };
        synced.map_err(|e| QuireError::storage(*id, "sync", e))
    }

    fn check_expected(&self, id: &AggregateId, expected: Version, stored: Version) -> Result<()> {
        if stored > expected {
            observe::record_conflict();
            tracing::debug!(aggregate_id = %id, expected, stored, "append rejected: concurrency conflict");
            return Err(QuireError::ConcurrencyConflict {
                aggregate_id: *id,
                expected_version: expected,
                actual_version: stored,
            });
        }
        if stored < expected {
            observe::record_version_ahead();
            tracing::debug!(aggregate_id = %id, expected, stored, "append rejected: expected version ahead of log");
            return Err(QuireError::VersionAhead {
                aggregate_id: *id,
                expected_version: expected,
                stored_version: stored,
            });
        }
        Ok(())
    }
}

impl EventStore for FileEventStore {
    fn read_all_since(&self, id: &AggregateId, since: Version) -> Result<Box<dyn EventStream>> {
        let path = self.paths.resolve(id);
        if !path.is_file() {
            return Ok(Box::new(std::iter::empty()));
        }

        let guard = self.locks.acquire_read(id)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => return Err(QuireError::storage(*id, "open", e)),
        };
        let mut reader = BufReader::new(file);
        let version = read_header(&mut reader, id)?.map_or(0, |(version, _)| version);

        observe::record_read();
        tracing::debug!(aggregate_id = %id, since, version, "reading events");

        Ok(Box::new(FileEventStream {
            aggregate_id: *id,
            reader,
            guard: Some(guard),
            buf: Vec::new(),
            next_sequence: 0,
            since,
            end: version,
        }))
    }

    fn append(&self, request: AppendRequest) -> Result<Version> {
        let started = Instant::now();
        let id = request.aggregate_id;
        let path = self.paths.resolve(&id);

        if request.records.is_empty() {
            let stored = self.current_version(&id)?;
            self.check_expected(&id, request.expected_version, stored)?;
            return Ok(stored);
        }

        // Encode everything before touching the file.
        let mut body = String::new();
        for record in &request.records {
            body.push_str(&codec::encode_record(record)?);
            body.push('\n');
        }

        if !path.exists() {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|e| QuireError::storage(id, "create directory", e))?;
            }
        }

        let _guard = self.locks.acquire_write(&id)?;

        let existing = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => Some(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(QuireError::storage(id, "open", e)),
        };
        let committed = match &existing {
            Some(file) => scan_committed(file, &id)?,
            None => None,
        };
        let stored = committed.map_or(0, |c| c.version);
        self.check_expected(&id, request.expected_version, stored)?;
        let new_version = request.resulting_version();

        let mut file = match existing {
            Some(file) => file,
            None => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| QuireError::storage(id, "create", e))?,
        };

        let io_err = move |operation: &'static str| move |e: io::Error| QuireError::storage(id, operation, e);

        let (header_len, end) = match committed {
            Some(committed) => (committed.header_len, committed.end),
            None => {
                tracing::info!(aggregate_id = %id, path = %path.display(), "creating event log");
                file.seek(SeekFrom::Start(0)).map_err(io_err("seek"))?;
                file.write_all(codec::encode_header(0).as_bytes())
                    .map_err(io_err("write header"))?;
                (HEADER_LEN, HEADER_LEN)
            }
        };

        let len = file.metadata().map_err(io_err("stat"))?.len();
        if len > end {
            tracing::warn!(
                aggregate_id = %id,
                uncommitted_bytes = len - end,
                "discarding uncommitted tail left by an interrupted append"
            );
            file.set_len(end).map_err(io_err("truncate"))?;
        }

        file.seek(SeekFrom::Start(end)).map_err(io_err("seek"))?;
        file.write_all(body.as_bytes()).map_err(io_err("write records"))?;
        self.sync(&file, &id)?;

        // The header keeps the line ending it was created with so its width never changes.
        let mut header = codec::encode_header(new_version);
        if header_len == HEADER_LEN + 1 {
            header.insert(codec::HEADER_DIGITS, '\r');
        }
        file.seek(SeekFrom::Start(0)).map_err(io_err("seek"))?;
        file.write_all(header.as_bytes()).map_err(io_err("write header"))?;
        self.sync(&file, &id)?;

        observe::record_append(started.elapsed(), request.records.len());
        tracing::debug!(
            aggregate_id = %id,
            expected = request.expected_version,
            version = new_version,
            events = request.records.len(),
            "appended events"
        );

        Ok(new_version)
    }

    fn current_version(&self, id: &AggregateId) -> Result<Version> {
        let path = self.paths.resolve(id);
        if !path.is_file() {
            return Ok(0);
        }

        let _guard = self.locks.acquire_read(id)?;
        let file = File::open(&path).map_err(|e| QuireError::storage(*id, "open", e))?;
        Ok(read_header(&mut BufReader::new(file), id)?.map_or(0, |(version, _)| version))
    }
}

/// Read the version header and its length in bytes. `None` for an empty file.
fn read_header<R: BufRead>(reader: &mut R, id: &AggregateId) -> Result<Option<(Version, u64)>> {
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| QuireError::storage(*id, "read header", e))?;
    if read == 0 {
        return Ok(None);
    }
    codec::decode_header(&line, id).map(|version| Some((version, read as u64)))
}

/// Find the end of the header plus `version` complete record lines.
///
/// `None` for an empty file. Fails if the file holds fewer complete lines
/// than its header claims.
fn scan_committed(file: &File, id: &AggregateId) -> Result<Option<Committed>> {
    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| QuireError::storage(*id, "seek", e))?;

    let Some((version, header_len)) = read_header(&mut reader, id)? else {
        return Ok(None);
    };

    let mut end = header_len;
    let mut line = Vec::new();
    for sequence in 0..version {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| QuireError::storage(*id, "read", e))?;
        if read == 0 || !line.ends_with(b"\n") {
            return Err(QuireError::corrupt(
                *id,
                sequence + 2,
                format!("header claims {} records but the log ends early", version),
            ));
        }
        end += read as u64;
    }

    Ok(Some(Committed {
        version,
        header_len,
        end,
    }))
}

/// Lazy stream over one aggregate's committed records.
///
/// Holds a read permit until exhausted, failed, or dropped.
struct FileEventStream {
    aggregate_id: AggregateId,
    reader: BufReader<File>,
    guard: Option<ReadGuard>,
    buf: Vec<u8>,
    next_sequence: Version,
    since: Version,
    end: Version,
}

impl FileEventStream {
    fn finish(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
    }

    fn fail(&mut self, err: QuireError) -> Option<Result<StoredEvent>> {
        self.finish();
        Some(Err(err))
    }
}

impl Iterator for FileEventStream {
    type Item = Result<StoredEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.guard.is_none() {
                return None;
            }
            if self.next_sequence >= self.end {
                self.finish();
                return None;
            }

            let sequence = self.next_sequence;
            let line_number = sequence + 2;
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(read) if read > 0 && self.buf.ends_with(b"\n") => {}
                Ok(_) => {
                    let reason = format!("header claims {} records but the log ends early", self.end);
                    return self.fail(QuireError::corrupt(self.aggregate_id, line_number, reason));
                }
                Err(e) => return self.fail(QuireError::storage(self.aggregate_id, "read", e)),
            }
            self.next_sequence += 1;

            if sequence < self.since {
                continue;
            }

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line,
                Err(e) => {
                    let err = QuireError::corrupt(self.aggregate_id, line_number, format!("invalid UTF-8: {}", e));
                    return self.fail(err);
                }
            };
            return match codec::decode_record(line, &self.aggregate_id, sequence) {
                Ok(event) => Some(Ok(event)),
                Err(e) => self.fail(e),
            };
        }
    }
}
