//! Database facade: open/close lifecycle, readers, and the typed API.

use crate::config::Config;
use crate::dir::DataDir;
use crate::error::{DbError, DbResult};
use crate::index::{self, KeyIndex};
use crate::merger::Merger;
use crate::segment::{Record, SegmentSet, Value};
use crate::writer::{Request, Writer};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// State shared between the facade, the writer thread, and the merger.
pub(crate) struct Shared {
    pub(crate) dir: DataDir,
    pub(crate) index: KeyIndex,
    pub(crate) segments: SegmentSet,
    pub(crate) config: Config,
}

/// Rebuilds the index from every segment file, oldest id first.
///
/// Used at open (where a failure is fatal) and after each merge (where the
/// merged file invalidates every pre-merge offset).
pub(crate) fn rebuild_index(shared: &Shared) -> DbResult<()> {
    let (active_id, sealed) = shared.segments.snapshot();
    let mut files: Vec<(u64, PathBuf)> = sealed
        .into_iter()
        .map(|seg| (seg.id, seg.path))
        .collect();
    files.push((active_id, shared.dir.active_path()));

    let map = index::build_index(&files)?;
    shared.index.replace(map);
    Ok(())
}

/// A handle to an open data directory.
///
/// `Database` is safe to share across threads: reads run concurrently and
/// only synchronize on two short lock sections, while all mutation funnels
/// through the single writer thread. See the crate docs for the overall
/// design.
pub struct Database {
    shared: Arc<Shared>,
    requests: Mutex<Option<SyncSender<Request>>>,
    merge_wake: Mutex<mpsc::Sender<()>>,
    shutdown: Arc<AtomicBool>,
    writer_handle: Mutex<Option<JoinHandle<DbResult<()>>>>,
    merger_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Database {
    /// Opens a database with default configuration, creating the directory
    /// if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database with a custom active-segment size limit.
    pub fn open_with_max_segment_size(
        path: impl AsRef<Path>,
        max_segment_size: u64,
    ) -> DbResult<Self> {
        Self::open_with_config(path, Config::default().max_segment_size(max_segment_size))
    }

    /// Opens a database with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Locked`] when another handle owns the directory,
    /// [`DbError::Corrupt`] when a segment fails to decode during the index
    /// rebuild, and [`DbError::Io`] for filesystem failures.
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> DbResult<Self> {
        let dir = DataDir::open(path.as_ref())?;
        let sealed = dir.scan_sealed()?;
        let active_id = DataDir::next_active_id(&sealed);

        let shared = Arc::new(Shared {
            dir,
            index: KeyIndex::new(),
            segments: SegmentSet::new(active_id, sealed),
            config,
        });

        let (request_tx, request_rx) = mpsc::sync_channel(shared.config.write_queue_capacity);
        let (wake_tx, wake_rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));

        // Creating the writer opens (or creates) `current-data`, so the
        // rebuild below always sees the active segment.
        let writer = Writer::new(Arc::clone(&shared), request_rx, wake_tx.clone())?;
        rebuild_index(&shared)?;
        debug!(
            active_id,
            keys = shared.index.len(),
            sealed = shared.segments.sealed_count(),
            "opened data directory"
        );

        let writer_handle = thread::Builder::new()
            .name("driftkv-writer".into())
            .spawn(move || writer.run())?;

        let merger = Merger::new(
            Arc::clone(&shared),
            request_tx.clone(),
            wake_rx,
            Arc::clone(&shutdown),
        );
        let merger_handle = thread::Builder::new()
            .name("driftkv-merger".into())
            .spawn(move || merger.run())?;

        Ok(Self {
            shared,
            requests: Mutex::new(Some(request_tx)),
            merge_wake: Mutex::new(wake_tx),
            shutdown,
            writer_handle: Mutex::new(Some(writer_handle)),
            merger_handle: Mutex::new(Some(merger_handle)),
        })
    }

    /// Stores a string value under `key`.
    ///
    /// Blocks until the writer has applied the mutation. A later `get` of
    /// the same key observes this value.
    pub fn put(&self, key: &str, value: &str) -> DbResult<()> {
        self.submit(Record::string(key, value))
    }

    /// Stores a 64-bit integer value under `key`.
    pub fn put_int64(&self, key: &str, value: i64) -> DbResult<()> {
        self.submit(Record::int64(key, value))
    }

    /// Returns the latest string value for `key`.
    ///
    /// # Errors
    ///
    /// [`DbError::NotFound`] when the key was never written,
    /// [`DbError::TypeMismatch`] when the latest record holds an integer.
    pub fn get(&self, key: &str) -> DbResult<String> {
        let record = self.read_record(key.as_bytes())?;
        match record.value {
            Value::Str(bytes) => String::from_utf8(bytes)
                .map_err(|_| DbError::corrupt("stored string is not valid UTF-8")),
            Value::Int64(_) => Err(DbError::TypeMismatch),
        }
    }

    /// Returns the latest integer value for `key`.
    ///
    /// # Errors
    ///
    /// [`DbError::NotFound`] when the key was never written,
    /// [`DbError::TypeMismatch`] when the latest record holds a string.
    pub fn get_int64(&self, key: &str) -> DbResult<i64> {
        let record = self.read_record(key.as_bytes())?;
        match record.value {
            Value::Int64(value) => Ok(value),
            Value::Str(_) => Err(DbError::TypeMismatch),
        }
    }

    /// Returns the total on-disk size of all segment files in bytes.
    ///
    /// Files that vanish between enumeration and stat are counted as zero;
    /// those are races with the merger, not errors.
    pub fn size(&self) -> DbResult<u64> {
        let (_, sealed) = self.shared.segments.snapshot();

        let mut total = 0u64;
        for seg in &sealed {
            total += file_size_or_zero(&seg.path)?;
        }
        total += file_size_or_zero(&self.shared.dir.active_path())?;
        Ok(total)
    }

    /// Returns the number of distinct keys currently indexed.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.shared.index.len()
    }

    /// Closes the database: stops the merger, lets the writer drain its
    /// queue, and syncs the active segment.
    ///
    /// Mutations submitted after close begins fail with
    /// [`DbError::Shutdown`]. Closing twice is a no-op.
    pub fn close(&self) -> DbResult<()> {
        // The merger goes first so its handle on the request queue is gone
        // before the writer starts draining towards shutdown.
        self.shutdown.store(true, Ordering::Release);
        let _ = self.merge_wake.lock().send(());
        if let Some(handle) = self.merger_handle.lock().take() {
            let _ = handle.join();
        }

        // Dropping the last request sender lets the writer finish the queue
        // and exit. Callers already blocked on a reply still get one.
        drop(self.requests.lock().take());
        if let Some(handle) = self.writer_handle.lock().take() {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => {
                    return Err(DbError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        "writer thread panicked",
                    )));
                }
            }
        }

        debug!("database closed");
        Ok(())
    }

    fn submit(&self, record: Record) -> DbResult<()> {
        let sender = {
            let guard = self.requests.lock();
            match guard.as_ref() {
                Some(sender) => sender.clone(),
                None => return Err(DbError::Shutdown),
            }
        };

        let (reply_tx, reply_rx) = mpsc::channel();
        sender
            .send(Request::Put {
                record,
                reply: reply_tx,
            })
            .map_err(|_| DbError::Shutdown)?;

        match reply_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(DbError::Shutdown),
        }
    }

    /// Resolves a key to its record: index slot, then segment file, then one
    /// stream decode at the stored offset. Each call opens its own handle.
    fn read_record(&self, key: &[u8]) -> DbResult<Record> {
        let Some(slot) = self.shared.index.get(key) else {
            return Err(DbError::NotFound);
        };

        let active_id = self.shared.segments.active_id();
        let path = if slot.segment_id == active_id {
            self.shared.dir.active_path()
        } else {
            self.shared.dir.segment_path(slot.segment_id)
        };

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(slot.offset))?;
        let mut reader = BufReader::new(file);

        match Record::read_from(&mut reader)? {
            Some((_, record)) if record.key == key => Ok(record),
            Some(_) => Err(DbError::corrupt("index slot resolved to a different key")),
            None => Err(DbError::corrupt("index points past end of segment")),
        }
    }
}

fn file_size_or_zero(path: &Path) -> DbResult<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(err) => Err(err.into()),
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("open", &self.requests.lock().is_some())
            .field("keys", &self.shared.index.len())
            .field("active_segment", &self.shared.segments.active_id())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
