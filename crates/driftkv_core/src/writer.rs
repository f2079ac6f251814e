//! The single serialized writer.
//!
//! All mutation funnels through one dedicated thread that owns the active
//! file handle and the append offset, so no two writes ever race for either.
//! The merger never touches segment files itself; it submits a
//! [`Request::Merge`] through the same queue, which gives a total order over
//! every directory-mutating event.

use crate::database::{rebuild_index, Shared};
use crate::error::{DbError, DbResult};
use crate::index::Slot;
use crate::segment::{compact, Record, SealedSegment};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc};
use tracing::{debug, info};

/// A request drained by the writer thread.
pub(crate) enum Request {
    /// Append one record and publish it in the index.
    Put {
        /// The record to append.
        record: Record,
        /// Single-use reply slot for the submitting caller.
        reply: Sender<DbResult<()>>,
    },
    /// Fold all sealed segments into one.
    Merge {
        /// Single-use reply slot for the merger.
        reply: Sender<DbResult<()>>,
    },
}

/// Owns the active segment handle and applies requests one at a time.
pub(crate) struct Writer {
    shared: Arc<Shared>,
    requests: Receiver<Request>,
    merge_events: mpsc::Sender<()>,
    out: File,
    out_offset: u64,
}

impl Writer {
    /// Opens (or creates) the active segment and returns a writer ready to
    /// run.
    pub(crate) fn new(
        shared: Arc<Shared>,
        requests: Receiver<Request>,
        merge_events: mpsc::Sender<()>,
    ) -> DbResult<Self> {
        let (out, out_offset) = open_active(&shared)?;
        Ok(Self {
            shared,
            requests,
            merge_events,
            out,
            out_offset,
        })
    }

    /// Drains requests until every sender is gone, then syncs the active
    /// file. The final sync result is surfaced through `close`.
    pub(crate) fn run(mut self) -> DbResult<()> {
        while let Ok(request) = self.requests.recv() {
            match request {
                Request::Put { record, reply } => {
                    let result = self.handle_put(record);
                    let _ = reply.send(result);
                }
                Request::Merge { reply } => {
                    let _ = reply.send(self.merge_sealed());
                }
            }
        }

        self.out.sync_all()?;
        Ok(())
    }

    fn handle_put(&mut self, record: Record) -> DbResult<()> {
        if self.out_offset >= self.shared.config.max_segment_size {
            self.rotate()?;
        }

        let encoded = record.encode();
        let offset = self.out_offset;
        self.out.write_all(&encoded)?;

        // The index is only updated once the bytes are fully on their way to
        // the file; a failed write leaves the previous version visible.
        let slot = Slot {
            segment_id: self.shared.segments.active_id(),
            offset,
        };
        self.shared.index.insert(record.key, slot);
        self.out_offset += encoded.len() as u64;

        Ok(())
    }

    /// Seals the active segment and opens a fresh one.
    ///
    /// The rename happens while the old handle is still open; that is safe
    /// because this thread is the only writer and it only appends through
    /// the handle swapped in afterwards. A failed rename keeps the old
    /// handle, so the next put retries the rotation.
    fn rotate(&mut self) -> DbResult<()> {
        let active_path = self.shared.dir.active_path();
        let sealed_id = self.shared.segments.seal_active_with(|id| {
            let sealed_path = self.shared.dir.segment_path(id);
            fs::rename(&active_path, &sealed_path)?;
            Ok::<_, DbError>(sealed_path)
        })?;

        let (out, out_offset) = open_active(&self.shared)?;
        self.out = out;
        self.out_offset = out_offset;
        debug!(sealed_id, "rotated active segment");

        // Nudge the merger; it decides whether a merge is worthwhile.
        let _ = self.merge_events.send(());

        Ok(())
    }

    /// Folds all sealed segments into a single one holding the latest record
    /// per key. The active segment is not touched.
    fn merge_sealed(&mut self) -> DbResult<()> {
        let sealed = self.shared.segments.sealed();
        let Some(first) = sealed.first() else {
            return Ok(());
        };
        let merged_id = first.id;

        let mut records = Vec::new();
        for seg in &sealed {
            read_segment_records(&seg.path, &mut records)?;
        }

        let (compacted, stats) = compact(records);
        if compacted.is_empty() {
            return Ok(());
        }

        let temp_path = self.shared.dir.temp_merge_path();
        if let Err(err) = write_merge_output(&temp_path, &compacted) {
            let _ = fs::remove_file(&temp_path);
            return Err(err);
        }

        // Point of no return: replace the sealed set with the merged file.
        // The merged file keeps the lowest id so it stays older than the
        // active segment in id order.
        for seg in &sealed {
            let _ = fs::remove_file(&seg.path);
        }
        let merged_path = self.shared.dir.segment_path(merged_id);
        fs::rename(&temp_path, &merged_path)?;
        self.shared.segments.replace_sealed(SealedSegment {
            id: merged_id,
            path: merged_path,
        });

        // Offsets in the merged file bear no relation to the old index, so
        // the index is rebuilt from scratch.
        rebuild_index(&self.shared)?;

        info!(
            merged_id,
            segments = sealed.len(),
            input_records = stats.input_records,
            output_records = stats.output_records,
            bytes_reclaimed = stats.bytes_reclaimed,
            "merged sealed segments"
        );
        Ok(())
    }
}

/// Opens `current-data` for appending, creating it if needed.
fn open_active(shared: &Shared) -> DbResult<(File, u64)> {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(shared.dir.active_path())?;
    let offset = file.metadata()?.len();
    Ok((file, offset))
}

/// Reads every record of a segment file, skipping files that no longer
/// exist.
fn read_segment_records(path: &Path, records: &mut Vec<Record>) -> DbResult<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let mut reader = BufReader::new(file);
    while let Some((_, record)) = Record::read_from(&mut reader)? {
        records.push(record);
    }
    Ok(())
}

/// Writes the compacted records to the temp-merge file and syncs it.
fn write_merge_output(path: &Path, records: &[Record]) -> DbResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    let mut writer = BufWriter::new(file);
    for record in records {
        writer.write_all(&record.encode())?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}
