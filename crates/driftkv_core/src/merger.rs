//! Background merge scheduling.
//!
//! The merger runs on its own thread but never does I/O on segment files.
//! It watches the sealed-segment count and, when the threshold is reached,
//! submits a merge request to the writer queue. The submit is non-blocking:
//! a full queue means the writer has plenty to do and this cycle is skipped.

use crate::database::Shared;
use crate::writer::Request;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides when merges happen.
pub(crate) struct Merger {
    shared: Arc<Shared>,
    requests: SyncSender<Request>,
    events: Receiver<()>,
    shutdown: Arc<AtomicBool>,
}

impl Merger {
    pub(crate) fn new(
        shared: Arc<Shared>,
        requests: SyncSender<Request>,
        events: Receiver<()>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            shared,
            requests,
            events,
            shutdown,
        }
    }

    /// Wakes on the configured interval and on rotation events until the
    /// engine shuts down.
    pub(crate) fn run(self) {
        loop {
            match self.events.recv_timeout(self.shared.config.merge_interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            self.try_merge();
        }
    }

    fn try_merge(&self) {
        if self.shared.segments.sealed_count() < self.shared.config.merge_min_segments {
            return;
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        match self.requests.try_send(Request::Merge { reply: reply_tx }) {
            Ok(()) => match reply_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    // The pre-merge segments are still in place; the next
                    // cycle retries.
                    warn!(error = %err, "merge failed");
                }
                Err(_) => {}
            },
            Err(TrySendError::Full(_)) => {
                debug!("writer busy, skipping merge cycle");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
