//! Per-session frame delivery worker.
//!
//! Each session owns one worker thread that drains its frame channel,
//! stamps frames with wall-clock time, and writes them to the sink and
//! log. This is the only context that touches the session's output
//! handles, and it never blocks the trigger loop: if persistence cannot
//! keep up, frames back up in the channel (the vendor-buffer analogue of
//! the backpressure boundary).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::camera::CapturedFrame;
use crate::clock::{self, ClockOffset};
use crate::sink::{naming, FrameLog, FrameSink, LogRecord};

/// State shared between a session and its delivery worker.
///
/// The offset is rewritten by the session at every (re)attachment; the
/// counters are written by the worker and read by the session.
pub(crate) struct DeliveryShared {
    /// Device-to-wall clock offset in nanoseconds.
    pub offset_ns: AtomicI64,
    /// Frames persisted so far; survives reattachment.
    pub frame_index: AtomicU64,
    /// Frames discarded because capture metadata was unreadable.
    pub dropped_frames: AtomicU64,
}

impl DeliveryShared {
    pub fn new() -> Self {
        Self {
            offset_ns: AtomicI64::new(0),
            frame_index: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
        }
    }
}

pub(crate) struct DeliveryWorker {
    handle: JoinHandle<()>,
}

impl DeliveryWorker {
    /// Spawns the worker for one session. It runs until every sender for
    /// `frames` is dropped, then finalizes the sink and exits.
    pub fn spawn(
        serial: String,
        mode_label: &'static str,
        white_balance: (f64, f64, f64),
        frames: Receiver<CapturedFrame>,
        log: FrameLog,
        sink: Box<dyn FrameSink>,
        shared: Arc<DeliveryShared>,
    ) -> std::io::Result<Self> {
        let handle = std::thread::Builder::new()
            .name(format!("delivery-{serial}"))
            .spawn(move || deliver_loop(serial, mode_label, white_balance, frames, log, sink, shared))?;
        Ok(Self { handle })
    }

    /// Waits for the worker to drain its channel and release the outputs.
    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::error!("delivery worker panicked");
        }
    }
}

fn deliver_loop(
    serial: String,
    mode_label: &'static str,
    white_balance: (f64, f64, f64),
    frames: Receiver<CapturedFrame>,
    mut log: FrameLog,
    mut sink: Box<dyn FrameSink>,
    shared: Arc<DeliveryShared>,
) {
    while let Ok(frame) = frames.recv() {
        if !frame.is_valid() {
            tracing::error!(
                camera = %serial,
                bytes = frame.buffer().len(),
                "malformed frame buffer, not persisted"
            );
            continue;
        }
        let Some(chunk) = frame.chunk().copied() else {
            // The camera delivered a frame before its metadata chunks
            // became readable. Nothing to timestamp it with; discard,
            // but keep the loss visible.
            let dropped = shared.dropped_frames.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::warn!(
                camera = %serial,
                dropped_total = dropped,
                "frame without capture metadata dropped"
            );
            continue;
        };

        let offset = ClockOffset::from_nanos(shared.offset_ns.load(Ordering::SeqCst));
        let timestamp_ms = clock::wall_clock_millis(chunk.timestamp_ns, offset);
        let index = shared.frame_index.load(Ordering::SeqCst);

        match sink.write(&frame, timestamp_ms) {
            Ok(path) => {
                let record = LogRecord {
                    index,
                    mode: mode_label,
                    camera: serial.clone(),
                    file_path: path.display().to_string(),
                    timestamp_in_ms: timestamp_ms,
                    iso_datetime: naming::iso_datetime(timestamp_ms),
                    exposure_time: chunk.exposure_us,
                    gain: chunk.gain,
                    white_balance_r: white_balance.0,
                    white_balance_g: white_balance.1,
                    white_balance_b: white_balance.2,
                };
                if let Err(e) = log.append(&record) {
                    tracing::error!(camera = %serial, error = %e, "failed to append log row");
                }
                shared.frame_index.store(index + 1, Ordering::SeqCst);
                tracing::debug!(
                    camera = %serial,
                    index,
                    timestamp_ms,
                    "grabbed frame persisted"
                );
            }
            Err(e) => {
                tracing::error!(camera = %serial, error = %e, "failed to persist frame");
            }
        }
    }

    if let Err(e) = sink.finalize() {
        tracing::error!(camera = %serial, error = %e, "failed to finalize sink");
    }
    tracing::debug!(camera = %serial, "delivery worker exited");
}
