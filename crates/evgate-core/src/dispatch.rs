//! Record dispatcher: bounded queue between the protocol path and the sink.
//!
//! `submit` never blocks and never fails the caller: a full queue drops the
//! record and bumps a counter, so a slow or dead sink cannot stall the
//! network path. Workers pull from the shared queue, serialise each record
//! to the sink's JSON envelope, and produce it downstream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::protocol::RealtimeRecord;
use crate::sink::DataSink;

/// Topic every record is produced to.
pub const DATA_TOPIC: &str = "vehicle_data";

/// One decoded record bound to its vehicle, queued for the sink.
#[derive(Debug, Clone)]
pub struct RecordEnvelope {
    /// Vehicle identifier.
    pub vin: String,
    /// The decoded record.
    pub record: RealtimeRecord,
}

impl RecordEnvelope {
    /// Serialise to the sink wire format:
    /// `{"type": ..., "vin": ..., "data": {...}}` with `msgType` and `vin`
    /// mirrored inside `data` for consumers that only look at the inner
    /// object.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let kind = self.record.kind();
        let mut data = self.record.data_value().map_err(crate::Error::from)?;
        if let serde_json::Value::Object(map) = &mut data {
            map.insert("msgType".into(), kind.into());
            map.insert("vin".into(), self.vin.clone().into());
        }
        let body = serde_json::json!({
            "type": kind,
            "vin": self.vin,
            "data": data,
        });
        serde_json::to_vec(&body).map_err(crate::Error::from)
    }
}

/// Cloneable submit-side handle, safe to call from the packet path.
#[derive(Clone)]
pub struct Submitter {
    tx: mpsc::Sender<RecordEnvelope>,
    dropped: Arc<AtomicU64>,
}

impl Submitter {
    /// Queue a record. Non-blocking; a full queue drops the record.
    pub fn submit(&self, envelope: RecordEnvelope) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(envelope) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped_total = total, "dispatcher queue full, dropping record");
        }
    }

    /// Records dropped so far due to queue overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a detached submitter and the receiving end of its queue.
///
/// The normal entry point is [`Dispatcher::start`]; this exists for callers
/// that embed the queue in their own worker arrangement, and for tests.
pub fn bounded(capacity: usize) -> (Submitter, mpsc::Receiver<RecordEnvelope>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Submitter { tx, dropped: Arc::new(AtomicU64::new(0)) }, rx)
}

/// Worker pool that fans queued records out to the sink.
pub struct Dispatcher {
    submitter: Submitter,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start `worker_count` workers over a queue of `capacity` records.
    pub fn start(capacity: usize, worker_count: usize, sink: Arc<dyn DataSink>) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..worker_count)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let sink = Arc::clone(&sink);
                let shutdown = shutdown_rx.clone();
                tokio::spawn(worker_loop(id, rx, sink, shutdown))
            })
            .collect();

        info!(workers = worker_count, capacity = capacity, "dispatcher started");
        Self {
            submitter: Submitter { tx, dropped: Arc::new(AtomicU64::new(0)) },
            shutdown_tx,
            workers,
        }
    }

    /// Handle for the packet path.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Signal the workers, wait for them, then close the queue.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.workers {
            let _ = handle.await;
        }
        let dropped = self.submitter.dropped();
        info!(dropped_total = dropped, "dispatcher stopped");
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<RecordEnvelope>>>,
    sink: Arc<dyn DataSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let envelope = {
            let mut rx = rx.lock().await;
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                maybe = rx.recv() => match maybe {
                    Some(envelope) => envelope,
                    None => break,
                },
            }
        };

        let payload = match envelope.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(worker = id, error = %e, "failed to serialise record");
                continue;
            }
        };
        if let Err(e) = sink.produce(DATA_TOPIC, "", payload).await {
            error!(worker = id, error = %e, vin = %envelope.vin, "sink produce failed");
        }
    }
}
