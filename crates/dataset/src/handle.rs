//! SinkHandle - one sink behind its own queue and worker task

use std::sync::Arc;

use contracts::{AnnotatedFrame, DatasetSink};
use observability::metrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::metrics::{MetricsSnapshot, SinkMetrics};

/// Handle to a running sink worker
///
/// Frames are written in send order. The worker finalizes the sink once its
/// queue is closed, so finalize runs exactly once per handle.
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<Arc<AnnotatedFrame>>,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker task; `queue_capacity` bounds frames in flight
    pub fn spawn<S: DatasetSink + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();
        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Reserve one queue slot, waiting while the queue is full
    ///
    /// Returns `None` if the worker is gone; the frame counts as a failed write.
    pub async fn reserve(&self) -> Option<mpsc::Permit<'_, Arc<AnnotatedFrame>>> {
        match self.tx.reserve().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                self.metrics.inc_failure_count();
                metrics::record_sink_write(&self.name, false);
                error!(sink = %self.name, "sink worker closed unexpectedly, frame not queued");
                None
            }
        }
    }

    /// Queue a frame, waiting while the queue is full
    ///
    /// Returns false if the worker is gone.
    pub async fn send(&self, frame: Arc<AnnotatedFrame>) -> bool {
        match self.reserve().await {
            Some(permit) => {
                permit.send(frame);
                true
            }
            None => false,
        }
    }

    /// Close the queue, let the worker drain and finalize, return final counters
    #[instrument(name = "sink_handle_finish", skip(self), fields(sink = %self.name))]
    pub async fn finish(self) -> MetricsSnapshot {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "sink worker panicked");
        }
        debug!(sink = %self.name, "sink handle finished");
        self.metrics.snapshot()
    }
}

#[instrument(name = "sink_worker_loop", skip(sink, rx, metrics), fields(sink = %name))]
async fn sink_worker<S: DatasetSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<AnnotatedFrame>>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!("sink worker started");

    while let Some(frame) = rx.recv().await {
        match sink.write(&frame).await {
            Ok(()) => {
                metrics.inc_write_count();
                metrics::record_sink_write(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                metrics::record_sink_write(&name, false);
                error!(
                    frame = frame.frame,
                    capture_index = frame.capture_index,
                    error = %e,
                    "write failed"
                );
            }
        }
    }

    match sink.finalize().await {
        Ok(()) => metrics.set_finalized(),
        Err(e) => error!(error = %e, "finalize failed"),
    }
    debug!("sink worker stopped");
}
