//! Per-sensor delivery channels
//!
//! Each registered `SensorSource` feeds its own unbounded queue from the
//! simulator's callback thread. The control task owns the receiving side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::{unbounded, Receiver, Sender};
use contracts::{SensorDataCallback, SensorKind, SensorPacket, SensorSource};
use tracing::{debug, trace};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};

/// Receiving end of one sensor's queue
///
/// Identity is the registration index; index 0 is the world tick.
#[derive(Debug, Clone)]
pub struct SensorChannel {
    index: usize,
    sensor_id: String,
    kind: SensorKind,
    rx: Receiver<SensorPacket>,
}

impl SensorChannel {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Wait for the next payload
    ///
    /// Fails once the channel is closed and empty.
    pub async fn recv(&self) -> Result<SensorPacket> {
        self.rx
            .recv()
            .await
            .map_err(|_| IngestionError::ChannelClosed {
                sensor_id: self.sensor_id.clone(),
            })
    }

    pub fn try_recv(&self) -> Option<SensorPacket> {
        self.rx.try_recv().ok()
    }

    /// Queued payloads
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}

/// Sending side: binds a `SensorSource` to its queue
pub(crate) struct ChannelAdapter {
    sensor_id: String,
    source: Box<dyn SensorSource>,
    tx: Sender<SensorPacket>,
    listening: Arc<AtomicBool>,
}

impl ChannelAdapter {
    pub(crate) fn new(index: usize, source: Box<dyn SensorSource>) -> (Self, SensorChannel) {
        let (tx, rx) = unbounded();
        let sensor_id = source.sensor_id().to_string();
        let channel = SensorChannel {
            index,
            sensor_id: sensor_id.clone(),
            kind: source.sensor_kind(),
            rx,
        };
        let adapter = Self {
            sensor_id,
            source,
            tx,
            listening: Arc::new(AtomicBool::new(false)),
        };
        (adapter, channel)
    }

    pub(crate) fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub(crate) fn start(&self, metrics: Arc<IngestionMetrics>) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let sensor_id = self.sensor_id.clone();
        let tx = self.tx.clone();
        let listening = self.listening.clone();
        debug!(sensor_id = %sensor_id, "starting channel adapter");

        let callback: SensorDataCallback = Arc::new(move |packet| {
            if !listening.load(Ordering::Relaxed) {
                return;
            }
            metrics.record_received(&sensor_id);
            if tx.try_send(packet).is_err() {
                metrics.record_rejected();
                trace!(sensor_id = %sensor_id, "payload arrived after channel close");
            }
        });
        self.source.listen(callback);
    }

    /// Stop the source and close the queue; queued payloads stay readable
    pub(crate) fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            debug!(sensor_id = %self.sensor_id, "stopping channel adapter");
            self.source.stop();
        }
        self.tx.close();
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed) && self.source.is_listening()
    }
}
