//! Manually driven sensor source
//!
//! A `SensorSource` whose payloads are pushed by the caller instead of a
//! simulator thread. Used for replaying recorded payloads and in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{SensorDataCallback, SensorKind, SensorPacket, SensorSource};

#[derive(Default)]
struct Shared {
    listening: AtomicBool,
    callback: Mutex<Option<SensorDataCallback>>,
}

/// Push side of a [`ManualSource`]
#[derive(Clone)]
pub struct ManualHandle {
    shared: Arc<Shared>,
}

impl ManualHandle {
    /// Deliver a payload; returns false while nobody listens
    pub fn push(&self, packet: SensorPacket) -> bool {
        if !self.shared.listening.load(Ordering::Relaxed) {
            return false;
        }
        let callback = self
            .shared
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => {
                callback(packet);
                true
            }
            None => false,
        }
    }
}

pub struct ManualSource {
    sensor_id: String,
    sensor_kind: SensorKind,
    shared: Arc<Shared>,
}

impl ManualSource {
    pub fn new(sensor_id: impl Into<String>, sensor_kind: SensorKind) -> (Self, ManualHandle) {
        let shared = Arc::new(Shared::default());
        let source = Self {
            sensor_id: sensor_id.into(),
            sensor_kind,
            shared: shared.clone(),
        };
        (source, ManualHandle { shared })
    }
}

impl SensorSource for ManualSource {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    fn sensor_kind(&self) -> SensorKind {
        self.sensor_kind
    }

    fn listen(&self, callback: SensorDataCallback) {
        if self.shared.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        *self
            .shared
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn stop(&self) {
        self.shared.listening.store(false, Ordering::SeqCst);
        self.shared
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::Relaxed)
    }
}
