//! LogSink - logs a per-frame summary via tracing

use contracts::{AnnotatedFrame, ContractError, DatasetSink};
use tracing::{info, instrument};

/// Sink that logs frame summaries for debugging
pub struct LogSink {
    name: String,
    frames: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: 0,
        }
    }

    fn log_frame_summary(&self, frame: &AnnotatedFrame) {
        info!(
            sink = %self.name,
            capture_index = frame.capture_index,
            frame = frame.frame,
            timestamp = frame.timestamp,
            accepted = frame.result.accepted.len(),
            filtered = frame.result.filtered.len(),
            classes = ?frame.result.classes(),
            "frame captured"
        );
    }
}

impl DatasetSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, frame),
        fields(sink = %self.name, frame = frame.frame)
    )]
    async fn write(&mut self, frame: &AnnotatedFrame) -> Result<(), ContractError> {
        self.log_frame_summary(frame);
        self.frames += 1;
        Ok(())
    }

    #[instrument(name = "log_sink_finalize", skip(self))]
    async fn finalize(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, frames = self.frames, "LogSink finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::annotated_frame;

    #[tokio::test]
    async fn test_log_sink_write() {
        let mut sink = LogSink::new("test_log");
        assert!(sink.write(&annotated_frame(0, 1)).await.is_ok());
        assert!(sink.finalize().await.is_ok());
        assert_eq!(sink.frames, 1);
    }

    #[tokio::test]
    async fn test_log_sink_name() {
        let sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");
    }
}
