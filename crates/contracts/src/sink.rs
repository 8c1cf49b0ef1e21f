//! DatasetSink trait - Dataset commit interface
//!
//! Every output format (sidecar files, darknet tree, log) implements this.

use crate::{AnnotatedFrame, ContractError};

/// Dataset output trait
///
/// `write` is called once per accepted frame, in capture order.
/// `finalize` is called at most once, after the last `write`.
#[trait_variant::make(DatasetSink: Send)]
pub trait LocalDatasetSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Commit one annotated frame
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, frame: &AnnotatedFrame) -> Result<(), ContractError>;

    /// Flush any per-run state (file lists, manifests)
    async fn finalize(&mut self) -> Result<(), ContractError>;
}
