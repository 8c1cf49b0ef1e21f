//! DatasetPipeline - annotate accepted frames and fan them out to sinks

use std::sync::Arc;

use chrono::{DateTime, Utc};
use contracts::{
    AnnotatedFrame, Annotator, CameraView, ContractError, DatasetSplit, DetectionResult,
    FrameBundle, SinkConfig, SinkType, VehicleSnapshotIndex,
};
use observability::metrics;
use tracing::{debug, info, instrument, warn};

use crate::error::{DatasetError, Result};
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{DarknetSink, DarknetSinkConfig, LogSink, SidecarSink};

/// Frames a sink may have in flight before `commit` waits
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Run-unique dataset name: `"{ts5}-{map}-{n}npc"`
///
/// `ts5` is the last five digits of the Unix time.
pub fn run_name(map: &str, vehicles: usize, now: DateTime<Utc>) -> String {
    let ts5 = now.timestamp().rem_euclid(100_000);
    format!("{ts5:05}-{map}-{vehicles}npc")
}

/// Per-run values shared by all sinks
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_name: String,
    pub split: DatasetSplit,
}

impl RunContext {
    /// Context named after the current time
    pub fn new(map: &str, vehicles: usize, split: DatasetSplit) -> Self {
        Self {
            run_name: run_name(map, vehicles, Utc::now()),
            split,
        }
    }
}

/// Builder for creating a DatasetPipeline
pub struct DatasetPipelineBuilder {
    sinks: Vec<SinkConfig>,
    context: RunContext,
    annotator: Arc<dyn Annotator>,
    min_detect: u32,
}

impl DatasetPipelineBuilder {
    pub fn new(
        sinks: Vec<SinkConfig>,
        context: RunContext,
        annotator: Arc<dyn Annotator>,
        min_detect: u32,
    ) -> Self {
        Self {
            sinks,
            context,
            annotator,
            min_detect,
        }
    }

    /// Create every sink and start its worker
    ///
    /// Must be called inside a tokio runtime.
    #[instrument(
        name = "dataset_pipeline_build",
        skip(self),
        fields(sink_count = self.sinks.len(), run = %self.context.run_name)
    )]
    pub fn build(self) -> Result<DatasetPipeline> {
        let mut handles = Vec::with_capacity(self.sinks.len());
        for sink_config in &self.sinks {
            handles.push(create_sink_handle(sink_config, &self.context)?);
        }
        info!(sinks = handles.len(), "dataset pipeline ready");
        Ok(DatasetPipeline::with_handles(
            self.annotator,
            self.min_detect,
            handles,
        ))
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dataset_create_sink_handle",
    skip(config, context),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig, context: &RunContext) -> Result<SinkHandle> {
    let capacity = config
        .params
        .get("queue_capacity")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_QUEUE_CAPACITY);

    match config.sink_type {
        SinkType::Log => Ok(SinkHandle::spawn(LogSink::new(&config.name), capacity)),
        SinkType::Sidecar => {
            let sink = SidecarSink::from_params(&config.name, &config.params)
                .map_err(|e| DatasetError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, capacity))
        }
        SinkType::Darknet => {
            let sink_config = DarknetSinkConfig::from_params(
                &config.params,
                context.split,
                context.run_name.clone(),
            )
            .map_err(|e| DatasetError::sink_creation(&config.name, e))?;
            Ok(SinkHandle::spawn(
                DarknetSink::new(&config.name, sink_config),
                capacity,
            ))
        }
    }
}

/// Dataset Commit Pipeline
///
/// Frames are committed in capture order; `finalize` closes every sink once.
pub struct DatasetPipeline {
    annotator: Arc<dyn Annotator>,
    min_detect: u32,
    handles: Vec<SinkHandle>,
    captured: u64,
    finalized: bool,
}

impl DatasetPipeline {
    /// Create a pipeline with custom sink handles
    pub fn with_handles(
        annotator: Arc<dyn Annotator>,
        min_detect: u32,
        handles: Vec<SinkHandle>,
    ) -> Self {
        Self {
            annotator,
            min_detect,
            handles,
            captured: 0,
            finalized: false,
        }
    }

    /// Frames committed so far
    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.name().to_string()).collect()
    }

    /// Annotate one complete bundle and queue it on every sink
    ///
    /// Annotation errors are returned; sink write errors are counted per sink.
    #[instrument(
        name = "dataset_pipeline_commit",
        skip_all,
        fields(frame = bundle.frame(), capture_index = self.captured)
    )]
    pub async fn commit(
        &mut self,
        bundle: &FrameBundle,
        vehicles: &VehicleSnapshotIndex,
        camera: &CameraView,
    ) -> Result<DetectionResult> {
        let frame = bundle.frame();
        if self.finalized {
            return Err(DatasetError::Finalized { frame });
        }

        let image = bundle
            .image()
            .ok_or_else(|| ContractError::missing_payload(frame, "image"))?;
        let lidar = bundle
            .point_cloud()
            .ok_or_else(|| ContractError::missing_payload(frame, "semantic_point_cloud"))?;

        let annotation = self
            .annotator
            .annotate(vehicles, camera, lidar, image, self.min_detect)?;
        let result = annotation.result;
        metrics::record_detections(result.accepted.len(), result.filtered.len());

        let annotated = Arc::new(AnnotatedFrame {
            capture_index: self.captured,
            frame,
            timestamp: bundle.timestamp(),
            image: image.clone(),
            result: result.clone(),
        });
        // All queues are reserved before any frame is queued, so a commit
        // cancelled while a queue is full reaches no sink.
        let mut permits = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            permits.push(handle.reserve().await);
        }
        let queued = permits.iter().filter(|permit| permit.is_some()).count();
        for permit in permits.into_iter().flatten() {
            permit.send(Arc::clone(&annotated));
        }
        if queued < self.handles.len() {
            warn!(
                queued,
                sinks = self.handles.len(),
                "frame not queued on every sink"
            );
        }

        self.captured += 1;
        debug!(
            accepted = result.accepted.len(),
            filtered = result.filtered.len(),
            "frame committed"
        );
        Ok(result)
    }

    /// Drain and finalize every sink
    ///
    /// Runs at most once; later calls return an empty report.
    #[instrument(name = "dataset_pipeline_finalize", skip(self))]
    pub async fn finalize(&mut self) -> Vec<(String, MetricsSnapshot)> {
        if self.finalized {
            warn!("dataset pipeline already finalized");
            return Vec::new();
        }
        self.finalized = true;

        let mut report = Vec::with_capacity(self.handles.len());
        for handle in self.handles.drain(..) {
            let name = handle.name().to_string();
            report.push((name, handle.finish().await));
        }
        info!(captured = self.captured, sinks = report.len(), "dataset finalized");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bundle, camera, StaticAnnotator};
    use chrono::TimeZone;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_run_name_format() {
        let now = Utc.timestamp_opt(1_700_001_234, 0).unwrap();
        assert_eq!(run_name("Town06", 150, now), "01234-Town06-150npc");
    }

    fn sink_configs(root: &std::path::Path) -> Vec<SinkConfig> {
        vec![
            SinkConfig {
                name: "sidecar".to_string(),
                sink_type: SinkType::Sidecar,
                params: HashMap::from([
                    ("base_path".to_string(), root.join("out").display().to_string()),
                    ("save_patched".to_string(), "false".to_string()),
                ]),
            },
            SinkConfig {
                name: "darknet".to_string(),
                sink_type: SinkType::Darknet,
                params: HashMap::from([(
                    "dataset_path".to_string(),
                    root.join("yolo").display().to_string(),
                )]),
            },
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                params: HashMap::new(),
            },
        ]
    }

    fn context() -> RunContext {
        RunContext {
            run_name: "00042-Town06-3npc".to_string(),
            split: DatasetSplit::Train,
        }
    }

    #[tokio::test]
    async fn test_commit_then_finalize_writes_all_sinks() {
        let dir = tempdir().unwrap();
        let mut pipeline = DatasetPipelineBuilder::new(
            sink_configs(dir.path()),
            context(),
            Arc::new(StaticAnnotator::default()),
            10,
        )
        .build()
        .unwrap();
        assert_eq!(pipeline.sink_names(), vec!["sidecar", "darknet", "log"]);

        for frame in [20, 40] {
            let vehicles = VehicleSnapshotIndex::new(frame);
            let result = pipeline
                .commit(&bundle(frame), &vehicles, &camera())
                .await
                .unwrap();
            assert_eq!(result.frame, frame);
        }
        assert_eq!(pipeline.captured(), 2);

        let report = pipeline.finalize().await;
        assert_eq!(report.len(), 3);
        assert!(report
            .iter()
            .all(|(_, m)| m.write_count == 2 && m.failure_count == 0 && m.finalized));

        assert!(dir.path().join("out/out_bbox/000020.txt").exists());
        assert!(dir.path().join("out/out_bbox/000040.txt").exists());
        assert!(dir
            .path()
            .join("yolo/images/train/00042-Town06-3npc_1.jpg")
            .exists());
        let manifest = std::fs::read_to_string(dir.path().join("yolo/train.txt")).unwrap();
        assert_eq!(manifest.lines().count(), 2);
    }

    /// Records capture indices; writes wait on `gate` when set
    struct RecordingSink {
        name: String,
        written: Arc<std::sync::Mutex<Vec<u64>>>,
        gate: Option<Arc<tokio::sync::Semaphore>>,
    }

    impl RecordingSink {
        fn new(name: &str, gate: Option<Arc<tokio::sync::Semaphore>>) -> Self {
            Self {
                name: name.to_string(),
                written: Arc::default(),
                gate,
            }
        }
    }

    impl contracts::DatasetSink for RecordingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, frame: &AnnotatedFrame) -> std::result::Result<(), ContractError> {
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await;
            }
            self.written.lock().unwrap().push(frame.capture_index);
            Ok(())
        }

        async fn finalize(&mut self) -> std::result::Result<(), ContractError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancelled_commit_reaches_no_sink() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let fast = RecordingSink::new("fast", None);
        let slow = RecordingSink::new("slow", Some(Arc::clone(&gate)));
        let fast_written = Arc::clone(&fast.written);
        let slow_written = Arc::clone(&slow.written);
        let mut pipeline = DatasetPipeline::with_handles(
            Arc::new(StaticAnnotator::default()),
            10,
            vec![SinkHandle::spawn(fast, 8), SinkHandle::spawn(slow, 1)],
        );

        // slow holds frame 1 in its writer and frame 2 in its queue
        for frame in [1, 2] {
            pipeline
                .commit(&bundle(frame), &VehicleSnapshotIndex::new(frame), &camera())
                .await
                .unwrap();
        }
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            pipeline.commit(&bundle(3), &VehicleSnapshotIndex::new(3), &camera()),
        )
        .await;
        assert!(blocked.is_err());
        assert_eq!(pipeline.captured(), 2);

        gate.add_permits(16);
        let report = pipeline.finalize().await;
        assert!(report.iter().all(|(_, m)| m.write_count == 2 && m.finalized));
        assert_eq!(*fast_written.lock().unwrap(), vec![0, 1]);
        assert_eq!(*slow_written.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_finalize_runs_once() {
        let mut pipeline =
            DatasetPipeline::with_handles(Arc::new(StaticAnnotator::default()), 10, vec![
                SinkHandle::spawn(LogSink::new("log"), 4),
            ]);

        assert_eq!(pipeline.finalize().await.len(), 1);
        assert!(pipeline.is_finalized());
        assert!(pipeline.finalize().await.is_empty());

        let err = pipeline
            .commit(&bundle(5), &VehicleSnapshotIndex::new(5), &camera())
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Finalized { frame: 5 }));
    }

    #[tokio::test]
    async fn test_annotation_error_is_returned() {
        let annotator = StaticAnnotator {
            fail: true,
            ..Default::default()
        };
        let mut pipeline = DatasetPipeline::with_handles(Arc::new(annotator), 10, Vec::new());
        let err = pipeline
            .commit(&bundle(5), &VehicleSnapshotIndex::new(5), &camera())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Contract(ContractError::Annotation { .. })
        ));
        assert_eq!(pipeline.captured(), 0);
    }

    #[tokio::test]
    async fn test_unknown_darknet_params_fail_build() {
        let configs = vec![SinkConfig {
            name: "darknet".to_string(),
            sink_type: SinkType::Darknet,
            params: HashMap::new(),
        }];
        let result = DatasetPipelineBuilder::new(
            configs,
            context(),
            Arc::new(StaticAnnotator::default()),
            10,
        )
        .build();
        assert!(matches!(result, Err(DatasetError::SinkCreation { .. })));
    }
}
