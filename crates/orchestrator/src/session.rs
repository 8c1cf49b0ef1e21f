//! Acquisition session
//!
//! setup → step/collect/commit loop → teardown → finalize. The loop body is
//! raced against the shutdown future; teardown and finalize run after the
//! race whichever arm won, and whether the body succeeded or failed.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actor_factory::{LifecycleManager, SimulatorClient, SpawnedSensor, TeardownReport, TrafficReport};
use annotator::{build_snapshot_index, camera_view};
use contracts::{
    ActorId, Annotator, CollectorConfig, ContractError, DetectionResult, FrameBundle, SensorKind,
};
use dataset::{DatasetPipeline, DatasetPipelineBuilder, MetricsSnapshot, RunContext};
use ingestion::{IngestionPipeline, SensorChannel};
use observability::{metrics, RunStats, RunSummary};
use sync_engine::{CaptureScheduler, FrameSynchronizer, SyncOutcome};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{OrchestratorError, Result};

/// Called after every capture with `(captured, max_frames)`
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `max_frames` frames were captured
    Completed,
    /// The shutdown future resolved first
    Interrupted,
}

/// Outcome of a session that reached teardown without an error
#[derive(Debug)]
pub struct SessionReport {
    pub exit: ExitReason,
    pub run_name: Option<String>,
    pub captured: u64,
    pub traffic: Option<TrafficReport>,
    pub teardown: TeardownReport,
    /// Final counters per sink
    pub sinks: Vec<(String, MetricsSnapshot)>,
    pub summary: RunSummary,
}

/// One acquisition run against a connected simulator
pub struct AcquisitionSession<C: SimulatorClient> {
    config: CollectorConfig,
    lifecycle: LifecycleManager<C>,
    annotator: Arc<dyn Annotator>,
    ingestion: Option<IngestionPipeline>,
    dataset: Option<DatasetPipeline>,
    run_name: Option<String>,
    traffic: Option<TrafficReport>,
    captured: u64,
    stats: RunStats,
    progress: Option<ProgressFn>,
}

impl<C: SimulatorClient> AcquisitionSession<C> {
    /// `client` must already be connected
    pub fn new(client: Arc<C>, config: CollectorConfig, annotator: Arc<dyn Annotator>) -> Self {
        let seed = config.traffic.seed;
        Self {
            config,
            lifecycle: LifecycleManager::new(client, seed),
            annotator,
            ingestion: None,
            dataset: None,
            run_name: None,
            traffic: None,
            captured: 0,
            stats: RunStats::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Run until `max_frames` captures, an error, or `shutdown` resolves
    ///
    /// Errors are returned after teardown and finalize.
    #[instrument(
        name = "session_run",
        skip_all,
        fields(map = %self.config.world.map, max_frames = self.config.capture.max_frames)
    )]
    pub async fn run<F>(mut self, shutdown: F) -> Result<SessionReport>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let outcome = {
            tokio::pin!(shutdown);
            tokio::select! {
                biased;
                () = &mut shutdown => Ok(ExitReason::Interrupted),
                result = self.collect() => result,
            }
        };
        if matches!(outcome, Ok(ExitReason::Interrupted)) {
            warn!(captured = self.captured, "interrupt received, shutting down");
        }

        let (teardown, sinks) = self.cleanup().await;
        let summary = self.stats.summary();

        match outcome {
            Ok(exit) => {
                info!(
                    exit = ?exit,
                    captured = self.captured,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "session finished"
                );
                Ok(SessionReport {
                    exit,
                    run_name: self.run_name,
                    captured: self.captured,
                    traffic: self.traffic,
                    teardown,
                    sinks,
                    summary,
                })
            }
            Err(e) => {
                error!(error = %e, captured = self.captured, "session failed");
                Err(e)
            }
        }
    }

    /// Setup and acquisition loop
    ///
    /// Resources that need cleanup are stored on `self` as soon as they exist.
    async fn collect(&mut self) -> Result<ExitReason> {
        let sensor_timeout = sensor_timeout(self.config.capture.sensor_timeout_sec)?;
        let prepared = self
            .lifecycle
            .prepare_world(&self.config.world, &self.config.traffic)
            .await?;
        debug!(map = %prepared.map, synchronous_master = prepared.synchronous_master, "world prepared");

        let context = RunContext::new(
            &self.config.world.map,
            self.config.traffic.vehicles,
            self.config.dataset.split,
        );
        info!(run = %context.run_name, split = %context.split, "dataset run");
        self.run_name = Some(context.run_name.clone());
        let dataset = self.dataset.insert(
            DatasetPipelineBuilder::new(
                self.config.sinks.clone(),
                context,
                Arc::clone(&self.annotator),
                self.config.dataset.min_detect,
            )
            .build()?,
        );

        self.traffic = Some(self.lifecycle.spawn_traffic(&self.config.traffic).await?);
        let ego = self
            .lifecycle
            .spawn_ego(&self.config.ego, self.config.traffic.tm_port)
            .await?;
        self.lifecycle.apply_uniform_lights().await?;
        let sensors = self.lifecycle.attach_sensors(&self.config.ego).await?;

        let camera_id = sensor_actor(&sensors, SensorKind::Camera)?;
        sensor_actor(&sensors, SensorKind::SemanticLidar)?;

        let client = Arc::clone(self.lifecycle.client());
        let (ingestion, channels) = wire_ingestion(client.as_ref(), &sensors)?;
        self.ingestion = Some(ingestion);

        let capture = &self.config.capture;
        let mut scheduler = CaptureScheduler::new(capture.interval_sec, capture.max_frames);
        let mut synchronizer = FrameSynchronizer::new(channels, sensor_timeout);
        info!(
            channels = synchronizer.channel_count(),
            interval_sec = capture.interval_sec,
            max_frames = capture.max_frames,
            "acquisition loop started"
        );

        while !scheduler.is_finished() {
            let step = client.tick().await?;
            self.stats.on_step();
            metrics::record_step(step.frame);
            // lets the shutdown arm observe the interrupt between steps
            tokio::task::yield_now().await;

            if !scheduler.advance(step.delta_seconds) {
                continue;
            }

            let started = Instant::now();
            let outcome = synchronizer.collect(step.frame).await;
            self.stats
                .on_collect(outcome.stale(), started.elapsed().as_secs_f64() * 1000.0);

            match outcome {
                SyncOutcome::TimedOut { missing, .. } => self.stats.on_timeout(&missing),
                SyncOutcome::Complete { bundle, .. } => {
                    let result = commit(client.as_ref(), dataset, &bundle, camera_id, ego).await?;
                    let captured = scheduler.record_capture();
                    self.captured = captured;
                    self.stats
                        .on_capture(result.accepted.len(), result.filtered.len());
                    metrics::record_capture(captured);
                    info!(
                        frame = step.frame,
                        captured,
                        accepted = result.accepted.len(),
                        filtered = result.filtered.len(),
                        "frame captured"
                    );
                    if let Some(progress) = &self.progress {
                        progress(captured, scheduler.max_frames());
                    }
                }
            }
        }

        Ok(ExitReason::Completed)
    }

    /// Stop sensors, destroy actors, finalize the dataset
    #[instrument(name = "session_cleanup", skip(self))]
    async fn cleanup(&mut self) -> (TeardownReport, Vec<(String, MetricsSnapshot)>) {
        match &self.ingestion {
            Some(ingestion) => {
                ingestion.stop_all();
                let delivered = ingestion.metrics().snapshot();
                info!(
                    sensors = ingestion.sensor_count(),
                    received = delivered.packets_received,
                    rejected = delivered.packets_rejected,
                    "sensors stopped"
                );
            }
            None => warn!("sensors have not been initiated"),
        }

        let teardown = self.lifecycle.teardown().await;
        info!(
            vehicles = teardown.vehicles_destroyed,
            sensors = teardown.sensors_destroyed,
            failures = teardown.failures,
            "actors destroyed"
        );

        let sinks = match self.dataset.as_mut() {
            Some(dataset) => dataset.finalize().await,
            None => {
                warn!("dataset pipeline was never created, nothing to finalize");
                Vec::new()
            }
        };
        for (_, snapshot) in &sinks {
            self.stats.sink_failures += snapshot.failure_count;
        }

        (teardown, sinks)
    }
}

/// Per-pop synchronizer timeout; rejects negative, NaN and overflowing values
fn sensor_timeout(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|e| OrchestratorError::InvalidCapture {
        field: "sensor_timeout_sec",
        value: seconds,
        message: e.to_string(),
    })
}

fn sensor_actor(sensors: &[SpawnedSensor], kind: SensorKind) -> Result<ActorId> {
    sensors
        .iter()
        .find(|sensor| sensor.kind() == kind)
        .map(|sensor| sensor.actor_id)
        .ok_or(OrchestratorError::MissingSensor { kind })
}

/// One channel per sensor, world tick first
fn wire_ingestion<C: SimulatorClient>(
    client: &C,
    sensors: &[SpawnedSensor],
) -> Result<(IngestionPipeline, Vec<SensorChannel>)> {
    let mut ingestion = IngestionPipeline::new(client.tick_source());
    for sensor in sensors {
        let source = client
            .sensor_source(sensor.actor_id, sensor.sensor_id().to_string(), sensor.kind())
            .ok_or_else(|| OrchestratorError::SensorSourceUnavailable {
                sensor_id: sensor.sensor_id().to_string(),
                actor_id: sensor.actor_id,
            })?;
        ingestion.register_sensor_source(source)?;
    }
    ingestion.start_all();
    let channels = ingestion.take_channels()?;
    Ok((ingestion, channels))
}

/// Join the bundle with the live vehicle list and hand it to the dataset
async fn commit<C: SimulatorClient>(
    client: &C,
    dataset: &mut DatasetPipeline,
    bundle: &FrameBundle,
    camera_id: ActorId,
    ego: ActorId,
) -> Result<DetectionResult> {
    let frame = bundle.frame();
    let snapshot = bundle
        .world_snapshot()
        .ok_or_else(|| ContractError::missing_payload(frame, "world_snapshot"))?;
    let image = bundle
        .image()
        .ok_or_else(|| ContractError::missing_payload(frame, "image"))?;

    let vehicles = client.vehicles().await?;
    let index = build_snapshot_index(snapshot, &vehicles);
    let camera = camera_view(snapshot, camera_id, Some(ego), image)?;
    Ok(dataset.commit(bundle, &index, &camera).await?)
}
