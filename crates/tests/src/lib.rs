//! # Integration Tests
//!
//! End-to-end acquisition scenarios against `MockSimulator`; no CARLA server needed.

#[cfg(test)]
mod support {
    use std::collections::{BTreeMap, HashMap};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use actor_factory::{MockFaults, MockSimulator, MockWorldConfig, SimulatorClient};
    use annotator::ProjectionAnnotator;
    use contracts::{Annotator, ClassRegistry, CollectorConfig, SensorKind, SinkConfig, SinkType};

    pub async fn simulator(faults: MockFaults) -> MockSimulator {
        let mut sim = MockSimulator::with_config(MockWorldConfig::default(), faults);
        sim.connect("localhost", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        sim
    }

    /// Small world writing sidecar and darknet output under `root`
    pub fn config(root: &Path) -> CollectorConfig {
        let mut config = CollectorConfig::default();
        config.traffic.vehicles = 8;
        config.traffic.seed = Some(42);
        config.capture.sensor_timeout_sec = 0.1;
        for sensor in &mut config.ego.sensors {
            if sensor.sensor_kind == SensorKind::Camera {
                sensor.attributes.insert("image_size_x".into(), "96".into());
                sensor.attributes.insert("image_size_y".into(), "64".into());
            }
        }
        config.sinks = vec![
            SinkConfig {
                name: "sidecar".to_string(),
                sink_type: SinkType::Sidecar,
                params: HashMap::from([
                    ("base_path".to_string(), root.join("out").display().to_string()),
                    ("save_patched".to_string(), "true".to_string()),
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
        ];
        config
    }

    /// Deliver every sensor on every tick and capture on every step
    pub fn every_step(config: &mut CollectorConfig) {
        config.capture.interval_sec = config.world.fixed_delta_seconds;
        for sensor in &mut config.ego.sensors {
            sensor.attributes.insert("sensor_tick".into(), "0.0".into());
        }
    }

    pub fn annotator() -> Arc<dyn Annotator> {
        let reference = BTreeMap::from([("car".to_string(), 0), ("truck".to_string(), 1)]);
        let mut registry = ClassRegistry::new(reference);
        for type_id in ["vehicle.audi.tt", "vehicle.tesla.model3", "vehicle.mini.cooper_s"] {
            registry.insert(type_id, Some(0));
        }
        registry.insert("vehicle.carlamotors.carlacola", Some(1));
        Arc::new(ProjectionAnnotator::new(registry))
    }

    pub fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    /// Sidecar records under `out/out_bbox`, in frame order
    pub fn sidecars(dir: &Path) -> Vec<serde_json::Value> {
        let mut paths: Vec<_> = std::fs::read_dir(dir.join("out/out_bbox"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        paths.sort();
        paths.iter().map(|p| read_json(p)).collect()
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;

    use actor_factory::MockFaults;
    use orchestrator::{AcquisitionSession, ExitReason, OrchestratorError};
    use tempfile::tempdir;

    use crate::support::{annotator, config, every_step, sidecars, simulator};

    /// A step whose camera payload never arrives is skipped; the next one commits
    #[tokio::test]
    async fn test_timeout_then_recovery() {
        let dir = tempdir().unwrap();
        let sim = simulator(MockFaults {
            dropped_payloads: vec![("camera".to_string(), 1)],
            ..Default::default()
        })
        .await;
        let mut config = config(dir.path());
        every_step(&mut config);
        config.capture.max_frames = 1;

        let report = AcquisitionSession::new(Arc::new(sim.clone()), config, annotator())
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(report.exit, ExitReason::Completed);
        assert_eq!(report.captured, 1);
        assert_eq!(report.summary.steps, 2);
        assert_eq!(report.summary.sync_timeouts, 1);
        assert_eq!(report.summary.missing_counts.get("rgb"), Some(&1));

        let records = sidecars(dir.path());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["frame"], 2);
        assert!(dir.path().join("out/out_rgb/000002.png").exists());
    }

    /// Captures land every `interval / fixed_delta` steps
    #[tokio::test]
    async fn test_capture_cadence_follows_simulated_time() {
        let dir = tempdir().unwrap();
        let sim = simulator(MockFaults::default()).await;
        let mut config = config(dir.path());
        config.capture.interval_sec = 0.25;
        config.capture.max_frames = 3;
        for sensor in &mut config.ego.sensors {
            sensor.attributes.insert("sensor_tick".into(), "0.25".into());
        }

        let report = AcquisitionSession::new(Arc::new(sim.clone()), config, annotator())
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(report.captured, 3);
        assert_eq!(report.summary.steps, 15);
        assert_eq!(report.summary.sync_timeouts, 0);
        let frames: Vec<u64> = sidecars(dir.path())
            .iter()
            .map(|record| record["frame"].as_u64().unwrap())
            .collect();
        assert_eq!(frames, vec![5, 10, 15]);
    }

    /// A threshold above every hit count labels nothing but still records every frame
    #[tokio::test]
    async fn test_threshold_above_all_counts_filters_everything() {
        let dir = tempdir().unwrap();
        let sim = simulator(MockFaults::default()).await;
        let mut config = config(dir.path());
        every_step(&mut config);
        config.capture.max_frames = 2;
        config.dataset.min_detect = 1_000_000;

        let report = AcquisitionSession::new(Arc::new(sim.clone()), config, annotator())
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(report.captured, 2);
        assert_eq!(report.summary.detections_accepted, 0);
        let records = sidecars(dir.path());
        assert_eq!(records.len(), 2);
        for record in &records {
            assert!(record["bboxes"].as_array().unwrap().is_empty());
            let image = record["image"].as_str().unwrap();
            assert!(dir.path().join("out").join(image).exists());
        }

        let run_name = report.run_name.unwrap();
        let manifest = std::fs::read_to_string(dir.path().join("yolo/train.txt")).unwrap();
        assert_eq!(manifest.lines().count(), 2);
        assert!(manifest.contains(&format!("./images/train/{run_name}_0.jpg")));
        let label = dir.path().join(format!("yolo/labels/train/{run_name}_1.txt"));
        assert_eq!(std::fs::read_to_string(label).unwrap(), "");
    }

    /// Interrupt mid-run: every spawned actor is destroyed and each sink finalized once
    #[tokio::test]
    async fn test_interrupt_destroys_all_actors() {
        let dir = tempdir().unwrap();
        let sim = simulator(MockFaults::default()).await;
        let mut frames = sim.subscribe_frames();
        let shutdown = async move {
            let _ = frames.wait_for(|frame| *frame >= 50).await;
        };
        let mut config = config(dir.path());
        config.capture.max_frames = 10_000;

        let report = AcquisitionSession::new(Arc::new(sim.clone()), config, annotator())
            .run(shutdown)
            .await
            .unwrap();

        assert_eq!(report.exit, ExitReason::Interrupted);
        assert_eq!(report.captured, 2);
        let spawned = report.traffic.unwrap().spawned;
        assert_eq!(report.teardown.vehicles_destroyed, spawned + 1);
        assert_eq!(report.teardown.sensors_destroyed, 2);
        assert_eq!(report.teardown.failures, 0);
        assert!(report.teardown.settings_restored);
        assert_eq!(sim.actor_count(), 0);
        assert_eq!(sim.destroy_requests().len(), spawned + 3);

        let names: Vec<&str> = report.sinks.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["sidecar", "darknet"]);
        assert!(report.sinks.iter().all(|(_, m)| m.finalized && m.write_count == 2));
        let manifest = std::fs::read_to_string(dir.path().join("yolo/train.txt")).unwrap();
        assert_eq!(manifest.lines().count(), 2);
    }

    /// A broken sink is counted, not fatal
    #[tokio::test]
    async fn test_sink_failure_does_not_stop_collection() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let sim = simulator(MockFaults::default()).await;
        let mut config = config(dir.path());
        every_step(&mut config);
        config.capture.max_frames = 2;
        for sink in &mut config.sinks {
            if sink.name == "darknet" {
                sink.params
                    .insert("dataset_path".into(), blocker.display().to_string());
            }
        }

        let report = AcquisitionSession::new(Arc::new(sim.clone()), config, annotator())
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(report.captured, 2);
        assert_eq!(report.summary.sink_failures, 2);
        let (_, darknet) = report.sinks.iter().find(|(n, _)| n == "darknet").unwrap();
        assert_eq!(darknet.failure_count, 2);
        let (_, sidecar) = report.sinks.iter().find(|(n, _)| n == "sidecar").unwrap();
        assert_eq!(sidecar.write_count, 2);
    }

    /// A simulator error mid-run keeps and indexes what was already captured
    #[tokio::test]
    async fn test_failed_tick_after_capture_keeps_output() {
        let dir = tempdir().unwrap();
        let sim = simulator(MockFaults {
            failing_tick: Some(4),
            ..Default::default()
        })
        .await;
        let mut config = config(dir.path());
        every_step(&mut config);
        config.capture.max_frames = 10;

        let err = AcquisitionSession::new(Arc::new(sim.clone()), config, annotator())
            .run(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Simulator(_)));
        assert_eq!(sim.actor_count(), 0);
        let manifest = std::fs::read_to_string(dir.path().join("yolo/train.txt")).unwrap();
        assert_eq!(manifest.lines().count(), 3);
    }

    /// A second run into the same output directory appends to the first
    #[tokio::test]
    async fn test_consecutive_runs_share_sidecar_directory() {
        let dir = tempdir().unwrap();
        let sim = simulator(MockFaults::default()).await;

        for _ in 0..2 {
            let mut config = config(dir.path());
            every_step(&mut config);
            config.capture.max_frames = 2;
            let report = AcquisitionSession::new(Arc::new(sim.clone()), config, annotator())
                .run(std::future::pending())
                .await
                .unwrap();
            assert_eq!(report.captured, 2);
        }

        let frames: Vec<u64> = sidecars(dir.path())
            .iter()
            .map(|record| record["frame"].as_u64().unwrap())
            .collect();
        assert_eq!(frames.len(), 4);
        assert!(frames.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(std::fs::read_dir(dir.path().join("out/out_rgb")).unwrap().count(), 4);
    }
}

#[cfg(test)]
mod registry_tests {
    use actor_factory::{MockFaults, RegistryBuilder};
    use contracts::RegistryConfig;

    use crate::support::simulator;

    #[tokio::test]
    async fn test_autofill_is_idempotent() {
        let sim = simulator(MockFaults::default()).await;
        let config = RegistryConfig::default();
        let builder = RegistryBuilder::new(&sim, &config);

        let first = builder.build("vehicle.*", None).await.unwrap();
        let second = builder.build("vehicle.*", None).await.unwrap();
        assert_eq!(
            first.to_json_pretty().unwrap(),
            second.to_json_pretty().unwrap()
        );
        assert_eq!(sim.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_unspawnable_archetype_recorded_as_null() {
        let sim = simulator(MockFaults {
            failing_blueprints: vec!["vehicle.audi.tt".to_string()],
            ..Default::default()
        })
        .await;
        let config = RegistryConfig::default();

        let registry = RegistryBuilder::new(&sim, &config)
            .build("vehicle.*", None)
            .await
            .unwrap();
        assert_eq!(registry.classification.get("vehicle.audi.tt"), Some(&None));
        assert_eq!(registry.class_of("vehicle.tesla.model3"), Some(0));
        assert_eq!(registry.class_of("vehicle.mini.cooper_s"), Some(0));
    }

    #[test]
    fn test_config_file_round_trip_with_loader() {
        let config = contracts::CollectorConfig::default();
        let toml = config_loader::ConfigLoader::to_toml(&config).unwrap();
        let parsed =
            config_loader::ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        assert_eq!(parsed.world.map, config.world.map);
        assert_eq!(parsed.sinks.len(), config.sinks.len());
    }
}
