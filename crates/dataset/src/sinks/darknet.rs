//! DarknetSink - incremental darknet/YOLO training set
//!
//! Per captured frame:
//! - `<dataset>/images/<split>/<run>_<n>.jpg`
//! - `<dataset>/labels/<split>/<run>_<n>.txt`, one `class cx cy w h` line per box
//!
//! Finalize lists every image of the split in `<dataset>/<split>.txt`, including
//! images from earlier runs.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use contracts::{AnnotatedFrame, ContractError, DatasetSink, DatasetSplit};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{DatasetError, Result};
use crate::image_io::to_rgb_image;

/// Configuration for DarknetSink
#[derive(Debug, Clone)]
pub struct DarknetSinkConfig {
    /// Dataset root
    pub dataset_path: PathBuf,

    /// Split the frames are appended to
    pub split: DatasetSplit,

    /// Run-unique file name prefix
    pub run_name: String,
}

impl DarknetSinkConfig {
    /// Create config from params map; split and run name come from the run
    pub fn from_params(
        params: &HashMap<String, String>,
        split: DatasetSplit,
        run_name: impl Into<String>,
    ) -> std::result::Result<Self, String> {
        let dataset_path = params
            .get("dataset_path")
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'dataset_path' parameter".to_string())?;
        let split = match params.get("split") {
            Some(s) => s.parse()?,
            None => split,
        };

        Ok(Self {
            dataset_path,
            split,
            run_name: run_name.into(),
        })
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dataset_path.join("images").join(self.split.as_str())
    }

    pub fn labels_dir(&self) -> PathBuf {
        self.dataset_path.join("labels").join(self.split.as_str())
    }

    /// `<dataset>/<split>.txt`
    pub fn manifest_path(&self) -> PathBuf {
        self.dataset_path.join(format!("{}.txt", self.split))
    }
}

/// Sink that appends frames to a darknet training set
pub struct DarknetSink {
    name: String,
    config: DarknetSinkConfig,
    dirs_ready: bool,
    written: u64,
}

impl DarknetSink {
    pub fn new(name: impl Into<String>, config: DarknetSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            dirs_ready: false,
            written: 0,
        }
    }

    pub fn config(&self) -> &DarknetSinkConfig {
        &self.config
    }

    fn ensure_dirs(&mut self) -> Result<()> {
        if !self.dirs_ready {
            fs::create_dir_all(self.config.images_dir())?;
            fs::create_dir_all(self.config.labels_dir())?;
            self.dirs_ready = true;
        }
        Ok(())
    }

    /// One label line per accepted detection
    fn label_lines(frame: &AnnotatedFrame) -> String {
        let mut out = String::new();
        for detection in &frame.result.accepted {
            let (cx, cy, w, h) = detection
                .bbox
                .normalized(frame.image.width, frame.image.height);
            let _ = writeln!(out, "{} {cx:.6} {cy:.6} {w:.6} {h:.6}", detection.class_id);
        }
        out
    }

    fn persist(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        self.ensure_dirs()?;
        let stem = format!("{}_{}", self.config.run_name, frame.capture_index);
        let label_path = self.config.labels_dir().join(format!("{stem}.txt"));

        // An image is saved only once its label exists
        fs::write(&label_path, Self::label_lines(frame))?;
        let saved = to_rgb_image(&frame.image).and_then(|rgb| {
            rgb.save(self.config.images_dir().join(format!("{stem}.jpg")))
                .map_err(|e| DatasetError::Io(std::io::Error::other(e)))
        });
        if let Err(e) = saved {
            if let Err(remove_err) = fs::remove_file(&label_path) {
                warn!(stem = %stem, error = %remove_err, "failed to remove orphan label");
            }
            return Err(e);
        }

        self.written += 1;
        debug!(stem = %stem, boxes = frame.result.accepted.len(), "darknet entry written");
        Ok(())
    }

    /// Write the split manifest; `Ok(None)` when the split directory is missing
    fn write_manifest(&self) -> Result<Option<usize>> {
        let images_dir = self.config.images_dir();
        if !images_dir.is_dir() {
            return Ok(None);
        }

        let mut images: Vec<String> = fs::read_dir(&images_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| Path::new(name).extension().is_some_and(|ext| ext == "jpg"))
            .collect();
        images.sort();

        let mut manifest = String::new();
        for image in &images {
            let _ = writeln!(manifest, "./images/{}/{image}", self.config.split);
        }
        fs::write(self.config.manifest_path(), manifest)?;
        Ok(Some(images.len()))
    }
}

impl DatasetSink for DarknetSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "darknet_sink_write",
        skip(self, frame),
        fields(sink = %self.name, frame = frame.frame, capture_index = frame.capture_index)
    )]
    async fn write(&mut self, frame: &AnnotatedFrame) -> std::result::Result<(), ContractError> {
        self.persist(frame).map_err(|e| {
            error!(error = %e, "darknet write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    #[instrument(name = "darknet_sink_finalize", skip(self), fields(sink = %self.name, split = %self.config.split))]
    async fn finalize(&mut self) -> std::result::Result<(), ContractError> {
        match self.write_manifest() {
            Ok(Some(count)) => {
                info!(
                    images = count,
                    written = self.written,
                    manifest = %self.config.manifest_path().display(),
                    "split manifest written"
                );
                Ok(())
            }
            Ok(None) => {
                warn!(
                    dir = %self.config.images_dir().display(),
                    "no darknet formatted data directory found"
                );
                Ok(())
            }
            Err(e) => Err(ContractError::sink_write(&self.name, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::annotated_frame;
    use tempfile::tempdir;

    fn config(root: &Path) -> DarknetSinkConfig {
        DarknetSinkConfig {
            dataset_path: root.to_path_buf(),
            split: DatasetSplit::Train,
            run_name: "12345-Town06-150npc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_writes_image_label_and_manifest() {
        let dir = tempdir().unwrap();
        let mut sink = DarknetSink::new("darknet", config(dir.path()));

        sink.write(&annotated_frame(0, 10)).await.unwrap();
        sink.write(&annotated_frame(1, 30)).await.unwrap();
        sink.finalize().await.unwrap();

        let images = dir.path().join("images/train");
        assert!(images.join("12345-Town06-150npc_0.jpg").exists());
        assert!(images.join("12345-Town06-150npc_1.jpg").exists());

        // box (4,2)-(10,6) on a 16x8 image
        let label =
            fs::read_to_string(dir.path().join("labels/train/12345-Town06-150npc_0.txt")).unwrap();
        assert_eq!(label, "1 0.437500 0.500000 0.375000 0.500000\n");

        let manifest = fs::read_to_string(dir.path().join("train.txt")).unwrap();
        assert_eq!(
            manifest.lines().collect::<Vec<_>>(),
            vec![
                "./images/train/12345-Town06-150npc_0.jpg",
                "./images/train/12345-Town06-150npc_1.jpg",
            ]
        );
    }

    #[tokio::test]
    async fn test_manifest_includes_earlier_runs() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images/train");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("00001-Town01-10npc_0.jpg"), b"").unwrap();

        let mut sink = DarknetSink::new("darknet", config(dir.path()));
        sink.finalize().await.unwrap();

        let manifest = fs::read_to_string(dir.path().join("train.txt")).unwrap();
        assert_eq!(manifest, "./images/train/00001-Town01-10npc_0.jpg\n");
    }

    #[tokio::test]
    async fn test_missing_split_dir_is_not_fatal() {
        let dir = tempdir().unwrap();
        let mut sink = DarknetSink::new("darknet", config(&dir.path().join("absent")));
        assert!(sink.finalize().await.is_ok());
        assert!(!dir.path().join("absent/train.txt").exists());
    }

    #[tokio::test]
    async fn test_frame_without_detections_gets_empty_label() {
        let dir = tempdir().unwrap();
        let mut sink = DarknetSink::new("darknet", config(dir.path()));
        let mut frame = annotated_frame(4, 80);
        frame.result.accepted.clear();

        sink.write(&frame).await.unwrap();
        let label =
            fs::read_to_string(dir.path().join("labels/train/12345-Town06-150npc_4.txt")).unwrap();
        assert!(label.is_empty());
    }

    #[tokio::test]
    async fn test_failed_label_leaves_no_image() {
        let dir = tempdir().unwrap();
        let mut sink = DarknetSink::new("darknet", config(dir.path()));
        // a directory where the label file should go
        fs::create_dir_all(dir.path().join("labels/train/12345-Town06-150npc_0.txt")).unwrap();

        assert!(sink.write(&annotated_frame(0, 10)).await.is_err());
        sink.write(&annotated_frame(1, 30)).await.unwrap();
        sink.finalize().await.unwrap();

        assert!(!dir.path().join("images/train/12345-Town06-150npc_0.jpg").exists());
        let manifest = fs::read_to_string(dir.path().join("train.txt")).unwrap();
        assert_eq!(manifest, "./images/train/12345-Town06-150npc_1.jpg\n");
    }

    #[tokio::test]
    async fn test_failed_image_removes_label() {
        let dir = tempdir().unwrap();
        let mut sink = DarknetSink::new("darknet", config(dir.path()));
        let mut frame = annotated_frame(2, 50);
        frame.image.width += 1;

        assert!(sink.write(&frame).await.is_err());
        assert!(!dir.path().join("labels/train/12345-Town06-150npc_2.txt").exists());
    }

    #[test]
    fn test_config_from_params() {
        let params = HashMap::from([
            ("dataset_path".to_string(), "/data/carla-yolo".to_string()),
            ("split".to_string(), "val".to_string()),
        ]);
        let config = DarknetSinkConfig::from_params(&params, DatasetSplit::Train, "run").unwrap();
        assert_eq!(config.split, DatasetSplit::Val);
        assert_eq!(config.manifest_path(), PathBuf::from("/data/carla-yolo/val.txt"));

        assert!(DarknetSinkConfig::from_params(&HashMap::new(), DatasetSplit::Train, "run").is_err());
    }
}
