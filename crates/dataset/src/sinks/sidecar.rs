//! SidecarSink - raw image plus one JSON box file per captured frame
//!
//! Files are keyed by simulator frame id, so runs sharing `base_path` append.
//!
//! Layout under `base_path`:
//! - `out_rgb/NNNNNN.png`: camera image
//! - `out_bbox/NNNNNN.txt`: JSON with image reference, boxes, classes, distances
//! - `out_rgb_bbox/NNNNNN.png`: image with boxes drawn (optional)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use contracts::{
    AnnotatedFrame, BoundingBox2D, ClassId, ContractError, DatasetSink, FilteredCandidate, FrameId,
};
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::error::{DatasetError, Result};
use crate::image_io::{draw_boxes, to_rgb_image};

const RGB_DIR: &str = "out_rgb";
const BBOX_DIR: &str = "out_bbox";
const PATCHED_DIR: &str = "out_rgb_bbox";

/// Configuration for SidecarSink
#[derive(Debug, Clone)]
pub struct SidecarSinkConfig {
    /// Output root
    pub base_path: PathBuf,

    /// Also write images with boxes drawn
    pub save_patched: bool,
}

impl SidecarSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("output"));
        let save_patched = params
            .get("save_patched")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        Self {
            base_path,
            save_patched,
        }
    }
}

/// Sidecar file content
#[derive(Debug, Serialize)]
struct SidecarRecord<'a> {
    image: String,
    frame: FrameId,
    timestamp: f64,
    bboxes: Vec<[[f64; 2]; 2]>,
    classes: Vec<ClassId>,
    distances: Vec<f64>,
    filtered: &'a [FilteredCandidate],
}

/// Sink that writes per-frame sidecar files
pub struct SidecarSink {
    name: String,
    config: SidecarSinkConfig,
}

impl SidecarSink {
    /// Create the sink and its output directories
    pub fn new(name: impl Into<String>, config: SidecarSinkConfig) -> Result<Self> {
        fs::create_dir_all(config.base_path.join(RGB_DIR))?;
        fs::create_dir_all(config.base_path.join(BBOX_DIR))?;
        if config.save_patched {
            fs::create_dir_all(config.base_path.join(PATCHED_DIR))?;
        }

        Ok(Self {
            name: name.into(),
            config,
        })
    }

    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Result<Self> {
        Self::new(name, SidecarSinkConfig::from_params(params))
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    fn file_stem(frame: FrameId) -> String {
        format!("{frame:06}")
    }

    fn persist(&self, frame: &AnnotatedFrame) -> Result<()> {
        let stem = Self::file_stem(frame.frame);
        let image_name = format!("{RGB_DIR}/{stem}.png");

        let mut rgb = to_rgb_image(&frame.image)?;
        rgb.save(self.config.base_path.join(&image_name))
            .map_err(|e| DatasetError::Io(std::io::Error::other(e)))?;

        let record = SidecarRecord {
            image: image_name,
            frame: frame.frame,
            timestamp: frame.timestamp,
            bboxes: frame.result.boxes(),
            classes: frame.result.classes(),
            distances: frame.result.distances(),
            filtered: &frame.result.filtered,
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(
            self.config.base_path.join(BBOX_DIR).join(format!("{stem}.txt")),
            json,
        )?;

        if self.config.save_patched {
            let boxes: Vec<BoundingBox2D> = frame.result.accepted.iter().map(|d| d.bbox).collect();
            draw_boxes(&mut rgb, &boxes);
            rgb.save(self.config.base_path.join(PATCHED_DIR).join(format!("{stem}.png")))
                .map_err(|e| DatasetError::Io(std::io::Error::other(e)))?;
        }

        debug!(stem = %stem, boxes = record.bboxes.len(), "sidecar written");
        Ok(())
    }
}

impl DatasetSink for SidecarSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "sidecar_sink_write",
        skip(self, frame),
        fields(sink = %self.name, frame = frame.frame, capture_index = frame.capture_index)
    )]
    async fn write(&mut self, frame: &AnnotatedFrame) -> std::result::Result<(), ContractError> {
        self.persist(frame).map_err(|e| {
            error!(error = %e, "sidecar write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    #[instrument(name = "sidecar_sink_finalize", skip(self), fields(sink = %self.name))]
    async fn finalize(&mut self) -> std::result::Result<(), ContractError> {
        debug!("sidecar sink closed");
        Ok(())
    }
}
