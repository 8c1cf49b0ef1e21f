//! CollectorConfig - Config Loader output
//!
//! Describes one acquisition run: world, traffic, ego sensors, capture cadence,
//! dataset layout and output sinks. Defaults reproduce a night-time Town06 run
//! with 150 traffic vehicles and 100 captured frames.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use validator::Validate;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete collector configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CollectorConfig {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// World settings
    #[serde(default)]
    #[validate(nested)]
    pub world: WorldConfig,

    /// Background traffic
    #[serde(default)]
    #[validate(nested)]
    pub traffic: TrafficConfig,

    /// Ego vehicle and its sensors
    #[serde(default)]
    #[validate(nested)]
    pub ego: EgoConfig,

    /// Capture cadence
    #[serde(default)]
    #[validate(nested)]
    pub capture: CaptureConfig,

    /// Dataset settings shared by all sinks
    #[serde(default)]
    #[validate(nested)]
    pub dataset: DatasetConfig,

    /// Class registry builder
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Output sinks
    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            version: ConfigVersion::default(),
            world: WorldConfig::default(),
            traffic: TrafficConfig::default(),
            ego: EgoConfig::default(),
            capture: CaptureConfig::default(),
            dataset: DatasetConfig::default(),
            registry: RegistryConfig::default(),
            sinks: default_sinks(),
        }
    }
}

/// World configuration: map, server, stepping, weather
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WorldConfig {
    /// Map name (e.g., "Town06") or full asset path
    #[serde(default = "default_map")]
    #[validate(length(min = 1))]
    pub map: String,

    /// CARLA server host
    #[serde(default = "default_carla_host")]
    #[validate(length(min = 1))]
    pub carla_host: String,

    /// CARLA server port
    #[serde(default = "default_carla_port")]
    #[validate(range(min = 1))]
    pub carla_port: u16,

    /// Client RPC timeout (seconds)
    #[serde(default = "default_client_timeout")]
    #[validate(range(exclusive_min = 0.0))]
    pub timeout_sec: f64,

    /// Fixed simulation step (seconds)
    #[serde(default = "default_fixed_delta")]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub fixed_delta_seconds: f64,

    /// Sun altitude angle (degrees, -90 = night)
    #[serde(default = "default_sun_altitude")]
    #[validate(range(min = -90.0, max = 90.0))]
    pub sun_altitude: f64,

    /// Disable parked vehicles placed in the map
    #[serde(default = "default_true")]
    pub remove_parked_vehicles: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map: default_map(),
            carla_host: default_carla_host(),
            carla_port: default_carla_port(),
            timeout_sec: default_client_timeout(),
            fixed_delta_seconds: default_fixed_delta(),
            sun_altitude: default_sun_altitude(),
            remove_parked_vehicles: true,
        }
    }
}

impl WorldConfig {
    /// Asset path the simulator lists in its available maps
    pub fn map_path(&self) -> String {
        if self.map.contains('/') {
            self.map.clone()
        } else {
            format!("/Game/Carla/Maps/{}", self.map)
        }
    }
}

fn default_map() -> String {
    "Town06".to_string()
}

fn default_carla_host() -> String {
    "127.0.0.1".to_string()
}

fn default_carla_port() -> u16 {
    2000
}

fn default_client_timeout() -> f64 {
    10.0
}

fn default_fixed_delta() -> f64 {
    0.05
}

fn default_sun_altitude() -> f64 {
    -90.0
}

fn default_true() -> bool {
    true
}

/// Background traffic configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrafficConfig {
    /// Requested number of traffic vehicles (clamped to spawn points)
    #[serde(default = "default_vehicle_count")]
    pub vehicles: usize,

    /// Traffic manager port
    #[serde(default = "default_tm_port")]
    #[validate(range(min = 1))]
    pub tm_port: u16,

    /// Global distance to leading vehicle (meters)
    #[serde(default = "default_leading_distance")]
    #[validate(range(min = 0.0))]
    pub leading_distance: f64,

    /// Blueprint filter for traffic archetypes
    #[serde(default = "default_vehicle_filter")]
    #[validate(length(min = 1))]
    pub blueprint_filter: String,

    /// Seed for spawn point shuffling and archetype choice
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            vehicles: default_vehicle_count(),
            tm_port: default_tm_port(),
            leading_distance: default_leading_distance(),
            blueprint_filter: default_vehicle_filter(),
            seed: None,
        }
    }
}

fn default_vehicle_count() -> usize {
    150
}

fn default_tm_port() -> u16 {
    8000
}

fn default_leading_distance() -> f64 {
    2.0
}

fn default_vehicle_filter() -> String {
    "vehicle.*".to_string()
}

/// Ego vehicle configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EgoConfig {
    /// Fixed blueprint; a random `blueprint_filter` match when absent
    #[serde(default)]
    pub blueprint: Option<String>,

    /// Blueprint filter used when `blueprint` is absent
    #[serde(default = "default_vehicle_filter")]
    #[validate(length(min = 1))]
    pub blueprint_filter: String,

    /// Sensors attached to the ego vehicle
    #[serde(default = "default_ego_sensors")]
    #[validate(nested)]
    pub sensors: Vec<SensorConfig>,
}

impl Default for EgoConfig {
    fn default() -> Self {
        Self {
            blueprint: None,
            blueprint_filter: default_vehicle_filter(),
            sensors: default_ego_sensors(),
        }
    }
}

impl EgoConfig {
    /// First sensor of the given kind
    pub fn sensor_of_kind(&self, kind: SensorKind) -> Option<&SensorConfig> {
        self.sensors.iter().find(|sensor| sensor.sensor_kind == kind)
    }
}

/// 3D transform: location + rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Location (x, y, z) in meters
    pub location: Location,

    /// Rotation (pitch, yaw, roll) in degrees
    #[serde(default)]
    pub rotation: Rotation,
}

impl Transform {
    /// Transform with zero rotation
    pub fn from_location(x: f64, y: f64, z: f64) -> Self {
        Self {
            location: Location { x, y, z },
            rotation: Rotation::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    /// Euclidean distance to another location
    pub fn distance(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorConfig {
    /// Unique identifier
    #[validate(length(min = 1))]
    pub id: String,

    /// Sensor kind
    pub sensor_kind: SensorKind,

    /// Mount pose relative to the ego vehicle
    pub transform: Transform,

    /// Blueprint attributes, applied before spawn
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl SensorConfig {
    /// Attribute parsed as f64
    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(|value| value.parse().ok())
    }

    /// Seconds between two payloads (0 = every tick)
    pub fn sensor_tick(&self) -> f64 {
        self.attribute_f64("sensor_tick").unwrap_or(0.0)
    }
}

/// Sensor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// World-tick pseudo-sensor
    WorldTick,
    /// RGB camera
    Camera,
    /// Semantic ray-cast LiDAR
    SemanticLidar,
}

impl SensorKind {
    /// Simulator blueprint name
    pub fn blueprint(self) -> Option<&'static str> {
        match self {
            Self::WorldTick => None,
            Self::Camera => Some("sensor.camera.rgb"),
            Self::SemanticLidar => Some("sensor.lidar.ray_cast_semantic"),
        }
    }
}

fn default_ego_sensors() -> Vec<SensorConfig> {
    let mount = Transform::from_location(1.5, 0.0, 2.4);
    vec![
        SensorConfig {
            id: "rgb".to_string(),
            sensor_kind: SensorKind::Camera,
            transform: mount,
            attributes: HashMap::from([
                ("sensor_tick".to_string(), "1.0".to_string()),
                ("image_size_x".to_string(), "800".to_string()),
                ("image_size_y".to_string(), "600".to_string()),
                ("fov".to_string(), "90".to_string()),
            ]),
        },
        SensorConfig {
            id: "lidar".to_string(),
            sensor_kind: SensorKind::SemanticLidar,
            transform: mount,
            attributes: HashMap::from([
                ("sensor_tick".to_string(), "1.0".to_string()),
                ("channels".to_string(), "64".to_string()),
                ("points_per_second".to_string(), "1120000".to_string()),
                ("upper_fov".to_string(), "40".to_string()),
                ("lower_fov".to_string(), "-40".to_string()),
                ("range".to_string(), "100".to_string()),
                ("rotation_frequency".to_string(), "20".to_string()),
            ]),
        },
    ]
}

/// Capture cadence configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CaptureConfig {
    /// Simulated seconds between two captures
    #[serde(default = "default_capture_interval")]
    #[validate(range(exclusive_min = 0.0))]
    pub interval_sec: f64,

    /// Number of frames to capture before stopping
    #[serde(default = "default_max_frames")]
    #[validate(range(min = 1))]
    pub max_frames: u64,

    /// Per-channel receive timeout (wall-clock seconds)
    #[serde(default = "default_sensor_timeout")]
    #[validate(range(exclusive_min = 0.0))]
    pub sensor_timeout_sec: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_sec: default_capture_interval(),
            max_frames: default_max_frames(),
            sensor_timeout_sec: default_sensor_timeout(),
        }
    }
}

fn default_capture_interval() -> f64 {
    1.0
}

fn default_max_frames() -> u64 {
    100
}

fn default_sensor_timeout() -> f64 {
    1.0
}

/// Dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatasetConfig {
    /// Split the captured frames are appended to
    #[serde(default)]
    pub split: DatasetSplit,

    /// Minimum semantic LiDAR hits for a vehicle to be labeled
    #[serde(default = "default_min_detect")]
    pub min_detect: u32,

    /// Class registry produced by `build-registry`
    #[serde(default = "default_class_registry_path")]
    #[validate(length(min = 1))]
    pub class_registry_path: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            split: DatasetSplit::default(),
            min_detect: default_min_detect(),
            class_registry_path: default_class_registry_path(),
        }
    }
}

fn default_min_detect() -> u32 {
    10
}

fn default_class_registry_path() -> String {
    "vehicle_class_json_file.txt".to_string()
}

/// Class registry builder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Derive class ids from `base_type` instead of prompting
    #[serde(default = "default_auto_fill")]
    pub auto_fill: bool,

    /// Class name -> class id
    #[serde(default = "default_reference")]
    pub reference: BTreeMap<String, i64>,

    /// Archetypes whose class id is forced when auto-filling
    #[serde(default = "default_overrides")]
    pub overrides: BTreeMap<String, i64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auto_fill: default_auto_fill(),
            reference: default_reference(),
            overrides: default_overrides(),
        }
    }
}

fn default_auto_fill() -> bool {
    true
}

fn default_reference() -> BTreeMap<String, i64> {
    [
        ("car", 0),
        ("truck", 1),
        ("van", 2),
        ("bus", 3),
        ("motorcycle", 4),
        ("bicycle", 5),
    ]
    .into_iter()
    .map(|(name, id)| (name.to_string(), id))
    .collect()
}

fn default_overrides() -> BTreeMap<String, i64> {
    BTreeMap::from([
        ("vehicle.bmw.grandtourer".to_string(), 0),
        ("vehicle.mini.cooper_s".to_string(), 0),
    ])
}

/// Dataset split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSplit {
    #[default]
    Train,
    Val,
}

impl DatasetSplit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
        }
    }
}

impl std::fmt::Display for DatasetSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatasetSplit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Self::Train),
            "val" => Ok(Self::Val),
            other => Err(format!("unknown dataset split '{other}', expected train or val")),
        }
    }
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log a per-frame summary
    Log,
    /// Per-frame JSON sidecar + raw image
    Sidecar,
    /// Darknet/YOLO training-set directory
    Darknet,
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![
        SinkConfig {
            name: "sidecar".to_string(),
            sink_type: SinkType::Sidecar,
            params: HashMap::from([
                ("base_path".to_string(), "output".to_string()),
                ("save_patched".to_string(), "true".to_string()),
            ]),
        },
        SinkConfig {
            name: "darknet".to_string(),
            sink_type: SinkType::Darknet,
            params: HashMap::from([(
                "dataset_path".to_string(),
                "../yolo-testing/datasets/carla-yolo".to_string(),
            )]),
        },
    ]
}
