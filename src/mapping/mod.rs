//! Channel/sensor mapping
//!
//! Resolves a decoded [`DaqAddress`] to the physical sensor it reads out.
//! The [`ChannelMap`] is built once per detector geometry and never mutated;
//! decode workers share it through a [`ChannelMapHandle`], which swaps in a
//! new map atomically when the geometry changes.
//!
//! # Sensor table format
//! ```toml
//! [[sensors]]
//! id = 0
//! name = "module_L1t_halfmodule_axial_sensor0"
//! feb = 2
//! feb_hybrid = 0
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh64::Xxh64;

use crate::common::{DaqAddress, SensorId};
use crate::config::Era;

/// Channel map errors
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Failed to read sensor table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse sensor table: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to find DAQ address for sensor: {sensor}")]
    MissingDaqAddress { sensor: String },

    #[error("DAQ address {address} claimed by both {first} and {second}")]
    DuplicateAddress {
        address: DaqAddress,
        first: String,
        second: String,
    },

    #[error("Sensor id {id} used by both {first} and {second}")]
    DuplicateSensorId {
        id: SensorId,
        first: String,
        second: String,
    },
}

/// One sensor as described by the detector geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub id: u32,
    pub name: String,
    /// Test-run FPGA id
    #[serde(default)]
    pub fpga: Option<u32>,
    /// Test-run hybrid id
    #[serde(default)]
    pub hybrid: Option<u32>,
    /// Front-end board id
    #[serde(default)]
    pub feb: Option<u32>,
    /// Hybrid id on the front-end board
    #[serde(default)]
    pub feb_hybrid: Option<u32>,
}

impl SensorDescriptor {
    pub fn sensor_id(&self) -> SensorId {
        SensorId(self.id)
    }

    /// DAQ address this sensor is read out at in the given era
    pub fn daq_address(&self, era: Era) -> Option<DaqAddress> {
        let (board, hybrid) = match era {
            Era::TestRun => (self.fpga?, self.hybrid?),
            Era::EngineeringRun | Era::Phys2019 => (self.feb?, self.feb_hybrid?),
        };
        Some(DaqAddress::new(board, hybrid))
    }
}

/// Source of sensor descriptors
pub trait DetectorGeometry {
    /// Name of the detector
    fn name(&self) -> &str;

    /// Every sensor the geometry exposes
    fn sensors(&self) -> &[SensorDescriptor];
}

/// Sensor list loaded from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorTable {
    #[serde(default = "default_detector_name")]
    pub detector: String,
    #[serde(default)]
    pub sensors: Vec<SensorDescriptor>,
}

fn default_detector_name() -> String {
    "svt".to_string()
}

impl SensorTable {
    pub fn new(detector: impl Into<String>, sensors: Vec<SensorDescriptor>) -> Self {
        Self {
            detector: detector.into(),
            sensors,
        }
    }

    /// Load a sensor table from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a sensor table from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, MappingError> {
        Ok(toml::from_str(content)?)
    }
}

impl DetectorGeometry for SensorTable {
    fn name(&self) -> &str {
        &self.detector
    }

    fn sensors(&self) -> &[SensorDescriptor] {
        &self.sensors
    }
}

/// xxh64 over every field that can influence the map
pub fn geometry_fingerprint<G: DetectorGeometry + ?Sized>(geometry: &G) -> u64 {
    let mut hasher = Xxh64::new(0);
    hasher.update(geometry.name().as_bytes());
    for sensor in geometry.sensors() {
        hasher.update(&sensor.id.to_le_bytes());
        hasher.update(sensor.name.as_bytes());
        for field in [sensor.fpga, sensor.hybrid, sensor.feb, sensor.feb_hybrid] {
            match field {
                Some(value) => {
                    hasher.update(&[1]);
                    hasher.update(&value.to_le_bytes());
                }
                None => hasher.update(&[0]),
            }
        }
    }
    hasher.digest()
}

/// Immutable DAQ address to sensor table
#[derive(Debug, Clone)]
pub struct ChannelMap {
    era: Era,
    fingerprint: u64,
    by_address: HashMap<DaqAddress, SensorId>,
    sensors: HashMap<SensorId, SensorDescriptor>,
}

impl ChannelMap {
    /// Build the map for `era` from every sensor of the geometry
    pub fn build<G: DetectorGeometry + ?Sized>(era: Era, geometry: &G) -> Result<Self, MappingError> {
        let mut by_address = HashMap::with_capacity(geometry.sensors().len());
        let mut sensors: HashMap<SensorId, SensorDescriptor> = HashMap::with_capacity(geometry.sensors().len());

        for sensor in geometry.sensors() {
            let address =
                sensor
                    .daq_address(era)
                    .ok_or_else(|| MappingError::MissingDaqAddress {
                        sensor: sensor.name.clone(),
                    })?;

            if let Some(existing) = sensors.get(&sensor.sensor_id()) {
                return Err(MappingError::DuplicateSensorId {
                    id: sensor.sensor_id(),
                    first: existing.name.clone(),
                    second: sensor.name.clone(),
                });
            }

            if let Some(previous) = by_address.insert(address, sensor.sensor_id()) {
                let first = sensors
                    .get(&previous)
                    .map(|s: &SensorDescriptor| s.name.clone())
                    .unwrap_or_else(|| previous.to_string());
                return Err(MappingError::DuplicateAddress {
                    address,
                    first,
                    second: sensor.name.clone(),
                });
            }
            sensors.insert(sensor.sensor_id(), sensor.clone());
        }

        info!(
            era = %era,
            detector = geometry.name(),
            sensors = sensors.len(),
            "Built SVT channel map"
        );

        Ok(Self {
            era,
            fingerprint: geometry_fingerprint(geometry),
            by_address,
            sensors,
        })
    }

    /// An empty map; every address is unresolved
    pub fn empty(era: Era) -> Self {
        Self {
            era,
            fingerprint: 0,
            by_address: HashMap::new(),
            sensors: HashMap::new(),
        }
    }

    /// Sensor read out at `address`, if any
    pub fn resolve(&self, address: &DaqAddress) -> Option<SensorId> {
        self.by_address.get(address).copied()
    }

    /// Descriptor of a resolved sensor
    pub fn sensor(&self, id: SensorId) -> Option<&SensorDescriptor> {
        self.sensors.get(&id)
    }

    pub fn era(&self) -> Era {
        self.era
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

/// Shared handle to the current channel map
///
/// Readers take an `Arc` snapshot and keep it for the whole event, so a
/// concurrent rebuild never changes the map under a running decode.
#[derive(Debug, Clone)]
pub struct ChannelMapHandle {
    current: Arc<RwLock<Arc<ChannelMap>>>,
}

impl ChannelMapHandle {
    pub fn new(map: ChannelMap) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(map))),
        }
    }

    /// The map in force right now
    pub fn snapshot(&self) -> Arc<ChannelMap> {
        Arc::clone(&self.current.read())
    }

    /// Replace the map; decodes started afterwards see the new one
    pub fn publish(&self, map: ChannelMap) {
        *self.current.write() = Arc::new(map);
    }

    /// Rebuild from `geometry` unless it matches the current map
    ///
    /// Returns whether a new map was published. On error the current map
    /// stays in force.
    pub fn rebuild<G: DetectorGeometry + ?Sized>(&self, geometry: &G) -> Result<bool, MappingError> {
        let current = self.snapshot();
        let fingerprint = geometry_fingerprint(geometry);
        if fingerprint == current.fingerprint() && !current.is_empty() {
            debug!(
                fingerprint = format_args!("{:016x}", fingerprint),
                "Geometry unchanged, keeping channel map"
            );
            return Ok(false);
        }
        let map = ChannelMap::build(current.era(), geometry)?;
        self.publish(map);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feb_sensor(id: u32, feb: u32, hybrid: u32) -> SensorDescriptor {
        SensorDescriptor {
            id,
            name: format!("sensor{}", id),
            fpga: None,
            hybrid: None,
            feb: Some(feb),
            feb_hybrid: Some(hybrid),
        }
    }

    fn table() -> SensorTable {
        SensorTable::new(
            "HPS-EngRun2015",
            vec![feb_sensor(0, 2, 0), feb_sensor(1, 2, 1), feb_sensor(2, 3, 0)],
        )
    }

    #[test]
    fn test_resolve() {
        let map = ChannelMap::build(Era::EngineeringRun, &table()).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.resolve(&DaqAddress::new(2, 1)), Some(SensorId(1)));
        assert_eq!(map.resolve(&DaqAddress::new(9, 9)), None);
        assert_eq!(map.sensor(SensorId(2)).unwrap().name, "sensor2");
    }

    #[test]
    fn test_missing_address_for_era() {
        let err = ChannelMap::build(Era::TestRun, &table()).unwrap_err();
        assert!(matches!(err, MappingError::MissingDaqAddress { .. }));
        assert!(err.to_string().contains("sensor0"));
    }

    #[test]
    fn test_duplicate_sensor_id() {
        let mut second = feb_sensor(5, 2, 0);
        second.name = "module_L3b_stereo".to_string();
        let table = SensorTable::new("dup", vec![feb_sensor(5, 1, 0), second]);
        match ChannelMap::build(Era::EngineeringRun, &table) {
            Err(MappingError::DuplicateSensorId { id, first, second }) => {
                assert_eq!(id, SensorId(5));
                assert_eq!(first, "sensor5");
                assert_eq!(second, "module_L3b_stereo");
            }
            other => panic!("expected duplicate id error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_address() {
        let table = SensorTable::new("dup", vec![feb_sensor(0, 1, 1), feb_sensor(1, 1, 1)]);
        match ChannelMap::build(Era::Phys2019, &table) {
            Err(MappingError::DuplicateAddress {
                address,
                first,
                second,
            }) => {
                assert_eq!(address, DaqAddress::new(1, 1));
                assert_eq!(first, "sensor0");
                assert_eq!(second, "sensor1");
            }
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_test_run_addresses() {
        let sensor = SensorDescriptor {
            id: 5,
            name: "tr".to_string(),
            fpga: Some(4),
            hybrid: Some(2),
            feb: None,
            feb_hybrid: None,
        };
        assert_eq!(sensor.daq_address(Era::TestRun), Some(DaqAddress::new(4, 2)));
        assert_eq!(sensor.daq_address(Era::EngineeringRun), None);
    }

    #[test]
    fn test_sensor_table_from_toml() {
        let toml = r#"
detector = "HPS-PhysicsRun2019"

[[sensors]]
id = 0
name = "module_L0t_axial"
feb = 0
feb_hybrid = 0

[[sensors]]
id = 1
name = "module_L0t_stereo"
feb = 0
feb_hybrid = 1
"#;
        let table = SensorTable::from_toml(toml).unwrap();
        assert_eq!(table.name(), "HPS-PhysicsRun2019");
        assert_eq!(table.sensors().len(), 2);
        assert_eq!(table.sensors()[1].feb_hybrid, Some(1));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = table();
        let mut b = table();
        assert_eq!(geometry_fingerprint(&a), geometry_fingerprint(&b));
        b.sensors[0].feb_hybrid = Some(3);
        assert_ne!(geometry_fingerprint(&a), geometry_fingerprint(&b));
    }

    #[test]
    fn test_handle_rebuild_only_on_change() {
        let handle = ChannelMapHandle::new(ChannelMap::build(Era::EngineeringRun, &table()).unwrap());
        let before = handle.snapshot();

        assert!(!handle.rebuild(&table()).unwrap());
        assert!(Arc::ptr_eq(&before, &handle.snapshot()));

        let mut changed = table();
        changed.sensors.push(feb_sensor(3, 4, 0));
        assert!(handle.rebuild(&changed).unwrap());

        let after = handle.snapshot();
        assert_eq!(after.len(), 4);
        // The old snapshot is untouched
        assert_eq!(before.len(), 3);
    }

    #[test]
    fn test_handle_rebuild_error_keeps_map() {
        let handle = ChannelMapHandle::new(ChannelMap::build(Era::EngineeringRun, &table()).unwrap());
        let bad = SensorTable::new("bad", vec![feb_sensor(0, 1, 1), feb_sensor(1, 1, 1)]);
        assert!(handle.rebuild(&bad).is_err());
        assert_eq!(handle.snapshot().len(), 3);
    }

    #[test]
    fn test_empty_map_rebuilds() {
        let handle = ChannelMapHandle::new(ChannelMap::empty(Era::EngineeringRun));
        assert!(handle.snapshot().is_empty());
        assert!(handle.rebuild(&table()).unwrap());
        assert_eq!(handle.snapshot().len(), 3);
    }
}
