use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::snapshot::SnapshotVersion;

/// Tunables consumed by the snapshot layer and the commit processor. The
/// surrounding server wires these in; components themselves take plain
/// values at construction.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CoordinationSettings {
    /// Records per snapshot batch.
    pub snapshot_batch_size: u32,

    /// Bound of the commit processor input queue.
    pub request_queue_capacity: usize,

    /// Snapshot version written by this node.
    pub snapshot_version: u8,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        CoordinationSettings {
            snapshot_batch_size: 1000,
            request_queue_capacity: 20000,
            snapshot_version: SnapshotVersion::V3 as u8,
        }
    }
}

impl CoordinationSettings {
    pub fn load(name: &str) -> Result<CoordinationSettings, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(name))
            .build()?;
        settings.try_deserialize()
    }

    pub fn load_str(config_str: &str) -> Result<CoordinationSettings, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(config_str, FileFormat::Toml))
            .build()?;
        settings.try_deserialize()
    }

    pub fn snapshot_version(&self) -> SnapshotVersion {
        SnapshotVersion::from_u8(self.snapshot_version).unwrap_or(SnapshotVersion::V3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = CoordinationSettings::default();
        assert_eq!(s.snapshot_batch_size, 1000);
        assert_eq!(s.request_queue_capacity, 20000);
        assert_eq!(s.snapshot_version(), SnapshotVersion::V3);
    }

    #[test]
    fn load_from_toml() -> anyhow::Result<()> {
        let config = r#"
            snapshot_batch_size = 500
            request_queue_capacity = 100
            snapshot_version = 2
        "#;
        let s = CoordinationSettings::load_str(config)?;
        assert_eq!(s.snapshot_batch_size, 500);
        assert_eq!(s.request_queue_capacity, 100);
        assert_eq!(s.snapshot_version(), SnapshotVersion::V2);
        Ok(())
    }

    #[test]
    fn partial_config_falls_back_to_defaults() -> anyhow::Result<()> {
        let s = CoordinationSettings::load_str("snapshot_batch_size = 10")?;
        assert_eq!(s.snapshot_batch_size, 10);
        assert_eq!(s.request_queue_capacity, 20000);
        Ok(())
    }
}
