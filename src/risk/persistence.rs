//! Risk model persistence

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

use super::model::RiskModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRiskModel {
    pub version: u32,
    pub model: RiskModel,
}

impl PersistedRiskModel {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(model: RiskModel) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            model,
        }
    }

    /// Save with bincode, replacing any existing file atomically.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes =
            bincode::serialize(self).map_err(|e| PersistenceError::Serialize(e.to_string()))?;
        let staging = path.with_extension("tmp");
        fs::write(&staging, bytes)?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        if !path.exists() {
            return Err(PersistenceError::FileNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let bytes = fs::read(path)?;
        let persisted: Self = bincode::deserialize(&bytes)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;

        if persisted.version > Self::CURRENT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: persisted.version,
            });
        }
        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;
    use crate::features::{EnvironmentalConditions, EnvironmentalFeatureVector};
    use crate::persona::Persona;
    use crate::risk::ClassifierConfig;
    use crate::risk::synthetic::generate_examples;
    use crate::traits::MockClock;

    fn model() -> RiskModel {
        let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let config = ClassifierConfig {
            n_estimators: 5,
            max_depth: 6,
            ..Default::default()
        };
        RiskModel::train(&generate_examples(400, 11).unwrap(), &config, &clock).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_predictions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("risk.bin");
        let original = model();

        PersistedRiskModel::new(original.clone()).save(&path).unwrap();
        let loaded = PersistedRiskModel::load(&path).unwrap();

        assert_eq!(loaded.version, PersistedRiskModel::CURRENT_VERSION);
        assert_eq!(loaded.model, original);

        let vector = EnvironmentalFeatureVector::new(
            EnvironmentalConditions {
                aqi: 120.0,
                pm25: 48.0,
                pm10: 70.0,
                temperature: 30.0,
                humidity: 70.0,
                wind_speed: 3.0,
                pressure: 1010.0,
                visibility: 6.0,
            },
            Persona::OutdoorWorkers,
            8.0,
        )
        .unwrap();
        assert_eq!(loaded.model.predict(&vector).unwrap(), original.predict(&vector).unwrap());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = PersistedRiskModel::load(&dir.path().join("absent.bin"));

        assert!(matches!(result, Err(PersistenceError::FileNotFound(_))));
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("risk.bin");
        fs::write(&path, [0u8, 1, 2]).unwrap();

        assert!(matches!(
            PersistedRiskModel::load(&path),
            Err(PersistenceError::Deserialize(_))
        ));
    }
}
