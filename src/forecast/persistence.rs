//! Forecaster persistence - save and load trained models per location

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::traits::Clock;

use super::training::TrainedForecaster;

/// Serializable forecaster artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedForecaster {
    /// Version for backward compatibility
    pub version: u32,
    /// Location this model was trained for
    pub location: String,
    /// Model, scaling state and training report
    pub forecaster: TrainedForecaster,
}

impl PersistedForecaster {
    /// Current version number
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(location: &str, forecaster: TrainedForecaster) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            location: location.to_string(),
            forecaster,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.forecaster.created_at
    }

    /// Save to a file using bincode.
    ///
    /// The artifact is written next to `path` and renamed into place, so a
    /// concurrent reader sees either the old file or the complete new one.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        // Create parent directories if needed
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

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        if !path.exists() {
            return Err(PersistenceError::FileNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let bytes = fs::read(path)?;

        let persisted: Self = bincode::deserialize(&bytes)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))?;

        // Version check
        if persisted.version > Self::CURRENT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: persisted.version,
            });
        }

        Ok(persisted)
    }

    /// Check if the cached model is older than `max_age`.
    ///
    /// Staleness is informational only; it never triggers retraining.
    pub fn is_stale(&self, max_age: Duration, clock: &dyn Clock) -> bool {
        clock.now_utc() - self.created_at() > max_age
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        let report = &self.forecaster.report;
        format!(
            "Forecaster v{} for {}: {} samples, train_loss={:.4}, val_loss={}, created {}",
            self.version,
            self.location,
            report.training_samples,
            report.training_loss,
            report
                .validation_loss
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "N/A".to_string()),
            self.created_at().format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Cache file for a location inside `cache_dir`.
///
/// The readable part lowercases the name and turns anything outside
/// `[a-z0-9]` into `-`. Distinct names can share that slug, so it is
/// followed by an FNV-1a hash of the exact location string:
/// "CBD Belapur" maps to `cbd-belapur-4f25776f8d947a0d.bin`.
pub fn cache_path(cache_dir: &Path, location: &str) -> PathBuf {
    let slug: String = location
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    cache_dir.join(format!("{slug}-{:016x}.bin", fnv1a(location.as_bytes())))
}

// Stable across builds and platforms, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET_BASIS, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    use super::*;
    use crate::forecast::network::ForecastModel;
    use crate::forecast::scaling::ScalingState;
    use crate::forecast::training::TrainingReport;
    use crate::traits::{MockClock, SequenceModel};

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn create_test_forecaster() -> PersistedForecaster {
        let mut rng = StdRng::seed_from_u64(9);
        PersistedForecaster::new(
            "Vashi",
            TrainedForecaster {
                model: ForecastModel::new(4, 6, &mut rng),
                scaling: ScalingState::fit(&[20.0, 180.0]).unwrap(),
                report: TrainingReport {
                    epochs_run: 12,
                    best_epoch: 9,
                    training_loss: 0.0125,
                    validation_loss: Some(0.0211),
                    training_samples: 85,
                    validation_samples: 15,
                    early_stopped: true,
                    deadline_reached: false,
                    final_learning_rate: 0.0005,
                },
                created_at: created(),
            },
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vashi.bin");

        let persisted = create_test_forecaster();
        persisted.save(&path).unwrap();

        let loaded = PersistedForecaster::load(&path).unwrap();

        assert_eq!(loaded.version, persisted.version);
        assert_eq!(loaded.location, "Vashi");
        assert_eq!(loaded.forecaster, persisted.forecaster);
        assert_eq!(
            loaded.forecaster.model.predict_next(&[0.1, 0.2, 0.3, 0.4]),
            persisted.forecaster.model.predict_next(&[0.1, 0.2, 0.3, 0.4])
        );
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_nonexistent() {
        let path = Path::new("/nonexistent/path/model.bin");
        let result = PersistedForecaster::load(path);

        assert!(matches!(result, Err(PersistenceError::FileNotFound(_))));
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        fs::write(&path, b"not a model").unwrap();

        let result = PersistedForecaster::load(&path);

        assert!(matches!(result, Err(PersistenceError::Deserialize(_))));
    }

    #[test]
    fn test_is_stale() {
        let persisted = create_test_forecaster();
        let clock = MockClock::new(created() + Duration::hours(2));

        assert!(!persisted.is_stale(Duration::hours(24), &clock));

        clock.advance(Duration::days(2));
        assert!(persisted.is_stale(Duration::hours(24), &clock));
    }

    #[test]
    fn test_summary() {
        let summary = create_test_forecaster().summary();

        assert!(summary.contains("for Vashi"));
        assert!(summary.contains("85 samples"));
        assert!(summary.contains("val_loss=0.0211"));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("dirs").join("model.bin");

        let result = create_test_forecaster().save(&path);

        assert!(result.is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_cache_path_slug() {
        let path = cache_path(Path::new("/cache"), "CBD Belapur");
        assert_eq!(path, PathBuf::from("/cache/cbd-belapur-4f25776f8d947a0d.bin"));
    }

    #[test]
    fn test_cache_path_distinguishes_similar_names() {
        let dir = Path::new("/cache");
        let names = ["Sector 1", "Sector-1", "sector 1", "Sector 1 ", "Nérul", "Nïrul"];

        let paths: Vec<PathBuf> = names.iter().map(|n| cache_path(dir, n)).collect();

        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(paths[0], PathBuf::from("/cache/sector-1-cda82c19fb2236a4.bin"));
        assert_eq!(paths[1], PathBuf::from("/cache/sector-1-cd7c2019fafce755.bin"));
        // Same name, same file
        assert_eq!(cache_path(dir, "Sector 1"), paths[0]);
    }
}
