use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::forecast::ForecasterConfig;
use crate::pipeline::PipelineConfig;
use crate::risk::ClassifierConfig;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub forecaster: ForecasterConfig,
    pub classifier: ClassifierConfig,
    pub pipeline: PipelineConfig,
}

/// Where trained models live unless configured otherwise.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aeroguard")
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aeroguard");
        let data_dir = default_data_dir();

        let forecaster = ForecasterConfig::default();
        let classifier = ClassifierConfig::default();
        let pipeline = PipelineConfig::default();

        let builder = Config::builder()
            // 1. Load default values
            // Forecaster
            .set_default("forecaster.window_size", forecaster.window_size as u64)?
            .set_default("forecaster.max_epochs", forecaster.max_epochs as u64)?
            .set_default("forecaster.batch_size", forecaster.batch_size as u64)?
            .set_default("forecaster.hidden_units", forecaster.hidden_units as u64)?
            .set_default("forecaster.learning_rate", forecaster.learning_rate)?
            .set_default("forecaster.validation_split", forecaster.validation_split)?
            .set_default(
                "forecaster.early_stopping_patience",
                forecaster.early_stopping_patience as u64,
            )?
            .set_default("forecaster.lr_patience", forecaster.lr_patience as u64)?
            .set_default("forecaster.lr_factor", forecaster.lr_factor)?
            .set_default("forecaster.min_lr", forecaster.min_lr)?
            .set_default("forecaster.seed", forecaster.seed)?
            .set_default(
                "forecaster.cache_dir",
                data_dir.join("forecasters").to_string_lossy().to_string(),
            )?
            .set_default("forecaster.train_on_miss", forecaster.train_on_miss)?
            // Classifier
            .set_default("classifier.n_estimators", classifier.n_estimators as u64)?
            .set_default("classifier.max_depth", classifier.max_depth as u64)?
            .set_default("classifier.min_samples_split", classifier.min_samples_split as u64)?
            .set_default("classifier.min_samples_leaf", classifier.min_samples_leaf as u64)?
            .set_default("classifier.test_fraction", classifier.test_fraction)?
            .set_default("classifier.seed", classifier.seed)?
            .set_default("classifier.top_k", classifier.top_k as u64)?
            .set_default("classifier.training_samples", classifier.training_samples as u64)?
            .set_default(
                "classifier.model_path",
                data_dir.join("risk_model.bin").to_string_lossy().to_string(),
            )?
            // Pipeline
            .set_default("pipeline.horizon_hours", pipeline.horizon_hours as u64)?
            .set_default("pipeline.exposure_hours", pipeline.exposure_hours)?

            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))

            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))

            // 4. Load from Environment variables (AEROGUARD__FORECASTER__WINDOW_SIZE=...)
            .add_source(Environment::with_prefix("AEROGUARD").separator("__"));

        let s = builder.build()?;
        let config: Self = s.try_deserialize().context("Invalid configuration")?;

        config
            .forecaster
            .validate()
            .context("Invalid [forecaster] configuration")?;
        config
            .classifier
            .validate()
            .context("Invalid [classifier] configuration")?;

        Ok(config)
    }
}
