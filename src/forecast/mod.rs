//! Sequence forecaster for hourly AQI
//!
//! A per-location model maps a window of min/max scaled AQI values to the
//! next value. Multi-step forecasts are produced autoregressively: each
//! prediction is slid into the window and fed back as input.

pub mod network;
pub mod persistence;
pub mod scaling;
pub mod training;
pub mod window;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::series::TimeSeries;
use crate::traits::{Clock, SequenceModel, SystemClock};

pub use network::ForecastModel;
pub use persistence::{PersistedForecaster, cache_path};
pub use scaling::ScalingState;
pub use training::{TrainedForecaster, TrainingReport, train};

/// Configuration for the sequence forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecasterConfig {
    /// Number of past hours the model sees
    pub window_size: usize,
    /// Upper bound on training epochs
    pub max_epochs: usize,
    pub batch_size: usize,
    pub hidden_units: usize,
    pub learning_rate: f64,
    /// Fraction of windowed pairs held out, taken from the end of the series
    pub validation_split: f64,
    /// Epochs without held-out improvement before stopping
    pub early_stopping_patience: usize,
    /// Epochs without improvement before the learning rate is reduced
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_lr: f64,
    pub seed: u64,
    /// Wall-clock limit for one training run
    pub max_training_secs: Option<f64>,
    /// Directory for cached models; `None` disables the disk cache
    pub cache_dir: Option<PathBuf>,
    /// Train a model when neither memory nor disk has one
    pub train_on_miss: bool,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            window_size: 48,
            max_epochs: 50,
            batch_size: 64,
            hidden_units: 32,
            learning_rate: 0.001,
            validation_split: 0.15,
            early_stopping_patience: 15,
            lr_patience: 8,
            lr_factor: 0.5,
            min_lr: 1e-5,
            seed: 42,
            max_training_secs: None,
            cache_dir: None,
            train_on_miss: true,
        }
    }
}

impl ForecasterConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.window_size == 0 {
            return Err(CoreError::invalid_parameter("window_size", "must be at least 1"));
        }
        if self.max_epochs == 0 {
            return Err(CoreError::invalid_parameter("max_epochs", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(CoreError::invalid_parameter("batch_size", "must be at least 1"));
        }
        if self.hidden_units == 0 {
            return Err(CoreError::invalid_parameter("hidden_units", "must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(CoreError::invalid_parameter(
                "learning_rate",
                format!("{} is not a positive number", self.learning_rate),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(CoreError::invalid_parameter(
                "validation_split",
                format!("{} is outside [0, 1)", self.validation_split),
            ));
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            return Err(CoreError::invalid_parameter(
                "lr_factor",
                format!("{} is outside (0, 1)", self.lr_factor),
            ));
        }
        if self.min_lr < 0.0 {
            return Err(CoreError::invalid_parameter("min_lr", "must not be negative"));
        }
        if let Some(secs) = self.max_training_secs {
            if !(secs >= 0.0 && secs.is_finite()) {
                return Err(CoreError::invalid_parameter(
                    "max_training_secs",
                    format!("{secs} is not a non-negative number of seconds"),
                ));
            }
        }
        Ok(())
    }
}

/// One forecast hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub aqi: f64,
}

/// Predicted AQI for each of the next `horizon` hours.
///
/// Values are the raw inverse-scaled model output; nothing is clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub location: String,
    pub points: Vec<ForecastPoint>,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.aqi).collect()
    }
}

/// Iterative multi-step forecast over raw AQI `history`.
///
/// The last `window_size` scaled observations seed the window (left-padded
/// with the earliest value when `history` is shorter). Every step after the
/// first is conditioned on the model's own earlier predictions.
pub fn forecast_series(
    model: &dyn SequenceModel,
    scaling: &ScalingState,
    history: &[f64],
    horizon: usize,
) -> Result<Vec<f64>, CoreError> {
    if horizon == 0 {
        return Err(CoreError::InvalidHorizon(horizon));
    }

    let scaled = scaling.scale_all(history);
    let mut current = window::seed_window(&scaled, model.window_size())?;

    let mut predictions = Vec::with_capacity(horizon);
    for _ in 0..horizon {
        let next = model.predict_next(&current);
        predictions.push(next);
        current.remove(0);
        current.push(next);
    }

    Ok(scaling.inverse_scale_all(&predictions))
}

/// Compute-on-miss store of per-location forecasters.
///
/// Lookups go memory, then disk cache, then training. Training for one
/// location holds that location's lock, so concurrent callers wait for the
/// first run instead of starting their own. Finished models are swapped in
/// whole; readers keep whatever `Arc` they already hold.
pub struct ForecasterStore {
    config: ForecasterConfig,
    clock: Arc<dyn Clock>,
    active: RwLock<HashMap<String, Arc<TrainedForecaster>>>,
    histories: RwLock<HashMap<String, TimeSeries>>,
    training_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    trainings: AtomicUsize,
}

impl ForecasterStore {
    pub fn new(config: ForecasterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ForecasterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            active: RwLock::new(HashMap::new()),
            histories: RwLock::new(HashMap::new()),
            training_locks: Mutex::new(HashMap::new()),
            trainings: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &ForecasterConfig {
        &self.config
    }

    /// Replace the observed history for a location.
    ///
    /// The active model is left as is; new history only affects the
    /// window forecasts are seeded from.
    pub fn update_history(&self, location: &str, history: TimeSeries) {
        debug!(location, observations = history.len(), "history updated");
        self.histories.write().insert(location.to_string(), history);
    }

    pub fn history(&self, location: &str) -> Option<TimeSeries> {
        self.histories.read().get(location).cloned()
    }

    /// The model currently serving a location, if any.
    pub fn active_model(&self, location: &str) -> Option<Arc<TrainedForecaster>> {
        self.active.read().get(location).cloned()
    }

    /// Number of training runs completed by this store.
    pub fn trainings_run(&self) -> usize {
        self.trainings.load(Ordering::SeqCst)
    }

    /// Whether the active model for a location is older than `max_age`.
    ///
    /// `None` when no model is loaded. Stale models keep serving.
    pub fn is_stale(&self, location: &str, max_age: Duration) -> Option<bool> {
        self.active_model(location)
            .map(|m| self.clock.now_utc() - m.created_at > max_age)
    }

    fn location_lock(&self, location: &str) -> Arc<Mutex<()>> {
        self.training_locks
            .lock()
            .entry(location.to_string())
            .or_default()
            .clone()
    }

    /// Train a fresh model for a location and make it the active one.
    ///
    /// `history` also becomes the location's stored history. The model is
    /// written to the disk cache when one is configured.
    pub fn train_forecaster(
        &self,
        location: &str,
        history: TimeSeries,
        window_size: usize,
        max_epochs: usize,
    ) -> Result<Arc<TrainedForecaster>, CoreError> {
        let lock = self.location_lock(location);
        let _guard = lock.lock();

        let config = ForecasterConfig {
            window_size,
            max_epochs,
            ..self.config.clone()
        };
        let trained = self.train_locked(location, &history, &config)?;
        self.update_history(location, history);
        Ok(trained)
    }

    /// Active model for a location, loading or training it on a miss.
    pub fn get_or_train(&self, location: &str) -> Result<Arc<TrainedForecaster>, CoreError> {
        if let Some(model) = self.active_model(location) {
            return Ok(model);
        }

        let lock = self.location_lock(location);
        let _guard = lock.lock();

        // Another caller may have finished while we waited for the lock
        if let Some(model) = self.active_model(location) {
            return Ok(model);
        }

        if let Some(model) = self.load_cached(location) {
            return Ok(model);
        }

        if !self.config.train_on_miss {
            return Err(CoreError::ModelNotTrained(location.to_string()));
        }

        let history = self
            .history(location)
            .ok_or_else(|| CoreError::ModelNotTrained(location.to_string()))?;
        self.train_locked(location, &history, &self.config)
    }

    /// Forecast the next `horizon` hours for a location.
    pub fn forecast(&self, location: &str, horizon: usize) -> Result<ForecastResult, CoreError> {
        if horizon == 0 {
            return Err(CoreError::InvalidHorizon(horizon));
        }

        let trained = self.get_or_train(location)?;
        let history = self.history(location).ok_or(CoreError::InsufficientData {
            required: 1,
            actual: 0,
        })?;
        let last = history
            .last_timestamp()
            .ok_or(CoreError::InsufficientData {
                required: 1,
                actual: 0,
            })?;

        let values = forecast_series(&trained.model, &trained.scaling, &history.values(), horizon)?;
        debug!(location, horizon, "forecast produced");

        Ok(ForecastResult {
            location: location.to_string(),
            points: values
                .into_iter()
                .enumerate()
                .map(|(i, aqi)| ForecastPoint {
                    timestamp: last + Duration::hours(i as i64 + 1),
                    aqi,
                })
                .collect(),
        })
    }

    /// Train and swap in; the caller holds the location lock.
    fn train_locked(
        &self,
        location: &str,
        history: &TimeSeries,
        config: &ForecasterConfig,
    ) -> Result<Arc<TrainedForecaster>, CoreError> {
        let trained = Arc::new(train(history, config.window_size, config, self.clock.as_ref())?);
        self.trainings.fetch_add(1, Ordering::SeqCst);

        info!(
            location,
            epochs = trained.report.epochs_run,
            training_loss = trained.report.training_loss,
            validation_loss = ?trained.report.validation_loss,
            "forecaster trained"
        );

        if let Some(dir) = &config.cache_dir {
            let path = cache_path(dir, location);
            match PersistedForecaster::new(location, (*trained).clone()).save(&path) {
                Ok(()) => info!(location, path = %path.display(), "forecaster cached"),
                Err(e) => warn!(location, error = %e, "failed to cache forecaster"),
            }
        }

        self.active
            .write()
            .insert(location.to_string(), trained.clone());
        Ok(trained)
    }

    /// Load a cached model; the caller holds the location lock.
    fn load_cached(&self, location: &str) -> Option<Arc<TrainedForecaster>> {
        let path = cache_path(self.config.cache_dir.as_ref()?, location);
        if !path.exists() {
            return None;
        }

        match PersistedForecaster::load(&path) {
            Ok(persisted) if persisted.location == location => {
                info!(location, "{}", persisted.summary());
                let trained = Arc::new(persisted.forecaster);
                self.active
                    .write()
                    .insert(location.to_string(), trained.clone());
                Some(trained)
            }
            Ok(persisted) => {
                warn!(
                    location,
                    cached_for = %persisted.location,
                    "cached forecaster belongs to another location, ignoring"
                );
                None
            }
            Err(e) => {
                warn!(location, error = %e, "failed to load cached forecaster");
                None
            }
        }
    }
}
