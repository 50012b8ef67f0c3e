//! Training pipeline for the sequence forecaster

use std::time::{Duration, Instant};

use ndarray::{Array1, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::series::TimeSeries;
use crate::traits::Clock;

use super::ForecasterConfig;
use super::network::{Adam, ForecastModel, to_matrix};
use super::scaling::ScalingState;
use super::window::{chronological_split_index, create_sequences};

/// Summary of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Epochs actually run
    pub epochs_run: usize,
    /// Epoch whose weights were kept
    pub best_epoch: usize,
    /// Mean training loss of the last epoch run
    pub training_loss: f64,
    /// Best held-out loss (`None` when the held-out segment was empty)
    pub validation_loss: Option<f64>,
    pub training_samples: usize,
    pub validation_samples: usize,
    pub early_stopped: bool,
    pub deadline_reached: bool,
    pub final_learning_rate: f64,
}

/// A fitted model together with the scaling it was trained under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedForecaster {
    pub model: ForecastModel,
    pub scaling: ScalingState,
    pub report: TrainingReport,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Tracks the monitored loss for early stopping and learning-rate decay.
#[derive(Debug)]
struct Plateau {
    best_loss: f64,
    best_epoch: usize,
    epochs_without_improvement: usize,
    epochs_since_lr_change: usize,
}

impl Plateau {
    fn new() -> Self {
        Self {
            best_loss: f64::INFINITY,
            best_epoch: 0,
            epochs_without_improvement: 0,
            epochs_since_lr_change: 0,
        }
    }

    /// Record an epoch's loss; returns true when it is a new best.
    fn observe(&mut self, epoch: usize, loss: f64) -> bool {
        if loss < self.best_loss {
            self.best_loss = loss;
            self.best_epoch = epoch;
            self.epochs_without_improvement = 0;
            self.epochs_since_lr_change = 0;
            true
        } else {
            self.epochs_without_improvement += 1;
            self.epochs_since_lr_change += 1;
            false
        }
    }
}

/// Fit a forecaster to `series` with windows of `window_size`.
///
/// Fails with `InsufficientData` unless the series has at least
/// `window_size + 1` observations.
pub fn train(
    series: &TimeSeries,
    window_size: usize,
    config: &ForecasterConfig,
    clock: &dyn Clock,
) -> Result<TrainedForecaster, CoreError> {
    config.validate()?;

    let values = series.values();
    if window_size == 0 {
        return Err(CoreError::invalid_parameter("window_size", "must be at least 1"));
    }
    if values.len() <= window_size {
        return Err(CoreError::InsufficientData {
            required: window_size + 1,
            actual: values.len(),
        });
    }

    let scaling = ScalingState::fit(&values)?;
    let scaled = scaling.scale_all(&values);
    let pairs = create_sequences(&scaled, window_size)?;

    let split = chronological_split_index(pairs.len(), config.validation_split);
    let (train_pairs, val_pairs) = pairs.split_at(split);

    let x_train = to_matrix(&train_pairs.inputs, window_size)?;
    let y_train = Array1::from_vec(train_pairs.targets.clone());
    let x_val = to_matrix(&val_pairs.inputs, window_size)?;
    let y_val = Array1::from_vec(val_pairs.targets.clone());

    info!(
        window_size,
        train = train_pairs.len(),
        validation = val_pairs.len(),
        "training forecaster"
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut model = ForecastModel::new(window_size, config.hidden_units, &mut rng);
    let mut optimizer = Adam::new(&model, config.learning_rate);
    let mut best_model = model.clone();
    let mut plateau = Plateau::new();

    let deadline = config.max_training_secs.map(Duration::from_secs_f64);
    let started = Instant::now();

    let mut indices: Vec<usize> = (0..train_pairs.len()).collect();
    let mut epochs_run = 0;
    let mut training_loss = f64::NAN;
    let mut early_stopped = false;
    let mut deadline_reached = false;

    for epoch in 1..=config.max_epochs {
        epochs_run = epoch;
        indices.shuffle(&mut rng);

        let mut loss_sum = 0.0;
        for batch in indices.chunks(config.batch_size) {
            let x = x_train.select(Axis(0), batch);
            let y = y_train.select(Axis(0), batch);
            let (loss, grads) = model.gradients(&x, &y);
            optimizer.apply(&mut model, &grads);
            loss_sum += loss * batch.len() as f64;
        }
        training_loss = loss_sum / train_pairs.len() as f64;

        // With no held-out pairs the training loss is monitored instead.
        let monitored = if val_pairs.is_empty() {
            training_loss
        } else {
            model.mse(&x_val, &y_val)
        };
        debug!(epoch, training_loss, monitored, "epoch finished");

        if plateau.observe(epoch, monitored) {
            best_model = model.clone();
        } else {
            if plateau.epochs_since_lr_change >= config.lr_patience
                && optimizer.learning_rate() > config.min_lr
            {
                let reduced = (optimizer.learning_rate() * config.lr_factor).max(config.min_lr);
                info!(
                    epoch,
                    learning_rate = reduced,
                    "held-out loss stalled, reducing learning rate"
                );
                optimizer.set_learning_rate(reduced);
                plateau.epochs_since_lr_change = 0;
            }
            if plateau.epochs_without_improvement >= config.early_stopping_patience {
                info!(epoch, best_epoch = plateau.best_epoch, "early stopping");
                early_stopped = true;
                break;
            }
        }

        if deadline.is_some_and(|limit| started.elapsed() >= limit) {
            warn!(epoch, "training deadline reached, keeping best weights so far");
            deadline_reached = true;
            break;
        }
    }

    let report = TrainingReport {
        epochs_run,
        best_epoch: plateau.best_epoch,
        training_loss,
        validation_loss: (!val_pairs.is_empty()).then_some(plateau.best_loss),
        training_samples: train_pairs.len(),
        validation_samples: val_pairs.len(),
        early_stopped,
        deadline_reached,
        final_learning_rate: optimizer.learning_rate(),
    };

    Ok(TrainedForecaster {
        model: best_model,
        scaling,
        report,
        created_at: clock.now_utc(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::traits::{MockClock, SequenceModel};

    fn clock() -> MockClock {
        MockClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
    }

    fn daily_cycle(hours: usize) -> TimeSeries {
        let values: Vec<f64> = (0..hours)
            .map(|h| 100.0 + 40.0 * (h as f64 * std::f64::consts::TAU / 24.0).sin())
            .collect();
        TimeSeries::from_values(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(), &values)
            .unwrap()
    }

    fn quick_config() -> ForecasterConfig {
        ForecasterConfig {
            max_epochs: 30,
            batch_size: 16,
            hidden_units: 8,
            learning_rate: 0.01,
            ..Default::default()
        }
    }

    #[test]
    fn test_train_insufficient_data() {
        let series = daily_cycle(6);
        let result = train(&series, 6, &quick_config(), &clock());

        assert!(matches!(
            result,
            Err(CoreError::InsufficientData { required: 7, actual: 6 })
        ));
    }

    #[test]
    fn test_train_minimum_series() {
        // window_size + 1 observations yield one pair and no held-out segment
        let series = daily_cycle(4);
        let trained = train(&series, 3, &quick_config(), &clock()).unwrap();

        assert_eq!(trained.report.training_samples, 1);
        assert_eq!(trained.report.validation_samples, 0);
        assert!(trained.report.validation_loss.is_none());
    }

    #[test]
    fn test_train_reports_chronological_split() {
        let series = daily_cycle(24 * 5);
        let trained = train(&series, 12, &quick_config(), &clock()).unwrap();

        // 108 pairs split 85/15
        assert_eq!(trained.report.training_samples, 91);
        assert_eq!(trained.report.validation_samples, 17);
        assert_eq!(trained.model.window_size(), 12);
        assert!((trained.scaling.min() - 60.0).abs() < 1e-9);
        assert_eq!(trained.created_at, clock().now_utc());
    }

    #[test]
    fn test_train_is_deterministic() {
        let series = daily_cycle(24 * 4);
        let first = train(&series, 8, &quick_config(), &clock()).unwrap();
        let second = train(&series, 8, &quick_config(), &clock()).unwrap();

        assert_eq!(first.model, second.model);
        assert_eq!(first.report, second.report);
    }

    #[test]
    fn test_early_stopping_respects_patience() {
        let config = ForecasterConfig {
            max_epochs: 500,
            early_stopping_patience: 3,
            lr_patience: 2,
            ..quick_config()
        };
        let series = daily_cycle(24 * 3);
        let trained = train(&series, 6, &config, &clock()).unwrap();

        let report = &trained.report;
        if report.early_stopped {
            assert_eq!(report.epochs_run, report.best_epoch + 3);
        } else {
            assert_eq!(report.epochs_run, 500);
        }
        assert!(report.final_learning_rate <= config.learning_rate);
        assert!(report.final_learning_rate >= config.min_lr);
    }

    #[test]
    fn test_max_epochs_caps_training() {
        let config = ForecasterConfig {
            max_epochs: 2,
            ..quick_config()
        };
        let trained = train(&daily_cycle(48), 6, &config, &clock()).unwrap();

        assert!(trained.report.epochs_run <= 2);
    }

    #[test]
    fn test_zero_deadline_stops_after_first_epoch() {
        let config = ForecasterConfig {
            max_training_secs: Some(0.0),
            ..quick_config()
        };
        let trained = train(&daily_cycle(48), 6, &config, &clock()).unwrap();

        assert_eq!(trained.report.epochs_run, 1);
        assert!(trained.report.deadline_reached);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ForecasterConfig {
            batch_size: 0,
            ..quick_config()
        };
        let result = train(&daily_cycle(48), 6, &config, &clock());

        assert!(matches!(
            result,
            Err(CoreError::InvalidParameter { name: "batch_size", .. })
        ));
    }
}
