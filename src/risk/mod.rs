//! Health-risk classification
//!
//! A standardized feature vector goes through a bagged tree ensemble trained
//! with class-balanced weights. Predictions carry the full probability
//! distribution, the top contributing features and persona-specific advice.

pub mod advice;
pub mod category;
pub mod evaluation;
pub mod factors;
pub mod forest;
pub mod model;
pub mod persistence;
pub mod scaler;
pub mod synthetic;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CoreError;
use crate::features::{EnvironmentalConditions, EnvironmentalFeatureVector};
use crate::persona::Persona;
use crate::traits::{Clock, SystemClock};

pub use advice::{AdviceTable, generate_health_advice};
pub use category::RiskCategory;
pub use evaluation::{ClassificationMetrics, EvaluationReport};
pub use factors::{HourConditions, RiskFactor, analyze_risk_factors};
pub use model::{Direction, FactorContribution, LabeledExample, RiskModel, RiskResult};
pub use persistence::PersistedRiskModel;

/// Configuration for the risk classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Share of each class held out for evaluation
    pub test_fraction: f64,
    pub seed: u64,
    /// Factors reported per prediction
    pub top_k: usize,
    /// Generated examples used when no labelled data is supplied
    pub training_samples: usize,
    pub model_path: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 15,
            min_samples_split: 5,
            min_samples_leaf: 2,
            test_fraction: 0.2,
            seed: 42,
            top_k: 5,
            training_samples: 10_000,
            model_path: None,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.n_estimators == 0 {
            return Err(CoreError::invalid_parameter("n_estimators", "must be at least 1"));
        }
        if self.min_samples_leaf == 0 {
            return Err(CoreError::invalid_parameter("min_samples_leaf", "must be at least 1"));
        }
        if self.min_samples_split < 2 {
            return Err(CoreError::invalid_parameter("min_samples_split", "must be at least 2"));
        }
        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(CoreError::invalid_parameter(
                "test_fraction",
                format!("{} is outside [0, 1)", self.test_fraction),
            ));
        }
        Ok(())
    }
}

/// A prediction together with the guidance shown to the persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub persona: Persona,
    pub exposure_hours: f64,
    pub result: RiskResult,
    pub advice: String,
    pub explanation: String,
}

/// Shared classifier handle.
///
/// Predictions read the current model through an `Arc`; retraining builds
/// a complete new model first and then swaps the reference.
pub struct RiskService {
    config: ClassifierConfig,
    clock: Arc<dyn Clock>,
    model: RwLock<Option<Arc<RiskModel>>>,
    advice: AdviceTable,
}

impl RiskService {
    pub fn new(config: ClassifierConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ClassifierConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            model: RwLock::new(None),
            advice: AdviceTable::default(),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Replace the advice table, rejecting one with missing entries.
    pub fn with_advice(mut self, advice: AdviceTable) -> Result<Self, CoreError> {
        advice.validate()?;
        self.advice = advice;
        Ok(self)
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().is_some()
    }

    /// The model currently serving predictions.
    pub fn model(&self) -> Result<Arc<RiskModel>, CoreError> {
        self.model
            .read()
            .clone()
            .ok_or_else(|| CoreError::ModelNotTrained("risk classifier".to_string()))
    }

    /// Make `model` the active one.
    pub fn install(&self, model: RiskModel) -> Arc<RiskModel> {
        let model = Arc::new(model);
        *self.model.write() = Some(model.clone());
        info!(trained_at = %model.trained_at(), "risk classifier swapped in");
        model
    }

    /// Train on labelled examples and swap the result in.
    pub fn train_classifier(
        &self,
        examples: &[LabeledExample],
    ) -> Result<Arc<RiskModel>, CoreError> {
        let model = RiskModel::train(examples, &self.config, self.clock.as_ref())?;
        Ok(self.install(model))
    }

    /// Load the configured model file, or train on generated examples and
    /// save the result there.
    pub fn load_or_train(&self) -> Result<Arc<RiskModel>, CoreError> {
        if let Some(path) = &self.config.model_path {
            if path.exists() {
                match PersistedRiskModel::load(path) {
                    Ok(persisted) => {
                        info!(path = %path.display(), "loaded risk classifier");
                        return Ok(self.install(persisted.model.with_top_k(self.config.top_k)));
                    }
                    Err(e) => warn!(error = %e, "failed to load risk classifier, retraining"),
                }
            }
        }

        let examples =
            synthetic::generate_examples(self.config.training_samples, self.config.seed)?;
        let model = self.train_classifier(&examples)?;

        if let Some(path) = &self.config.model_path {
            PersistedRiskModel::new((*model).clone()).save(path)?;
            info!(path = %path.display(), "risk classifier saved");
        }
        Ok(model)
    }

    /// Classify conditions for a persona named by its identifier.
    pub fn predict_risk(
        &self,
        conditions: EnvironmentalConditions,
        persona: &str,
        exposure_hours: f64,
    ) -> Result<RiskResult, CoreError> {
        let persona: Persona = persona.parse()?;
        let vector = EnvironmentalFeatureVector::new(conditions, persona, exposure_hours)?;
        self.model()?.predict(&vector)
    }

    /// Prediction plus advice and explanation text.
    pub fn assess(
        &self,
        conditions: EnvironmentalConditions,
        persona: Persona,
        exposure_hours: f64,
    ) -> Result<RiskAssessment, CoreError> {
        let vector = EnvironmentalFeatureVector::new(conditions, persona, exposure_hours)?;
        let result = self.model()?.predict(&vector)?;
        let advice = self.advice.advice(result.risk_category, persona)?.to_string();

        Ok(RiskAssessment {
            persona,
            exposure_hours,
            explanation: result.explanation(),
            advice,
            result,
        })
    }
}
