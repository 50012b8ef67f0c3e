//! Trained risk classifier: scaler + forest + attribution

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::features::EnvironmentalFeatureVector;
use crate::traits::Clock;

use super::ClassifierConfig;
use super::category::{RiskCategory, argmax_severity};
use super::evaluation::{ClassificationMetrics, EvaluationReport};
use super::forest::{ForestParams, RandomForest, TreeParams};
use super::scaler::StandardScaler;

/// Allowed deviation of the probability sum from 1.
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// A feature vector with its ground-truth category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub features: EnvironmentalFeatureVector,
    pub label: RiskCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increases,
    Decreases,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Increases => "increases",
            Direction::Decreases => "decreases",
        })
    }
}

/// One feature's share of the predicted class probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub feature_name: String,
    /// Raw (unscaled) input value
    pub value: f64,
    pub signed_contribution: f64,
    pub direction: Direction,
    pub magnitude: f64,
}

/// Category, probability distribution and ranked factors for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    pub risk_category: RiskCategory,
    pub probabilities: BTreeMap<RiskCategory, f64>,
    pub confidence: f64,
    pub factors: Vec<FactorContribution>,
}

impl RiskResult {
    pub fn probability(&self, category: RiskCategory) -> f64 {
        self.probabilities.get(&category).copied().unwrap_or(0.0)
    }

    /// Human-readable summary of the top factors.
    pub fn explanation(&self) -> String {
        let mut text = format!(
            "Risk classified as {}.\n\nKey factors influencing this prediction:\n",
            self.risk_category
        );
        for (i, factor) in self.factors.iter().enumerate() {
            text.push_str(&format!(
                "{}. {} ({:.1}) {} risk\n",
                i + 1,
                title_case(&factor.feature_name),
                factor.value,
                factor.direction
            ));
        }
        text
    }
}

fn title_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Every category absent from `examples`.
fn missing_categories(examples: &[LabeledExample]) -> Vec<RiskCategory> {
    RiskCategory::ALL
        .into_iter()
        .filter(|c| !examples.iter().any(|e| e.label == *c))
        .collect()
}

/// Split indices per class so both sides keep the class proportions.
fn stratified_split(
    labels: &[RiskCategory],
    test_fraction: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let mut train = Vec::new();
    let mut test = Vec::new();
    for category in RiskCategory::ALL {
        let mut members: Vec<usize> = (0..labels.len())
            .filter(|&i| labels[i] == category)
            .collect();
        members.shuffle(rng);
        // Keep at least one example of every class for training
        let n_test = ((members.len() as f64 * test_fraction).round() as usize)
            .min(members.len().saturating_sub(1));
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Weights inversely proportional to class frequency.
///
/// `n_samples / (n_classes * count[class])`, so every class carries the
/// same total weight.
pub fn balanced_class_weights(labels: &[RiskCategory]) -> [f64; RiskCategory::COUNT] {
    let mut counts = [0usize; RiskCategory::COUNT];
    for label in labels {
        counts[label.index()] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
    let n = labels.len() as f64;
    counts.map(|c| if c == 0 { 0.0 } else { n / (present * c as f64) })
}

fn to_matrix(examples: &[LabeledExample], indices: &[usize]) -> Result<Array2<f64>, CoreError> {
    let flat: Vec<f64> = indices
        .iter()
        .flat_map(|&i| examples[i].features.to_vec())
        .collect();
    Array2::from_shape_vec((indices.len(), EnvironmentalFeatureVector::NUM_FEATURES), flat)
        .map_err(|e| CoreError::invalid_parameter("examples", e.to_string()))
}

/// Trained classifier; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskModel {
    scaler: StandardScaler,
    forest: RandomForest,
    feature_names: Vec<String>,
    top_k: usize,
    evaluation: EvaluationReport,
    trained_at: DateTime<Utc>,
}

impl RiskModel {
    /// Fit scaler and forest on `examples`.
    ///
    /// Requires every category to be present. A stratified share of the
    /// examples is held out for the evaluation report.
    pub fn train(
        examples: &[LabeledExample],
        config: &ClassifierConfig,
        clock: &dyn Clock,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let missing = missing_categories(examples);
        if !missing.is_empty() {
            return Err(CoreError::InsufficientClassCoverage {
                missing: missing.iter().map(ToString::to_string).collect(),
            });
        }

        let labels: Vec<RiskCategory> = examples.iter().map(|e| e.label).collect();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let (train_idx, test_idx) = stratified_split(&labels, config.test_fraction, &mut rng);

        let x_train = to_matrix(examples, &train_idx)?;
        let y_train: Vec<RiskCategory> = train_idx.iter().map(|&i| labels[i]).collect();

        let scaler = StandardScaler::fit(&x_train)?;
        let x_train_scaled = scaler.transform_matrix(&x_train)?;

        let class_weights = balanced_class_weights(&y_train);
        let sample_weight: Vec<f64> = y_train.iter().map(|c| class_weights[c.index()]).collect();
        let y_indices: Vec<usize> = y_train.iter().map(|c| c.index()).collect();

        let n_features = EnvironmentalFeatureVector::NUM_FEATURES;
        let params = ForestParams {
            n_estimators: config.n_estimators,
            tree: TreeParams {
                max_depth: config.max_depth,
                min_samples_split: config.min_samples_split,
                min_samples_leaf: config.min_samples_leaf,
                max_features: ((n_features as f64).sqrt() as usize).max(1),
            },
            seed: config.seed,
        };

        info!(
            train = train_idx.len(),
            test = test_idx.len(),
            trees = config.n_estimators,
            "training risk classifier"
        );
        let forest = RandomForest::fit(
            &x_train_scaled,
            &y_indices,
            &sample_weight,
            RiskCategory::COUNT,
            &params,
        )?;

        let mut importance: Vec<(String, f64)> = EnvironmentalFeatureVector::feature_names()
            .iter()
            .map(|s| s.to_string())
            .zip(forest.feature_importances())
            .collect();
        importance.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut model = Self {
            scaler,
            forest,
            feature_names: EnvironmentalFeatureVector::feature_names()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            top_k: config.top_k,
            evaluation: EvaluationReport {
                train_accuracy: 0.0,
                test: ClassificationMetrics::compute(&[], &[]),
                training_samples: train_idx.len(),
                test_samples: test_idx.len(),
                feature_importance: importance,
            },
            trained_at: clock.now_utc(),
        };

        let predict_all =
            |model: &Self, indices: &[usize]| -> Result<Vec<RiskCategory>, CoreError> {
                indices
                    .iter()
                    .map(|&i| model.classify(&examples[i].features.to_vec()).map(|(c, _, _)| c))
                    .collect()
            };

        let train_pred = predict_all(&model, &train_idx)?;
        model.evaluation.train_accuracy =
            ClassificationMetrics::compute(&y_train, &train_pred).accuracy;

        let test_truth: Vec<RiskCategory> = test_idx.iter().map(|&i| labels[i]).collect();
        let test_pred = predict_all(&model, &test_idx)?;
        model.evaluation.test = ClassificationMetrics::compute(&test_truth, &test_pred);

        info!(
            train_accuracy = model.evaluation.train_accuracy,
            test_accuracy = model.evaluation.test.accuracy,
            "risk classifier trained"
        );
        debug!("\n{}", model.evaluation.test);

        Ok(model)
    }

    pub fn evaluation(&self) -> &EvaluationReport {
        &self.evaluation
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Use a different number of reported factors.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Feature importances in feature order, summing to 1.
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        self.feature_names
            .iter()
            .cloned()
            .zip(self.forest.feature_importances())
            .collect()
    }

    /// Category, scaled input and class probabilities for raw values.
    fn classify(&self, values: &[f64]) -> Result<(RiskCategory, Vec<f64>, Vec<f64>), CoreError> {
        let scaled = self.scaler.transform(values)?;
        let names = EnvironmentalFeatureVector::feature_names();
        if let Some((i, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(CoreError::InvalidMeasurement {
                field: names.get(i).copied().unwrap_or("feature"),
                value,
            });
        }
        let probabilities = self.forest.predict_proba(&scaled);

        let sum: f64 = probabilities.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(CoreError::ProbabilityNotNormalized(sum));
        }

        Ok((argmax_severity(&probabilities), scaled, probabilities))
    }

    /// Predict from raw feature values in
    /// [`EnvironmentalFeatureVector::feature_names`] order.
    ///
    /// Features with no contribution on any decision path are left out of
    /// `factors`, so it may hold fewer than `top_k` entries.
    pub fn predict_values(&self, values: &[f64]) -> Result<RiskResult, CoreError> {
        let (risk_category, scaled, probabilities) = self.classify(values)?;

        let contributions = self
            .forest
            .contributions(&scaled)
            .for_class(risk_category.index());

        let mut factors: Vec<FactorContribution> = self
            .feature_names
            .iter()
            .zip(values)
            .zip(contributions)
            .filter(|(_, signed)| *signed != 0.0)
            .map(|((name, &value), signed)| FactorContribution {
                feature_name: name.clone(),
                value,
                signed_contribution: signed,
                direction: if signed > 0.0 {
                    Direction::Increases
                } else {
                    Direction::Decreases
                },
                magnitude: signed.abs(),
            })
            .collect();
        // Stable sort keeps feature order among equal magnitudes
        factors.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
        factors.truncate(self.top_k);

        Ok(RiskResult {
            risk_category,
            confidence: probabilities[risk_category.index()],
            probabilities: RiskCategory::ALL
                .into_iter()
                .zip(probabilities)
                .collect(),
            factors,
        })
    }

    pub fn predict(&self, vector: &EnvironmentalFeatureVector) -> Result<RiskResult, CoreError> {
        self.predict_values(&vector.to_vec())
    }
}
