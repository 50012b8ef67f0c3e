//! Classification metrics for the risk model

use std::fmt;

use serde::{Deserialize, Serialize};

use super::category::RiskCategory;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub category: RiskCategory,
    pub precision: f64,
    pub recall: f64,
    /// Number of true examples of this class
    pub support: usize,
}

/// Accuracy, per-class precision/recall and the confusion matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    /// `confusion[truth][predicted]`
    pub confusion: [[usize; RiskCategory::COUNT]; RiskCategory::COUNT],
}

impl ClassificationMetrics {
    /// Compare predictions against ground truth.
    ///
    /// Precision for a class that was never predicted is reported as 0.
    pub fn compute(truth: &[RiskCategory], predicted: &[RiskCategory]) -> Self {
        let mut confusion = [[0usize; RiskCategory::COUNT]; RiskCategory::COUNT];
        for (t, p) in truth.iter().zip(predicted) {
            confusion[t.index()][p.index()] += 1;
        }

        let total = truth.len().min(predicted.len());
        let correct: usize = (0..RiskCategory::COUNT).map(|i| confusion[i][i]).sum();
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };

        let per_class = RiskCategory::ALL
            .iter()
            .map(|&category| {
                let i = category.index();
                let tp = confusion[i][i] as f64;
                let predicted_as: usize = (0..RiskCategory::COUNT).map(|t| confusion[t][i]).sum();
                let support: usize = confusion[i].iter().sum();
                ClassMetrics {
                    category,
                    precision: if predicted_as == 0 { 0.0 } else { tp / predicted_as as f64 },
                    recall: if support == 0 { 0.0 } else { tp / support as f64 },
                    support,
                }
            })
            .collect();

        Self {
            accuracy,
            per_class,
            confusion,
        }
    }

    pub fn class(&self, category: RiskCategory) -> Option<&ClassMetrics> {
        self.per_class.iter().find(|m| m.category == category)
    }
}

impl fmt::Display for ClassificationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {:>9} {:>9} {:>9}", "", "precision", "recall", "support")?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:<10} {:>9.3} {:>9.3} {:>9}",
                m.category.as_str(),
                m.precision,
                m.recall,
                m.support
            )?;
        }
        write!(f, "accuracy {:.3}", self.accuracy)
    }
}

/// Summary of a classifier training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub train_accuracy: f64,
    pub test: ClassificationMetrics,
    pub training_samples: usize,
    pub test_samples: usize,
    /// Feature importances, most important first
    pub feature_importance: Vec<(String, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::category::RiskCategory::*;

    #[test]
    fn test_perfect_predictions() {
        let truth = [Low, Moderate, High, Hazardous];
        let metrics = ClassificationMetrics::compute(&truth, &truth);

        assert_eq!(metrics.accuracy, 1.0);
        assert!(metrics.per_class.iter().all(|m| m.precision == 1.0 && m.recall == 1.0));
    }

    #[test]
    fn test_precision_recall() {
        let truth = [Low, Low, Low, High];
        let predicted = [Low, Low, High, High];
        let metrics = ClassificationMetrics::compute(&truth, &predicted);

        assert_eq!(metrics.accuracy, 0.75);
        let low = metrics.class(Low).unwrap();
        assert_eq!(low.precision, 1.0);
        assert!((low.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(low.support, 3);

        let high = metrics.class(High).unwrap();
        assert_eq!(high.precision, 0.5);
        assert_eq!(high.recall, 1.0);

        let moderate = metrics.class(Moderate).unwrap();
        assert_eq!(moderate.precision, 0.0);
        assert_eq!(moderate.support, 0);

        assert_eq!(metrics.confusion[Low.index()][High.index()], 1);
    }

    #[test]
    fn test_empty_input() {
        let metrics = ClassificationMetrics::compute(&[], &[]);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_display_lists_classes() {
        let metrics = ClassificationMetrics::compute(&[Low, Hazardous], &[Low, High]);
        let text = metrics.to_string();

        assert!(text.contains("Hazardous"));
        assert!(text.contains("accuracy 0.500"));
    }
}
