//! Risk categories and their severity order

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Health-risk label produced by the classifier.
///
/// Variants are declared in increasing severity, so `Ord` compares
/// severity and `Hazardous` is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
    Hazardous,
}

impl RiskCategory {
    /// All categories, least severe first. Also the class index order.
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Low,
        RiskCategory::Moderate,
        RiskCategory::High,
        RiskCategory::Hazardous,
    ];

    pub const COUNT: usize = 4;

    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::Low => "Low",
            RiskCategory::Moderate => "Moderate",
            RiskCategory::High => "High",
            RiskCategory::Hazardous => "Hazardous",
        }
    }

    /// Class index used by the classifier.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Label for a WHO-aligned risk score.
    pub fn from_score(score: f64) -> Self {
        if score < 1.0 {
            RiskCategory::Low
        } else if score < 2.0 {
            RiskCategory::Moderate
        } else if score < 3.5 {
            RiskCategory::High
        } else {
            RiskCategory::Hazardous
        }
    }
}

impl FromStr for RiskCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CoreError::invalid_parameter("risk_category", format!("unknown category '{s}'"))
            })
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of the most probable class.
///
/// Exact ties go to the more severe category.
pub fn argmax_severity(probabilities: &[f64]) -> RiskCategory {
    let mut best = RiskCategory::Low;
    let mut best_p = f64::NEG_INFINITY;
    for category in RiskCategory::ALL {
        let p = probabilities.get(category.index()).copied().unwrap_or(0.0);
        // Ascending severity, so >= lets the later (more severe) class win ties
        if p >= best_p {
            best = category;
            best_p = p;
        }
    }
    best
}
