//! Per-feature standardization

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Zero-mean, unit-variance transform fitted on a training matrix.
///
/// Features with zero variance are centred but not rescaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit on `x`, one sample per row.
    pub fn fit(x: &Array2<f64>) -> Result<Self, CoreError> {
        if x.nrows() == 0 {
            return Err(CoreError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        // Population standard deviation
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> ArrayView1<'_, f64> {
        self.mean.view()
    }

    fn check(&self, actual: usize) -> Result<(), CoreError> {
        if actual != self.n_features() {
            return Err(CoreError::FeatureScalerMismatch {
                expected: self.n_features(),
                actual,
            });
        }
        Ok(())
    }

    /// Standardize one sample.
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>, CoreError> {
        self.check(row.len())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    /// Standardize every row of `x`.
    pub fn transform_matrix(&self, x: &Array2<f64>) -> Result<Array2<f64>, CoreError> {
        self.check(x.ncols())?;
        Ok((x - &self.mean) / &self.scale)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_fit_transform_standardizes() {
        let x = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let z = scaler.transform_matrix(&x).unwrap();

        let col0 = z.column(0);
        assert!(col0.sum().abs() < 1e-12);
        assert!((col0.mapv(|v| v * v).mean().unwrap() - 1.0).abs() < 1e-12);

        // Constant column is centred, not divided by zero
        assert!(z.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_transform_matches_matrix() {
        let x = array![[1.0, 2.0], [2.0, 6.0], [4.0, 1.0]];
        let scaler = StandardScaler::fit(&x).unwrap();

        let row = scaler.transform(&[2.0, 6.0]).unwrap();
        let matrix = scaler.transform_matrix(&x).unwrap();

        assert!((row[0] - matrix[[1, 0]]).abs() < 1e-12);
        assert!((row[1] - matrix[[1, 1]]).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0, 3.0]]).unwrap();
        let result = scaler.transform(&[1.0, 2.0]);

        assert!(matches!(
            result,
            Err(CoreError::FeatureScalerMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_fit_empty() {
        let x = Array2::<f64>::zeros((0, 4));
        assert!(matches!(
            StandardScaler::fit(&x),
            Err(CoreError::InsufficientData { .. })
        ));
    }
}
