//! Min/max scaling of AQI values into [0, 1]

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Affine map fitted from a series' observed range.
///
/// A constant series has zero range; it is then only shifted, never
/// divided, so scaling stays finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingState {
    min: f64,
    max: f64,
}

impl ScalingState {
    /// Fit to the min/max of `values`.
    pub fn fit(values: &[f64]) -> Result<Self, CoreError> {
        if values.is_empty() {
            return Err(CoreError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    fn range(&self) -> f64 {
        let range = self.max - self.min;
        if range > 0.0 { range } else { 1.0 }
    }

    pub fn scale(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn inverse_scale(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }

    pub fn scale_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| self.scale(*v)).collect()
    }

    pub fn inverse_scale_all(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|v| self.inverse_scale(*v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_maps_range_to_unit_interval() {
        let scaling = ScalingState::fit(&[40.0, 120.0, 80.0]).unwrap();

        assert_eq!(scaling.min(), 40.0);
        assert_eq!(scaling.max(), 120.0);
        assert_eq!(scaling.scale(40.0), 0.0);
        assert_eq!(scaling.scale(120.0), 1.0);
        assert_eq!(scaling.scale(80.0), 0.5);
    }

    #[test]
    fn test_fit_empty_fails() {
        assert!(matches!(
            ScalingState::fit(&[]),
            Err(CoreError::InsufficientData { required: 1, actual: 0 })
        ));
    }

    #[test]
    fn test_constant_series_stays_finite() {
        let scaling = ScalingState::fit(&[75.0, 75.0, 75.0]).unwrap();

        assert_eq!(scaling.scale(75.0), 0.0);
        assert_eq!(scaling.inverse_scale(0.0), 75.0);
        assert!(scaling.scale(80.0).is_finite());
    }

    #[test]
    fn test_values_outside_fit_extrapolate() {
        let scaling = ScalingState::fit(&[0.0, 100.0]).unwrap();

        assert_eq!(scaling.scale(150.0), 1.5);
        assert_eq!(scaling.inverse_scale(-0.5), -50.0);
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn inverse_scale_round_trips(
                values in prop::collection::vec(0.0f64..500.0, 2..64),
                pick in 0.0f64..=1.0
            ) {
                let scaling = ScalingState::fit(&values).unwrap();
                let v = scaling.min() + pick * (scaling.max() - scaling.min());
                let back = scaling.inverse_scale(scaling.scale(v));
                prop_assert!((back - v).abs() < 1e-9, "{} -> {}", v, back);
            }

            #[test]
            fn fitted_values_land_in_unit_interval(
                values in prop::collection::vec(0.0f64..500.0, 1..64)
            ) {
                let scaling = ScalingState::fit(&values).unwrap();
                for s in scaling.scale_all(&values) {
                    prop_assert!((0.0..=1.0).contains(&s));
                }
            }
        }
    }
}
