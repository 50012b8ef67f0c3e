//! WHO-aligned labelled examples for bootstrapping the classifier
//!
//! Labels come from a risk score built on the PM2.5 exceedance of the WHO
//! 24-hour guideline, scaled by persona sensitivity and exposure, with
//! multiplicative penalties for humid, still or hot conditions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Exp, LogNormal, Normal, Uniform};
use tracing::info;

use crate::error::CoreError;
use crate::features::{EnvironmentalConditions, EnvironmentalFeatureVector, who_exceedance_ratio};
use crate::persona::Persona;

use super::category::RiskCategory;
use super::model::LabeledExample;

/// Exposure durations are drawn from `[0, MAX_SYNTHETIC_EXPOSURE)`.
const MAX_SYNTHETIC_EXPOSURE: f64 = 12.0;

/// Deterministic part of the WHO-aligned risk score.
pub fn who_risk_score(
    conditions: &EnvironmentalConditions,
    persona: Persona,
    exposure_hours: f64,
) -> f64 {
    let exposure_factor = 1.0 + (exposure_hours / MAX_SYNTHETIC_EXPOSURE) * 0.5;
    let mut score = who_exceedance_ratio(conditions.pm25) * persona.sensitivity() * exposure_factor;

    if conditions.humidity > 80.0 {
        score *= 1.2;
    }
    if conditions.wind_speed < 2.0 {
        score *= 1.3;
    }
    if conditions.temperature > 35.0 {
        score *= 1.1;
    }
    score
}

fn distribution_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::invalid_parameter("distribution", e.to_string())
}

/// Generate `n` labelled examples from a fixed seed.
pub fn generate_examples(n: usize, seed: u64) -> Result<Vec<LabeledExample>, CoreError> {
    let mut rng = StdRng::seed_from_u64(seed);

    let aqi = Normal::<f64>::new(100.0, 50.0).map_err(distribution_error)?;
    let pm25 = LogNormal::new(3.5, 0.8).map_err(distribution_error)?;
    let pm10_ratio = Uniform::new(1.5, 2.5).map_err(distribution_error)?;
    let temperature = Normal::new(25.0, 8.0).map_err(distribution_error)?;
    let humidity = Normal::new(60.0, 20.0).map_err(distribution_error)?;
    // Mean 5 km/h
    let wind = Exp::new(1.0 / 5.0).map_err(distribution_error)?;
    let pressure = Normal::new(1013.0, 10.0).map_err(distribution_error)?;
    let visibility = Normal::new(8.0, 3.0).map_err(distribution_error)?;
    let exposure = Uniform::new(0.0, MAX_SYNTHETIC_EXPOSURE).map_err(distribution_error)?;
    let noise = Normal::new(0.0, 0.1).map_err(distribution_error)?;

    let mut examples = Vec::with_capacity(n);
    let mut counts = [0usize; RiskCategory::COUNT];

    for _ in 0..n {
        let pm25_value: f64 = rng.sample(&pm25);
        let conditions = EnvironmentalConditions {
            aqi: rng.sample(&aqi).max(0.0),
            pm25: pm25_value,
            pm10: pm25_value * rng.sample(&pm10_ratio),
            temperature: rng.sample(&temperature),
            humidity: rng.sample(&humidity),
            wind_speed: rng.sample(&wind),
            pressure: rng.sample(&pressure),
            visibility: rng.sample(&visibility),
        };
        let exposure_hours: f64 = rng.sample(&exposure);
        let persona = Persona::ALL[rng.random_range(0..Persona::ALL.len())];

        let score = who_risk_score(&conditions, persona, exposure_hours) + rng.sample(&noise);
        let label = RiskCategory::from_score(score);
        counts[label.index()] += 1;

        examples.push(LabeledExample {
            features: EnvironmentalFeatureVector::new(conditions, persona, exposure_hours)?,
            label,
        });
    }

    info!(
        samples = n,
        low = counts[0],
        moderate = counts[1],
        high = counts[2],
        hazardous = counts[3],
        "generated WHO-aligned training data"
    );

    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> EnvironmentalConditions {
        EnvironmentalConditions {
            aqi: 60.0,
            pm25: 30.0,
            pm10: 45.0,
            temperature: 25.0,
            humidity: 50.0,
            wind_speed: 5.0,
            pressure: 1013.0,
            visibility: 8.0,
        }
    }

    #[test]
    fn test_score_baseline() {
        // 30 / 15 = 2, no exposure, general public
        let score = who_risk_score(&calm(), Persona::GeneralPublic, 0.0);
        assert!((score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_modifiers() {
        let harsh = EnvironmentalConditions {
            humidity: 85.0,
            wind_speed: 1.0,
            temperature: 36.0,
            ..calm()
        };
        let score = who_risk_score(&harsh, Persona::ChildrenElderly, 12.0);
        let expected = 2.0 * 1.5 * 1.5 * 1.2 * 1.3 * 1.1;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_generation_is_seeded() {
        let a = generate_examples(50, 7).unwrap();
        let b = generate_examples(50, 7).unwrap();
        let c = generate_examples(50, 8).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_generation_covers_all_categories() {
        let examples = generate_examples(2000, 42).unwrap();

        for category in RiskCategory::ALL {
            assert!(
                examples.iter().any(|e| e.label == category),
                "no {category} examples"
            );
        }
        assert!(
            examples
                .iter()
                .all(|e| (0.0..MAX_SYNTHETIC_EXPOSURE).contains(&e.features.exposure_duration))
        );
    }
}
