//! Feature building for the forecaster and the risk classifier
//!
//! Converts raw pollutant concentrations and meteorological readings into the
//! fixed-order feature vector the classifier consumes, and hosts the EPA
//! breakpoint tables used to turn concentrations into AQI values.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;
use crate::persona::Persona;

/// WHO 2021 24-hour PM2.5 guideline, µg/m³.
pub const WHO_PM25_GUIDELINE: f64 = 15.0;

/// AQI assumed when neither PM2.5 nor PM10 is available.
pub const DEFAULT_AQI: f64 = 50.0;

/// Maximum exposure accepted by the classifier, in hours.
pub const MAX_EXPOSURE_HOURS: f64 = 24.0;

// ==================== AQI Breakpoints ====================

/// One linear segment of a breakpoint table.
#[derive(Debug, Clone, Copy)]
struct Breakpoint {
    conc_low: f64,
    conc_high: f64,
    index_low: f64,
    index_high: f64,
}

const fn bp(conc_low: f64, conc_high: f64, index_low: f64, index_high: f64) -> Breakpoint {
    Breakpoint {
        conc_low,
        conc_high,
        index_low,
        index_high,
    }
}

// Segments are contiguous; the last one is extrapolated past its upper end.
const PM25_BREAKPOINTS: [Breakpoint; 6] = [
    bp(0.0, 12.0, 0.0, 50.0),
    bp(12.0, 35.4, 50.0, 100.0),
    bp(35.4, 55.4, 100.0, 150.0),
    bp(55.4, 150.4, 150.0, 200.0),
    bp(150.4, 250.4, 200.0, 300.0),
    bp(250.4, 500.4, 300.0, 500.0),
];

const PM10_BREAKPOINTS: [Breakpoint; 6] = [
    bp(0.0, 54.0, 0.0, 50.0),
    bp(54.0, 154.0, 50.0, 100.0),
    bp(154.0, 254.0, 100.0, 150.0),
    bp(254.0, 354.0, 150.0, 200.0),
    bp(354.0, 424.0, 200.0, 300.0),
    bp(424.0, 604.0, 300.0, 500.0),
];

fn concentration_to_index(table: &[Breakpoint], conc: f64) -> f64 {
    let segment = table
        .iter()
        .find(|b| conc <= b.conc_high)
        .unwrap_or(&table[table.len() - 1]);
    segment.index_low
        + (segment.index_high - segment.index_low) / (segment.conc_high - segment.conc_low)
            * (conc - segment.conc_low)
}

fn index_to_concentration(table: &[Breakpoint], index: f64) -> f64 {
    let segment = table
        .iter()
        .find(|b| index <= b.index_high)
        .unwrap_or(&table[table.len() - 1]);
    segment.conc_low
        + (segment.conc_high - segment.conc_low) / (segment.index_high - segment.index_low)
            * (index - segment.index_low)
}

fn check_non_negative(field: &'static str, value: f64) -> Result<f64, CoreError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(CoreError::InvalidMeasurement { field, value })
    }
}

/// Convert a PM2.5 concentration (µg/m³) to AQI using EPA breakpoints.
pub fn pm25_to_aqi(pm25: f64) -> Result<f64, CoreError> {
    let pm25 = check_non_negative("pm25", pm25)?;
    Ok(concentration_to_index(&PM25_BREAKPOINTS, pm25))
}

/// Convert a PM10 concentration (µg/m³) to AQI using EPA breakpoints.
pub fn pm10_to_aqi(pm10: f64) -> Result<f64, CoreError> {
    let pm10 = check_non_negative("pm10", pm10)?;
    Ok(concentration_to_index(&PM10_BREAKPOINTS, pm10))
}

/// Inverse of [`pm25_to_aqi`].
pub fn aqi_to_pm25(aqi: f64) -> Result<f64, CoreError> {
    let aqi = check_non_negative("aqi", aqi)?;
    Ok(index_to_concentration(&PM25_BREAKPOINTS, aqi))
}

/// AQI for a set of pollutant readings.
///
/// PM2.5 is primary; PM10 is used when PM2.5 is missing or zero. With
/// neither available the explicit [`DEFAULT_AQI`] is substituted and logged.
pub fn summarize_pollutants(pm25: Option<f64>, pm10: Option<f64>) -> Result<f64, CoreError> {
    match (pm25, pm10) {
        (Some(pm25), _) if pm25 > 0.0 => pm25_to_aqi(pm25),
        (_, Some(pm10)) if pm10 > 0.0 => pm10_to_aqi(pm10),
        _ => {
            warn!(aqi = DEFAULT_AQI, "no particulate readings, substituting default AQI");
            Ok(DEFAULT_AQI)
        }
    }
}

/// Observed PM2.5 divided by the WHO 24-hour guideline.
pub fn who_exceedance_ratio(pm25: f64) -> f64 {
    pm25 / WHO_PM25_GUIDELINE
}

/// Standard AQI reporting bands, for presentation collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AqiBand {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiBand {
    pub fn from_aqi(aqi: f64) -> Self {
        match aqi {
            a if a <= 50.0 => AqiBand::Good,
            a if a <= 100.0 => AqiBand::Moderate,
            a if a <= 150.0 => AqiBand::UnhealthyForSensitive,
            a if a <= 200.0 => AqiBand::Unhealthy,
            a if a <= 300.0 => AqiBand::VeryUnhealthy,
            _ => AqiBand::Hazardous,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AqiBand::Good => "Good",
            AqiBand::Moderate => "Moderate",
            AqiBand::UnhealthyForSensitive => "Unhealthy for Sensitive",
            AqiBand::Unhealthy => "Unhealthy",
            AqiBand::VeryUnhealthy => "Very Unhealthy",
            AqiBand::Hazardous => "Hazardous",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            AqiBand::Good => "#00e400",
            AqiBand::Moderate => "#ffff00",
            AqiBand::UnhealthyForSensitive => "#ff7e00",
            AqiBand::Unhealthy => "#ff0000",
            AqiBand::VeryUnhealthy => "#8f3f97",
            AqiBand::Hazardous => "#7e0023",
        }
    }
}

// ==================== Environmental Features ====================

/// The eight environmental measurements the classifier consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalConditions {
    pub aqi: f64,
    pub pm25: f64,
    pub pm10: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub pressure: f64,
    pub visibility: f64,
}

impl EnvironmentalConditions {
    /// Reject negative particulates and any non-finite measurement.
    pub fn validate(&self) -> Result<(), CoreError> {
        check_non_negative("aqi", self.aqi)?;
        check_non_negative("pm25", self.pm25)?;
        check_non_negative("pm10", self.pm10)?;
        for (field, value) in [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("wind_speed", self.wind_speed),
            ("pressure", self.pressure),
            ("visibility", self.visibility),
        ] {
            if !value.is_finite() {
                return Err(CoreError::InvalidMeasurement { field, value });
            }
        }
        Ok(())
    }
}

/// A raw reading where meteorology may be missing.
///
/// AQI and PM2.5 are required; everything else falls back to a documented
/// default when absent, and each substitution is logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalReading {
    pub aqi: f64,
    pub pm25: f64,
    pub pm10: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub pressure: Option<f64>,
    pub visibility: Option<f64>,
}

/// Defaults substituted for missing meteorology.
pub mod defaults {
    pub const TEMPERATURE: f64 = 25.0;
    pub const HUMIDITY: f64 = 60.0;
    pub const WIND_SPEED: f64 = 5.0;
    pub const PRESSURE: f64 = 1013.0;
    pub const VISIBILITY: f64 = 8.0;
    /// PM10 is estimated from PM2.5 when missing.
    pub const PM10_PER_PM25: f64 = 1.5;
}

fn or_default(field: &'static str, value: Option<f64>, default: f64) -> f64 {
    value.unwrap_or_else(|| {
        warn!(field, default, "missing measurement, substituting default");
        default
    })
}

impl EnvironmentalReading {
    /// Fill in missing measurements and validate the particulate values.
    pub fn to_conditions(&self) -> Result<EnvironmentalConditions, CoreError> {
        let aqi = check_non_negative("aqi", self.aqi)?;
        let pm25 = check_non_negative("pm25", self.pm25)?;
        let pm10 = or_default("pm10", self.pm10, pm25 * defaults::PM10_PER_PM25);

        let conditions = EnvironmentalConditions {
            aqi,
            pm25,
            pm10,
            temperature: or_default("temperature", self.temperature, defaults::TEMPERATURE),
            humidity: or_default("humidity", self.humidity, defaults::HUMIDITY),
            wind_speed: or_default("wind_speed", self.wind_speed, defaults::WIND_SPEED),
            pressure: or_default("pressure", self.pressure, defaults::PRESSURE),
            visibility: or_default("visibility", self.visibility, defaults::VISIBILITY),
        };
        conditions.validate()?;
        Ok(conditions)
    }
}

/// Validate an exposure duration in hours.
pub fn validate_exposure(exposure_hours: f64) -> Result<f64, CoreError> {
    if exposure_hours.is_finite() && (0.0..=MAX_EXPOSURE_HOURS).contains(&exposure_hours) {
        Ok(exposure_hours)
    } else {
        Err(CoreError::InvalidExposure(exposure_hours))
    }
}

/// Fixed-order feature vector for the risk classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalFeatureVector {
    pub conditions: EnvironmentalConditions,
    pub exposure_duration: f64,
    pub persona: Persona,
}

impl EnvironmentalFeatureVector {
    /// Number of features
    pub const NUM_FEATURES: usize = 12;

    /// Build a vector, validating the measurements and the exposure duration.
    pub fn new(
        conditions: EnvironmentalConditions,
        persona: Persona,
        exposure_hours: f64,
    ) -> Result<Self, CoreError> {
        conditions.validate()?;
        Ok(Self {
            conditions,
            exposure_duration: validate_exposure(exposure_hours)?,
            persona,
        })
    }

    /// Convert features to a vector for the classifier
    pub fn to_vec(&self) -> Vec<f64> {
        let c = &self.conditions;
        let mut values = vec![
            c.aqi,
            c.pm25,
            c.pm10,
            c.temperature,
            c.humidity,
            c.wind_speed,
            c.pressure,
            c.visibility,
            self.exposure_duration,
        ];
        values.extend(self.persona.one_hot());
        values
    }

    /// Feature names, in [`to_vec`](Self::to_vec) order
    pub fn feature_names() -> [&'static str; Self::NUM_FEATURES] {
        [
            "aqi",
            "pm25",
            "pm10",
            "temperature",
            "humidity",
            "wind_speed",
            "pressure",
            "visibility",
            "exposure_duration",
            "persona_children_elderly",
            "persona_outdoor_workers",
            "persona_general_public",
        ]
    }
}
