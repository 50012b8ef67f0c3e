//! Forecast → risk pipeline
//!
//! For one location: forecast AQI for the configured horizon, derive PM2.5
//! for every hour, then classify each hour for every persona and exposure
//! duration. The latest observed meteorology is carried forward unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::features::{
    AqiBand, EnvironmentalConditions, EnvironmentalReading, aqi_to_pm25, defaults,
    who_exceedance_ratio,
};
use crate::forecast::ForecasterStore;
use crate::persona::Persona;
use crate::risk::{
    HourConditions, RiskAssessment, RiskCategory, RiskFactor, RiskService, analyze_risk_factors,
    factors::who_status,
};

/// Configuration for the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub horizon_hours: usize,
    /// Exposure durations assessed for every persona
    pub exposure_hours: Vec<f64>,
    pub personas: Vec<Persona>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon_hours: 12,
            exposure_hours: vec![2.0, 6.0, 8.0],
            personas: Persona::ALL.to_vec(),
        }
    }
}

/// Everything known about one forecast hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRisk {
    pub hour: usize,
    pub timestamp: DateTime<Utc>,
    /// Raw model output
    pub forecast_aqi: f64,
    pub conditions: EnvironmentalConditions,
    pub aqi_band: String,
    pub aqi_color: String,
    pub who_exceedance_ratio: f64,
    pub who_status: String,
    pub risk_factors: Vec<RiskFactor>,
    pub assessments: Vec<RiskAssessment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub peak_aqi: f64,
    pub peak_hour: usize,
    /// Hours with PM2.5 above the WHO guideline
    pub who_exceedance_hours: usize,
    pub highest_risk: RiskCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub location: String,
    pub horizon: usize,
    pub hours: Vec<HourlyRisk>,
    pub summary: PipelineSummary,
}

/// Owns the forecaster store and the risk service for a process.
pub struct Pipeline {
    forecaster: ForecasterStore,
    risk: RiskService,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(forecaster: ForecasterStore, risk: RiskService, config: PipelineConfig) -> Self {
        Self {
            forecaster,
            risk,
            config,
        }
    }

    pub fn forecaster(&self) -> &ForecasterStore {
        &self.forecaster
    }

    pub fn risk(&self) -> &RiskService {
        &self.risk
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full forecast and risk assessment for a location.
    ///
    /// `latest` supplies the meteorology for every forecast hour; missing
    /// fields fall back to the documented defaults.
    pub fn run(
        &self,
        location: &str,
        latest: &EnvironmentalReading,
    ) -> Result<PipelineReport, CoreError> {
        let forecast = self.forecaster.forecast(location, self.config.horizon_hours)?;
        let observed = latest.to_conditions()?;

        let mut previous_aqi = self
            .forecaster
            .history(location)
            .and_then(|h| h.values().last().copied())
            .unwrap_or(observed.aqi);

        let mut hours = Vec::with_capacity(forecast.len());
        for (i, point) in forecast.points.iter().enumerate() {
            let aqi = if point.aqi < 0.0 {
                debug!(
                    location,
                    hour = i + 1,
                    aqi = point.aqi,
                    "negative forecast AQI clamped to 0"
                );
                0.0
            } else {
                point.aqi
            };
            let pm25 = aqi_to_pm25(aqi)?;
            let conditions = EnvironmentalConditions {
                aqi,
                pm25,
                pm10: pm25 * defaults::PM10_PER_PM25,
                ..observed
            };

            let risk_factors = analyze_risk_factors(&HourConditions {
                pm25,
                aqi_trend: aqi - previous_aqi,
                wind_speed: conditions.wind_speed,
                humidity: conditions.humidity,
            });
            previous_aqi = aqi;

            let mut assessments =
                Vec::with_capacity(self.config.personas.len() * self.config.exposure_hours.len());
            for &persona in &self.config.personas {
                for &exposure in &self.config.exposure_hours {
                    assessments.push(self.risk.assess(conditions, persona, exposure)?);
                }
            }

            let band = AqiBand::from_aqi(aqi);
            hours.push(HourlyRisk {
                hour: i + 1,
                timestamp: point.timestamp,
                forecast_aqi: point.aqi,
                conditions,
                aqi_band: band.label().to_string(),
                aqi_color: band.color().to_string(),
                who_exceedance_ratio: who_exceedance_ratio(pm25),
                who_status: who_status(pm25).to_string(),
                risk_factors,
                assessments,
            });
        }

        let summary = summarize(&hours);
        info!(
            location,
            horizon = hours.len(),
            peak_aqi = summary.peak_aqi,
            highest_risk = %summary.highest_risk,
            "pipeline finished"
        );

        Ok(PipelineReport {
            location: location.to_string(),
            horizon: hours.len(),
            hours,
            summary,
        })
    }
}

fn summarize(hours: &[HourlyRisk]) -> PipelineSummary {
    let (peak_hour, peak_aqi) = hours
        .iter()
        .map(|h| (h.hour, h.conditions.aqi))
        .fold((0, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

    PipelineSummary {
        peak_aqi: if hours.is_empty() { 0.0 } else { peak_aqi },
        peak_hour,
        who_exceedance_hours: hours.iter().filter(|h| h.who_exceedance_ratio > 1.0).count(),
        highest_risk: hours
            .iter()
            .flat_map(|h| h.assessments.iter().map(|a| a.result.risk_category))
            .max()
            .unwrap_or(RiskCategory::Low),
    }
}
