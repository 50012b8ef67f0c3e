//! Rule-based risk factors for reports
//!
//! Independent of the classifier: simple thresholds on a forecast hour that
//! explain conditions in plain terms.

use serde::{Deserialize, Serialize};

use crate::features::who_exceedance_ratio;

/// Observed or forecast conditions for one hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourConditions {
    pub pm25: f64,
    /// Change in AQI since the previous hour
    pub aqi_trend: f64,
    pub wind_speed: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub level: String,
    pub value: String,
    pub impact: String,
}

impl RiskFactor {
    fn new(factor: &str, level: &str, value: String, impact: &str) -> Self {
        Self {
            factor: factor.to_string(),
            level: level.to_string(),
            value,
            impact: impact.to_string(),
        }
    }
}

/// Whether PM2.5 is above the WHO 24-hour guideline.
pub fn who_status(pm25: f64) -> &'static str {
    if who_exceedance_ratio(pm25) > 1.0 {
        "Exceeds WHO guideline"
    } else {
        "Within WHO guideline"
    }
}

pub fn analyze_risk_factors(hour: &HourConditions) -> Vec<RiskFactor> {
    let mut factors = Vec::new();

    let pm25_band = if hour.pm25 > 150.0 {
        Some(("Hazardous", "Severe health impact"))
    } else if hour.pm25 > 75.0 {
        Some(("High", "Significant health impact"))
    } else if hour.pm25 > 35.0 {
        Some(("Moderate", "Moderate health impact"))
    } else {
        None
    };
    if let Some((level, impact)) = pm25_band {
        factors.push(RiskFactor::new("PM2.5", level, format!("{:.1}", hour.pm25), impact));
    }

    if hour.aqi_trend > 2.0 {
        factors.push(RiskFactor::new(
            "AQI Trend",
            "Worsening",
            format!("Trend {:.1}", hour.aqi_trend),
            "Air quality deteriorating",
        ));
    } else if hour.aqi_trend < -2.0 {
        factors.push(RiskFactor::new(
            "AQI Trend",
            "Improving",
            format!("Trend {:.1}", hour.aqi_trend),
            "Air quality improving",
        ));
    }

    if hour.wind_speed < 3.0 {
        factors.push(RiskFactor::new(
            "Wind Speed",
            "Poor",
            format!("{:.1} km/h", hour.wind_speed),
            "Poor pollutant dispersion",
        ));
    }

    if hour.humidity > 80.0 {
        factors.push(RiskFactor::new(
            "Humidity",
            "High",
            format!("{:.0}%", hour.humidity),
            "Increases pollutant impact",
        ));
    }

    let ratio = who_exceedance_ratio(hour.pm25);
    if ratio > 2.0 {
        factors.push(RiskFactor::new(
            "WHO Guideline",
            "Critical",
            format!("{ratio:.1}x exceedance"),
            "Far above safe levels",
        ));
    } else if ratio > 1.0 {
        factors.push(RiskFactor::new(
            "WHO Guideline",
            "Warning",
            format!("{ratio:.1}x exceedance"),
            "Above safe levels",
        ));
    }

    factors
}
