//! AeroGuard Library
//!
//! Hourly AQI forecasting and persona-aware health-risk scoring. The
//! forecaster, the risk classifier and the pipeline that joins them are
//! exposed here for the command-line tool, for tests and for reuse.

pub mod config;
pub mod error;
pub mod features;
pub mod forecast;
pub mod persona;
pub mod pipeline;
pub mod risk;
pub mod series;
pub mod traits;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{CoreError, ErrorKind, PersistenceError};
pub use features::{
    AqiBand, EnvironmentalConditions, EnvironmentalFeatureVector, EnvironmentalReading,
    aqi_to_pm25, pm10_to_aqi, pm25_to_aqi, summarize_pollutants, who_exceedance_ratio,
};
pub use forecast::{
    ForecastPoint, ForecastResult, ForecasterConfig, ForecasterStore, TrainedForecaster,
    forecast_series,
};
pub use persona::Persona;
pub use pipeline::{HourlyRisk, Pipeline, PipelineConfig, PipelineReport, PipelineSummary};
pub use risk::{
    AdviceTable, ClassifierConfig, Direction, FactorContribution, LabeledExample, RiskAssessment,
    RiskCategory, RiskModel, RiskResult, RiskService, generate_health_advice,
};
pub use series::TimeSeries;
pub use traits::{Clock, MockClock, RecordingModel, SequenceModel, SystemClock};
