//! End-to-end tests: readings CSV → hourly series → forecast → risk report.

use std::fmt::Write as _;
use std::fs;

use aeroguard::{
    ClassifierConfig, CoreError, ForecasterConfig, ForecasterStore, Persona, Pipeline,
    PipelineConfig, RiskCategory, RiskService, series,
};
use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;

fn readings_csv(hours: usize) -> String {
    let start = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
    let mut csv = String::from(
        "timestamp,location,aqi,pm25,pm10,temperature,humidity,wind_speed,pressure,visibility\n",
    );
    for i in 0..hours {
        let ts = (start + Duration::hours(i as i64)).to_rfc3339();
        let aqi = 120.0 + 40.0 * ((i % 24) as f64 / 24.0 * std::f64::consts::TAU).sin();
        // Another location interleaved, plus a row without meteorology
        writeln!(csv, "{ts},Airoli,{aqi:.1},{:.1},,24.0,82.0,2.5,1009.0,5.0", aqi * 0.4).unwrap();
        writeln!(csv, "{ts},Panvel,60.0,18.0,,,,,,").unwrap();
    }
    csv
}

fn pipeline(config: PipelineConfig) -> Pipeline {
    let forecaster = ForecasterStore::new(ForecasterConfig {
        window_size: 12,
        max_epochs: 8,
        batch_size: 16,
        hidden_units: 8,
        learning_rate: 0.01,
        ..Default::default()
    });
    let risk = RiskService::new(ClassifierConfig {
        n_estimators: 20,
        training_samples: 1500,
        ..Default::default()
    });
    risk.load_or_train().unwrap();
    Pipeline::new(forecaster, risk, config)
}

#[test]
fn test_csv_to_report() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("readings.csv");
    fs::write(&path, readings_csv(96)).unwrap();

    let records = series::load_location_records(&path, "airoli").unwrap();
    assert_eq!(records.len(), 96);
    let history = series::series_from_records(&records).unwrap();
    let latest = records
        .iter()
        .rev()
        .find_map(|r| r.environmental_reading())
        .unwrap();

    let pipeline = pipeline(PipelineConfig::default());
    pipeline.forecaster().update_history("Airoli", history.clone());
    let report = pipeline.run("Airoli", &latest).unwrap();

    assert_eq!(report.location, "Airoli");
    assert_eq!(report.hours.len(), 12);

    let last = history.last_timestamp().unwrap();
    for (i, hour) in report.hours.iter().enumerate() {
        assert_eq!(hour.hour, i + 1);
        assert_eq!(hour.timestamp, last + Duration::hours(i as i64 + 1));
        assert!(hour.conditions.aqi >= 0.0);
        assert_eq!(hour.conditions.humidity, 82.0);
        assert_eq!(hour.conditions.wind_speed, 2.5);
        assert_eq!(hour.assessments.len(), 9);
        assert!(hour.risk_factors.iter().any(|f| f.factor == "Humidity"));
    }

    let worst = report
        .hours
        .iter()
        .flat_map(|h| h.assessments.iter().map(|a| a.result.risk_category))
        .max()
        .unwrap();
    assert_eq!(report.summary.highest_risk, worst);
    assert!(report.summary.peak_hour >= 1);
}

#[test]
fn test_assessments_cover_personas_and_exposures() {
    let pipeline = pipeline(PipelineConfig {
        horizon_hours: 2,
        exposure_hours: vec![1.0, 4.0],
        personas: vec![Persona::OutdoorWorkers, Persona::GeneralPublic],
    });
    let dir = tempdir().unwrap();
    let path = dir.path().join("readings.csv");
    fs::write(&path, readings_csv(48)).unwrap();
    let records = series::load_location_records(&path, "Airoli").unwrap();
    pipeline
        .forecaster()
        .update_history("Airoli", series::series_from_records(&records).unwrap());

    let report = pipeline
        .run("Airoli", &records[records.len() - 1].environmental_reading().unwrap())
        .unwrap();

    let combos: Vec<(Persona, f64)> = report.hours[0]
        .assessments
        .iter()
        .map(|a| (a.persona, a.exposure_hours))
        .collect();
    assert_eq!(
        combos,
        vec![
            (Persona::OutdoorWorkers, 1.0),
            (Persona::OutdoorWorkers, 4.0),
            (Persona::GeneralPublic, 1.0),
            (Persona::GeneralPublic, 4.0),
        ]
    );
}

#[test]
fn test_invalid_exposure_surfaces() {
    let pipeline = pipeline(PipelineConfig {
        horizon_hours: 1,
        exposure_hours: vec![30.0],
        personas: vec![Persona::GeneralPublic],
    });
    let dir = tempdir().unwrap();
    let path = dir.path().join("readings.csv");
    fs::write(&path, readings_csv(48)).unwrap();
    let records = series::load_location_records(&path, "Airoli").unwrap();
    pipeline
        .forecaster()
        .update_history("Airoli", series::series_from_records(&records).unwrap());

    let result = pipeline.run("Airoli", &records[0].environmental_reading().unwrap());

    assert!(matches!(result, Err(CoreError::InvalidExposure(_))));
}

#[test]
fn test_unknown_location() {
    let result = pipeline(PipelineConfig::default()).run(
        "Ulwe",
        &aeroguard::EnvironmentalReading {
            aqi: 80.0,
            pm25: 25.0,
            ..Default::default()
        },
    );

    assert!(matches!(result, Err(CoreError::ModelNotTrained(_))));
}

#[test]
fn test_report_round_trips_through_json() {
    let pipeline = pipeline(PipelineConfig {
        horizon_hours: 1,
        exposure_hours: vec![2.0],
        personas: vec![Persona::ChildrenElderly],
    });
    let dir = tempdir().unwrap();
    let path = dir.path().join("readings.csv");
    fs::write(&path, readings_csv(48)).unwrap();
    let records = series::load_location_records(&path, "Airoli").unwrap();
    pipeline
        .forecaster()
        .update_history("Airoli", series::series_from_records(&records).unwrap());

    let report = pipeline
        .run("Airoli", &records[0].environmental_reading().unwrap())
        .unwrap();
    let json = serde_json::to_string(&report).unwrap();
    let parsed: aeroguard::PipelineReport = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.hours[0].assessments[0].persona, Persona::ChildrenElderly);
    assert!(RiskCategory::ALL.contains(&parsed.summary.highest_risk));
}
