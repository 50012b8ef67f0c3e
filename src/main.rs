use std::path::{Path, PathBuf};

use aeroguard::{
    EnvironmentalReading, ForecasterStore, Persona, Pipeline, RiskService, config::AppConfig,
    series,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "aeroguard")]
#[command(about = "AQI forecasting and persona-aware health-risk scoring")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forecast hourly AQI for a location
    Forecast {
        /// Readings CSV (timestamp, location, aqi, ...)
        #[arg(short, long)]
        csv: PathBuf,

        /// Location name as it appears in the CSV
        #[arg(short, long)]
        location: String,

        /// Hours to forecast
        #[arg(long, default_value = "24")]
        horizon: usize,
    },

    /// Retrain the forecaster for a location and refresh its cache entry
    Train {
        #[arg(short, long)]
        csv: PathBuf,

        #[arg(short, long)]
        location: String,

        /// Window size (defaults to the configured one)
        #[arg(long)]
        window: Option<usize>,

        /// Epoch limit (defaults to the configured one)
        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Train the risk classifier and save it to the configured model path
    TrainClassifier,

    /// Classify one set of conditions
    Assess {
        /// children_elderly, outdoor_workers or general_public
        #[arg(short, long)]
        persona: String,

        /// Exposure duration in hours (0-24)
        #[arg(short, long)]
        exposure: f64,

        #[arg(long)]
        aqi: f64,

        #[arg(long)]
        pm25: f64,

        #[arg(long)]
        pm10: Option<f64>,

        #[arg(long)]
        temperature: Option<f64>,

        #[arg(long)]
        humidity: Option<f64>,

        #[arg(long)]
        wind_speed: Option<f64>,

        #[arg(long)]
        pressure: Option<f64>,

        #[arg(long)]
        visibility: Option<f64>,
    },

    /// Forecast a location and assess every forecast hour
    Pipeline {
        #[arg(short, long)]
        csv: PathBuf,

        #[arg(short, long)]
        location: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("aeroguard=debug");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    match args.command {
        Command::Forecast {
            csv,
            location,
            horizon,
        } => {
            let store = ForecasterStore::new(config.forecaster.clone());
            load_history(&store, &csv, &location)?;
            let result = store
                .forecast(&location, horizon)
                .with_context(|| format!("Failed to forecast {location}"))?;
            print_json(&result)
        }
        Command::Train {
            csv,
            location,
            window,
            epochs,
        } => {
            let store = ForecasterStore::new(config.forecaster.clone());
            let records = series::load_location_records(&csv, &location)?;
            let history = series::series_from_records(&records)?;
            let trained = store.train_forecaster(
                &location,
                history,
                window.unwrap_or(config.forecaster.window_size),
                epochs.unwrap_or(config.forecaster.max_epochs),
            )?;
            print_json(&trained.report)
        }
        Command::TrainClassifier => {
            let service = RiskService::new(config.classifier.clone());
            let examples = aeroguard::risk::synthetic::generate_examples(
                config.classifier.training_samples,
                config.classifier.seed,
            )?;
            let model = service.train_classifier(&examples)?;
            if let Some(path) = &config.classifier.model_path {
                aeroguard::risk::PersistedRiskModel::new((*model).clone())
                    .save(path)
                    .with_context(|| format!("Failed to save classifier to {}", path.display()))?;
                tracing::info!("Risk classifier saved to {}", path.display());
            }
            print_json(model.evaluation())
        }
        Command::Assess {
            persona,
            exposure,
            aqi,
            pm25,
            pm10,
            temperature,
            humidity,
            wind_speed,
            pressure,
            visibility,
        } => {
            let persona: Persona = persona.parse()?;
            let reading = EnvironmentalReading {
                aqi,
                pm25,
                pm10,
                temperature,
                humidity,
                wind_speed,
                pressure,
                visibility,
            };
            let service = RiskService::new(config.classifier.clone());
            service.load_or_train()?;
            let assessment = service.assess(reading.to_conditions()?, persona, exposure)?;
            print_json(&assessment)
        }
        Command::Pipeline { csv, location } => {
            let store = ForecasterStore::new(config.forecaster.clone());
            let latest = load_history(&store, &csv, &location)?;
            let service = RiskService::new(config.classifier.clone());
            service.load_or_train()?;

            let pipeline = Pipeline::new(store, service, config.pipeline.clone());
            let report = pipeline
                .run(&location, &latest)
                .with_context(|| format!("Pipeline failed for {location}"))?;
            print_json(&report)
        }
    }
}

/// Register a location's history with the store; returns the newest
/// reading that carries PM2.5.
fn load_history(
    store: &ForecasterStore,
    csv: &Path,
    location: &str,
) -> Result<EnvironmentalReading> {
    let records = series::load_location_records(csv, location)?;
    let history = series::series_from_records(&records)
        .with_context(|| format!("No usable history for {location}"))?;
    tracing::info!("Loaded {} hourly observations for {}", history.len(), location);
    store.update_history(location, history);

    records
        .iter()
        .rev()
        .find_map(|r| r.environmental_reading())
        .with_context(|| format!("No reading with PM2.5 for {location}"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
