use std::path::PathBuf;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, instrument, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tide_monitor::config::Config;
use tide_monitor::db::{self, forecast_repository::parse_issue, ForecastRepository, ObservationRepository};
use tide_monitor::normalizer;
use tide_monitor::services::{
    AccuracyService, ForecastLeadTime, IngestError, IngestService, StationReport,
};
use tide_monitor::stations::StationMap;

#[derive(Parser)]
#[command(name = "tide-monitor")]
#[command(about = "Store tide gauge heights and forecasts, and score forecast accuracy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a downloaded hourly heights page
    IngestHeights {
        #[arg(long)]
        file: PathBuf,
    },
    /// Store a downloaded forecast page
    IngestForecast {
        #[arg(long)]
        file: PathBuf,

        /// Issue hour of the run, "YYYY-MM-DD HH" (default: now)
        #[arg(long)]
        issued_at: Option<String>,
    },
    /// Backfill observations from a directory of gauge history CSV dumps
    IngestGaugeHistory {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Print accuracy metrics for every station
    Report {
        #[arg(long)]
        json: bool,

        /// Include every reconciled sample with its lead time and errors
        #[arg(long)]
        samples: bool,
    },
    /// List stored forecasts with their lead time in hours
    LeadTimes {
        /// Only the forecast place of this gauge
        #[arg(long)]
        station: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tide_monitor=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    info!("Starting tide monitor with config: {:?}", config);

    let cli = Cli::parse();

    let pool = db::connect(&config.database_url).await?;

    let observation_repo = ObservationRepository::new(pool.clone());
    let forecast_repo = ForecastRepository::new(pool.clone());

    match cli.command {
        Command::IngestHeights { file } => {
            let html = tokio::fs::read_to_string(&file).await?;
            let service = IngestService::new(observation_repo, forecast_repo);
            let inserted = with_retry(&config, || service.ingest_heights_html(&html)).await?;
            println!("Inserted {} new observations", inserted);
        }
        Command::IngestForecast { file, issued_at } => {
            let issued_at = match issued_at {
                Some(value) => parse_issue(&value)
                    .ok_or_else(|| format!("--issued-at must look like 'YYYY-MM-DD HH', got '{}'", value))?,
                None => normalizer::current_issue_hour(),
            };
            let html = tokio::fs::read_to_string(&file).await?;
            let service = IngestService::new(observation_repo, forecast_repo);
            let inserted =
                with_retry(&config, || service.ingest_forecast_html(&html, issued_at)).await?;
            println!("Inserted {} new forecasts", inserted);
        }
        Command::IngestGaugeHistory { dir } => {
            let service = IngestService::new(observation_repo, forecast_repo);
            let inserted = with_retry(&config, || service.ingest_gauge_history(&dir)).await?;
            println!("Inserted {} new observations", inserted);
        }
        Command::Report { json, samples } => {
            let service =
                AccuracyService::new(observation_repo, forecast_repo, config.accuracy_settings());
            let reports = service.report_all(&StationMap::default()).await?;
            if json {
                let value = reports_to_json(&reports, samples);
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_reports(&reports, samples);
            }
        }
        Command::LeadTimes { station, json } => {
            let service =
                AccuracyService::new(observation_repo, forecast_repo, config.accuracy_settings());
            let listing = service
                .forecast_lead_times(&StationMap::default(), station.as_deref())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_lead_times(&listing);
            }
        }
    }

    Ok(())
}

/// Retry a whole ingest batch on store failures; re-running is safe since existing keys are skipped
async fn with_retry<F, Fut>(config: &Config, ingest: F) -> Result<usize, IngestError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<usize, IngestError>>,
{
    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(config.ingest_max_retries);

    ingest
        .retry(backoff)
        .when(IngestError::is_retryable)
        .notify(|err: &IngestError, delay: Duration| {
            warn!(error = %err, "Ingest failed, retrying in {:?}", delay);
        })
        .await
}

fn reports_to_json(reports: &[StationReport], with_samples: bool) -> serde_json::Value {
    let stations: Vec<serde_json::Value> =
        reports.iter().map(|r| r.to_json(with_samples)).collect();
    json!({ "stations": stations })
}

fn print_reports(reports: &[StationReport], with_samples: bool) {
    for report in reports {
        println!("{} ({})", report.pair.station, report.pair.place);
        match &report.summary {
            Ok(s) => {
                println!(
                    "  samples: {}  rmse: {:.3} m  above {:.2} m: {:.2}%  p{}: {:.3} m",
                    s.sample_count,
                    s.rmse,
                    s.threshold_m,
                    s.pct_exceeding_threshold,
                    s.percentile,
                    s.percentile_abs_error
                );
                for bucket in &report.lead_times {
                    println!(
                        "    lead {:>5.0}-{:<5.0} h  samples: {:>4}  rmse: {:.3} m  p{}: {:.3} m",
                        bucket.from_hours,
                        bucket.to_hours,
                        bucket.summary.sample_count,
                        bucket.summary.rmse,
                        bucket.summary.percentile,
                        bucket.summary.percentile_abs_error
                    );
                }
            }
            Err(e) => println!("  {}", e),
        }

        if with_samples {
            for sample in &report.samples {
                let relative = sample
                    .relative_error_pct
                    .map(|pct| format!("{:.1}%", pct))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "    {}  issued {}  lead {:>5.1} h  obs {:.2} m  fc {:.2} m  abs {:.3} m  rel {}",
                    sample.timestamp,
                    sample.issue_timestamp,
                    sample.anticipation_hours,
                    sample.observed_height,
                    sample.forecast_height,
                    sample.absolute_error,
                    relative
                );
            }
        }
    }
}

fn print_lead_times(listing: &[ForecastLeadTime]) {
    for entry in listing {
        let height = entry
            .height
            .map(|h| format!("{:.2} m", h))
            .unwrap_or_else(|| "s/d".to_string());
        println!(
            "{}  {}  {}  target {}  issued {}  lead {:.1} h  ({})",
            entry.place,
            entry.state,
            height,
            entry.target_timestamp,
            entry.issue_timestamp,
            entry.lead_hours,
            entry.station.as_deref().unwrap_or("no gauge")
        );
    }
}
