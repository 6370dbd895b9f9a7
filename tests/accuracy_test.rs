mod common;

use common::{at, forecast, observation, test_pool, FORECAST_PAGE, HEIGHTS_PAGE};
use tide_monitor::analysis::{IssuePreference, MetricsError, ReconcileOptions};
use tide_monitor::db::{ForecastRepository, ObservationRepository};
use tide_monitor::services::{AccuracyError, AccuracyService, AccuracySettings, IngestService};
use tide_monitor::stations::{StationMap, StationPair};

async fn ingested_repos() -> (ObservationRepository, ForecastRepository) {
    let pool = test_pool().await;
    let observation_repo = ObservationRepository::new(pool.clone());
    let forecast_repo = ForecastRepository::new(pool);

    let ingest = IngestService::new(observation_repo.clone(), forecast_repo.clone());
    ingest.ingest_heights_html(HEIGHTS_PAGE).await.unwrap();
    ingest
        .ingest_forecast_html(FORECAST_PAGE, at(14, 6, 0))
        .await
        .unwrap();

    (observation_repo, forecast_repo)
}

#[tokio::test]
async fn test_report_all_from_ingested_pages() {
    let (observation_repo, forecast_repo) = ingested_repos().await;
    let service = AccuracyService::new(observation_repo, forecast_repo, AccuracySettings::default());

    let reports = service.report_all(&StationMap::default()).await.unwrap();
    assert_eq!(reports.len(), 4);

    // targets outside the observed hours are never extrapolated
    for report in &reports {
        assert_eq!(report.samples.len(), 1, "station {}", report.pair.station);
        let summary = report.summary.as_ref().unwrap();
        assert_eq!(summary.sample_count, 1);
        assert_eq!(summary.pct_exceeding_threshold, 0.0);
        assert_eq!(report.lead_times.len(), 1);
    }

    let buenos_aires = &reports[0];
    assert_eq!(buenos_aires.pair.station, "Buenos  Aires");
    let sample = &buenos_aires.samples[0];
    assert_eq!(sample.timestamp, at(14, 11, 30));
    assert!((sample.observed_height - 1.115).abs() < 1e-9);
    assert!((sample.absolute_error - 0.015).abs() < 1e-9);
    assert_eq!(sample.anticipation_hours, 5.5);

    let san_fernando = &reports[3];
    assert!((san_fernando.summary.as_ref().unwrap().rmse - 0.05).abs() < 1e-9);
}

#[tokio::test]
async fn test_station_without_forecasts_reports_insufficient_data() {
    let (observation_repo, forecast_repo) = ingested_repos().await;
    let service = AccuracyService::new(observation_repo, forecast_repo, AccuracySettings::default());

    let report = service
        .station_report(&StationPair::new("La Plata", "MAR DEL PLATA"))
        .await
        .unwrap();

    assert!(report.samples.is_empty());
    assert_eq!(
        report.summary,
        Err(MetricsError::InsufficientData {
            station: "La Plata".to_string()
        })
    );
}

#[tokio::test]
async fn test_issue_preference_selects_the_scored_run() {
    let pool = test_pool().await;
    let observation_repo = ObservationRepository::new(pool.clone());
    let forecast_repo = ForecastRepository::new(pool);

    observation_repo
        .upsert_batch(&[
            observation("La Plata", at(14, 10, 0), 1.0),
            observation("La Plata", at(14, 14, 0), 1.0),
        ])
        .await
        .unwrap();
    forecast_repo
        .upsert_batch(&[
            forecast("PUERTO LA PLATA", at(14, 12, 0), 1.4, at(13, 18, 0)),
            forecast("PUERTO LA PLATA", at(14, 12, 0), 1.1, at(14, 6, 0)),
        ])
        .await
        .unwrap();

    let pair = StationPair::new("La Plata", "PUERTO LA PLATA");
    let earliest = AccuracyService::new(
        observation_repo.clone(),
        forecast_repo.clone(),
        AccuracySettings::default(),
    );
    let report = earliest.station_report(&pair).await.unwrap();
    assert_eq!(report.samples.len(), 1);
    assert_eq!(report.samples[0].issue_timestamp, at(13, 18, 0));
    assert_eq!(report.summary.as_ref().unwrap().pct_exceeding_threshold, 100.0);

    let latest = AccuracyService::new(
        observation_repo,
        forecast_repo,
        AccuracySettings {
            options: ReconcileOptions {
                issue_preference: IssuePreference::Latest,
                ..ReconcileOptions::default()
            },
            ..AccuracySettings::default()
        },
    );
    let report = latest.station_report(&pair).await.unwrap();
    assert_eq!(report.samples[0].issue_timestamp, at(14, 6, 0));
    assert_eq!(report.summary.as_ref().unwrap().pct_exceeding_threshold, 0.0);
}

#[tokio::test]
async fn test_max_gap_blocks_interpolation_across_outage() {
    let pool = test_pool().await;
    let observation_repo = ObservationRepository::new(pool.clone());
    let forecast_repo = ForecastRepository::new(pool);

    observation_repo
        .upsert_batch(&[
            observation("Oyarvide", at(14, 0, 0), 0.6),
            observation("Oyarvide", at(14, 12, 0), 0.8),
        ])
        .await
        .unwrap();
    forecast_repo
        .upsert_batch(&[forecast(
            "CANAL PUNTA INDIO (Oyarvide - Km 133)",
            at(14, 6, 0),
            0.7,
            at(13, 18, 0),
        )])
        .await
        .unwrap();

    let pair = StationPair::new("Oyarvide", "CANAL PUNTA INDIO (Oyarvide - Km 133)");
    let settings = AccuracySettings {
        options: ReconcileOptions {
            max_gap: Some(chrono::Duration::hours(3)),
            ..ReconcileOptions::default()
        },
        ..AccuracySettings::default()
    };
    let service = AccuracyService::new(observation_repo.clone(), forecast_repo.clone(), settings);
    let report = service.station_report(&pair).await.unwrap();
    assert!(report.samples.is_empty());

    let unrestricted =
        AccuracyService::new(observation_repo, forecast_repo, AccuracySettings::default());
    let report = unrestricted.station_report(&pair).await.unwrap();
    assert_eq!(report.samples.len(), 1);
    assert!((report.samples[0].observed_height - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn test_forecast_lead_times_for_one_gauge() {
    let (observation_repo, forecast_repo) = ingested_repos().await;
    let service = AccuracyService::new(observation_repo, forecast_repo, AccuracySettings::default());

    let listing = service
        .forecast_lead_times(&StationMap::default(), Some("San Fernando"))
        .await
        .unwrap();

    assert_eq!(listing.len(), 2);
    assert!(listing.iter().all(|f| f.place == "SAN FERNANDO"));
    assert!(listing.iter().all(|f| f.station.as_deref() == Some("San Fernando")));
    assert_eq!(listing[0].lead_hours, 5.0);
    assert_eq!(listing[1].state, "BAJAMAR");
    assert_eq!(listing[1].lead_hours, 11.5);
}

#[tokio::test]
async fn test_forecast_lead_times_lists_every_place() {
    let (observation_repo, forecast_repo) = ingested_repos().await;
    let service = AccuracyService::new(observation_repo, forecast_repo, AccuracySettings::default());

    let listing = service
        .forecast_lead_times(&StationMap::default(), None)
        .await
        .unwrap();
    assert_eq!(listing.len(), 7);

    let oyarvide_low = listing
        .iter()
        .find(|f| f.target_timestamp == at(14, 19, 0))
        .unwrap();
    assert_eq!(oyarvide_low.station.as_deref(), Some("Oyarvide"));
    assert_eq!(oyarvide_low.height, None);
    assert_eq!(oyarvide_low.lead_hours, 13.0);
}

#[tokio::test]
async fn test_forecast_lead_times_unknown_gauge() {
    let (observation_repo, forecast_repo) = ingested_repos().await;
    let service = AccuracyService::new(observation_repo, forecast_repo, AccuracySettings::default());

    let result = service
        .forecast_lead_times(&StationMap::default(), Some("Mar del Plata"))
        .await;
    assert!(matches!(result, Err(AccuracyError::UnknownStation(s)) if s == "Mar del Plata"));
}
