//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use gps_deform_baseline::{BaselinePayload, MemoryBaselineStore, establish_temporary_baseline};
use gps_deform_cli_utils::{IndicatifProgress, MultiProgress};
use gps_deform_engine::synthetic::{DriftScenario, drifting_fixes};
use gps_deform_engine::{
    AnalysisView, AnalyzeOptions, Engine, EngineConfig, MemoryPositionStore,
};
use gps_deform_models::{CancelFlag, PositionFix};
use gps_deform_pattern::MemoryPatternStore;

const DEMO_DEVICE: &str = "synthetic-demo";

fn read_fixes(path: &Path) -> Result<Vec<PositionFix>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let fixes: Vec<PositionFix> = serde_json::from_str(&text)?;
    log::info!("Read {} fixes from {}", fixes.len(), path.display());
    Ok(fixes)
}

fn engine_with(
    config: EngineConfig,
    device_id: &str,
    fixes: Vec<PositionFix>,
) -> Result<Engine, Box<dyn std::error::Error>> {
    let positions = MemoryPositionStore::new();
    positions.insert(device_id, fixes)?;
    Ok(Engine::new(
        Arc::new(positions),
        Arc::new(MemoryBaselineStore::new()),
        Arc::new(MemoryPatternStore::new()),
        config,
    ))
}

async fn run(
    multi: &MultiProgress,
    engine: &Engine,
    device_id: &str,
    options: &AnalyzeOptions,
    view: AnalysisView,
) -> Result<(), Box<dyn std::error::Error>> {
    let progress = IndicatifProgress::stages_bar(multi, device_id);
    let report = engine
        .analyze_with(device_id, options, progress.as_ref(), &CancelFlag::new())
        .await?;
    for warning in &report.warnings {
        log::warn!("{warning}");
    }
    println!("{}", serde_json::to_string_pretty(&report.view(view)?)?);
    Ok(())
}

/// Analyses the fixes in `input` as one device.
pub async fn analyze(
    multi: &MultiProgress,
    config: EngineConfig,
    input: &Path,
    device_id: &str,
    baseline: Option<(f64, f64)>,
    view: AnalysisView,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine_with(config, device_id, read_fixes(input)?)?;
    if let Some((latitude, longitude)) = baseline {
        engine
            .establish_baseline(
                device_id,
                BaselinePayload {
                    latitude,
                    longitude,
                    established_by: Some("gps_deform analyze".to_string()),
                    ..BaselinePayload::default()
                },
            )
            .await?;
    }
    let options = AnalyzeOptions {
        limit,
        ..AnalyzeOptions::default()
    };
    run(multi, &engine, device_id, &options, view).await
}

/// Analyses a generated station drifting east at a constant rate.
pub async fn demo(
    multi: &MultiProgress,
    config: EngineConfig,
    hours: u32,
    drift_mm_per_hour: f64,
    noise_mm: f64,
    view: AnalysisView,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = DriftScenario {
        start: Utc::now() - Duration::hours(i64::from(hours)),
        hours,
        drift_mm_per_hour,
        noise_mm,
        ..DriftScenario::default()
    };
    eprintln!(
        "SYNTHETIC DATA: {hours} hourly fixes drifting {drift_mm_per_hour} mm/h east \
         with {noise_mm} mm noise"
    );

    let engine = engine_with(config, DEMO_DEVICE, drifting_fixes(&scenario))?;
    engine
        .establish_baseline(
            DEMO_DEVICE,
            BaselinePayload {
                latitude: scenario.baseline_latitude,
                longitude: scenario.baseline_longitude,
                established_by: Some("gps_deform demo".to_string()),
                notes: Some("synthetic".to_string()),
                ..BaselinePayload::default()
            },
        )
        .await?;
    let options = AnalyzeOptions {
        limit: usize::try_from(hours)?,
        ..AnalyzeOptions::default()
    };
    run(multi, &engine, DEMO_DEVICE, &options, view).await
}

/// Prints the baseline averaged from the earliest fixes in `input`.
pub fn baseline(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let baseline = establish_temporary_baseline(&read_fixes(input)?)?;
    println!("{}", serde_json::to_string_pretty(&baseline)?);
    Ok(())
}
