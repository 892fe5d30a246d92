//! Retail Structure Analysis Runner
//!
//! Reads the configured census / commerce extracts, optionally collects the
//! same cells from the e-Stat API, merges both and reports trends.
//!
//! Usage:
//!   retailstat [--output table|csv|json|sqlite] [--api]

use retailstat::ingest_core::EntityRegistry;
use retailstat::pipeline::{run_analysis, ApiCollection, EstatClient, FetchTarget};
use retailstat::report::writer::{parse_output_mode_from_args, ReportWriter};
use retailstat::Config;
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    retailstat::init_logging();

    let config = Config::from_env();
    let mode = parse_output_mode_from_args();
    let use_api = env::args().any(|arg| arg == "--api");

    log::info!("🚀 Starting retail structure analysis");
    log::info!("📊 Configuration:");
    log::info!("   ENTITIES_PATH: {}", config.entities_path.display());
    log::info!("   FILE_INPUTS: {} file(s)", config.file_inputs.len());
    for (idx, input) in config.file_inputs.iter().enumerate() {
        log::info!("     {}. {} ({})", idx + 1, input.path.display(), input.layout);
    }
    log::info!("   API collection: {}", if use_api { "enabled" } else { "disabled" });
    log::info!("   Output: {}", mode.as_str());

    let entities = EntityRegistry::load(&config.entities_path)?;
    let options = config.analysis_options(&entities);

    let api = if use_api {
        let estat_config = config
            .estat_config()
            .ok_or("--api requires ESTAT_APP_ID to be set")?;
        let mut client = EstatClient::new(estat_config)?;

        let stats_data_id = client.stats_data_id().to_string();
        let meta = client.get_meta_info(&stats_data_id).await;
        match meta {
            Ok(response) => {
                let table = response.class_table();
                log::info!("🗂️  Loaded class table for {}", stats_data_id);
                client = client.with_meta(table);
            }
            Err(e) => log::warn!("⚠️  Meta info unavailable for {}: {}", stats_data_id, e),
        }

        let areas: Vec<String> = options.extractor.target_areas.iter().cloned().collect();
        let targets = FetchTarget::grid(&areas, &config.fetch_periods);
        log::info!(
            "📡 Collecting {} target(s) from e-Stat in batches of {}",
            targets.len(),
            config.fetch_batch_size
        );

        Some(ApiCollection {
            source: Arc::new(client),
            targets,
            config: config.collector_config(),
        })
    } else {
        None
    };

    let report = run_analysis(&options, api).await?;

    let mut writer = ReportWriter::new(mode, config.report_output_path.clone())?;
    writer.write_report(&report.view(&entities))?;
    writer.flush()?;

    if !report.failures.is_empty() {
        log::warn!("⚠️  {} fetch target(s) failed", report.failures.len());
    }
    log::info!(
        "✅ Report written via {} backend ({} records, {} suspect)",
        writer.backend_type(),
        report.dataset.len(),
        report.dataset.suspect_records().len()
    );

    Ok(())
}
