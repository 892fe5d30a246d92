//! e-Stat connectivity check
//!
//! Searches the table catalogue, loads the class table of the configured
//! statsDataId and fetches one area/period so the row conversion can be
//! inspected before a full run.
//!
//! Usage:
//!   estat_verify [search word]

use retailstat::ingest_core::EntityRegistry;
use retailstat::pipeline::{EstatClient, FetchTarget, StatsSource};
use retailstat::Config;
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    retailstat::init_logging();

    let config = Config::from_env();
    let search_word = env::args()
        .nth(1)
        .unwrap_or_else(|| "経済センサス 小売業".to_string());

    let estat_config = config.estat_config().ok_or("ESTAT_APP_ID is not set")?;

    log::info!("🚀 Starting e-Stat verification");
    log::info!("   ESTAT_BASE_URL: {}", estat_config.base_url);
    log::info!("   ESTAT_STATS_DATA_ID: {}", estat_config.stats_data_id);
    log::info!("   Search word: {}", search_word);

    let mut client = EstatClient::new(estat_config)?;

    let list = client.get_stats_list(&search_word).await?;
    let table_ids = list.table_ids()?;
    log::info!("🔎 getStatsList returned {} table(s)", table_ids.len());
    for (idx, id) in table_ids.iter().take(10).enumerate() {
        log::info!("     {}. {}", idx + 1, id);
    }

    let stats_data_id = client.stats_data_id().to_string();
    if stats_data_id.is_empty() {
        log::warn!("⚠️  ESTAT_STATS_DATA_ID not set, skipping data checks");
        return Ok(());
    }

    let meta = client.get_meta_info(&stats_data_id).await?;
    let table = meta.class_table();
    if table.is_empty() {
        log::warn!("⚠️  getMetaInfo returned no class objects for {}", stats_data_id);
    } else {
        log::info!("🗂️  Class table loaded for {}", stats_data_id);
    }
    client = client.with_meta(table);

    let area = if config.target_areas.is_empty() {
        EntityRegistry::load(&config.entities_path)?
            .ids()
            .into_iter()
            .next()
            .ok_or("no target areas configured")?
    } else {
        config.target_areas[0].clone()
    };
    let period = config.fetch_periods.first().copied().unwrap_or(2012);

    let target = FetchTarget::new(area, period);
    log::info!(
        "📡 Fetching {} / {} via {}",
        target.entity_id,
        target.period,
        client.source_name()
    );
    let rows = client.fetch_rows(&target).await?;
    log::info!("✅ getStatsData returned {} row(s)", rows.len());
    for row in rows.iter().take(5) {
        log::info!("   {:?}", row);
    }

    Ok(())
}
