use anyhow::Context;
use serde::Serialize;
use serde_json::json;

use super::{Cli, Command};
use crate::config::AppConfig;
use crate::domain::Resolution;
use crate::infrastructure::logging;
use crate::infrastructure::services::CommandCacheService;

/// Run one CLI command against a freshly initialized cache
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging);

    let service = crate::create_service(&config)
        .await
        .context("Failed to initialize command cache")?;

    let result = execute(&service, cli.command).await;
    service.shutdown().await;

    result
}

async fn execute(service: &CommandCacheService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Lookup { query } => {
            let hit = service.lookup(&query).await?;
            print_json(&json!({ "hit": hit }))
        }
        Command::Store { query, resolution } => {
            let resolution: Resolution =
                serde_json::from_str(&resolution).context("Invalid resolution JSON")?;
            let outcome = service.store_with_outcome(&query, &resolution).await?;

            print_json(&json!({
                "stored": outcome.is_stored(),
                "outcome": outcome.as_str(),
            }))
        }
        Command::Summary => print_json(&service.summary()?),
        Command::Stats => {
            let stats = service.stats();
            print_json(&json!({ "stats": stats, "hit_rate": stats.hit_rate() }))
        }
        Command::Invalidate => {
            service.invalidate().await?;
            print_json(&service.summary()?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
