//! Season discovery commands

use clap::Args;
use tracing::info;

use super::commands::{emit, Cli, CliOrchestrator};
use super::CliError;
use crate::Season;

/// Arguments for the `season` command
#[derive(Debug, Args)]
pub struct SeasonArgs {
    /// Season to start probing from
    #[arg(long, value_parser = clap::value_parser!(i32).range(1..))]
    pub start: i32,
}

/// Arguments for the `current-season` command
#[derive(Debug, Args)]
pub struct CurrentSeasonArgs {
    /// Season the fallback chain starts from when the current season call fails
    #[arg(long, value_parser = clap::value_parser!(i32).range(1..))]
    pub known_recent: Option<i32>,
}

fn describe(season: &Season) -> String {
    match (season.year, season.number) {
        (Some(year), Some(number)) => format!("Season {} ({year} season {number})", season.id),
        _ => format!("Season {}", season.id),
    }
}

impl SeasonArgs {
    /// Probe forward from `--start` and print the newest season found
    pub async fn execute(&self, cli: &Cli, orchestrator: &CliOrchestrator) -> Result<(), CliError> {
        info!(region = %cli.region, start = self.start, "Discovering latest season");
        let season = orchestrator
            .discover_latest_season(cli.region, self.start)
            .await
            .ok_or_else(|| {
                CliError::NotFound(format!(
                    "no season reachable from {} in {}",
                    self.start, cli.region
                ))
            })?;

        emit(cli.output_format, &season, || describe(&season))
    }
}

impl CurrentSeasonArgs {
    /// Ask for the current season, falling back to season discovery
    pub async fn execute(&self, cli: &Cli, orchestrator: &CliOrchestrator) -> Result<(), CliError> {
        info!(region = %cli.region, "Resolving current season");
        let season = orchestrator
            .discover_current_or_last_season(cli.region)
            .await
            .ok_or_else(|| CliError::NotFound(format!("no season found in {}", cli.region)))?;

        emit(cli.output_format, &season, || describe(&season))
    }
}
