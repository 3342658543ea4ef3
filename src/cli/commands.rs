//! Top-level CLI definition and shared wiring

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::ladders::{LaddersArgs, MatchesArgs, MembershipArgs};
use super::season::{CurrentSeasonArgs, SeasonArgs};
use super::CliError;
use crate::fetcher::ladder_api::LadderApiClient;
use crate::fetcher::shared_resources::{global_http_client, global_quota_gate};
use crate::orchestrator::config::{
    DEFAULT_WORKER_COUNT, MAX_ATTEMPTS, REQUESTS_PER_HOUR_CAP, REQUESTS_PER_SECOND_CAP,
    SAFETY_COEFFICIENT,
};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::shutdown::SharedShutdown;
use crate::Region;

/// Orchestrator type every command runs against
pub type CliOrchestrator = Orchestrator<LadderApiClient>;

/// Parse and validate the safety coefficient
fn parse_coefficient(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if !(value > 0.0 && value <= 1.0) {
        return Err("safety coefficient must be in (0, 1]".to_string());
    }
    Ok(value)
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Print `value` as pretty JSON, or the human rendering
pub(crate) fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    human: impl FnOnce() -> String,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Human => println!("{}", human()),
    }
    Ok(())
}

/// Ladder Fetcher CLI
#[derive(Parser, Debug)]
#[command(name = "ladder-fetcher")]
#[command(about = "Rate-limited fetcher for ladder and season data", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// API region: us, eu, kr or cn
    #[arg(long, global = true, default_value = "eu")]
    pub region: Region,

    /// Nominal per-second request cap of the upstream
    #[arg(long, global = true, default_value_t = REQUESTS_PER_SECOND_CAP)]
    pub requests_per_second: u64,

    /// Nominal per-hour request cap of the upstream
    #[arg(long, global = true, default_value_t = REQUESTS_PER_HOUR_CAP)]
    pub requests_per_hour: u64,

    /// Share of each cap actually used, in (0, 1]
    #[arg(long, global = true, default_value_t = SAFETY_COEFFICIENT, value_parser = parse_coefficient)]
    pub safety_coefficient: f64,

    /// Workers the per-second budget is split across
    ///
    /// Concurrency width is the safe per-second cap divided by this value.
    #[arg(long, global = true, default_value_t = DEFAULT_WORKER_COUNT, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: u64,

    /// Attempts per fetch, including the first (range: 1-20)
    #[arg(long, global = true, default_value_t = MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: u32,

    /// Delay before each dispatch within a lane, in milliseconds
    #[arg(long, global = true, default_value_t = 40)]
    pub dispatch_delay_ms: u64,

    /// Expose Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// OAuth access token sent as a bearer token
    #[arg(long, global = true, env = "LADDER_API_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Override the regional API host
    #[arg(long, global = true, hide = true)]
    pub base_url: Option<String>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find the newest season by probing forward from a starting season
    Season(SeasonArgs),

    /// Ask for the current season, probing seasons when that call fails
    CurrentSeason(CurrentSeasonArgs),

    /// Fetch ladders by id
    Ladders(LaddersArgs),

    /// Resolve which candidate character belongs to a ladder
    Membership(MembershipArgs),

    /// Fetch recent matches, one result per character
    Matches(MatchesArgs),
}

impl Cli {
    /// Orchestrator configuration from the global flags
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default()
            .with_caps(self.requests_per_second, self.requests_per_hour)
            .with_safety_coefficient(self.safety_coefficient)
            .with_worker_count(self.workers)
            .with_max_attempts(self.max_attempts)
            .with_dispatch_delay(Duration::from_millis(self.dispatch_delay_ms));
        if let Commands::CurrentSeason(CurrentSeasonArgs {
            known_recent: Some(seed),
        }) = &self.command
        {
            config = config.with_known_recent_season(*seed);
        }
        config
    }

    /// Build the orchestrator on the process-wide quota gate.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build_orchestrator(&self, shutdown: SharedShutdown) -> Result<CliOrchestrator, CliError> {
        if self.requests_per_second == 0 || self.requests_per_hour == 0 {
            return Err(CliError::ConfigurationError(
                "request caps must be positive".to_string(),
            ));
        }
        let config = self.orchestrator_config();
        let gate = global_quota_gate(&config);
        let api = LadderApiClient::new(
            global_http_client(),
            gate.live_limiter().cloned(),
            self.base_url.clone(),
        )
        .with_access_token(self.access_token.clone());

        Ok(Orchestrator::with_slots(Arc::new(api), gate, config).with_shutdown(Some(shutdown)))
    }

    /// Run the selected command
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<(), CliError> {
        let orchestrator = self.build_orchestrator(shutdown)?;
        match &self.command {
            Commands::Season(args) => args.execute(self, &orchestrator).await,
            Commands::CurrentSeason(args) => args.execute(self, &orchestrator).await,
            Commands::Ladders(args) => args.execute(self, &orchestrator).await,
            Commands::Membership(args) => args.execute(self, &orchestrator).await,
            Commands::Matches(args) => args.execute(self, &orchestrator).await,
        }
    }
}
