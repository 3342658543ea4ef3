//! CLI command implementations

pub mod commands;
pub mod error;
pub mod ladders;
pub mod season;

pub use commands::{Cli, CliOrchestrator, Commands, OutputFormat};
pub use error::CliError;
pub use ladders::{LaddersArgs, MatchesArgs, MembershipArgs};
pub use season::{CurrentSeasonArgs, SeasonArgs};
