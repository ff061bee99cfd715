//! osm-changesets binary.
//!
//! Entry point for running predefined aggregate queries over the
//! date-partitioned OpenStreetMap changeset dataset.

use clap::Parser;
use osm_changesets::cli::{
    commands::{Commands, GlobalOptions},
    handle_operations, handle_partitions, handle_query, handle_sql, handle_summary, load_config,
};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = &cli.global.logging;
    let level = logging.get_effective_level();

    // Logs go to stderr so query output stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.parse().unwrap_or(Level::WARN).into())
                .parse_lossy(logging.log_filter.as_deref().unwrap_or("")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(logging.verbose > 0)
        .with_line_number(logging.verbose > 0)
        .init();

    debug!("osm-changesets starting up");

    match &cli.command {
        Commands::Operations => handle_operations(),
        Commands::Partitions(cmd) => handle_partitions(&load_config(&cli.global)?, cmd),
        Commands::Sql(args) => handle_sql(&load_config(&cli.global)?, args),
        Commands::Query(cmd) => handle_query(&load_config(&cli.global)?, cmd).await,
        Commands::Summary(cmd) => handle_summary(&load_config(&cli.global)?, cmd).await,
    }
}
