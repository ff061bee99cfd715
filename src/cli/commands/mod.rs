pub mod query;

pub use query::{OutputFormat, PartitionsCommand, QueryArgs, QueryCommand, SummaryCommand};

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// List the available operations and their parameters
    Operations,
    /// Show the partitions a scope resolves to
    Partitions(PartitionsCommand),
    /// Print the SQL an operation would run, without executing it
    Sql(QueryArgs),
    /// Run an operation and print the result
    Query(QueryCommand),
    /// Period totals with the change against the same period a year earlier
    Summary(SummaryCommand),
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Configuration file layered over the defaults
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Partition location template, e.g. `s3://bucket/{year}.parquet`
    #[arg(long, global = true, env = "OSM_CHANGESETS_TEMPLATE", value_name = "TEMPLATE")]
    pub template: Option<String>,

    #[command(flatten)]
    pub logging: LoggingOptions,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingOptions {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log filter directives, e.g. `osm_changesets=debug`
    #[arg(long = "log-filter", global = true, env = "RUST_LOG", value_name = "FILTER")]
    pub log_filter: Option<String>,
}

impl LoggingOptions {
    pub fn get_effective_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}
