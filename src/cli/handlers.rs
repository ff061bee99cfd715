use crate::cli::commands::{GlobalOptions, OutputFormat, PartitionsCommand, QueryArgs, QueryCommand, SummaryCommand};
use crate::config::CoreConfig;
use crate::core::QueryCore;
use crate::partition::{Availability, PartitionLocator, ScopeSpec};
use crate::query::{Operation, Params, QueryBuilder, QueryResult};
use crate::utils::record_batch_to_json;
use anyhow::{Context, Result};
use duckdb::arrow::util::pretty::pretty_format_batches;
use serde_json::json;
use tracing::{debug, warn};

/// Load configuration from every source, then apply command-line overrides
pub fn load_config(options: &GlobalOptions) -> Result<CoreConfig> {
    let mut config = CoreConfig::load(options.config.as_deref()).context("Failed to load configuration")?;
    if let Some(template) = &options.template {
        config = config.with_template(template.clone());
    }
    debug!(template = %config.partitions.template, "Loaded configuration");
    Ok(config)
}

pub fn handle_operations() -> Result<()> {
    for operation in Operation::ALL {
        println!("{:<18} {}", operation.id(), operation.description());
        for spec in operation.params() {
            let default = spec
                .default
                .map_or_else(|| "required".to_owned(), |d| format!("default {d}"));
            println!("    {}: {} ({default}) {}", spec.name, spec.kind, spec.help);
        }
    }
    Ok(())
}

pub fn handle_partitions(config: &CoreConfig, cmd: &PartitionsCommand) -> Result<()> {
    let locator = PartitionLocator::new(&config.partitions)?;
    let spec: ScopeSpec = cmd.scope.parse()?;
    let scope = locator.resolve(&spec)?;

    println!("window: {}", locator.window());
    for partition in scope.partitions() {
        match &partition.availability {
            Availability::Available { uri } => println!("{}\t{uri}", partition.key),
            Availability::Unavailable { reason } => println!("{}\t<unavailable: {reason}>", partition.key),
            Availability::OutsideWindow => println!("{}\t<outside lookback window>", partition.key),
        }
    }
    Ok(())
}

pub fn handle_sql(config: &CoreConfig, args: &QueryArgs) -> Result<()> {
    let locator = PartitionLocator::new(&config.partitions)?;
    let operation: Operation = args.operation.parse()?;
    let params = Params::from_assignments(&args.params)?;
    let scope = locator.resolve(&args.scope.parse()?)?;
    let query = QueryBuilder::build(operation, &params, &scope)?;
    println!("{}", query.sql());
    Ok(())
}

pub async fn handle_query(config: &CoreConfig, cmd: &QueryCommand) -> Result<()> {
    let core = QueryCore::new(config)?;
    let args = &cmd.query;
    let params = Params::from_assignments(&args.params)?;
    let scope: ScopeSpec = args.scope.parse()?;

    let result = core.run(&args.operation, &params, &scope).await?;
    for dropped in result.dropped() {
        warn!(partition = %dropped.key, reason = %dropped.reason, "Partition excluded from result");
    }

    match cmd.format {
        OutputFormat::Table => print_table(&result)?,
        OutputFormat::Json => print_json(&result)?,
    }

    match result {
        QueryResult::Failed(failure) => Err(failure.into()),
        _ => Ok(()),
    }
}

pub async fn handle_summary(config: &CoreConfig, cmd: &SummaryCommand) -> Result<()> {
    let core = QueryCore::new(config)?;
    let scope: ScopeSpec = cmd.scope.parse()?;
    let comparison = core.compare_with_previous_year(&scope).await?;

    if let QueryResult::Failed(failure) = &comparison.current {
        return Err(failure.clone().into());
    }
    for column in ["changesets", "unique_users", "object_changes", "comments"] {
        let value = comparison
            .current
            .table()
            .and_then(|table| record_batch_to_json(table.batches.first()?).ok())
            .and_then(|rows| rows.first().map(|row| row[column].to_string()))
            .unwrap_or_else(|| "-".to_owned());
        match comparison.delta(column) {
            Some(delta) => println!("{column:<16} {value:>14} ({delta:+})"),
            None => println!("{column:<16} {value:>14}"),
        }
    }
    for dropped in comparison.current.dropped() {
        warn!(partition = %dropped.key, reason = %dropped.reason, "Partition excluded from summary");
    }
    Ok(())
}

fn print_table(result: &QueryResult) -> Result<()> {
    let Some(table) = result.table() else {
        return Ok(());
    };
    println!("{}", pretty_format_batches(&table.batches)?);
    println!("{} row(s) from {} partition(s)", table.row_count, table.partitions_read.len());
    if !result.dropped().is_empty() {
        println!("Partial result, excluded partitions:");
        for dropped in result.dropped() {
            println!("  {dropped}");
        }
    }
    Ok(())
}

fn print_json(result: &QueryResult) -> Result<()> {
    let dropped: Vec<String> = result.dropped().iter().map(ToString::to_string).collect();
    let value = match result {
        QueryResult::Failed(failure) => json!({
            "status": "failed",
            "error": failure.to_string(),
            "dropped": dropped,
        }),
        QueryResult::Complete(table) | QueryResult::Partial { table, .. } => {
            let mut rows = Vec::with_capacity(table.row_count);
            for batch in &table.batches {
                rows.extend(record_batch_to_json(batch)?);
            }
            let status = if result.is_complete() { "complete" } else { "partial" };
            json!({
                "status": status,
                "sql": table.sql,
                "partitions": table.partitions_read.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "dropped": dropped,
                "rows": rows,
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
