use clap::{Args, ValueEnum};

#[derive(Args, Debug, Clone)]
pub struct PartitionsCommand {
    /// Scope: `all`, `2023`, `2023-01`, `2023-01-03` or `START..END`
    #[arg(long, short = 's', default_value = "all")]
    pub scope: String,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Operation identifier (see `operations`)
    #[arg(value_name = "OPERATION")]
    pub operation: String,

    /// Scope: `all`, `2023`, `2023-01`, `2023-01-03` or `START..END`
    #[arg(long, short = 's', default_value = "all")]
    pub scope: String,

    /// Operation parameter as `name=value`, repeatable
    #[arg(long = "param", short = 'p', value_name = "NAME=VALUE")]
    pub params: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct QueryCommand {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct SummaryCommand {
    /// Scope: `2023`, `2023-01`, `2023-01-03` or `START..END`
    #[arg(long, short = 's')]
    pub scope: String,
}
