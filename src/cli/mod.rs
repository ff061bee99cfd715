//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Listing operations
//! - Inspecting partition resolution
//! - Printing and running operation queries
//! - Year-over-year period summaries

pub mod commands;
pub mod handlers;

pub use handlers::{handle_operations, handle_partitions, handle_query, handle_sql, handle_summary, load_config};
