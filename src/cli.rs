//! Command-line interface definitions for Ticker News.
//!
//! Two subcommands: `collect` scrapes news into per-date Parquet files and
//! `load` pushes an aggregated Parquet file into PostgreSQL. Database
//! options can also come from environment variables (or a `.env` file).

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Ticker News application.
///
/// # Examples
///
/// ```sh
/// # Collect NVDA and AAPL news for January 2025
/// ticker_news collect --start 2025-01-01 --end 2025-01-31 --tickers NVDA,AAPL
///
/// # Load the aggregated file into Postgres
/// NEWS_DB_PASSWORD=secret ticker_news load --parquet-file News_Datas.parquet
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect ticker news into per-date Parquet files
    Collect(CollectArgs),
    /// Replace a PostgreSQL table with the contents of a Parquet file
    Load(LoadArgs),
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// First target day (inclusive)
    #[arg(long, default_value = "2025-01-01")]
    pub start: NaiveDate,

    /// Last target day (inclusive)
    #[arg(long, default_value = "2025-05-01")]
    pub end: NaiveDate,

    /// Tickers to collect, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "NVDA")]
    pub tickers: Vec<String>,

    /// Path to the ticker query config
    #[arg(short, long, default_value = "tickers.json")]
    pub config: PathBuf,

    /// Root directory for `<ticker>/NewsData` output
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Days of slack around each target day (0 to 30)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(i64).range(0..=30))]
    pub tolerance_days: i64,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Aggregated Parquet file to load
    #[arg(short, long, default_value = "News_Datas.parquet")]
    pub parquet_file: PathBuf,

    /// Target table (dropped and recreated)
    #[arg(long, env = "NEWS_TABLE", default_value = "News_Datas")]
    pub table: String,

    #[arg(long, env = "NEWS_DB_USER", default_value = "user")]
    pub db_user: String,

    #[arg(long, env = "NEWS_DB_PASSWORD", default_value = "password", hide_env_values = true)]
    pub db_password: String,

    #[arg(long, env = "NEWS_DB_HOST", default_value = "localhost")]
    pub db_host: String,

    #[arg(long, env = "NEWS_DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    #[arg(long, env = "NEWS_DB_NAME", default_value = "news")]
    pub db_name: String,

    /// Full connection URL; overrides the individual database options
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}
