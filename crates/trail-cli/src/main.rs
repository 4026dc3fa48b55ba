//! Trail CLI - funnel analysis from the command line
//!
//! Applies the schema and runs funnel step and trend reports against a
//! Postgres database, printing JSON.

mod commands;

use clap::{Parser, Subcommand};
use commands::{FunnelCommand, MigrateCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "TRAIL_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "TRAIL_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate(MigrateCommand),
    /// Funnel reports and management
    Funnel(FunnelCommand),
}

fn log_filter(log_level: &str) -> anyhow::Result<tracing_subscriber::EnvFilter> {
    // RUST_LOG takes over completely when set
    if std::env::var("RUST_LOG").is_ok() {
        return tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e));
    }

    tracing_subscriber::EnvFilter::try_new(format!(
        "trail={level},\
         trail_cli={level},\
         trail_core={level},\
         trail_database={level},\
         trail_entities={level},\
         trail_funnels={level},\
         trail_migrations={level},\
         sqlx=warn,\
         sea_orm=warn,\
         sea_orm_migration=warn",
        level = log_level
    ))
    .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", log_level, e))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = log_filter(&cli.log_level)?;

    // Logs go to stderr so stdout stays valid JSON
    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;

    match cli.command {
        Commands::Migrate(migrate_cmd) => migrate_cmd.execute(),
        Commands::Funnel(funnel_cmd) => funnel_cmd.execute(),
    }
}
