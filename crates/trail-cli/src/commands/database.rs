use clap::Args;
use std::sync::Arc;
use trail_core::DatabaseConfig;
use trail_database::DbConnection;
use tracing::debug;

/// Connection flags shared by every command that touches the database
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Database connection URL
    #[arg(long, env = "TRAIL_DATABASE_URL")]
    pub database_url: String,

    /// Maximum pooled connections
    #[arg(long, env = "TRAIL_POSTGRES_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Minimum idle connections kept in the pool
    #[arg(long, env = "TRAIL_POSTGRES_MIN_CONNECTIONS")]
    pub min_connections: Option<u32>,
}

impl DatabaseArgs {
    pub fn config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .with_pool(self.max_connections, self.min_connections)
    }

    pub async fn connect(&self) -> anyhow::Result<Arc<DbConnection>> {
        debug!("Initializing database connection...");
        let db = trail_database::establish_connection(&self.config()).await?;
        Ok(db)
    }
}
