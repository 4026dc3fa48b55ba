use clap::Args;
use colored::Colorize;
use trail_migrations::{Migrator, MigratorTrait};
use tracing::info;

use super::DatabaseArgs;

#[derive(Args)]
pub struct MigrateCommand {
    #[command(flatten)]
    pub database: DatabaseArgs,
}

impl MigrateCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        info!("Applying database migrations");

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            // connecting applies every pending migration
            let db = self.database.connect().await?;
            let applied = Migrator::get_applied_migrations(db.as_ref()).await?;

            println!(
                "{} {} migrations applied",
                "✓".bright_green(),
                applied.len().to_string().bright_white().bold()
            );
            for migration in applied {
                println!("  {}", migration.name().bright_cyan());
            }
            Ok(())
        })
    }
}
