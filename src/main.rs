use anyhow::Result;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use pharmacy_pos::{api::ApiUrls, app_state::AppState, bootstrap, config, db};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();
    bootstrap::init_tracing();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let state = AppState::new(&config, ApiUrls::init())?;
    let app = pharmacy_pos::app(state);

    tracing::info!("Bootstrapping...");
    bootstrap::serve("PharmacyPOS", app, &config.server).await?;
    Ok(())
}
