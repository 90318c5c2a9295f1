use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if it exists
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "migrate=info,aahaar_setu=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = env::var("DATABASE_PATH").unwrap_or_else(|_| "aahaar_setu.db".to_string());
    tracing::info!("Applying schema to {}", path);

    // Opening the pool applies the bundled schema.
    let pool = aahaar_setu::db::init_pool(&path).await?;

    let count = aahaar_setu::db::list_donations(&pool).await?.len();
    tracing::info!("Migration complete, {} donations on record", count);
    Ok(())
}
