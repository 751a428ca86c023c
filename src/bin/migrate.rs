use anyhow::Result;
use rollup_explorer::config::Config;
use rollup_explorer::repository::Database;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = Config::from_env()?;

    println!("Running migrations on database: {}", config.database_url);

    let _db = Database::new(&config.database_url)?;

    println!("Migrations completed successfully!");

    Ok(())
}
