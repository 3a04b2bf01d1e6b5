//! Store status reporting.

use outbox_config::Config;
use outbox_database::{PoolConfig, TelemetryDatabase};

/// Print outbox counts from the source store.
pub async fn print_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = config.db_path()?;
    if !db_path.exists() {
        println!("Source store not found: {}", db_path.display());
        return Ok(());
    }

    let db = TelemetryDatabase::open(db_path, PoolConfig {
        max_size: 1,
        ..config.pool_config()
    })
    .await?;
    db.health_check().await?;
    let stats = db.stats().await?;

    println!("Outbox status");
    println!("  Store:      {}", db.path().display());
    println!("  Pending:    {}", stats.pending);
    println!("  Processed:  {}", stats.processed);
    match stats.last_record_id {
        Some(id) => println!("  Last id:    {}", id),
        None => println!("  Last id:    (empty)"),
    }

    Ok(())
}
