//! JSONL ingestion into the outbox table.

use outbox_config::Config;
use outbox_database::{NewTelemetryRecord, TelemetryDatabase};
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one JSON record per line. Blank lines are skipped.
pub fn parse_records<R: BufRead>(reader: R) -> Result<Vec<NewTelemetryRecord>, IngestError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| IngestError::Parse {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Insert every record in `file` in one transaction.
pub async fn ingest_file(config: &Config, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let reader = std::io::BufReader::new(std::fs::File::open(file)?);
    let records = parse_records(reader)?;
    if records.is_empty() {
        println!("No records in {}", file.display());
        return Ok(());
    }

    let db = TelemetryDatabase::open(config.db_path()?, config.pool_config()).await?;
    let ids = db.insert_records(records).await?;
    info!(count = ids.len(), file = %file.display(), "Ingested records");

    match (ids.first(), ids.last()) {
        (Some(first), Some(last)) => {
            println!("Inserted {} records (ids {}..={})", ids.len(), first, last)
        }
        _ => println!("Inserted 0 records"),
    }
    Ok(())
}
