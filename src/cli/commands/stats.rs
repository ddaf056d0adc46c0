//! `reqragctl stats` — report store statistics.

use anyhow::{bail, Result};

use reqrag::store::Store;

use crate::cli::Cli;

/// Display store statistics (record/chunk counts, schema, model).
pub(crate) fn cmd_stats(cli: &Cli) -> Result<()> {
    let store_path = cli.store_path();

    if !store_path.exists() {
        bail!("Store not found. Run 'reqragctl init && reqragctl index <corpus-dir>' first.");
    }

    let store = Store::open(&store_path)?;
    let stats = store.stats()?;

    if cli.json {
        let json = serde_json::json!({
            "total_records": stats.total_records,
            "total_chunks": stats.total_chunks,
            "schema_version": stats.schema_version,
            "model_name": stats.model_name,
            "dimensions": stats.dimensions,
            "created_at": stats.created_at,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("Store Statistics");
        println!("================");
        println!();
        println!("Records: {}", stats.total_records);
        println!("Chunks:  {}", stats.total_chunks);
        println!();
        println!("Model:   {}", stats.model_name.as_deref().unwrap_or("unknown"));
        println!(
            "Dimensions: {}",
            stats.dimensions.map(|d| d.to_string()).unwrap_or_else(|| "unknown".to_string())
        );
        println!("Schema:  v{}", stats.schema_version);
        println!("Created: {}", stats.created_at.as_deref().unwrap_or("unknown"));

        if stats.total_chunks == 0 {
            println!();
            println!("Store is empty. Run 'reqragctl index <corpus-dir>' to populate it.");
        }
    }

    Ok(())
}
