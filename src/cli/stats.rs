//! Stats command: read-only inspection of an existing catalog.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::Args;
use console::style;
use rusqlite::{Connection, OpenFlags};
use serde_json::json;
use std::path::PathBuf;

#[derive(Args)]
pub struct StatsArgs {
    /// SQLite path of the catalog to inspect
    #[arg(long, value_name = "FILE", default_value = ".filedex/catalog.sqlite")]
    pub db: PathBuf,

    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: StatsArgs) -> Result<()> {
    if !args.db.is_file() {
        anyhow::bail!("No catalog found at {}", args.db.display());
    }

    let conn = Connection::open_with_flags(&args.db, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open catalog at {}", args.db.display()))?;

    let (rows, total_bytes, newest_mtime): (i64, i64, Option<i64>) = conn
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0), MAX(mtime) FROM files",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .context("Failed to read catalog statistics")?;

    let mut largest = Vec::new();
    {
        let mut stmt = conn.prepare("SELECT path, size FROM files ORDER BY size DESC LIMIT 5")?;
        let mapped = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for entry in mapped {
            largest.push(entry?);
        }
    }

    let newest = newest_mtime
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(|ts| ts.to_rfc3339());

    if args.json {
        let payload = json!({
            "db": args.db.display().to_string(),
            "files": rows,
            "total_bytes": total_bytes,
            "newest_mtime": newest,
            "largest": largest
                .iter()
                .map(|(path, size)| json!({ "path": path, "size": size }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{}", style("Catalog statistics").bold());
    println!("  db:          {}", args.db.display());
    println!("  files:       {rows}");
    println!("  total bytes: {total_bytes}");
    if let Some(newest) = newest {
        println!("  newest file: {newest}");
    }
    if !largest.is_empty() {
        println!("{}", style("Largest files").bold());
        for (path, size) in largest {
            println!("  {size:>12}  {path}");
        }
    }

    Ok(())
}
