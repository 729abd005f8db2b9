//! CLI `doctor` command: database and bucket diagnostics.

use anyhow::{Context, Result};

use memorial::config::MemorialConfig;
use memorial::db;
use memorial::storage::local::LocalBucket;
use memorial::storage::{Bucket, BucketUrls};

/// Run diagnostics and print a health report.
pub async fn doctor(config: &MemorialConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let bucket_dir = config.resolved_bucket_dir();

    println!("Memorial Health Report");
    println!("======================");
    println!();

    if db_path.exists() {
        let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
        let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
        let report = db::check_database_health(&conn).context("failed to run health check")?;

        println!("Database:          {}", db_path.display());
        println!("File size:         {}", format_bytes(file_size));
        println!("Schema version:    {}", report.schema_version);
        println!();
        println!("Row counts:");
        println!("  Memorials:       {}", report.memorial_count);
        println!("  Audit log:       {}", report.log_count);
        println!();
        if report.integrity_ok {
            println!("Integrity check:   PASSED");
        } else {
            println!("Integrity check:   FAILED ({})", report.integrity_details);
            println!();
            println!("Recovery: restore {} from a backup.", db_path.display());
        }
    } else {
        println!("Database:          not found at {}", db_path.display());
        println!("Run `memorial serve` to initialize.");
    }

    println!();
    println!("Bucket:            {} ({})", config.storage.bucket, bucket_dir.display());
    let (objects, bytes) = bucket_usage(config).await?;
    println!("  Objects:         {objects}");
    println!("  Size:            {}", format_bytes(bytes));
    println!("Public base URL:   {}", config.storage.public_base_url);
    println!("Public reads:      {}", if config.storage.public_read { "enabled" } else { "disabled" });
    if config.storage.signing_secret.is_empty() {
        println!("  WARNING: no signing secret set; signed URLs will not survive a restart.");
    }

    println!();
    println!("Search API key:    {}", configured(config.search.api_key.as_deref()));
    println!("LLM API key:       {}", configured(config.llm.api_key.as_deref()));

    Ok(())
}

async fn bucket_usage(config: &MemorialConfig) -> Result<(usize, u64)> {
    let urls = BucketUrls::new(
        &config.storage.public_base_url,
        &config.storage.bucket,
        &config.storage.signing_secret,
    )?;
    let bucket = LocalBucket::new(config.resolved_bucket_dir(), urls);
    let objects = bucket.list().await.context("failed to list bucket")?;
    Ok((objects.len(), objects.iter().map(|o| o.size).sum()))
}

fn configured(key: Option<&str>) -> &'static str {
    match key {
        Some(k) if !k.is_empty() => "set",
        _ => "missing",
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
