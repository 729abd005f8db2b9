//! CLI `cleanup` command: reclaim bucket objects no memorial references.

use anyhow::Result;

use memorial::config::MemorialConfig;
use memorial::service::MemorialService;

/// Sweep the bucket. With `dry_run`, only list what would be deleted.
pub async fn cleanup(config: MemorialConfig, dry_run: bool) -> Result<()> {
    let service = MemorialService::open(config).await?;
    let report = service.cleanup(dry_run).await?;

    println!(
        "Scanned {} object(s); {} path(s) referenced.",
        report.scanned, report.referenced
    );
    if report.orphaned.is_empty() {
        println!("{}", report.message());
        return Ok(());
    }

    let (verb, paths) = if dry_run {
        ("Would delete", &report.orphaned)
    } else {
        ("Deleted", &report.deleted)
    };
    println!("{verb}:");
    for path in paths {
        println!("  {path}");
    }
    println!();
    println!("{}", report.message());
    Ok(())
}
