//! CLI `list` command: one line per stored memorial.

use anyhow::Result;

use memorial::config::MemorialConfig;
use memorial::memorial::store;

/// Print every memorial, oldest first.
pub fn list(config: &MemorialConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = memorial::db::open_database(&db_path)?;
    let memorials = store::list_memorials(&conn)?;

    if memorials.is_empty() {
        println!("No memorials stored.");
        return Ok(());
    }

    println!("{:<38} {:<12} {:>6}  NAME", "ID", "DIED", "IMAGES");
    for m in &memorials {
        println!(
            "{:<38} {:<12} {:>6}  {}",
            m.id,
            m.date_of_death.to_string(),
            m.images.len(),
            m.name
        );
    }
    println!();
    println!("{} memorial(s)", memorials.len());
    Ok(())
}
