//! CLI `inspect` command: display full details for a single memorial.

use anyhow::{Context, Result};

use memorial::config::MemorialConfig;
use memorial::memorial::store;

/// Inspect a single memorial by ID and display full details.
pub fn inspect(config: &MemorialConfig, id: &str) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = memorial::db::open_database(&db_path)?;

    let m = store::get_memorial(&conn, id)?.with_context(|| format!("memorial not found: {id}"))?;

    println!("Memorial: {}", m.id);
    println!("{}", "=".repeat(50));
    println!("  Name:           {}", m.name);
    if let Some(born) = m.date_of_birth {
        println!("  Born:           {born}{}", place(m.place_of_birth.as_deref()));
    }
    println!("  Died:           {}{}", m.date_of_death, place(m.place_of_death.as_deref()));
    if let Some(age) = m.age {
        println!("  Age:            {age}");
    }
    if let Some(ref nationality) = m.nationality {
        println!("  Nationality:    {nationality}");
    }
    if let Some(ref user) = m.user_id {
        println!("  Submitted by:   {user}");
    }
    println!("  Created:        {}", m.created_at);
    println!("  Updated:        {}", m.updated_at);
    println!();
    println!("Story:");
    println!("  {}", m.story);

    if !m.images.is_empty() {
        println!();
        println!("Images:");
        for img in &m.images {
            let marker = if m.primary_image_url.as_deref() == Some(img.url.as_str()) {
                "*"
            } else {
                " "
            };
            match img.path {
                Some(ref path) => println!(" {marker} {path} ({})", img.title),
                None => println!(" {marker} {} [external] ({})", img.url, img.title),
            }
        }
    }

    if !m.sources.is_empty() {
        println!();
        println!("Sources:");
        for s in &m.sources {
            println!("  {} ({})", s.title, s.url);
        }
    }

    let log = store::audit_entries(&conn, &m.id)?;
    if !log.is_empty() {
        println!();
        println!("Audit Log:");
        for (created_at, operation, details) in log {
            let details = details.map(|d| d.to_string()).unwrap_or_default();
            println!("  {created_at} [{operation}] {details}");
        }
    }

    Ok(())
}

fn place(place: Option<&str>) -> String {
    place.map(|p| format!(" in {p}")).unwrap_or_default()
}
