//! Record store: insert, replace, and the read paths over the `memorials` table.
//!
//! Writes run inside a transaction together with their audit-log entry. JSON list
//! columns are validated before writing and coerced when read (see
//! [`super::types::decode_list`]).

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{decode_list, ImageReference, Memorial, MemorialDraft, SourceLink};

const SELECT_COLUMNS: &str = "id, name, date_of_birth, date_of_death, age, place_of_birth, \
     place_of_death, nationality, story, sources, images, primary_image_url, primary_image_path, \
     user_id, created_at, updated_at";

/// Insert a new record, or replace an existing one when `draft.id` is set.
pub fn save_memorial(conn: &mut Connection, draft: &MemorialDraft) -> Result<Memorial> {
    match draft.id.as_deref() {
        Some(id) => update_memorial(conn, id, draft),
        None => insert_memorial(conn, draft),
    }
}

/// Insert a new record. Returns the stored row.
pub fn insert_memorial(conn: &mut Connection, draft: &MemorialDraft) -> Result<Memorial> {
    let date_of_death = draft.validate()?;
    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let (sources, images) = encode_lists(draft)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO memorials (id, name, date_of_birth, date_of_death, age, place_of_birth, \
         place_of_death, nationality, story, sources, images, primary_image_url, \
         primary_image_path, user_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
        params![
            id,
            draft.name.trim(),
            draft.date_of_birth.map(format_date),
            format_date(date_of_death),
            draft.age,
            draft.place_of_birth,
            draft.place_of_death,
            draft.nationality,
            draft.story,
            sources,
            images,
            draft.primary_image_url,
            draft.primary_image_path,
            draft.user_id,
            now,
        ],
    )?;
    write_audit_log(
        &tx,
        "create",
        &id,
        Some(&serde_json::json!({"images": draft.images.len()})),
    )?;
    tx.commit()?;

    tracing::debug!(id = %id, name = %draft.name, "memorial inserted");
    get_memorial(conn, &id)?.context("inserted memorial vanished")
}

/// Replace every column of an existing record. Fails if `id` is unknown.
pub fn update_memorial(conn: &mut Connection, id: &str, draft: &MemorialDraft) -> Result<Memorial> {
    let date_of_death = draft.validate()?;
    let now = chrono::Utc::now().to_rfc3339();
    let (sources, images) = encode_lists(draft)?;

    let tx = conn.transaction()?;
    let rows = tx.execute(
        "UPDATE memorials SET name = ?1, date_of_birth = ?2, date_of_death = ?3, age = ?4, \
         place_of_birth = ?5, place_of_death = ?6, nationality = ?7, story = ?8, sources = ?9, \
         images = ?10, primary_image_url = ?11, primary_image_path = ?12, user_id = ?13, \
         updated_at = ?14 WHERE id = ?15",
        params![
            draft.name.trim(),
            draft.date_of_birth.map(format_date),
            format_date(date_of_death),
            draft.age,
            draft.place_of_birth,
            draft.place_of_death,
            draft.nationality,
            draft.story,
            sources,
            images,
            draft.primary_image_url,
            draft.primary_image_path,
            draft.user_id,
            now,
            id,
        ],
    )?;
    if rows == 0 {
        bail!("memorial not found: {id}");
    }
    write_audit_log(
        &tx,
        "update",
        id,
        Some(&serde_json::json!({"images": draft.images.len()})),
    )?;
    tx.commit()?;

    get_memorial(conn, id)?.context("updated memorial vanished")
}

/// Fetch a single record by ID.
pub fn get_memorial(conn: &Connection, id: &str) -> Result<Option<Memorial>> {
    let memorial = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM memorials WHERE id = ?1"),
            params![id],
            row_to_memorial,
        )
        .optional()?;
    Ok(memorial)
}

/// All records, oldest first.
pub fn list_memorials(conn: &Connection) -> Result<Vec<Memorial>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM memorials ORDER BY created_at, id"
    ))?;
    let memorials = stmt
        .query_map([], row_to_memorial)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(memorials)
}

/// Case-insensitive substring match on `name`; the oldest match wins.
pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Memorial>> {
    let needle = name.trim();
    if needle.is_empty() {
        return Ok(None);
    }
    let pattern = format!("%{}%", escape_like(needle));
    let memorial = conn
        .query_row(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM memorials \
                 WHERE name LIKE ?1 ESCAPE '\\' \
                 ORDER BY created_at, id LIMIT 1"
            ),
            params![pattern],
            row_to_memorial,
        )
        .optional()?;
    Ok(memorial)
}

/// Audit entries for a subject, oldest first: `(created_at, operation, details)`.
pub fn audit_entries(
    conn: &Connection,
    subject: &str,
) -> Result<Vec<(String, String, Option<serde_json::Value>)>> {
    let mut stmt = conn.prepare(
        "SELECT created_at, operation, details FROM audit_log WHERE subject = ?1 ORDER BY id",
    )?;
    let entries = stmt
        .query_map(params![subject], |row| {
            let details: Option<String> = row.get(2)?;
            Ok((
                row.get(0)?,
                row.get(1)?,
                details.and_then(|d| serde_json::from_str(&d).ok()),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Record a completed orphan sweep in the audit log.
pub fn record_reclaim(conn: &Connection, bucket: &str, deleted: &[String]) -> Result<()> {
    write_audit_log(
        conn,
        "reclaim",
        bucket,
        Some(&serde_json::json!({"deleted": deleted.len(), "paths": deleted})),
    )
}

/// Write an entry to the audit_log table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    subject: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO audit_log (operation, subject, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, subject, details_json, now],
    )?;
    Ok(())
}

fn encode_lists(draft: &MemorialDraft) -> Result<(String, String)> {
    let sources = serde_json::to_string(&draft.sources)?;
    let images = serde_json::to_string(&draft.images)?;
    Ok((sources, images))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn row_to_memorial(row: &Row<'_>) -> rusqlite::Result<Memorial> {
    let id: String = row.get(0)?;
    let date_of_birth: Option<String> = row.get(2)?;
    let date_of_death: String = row.get(3)?;
    let sources_raw: String = row.get(9)?;
    let images_raw: String = row.get(10)?;

    let (sources, dropped_sources) = decode_list::<SourceLink>(&sources_raw);
    let (images, dropped_images) = decode_list::<ImageReference>(&images_raw);
    if dropped_sources + dropped_images > 0 {
        tracing::warn!(
            id = %id,
            dropped_sources,
            dropped_images,
            "malformed list entries dropped on read"
        );
    }

    Ok(Memorial {
        name: row.get(1)?,
        date_of_birth: date_of_birth.as_deref().map(|d| parse_date(2, d)).transpose()?,
        date_of_death: parse_date(3, &date_of_death)?,
        age: row.get(4)?,
        place_of_birth: row.get(5)?,
        place_of_death: row.get(6)?,
        nationality: row.get(7)?,
        story: row.get(8)?,
        sources,
        images,
        primary_image_url: row.get(11)?,
        primary_image_path: row.get(12)?,
        user_id: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        id,
    })
}
