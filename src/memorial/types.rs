//! Memorial record type definitions.
//!
//! Defines [`Memorial`] (a stored record), [`MemorialDraft`] (the insert/replace
//! payload), and the two list element types kept in JSON columns:
//! [`ImageReference`] and [`SourceLink`].

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An image attached to a memorial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Display URL. External for search candidates, owned once persisted.
    pub url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    /// Stable bucket object path. Present for every owned image written by this service.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ImageReference {
    pub fn external(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            path: None,
        }
    }

    pub fn owned(path: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            path: Some(path.into()),
        }
    }
}

/// A citation for the biographical data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
}

/// A memorial record, matching the `memorials` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memorial {
    /// UUID v7 primary key.
    pub id: String,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: NaiveDate,
    pub age: Option<u32>,
    pub place_of_birth: Option<String>,
    pub place_of_death: Option<String>,
    pub nationality: Option<String>,
    pub story: String,
    pub sources: Vec<SourceLink>,
    pub images: Vec<ImageReference>,
    pub primary_image_url: Option<String>,
    /// Bucket path of the primary image when it is owned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_image_path: Option<String>,
    /// Submitting user.
    pub user_id: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-modification timestamp.
    pub updated_at: String,
}

/// Insert-or-replace payload. `id` is `None` until the record is first persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorialDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub place_of_birth: Option<String>,
    #[serde(default)]
    pub place_of_death: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub story: String,
    #[serde(default)]
    pub sources: Vec<SourceLink>,
    #[serde(default)]
    pub images: Vec<ImageReference>,
    #[serde(default)]
    pub primary_image_url: Option<String>,
    #[serde(default)]
    pub primary_image_path: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl MemorialDraft {
    /// Check the write-side invariants and return the required date of death.
    pub fn validate(&self) -> Result<NaiveDate> {
        if self.name.trim().is_empty() {
            bail!("name is required");
        }
        let Some(date_of_death) = self.date_of_death else {
            bail!("date_of_death is required");
        };
        if let Some(born) = self.date_of_birth {
            if born > date_of_death {
                bail!("date_of_birth {born} is after date_of_death {date_of_death}");
            }
        }
        if let Some(bad) = self.images.iter().find(|i| i.url.trim().is_empty()) {
            bail!("image entry has an empty url (title: {:?})", bad.title);
        }
        if let Some(bad) = self.sources.iter().find(|s| s.url.trim().is_empty()) {
            bail!("source entry has an empty url (title: {:?})", bad.title);
        }
        Ok(date_of_death)
    }
}

impl From<Memorial> for MemorialDraft {
    fn from(m: Memorial) -> Self {
        Self {
            id: Some(m.id),
            name: m.name,
            date_of_birth: m.date_of_birth,
            date_of_death: Some(m.date_of_death),
            age: m.age,
            place_of_birth: m.place_of_birth,
            place_of_death: m.place_of_death,
            nationality: m.nationality,
            story: m.story,
            sources: m.sources,
            images: m.images,
            primary_image_url: m.primary_image_url,
            primary_image_path: m.primary_image_path,
            user_id: m.user_id,
        }
    }
}

/// A string field where anything but a string (null, numbers, objects) reads as empty.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

/// Decode a JSON list column, dropping entries that do not match `T`.
///
/// Returns the decoded entries and the number of entries that were dropped.
pub fn decode_list<T: DeserializeOwned>(raw: &str) -> (Vec<T>, usize) {
    let values: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(serde_json::Value::Array(values)) => values,
        _ => return (Vec::new(), 1),
    };
    let total = values.len();
    let decoded: Vec<T> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    let dropped = total - decoded.len();
    (decoded, dropped)
}
