//! Enrichment: synthesize a memorial candidate for a name from web search and
//! language-model extraction.
//!
//! Two seams are traits so tests can swap them out:
//! - [`SearchProvider`]: web search returning text results and image URLs
//!   ([`search::TavilyClient`]).
//! - [`Extractor`]: structured field extraction from search context
//!   ([`extract::OpenAiExtractor`]).

pub mod extract;
pub mod search;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::MemorialConfig;
use crate::memorial::types::{ImageReference, Memorial, SourceLink};

/// Separator between search results in the extraction context.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
/// Title given to uncited search results that carry none.
const DEFAULT_SOURCE_TITLE: &str = "Source";

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("No reliable information could be found.")]
    NoContext,
    #[error("The AI could not extract information.")]
    NoExtraction,
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

// ── Seams ────────────────────────────────────────────────────────────────────

/// One text result from a web search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResult {
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// Image URLs found by the search.
    pub images: Vec<String>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, name: &str) -> Result<SearchResponse, EnrichError>;
}

/// A source cited by the model. Either field may be missing in model output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CitedSource {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Fields extracted by the model, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Extraction {
    pub name: Option<String>,
    pub date_of_birth: Option<String>,
    pub date_of_death: Option<String>,
    #[serde(deserialize_with = "lenient_age")]
    pub age: Option<f64>,
    pub place_of_birth: Option<String>,
    pub place_of_death: Option<String>,
    pub nationality: Option<String>,
    pub story: Option<String>,
    pub sources: Option<Vec<CitedSource>>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, name: &str, context: &str) -> Result<Extraction, EnrichError>;
}

// ── Results ──────────────────────────────────────────────────────────────────

/// A synthesized, unsaved memorial.
#[derive(Debug, Clone, Serialize)]
pub struct MemorialCandidate {
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub age: Option<u32>,
    pub place_of_birth: Option<String>,
    pub place_of_death: Option<String>,
    pub nationality: Option<String>,
    pub story: String,
    pub sources: Vec<SourceLink>,
    pub images: Vec<ImageReference>,
    #[serde(rename = "isExisting")]
    pub is_existing: bool,
}

/// A stored record returned by a lookup.
#[derive(Debug, Clone, Serialize)]
pub struct ExistingMemorial {
    #[serde(flatten)]
    pub memorial: Memorial,
    #[serde(rename = "isExisting")]
    pub is_existing: bool,
}

/// Lookup result: a stored record, or a candidate synthesized from the web.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LookupResponse {
    Existing(ExistingMemorial),
    Candidate(MemorialCandidate),
}

impl LookupResponse {
    pub fn existing(memorial: Memorial) -> Self {
        Self::Existing(ExistingMemorial {
            memorial,
            is_existing: true,
        })
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, Self::Existing(_))
    }
}

// ── Enricher ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Enricher {
    search: Arc<dyn SearchProvider>,
    extractor: Arc<dyn Extractor>,
}

impl Enricher {
    pub fn new(search: Arc<dyn SearchProvider>, extractor: Arc<dyn Extractor>) -> Self {
        Self { search, extractor }
    }

    /// Tavily search and OpenAI extraction built from configuration.
    pub fn from_config(config: &MemorialConfig, http: reqwest::Client) -> anyhow::Result<Self> {
        let search = search::TavilyClient::new(config.search.clone(), http);
        let extractor = extract::OpenAiExtractor::new(config.llm.clone(), &config.http.user_agent)?;
        Ok(Self::new(Arc::new(search), Arc::new(extractor)))
    }

    /// Search for `name`, extract fields from the results, and assemble a candidate.
    pub async fn synthesize(&self, name: &str) -> Result<MemorialCandidate, EnrichError> {
        let response = self.search.search(name).await?;
        let context = build_context(&response.results);
        if context.trim().is_empty() {
            return Err(EnrichError::NoContext);
        }
        tracing::debug!(
            name = %name,
            results = response.results.len(),
            images = response.images.len(),
            "search context assembled"
        );

        let extraction = self.extractor.extract(name, &context).await?;
        Ok(build_candidate(name, extraction, &response))
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────────

/// `Source: {url}\nContent: {content}` per result, separated by a rule.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("Source: {}\nContent: {}", r.url, r.content))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn build_candidate(
    name: &str,
    extraction: Extraction,
    response: &SearchResponse,
) -> MemorialCandidate {
    let images = response
        .images
        .iter()
        .filter(|url| !url.trim().is_empty())
        .map(|url| ImageReference::external(url.clone(), name))
        .collect();

    MemorialCandidate {
        name: non_blank(extraction.name).unwrap_or_else(|| name.trim().to_string()),
        date_of_birth: extraction.date_of_birth.as_deref().and_then(parse_date),
        date_of_death: extraction.date_of_death.as_deref().and_then(parse_date),
        age: extraction.age.and_then(normalize_age),
        place_of_birth: non_blank(extraction.place_of_birth),
        place_of_death: non_blank(extraction.place_of_death),
        nationality: non_blank(extraction.nationality),
        story: extraction.story.unwrap_or_default(),
        sources: merge_sources(extraction.sources.as_deref().unwrap_or_default(), &response.results),
        images,
        is_existing: false,
    }
}

/// Model-cited sources first, then search results not already cited.
/// Deduplicated by URL; entries without a URL are dropped.
pub fn merge_sources(cited: &[CitedSource], raw: &[SearchResult]) -> Vec<SourceLink> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for source in cited {
        let Some(url) = source.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        if seen.insert(url.to_string()) {
            merged.push(SourceLink {
                url: url.to_string(),
                title: source.title.clone().unwrap_or_default(),
            });
        }
    }
    for result in raw {
        let url = result.url.trim();
        if url.is_empty() || !seen.insert(url.to_string()) {
            continue;
        }
        let title = result
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_SOURCE_TITLE);
        merged.push(SourceLink {
            url: url.to_string(),
            title: title.to_string(),
        });
    }
    merged
}

/// `YYYY-MM-DD`, or `None` for anything else.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Models sometimes quote numbers; anything that is not a number reads as absent.
fn lenient_age<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn normalize_age(age: f64) -> Option<u32> {
    if !age.is_finite() {
        return None;
    }
    let rounded = age.round();
    if rounded < 0.0 || rounded > f64::from(u32::MAX) {
        None
    } else {
        Some(rounded as u32)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
