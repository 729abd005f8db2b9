//! Tavily-compatible web search client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EnrichError, SearchProvider, SearchResponse, SearchResult};
use crate::config::SearchConfig;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: String,
    search_depth: &'a str,
    include_images: bool,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
    #[serde(default)]
    images: Vec<TavilyImage>,
}

/// Images come back as bare URLs, or as objects when descriptions are requested.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TavilyImage {
    Url(String),
    Described { url: String },
}

impl TavilyImage {
    fn into_url(self) -> String {
        match self {
            Self::Url(url) | Self::Described { url } => url,
        }
    }
}

pub struct TavilyClient {
    config: SearchConfig,
    http: reqwest::Client,
}

impl TavilyClient {
    pub fn new(config: SearchConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn query_for(&self, name: &str) -> String {
        self.config.query_template.replace("{name}", name.trim())
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, name: &str) -> Result<SearchResponse, EnrichError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(EnrichError::NotConfigured("search api key"))?;

        let request = SearchRequest {
            api_key,
            query: self.query_for(name),
            search_depth: &self.config.search_depth,
            include_images: true,
            max_results: self.config.max_results,
        };
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        tracing::debug!(url = %url, name = %name, "searching");

        let response = self.http.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(status = %status, "search request failed");
            return Err(EnrichError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Decode(e.to_string()))?;

        Ok(SearchResponse {
            results: body.results,
            images: body.images.into_iter().map(TavilyImage::into_url).collect(),
        })
    }
}
