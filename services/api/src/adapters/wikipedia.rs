//! services/api/src/adapters/wikipedia.rs
//!
//! This module contains the adapter for the Wikipedia REST and search APIs.
//! It implements the `ImageLookupService` port from the `core` crate.

use async_trait::async_trait;
use lesson_core::ports::{ImageLookupService, PageSummary, PortError, PortResult};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::http;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct SummaryResponse {
    title: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    thumbnail: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    source: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Looks pages up on one language edition of Wikipedia.
#[derive(Clone)]
pub struct WikipediaAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl WikipediaAdapter {
    /// Creates an adapter for `https://{lang}.wikipedia.org`.
    pub fn new(lang: &str) -> PortResult<Self> {
        Ok(Self {
            client: http::client(Duration::from_secs(5))?,
            base_url: format!("https://{}.wikipedia.org", lang),
        })
    }
}

/// Page titles use underscores in REST paths; everything else is percent-encoded.
fn encode_title(title: &str) -> String {
    urlencoding::encode(&title.trim().replace(' ', "_")).into_owned()
}

//=========================================================================================
// `ImageLookupService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageLookupService for WikipediaAdapter {
    async fn page_summary(&self, title: &str) -> PortResult<Option<PageSummary>> {
        let url = format!(
            "{}/api/rest_v1/page/summary/{}",
            self.base_url,
            encode_title(title)
        );
        debug!(%url, "Fetching page summary");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(http::transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(http::provider_error(response).await);
        }

        let summary: SummaryResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(Some(PageSummary {
            title: summary.title,
            extract: summary.extract,
            thumbnail_url: summary.thumbnail.map(|t| t.source),
        }))
    }

    async fn search_titles(&self, query: &str, limit: usize) -> PortResult<Vec<String>> {
        let url = format!("{}/w/api.php", self.base_url);
        let limit = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(http::transport_error)?;

        if !response.status().is_success() {
            return Err(http::provider_error(response).await);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(parsed
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_path_safe() {
        assert_eq!(encode_title("Cycle de l'eau"), "Cycle_de_l%27eau");
        assert_eq!(encode_title("Énergie"), "%C3%89nergie");
        assert_eq!(encode_title("  AC/DC  "), "AC%2FDC");
        assert_eq!(encode_title("Acide (chimie)"), "Acide_%28chimie%29");
    }

    #[test]
    fn search_results_tolerate_a_missing_query_block() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"batchcomplete":""}"#).unwrap();
        assert!(parsed.query.is_none());

        let parsed: SearchResponse = serde_json::from_str(
            r#"{"query":{"search":[{"title":"Photosynthèse","pageid":1}]}}"#,
        )
        .unwrap();
        assert_eq!(parsed.query.unwrap().search[0].title, "Photosynthèse");
    }
}
