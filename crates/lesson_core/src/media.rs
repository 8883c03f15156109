//! crates/lesson_core/src/media.rs
//!
//! Finds an illustrative image for a free-text query.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::LessonImage;
use crate::ports::{ImageLookupService, PageSummary, PortError, PortResult};

/// Resolves image queries against a reference-work image source.
///
/// The query is first tried as an exact page title; if that page has no
/// thumbnail the source is searched and the first candidates are tried in
/// relevance order. Every miss, error and timeout ends in `None`.
#[derive(Clone)]
pub struct MediaResolver {
    lookup: Arc<dyn ImageLookupService>,
    pub direct_timeout: Duration,
    pub search_timeout: Duration,
    pub candidate_timeout: Duration,
    pub max_candidates: usize,
}

impl MediaResolver {
    pub fn new(lookup: Arc<dyn ImageLookupService>) -> Self {
        Self {
            lookup,
            direct_timeout: Duration::from_secs(5),
            search_timeout: Duration::from_secs(5),
            candidate_timeout: Duration::from_secs(3),
            max_candidates: 5,
        }
    }

    pub async fn resolve_image(&self, query: &str) -> Option<LessonImage> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        match bounded(self.direct_timeout, self.lookup.page_summary(query)).await {
            Ok(Some(summary)) => {
                if let Some(image) = to_image(summary) {
                    debug!(query, title = %image.title, "Image found on exact page");
                    return Some(image);
                }
            }
            Ok(None) => {}
            Err(e) => debug!(query, error = %e, "Direct page lookup failed"),
        }

        let candidates = match bounded(
            self.search_timeout,
            self.lookup.search_titles(query, self.max_candidates),
        )
        .await
        {
            Ok(titles) => titles,
            Err(e) => {
                warn!(query, error = %e, "Image search failed");
                return None;
            }
        };

        for title in candidates.iter().take(self.max_candidates) {
            match bounded(self.candidate_timeout, self.lookup.page_summary(title)).await {
                Ok(Some(summary)) => {
                    if let Some(image) = to_image(summary) {
                        info!(query, title = %image.title, "Image found through search");
                        return Some(image);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(query, candidate = %title, error = %e, "Candidate lookup failed"),
            }
        }

        info!(query, "No image found");
        None
    }

    /// Resolves every query concurrently. The output is positionally aligned
    /// with the input.
    pub async fn resolve_many(&self, queries: &[String]) -> Vec<Option<LessonImage>> {
        join_all(queries.iter().map(|q| self.resolve_image(q))).await
    }
}

async fn bounded<T>(limit: Duration, call: impl Future<Output = PortResult<T>>) -> PortResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| PortError::Unexpected(format!("timed out after {:?}", limit)))?
}

fn to_image(summary: PageSummary) -> Option<LessonImage> {
    let url = summary.thumbnail_url.filter(|u| !u.is_empty())?;
    Some(LessonImage {
        url,
        title: summary.title,
        description: summary.extract,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeLookup;

    #[tokio::test]
    async fn exact_page_with_thumbnail_wins() {
        let lookup = FakeLookup::default().with_page("Volcan", Some("https://img/volcan.jpg"));
        let resolver = MediaResolver::new(Arc::new(lookup));

        let image = resolver.resolve_image("Volcan").await.unwrap();
        assert_eq!(image.url, "https://img/volcan.jpg");
        assert_eq!(image.title, "Volcan");
    }

    #[tokio::test]
    async fn falls_back_to_the_first_candidate_with_a_thumbnail() {
        let lookup = FakeLookup::default()
            .with_page("Q", None)
            .with_search("Q", &["A", "B", "C"])
            .with_page("A", None)
            .with_page("B", Some("https://img/b.jpg"))
            .with_page("C", Some("https://img/c.jpg"));
        let resolver = MediaResolver::new(Arc::new(lookup));

        let image = resolver.resolve_image("Q").await.unwrap();
        assert_eq!(image.url, "https://img/b.jpg");
        assert_eq!(image.title, "B");
    }

    #[tokio::test]
    async fn total_miss_is_none() {
        let lookup = FakeLookup::default().with_search("nothing", &["X"]);
        let resolver = MediaResolver::new(Arc::new(lookup));
        assert!(resolver.resolve_image("nothing").await.is_none());
        assert!(resolver.resolve_image("   ").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookups_time_out_to_none() {
        let lookup = FakeLookup::default()
            .with_page("slow", Some("https://img/slow.jpg"))
            .with_delay(Duration::from_secs(30));
        let resolver = MediaResolver::new(Arc::new(lookup));
        assert!(resolver.resolve_image("slow").await.is_none());
    }

    #[tokio::test]
    async fn resolve_many_keeps_positions() {
        let lookup = FakeLookup::default()
            .with_page("one", Some("https://img/1.jpg"))
            .with_page("three", Some("https://img/3.jpg"));
        let resolver = MediaResolver::new(Arc::new(lookup));

        let images = resolver
            .resolve_many(&["one".to_string(), "two".to_string(), "three".to_string()])
            .await;
        assert_eq!(images.len(), 3);
        assert_eq!(images[0].as_ref().map(|i| i.url.as_str()), Some("https://img/1.jpg"));
        assert!(images[1].is_none());
        assert_eq!(images[2].as_ref().map(|i| i.url.as_str()), Some("https://img/3.jpg"));
    }
}
