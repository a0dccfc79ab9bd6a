//! Source fetchers: one attempt per call, bounded by the given timeout,
//! and every fault reported through [`FetchResult`] instead of an error.

use crate::ledger::{Settlement, SourceKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

mod html;
mod social;
mod web;

pub use html::html_to_text;
pub use social::SocialFetcher;
pub use web::HttpFetcher;

const MIN_CONTENT_CHARS: usize = 100;
const MAX_CONTENT_CHARS: usize = 10_000;
const TRUNCATION_MARKER: &str = "\n\n[Content truncated...]";

#[derive(Clone, Debug, PartialEq)]
pub enum FetchResult {
    Success(String),
    Failed(String),
}

impl From<FetchResult> for Settlement {
    fn from(result: FetchResult) -> Self {
        match result {
            FetchResult::Success(content) => Settlement::Success(content),
            FetchResult::Failed(error) => Settlement::Failed(error),
        }
    }
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, target: &str, timeout: Duration) -> FetchResult;
}

/// Routes each source kind to the fetcher registered for it.
pub struct FetcherRegistry {
    fallback: Arc<dyn SourceFetcher>,
    routes: HashMap<SourceKind, Arc<dyn SourceFetcher>>,
}

impl FetcherRegistry {
    /// `fallback` serves every kind without a dedicated route.
    pub fn new(fallback: Arc<dyn SourceFetcher>) -> Self {
        Self {
            fallback,
            routes: HashMap::new(),
        }
    }

    pub fn route(mut self, kind: SourceKind, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.routes.insert(kind, fetcher);
        self
    }

    pub fn for_kind(&self, kind: SourceKind) -> Arc<dyn SourceFetcher> {
        self.routes
            .get(&kind)
            .unwrap_or(&self.fallback)
            .clone()
    }
}

/// Rejects near-empty pages and caps the rest at `max_chars`.
pub(crate) fn finish_content(text: String, max_chars: usize) -> FetchResult {
    if text.trim().chars().count() < MIN_CONTENT_CHARS {
        return FetchResult::Failed(
            "page returned minimal content, it may be blocked or require authentication"
                .to_string(),
        );
    }
    FetchResult::Success(truncate(text, max_chars))
}

pub(crate) fn truncate(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl SourceFetcher for Fixed {
        async fn fetch(&self, _: &str, _: Duration) -> FetchResult {
            FetchResult::Success(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_registry_routes_and_falls_back() {
        let registry = FetcherRegistry::new(Arc::new(Fixed("web")))
            .route(SourceKind::Social, Arc::new(Fixed("social")));

        let timeout = Duration::from_secs(1);
        assert_eq!(
            registry.for_kind(SourceKind::Social).fetch("x", timeout).await,
            FetchResult::Success("social".to_string())
        );
        assert_eq!(
            registry.for_kind(SourceKind::PrimarySite).fetch("x", timeout).await,
            FetchResult::Success("web".to_string())
        );
    }

    #[test]
    fn test_finish_content() {
        assert!(matches!(
            finish_content("tiny".to_string(), MAX_CONTENT_CHARS),
            FetchResult::Failed(_)
        ));

        let long = "é".repeat(150);
        match finish_content(long, 120) {
            FetchResult::Success(text) => {
                assert!(text.ends_with(TRUNCATION_MARKER));
                assert_eq!(text.chars().count(), 120 + TRUNCATION_MARKER.chars().count());
            }
            FetchResult::Failed(err) => panic!("unexpected failure: {}", err),
        }
    }
}
