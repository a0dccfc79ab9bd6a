use super::html::{html_to_text, inline_text};
use super::web::{client, get_body};
use super::{FetchResult, SourceFetcher, truncate};
use crate::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::fmt::Write;
use std::time::Duration;
use url::Url;

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const MAX_SEARCH_RESULTS: usize = 5;
const MAX_PROFILE_CHARS: usize = 5_000;
const MIN_PROFILE_CHARS: usize = 200;

#[derive(Debug, PartialEq)]
struct SearchHit {
    title: String,
    url: String,
    snippet: String,
}

/// Fetcher for social profiles.
///
/// Facebook refuses direct scraping, so Facebook urls are resolved through
/// a `site:facebook.com` web search for the page name. Other profiles are
/// fetched directly and rejected when they come back as a login wall.
pub struct SocialFetcher {
    client: reqwest::Client,
    search_endpoint: Url,
    location: Option<String>,
}

impl SocialFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: client()?,
            search_endpoint: Url::parse(SEARCH_ENDPOINT)?,
            location: None,
        })
    }

    /// Narrows every page search to a city or country.
    pub fn with_location(mut self, location: &str) -> Self {
        let location = location.trim();
        self.location = (!location.is_empty()).then(|| location.to_string());
        self
    }

    fn search_query(&self, name: &str) -> String {
        match &self.location {
            Some(location) => format!("site:facebook.com {} {}", name, location),
            None => format!("site:facebook.com {}", name),
        }
    }

    async fn search_facebook(&self, url: &Url, timeout: Duration) -> FetchResult {
        let name = page_name(url);
        let query = self.search_query(&name);

        let mut search = self.search_endpoint.clone();
        search.query_pairs_mut().append_pair("q", &query);

        let body = match get_body(&self.client, search.as_str(), timeout).await {
            Ok(body) => body,
            Err(err) => return FetchResult::Failed(format!("facebook search failed: {}", err)),
        };

        let hits = parse_search_results(&body, MAX_SEARCH_RESULTS);
        if hits.is_empty() {
            return FetchResult::Failed(format!("no facebook results found for '{}'", name));
        }

        FetchResult::Success(render_hits(&name, &query, &hits))
    }

    async fn fetch_profile(&self, url: &Url, timeout: Duration) -> FetchResult {
        let body = match get_body(&self.client, url.as_str(), timeout).await {
            Ok(body) => body,
            Err(err) => return FetchResult::Failed(err),
        };

        let text = html_to_text(&body);
        if text.chars().count() < MIN_PROFILE_CHARS || text.to_lowercase().contains("log in") {
            return FetchResult::Failed(
                "profile returned limited data, it may be private or behind a login wall"
                    .to_string(),
            );
        }
        FetchResult::Success(truncate(text, MAX_PROFILE_CHARS))
    }
}

#[async_trait]
impl SourceFetcher for SocialFetcher {
    async fn fetch(&self, target: &str, timeout: Duration) -> FetchResult {
        let url = match Url::parse(target) {
            Ok(url) => url,
            Err(err) => return FetchResult::Failed(format!("invalid url: {}", err)),
        };

        if is_facebook(&url) {
            tracing::debug!(url = target, "searching for facebook page");
            self.search_facebook(&url, timeout).await
        } else {
            tracing::debug!(url = target, "fetching social profile");
            self.fetch_profile(&url, timeout).await
        }
    }
}

fn is_facebook(url: &Url) -> bool {
    let host = url.host_str().unwrap_or_default();
    ["facebook.com", "fb.com"]
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
}

/// First meaningful path segment, with separators turned into spaces.
fn page_name(url: &Url) -> String {
    url.path_segments()
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty() && *s != "pages" && *s != "people")
        .map(|s| s.replace(['-', '_', '.'], " "))
        .unwrap_or_else(|| url.host_str().unwrap_or_default().to_string())
}

fn parse_search_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let (Ok(result), Ok(link), Ok(snippet)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&result)
        .filter_map(|hit| {
            let anchor = hit.select(&link).next()?;
            let href = anchor.value().attr("href")?;
            Some(SearchHit {
                title: inline_text(anchor),
                url: resolve_result_url(href),
                snippet: hit
                    .select(&snippet)
                    .next()
                    .map(inline_text)
                    .unwrap_or_default(),
            })
        })
        .take(limit)
        .collect()
}

/// Search results link through a redirect carrying the real url in `uddg`.
fn resolve_result_url(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

fn render_hits(name: &str, query: &str, hits: &[SearchHit]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Facebook search results for {}\n", name);
    let _ = writeln!(out, "Search query: `{}`\n", query);
    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(out, "## {}. {}", i + 1, hit.title);
        let _ = writeln!(out, "URL: {}", hit.url);
        let _ = writeln!(out, "Snippet: {}\n", hit.snippet);
    }
    out
}
