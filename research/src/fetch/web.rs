use super::{FetchResult, MAX_CONTENT_CHARS, SourceFetcher, finish_content, html_to_text};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

/// Fetches a web page and reduces it to text.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: client()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

pub(crate) fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?)
}

/// GETs `url` and returns the body, describing any failure as text.
pub(crate) async fn get_body(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> std::result::Result<String, String> {
    let res = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(describe)?;

    let status = res.status();
    if !status.is_success() {
        return Err(format!("http status {}", status));
    }

    res.text().await.map_err(describe)
}

fn describe(err: reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, target: &str, timeout: Duration) -> FetchResult {
        tracing::debug!(url = target, "fetching page");
        match get_body(&self.client, target, timeout).await {
            Ok(body) => finish_content(html_to_text(&body), MAX_CONTENT_CHARS),
            Err(err) => FetchResult::Failed(err),
        }
    }
}
