use crate::ledger::SourceKind;
use crate::{Error, Result};
use serde::Serialize;
use url::Url;

const SOCIAL_HOSTS: &[&str] = &["instagram.com", "facebook.com", "fb.com"];

/// The company being researched: its website plus any extra pages
/// (social profiles, directory listings) supplied by the caller.
#[derive(Clone, Debug, Serialize)]
pub struct ResearchTarget {
    primary: Url,
    secondary: Vec<Url>,
}

impl ResearchTarget {
    /// Parses and validates the target urls.
    ///
    /// Secondary urls equal to the primary or to an earlier secondary are
    /// dropped so every source id in a run is unique.
    pub fn new<'a>(primary: &str, secondary: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let primary = parse_http_url(primary)?;

        let mut urls: Vec<Url> = Vec::new();
        for raw in secondary {
            let url = parse_http_url(raw)?;
            if url != primary && !urls.contains(&url) {
                urls.push(url);
            }
        }

        Ok(Self {
            primary,
            secondary: urls,
        })
    }

    pub fn primary(&self) -> &Url {
        &self.primary
    }

    pub fn secondary(&self) -> &[Url] {
        &self.secondary
    }

    /// Every url to fetch in dispatch order, paired with its source kind.
    pub fn sources(&self) -> Vec<(&Url, SourceKind)> {
        std::iter::once((&self.primary, SourceKind::PrimarySite))
            .chain(self.secondary.iter().map(|url| (url, classify(url))))
            .collect()
    }
}

fn parse_http_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidTarget("url is empty".to_string()));
    }

    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(Error::InvalidTarget(format!(
            "{} is not an http(s) url",
            raw
        ))),
    }
}

/// Social profiles are routed to the social fetcher; everything else is
/// treated as a regular web page.
pub fn classify(url: &Url) -> SourceKind {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let social = SOCIAL_HOSTS
        .iter()
        .any(|s| host == *s || host.ends_with(&format!(".{}", s)));

    if social {
        SourceKind::Social
    } else {
        SourceKind::PrimarySite
    }
}
