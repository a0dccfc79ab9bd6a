use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use text_splitter::TextSplitter;

#[derive(Clone, Debug, PartialEq)]
pub struct Passage {
    pub document: String,
    pub text: String,
    pub score: f32,
}

/// Ranked passage lookup over a pre-indexed document set.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Returns at most `top_k` passages, best first.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Passage>>;
}

/// Renders retrieved passages as the ledger content of the knowledge-base
/// source.
pub fn passages_to_content(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| format!("[{}] (relevance {:.2})\n{}", p.document, p.score, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "are", "from", "our", "you", "your", "how",
    "what", "can", "into", "about",
];

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

struct IndexedPassage {
    document: String,
    text: String,
    terms: HashSet<String>,
}

const DEFAULT_PASSAGE_CHARS: usize = 800;

/// In-memory keyword index over local text and markdown documents (case
/// studies, service sheets and the like). Documents are chunked into
/// passages of at most `passage_chars` characters, split at the coarsest
/// boundary that fits.
pub struct LocalKnowledgeBase {
    passages: Vec<IndexedPassage>,
    passage_chars: usize,
}

impl Default for LocalKnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalKnowledgeBase {
    pub fn new() -> Self {
        Self {
            passages: Vec::new(),
            passage_chars: DEFAULT_PASSAGE_CHARS,
        }
    }

    /// Only affects documents added afterwards.
    pub fn with_passage_chars(mut self, passage_chars: usize) -> Self {
        self.passage_chars = passage_chars.max(1);
        self
    }

    pub fn add_document(&mut self, name: &str, text: &str) {
        let splitter = TextSplitter::new(self.passage_chars);
        for chunk in splitter.chunks(text) {
            let chunk = chunk.trim();
            if chunk.is_empty() {
                continue;
            }
            self.passages.push(IndexedPassage {
                document: name.to_string(),
                text: chunk.to_string(),
                terms: terms(chunk),
            });
        }
    }

    /// Indexes every `.txt` and `.md` file directly inside `dir`, in file
    /// name order.
    pub async fn load_dir(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let indexable = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"));
            if indexable {
                paths.push(path);
            }
        }
        paths.sort();

        let mut kb = Self::new();
        for path in paths {
            let text = tokio::fs::read_to_string(&path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            kb.add_document(&name, &text);
        }

        tracing::info!(dir = %dir.display(), passages = kb.passages.len(), "loaded knowledge base");
        Ok(kb)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait]
impl KnowledgeRetriever for LocalKnowledgeBase {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Passage>> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .passages
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let hits = query_terms.intersection(&p.terms).count();
                (hits > 0).then(|| (i, hits as f32 / query_terms.len() as f32))
            })
            .collect();

        // stable sort keeps document order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| Passage {
                document: self.passages[i].document.clone(),
                text: self.passages[i].text.clone(),
                score,
            })
            .collect())
    }
}
