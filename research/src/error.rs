use thiserror::Error;

/// Run-level failures. Per-source fetch problems never appear here; they
/// are recorded on the source's ledger entry instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid research target: {0}")]
    InvalidTarget(String),

    #[error("Invalid url: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Missing arg: {0}")]
    MissingArg(String),

    #[error("No source returned usable evidence")]
    NoEvidence,

    #[error("Report synthesis failed: {0}")]
    SynthesisFailed(#[source] agent::Error),

    #[error("Research run cancelled")]
    Cancelled,

    #[error("Http client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}
