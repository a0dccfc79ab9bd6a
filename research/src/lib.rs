pub mod activity;
mod error;
pub mod fetch;
pub mod knowledge;
pub mod ledger;
mod orchestrator;
pub mod report;
pub mod synth;
pub mod target;
pub mod validate;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunConfig};
pub use report::ResearchReport;
pub use target::ResearchTarget;
