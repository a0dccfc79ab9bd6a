use crate::activity::{ActivityEvent, ActivityPhase, ActivityReporter, NoopReporter};
use crate::fetch::FetcherRegistry;
use crate::knowledge::{KnowledgeRetriever, passages_to_content};
use crate::ledger::{EvidenceLedger, Settlement, SourceKind, SourceRecord};
use crate::report::ResearchReport;
use crate::synth::ReportSynthesizer;
use crate::target::ResearchTarget;
use crate::validate::CitationValidator;
use crate::{Error, Result};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Budget for each individual fetch or retrieval.
    pub per_source_timeout: Duration,
    /// Budget for the whole fetch phase.
    pub overall_timeout: Duration,
    /// Verified claims an opportunity needs to survive validation.
    pub min_evidence: usize,
    /// Passages requested from the knowledge base.
    pub top_k: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            per_source_timeout: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(90),
            min_evidence: 1,
            top_k: 3,
        }
    }
}

/// Fans out fetches for a target, then synthesizes and validates a report
/// from whatever evidence came back.
///
/// An orchestrator holds no per-run state; concurrent runs each get their
/// own ledger.
pub struct Orchestrator {
    fetchers: FetcherRegistry,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    synthesizer: Arc<dyn ReportSynthesizer>,
    reporter: Arc<dyn ActivityReporter>,
    config: RunConfig,
}

impl Orchestrator {
    pub async fn run(
        &self,
        target: ResearchTarget,
        knowledge_query: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResearchReport> {
        let mut ledger = EvidenceLedger::new();
        self.gather(&target, knowledge_query, &mut ledger, cancel)
            .await?;
        ledger.seal();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if ledger.success_count() == 0 {
            tracing::warn!(sources = ledger.len(), "no source succeeded, skipping synthesis");
            return Err(Error::NoEvidence);
        }

        let evidence: Vec<SourceRecord> = ledger.successful().cloned().collect();
        self.publish(ActivityEvent::new(
            ActivityPhase::SynthesisStarted,
            None,
            format!("synthesizing report from {} source(s)", evidence.len()),
        ));

        let candidate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            res = self.synthesizer.synthesize(&target, &evidence) => {
                res.map_err(Error::SynthesisFailed)?
            }
        };

        let (report, summary) =
            CitationValidator::new(self.config.min_evidence).review(candidate, &ledger);

        tracing::info!(
            claims_removed = summary.claims_removed,
            citations_removed = summary.citations_removed,
            opportunities_removed = summary.opportunities_removed,
            quality = ?report.data_quality,
            "report validated"
        );
        self.publish(ActivityEvent::new(
            ActivityPhase::ValidationCompleted,
            None,
            format!(
                "{} claim(s) and {} opportunity(ies) kept, {} claim(s) removed, data quality {:?}",
                report.claims().count(),
                report.opportunities.len(),
                summary.claims_removed,
                report.data_quality
            ),
        ));

        Ok(report)
    }

    /// Runs the fetch phase. Returns once every task settled or the overall
    /// deadline passed; fails only on cancellation.
    async fn gather(
        &self,
        target: &ResearchTarget,
        knowledge_query: Option<&str>,
        ledger: &mut EvidenceLedger,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let deadline = Instant::now() + self.config.overall_timeout;
        let timeout = self.config.per_source_timeout;
        let mut tasks: JoinSet<(String, Settlement)> = JoinSet::new();
        let mut task_sources = HashMap::new();

        for (url, kind) in target.sources() {
            let id = url.as_str().to_string();
            if !self.dispatch(ledger, &id, kind) {
                continue;
            }

            let fetcher = self.fetchers.for_kind(kind);
            let handle = tasks.spawn(async move {
                let settlement = match tokio::time::timeout(timeout, fetcher.fetch(&id, timeout)).await {
                    Ok(result) => result.into(),
                    Err(_) => Settlement::TimedOut(format!("no response within {:?}", timeout)),
                };
                (id, settlement)
            });
            task_sources.insert(handle.id(), url.as_str().to_string());
        }

        if let Some(query) = knowledge_query {
            match self.retriever.clone() {
                None => {
                    tracing::warn!(query, "knowledge query given but no knowledge base configured");
                }
                Some(retriever) => {
                    if self.dispatch(ledger, query, SourceKind::KnowledgeBase) {
                        let id = query.to_string();
                        let top_k = self.config.top_k;
                        let handle = tasks.spawn(async move {
                            let retrieval =
                                tokio::time::timeout(timeout, retriever.retrieve(&id, top_k));
                            let settlement = match retrieval.await {
                                Ok(Ok(passages)) if passages.is_empty() => {
                                    Settlement::Failed("no relevant passages".to_string())
                                }
                                Ok(Ok(passages)) => {
                                    Settlement::Success(passages_to_content(&passages))
                                }
                                Ok(Err(err)) => Settlement::Failed(err.to_string()),
                                Err(_) => Settlement::TimedOut(format!(
                                    "no response within {:?}",
                                    timeout
                                )),
                            };
                            (id, settlement)
                        });
                        task_sources.insert(handle.id(), query.to_string());
                    }
                }
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    tracing::info!("research run cancelled during fetch phase");
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tasks.abort_all();
                    for id in ledger.pending_ids() {
                        self.settle(
                            ledger,
                            &id,
                            Settlement::TimedOut(format!(
                                "abandoned when the {:?} fetch budget ran out",
                                self.config.overall_timeout
                            )),
                        );
                    }
                    return Ok(());
                }
                joined = tasks.join_next_with_id() => match joined {
                    None => return Ok(()),
                    Some(Ok((_, (id, settlement)))) => self.settle(ledger, &id, settlement),
                    Some(Err(err)) => {
                        if let Some(id) = task_sources.get(&err.id()) {
                            self.settle(ledger, id, Settlement::Failed(format!("fetch task failed: {}", err)));
                        }
                    }
                },
            }
        }
    }

    fn dispatch(&self, ledger: &mut EvidenceLedger, source_id: &str, kind: SourceKind) -> bool {
        if !ledger.dispatch(source_id, kind) {
            tracing::debug!(source_id, "source already dispatched");
            return false;
        }
        self.publish(ActivityEvent::new(
            ActivityPhase::FetchStarted,
            Some(source_id),
            format!("fetching {} source", kind),
        ));
        true
    }

    fn settle(&self, ledger: &mut EvidenceLedger, source_id: &str, settlement: Settlement) {
        let event = match &settlement {
            Settlement::Success(content) => {
                tracing::info!(source_id, chars = content.len(), "fetch succeeded");
                ActivityEvent::new(
                    ActivityPhase::FetchCompleted,
                    Some(source_id),
                    format!("fetched {} chars", content.chars().count()),
                )
            }
            Settlement::Failed(err) => {
                tracing::warn!(source_id, error = %err, "fetch failed");
                ActivityEvent::new(ActivityPhase::FetchFailed, Some(source_id), err.clone())
            }
            Settlement::TimedOut(err) => {
                tracing::warn!(source_id, error = %err, "fetch timed out");
                ActivityEvent::new(ActivityPhase::FetchFailed, Some(source_id), err.clone())
            }
        };

        if ledger.settle(source_id, settlement) {
            self.publish(event);
        }
    }

    /// Reporter panics are contained here so they cannot fail a run.
    fn publish(&self, event: ActivityEvent) {
        let reporter = &self.reporter;
        if std::panic::catch_unwind(AssertUnwindSafe(|| reporter.emit(event))).is_err() {
            tracing::warn!("activity reporter panicked, event dropped");
        }
    }
}

pub struct OrchestratorBuilder {
    fetchers: Option<FetcherRegistry>,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    synthesizer: Option<Arc<dyn ReportSynthesizer>>,
    reporter: Arc<dyn ActivityReporter>,
    config: RunConfig,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            fetchers: None,
            retriever: None,
            synthesizer: None,
            reporter: Arc::new(NoopReporter),
            config: RunConfig::default(),
        }
    }

    pub fn fetchers(mut self, fetchers: FetcherRegistry) -> Self {
        self.fetchers = Some(fetchers);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn ReportSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ActivityReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        Ok(Orchestrator {
            fetchers: self
                .fetchers
                .ok_or(Error::MissingArg("fetchers are required for orchestrator".to_string()))?,
            retriever: self.retriever,
            synthesizer: self.synthesizer.ok_or(Error::MissingArg(
                "synthesizer is required for orchestrator".to_string(),
            ))?,
            reporter: self.reporter,
            config: self.config,
        })
    }
}
