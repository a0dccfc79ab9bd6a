use crate::ledger::SourceRecord;
use crate::report::{Claim, Complexity, Opportunity, ResearchReport};
use crate::target::ResearchTarget;
use agent::llm::{LLM, Message};
use agent::tools::{FunctionalTool, ToolCall, ToolDefinition};
use agent::{AgentBuilder, Error, Result, StopCondition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write;
use std::sync::{Arc, Mutex};

/// Turns collected evidence into a candidate report. Nothing about the
/// output is trusted; the citation validator checks it afterwards.
#[async_trait]
pub trait ReportSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        target: &ResearchTarget,
        evidence: &[SourceRecord],
    ) -> Result<ResearchReport>;
}

const SYSTEM_PROMPT: &str = include_str!("prompts/synthesizer.md");
const SUBMIT_REPORT: &str = "submit_report";
const MAX_SOURCE_CHARS: usize = 6_000;

#[derive(Debug, Deserialize, JsonSchema)]
struct ClaimDraft {
    /// The factual statement.
    text: String,
    /// Source ids supporting the statement, copied exactly.
    sources: Vec<String>,
    /// Short verbatim quote from one of the cited sources.
    #[serde(default)]
    excerpt: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct OpportunityDraft {
    /// Business area, e.g. "Customer Service".
    area: String,
    /// The specific AI application.
    description: String,
    /// Why it fits this business.
    rationale: String,
    complexity: Complexity,
    evidence: Vec<ClaimDraft>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReportDraft {
    company_name: String,
    industry: String,
    /// What the company does, size indicators, market position.
    overview: Vec<ClaimDraft>,
    #[serde(default)]
    products_services: Vec<String>,
    opportunities: Vec<OpportunityDraft>,
    #[serde(default)]
    notes: Option<String>,
}

impl From<ClaimDraft> for Claim {
    fn from(draft: ClaimDraft) -> Self {
        Claim {
            text: draft.text,
            cited_source_ids: draft.sources.into_iter().collect(),
            excerpt: draft.excerpt.filter(|e| !e.trim().is_empty()),
        }
    }
}

impl ReportDraft {
    fn into_report(self, target: ResearchTarget) -> ResearchReport {
        let mut report = ResearchReport::new(target, &self.company_name, &self.industry);
        report.overview = self.overview.into_iter().map(Claim::from).collect();
        report.products_services = self.products_services;
        report.opportunities = self
            .opportunities
            .into_iter()
            .map(|o| Opportunity {
                area: o.area,
                description: o.description,
                rationale: o.rationale,
                complexity: o.complexity,
                evidence: o.evidence.into_iter().map(Claim::from).collect(),
            })
            .collect();
        report.notes = self.notes.filter(|n| !n.trim().is_empty());
        report
    }
}

type DraftSlot = Arc<Mutex<Option<ReportDraft>>>;

struct SubmitReport(DraftSlot);

#[async_trait]
impl FunctionalTool for SubmitReport {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<ReportDraft>(
            SUBMIT_REPORT,
            "submit the finished research report; every claim must cite source ids from the evidence",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let draft: ReportDraft = match call.args() {
            Ok(draft) => draft,
            Err(err) => {
                tracing::debug!(error = %err, "rejected malformed report draft");
                return Ok(call.reply(format!(
                    "the report could not be parsed ({}), fix it and call {} again",
                    err, SUBMIT_REPORT
                )));
            }
        };

        let mut slot = self
            .0
            .lock()
            .map_err(|_| Error::AgentWorkflowError("report slot poisoned".to_string()))?;
        *slot = Some(draft);
        Ok(call.reply("report received"))
    }
}

struct ReportSubmitted(DraftSlot);

impl StopCondition for ReportSubmitted {
    fn done(&self, _: &[Message]) -> bool {
        self.0.lock().map(|slot| slot.is_some()).unwrap_or(true)
    }
}

/// Synthesizer backed by a tool-calling language model.
pub struct LlmSynthesizer {
    llm: Arc<dyn LLM + Send + Sync>,
    max_steps: usize,
}

impl LlmSynthesizer {
    pub fn new(llm: Arc<dyn LLM + Send + Sync>) -> Self {
        Self { llm, max_steps: 4 }
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

fn evidence_prompt(target: &ResearchTarget, evidence: &[SourceRecord]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Company website: {}", target.primary());
    for url in target.secondary() {
        let _ = writeln!(prompt, "Other page: {}", url);
    }
    let _ = writeln!(prompt, "\n# Evidence\n");

    for record in evidence {
        let content: String = record.raw_content.chars().take(MAX_SOURCE_CHARS).collect();
        let _ = writeln!(
            prompt,
            "## Source id: {}\nKind: {}\n\n{}\n",
            record.source_id, record.kind, content
        );
    }
    prompt
}

#[async_trait]
impl ReportSynthesizer for LlmSynthesizer {
    async fn synthesize(
        &self,
        target: &ResearchTarget,
        evidence: &[SourceRecord],
    ) -> Result<ResearchReport> {
        let slot: DraftSlot = Arc::new(Mutex::new(None));

        let mut agent = AgentBuilder::new()
            .llm(self.llm.clone())
            .tool(Box::new(SubmitReport(slot.clone())))
            .stop_condition(Box::new(ReportSubmitted(slot.clone())))
            .max_steps(self.max_steps)
            .build()?;

        agent
            .run(vec![
                Message::System(SYSTEM_PROMPT.to_string()),
                Message::User(evidence_prompt(target, evidence)),
            ])
            .await?;

        let draft = slot
            .lock()
            .map_err(|_| Error::AgentWorkflowError("report slot poisoned".to_string()))?
            .take()
            .ok_or(Error::AgentWorkflowError(
                "agent finished without submitting a report".to_string(),
            ))?;

        Ok(draft.into_report(target.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{SourceKind, SourceStatus};
    use agent::llm::{CompletionRequest, CompletionResponse};

    const VALID: &str = r#"{
        "company_name": "Acme Logistics",
        "industry": "Logistics",
        "overview": [{"text": "Has about 50 employees", "sources": ["https://acme.sg/"], "excerpt": "50 employees"}],
        "products_services": ["Same-day delivery"],
        "opportunities": [{
            "area": "Customer Service",
            "description": "Tracking chatbot",
            "rationale": "Customers ask for delivery status",
            "complexity": "low",
            "evidence": [{"text": "Offers same-day delivery", "sources": ["https://acme.sg/"], "excerpt": ""}]
        }]
    }"#;

    /// Submits a malformed report first, then a valid one.
    struct ScriptedLLM;

    #[async_trait]
    impl LLM for ScriptedLLM {
        async fn completion<'a>(
            &self,
            request: CompletionRequest<'a>,
        ) -> Result<CompletionResponse> {
            assert_eq!(request.tools.len(), 1);
            assert!(matches!(&request.messages[1], Message::User(p) if p.contains("## Source id: https://acme.sg/")));

            let args = match request.messages.last() {
                Some(Message::User(_)) => "{\"company_name\": 3}",
                _ => VALID,
            };
            Ok(CompletionResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: format!("call{}", request.messages.len()),
                    name: SUBMIT_REPORT.to_string(),
                    args: args.to_string(),
                }],
            })
        }
    }

    struct SilentLLM;

    #[async_trait]
    impl LLM for SilentLLM {
        async fn completion<'a>(&self, _: CompletionRequest<'a>) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                content: "here is the report in prose".to_string(),
                tool_calls: vec![],
            })
        }
    }

    fn evidence() -> Vec<SourceRecord> {
        vec![SourceRecord {
            source_id: "https://acme.sg/".to_string(),
            kind: SourceKind::PrimarySite,
            status: SourceStatus::Success,
            raw_content: "Acme Logistics has 50 employees.".to_string(),
            fetched_at: chrono::Utc::now(),
            error: None,
        }]
    }

    #[tokio::test]
    async fn test_synthesize_retries_malformed_draft() -> Result<()> {
        let target = ResearchTarget::new("https://acme.sg", []).unwrap();
        let report = LlmSynthesizer::new(Arc::new(ScriptedLLM))
            .synthesize(&target, &evidence())
            .await?;

        assert_eq!(report.company_name, "Acme Logistics");
        assert_eq!(report.overview[0].excerpt.as_deref(), Some("50 employees"));
        assert!(report.overview[0].cited_source_ids.contains("https://acme.sg/"));
        assert_eq!(report.opportunities[0].complexity, Complexity::Low);
        // blank excerpts are dropped
        assert_eq!(report.opportunities[0].evidence[0].excerpt, None);
        assert_eq!(report.notes, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_synthesize_gives_up_after_max_steps() {
        let target = ResearchTarget::new("https://acme.sg", []).unwrap();
        let res = LlmSynthesizer::new(Arc::new(SilentLLM))
            .max_steps(2)
            .synthesize(&target, &evidence())
            .await;
        assert!(matches!(res, Err(Error::StepLimitExceeded(2))));
    }
}
