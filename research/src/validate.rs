//! Citation enforcement for candidate reports.
//!
//! A citation survives only if it names a successful ledger source whose
//! content contains the claim's excerpt (when one is given). Claims left
//! without citations are removed, as are opportunities left with too
//! little evidence. Validation is deterministic for a given ledger and
//! applying it to its own output changes nothing.

use crate::ledger::{EvidenceLedger, SourceStatus};
use crate::report::{Claim, DataQuality, ResearchQuality, ResearchReport};
use std::collections::HashSet;

/// What a validation pass removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub citations_removed: usize,
    pub claims_removed: usize,
    pub opportunities_removed: usize,
}

impl ValidationSummary {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

pub struct CitationValidator {
    min_evidence: usize,
}

impl Default for CitationValidator {
    fn default() -> Self {
        Self { min_evidence: 1 }
    }
}

impl CitationValidator {
    /// `min_evidence` is the number of verified claims an opportunity
    /// needs to stay in the report.
    pub fn new(min_evidence: usize) -> Self {
        Self { min_evidence }
    }

    pub fn validate(&self, report: ResearchReport, ledger: &EvidenceLedger) -> ResearchReport {
        self.review(report, ledger).0
    }

    pub fn review(
        &self,
        mut report: ResearchReport,
        ledger: &EvidenceLedger,
    ) -> (ResearchReport, ValidationSummary) {
        let mut summary = ValidationSummary::default();

        report.overview = verify_claims(report.overview, ledger, &mut summary);

        let before = report.opportunities.len();
        report.opportunities = report
            .opportunities
            .into_iter()
            .filter_map(|mut opp| {
                opp.evidence = verify_claims(opp.evidence, ledger, &mut summary);
                (opp.evidence.len() >= self.min_evidence).then_some(opp)
            })
            .collect();
        summary.opportunities_removed = before - report.opportunities.len();

        let cited: HashSet<String> = report
            .claims()
            .flat_map(|c| c.cited_source_ids.iter().cloned())
            .collect();
        report.sources = ledger
            .iter()
            .filter(|r| cited.contains(&r.source_id))
            .map(|r| r.source_id.clone())
            .collect();

        report.data_quality = data_quality(report.sources.len(), report.opportunities.len());

        let succeeded = ledger.success_count();
        report.quality = ResearchQuality {
            sources_dispatched: ledger.len(),
            sources_succeeded: succeeded,
            sources_failed: ledger.len() - succeeded,
            evidence_pieces: report.claims().count(),
        };

        annotate(&mut report, ledger, &summary);

        (report, summary)
    }
}

/// `high` needs three verified sources and two opportunities, `medium` one
/// of each.
pub fn data_quality(verified_sources: usize, opportunities: usize) -> DataQuality {
    if verified_sources >= 3 && opportunities >= 2 {
        DataQuality::High
    } else if verified_sources >= 1 && opportunities >= 1 {
        DataQuality::Medium
    } else {
        DataQuality::Low
    }
}

fn verify_claims(
    claims: Vec<Claim>,
    ledger: &EvidenceLedger,
    summary: &mut ValidationSummary,
) -> Vec<Claim> {
    claims
        .into_iter()
        .filter_map(|mut claim| {
            let excerpt = claim.excerpt.as_deref().map(normalize).filter(|e| !e.is_empty());

            let before = claim.cited_source_ids.len();
            claim
                .cited_source_ids
                .retain(|id| supports(ledger, id, excerpt.as_deref()));
            summary.citations_removed += before - claim.cited_source_ids.len();

            if claim.cited_source_ids.is_empty() {
                tracing::debug!(claim = %claim.text, "dropping unsupported claim");
                summary.claims_removed += 1;
                None
            } else {
                Some(claim)
            }
        })
        .collect()
}

/// Failed and timed-out sources never support anything, even if the
/// synthesizer somehow names them.
fn supports(ledger: &EvidenceLedger, source_id: &str, excerpt: Option<&str>) -> bool {
    let Some(record) = ledger.get(source_id) else {
        return false;
    };
    if !record.is_success() {
        return false;
    }
    match excerpt {
        Some(excerpt) => normalize(&record.raw_content).contains(excerpt),
        None => true,
    }
}

/// Case-folds, unifies typographic quotes and collapses whitespace so that
/// reflowed quotes still match.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .map(|c| match c {
                    '‘' | '’' => '\'',
                    '“' | '”' => '"',
                    c => c,
                })
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn annotate(report: &mut ResearchReport, ledger: &EvidenceLedger, summary: &ValidationSummary) {
    let mut lines: Vec<String> = ledger
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| {
            let reason = match (&r.status, &r.error) {
                (_, Some(err)) => err.clone(),
                (SourceStatus::Pending, None) => "never settled".to_string(),
                (SourceStatus::TimedOut, None) => "timed out".to_string(),
                (_, None) => "failed".to_string(),
            };
            format!("Could not use {} source {}: {}", r.kind, r.source_id, reason)
        })
        .collect();

    if !summary.is_clean() {
        lines.push(format!(
            "Citation check removed {} citation(s), {} claim(s) and {} opportunity(ies) without verifiable support",
            summary.citations_removed, summary.claims_removed, summary.opportunities_removed
        ));
    }

    for line in lines {
        let present = report
            .notes
            .as_deref()
            .is_some_and(|notes| notes.lines().any(|l| l == line));
        if present {
            continue;
        }
        match &mut report.notes {
            Some(notes) => {
                notes.push('\n');
                notes.push_str(&line);
            }
            None => report.notes = Some(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Settlement, SourceKind};
    use crate::report::{Complexity, Opportunity};
    use crate::target::ResearchTarget;

    const SITE: &str = "https://acme.sg/";
    const IG: &str = "https://www.instagram.com/acme";
    const FB: &str = "https://www.facebook.com/acme";

    fn ledger(entries: &[(&str, Settlement)]) -> EvidenceLedger {
        let mut ledger = EvidenceLedger::new();
        for (id, settlement) in entries {
            ledger.dispatch(id, SourceKind::PrimarySite);
            ledger.settle(id, settlement.clone());
        }
        ledger.seal();
        ledger
    }

    fn ok(content: &str) -> Settlement {
        Settlement::Success(content.to_string())
    }

    fn report() -> ResearchReport {
        let target = ResearchTarget::new(SITE, [IG, FB]).unwrap();
        ResearchReport::new(target, "Acme Logistics", "Logistics")
    }

    fn opportunity(evidence: Vec<Claim>) -> Opportunity {
        Opportunity {
            area: "Customer Service".to_string(),
            description: "Tracking chatbot".to_string(),
            rationale: "Frequent status questions".to_string(),
            complexity: Complexity::Low,
            evidence,
        }
    }

    #[test]
    fn test_single_source_claim_kept() {
        let ledger = ledger(&[(SITE, ok("Founded 2009. We have 50 employees and 12 vans."))]);
        let mut report = report();
        report
            .overview
            .push(Claim::new("Company has ~50 employees", [SITE]).with_excerpt("50 employees"));
        report.opportunities.push(opportunity(vec![
            Claim::new("Runs a van fleet", [SITE]).with_excerpt("12 vans"),
        ]));

        let report = CitationValidator::default().validate(report, &ledger);

        assert_eq!(report.overview.len(), 1);
        assert_eq!(report.sources, vec![SITE.to_string()]);
        assert_eq!(report.data_quality, DataQuality::Medium);
        assert_eq!(report.notes, None);
        assert_eq!(
            report.quality,
            ResearchQuality {
                sources_dispatched: 1,
                sources_succeeded: 1,
                sources_failed: 0,
                evidence_pieces: 2,
            }
        );
    }

    #[test]
    fn test_failed_source_citation_stripped() {
        let ledger = ledger(&[
            (SITE, Settlement::Failed("http status 503".to_string())),
            (IG, ok("Daily posts about same-day delivery")),
            (FB, ok("Acme offers Same-Day   Delivery island-wide")),
        ]);
        let mut report = report();
        report
            .overview
            .push(Claim::new("Offers same-day delivery", [SITE, IG, FB]).with_excerpt("same-day delivery"));

        let (report, summary) = CitationValidator::default().review(report, &ledger);

        let cited: Vec<_> = report.overview[0].cited_source_ids.iter().cloned().collect();
        assert_eq!(cited, vec![FB.to_string(), IG.to_string()]);
        assert_eq!(report.sources, vec![IG.to_string(), FB.to_string()]);
        assert_eq!(summary.citations_removed, 1);
        assert_eq!(summary.claims_removed, 0);
        assert_eq!(report.quality.sources_failed, 1);

        let notes = report.notes.unwrap();
        assert!(notes.contains("Could not use website source https://acme.sg/: http status 503"));
        assert!(notes.contains("removed 1 citation(s), 0 claim(s)"));
    }

    #[test]
    fn test_orphan_and_unquoted_claims_removed() {
        let ledger = ledger(&[(SITE, ok("We deliver across Singapore."))]);
        let mut report = report();
        report.overview = vec![
            Claim::new("Delivers in Singapore", [SITE]).with_excerpt("deliver across Singapore"),
            Claim::new("Has 200 staff", [SITE]).with_excerpt("200 staff"),
            Claim::new("Featured in the news", ["https://news.example.com/acme"]),
            Claim::new("Uncited", Vec::<String>::new()),
        ];

        let (report, summary) = CitationValidator::default().review(report, &ledger);

        let texts: Vec<_> = report.overview.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Delivers in Singapore"]);
        assert_eq!(summary.claims_removed, 3);
        assert_eq!(report.data_quality, DataQuality::Low);
    }

    #[test]
    fn test_opportunity_evidence_threshold() {
        let ledger = ledger(&[(SITE, ok("Same-day delivery. Real-time tracking for every parcel."))]);
        let build = || {
            let mut report = report();
            report.opportunities.push(opportunity(vec![
                Claim::new("Offers tracking", [SITE]).with_excerpt("real-time tracking"),
                Claim::new("Has a call centre", [SITE]).with_excerpt("call centre"),
            ]));
            report
        };

        let kept = CitationValidator::new(1).validate(build(), &ledger);
        assert_eq!(kept.opportunities.len(), 1);
        assert_eq!(kept.opportunities[0].evidence.len(), 1);

        let (dropped, summary) = CitationValidator::new(2).review(build(), &ledger);
        assert!(dropped.opportunities.is_empty());
        assert_eq!(summary.opportunities_removed, 1);
        assert!(dropped.sources.is_empty());
    }

    #[test]
    fn test_high_quality_needs_three_sources_and_two_opportunities() {
        let ledger = ledger(&[(SITE, ok("chatbot")), (IG, ok("reels")), (FB, ok("reviews"))]);
        let mut report = report();
        report.opportunities = vec![
            opportunity(vec![Claim::new("a", [SITE]), Claim::new("b", [IG])]),
            opportunity(vec![Claim::new("c", [FB])]),
        ];

        let report = CitationValidator::default().validate(report, &ledger);
        assert_eq!(report.data_quality, DataQuality::High);

        assert_eq!(data_quality(3, 1), DataQuality::Medium);
        assert_eq!(data_quality(2, 4), DataQuality::Medium);
        assert_eq!(data_quality(5, 0), DataQuality::Low);
    }

    #[test]
    fn test_validate_is_idempotent() {
        let ledger = ledger(&[
            (SITE, ok("We have 50 employees and a “premium” tier.")),
            (IG, Settlement::TimedOut("no response within 30s".to_string())),
        ]);
        let mut report = report();
        report.notes = Some("Instagram looked sparse".to_string());
        report.overview = vec![
            Claim::new("Has 50 employees", [SITE, IG]).with_excerpt("50  EMPLOYEES"),
            Claim::new("Has a premium tier", [SITE]).with_excerpt("\"premium\" tier"),
            Claim::new("Invented", [FB]),
        ];
        report.opportunities = vec![opportunity(vec![Claim::new("Invented too", [IG])])];

        let validator = CitationValidator::default();
        let once = validator.validate(report, &ledger);
        let (twice, summary) = validator.review(once.clone(), &ledger);

        assert!(summary.is_clean());
        assert_eq!(twice.overview, once.overview);
        assert_eq!(twice.opportunities, once.opportunities);
        assert_eq!(twice.sources, once.sources);
        assert_eq!(twice.data_quality, once.data_quality);
        assert_eq!(twice.quality, once.quality);
        assert_eq!(twice.notes, once.notes);
        assert_eq!(once.overview.len(), 2);
        assert!(once.notes.unwrap().starts_with("Instagram looked sparse\nCould not use"));
    }
}
