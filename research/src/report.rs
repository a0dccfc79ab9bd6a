use crate::target::ResearchTarget;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;

/// An atomic factual statement and the sources backing it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub cited_source_ids: BTreeSet<String>,
    pub excerpt: Option<String>,
}

impl Claim {
    pub fn new<S: Into<String>>(text: &str, sources: impl IntoIterator<Item = S>) -> Self {
        Self {
            text: text.to_string(),
            cited_source_ids: sources.into_iter().map(Into::into).collect(),
            excerpt: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: &str) -> Self {
        self.excerpt = Some(excerpt.to_string());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub area: String,
    pub description: String,
    pub rationale: String,
    pub complexity: Complexity,
    pub evidence: Vec<Claim>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    High,
    Medium,
    Low,
}

/// Counts derived from the ledger and the validated report, never taken
/// from the synthesizer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchQuality {
    pub sources_dispatched: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub evidence_pieces: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResearchReport {
    pub target: ResearchTarget,
    pub company_name: String,
    pub industry: String,
    pub overview: Vec<Claim>,
    pub products_services: Vec<String>,
    pub opportunities: Vec<Opportunity>,
    pub sources: Vec<String>,
    pub data_quality: DataQuality,
    pub quality: ResearchQuality,
    pub notes: Option<String>,
}

impl ResearchReport {
    /// An empty candidate report; synthesizers fill in the rest.
    pub fn new(target: ResearchTarget, company_name: &str, industry: &str) -> Self {
        Self {
            target,
            company_name: company_name.to_string(),
            industry: industry.to_string(),
            overview: Vec::new(),
            products_services: Vec::new(),
            opportunities: Vec::new(),
            sources: Vec::new(),
            data_quality: DataQuality::Low,
            quality: ResearchQuality::default(),
            notes: None,
        }
    }

    /// All claims, overview first, then each opportunity's evidence.
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.overview
            .iter()
            .chain(self.opportunities.iter().flat_map(|o| o.evidence.iter()))
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.write_markdown(&mut out);
        out
    }

    fn write_markdown(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "# {}", self.company_name)?;
        writeln!(out)?;
        writeln!(out, "**Industry:** {}  ", self.industry)?;
        writeln!(out, "**Website:** {}  ", self.target.primary())?;
        writeln!(out, "**Data quality:** {:?}", self.data_quality)?;
        writeln!(out)?;

        writeln!(out, "## Overview")?;
        writeln!(out)?;
        if self.overview.is_empty() {
            writeln!(out, "_No verified overview claims._")?;
        }
        for claim in &self.overview {
            write_claim(out, claim)?;
        }
        writeln!(out)?;

        if !self.products_services.is_empty() {
            writeln!(out, "## Products and services")?;
            writeln!(out)?;
            for product in &self.products_services {
                writeln!(out, "- {}", product)?;
            }
            writeln!(out)?;
        }

        writeln!(out, "## Opportunities")?;
        writeln!(out)?;
        if self.opportunities.is_empty() {
            writeln!(out, "_No opportunities survived citation checks._")?;
        }
        for (i, opp) in self.opportunities.iter().enumerate() {
            writeln!(
                out,
                "### {}. {}: {} ({:?} complexity)",
                i + 1,
                opp.area,
                opp.description,
                opp.complexity
            )?;
            writeln!(out)?;
            writeln!(out, "{}", opp.rationale)?;
            writeln!(out)?;
            for claim in &opp.evidence {
                write_claim(out, claim)?;
            }
            writeln!(out)?;
        }

        writeln!(out, "## Sources")?;
        writeln!(out)?;
        for source in &self.sources {
            writeln!(out, "- {}", source)?;
        }
        writeln!(out)?;

        writeln!(out, "## Research quality")?;
        writeln!(out)?;
        writeln!(
            out,
            "{} sources dispatched, {} succeeded, {} failed, {} evidence pieces",
            self.quality.sources_dispatched,
            self.quality.sources_succeeded,
            self.quality.sources_failed,
            self.quality.evidence_pieces
        )?;

        if let Some(notes) = &self.notes {
            writeln!(out)?;
            writeln!(out, "## Notes")?;
            writeln!(out)?;
            for line in notes.lines() {
                writeln!(out, "- {}", line)?;
            }
        }
        Ok(())
    }
}

fn write_claim(out: &mut String, claim: &Claim) -> std::fmt::Result {
    let cites = claim
        .cited_source_ids
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "- {} [{}]", claim.text, cites)?;
    if let Some(excerpt) = &claim.excerpt {
        writeln!(out, "  > {}", excerpt)?;
    }
    Ok(())
}
