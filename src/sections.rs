//! Contract-section segmentation.
//!
//! Splits a cleaned contract into labelled sections by scanning for known
//! headings. One case-insensitive, word-bounded regex finds every heading
//! occurrence; a section's body runs from its first heading to whichever
//! recognised heading comes next. Terminal headings (support, signature,
//! termination) only end sections.
//!
//! A heading word counts only when a separator (`:`, `-`, `–`) follows it,
//! or when it is capitalised and opens the text or a sentence. "Payable on
//! signature." is body text, "Signature: ____" is a heading.
//!
//! Headings not listed in [`SectionKind::aliases`] are not recognised, so
//! text under an unexpected synonym ends up in the preceding section.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A contract section that is extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    ProjectOverview,
    Timeline,
    Deliverables,
    TechnicalNotes,
    PaymentTerms,
}

impl SectionKind {
    /// Every section, in presentation order.
    pub const ALL: [SectionKind; 5] = [
        SectionKind::ProjectOverview,
        SectionKind::Timeline,
        SectionKind::Deliverables,
        SectionKind::TechnicalNotes,
        SectionKind::PaymentTerms,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::ProjectOverview => "project_overview",
            SectionKind::Timeline => "timeline",
            SectionKind::Deliverables => "deliverables",
            SectionKind::TechnicalNotes => "technical_notes",
            SectionKind::PaymentTerms => "payment_terms",
        }
    }

    /// Headings that open this section (lower case).
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            SectionKind::ProjectOverview => &["project overview", "scope of services"],
            SectionKind::Timeline => &["timeline", "deployment plan", "implementation schedule"],
            SectionKind::Deliverables => &["deliverables", "scope of work", "key outputs"],
            SectionKind::TechnicalNotes => &["technical infrastructure", "technical notes"],
            SectionKind::PaymentTerms => &["payment terms"],
        }
    }

    fn from_heading(heading: &str) -> Option<Self> {
        let lower = heading.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.aliases().contains(&lower.as_str()))
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Headings that end the preceding section but are not extracted.
pub const TERMINAL_HEADINGS: &[&str] = &["support agreement", "support", "signature", "termination"];

static RE_HEADING: Lazy<Regex> = Lazy::new(|| {
    let mut headings: Vec<&str> = SectionKind::ALL
        .iter()
        .flat_map(|kind| kind.aliases().iter().copied())
        .chain(TERMINAL_HEADINGS.iter().copied())
        .collect();
    // Longest first so "support agreement" wins over "support".
    headings.sort_by_key(|h| std::cmp::Reverse(h.len()));
    let alternation = headings
        .iter()
        .map(|h| regex::escape(h))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b({alternation})\b(\s*[:\-–](?:\s|$))?")).unwrap()
});

/// Characters allowed between a heading and its body.
const HEADING_SEPARATORS: &[char] = &[':', '-', '–'];

/// Sections found in a contract. `None` means the heading never appears
/// or its body is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSections {
    pub project_overview: Option<String>,
    pub timeline: Option<String>,
    pub deliverables: Option<String>,
    pub technical_notes: Option<String>,
    pub payment_terms: Option<String>,
}

impl ContractSections {
    pub fn get(&self, kind: SectionKind) -> Option<&str> {
        match kind {
            SectionKind::ProjectOverview => self.project_overview.as_deref(),
            SectionKind::Timeline => self.timeline.as_deref(),
            SectionKind::Deliverables => self.deliverables.as_deref(),
            SectionKind::TechnicalNotes => self.technical_notes.as_deref(),
            SectionKind::PaymentTerms => self.payment_terms.as_deref(),
        }
    }

    fn slot(&mut self, kind: SectionKind) -> &mut Option<String> {
        match kind {
            SectionKind::ProjectOverview => &mut self.project_overview,
            SectionKind::Timeline => &mut self.timeline,
            SectionKind::Deliverables => &mut self.deliverables,
            SectionKind::TechnicalNotes => &mut self.technical_notes,
            SectionKind::PaymentTerms => &mut self.payment_terms,
        }
    }

    /// Sections in presentation order.
    pub fn iter(&self) -> impl Iterator<Item = (SectionKind, Option<&str>)> + '_ {
        SectionKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, body)| body.is_none())
    }
}

/// Collapse line breaks, non-breaking spaces and whitespace runs into single spaces.
pub fn clean_contract_text(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split cleaned contract text into sections.
pub fn segment_contract(text: &str) -> ContractSections {
    let headings: Vec<(usize, usize, Option<SectionKind>)> = RE_HEADING
        .captures_iter(text)
        .filter_map(|caps| {
            let (whole, name) = (caps.get(0)?, caps.get(1)?);
            let separated = caps.get(2).is_some();
            (separated || opens_sentence(&text[..whole.start()], name.as_str()))
                .then(|| (whole.start(), whole.end(), SectionKind::from_heading(name.as_str())))
        })
        .collect();

    let mut sections = ContractSections::default();
    for (i, &(_, end, kind)) in headings.iter().enumerate() {
        let Some(kind) = kind else { continue };
        let slot = sections.slot(kind);
        if slot.is_some() {
            continue;
        }
        let body_end = headings.get(i + 1).map_or(text.len(), |&(start, _, _)| start);
        let body = text[end..body_end]
            .trim_start()
            .trim_start_matches(HEADING_SEPARATORS)
            .trim();
        if !body.is_empty() {
            *slot = Some(body.to_string());
        }
    }

    // Payment terms must never carry the technical section along.
    if let Some(terms) = sections.payment_terms.take() {
        let clipped = clip_before(&terms, "technical infrastructure").trim();
        sections.payment_terms = (!clipped.is_empty()).then(|| clipped.to_string());
    }

    sections
}

/// A separator-less heading must be capitalised and start the text or a sentence.
fn opens_sentence(before: &str, heading: &str) -> bool {
    heading.starts_with(char::is_uppercase)
        && before
            .trim_end()
            .chars()
            .last()
            .map_or(true, |c| matches!(c, '.' | '!' | '?' | ';'))
}

/// `text` up to the first case-insensitive occurrence of `marker`.
fn clip_before<'t>(text: &'t str, marker: &str) -> &'t str {
    let lower = text.to_lowercase();
    match lower.find(marker) {
        // Lower-casing can change byte lengths; only cut on a valid boundary.
        Some(idx) if lower.len() == text.len() && text.is_char_boundary(idx) => &text[..idx],
        _ => text,
    }
}
