//! Prompts for the Structure stage and contract analysis.
//!
//! Every prompt lives here so that wording changes touch one file and tests
//! can inspect prompts without a model. Callers can override the system
//! prompt via [`crate::config::ExtractionConfig::system_prompt`].

use crate::config::ExtractionProfile;

/// Output used when the document yielded no usable text; no model is called.
pub const NO_USABLE_TEXT_OUTPUT: &str = "No valid text could be extracted for processing.";

/// Filename shown to the model when the caller supplied none.
pub const DEFAULT_FILENAME: &str = "Document";

/// System prompt for shipment-field extraction.
pub const SHIPMENT_SYSTEM_PROMPT: &str = "You are a precise JSON data extraction engine.";

/// System prompt for document summaries.
pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a logistics analyst who writes short, factual document summaries.";

/// Field-extraction instructions. `{filename}` and `{document}` are substituted.
const SHIPMENT_FIELDS_TEMPLATE: &str = r#"Act as an expert in customs logistics and port settlement documents.
Analyse the following document, converted to text with page markers and tables preserved.

File name: '{filename}'

Your GOAL is to extract ONLY the following information and return it as a valid JSON object.
Look in headings, body text and tables.

FIELDS TO EXTRACT:
1. "vessel_name": (look for: MV, M/V, MN, Vessel, Ship)
2. "bill_of_lading_number": (look for: B/L, Bill of Lading, Shipping Note)
3. "lot_number": (look for: Lot, Batch, Lot No)
4. "destination_port": (look for: Port of Discharge, POD, Destination)
5. "cargo_type": (description of the goods, e.g. wheat, maize, steel coils, urea)
6. "total_quantity": (total net or gross weight declared, e.g. 5000 MT, KGS)
7. "customs_declaration_number": (customs goods declaration number, numeric customs format)

RULES:
- If a field does not appear in the document, set it to null.
- Return ONLY the JSON object. Do not include code fences (```json) or any other text.
- If several values are possible (e.g. several lots), consolidate them or keep the main one.

Document:
{document}"#;

/// Summary instructions. `{filename}` and `{document}` are substituted.
const SUMMARY_TEMPLATE: &str = r#"Summarise the following document for an operations team.

File name: '{filename}'

Write at most five bullet points covering: what the document is, the parties involved,
the goods or services concerned, key quantities, dates and places, and anything that
needs follow-up. Use only facts found in the document.

Document:
{document}"#;

/// Default system prompt for a profile.
pub fn system_prompt(profile: ExtractionProfile) -> &'static str {
    match profile {
        ExtractionProfile::ShipmentFields => SHIPMENT_SYSTEM_PROMPT,
        ExtractionProfile::Summary => SUMMARY_SYSTEM_PROMPT,
    }
}

/// User prompt for a profile, embedding the file name and the text excerpt.
pub fn user_prompt(profile: ExtractionProfile, filename: &str, excerpt: &str) -> String {
    let template = match profile {
        ExtractionProfile::ShipmentFields => SHIPMENT_FIELDS_TEMPLATE,
        ExtractionProfile::Summary => SUMMARY_TEMPLATE,
    };
    // One pass over the template: neither value is scanned for placeholders.
    template
        .split("{document}")
        .map(|piece| piece.replace("{filename}", filename))
        .collect::<Vec<_>>()
        .join(excerpt)
}

/// Instruction for the executive-summary contract task.
pub const CONTRACT_SUMMARY_PROMPT: &str = "You are an expert contract analyst. Based on the following contract fields, provide a concise 5-bullet-point summary for executive review.";

/// Instruction for the risk-highlighting contract task.
pub const CONTRACT_RISKS_PROMPT: &str = "You are a risk analyst reviewing a contract. Based on the contract fields below, highlight any risks, ambiguities, or potential bottlenecks that should be flagged for further review.";

/// Instruction for the missing-fields contract task.
pub const CONTRACT_MISSING_FIELDS_PROMPT: &str = "You are a compliance reviewer. Review the contract fields below and identify any missing, vague, or inconsistent sections.
For each section, explicitly mention if it is clearly provided, vague or incomplete, or missing entirely.
Then list any follow-up questions or additional information you would request from the contract author to resolve gaps.";
