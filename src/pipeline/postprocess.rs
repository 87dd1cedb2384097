//! Post-processing: deterministic cleanup of model output.
//!
//! Models wrap JSON in ` ```json ... ``` ` fences even when told not to,
//! sometimes twice, and occasionally prefix a byte-order mark. The rules
//! here remove those artefacts without touching content. Every rule is a
//! pure `&str → String` function, and [`normalize_output`] is idempotent.
//!
//! The JSON itself is never validated here: the structured output is
//! advisory text. Callers that want a typed record use
//! [`parse_structured_output`] or [`parse_shipment_record`] as a separate,
//! non-fatal step.

use crate::config::ExtractionProfile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Clean a raw model reply according to the profile.
///
/// * `ShipmentFields` — drop invisible characters, strip code fences, trim.
/// * `Summary` — normalise line endings, trim.
pub fn normalize_output(profile: ExtractionProfile, raw: &str) -> String {
    match profile {
        ExtractionProfile::ShipmentFields => strip_code_fences(&remove_invisible_chars(raw)),
        ExtractionProfile::Summary => normalise_line_endings(raw).trim().to_string(),
    }
}

// ── Code fences ──────────────────────────────────────────────────────────────

static RE_OPEN_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+-]*").unwrap());
static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```$").unwrap());

/// Remove leading and trailing code-fence markers until none are left.
pub fn strip_code_fences(input: &str) -> String {
    let mut current = input.trim().to_string();
    loop {
        let opened = RE_OPEN_FENCE.replace(&current, "");
        let next = RE_CLOSE_FENCE.replace(opened.trim(), "").trim().to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

// ── Text normalisation ───────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Optional parsing ─────────────────────────────────────────────────────────

/// Try to parse structured output as JSON, stripping fences first.
pub fn parse_structured_output(output: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(&strip_code_fences(output))
}

/// Typed view of the shipment-fields JSON object.
///
/// Every field is optional: the model sets missing fields to `null`, and
/// numbers are accepted in place of strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub vessel_name: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub bill_of_lading_number: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub lot_number: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub destination_port: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub cargo_type: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub total_quantity: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub customs_declaration_number: Option<String>,
}

impl ShipmentRecord {
    /// Names of the fields the model left empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("vessel_name", &self.vessel_name),
            ("bill_of_lading_number", &self.bill_of_lading_number),
            ("lot_number", &self.lot_number),
            ("destination_port", &self.destination_port),
            ("cargo_type", &self.cargo_type),
            ("total_quantity", &self.total_quantity),
            ("customs_declaration_number", &self.customs_declaration_number),
        ]
        .into_iter()
        .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Parse shipment-fields output into a [`ShipmentRecord`].
pub fn parse_shipment_record(output: &str) -> Result<ShipmentRecord, serde_json::Error> {
    serde_json::from_str(&strip_code_fences(output))
}

// ── Tests ────────────────────────────────────────────────────────────────────
