//! Query normalization
//!
//! Cached texts are stored lowercased with numeric values generalized, so
//! "Rollo auf 75%" and "Rollo auf 30 Prozent" land on the same entry. The
//! concrete value is carried alongside and injected back on a hit.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Unit of a numeric value found in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Percent,
    Degrees,
}

/// A numeric value replaced by a placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct NumericValue {
    pub kind: NumericKind,
    pub value: serde_json::Value,
}

impl NumericValue {
    fn new(kind: NumericKind, value: serde_json::Value) -> Self {
        Self { kind, value }
    }
}

/// Slots that receive a numeric value extracted from the query, with the
/// unit they accept
pub const NUMERIC_SLOTS: &[(&str, NumericKind)] = &[
    ("position", NumericKind::Percent),
    ("brightness", NumericKind::Percent),
    ("volume_level", NumericKind::Percent),
    ("humidity", NumericKind::Percent),
    ("temperature", NumericKind::Degrees),
];

const PERCENT_PLACEHOLDER: &str = "50 prozent";
const TEMPERATURE_PLACEHOLDER: &str = "21 grad";

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:%|prozent)").expect("valid percent regex"));

static TEMPERATURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*(?:grad|°)").expect("valid temperature regex"));

// Utterances whose meaning hinges on something a cached resolution can't carry
static BYPASS_RE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // duration-bound commands need the exact duration
        r"\bfür\s+\d+\s*(?:minuten?|stunden?|sekunden?)\b",
        r"\bfür\s+(?:eine?|kurze?)\s*(?:zeit|weile)\b",
        r"\btemporär\b",
        r"\bvorübergehend\b",
        r"\bzeitlich\s+begrenzt\b",
        // implicit direction ("too dark" means brighter)
        r"\bzu\s+dunkel\b",
        r"\bzu\s+hell\b",
        r"\bzu\s+kalt\b",
        r"\bzu\s+warm\b",
        r"\bzu\s+heiß\b",
        r"\bes\s+ist\s+(?:dunkel|hell)\b",
        r"\b(?:dunkel|hell)\s+hier\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid bypass regex"))
    .collect()
});

/// A query prepared for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuery {
    /// Lowercased, trimmed, whitespace-collapsed, numbers generalized
    pub text: String,
    /// Numeric values replaced by placeholders, in order of appearance
    pub values: Vec<NumericValue>,
}

impl NormalizedQuery {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Lowercase, trim and collapse whitespace
pub fn canonicalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonicalize and generalize numeric values.
///
/// Percentages take precedence; temperatures are only generalized when the
/// text contained no percentage.
pub fn normalize_query(text: &str) -> NormalizedQuery {
    let canonical = canonicalize(text);
    let mut values = Vec::new();

    let generalized = PERCENT_RE.replace_all(&canonical, |caps: &regex::Captures| {
        if let Ok(value) = caps[1].parse::<i64>() {
            values.push(NumericValue::new(
                NumericKind::Percent,
                serde_json::Value::from(value),
            ));
        }
        PERCENT_PLACEHOLDER
    });

    let generalized = if values.is_empty() {
        TEMPERATURE_RE
            .replace_all(&generalized, |caps: &regex::Captures| {
                if let Some(value) = parse_number(&caps[1]) {
                    values.push(NumericValue::new(NumericKind::Degrees, value));
                }
                TEMPERATURE_PLACEHOLDER
            })
            .into_owned()
    } else {
        generalized.into_owned()
    };

    NormalizedQuery {
        text: generalized,
        values,
    }
}

fn parse_number(raw: &str) -> Option<serde_json::Value> {
    if raw.contains(['.', ',']) {
        raw.replace(',', ".")
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
    } else {
        raw.parse::<i64>().ok().map(serde_json::Value::from)
    }
}

/// Whether the (canonical) text must always take the full pipeline
pub fn is_bypass(text: &str) -> bool {
    BYPASS_RE.iter().any(|re| re.is_match(text))
}

/// Whitespace-delimited word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Overwrite known numeric slots with the first extracted value of the
/// matching unit.
///
/// Returns true when a slot was updated.
pub fn inject_numeric_slots(
    slots: &mut BTreeMap<String, serde_json::Value>,
    values: &[NumericValue],
) -> bool {
    let mut updated = false;

    for (key, kind) in NUMERIC_SLOTS {
        let Some(value) = values.iter().find(|v| v.kind == *kind) else {
            continue;
        };

        if let Some(slot) = slots.get_mut(*key) {
            *slot = value.value.clone();
            updated = true;
        }
    }

    updated
}
