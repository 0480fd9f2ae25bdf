//! Admission rules: which resolved commands may be learned

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::entry::{IntentDescriptor, Resolution};
use super::normalize::{canonicalize, word_count};

/// Utterances shorter than this are too ambiguous to cache
pub const MIN_CACHE_WORDS: usize = 3;

// Compared lowercased
const EPHEMERAL_INTENTS: &[&str] = &[
    "hasstimerset",
    "hassstarttimer",
    "hasscalendarcreate",
    "hasscreateevent",
    "timer_set",
    "start_timer",
    "calendar_create",
    "create_event",
];

const RELATIVE_COMMANDS: &[&str] = &["step_up", "step_down"];

// Words that carry no selection meaning in a clarification reply
const FILLER_WORDS: &[&str] = &[
    "der", "die", "das", "den", "dem", "des", "ein", "eine", "einen", "einem", "im", "in", "ins",
    "vom", "von", "am", "auf", "bei", "mit", "und", "oder", "bitte", "ich", "meine", "meinte",
    "nehme", "nimm", "will", "möchte", "davon", "option", "nummer", "nr", "lieber", "doch", "ja",
    "genau", "da", "dort", "hier",
];

// An answer to "which one?" that only makes sense with the question in view
static SELECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\d+|erste[nrs]?|zweite[nrs]?|dritte[nrs]?|vierte[nrs]?|fünfte[nrs]?|letzte[nrs]?|beide[ns]?|alle[ns]?|sämtliche|keine[ns]?|keins)$",
    )
    .expect("valid selection regex")
});

/// Why a resolution was not learned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer than three words
    TooShort,
    /// Answer to a clarification question
    DisambiguationResponse,
    /// Relative adjustment whose effect depends on current device state
    StateDependent,
    /// Creates a one-off timer, reminder or event
    Ephemeral,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TooShort => "too_short",
            SkipReason::DisambiguationResponse => "disambiguation_response",
            SkipReason::StateDependent => "state_dependent",
            SkipReason::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission decision for a candidate entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Cacheable,
    Skip(SkipReason),
}

impl Admission {
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Admission::Cacheable)
    }
}

/// How replaying an intent behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    /// Same utterance, same effect
    Repeatable,
    /// Effect depends on device state at execution time
    StateDependent,
    /// Creates something that must not be created twice
    Ephemeral,
}

impl IntentKind {
    pub fn of(intent: &IntentDescriptor) -> Self {
        let name = intent.intent_name.to_lowercase();

        if EPHEMERAL_INTENTS.contains(&name.as_str()) {
            return IntentKind::Ephemeral;
        }

        let relative_name = RELATIVE_COMMANDS
            .iter()
            .any(|cmd| name.contains(cmd) || name.contains(&cmd.replace('_', "")));
        let relative_command = intent
            .slot_str("command")
            .is_some_and(|cmd| RELATIVE_COMMANDS.contains(&cmd.to_lowercase().as_str()));

        if relative_name || relative_command {
            IntentKind::StateDependent
        } else {
            IntentKind::Repeatable
        }
    }
}

/// Decide whether a resolved command may be stored.
///
/// Rules apply in order: length, disambiguation reply, state dependence,
/// ephemeral intent.
pub fn classify(query_text: &str, resolution: &Resolution) -> Admission {
    let text = canonicalize(query_text);

    if word_count(&text) < MIN_CACHE_WORDS {
        return Admission::Skip(SkipReason::TooShort);
    }

    if resolution.is_disambiguation_reply || is_disambiguation_reply(&text, &resolution.intent) {
        return Admission::Skip(SkipReason::DisambiguationResponse);
    }

    match IntentKind::of(&resolution.intent) {
        IntentKind::StateDependent => Admission::Skip(SkipReason::StateDependent),
        IntentKind::Ephemeral => Admission::Skip(SkipReason::Ephemeral),
        IntentKind::Repeatable => Admission::Cacheable,
    }
}

/// Detect clarification answers: ordinal picks, "both"/"all"/"none", or a
/// bare area or device name.
fn is_disambiguation_reply(text: &str, intent: &IntentDescriptor) -> bool {
    let content: Vec<&str> = text
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|word| !word.is_empty() && !FILLER_WORDS.contains(word))
        .collect();

    if content.is_empty() {
        return false;
    }

    if content.iter().all(|word| SELECTION_RE.is_match(word)) {
        return true;
    }

    let remainder = content.join(" ");

    ["area", "name", "floor"]
        .iter()
        .filter_map(|slot| intent.slot_str(slot))
        .any(|value| canonicalize(value) == remainder)
}
