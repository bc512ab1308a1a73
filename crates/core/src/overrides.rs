//! Deterministic mood safety overrides.
//!
//! Classifier mood output is corrected by an ordered table of lexical rules
//! applied after the raw prediction; the first matching rule wins. The table
//! is data, not branching, so each rule can be audited and tested on its
//! own. The default rules encode an asymmetric error cost: misreading an
//! angry customer as happy is worse than occasionally escalating a happy one.

use crate::domain::mood::Mood;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoodOverride {
    pub id: String,
    /// Only fires when the raw prediction matches; `None` fires on any mood.
    pub when_predicted: Option<Mood>,
    /// Lowercase substrings; any hit triggers the rule.
    pub cues: Vec<String>,
    pub force: Mood,
}

impl MoodOverride {
    pub fn new(
        id: impl Into<String>,
        when_predicted: Option<Mood>,
        cues: &[&str],
        force: Mood,
    ) -> Self {
        Self {
            id: id.into(),
            when_predicted,
            cues: cues.iter().map(|cue| cue.to_ascii_lowercase()).collect(),
            force,
        }
    }

    fn matches(&self, lowercased_text: &str, predicted: Mood) -> bool {
        if let Some(guard) = self.when_predicted {
            if guard != predicted {
                return false;
            }
        }
        self.cues.iter().any(|cue| lowercased_text.contains(cue.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoodDecision {
    pub mood: Mood,
    /// Id of the rule that fired, if any.
    pub overridden_by: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoodOverrideTable {
    rules: Vec<MoodOverride>,
}

impl Default for MoodOverrideTable {
    fn default() -> Self {
        Self::new(vec![
            MoodOverride::new(
                "negated-positive",
                Some(Mood::Happy),
                &["not happy", "unhappy", "disappointed", "delay", "waiting", "where is", "late"],
                Mood::Angry,
            ),
            MoodOverride::new(
                "calm-urgent",
                Some(Mood::Urgent),
                &["just checking", "curious", "wondering", "no rush", "take your time"],
                Mood::Neutral,
            ),
        ])
    }
}

impl MoodOverrideTable {
    pub fn new(rules: Vec<MoodOverride>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[MoodOverride] {
        &self.rules
    }

    pub fn apply(&self, text: &str, predicted: Mood) -> MoodDecision {
        let lowercased = text.to_lowercase();
        for rule in &self.rules {
            if rule.matches(&lowercased, predicted) {
                return MoodDecision { mood: rule.force, overridden_by: Some(rule.id.clone()) };
            }
        }
        MoodDecision { mood: predicted, overridden_by: None }
    }
}
