use async_trait::async_trait;

use maildesk_core::{CollaboratorError, ComplianceChecker, Verdict};

/// Deterministic outbound vetting: a denylist of phrases that must never
/// reach a customer, plus structural checks for template debris. The rules
/// err on the side of withholding — a blocked draft is retained on the
/// ticket for a human, so a false positive costs a review, not a customer.
pub struct RuleComplianceChecker {
    banned_phrases: Vec<String>,
}

const TEMPLATE_DEBRIS: &[&str] = &["{{", "}}", "{%", "%}"];

const DEFAULT_BANNED_PHRASES: &[&str] = &[
    "lorem ipsum",
    "internal use only",
    "do not send",
    "stupid",
    "idiot",
    "useless",
    "shut up",
    "your fault",
];

impl Default for RuleComplianceChecker {
    fn default() -> Self {
        Self::new(DEFAULT_BANNED_PHRASES.iter().map(|phrase| (*phrase).to_string()).collect())
    }
}

impl RuleComplianceChecker {
    pub fn new(banned_phrases: Vec<String>) -> Self {
        Self {
            banned_phrases: banned_phrases
                .into_iter()
                .map(|phrase| phrase.to_lowercase())
                .collect(),
        }
    }

    fn violates(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return true;
        }
        if TEMPLATE_DEBRIS.iter().any(|debris| text.contains(debris)) {
            return true;
        }
        let lowercased = text.to_lowercase();
        self.banned_phrases.iter().any(|phrase| lowercased.contains(phrase.as_str()))
    }
}

#[async_trait]
impl ComplianceChecker for RuleComplianceChecker {
    async fn vet(&self, text: &str) -> Result<Verdict, CollaboratorError> {
        if self.violates(text) {
            return Ok(Verdict::Fail);
        }
        Ok(Verdict::Pass)
    }
}
