use std::collections::BTreeSet;

use async_trait::async_trait;

use maildesk_core::{
    Classification, Classifier, CollaboratorError, Mood, UNKNOWN_INTENT,
};

/// Representative phrases for one intent; the classifier scores inbound
/// text against every phrase and keeps the best.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentAnchor {
    pub intent: String,
    pub phrases: Vec<String>,
}

impl IntentAnchor {
    pub fn new(intent: impl Into<String>, phrases: &[&str]) -> Self {
        Self {
            intent: intent.into(),
            phrases: phrases.iter().map(|phrase| (*phrase).to_string()).collect(),
        }
    }
}

/// Intent and mood classification over token overlap with anchor phrases
/// and a weighted mood lexicon. Deterministic stand-in for an embedding
/// model; scores land in [0, 1] like the model scores they replace.
pub struct LexiconClassifier {
    anchors: Vec<(String, Vec<BTreeSet<String>>)>,
    intent_floor: f32,
}

const ANGRY_CUES: &[&str] = &[
    "angry", "upset", "frustrated", "annoyed", "furious", "mad", "disappointed", "worst",
    "terrible", "horrible", "awful", "garbage", "useless", "broken", "damaged", "defective",
    "scam", "fraud", "refund", "chargeback", "ridiculous", "pathetic", "sucks",
];

const HAPPY_CUES: &[&str] = &[
    "thanks", "thank you", "appreciate", "grateful", "love", "great", "awesome", "amazing",
    "excellent", "perfect", "wonderful", "fantastic", "satisfied", "happy",
];

const URGENT_CUES: &[&str] = &[
    "asap", "urgent", "emergency", "immediately", "right now", "hurry", "rush", "deadline",
    "late", "overdue", "where is my", "haven't received", "waiting",
];

const CONFUSED_CUES: &[&str] = &[
    "confused", "don't understand", "didn't understand", "unsure", "not sure", "clarify",
    "explain", "doesn't make sense", "help me understand", "how do i", "what does this mean",
];

impl LexiconClassifier {
    pub fn new(anchors: Vec<IntentAnchor>, intent_floor: f32) -> Self {
        let anchors = anchors
            .into_iter()
            .map(|anchor| {
                let token_sets =
                    anchor.phrases.iter().map(|phrase| tokenize(phrase)).collect::<Vec<_>>();
                (anchor.intent, token_sets)
            })
            .collect();
        Self { anchors, intent_floor }
    }

    /// Anchors for the demo intent schema shipped in `config/`.
    pub fn with_default_anchors(intent_floor: f32) -> Self {
        Self::new(
            vec![
                IntentAnchor::new(
                    "order_status",
                    &[
                        "Where is my order?",
                        "Check my order status.",
                        "Tracking number for my delivery.",
                        "Has my package shipped yet?",
                    ],
                ),
                IntentAnchor::new(
                    "stock_availability",
                    &[
                        "Is this item in stock?",
                        "Do you have this product available?",
                        "When will it be back in stock?",
                    ],
                ),
                IntentAnchor::new(
                    "product_info",
                    &[
                        "Tell me about this product.",
                        "What are the features of this product?",
                        "Product specifications and details.",
                    ],
                ),
                IntentAnchor::new(
                    "password_reset",
                    &[
                        "I forgot my password.",
                        "Reset my account password.",
                        "I cannot log into my account.",
                    ],
                ),
            ],
            intent_floor,
        )
    }

    fn predict_intent(&self, tokens: &BTreeSet<String>) -> (String, f32) {
        let mut best_intent = UNKNOWN_INTENT.to_string();
        let mut best_score = 0.0f32;

        for (intent, phrase_tokens) in &self.anchors {
            for anchor in phrase_tokens {
                let score = overlap_score(tokens, anchor);
                if score > best_score {
                    best_score = score;
                    best_intent = intent.clone();
                }
            }
        }

        if best_score < self.intent_floor {
            return (UNKNOWN_INTENT.to_string(), best_score);
        }
        (best_intent, best_score)
    }

    fn predict_mood(lowercased: &str) -> (Mood, f32) {
        let lexicon: &[(Mood, &[&str])] = &[
            (Mood::Angry, ANGRY_CUES),
            (Mood::Happy, HAPPY_CUES),
            (Mood::Urgent, URGENT_CUES),
            (Mood::Confused, CONFUSED_CUES),
        ];
        for (mood, cues) in lexicon {
            if cues.iter().any(|cue| lowercased.contains(cue)) {
                return (*mood, 0.8);
            }
        }
        (Mood::Neutral, 0.5)
    }
}

#[async_trait]
impl Classifier for LexiconClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError> {
        let lowercased = text.to_lowercase();
        let tokens = tokenize(&lowercased);
        let (intent, intent_confidence) = self.predict_intent(&tokens);
        let (mood, mood_confidence) = Self::predict_mood(&lowercased);
        Ok(Classification { intent, intent_confidence, mood, mood_confidence })
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|character: char| !character.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

/// Cosine similarity over binary bags of words.
fn overlap_score(query: &BTreeSet<String>, anchor: &BTreeSet<String>) -> f32 {
    if query.is_empty() || anchor.is_empty() {
        return 0.0;
    }
    let shared = query.intersection(anchor).count() as f32;
    shared / ((query.len() as f32).sqrt() * (anchor.len() as f32).sqrt())
}
