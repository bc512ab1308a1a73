use serde::{Deserialize, Serialize};

/// Emotional tone of the latest customer message. Overwritten every turn;
/// the most recent turn governs reply tone, not conversation history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    Angry,
    Urgent,
    Confused,
    Neutral,
    Happy,
    Unknown,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Angry => "Angry",
            Self::Urgent => "Urgent",
            Self::Confused => "Confused",
            Self::Neutral => "Neutral",
            Self::Happy => "Happy",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse a classifier-produced label. Unrecognized labels collapse to
    /// `Unknown` rather than failing; mood is advisory, never load-bearing.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "angry" => Self::Angry,
            "urgent" => Self::Urgent,
            "confused" => Self::Confused,
            "neutral" => Self::Neutral,
            "happy" => Self::Happy,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority tier used to triage human attention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// The severity policy: a fixed, total mapping from mood to tier.
    pub fn for_mood(mood: Mood) -> Self {
        match mood {
            Mood::Angry | Mood::Urgent => Self::High,
            Mood::Confused | Mood::Unknown => Self::Medium,
            Mood::Neutral | Mood::Happy => Self::Low,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
