use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::mood::{Mood, Severity};
use crate::errors::DomainError;
use crate::schema::FieldName;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl TicketId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    ActionRequired,
    PendingCustomer,
    Resolved,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActionRequired => "ACTION_REQUIRED",
            Self::PendingCustomer => "PENDING_CUSTOMER",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "ACTION_REQUIRED" => Some(Self::ActionRequired),
            "PENDING_CUSTOMER" => Some(Self::PendingCustomer),
            "RESOLVED" => Some(Self::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a ticket needs human attention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationFlag {
    /// The classifier could not map the message to a configured intent.
    UnknownIntent,
    /// The compliance gate withheld a drafted reply.
    HumanReview,
    /// A collaborator failed unexpectedly mid-turn.
    SystemError,
}

impl EscalationFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownIntent => "unknown_intent",
            Self::HumanReview => "human_review",
            Self::SystemError => "system_error",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "unknown_intent" => Some(Self::UnknownIntent),
            "human_review" => Some(Self::HumanReview),
            "system_error" => Some(Self::SystemError),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Customer,
    Agent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub sender: Sender,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// The persisted unit of conversational state for one customer issue.
///
/// The flow orchestrator is the sole writer; everything here changes only
/// inside a single turn, between one load and one save.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub customer_id: CustomerId,
    pub intent: Option<String>,
    pub known_fields: BTreeMap<FieldName, String>,
    pub mood: Mood,
    pub severity: Severity,
    pub status: TicketStatus,
    pub escalation: Option<EscalationFlag>,
    pub retained_draft: Option<String>,
    pub turn_count: u32,
    pub history: Vec<TicketMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn open(customer_id: CustomerId) -> Self {
        let now = Utc::now();
        Self {
            id: TicketId::generate(),
            customer_id,
            intent: None,
            known_fields: BTreeMap::new(),
            mood: Mood::Neutral,
            severity: Severity::Low,
            status: TicketStatus::ActionRequired,
            escalation: None,
            retained_draft: None,
            turn_count: 0,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status != TicketStatus::Resolved
    }

    /// Lock the intent for the life of the ticket. Returns `true` when this
    /// call set it; once non-null the intent is immutable and later
    /// predictions are ignored.
    pub fn lock_intent(&mut self, intent: &str) -> bool {
        if self.intent.is_some() {
            return false;
        }
        self.intent = Some(intent.to_string());
        true
    }

    /// Merge newly extracted fields under the non-regression rule: a field
    /// already holding a non-empty value is never overwritten, and an empty
    /// extraction never displaces anything. Returns the accepted field names.
    pub fn merge_fields(&mut self, extracted: BTreeMap<FieldName, String>) -> Vec<FieldName> {
        let mut accepted = Vec::new();
        for (field, value) in extracted {
            if value.trim().is_empty() {
                continue;
            }
            let replaceable = match self.known_fields.get(&field) {
                None => true,
                Some(existing) => existing.trim().is_empty(),
            };
            if replaceable {
                self.known_fields.insert(field.clone(), value);
                accepted.push(field);
            }
        }
        accepted
    }

    /// Field names currently holding a non-empty value; the set the
    /// slot-fill evaluator treats as known.
    pub fn filled_field_names(&self) -> BTreeSet<FieldName> {
        self.known_fields
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(field, _)| field.clone())
            .collect()
    }

    pub fn record_mood(&mut self, mood: Mood) {
        self.mood = mood;
        self.severity = Severity::for_mood(mood);
    }

    pub fn push_message(&mut self, sender: Sender, text: impl Into<String>) {
        self.history.push(TicketMessage { sender, text: text.into(), sent_at: Utc::now() });
    }

    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::{ActionRequired, PendingCustomer, Resolved};
        matches!(
            (self.status, next),
            (ActionRequired, ActionRequired)
                | (ActionRequired, PendingCustomer)
                | (ActionRequired, Resolved)
                | (PendingCustomer, ActionRequired)
                | (PendingCustomer, PendingCustomer)
                | (PendingCustomer, Resolved)
        )
    }

    pub fn transition_to(&mut self, next: TicketStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }
        Err(DomainError::InvalidStatusTransition { from: self.status, to: next })
    }

    pub fn escalate(&mut self, flag: EscalationFlag) {
        self.escalation = Some(flag);
    }
}
