use serde::{Deserialize, Serialize};

use crate::domain::ticket::{CustomerId, TicketId, TicketStatus};

/// One inbound customer message, as handed to the orchestrator by a
/// transport adapter (HTTP ingress, CLI simulator, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub customer_id: CustomerId,
    pub text: String,
    /// Explicit ticket reference when the channel supports threading.
    pub ticket_ref: Option<String>,
}

impl InboundMessage {
    pub fn new(customer_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { customer_id: CustomerId(customer_id.into()), text: text.into(), ticket_ref: None }
    }

    pub fn with_ticket_ref(mut self, ticket_ref: impl Into<String>) -> Self {
        self.ticket_ref = Some(ticket_ref.into());
        self
    }
}

/// Whether the body is a customer-facing reply or an escalation marker
/// standing in for a withheld draft.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseDisposition {
    Reply,
    Escalation,
}

/// The single outbound result of one turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundResponse {
    pub ticket_id: TicketId,
    pub status: TicketStatus,
    pub disposition: ResponseDisposition,
    pub body: String,
}
