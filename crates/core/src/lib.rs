pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flow;
pub mod overrides;
pub mod schema;
pub mod slotfill;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::message::{InboundMessage, OutboundResponse, ResponseDisposition};
pub use domain::mood::{Mood, Severity};
pub use domain::ticket::{
    CustomerId, EscalationFlag, Sender, Ticket, TicketId, TicketMessage, TicketStatus,
};
pub use errors::{DomainError, InterfaceError};
pub use flow::collaborators::{
    Boundary, Classification, Classifier, CollaboratorError, ComplianceChecker, DataSource,
    EntityExtractor, FaqMatch, KnowledgeBase, LookupOutcome, RecordFields, RenderError,
    TemplateRenderer, Verdict,
};
pub use flow::store::{StoreError, TicketStore};
pub use flow::{Collaborators, EngineError, FlowOrchestrator};
pub use overrides::{MoodDecision, MoodOverride, MoodOverrideTable};
pub use schema::{FieldName, IntentSchema, IntentSpec, SchemaError, UNKNOWN_INTENT};
pub use slotfill::SlotFillReport;
