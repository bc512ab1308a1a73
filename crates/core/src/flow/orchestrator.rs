//! Flow orchestrator: the conversation state machine.
//!
//! One inbound message in, one outbound response out. The orchestrator is
//! stateless between invocations — the ticket carries all conversational
//! memory as explicit load/compute/save, so the engine is restart-safe and
//! scales horizontally across independent tickets.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use crate::domain::message::{InboundMessage, OutboundResponse, ResponseDisposition};
use crate::domain::mood::{Mood, Severity};
use crate::domain::ticket::{
    CustomerId, EscalationFlag, Sender, Ticket, TicketId, TicketStatus,
};
use crate::errors::DomainError;
use crate::flow::collaborators::{
    Classifier, CollaboratorError, ComplianceChecker, DataSource, EntityExtractor, KnowledgeBase,
    LookupOutcome, RecordFields, TemplateRenderer, Verdict,
};
use crate::flow::locks::TicketLocks;
use crate::flow::store::{StoreError, TicketStore};
use crate::flow::templates;
use crate::overrides::MoodOverrideTable;
use crate::schema::{FieldName, IntentSchema, UNKNOWN_INTENT};
use crate::slotfill;

/// Knowledge-base similarity at or above this resolves the turn as an FAQ
/// answer. Below it, false-positive matches to irrelevant FAQs cost more
/// than falling through to classification.
pub const DEFAULT_FAQ_MATCH_THRESHOLD: f32 = 0.60;

const ESCALATION_NOTICE: &str = "Thanks for reaching out. Your request needs a closer look, so a support specialist will review the details and follow up with you shortly.";

const SYSTEM_ERROR_FALLBACK: &str = "We hit an unexpected problem while processing your request. Our team has been notified and will follow up as soon as possible.";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("inbound message text must not be empty")]
    EmptyInput,
    #[error("malformed ticket reference `{0}`")]
    MalformedTicketReference(String),
    #[error("ticket reference `{0}` does not belong to the sender")]
    ForeignTicketReference(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The pluggable boundary implementations one orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub extractor: Arc<dyn EntityExtractor>,
    pub knowledge_base: Arc<dyn KnowledgeBase>,
    pub data_source: Arc<dyn DataSource>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub compliance: Arc<dyn ComplianceChecker>,
}

pub struct FlowOrchestrator {
    store: Arc<dyn TicketStore>,
    collaborators: Collaborators,
    schema: IntentSchema,
    overrides: MoodOverrideTable,
    audit: Arc<dyn AuditSink>,
    faq_threshold: f32,
    locks: TicketLocks,
}

/// What one branch of the turn produced: the drafted body and the status
/// the ticket should take if the draft clears the compliance gate.
struct TurnDraft {
    body: String,
    next_status: TicketStatus,
}

enum TurnError {
    Fault(CollaboratorError),
    Domain(DomainError),
}

impl From<CollaboratorError> for TurnError {
    fn from(error: CollaboratorError) -> Self {
        Self::Fault(error)
    }
}

impl From<crate::flow::collaborators::RenderError> for TurnError {
    fn from(error: crate::flow::collaborators::RenderError) -> Self {
        Self::Fault(error.into())
    }
}

impl From<DomainError> for TurnError {
    fn from(error: DomainError) -> Self {
        Self::Domain(error)
    }
}

impl FlowOrchestrator {
    pub fn new(
        store: Arc<dyn TicketStore>,
        collaborators: Collaborators,
        schema: IntentSchema,
    ) -> Self {
        Self {
            store,
            collaborators,
            schema,
            overrides: MoodOverrideTable::default(),
            audit: Arc::new(NoopAuditSink),
            faq_threshold: DEFAULT_FAQ_MATCH_THRESHOLD,
            locks: TicketLocks::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: MoodOverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_faq_threshold(mut self, threshold: f32) -> Self {
        self.faq_threshold = threshold;
        self
    }

    /// Process one inbound message: load or create the ticket, run the flow,
    /// gate the draft, and persist the ticket exactly once.
    pub async fn handle(&self, message: InboundMessage) -> Result<OutboundResponse, EngineError> {
        let text = message.text.trim().to_string();
        if text.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let ticket_ref = match &message.ticket_ref {
            Some(raw) => Some(parse_ticket_ref(raw)?),
            None => None,
        };

        let _turn_guard = self.locks.acquire(&message.customer_id.0).await;

        let mut ticket = self.resolve_ticket(&message.customer_id, ticket_ref.as_ref()).await?;
        let opened_this_turn = ticket.turn_count == 0;
        ticket.turn_count += 1;
        ticket.push_message(Sender::Customer, &text);
        if opened_this_turn {
            self.emit(&ticket, "flow.ticket_opened", AuditCategory::Ingress, AuditOutcome::Success, &[]);
        }

        let draft = match self.run_turn(&mut ticket, &text).await {
            Ok(draft) => draft,
            Err(TurnError::Domain(error)) => return Err(EngineError::Domain(error)),
            Err(TurnError::Fault(fault)) => self.system_error_turn(&mut ticket, &fault).await,
        };

        let response = self.gate(&mut ticket, draft).await?;

        ticket.push_message(Sender::Agent, &response.body);
        ticket.updated_at = Utc::now();
        self.store.save(&ticket).await?;

        Ok(response)
    }

    async fn resolve_ticket(
        &self,
        customer_id: &CustomerId,
        ticket_ref: Option<&TicketId>,
    ) -> Result<Ticket, EngineError> {
        if let Some(id) = ticket_ref {
            if let Some(ticket) = self.store.find_by_id(id).await? {
                if ticket.customer_id != *customer_id {
                    return Err(EngineError::ForeignTicketReference(id.0.clone()));
                }
                if ticket.is_open() {
                    return Ok(ticket);
                }
                // A resolved ticket is closed; the message starts a new issue.
            }
        }
        if let Some(ticket) = self.store.find_open_for_customer(customer_id).await? {
            return Ok(ticket);
        }
        Ok(Ticket::open(customer_id.clone()))
    }

    async fn run_turn(&self, ticket: &mut Ticket, text: &str) -> Result<TurnDraft, TurnError> {
        // FAQ fast path: only while no intent is locked. A hit is terminal
        // and never touches the data source or slot-filling.
        if ticket.intent.is_none() {
            if let Some(faq) = self.collaborators.knowledge_base.best_match(text).await? {
                if faq.score >= self.faq_threshold {
                    let mood = self.detect_mood(text).await?;
                    ticket.record_mood(mood);
                    self.emit(
                        ticket,
                        "flow.faq_resolved",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                        &[("entry", faq.entry_id.clone()), ("score", format!("{:.3}", faq.score))],
                    );
                    let mut context = self.base_context(ticket);
                    context.insert("answer".to_string(), Value::String(faq.answer));
                    let body =
                        self.collaborators.renderer.render(templates::FAQ_REPLY, &context).await?;
                    return Ok(TurnDraft { body, next_status: TicketStatus::Resolved });
                }
            }
        }

        // Classification runs on every non-FAQ turn: the latest message
        // always governs mood, while intent only locks once.
        let classification = self.collaborators.classifier.classify(text).await?;
        let decision = self.overrides.apply(text, classification.mood);
        if let Some(rule) = &decision.overridden_by {
            tracing::debug!(
                rule = rule.as_str(),
                raw = classification.mood.as_str(),
                forced = decision.mood.as_str(),
                "mood safety override applied"
            );
        }
        ticket.record_mood(decision.mood);

        let intent = match &ticket.intent {
            Some(locked) => locked.clone(),
            None => {
                let predicted = classification.intent.clone();
                if predicted == UNKNOWN_INTENT || !self.schema.knows(&predicted) {
                    return self.unknown_intent_turn(ticket, &predicted).await;
                }
                ticket.lock_intent(&predicted);
                self.emit(
                    ticket,
                    "flow.intent_locked",
                    AuditCategory::Flow,
                    AuditOutcome::Success,
                    &[
                        ("intent", predicted.clone()),
                        ("confidence", format!("{:.3}", classification.intent_confidence)),
                    ],
                );
                predicted
            }
        };

        // The schema can drift under a long-lived ticket; a locked intent
        // it no longer declares routes to escalation like any unknown.
        let Some(required) = self.schema.required_fields(&intent) else {
            return self.unknown_intent_turn(ticket, &intent).await;
        };
        let required = required.to_vec();

        let extracted = self.collaborators.extractor.extract(text, &required).await?;
        let accepted = ticket.merge_fields(extracted);
        if !accepted.is_empty() {
            self.emit(
                ticket,
                "flow.fields_extracted",
                AuditCategory::Extraction,
                AuditOutcome::Success,
                &[("fields", join_fields(&accepted))],
            );
        }

        let report = slotfill::evaluate(&required, &ticket.filled_field_names());
        if !report.complete {
            self.emit(
                ticket,
                "flow.info_requested",
                AuditCategory::Flow,
                AuditOutcome::Success,
                &[("missing", join_fields(&report.missing))],
            );
            let mut context = self.base_context(ticket);
            context.insert(
                "missing_fields".to_string(),
                Value::Array(
                    report.missing.iter().map(|field| Value::String(field.0.clone())).collect(),
                ),
            );
            let body =
                self.collaborators.renderer.render(templates::REQUEST_INFO, &context).await?;
            return Ok(TurnDraft { body, next_status: TicketStatus::PendingCustomer });
        }

        let outcome =
            self.collaborators.data_source.lookup(&intent, &ticket.known_fields).await?;
        match outcome {
            LookupOutcome::Found(record) => {
                self.emit(
                    ticket,
                    "flow.resolved",
                    AuditCategory::Resolution,
                    AuditOutcome::Success,
                    &[("intent", intent.clone())],
                );
                let mut context = self.base_context(ticket);
                context.insert("fields".to_string(), fields_value(&ticket.known_fields));
                context.insert("record".to_string(), Value::Object(record));
                let template = self.final_reply_template(&intent);
                let body = self.collaborators.renderer.render(&template, &context).await?;
                Ok(TurnDraft { body, next_status: TicketStatus::Resolved })
            }
            LookupOutcome::NotFound | LookupOutcome::InvalidKey => {
                let reason = match outcome {
                    LookupOutcome::InvalidKey => "invalid_key",
                    _ => "not_found",
                };
                self.emit(
                    ticket,
                    "flow.invalid_data",
                    AuditCategory::Resolution,
                    AuditOutcome::Rejected,
                    &[("intent", intent.clone()), ("reason", reason.to_string())],
                );
                let mut context = self.base_context(ticket);
                context.insert("fields".to_string(), fields_value(&ticket.known_fields));
                context.insert("reason".to_string(), Value::String(reason.to_string()));
                let body =
                    self.collaborators.renderer.render(templates::INVALID_DATA, &context).await?;
                // The customer must correct input; the ticket stays open.
                Ok(TurnDraft { body, next_status: TicketStatus::ActionRequired })
            }
        }
    }

    async fn unknown_intent_turn(
        &self,
        ticket: &mut Ticket,
        predicted: &str,
    ) -> Result<TurnDraft, TurnError> {
        ticket.escalate(EscalationFlag::UnknownIntent);
        self.emit(
            ticket,
            "flow.unknown_intent",
            AuditCategory::Flow,
            AuditOutcome::Rejected,
            &[("predicted", predicted.to_string())],
        );
        let context = self.base_context(ticket);
        let body = self.collaborators.renderer.render(templates::UNKNOWN_INTENT, &context).await?;
        Ok(TurnDraft { body, next_status: TicketStatus::ActionRequired })
    }

    /// Terminal branch for a collaborator fault: flag the ticket for a
    /// human, force severity up, and draft the generic system-error reply.
    /// A renderer fault here falls back to hardcoded text; this branch must
    /// always produce something for the gate.
    async fn system_error_turn(&self, ticket: &mut Ticket, fault: &CollaboratorError) -> TurnDraft {
        tracing::error!(
            event_name = "flow.collaborator_fault",
            boundary = fault.boundary.as_str(),
            ticket_id = %ticket.id,
            error = fault.message.as_str(),
            "collaborator failed mid-turn"
        );
        self.emit(
            ticket,
            "flow.system_error",
            AuditCategory::System,
            AuditOutcome::Failed,
            &[("boundary", fault.boundary.as_str().to_string()), ("error", fault.message.clone())],
        );
        ticket.escalate(EscalationFlag::SystemError);
        ticket.severity = Severity::High;

        let context = self.base_context(ticket);
        let body = match self.collaborators.renderer.render(templates::SYSTEM_ERROR, &context).await
        {
            Ok(body) => body,
            Err(error) => {
                tracing::error!(
                    event_name = "flow.system_error_template_failed",
                    ticket_id = %ticket.id,
                    error = %error,
                    "system-error template unavailable, using fallback text"
                );
                SYSTEM_ERROR_FALLBACK.to_string()
            }
        };
        TurnDraft { body, next_status: TicketStatus::ActionRequired }
    }

    /// Compliance gate. Every drafted body passes through here, whichever
    /// branch produced it. A gate fault is treated as a failed vet: when the
    /// safety check cannot run, the safe outcome is to withhold the draft.
    async fn gate(
        &self,
        ticket: &mut Ticket,
        draft: TurnDraft,
    ) -> Result<OutboundResponse, EngineError> {
        let verdict = match self.collaborators.compliance.vet(&draft.body).await {
            Ok(verdict) => verdict,
            Err(fault) => {
                tracing::error!(
                    event_name = "flow.compliance_fault",
                    ticket_id = %ticket.id,
                    error = fault.message.as_str(),
                    "compliance checker failed, withholding draft"
                );
                Verdict::Fail
            }
        };

        match verdict {
            Verdict::Pass => {
                ticket.transition_to(draft.next_status)?;
                Ok(OutboundResponse {
                    ticket_id: ticket.id.clone(),
                    status: ticket.status,
                    disposition: ResponseDisposition::Reply,
                    body: draft.body,
                })
            }
            Verdict::Fail => {
                self.emit(
                    ticket,
                    "flow.compliance_blocked",
                    AuditCategory::Compliance,
                    AuditOutcome::Rejected,
                    &[],
                );
                // The draft is retained for a human agent, never sent.
                ticket.retained_draft = Some(draft.body);
                ticket.escalate(EscalationFlag::HumanReview);
                ticket.transition_to(TicketStatus::ActionRequired)?;
                Ok(OutboundResponse {
                    ticket_id: ticket.id.clone(),
                    status: ticket.status,
                    disposition: ResponseDisposition::Escalation,
                    body: ESCALATION_NOTICE.to_string(),
                })
            }
        }
    }

    async fn detect_mood(&self, text: &str) -> Result<Mood, CollaboratorError> {
        let classification = self.collaborators.classifier.classify(text).await?;
        Ok(self.overrides.apply(text, classification.mood).mood)
    }

    fn final_reply_template(&self, intent: &str) -> String {
        let specific = templates::final_reply_for(intent);
        if self.collaborators.renderer.has_template(&specific) {
            specific
        } else {
            templates::FINAL_REPLY.to_string()
        }
    }

    fn base_context(&self, ticket: &Ticket) -> RecordFields {
        let mut context = RecordFields::new();
        context.insert(
            "customer_name".to_string(),
            Value::String(display_name(&ticket.customer_id.0)),
        );
        context.insert("customer_id".to_string(), Value::String(ticket.customer_id.0.clone()));
        context.insert("ticket_id".to_string(), Value::String(ticket.id.0.clone()));
        context.insert("mood".to_string(), Value::String(ticket.mood.as_str().to_string()));
        context
    }

    fn emit(
        &self,
        ticket: &Ticket,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: &[(&str, String)],
    ) {
        let mut event = AuditEvent::new(
            Some(ticket.id.clone()),
            Some(ticket.customer_id.clone()),
            event_type,
            category,
            "flow-orchestrator",
            outcome,
        );
        for (key, value) in metadata {
            event = event.with_metadata(*key, value.clone());
        }
        self.audit.emit(event);
    }
}

fn parse_ticket_ref(raw: &str) -> Result<TicketId, EngineError> {
    let trimmed = raw.trim();
    if Uuid::parse_str(trimmed).is_err() {
        return Err(EngineError::MalformedTicketReference(raw.to_string()));
    }
    Ok(TicketId(trimmed.to_string()))
}

/// Best-effort display name from the customer id, e.g.
/// `jane.doe@example.com` -> `Jane Doe`.
fn display_name(customer_id: &str) -> String {
    let local = customer_id.split('@').next().unwrap_or(customer_id);
    let words: Vec<String> = local
        .split(['.', '_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        customer_id.to_string()
    } else {
        words.join(" ")
    }
}

fn join_fields(fields: &[FieldName]) -> String {
    fields.iter().map(FieldName::as_str).collect::<Vec<_>>().join(",")
}

fn fields_value(fields: &BTreeMap<FieldName, String>) -> Value {
    let mut map = RecordFields::new();
    for (field, value) in fields {
        map.insert(field.0.clone(), Value::String(value.clone()));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::RwLock;

    use crate::audit::InMemoryAuditSink;
    use crate::domain::message::{InboundMessage, ResponseDisposition};
    use crate::domain::mood::{Mood, Severity};
    use crate::domain::ticket::{CustomerId, EscalationFlag, Ticket, TicketId, TicketStatus};
    use crate::flow::collaborators::{
        Boundary, Classification, Classifier, CollaboratorError, ComplianceChecker, DataSource,
        EntityExtractor, FaqMatch, KnowledgeBase, LookupOutcome, RecordFields, RenderError,
        TemplateRenderer, Verdict,
    };
    use crate::flow::store::{StoreError, TicketStore};
    use crate::schema::{FieldName, IntentSchema, IntentSpec};

    use super::{Collaborators, EngineError, FlowOrchestrator};

    #[derive(Default)]
    struct MapStore {
        tickets: RwLock<HashMap<String, Ticket>>,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl TicketStore for MapStore {
        async fn find_open_for_customer(
            &self,
            customer_id: &CustomerId,
        ) -> Result<Option<Ticket>, StoreError> {
            let tickets = self.tickets.read().await;
            Ok(tickets
                .values()
                .find(|ticket| ticket.customer_id == *customer_id && ticket.is_open())
                .cloned())
        }

        async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
            let tickets = self.tickets.read().await;
            Ok(tickets.get(&id.0).cloned())
        }

        async fn save(&self, ticket: &Ticket) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            let mut tickets = self.tickets.write().await;
            tickets.insert(ticket.id.0.clone(), ticket.clone());
            Ok(())
        }
    }

    struct StubClassifier {
        intent: &'static str,
        mood: Mood,
        fail: bool,
    }

    impl StubClassifier {
        fn intent(intent: &'static str) -> Self {
            Self { intent, mood: Mood::Neutral, fail: false }
        }

        fn with_mood(mut self, mood: Mood) -> Self {
            self.mood = mood;
            self
        }

        fn failing() -> Self {
            Self { intent: "order_status", mood: Mood::Neutral, fail: true }
        }
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification, CollaboratorError> {
            if self.fail {
                return Err(CollaboratorError::new(Boundary::Classifier, "model unavailable"));
            }
            Ok(Classification {
                intent: self.intent.to_string(),
                intent_confidence: 0.9,
                mood: self.mood,
                mood_confidence: 0.8,
            })
        }
    }

    #[derive(Default)]
    struct MapExtractor {
        yields: BTreeMap<FieldName, String>,
        calls: AtomicUsize,
    }

    impl MapExtractor {
        fn yielding(pairs: &[(&str, &str)]) -> Self {
            Self {
                yields: pairs
                    .iter()
                    .map(|(name, value)| (FieldName::new(*name), (*value).to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EntityExtractor for MapExtractor {
        /// Yields a configured value only when the message text actually
        /// mentions it, mimicking extraction from the latest message.
        async fn extract(
            &self,
            text: &str,
            fields: &[FieldName],
        ) -> Result<BTreeMap<FieldName, String>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .yields
                .iter()
                .filter(|(field, value)| fields.contains(field) && text.contains(value.as_str()))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect())
        }
    }

    struct ScriptedKb {
        hit: Option<FaqMatch>,
    }

    impl ScriptedKb {
        fn miss() -> Self {
            Self { hit: None }
        }

        fn scoring(score: f32) -> Self {
            Self {
                hit: Some(FaqMatch {
                    entry_id: "returns".to_string(),
                    answer: "Returns are free within 30 days.".to_string(),
                    score,
                }),
            }
        }
    }

    #[async_trait]
    impl KnowledgeBase for ScriptedKb {
        async fn best_match(&self, _question: &str) -> Result<Option<FaqMatch>, CollaboratorError> {
            Ok(self.hit.clone())
        }
    }

    struct StubDataSource {
        outcome: LookupOutcome,
        calls: AtomicUsize,
    }

    impl StubDataSource {
        fn found(pairs: &[(&str, &str)]) -> Self {
            let mut record = RecordFields::new();
            for (key, value) in pairs {
                record.insert((*key).to_string(), Value::String((*value).to_string()));
            }
            Self { outcome: LookupOutcome::Found(record), calls: AtomicUsize::new(0) }
        }

        fn with(outcome: LookupOutcome) -> Self {
            Self { outcome, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl DataSource for StubDataSource {
        async fn lookup(
            &self,
            _intent: &str,
            _fields: &BTreeMap<FieldName, String>,
        ) -> Result<LookupOutcome, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    /// Renders `<template>|<sorted context keys>` so tests can assert which
    /// template a branch selected without real template files.
    struct EchoRenderer {
        known: Vec<String>,
        fail: bool,
    }

    impl EchoRenderer {
        fn new() -> Self {
            Self { known: Vec::new(), fail: false }
        }

        fn knowing(names: &[&str]) -> Self {
            Self { known: names.iter().map(|name| (*name).to_string()).collect(), fail: false }
        }

        fn failing() -> Self {
            Self { known: Vec::new(), fail: true }
        }
    }

    #[async_trait]
    impl TemplateRenderer for EchoRenderer {
        async fn render(
            &self,
            template: &str,
            context: &RecordFields,
        ) -> Result<String, RenderError> {
            if self.fail {
                return Err(RenderError::Failed {
                    template: template.to_string(),
                    message: "templates directory missing".to_string(),
                });
            }
            let keys: Vec<&str> = context.keys().map(String::as_str).collect();
            Ok(format!("{template}|{}", keys.join(",")))
        }

        fn has_template(&self, template: &str) -> bool {
            self.known.iter().any(|name| name == template)
        }
    }

    struct StubCompliance {
        verdict: Verdict,
        fail: bool,
    }

    impl StubCompliance {
        fn passing() -> Self {
            Self { verdict: Verdict::Pass, fail: false }
        }

        fn rejecting() -> Self {
            Self { verdict: Verdict::Fail, fail: false }
        }

        fn faulting() -> Self {
            Self { verdict: Verdict::Pass, fail: true }
        }
    }

    #[async_trait]
    impl ComplianceChecker for StubCompliance {
        async fn vet(&self, _text: &str) -> Result<Verdict, CollaboratorError> {
            if self.fail {
                return Err(CollaboratorError::new(Boundary::Compliance, "vetting unavailable"));
            }
            Ok(self.verdict)
        }
    }

    fn schema() -> IntentSchema {
        let mut intents = BTreeMap::new();
        intents.insert(
            "order_status".to_string(),
            IntentSpec { required_fields: vec![FieldName::new("order_id")], description: None },
        );
        intents.insert(
            "password_reset".to_string(),
            IntentSpec { required_fields: vec![FieldName::new("email")], description: None },
        );
        IntentSchema::new(intents).expect("test schema")
    }

    struct Fixture {
        store: Arc<MapStore>,
        orchestrator: FlowOrchestrator,
        data_source: Arc<StubDataSource>,
        extractor: Arc<MapExtractor>,
    }

    fn fixture(
        classifier: StubClassifier,
        kb: ScriptedKb,
        extractor: MapExtractor,
        data_source: StubDataSource,
        renderer: EchoRenderer,
        compliance: StubCompliance,
    ) -> Fixture {
        let store = Arc::new(MapStore::default());
        let data_source = Arc::new(data_source);
        let extractor = Arc::new(extractor);
        let collaborators = Collaborators {
            classifier: Arc::new(classifier),
            extractor: Arc::clone(&extractor) as Arc<dyn EntityExtractor>,
            knowledge_base: Arc::new(kb),
            data_source: Arc::clone(&data_source) as Arc<dyn DataSource>,
            renderer: Arc::new(renderer),
            compliance: Arc::new(compliance),
        };
        let orchestrator =
            FlowOrchestrator::new(Arc::clone(&store) as Arc<dyn TicketStore>, collaborators, schema());
        Fixture { store, orchestrator, data_source, extractor }
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_side_effects() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let error = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "   "))
            .await
            .expect_err("whitespace-only text must be rejected");

        assert!(matches!(error, EngineError::EmptyInput));
        assert_eq!(fx.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_ticket_reference_is_rejected_before_any_write() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let error = fx
            .orchestrator
            .handle(
                InboundMessage::new("bob@example.com", "Where is my order?")
                    .with_ticket_ref("not-a-uuid"),
            )
            .await
            .expect_err("garbage reference must be rejected");

        assert!(matches!(error, EngineError::MalformedTicketReference(_)));
        assert_eq!(fx.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_turn_with_missing_fields_parks_the_ticket() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "Where is my order?"))
            .await
            .expect("turn should succeed");

        assert_eq!(response.status, TicketStatus::PendingCustomer);
        assert!(response.body.starts_with("request_info|"));
        assert!(response.body.contains("missing_fields"));

        let saved = fx
            .store
            .find_open_for_customer(&CustomerId("bob@example.com".to_string()))
            .await
            .expect("store read")
            .expect("ticket persisted");
        assert_eq!(saved.intent.as_deref(), Some("order_status"));
        assert_eq!(saved.turn_count, 1);
        assert_eq!(fx.data_source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn follow_up_supplying_the_missing_field_resolves_the_ticket() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::yielding(&[("order_id", "1001")]),
            StubDataSource::found(&[("order_id", "1001"), ("status", "Shipped")]),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        fx.orchestrator
            .handle(InboundMessage::new("bob@example.com", "Where is my order?"))
            .await
            .expect("first turn");
        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "It is #1001"))
            .await
            .expect("second turn");

        assert_eq!(response.status, TicketStatus::Resolved);
        assert!(response.body.starts_with("final_reply|"));
        assert!(response.body.contains("record"));

        let saved = fx
            .store
            .find_by_id(&response.ticket_id)
            .await
            .expect("store read")
            .expect("ticket persisted");
        assert_eq!(saved.status, TicketStatus::Resolved);
        assert_eq!(
            saved.known_fields.get(&FieldName::new("order_id")).map(String::as_str),
            Some("1001")
        );
        assert_eq!(saved.turn_count, 2);
    }

    #[tokio::test]
    async fn both_turns_attach_to_one_ticket_not_two() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let first = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "Where is my order?"))
            .await
            .expect("first turn");
        let second = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "Any update?"))
            .await
            .expect("second turn");

        assert_eq!(first.ticket_id, second.ticket_id);
        let tickets = fx.store.tickets.read().await;
        assert_eq!(tickets.len(), 1);
    }

    #[tokio::test]
    async fn faq_match_resolves_without_locking_intent_or_touching_data_source() {
        let fx = fixture(
            StubClassifier::intent("order_status").with_mood(Mood::Happy),
            ScriptedKb::scoring(0.82),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("alice@example.com", "What is your return policy?"))
            .await
            .expect("faq turn");

        assert_eq!(response.status, TicketStatus::Resolved);
        assert!(response.body.starts_with("faq_reply|"));
        assert!(response.body.contains("answer"));

        let saved = fx
            .store
            .find_by_id(&response.ticket_id)
            .await
            .expect("store read")
            .expect("ticket persisted");
        assert!(saved.intent.is_none());
        assert_eq!(saved.mood, Mood::Happy);
        assert_eq!(fx.data_source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn faq_threshold_is_inclusive_at_exactly_060() {
        let hit = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::scoring(0.60),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );
        let response = hit
            .orchestrator
            .handle(InboundMessage::new("alice@example.com", "Return policy?"))
            .await
            .expect("boundary turn");
        assert!(response.body.starts_with("faq_reply|"));

        let miss = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::scoring(0.599),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );
        let response = miss
            .orchestrator
            .handle(InboundMessage::new("alice@example.com", "Return policy?"))
            .await
            .expect("just-below turn");
        assert!(!response.body.starts_with("faq_reply|"), "0.599 must fall through to classification");
    }

    #[tokio::test]
    async fn unknown_intent_escalates_without_extraction() {
        let fx = fixture(
            StubClassifier::intent("unknown"),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("dave@example.com", "How do I fly to Mars?"))
            .await
            .expect("unknown-intent turn");

        assert_eq!(response.status, TicketStatus::ActionRequired);
        assert!(response.body.starts_with("unknown_intent|"));

        let saved = fx
            .store
            .find_by_id(&response.ticket_id)
            .await
            .expect("store read")
            .expect("ticket persisted");
        assert_eq!(saved.escalation, Some(EscalationFlag::UnknownIntent));
        assert!(saved.intent.is_none(), "the reserved unknown value must never lock");
        assert_eq!(fx.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn locked_intent_survives_a_conflicting_later_prediction() {
        let fx = fixture(
            StubClassifier::intent("password_reset"),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let mut ticket = Ticket::open(CustomerId("bob@example.com".to_string()));
        ticket.lock_intent("order_status");
        ticket.turn_count = 1;
        fx.store.save(&ticket).await.expect("seed ticket");
        fx.store.saves.store(0, Ordering::SeqCst);

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "Actually, reset my password too"))
            .await
            .expect("turn");

        let saved =
            fx.store.find_by_id(&response.ticket_id).await.expect("read").expect("persisted");
        assert_eq!(saved.intent.as_deref(), Some("order_status"));
        assert!(response.body.starts_with("request_info|"), "order_status still needs order_id");
    }

    #[tokio::test]
    async fn known_field_is_not_regressed_by_a_later_extraction() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::yielding(&[("order_id", "9999")]),
            StubDataSource::found(&[("order_id", "1001"), ("status", "Shipped")]),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let mut ticket = Ticket::open(CustomerId("bob@example.com".to_string()));
        ticket.lock_intent("order_status");
        ticket.known_fields.insert(FieldName::new("order_id"), "1001".to_string());
        ticket.turn_count = 1;
        fx.store.save(&ticket).await.expect("seed ticket");

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "it was 9999 maybe?"))
            .await
            .expect("turn");

        let saved =
            fx.store.find_by_id(&response.ticket_id).await.expect("read").expect("persisted");
        assert_eq!(
            saved.known_fields.get(&FieldName::new("order_id")).map(String::as_str),
            Some("1001")
        );
    }

    #[tokio::test]
    async fn not_found_record_keeps_the_ticket_open_for_correction() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::yielding(&[("order_id", "99999")]),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("dave@example.com", "Where is order 99999?"))
            .await
            .expect("turn");

        assert_eq!(response.status, TicketStatus::ActionRequired);
        assert!(response.body.starts_with("invalid_data|"));
        let saved =
            fx.store.find_by_id(&response.ticket_id).await.expect("read").expect("persisted");
        assert!(saved.is_open());
        assert!(saved.escalation.is_none(), "data corrections are not escalations");
    }

    #[tokio::test]
    async fn per_intent_final_template_is_preferred_when_present() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::yielding(&[("order_id", "1001")]),
            StubDataSource::found(&[("status", "Shipped")]),
            EchoRenderer::knowing(&["final_order_status"]),
            StubCompliance::passing(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "Order #1001 status?"))
            .await
            .expect("turn");

        assert!(response.body.starts_with("final_order_status|"));
    }

    #[tokio::test]
    async fn compliance_failure_withholds_the_draft_and_flags_the_ticket() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::yielding(&[("order_id", "1001")]),
            StubDataSource::found(&[("status", "Shipped")]),
            EchoRenderer::new(),
            StubCompliance::rejecting(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "Order #1001 status?"))
            .await
            .expect("turn");

        assert_eq!(response.disposition, ResponseDisposition::Escalation);
        assert!(!response.body.starts_with("final_reply|"), "draft must not reach the caller");
        assert_eq!(response.status, TicketStatus::ActionRequired);

        let saved =
            fx.store.find_by_id(&response.ticket_id).await.expect("read").expect("persisted");
        assert_eq!(saved.escalation, Some(EscalationFlag::HumanReview));
        let retained = saved.retained_draft.as_deref().expect("draft retained for a human");
        assert!(retained.starts_with("final_reply|"));
        assert!(retained.contains("record"));
    }

    #[tokio::test]
    async fn classifier_fault_becomes_a_gated_system_error_reply() {
        let fx = fixture(
            StubClassifier::failing(),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );
        let audit = InMemoryAuditSink::default();
        let orchestrator = fx.orchestrator.with_audit_sink(Arc::new(audit.clone()));

        let response = orchestrator
            .handle(InboundMessage::new("bob@example.com", "Where is my order?"))
            .await
            .expect("fault must not surface as a crash");

        assert_eq!(response.status, TicketStatus::ActionRequired);
        assert_eq!(response.disposition, ResponseDisposition::Reply);
        assert!(response.body.starts_with("system_error|"));

        let saved =
            fx.store.find_by_id(&response.ticket_id).await.expect("read").expect("persisted");
        assert_eq!(saved.escalation, Some(EscalationFlag::SystemError));
        assert_eq!(saved.severity, Severity::High);
        assert!(audit
            .events()
            .iter()
            .any(|event| event.event_type == "flow.system_error"));
    }

    #[tokio::test]
    async fn renderer_fault_falls_back_to_hardcoded_system_error_text() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::failing(),
            StubCompliance::passing(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "Where is my order?"))
            .await
            .expect("turn must still complete");

        assert_eq!(response.status, TicketStatus::ActionRequired);
        assert!(response.body.contains("unexpected problem"));

        let saved =
            fx.store.find_by_id(&response.ticket_id).await.expect("read").expect("persisted");
        assert_eq!(saved.escalation, Some(EscalationFlag::SystemError));
    }

    #[tokio::test]
    async fn mood_override_corrects_a_false_happy_prediction() {
        let fx = fixture(
            StubClassifier::intent("order_status").with_mood(Mood::Happy),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "I am not happy, where is my order?"))
            .await
            .expect("turn");

        let saved =
            fx.store.find_by_id(&response.ticket_id).await.expect("read").expect("persisted");
        assert_eq!(saved.mood, Mood::Angry);
        assert_eq!(saved.severity, Severity::High);
    }

    #[tokio::test]
    async fn compliance_fault_withholds_the_draft_like_a_failed_vet() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::yielding(&[("order_id", "1001")]),
            StubDataSource::found(&[("status", "Shipped")]),
            EchoRenderer::new(),
            StubCompliance::faulting(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "Order #1001 status?"))
            .await
            .expect("gate fault must not crash the turn");

        assert_eq!(response.disposition, ResponseDisposition::Escalation);
        let saved =
            fx.store.find_by_id(&response.ticket_id).await.expect("read").expect("persisted");
        assert_eq!(saved.escalation, Some(EscalationFlag::HumanReview));
        assert!(saved.retained_draft.is_some());
    }

    #[tokio::test]
    async fn ticket_history_records_the_full_exchange() {
        let fx = fixture(
            StubClassifier::intent("order_status"),
            ScriptedKb::miss(),
            MapExtractor::default(),
            StubDataSource::with(LookupOutcome::NotFound),
            EchoRenderer::new(),
            StubCompliance::passing(),
        );

        let response = fx
            .orchestrator
            .handle(InboundMessage::new("bob@example.com", "Where is my order?"))
            .await
            .expect("turn");

        let saved =
            fx.store.find_by_id(&response.ticket_id).await.expect("read").expect("persisted");
        assert_eq!(saved.history.len(), 2);
        assert_eq!(saved.history[0].text, "Where is my order?");
        assert_eq!(saved.history[1].text, response.body);
    }
}
