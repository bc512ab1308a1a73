//! Collaborator boundaries.
//!
//! Everything the orchestrator consults during a turn — classifier,
//! extractor, knowledge base, data source, renderer, compliance checker —
//! lives behind one of these traits. Implementations are pluggable; the
//! state machine never sees past the seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::mood::Mood;
use crate::schema::FieldName;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    Classifier,
    Extractor,
    KnowledgeBase,
    DataSource,
    Renderer,
    Compliance,
}

impl Boundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classifier => "classifier",
            Self::Extractor => "extractor",
            Self::KnowledgeBase => "knowledge_base",
            Self::DataSource => "data_source",
            Self::Renderer => "renderer",
            Self::Compliance => "compliance",
        }
    }
}

impl std::fmt::Display for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unexpected failure inside a collaborator. Caught at the orchestrator
/// boundary and converted into the system-error branch; never re-raised to
/// the caller as a crash.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{boundary} boundary failure: {message}")]
pub struct CollaboratorError {
    pub boundary: Boundary,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(boundary: Boundary, message: impl Into<String>) -> Self {
        Self { boundary, message: message.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub intent: String,
    pub intent_confidence: f32,
    pub mood: Mood,
    pub mood_confidence: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FaqMatch {
    pub entry_id: String,
    pub answer: String,
    pub score: f32,
}

/// Open record shape shared by data-source results and render contexts;
/// the core treats both as opaque key/value data.
pub type RecordFields = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum LookupOutcome {
    Found(RecordFields),
    NotFound,
    /// The supplied key is malformed (e.g. an order id that cannot exist);
    /// the customer must correct input rather than retry.
    InvalidKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("template `{template}` references missing variable `{variable}`")]
    MissingVariable { template: String, variable: String },
    #[error("template `{template}` failed to render: {message}")]
    Failed { template: String, message: String },
}

impl From<RenderError> for CollaboratorError {
    fn from(error: RenderError) -> Self {
        Self::new(Boundary::Renderer, error.to_string())
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError>;
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Extract whichever of `fields` the text yields; absent keys mean not
    /// found. Implementations must not invent values for missing fields.
    async fn extract(
        &self,
        text: &str,
        fields: &[FieldName],
    ) -> Result<BTreeMap<FieldName, String>, CollaboratorError>;
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn best_match(&self, question: &str) -> Result<Option<FaqMatch>, CollaboratorError>;
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn lookup(
        &self,
        intent: &str,
        fields: &BTreeMap<FieldName, String>,
    ) -> Result<LookupOutcome, CollaboratorError>;
}

#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(&self, template: &str, context: &RecordFields) -> Result<String, RenderError>;

    fn has_template(&self, template: &str) -> bool;
}

#[async_trait]
pub trait ComplianceChecker: Send + Sync {
    async fn vet(&self, text: &str) -> Result<Verdict, CollaboratorError>;
}
