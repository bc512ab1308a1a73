//! Deterministic collaborator implementations for the maildesk flow engine.
//!
//! Each module implements one of the core's boundary traits:
//! - **Classifier** (`classifier`) - lexicon intent/mood classification
//! - **Extractor** (`extractor`) - pattern-based entity extraction
//! - **Knowledge base** (`knowledge`) - bag-of-words FAQ retrieval
//! - **Data source** (`datasource`) - JSON-backed order/product/user lookups
//! - **Renderer** (`renderer`) - tera templates with embedded defaults
//! - **Compliance** (`compliance`) - rule-based outbound vetting
//!
//! Everything here is deterministic and offline; swapping in model-backed
//! implementations only means providing other impls of the same traits.

pub mod classifier;
pub mod compliance;
pub mod datasource;
pub mod extractor;
pub mod knowledge;
pub mod renderer;

pub use classifier::{IntentAnchor, LexiconClassifier};
pub use compliance::RuleComplianceChecker;
pub use datasource::{DataError, JsonDataSource};
pub use extractor::{CatalogProduct, PatternExtractor};
pub use knowledge::{FaqEntry, FaqIndex, KnowledgeError};
pub use renderer::TeraRenderer;
