use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::commands::CommandResult;
use maildesk_agent::{
    FaqIndex, JsonDataSource, LexiconClassifier, PatternExtractor, RuleComplianceChecker,
    TeraRenderer,
};
use maildesk_core::config::{AppConfig, LoadOptions};
use maildesk_core::{Collaborators, FlowOrchestrator, InboundMessage, IntentSchema};
use maildesk_db::InMemoryTicketStore;

const DEMO_INTENT_SCHEMA: &str = include_str!("../../../../config/intent_schema.json");
const DEMO_KNOWLEDGE_BASE: &str = include_str!("../../../../config/knowledge_base.json");
const DEMO_DATASOURCE: &str = include_str!("../../../../config/datasource.json");

/// Run a conversation through an offline engine: in-memory ticket store,
/// embedded templates, and the configured (or embedded demo) data files.
/// One JSON line per turn.
pub fn run(customer: &str, texts: &[String]) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let engine = match build_offline_engine(&config) {
        Ok(engine) => engine,
        Err(message) => return CommandResult::failure("simulate", "engine_init", message, 3),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let mut lines = Vec::new();
    for (index, text) in texts.iter().enumerate() {
        let outcome =
            runtime.block_on(engine.handle(InboundMessage::new(customer.to_string(), text)));
        match outcome {
            Ok(response) => {
                let line = json!({
                    "turn": index + 1,
                    "ticket_id": response.ticket_id.0,
                    "status": response.status.as_str(),
                    "disposition": response.disposition,
                    "body": response.body,
                });
                lines.push(
                    serde_json::to_string(&line)
                        .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}")),
                );
            }
            Err(error) => {
                return CommandResult::failure(
                    "simulate",
                    "turn_rejected",
                    format!("turn {} rejected: {error}", index + 1),
                    4,
                );
            }
        }
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn build_offline_engine(config: &AppConfig) -> Result<FlowOrchestrator, String> {
    let schema = load_or_embedded(
        &config.paths.intent_schema,
        DEMO_INTENT_SCHEMA,
        IntentSchema::from_path,
        IntentSchema::from_json_str,
    )?;
    let knowledge_base = load_or_embedded(
        &config.paths.knowledge_base,
        DEMO_KNOWLEDGE_BASE,
        FaqIndex::from_path,
        FaqIndex::from_json_str,
    )?;
    let data_source = load_or_embedded(
        &config.paths.datasource,
        DEMO_DATASOURCE,
        JsonDataSource::from_path,
        JsonDataSource::from_json_str,
    )?;

    let extractor = PatternExtractor::new(data_source.catalog()).map_err(|error| {
        format!("extractor patterns failed to compile: {error}")
    })?;
    let renderer = TeraRenderer::with_embedded_defaults()
        .map_err(|error| format!("embedded templates failed to register: {error}"))?;

    let collaborators = Collaborators {
        classifier: Arc::new(LexiconClassifier::with_default_anchors(config.engine.intent_floor)),
        extractor: Arc::new(extractor),
        knowledge_base: Arc::new(knowledge_base),
        data_source: Arc::new(data_source),
        renderer: Arc::new(renderer),
        compliance: Arc::new(RuleComplianceChecker::default()),
    };

    Ok(FlowOrchestrator::new(Arc::new(InMemoryTicketStore::default()), collaborators, schema)
        .with_faq_threshold(config.engine.faq_match_threshold))
}

fn load_or_embedded<T, E1, E2>(
    path: &Path,
    embedded: &str,
    from_path: impl Fn(&Path) -> Result<T, E1>,
    from_str: impl Fn(&Path, &str) -> Result<T, E2>,
) -> Result<T, String>
where
    E1: std::fmt::Display,
    E2: std::fmt::Display,
{
    if path.exists() {
        from_path(path).map_err(|error| error.to_string())
    } else {
        from_str(Path::new("embedded"), embedded).map_err(|error| error.to_string())
    }
}
