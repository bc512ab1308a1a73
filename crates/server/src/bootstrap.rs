use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use maildesk_agent::{
    FaqIndex, JsonDataSource, LexiconClassifier, PatternExtractor, RuleComplianceChecker,
    TeraRenderer,
};
use maildesk_core::config::{AppConfig, ConfigError, LoadOptions};
use maildesk_core::schema::SchemaError;
use maildesk_core::{Collaborators, FlowOrchestrator, IntentSchema};
use maildesk_db::{connect_with_settings, migrations, DbPool, SqlTicketStore};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<FlowOrchestrator>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("db_pool", &self.db_pool)
            .field("engine", &"<FlowOrchestrator>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Knowledge(#[from] maildesk_agent::KnowledgeError),
    #[error(transparent)]
    Data(#[from] maildesk_agent::DataError),
    #[error("template loading failed: {0}")]
    Templates(String),
    #[error("extractor patterns failed to compile: {0}")]
    Extractor(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let engine = build_engine(&config, db_pool.clone())?;
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        "flow engine assembled"
    );

    Ok(Application { config, db_pool, engine })
}

fn build_engine(
    config: &AppConfig,
    db_pool: DbPool,
) -> Result<Arc<FlowOrchestrator>, BootstrapError> {
    let schema = IntentSchema::from_path(&config.paths.intent_schema)?;
    let knowledge_base = FaqIndex::from_path(&config.paths.knowledge_base)?;
    let data_source = JsonDataSource::from_path(&config.paths.datasource)?;
    let extractor = PatternExtractor::new(data_source.catalog())
        .map_err(|error| BootstrapError::Extractor(error.to_string()))?;

    let renderer = if config.paths.templates_dir.is_dir() {
        TeraRenderer::from_dir(&config.paths.templates_dir)
            .map_err(|error| BootstrapError::Templates(error.to_string()))?
    } else {
        TeraRenderer::with_embedded_defaults()
            .map_err(|error| BootstrapError::Templates(error.to_string()))?
    };

    let collaborators = Collaborators {
        classifier: Arc::new(LexiconClassifier::with_default_anchors(config.engine.intent_floor)),
        extractor: Arc::new(extractor),
        knowledge_base: Arc::new(knowledge_base),
        data_source: Arc::new(data_source),
        renderer: Arc::new(renderer),
        compliance: Arc::new(RuleComplianceChecker::default()),
    };

    let engine = FlowOrchestrator::new(Arc::new(SqlTicketStore::new(db_pool)), collaborators, schema)
        .with_faq_threshold(config.engine.faq_match_threshold);
    Ok(Arc::new(engine))
}
