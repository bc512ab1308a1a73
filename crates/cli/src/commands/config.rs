use serde_json::json;

use maildesk_core::config::{AppConfig, LoadOptions, LogFormat};

/// Print the effective configuration after all layers (defaults, file,
/// environment) have been applied.
pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let payload = json!({
                "database": {
                    "url": config.database.url,
                    "max_connections": config.database.max_connections,
                    "timeout_secs": config.database.timeout_secs,
                },
                "server": {
                    "bind_address": config.server.bind_address,
                    "port": config.server.port,
                },
                "engine": {
                    "faq_match_threshold": config.engine.faq_match_threshold,
                    "intent_floor": config.engine.intent_floor,
                },
                "paths": {
                    "templates_dir": config.paths.templates_dir.display().to_string(),
                    "intent_schema": config.paths.intent_schema.display().to_string(),
                    "knowledge_base": config.paths.knowledge_base.display().to_string(),
                    "datasource": config.paths.datasource.display().to_string(),
                },
                "logging": {
                    "level": config.logging.level,
                    "format": match config.logging.format {
                        LogFormat::Compact => "compact",
                        LogFormat::Pretty => "pretty",
                        LogFormat::Json => "json",
                    },
                },
            });
            serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"))
        }
        Err(error) => {
            format!("{{\"error\":\"configuration issue: {}\"}}", error.to_string().replace('"', "'"))
        }
    }
}
