use std::fs;
use std::path::Path;

use crate::commands::CommandResult;
use maildesk_core::config::{AppConfig, LoadOptions};

const DEMO_INTENT_SCHEMA: &str = include_str!("../../../../config/intent_schema.json");
const DEMO_KNOWLEDGE_BASE: &str = include_str!("../../../../config/knowledge_base.json");
const DEMO_DATASOURCE: &str = include_str!("../../../../config/datasource.json");

/// Write the demo data files to the configured paths. Existing files are
/// left alone so a seed never clobbers operator edits.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let targets = [
        (&config.paths.intent_schema, DEMO_INTENT_SCHEMA, "intent schema"),
        (&config.paths.knowledge_base, DEMO_KNOWLEDGE_BASE, "knowledge base"),
        (&config.paths.datasource, DEMO_DATASOURCE, "data source"),
    ];

    let mut written = Vec::new();
    let mut skipped = Vec::new();
    for (path, contents, label) in targets {
        match write_if_absent(path, contents) {
            Ok(true) => written.push(label),
            Ok(false) => skipped.push(label),
            Err(error) => {
                return CommandResult::failure(
                    "seed",
                    "io",
                    format!("could not write {label} to `{}`: {error}", path.display()),
                    4,
                );
            }
        }
    }

    CommandResult::success(
        "seed",
        format!("written: [{}], already present: [{}]", written.join(", "), skipped.join(", ")),
    )
}

fn write_if_absent(path: &Path, contents: &str) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(true)
}
