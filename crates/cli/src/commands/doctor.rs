use serde::Serialize;

use maildesk_agent::{FaqIndex, JsonDataSource};
use maildesk_core::config::{AppConfig, LoadOptions};
use maildesk_core::IntentSchema;
use maildesk_db::connect_with_settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('"', "\\\"")
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_intent_schema(&config));
            checks.push(check_knowledge_base(&config));
            checks.push(check_datasource(&config));
            checks.push(check_templates(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in
                ["intent_schema", "knowledge_base", "datasource", "templates", "database_connectivity"]
            {
                checks.push(skipped(name));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    }
}

fn check_intent_schema(config: &AppConfig) -> DoctorCheck {
    match IntentSchema::from_path(&config.paths.intent_schema) {
        Ok(schema) if !schema.is_empty() => DoctorCheck {
            name: "intent_schema",
            status: CheckStatus::Pass,
            details: format!("{} intents declared", schema.intent_names().count()),
        },
        Ok(_) => DoctorCheck {
            name: "intent_schema",
            status: CheckStatus::Fail,
            details: "intent schema declares no intents".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "intent_schema",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_knowledge_base(config: &AppConfig) -> DoctorCheck {
    match FaqIndex::from_path(&config.paths.knowledge_base) {
        Ok(index) if !index.is_empty() => DoctorCheck {
            name: "knowledge_base",
            status: CheckStatus::Pass,
            details: "knowledge base loaded".to_string(),
        },
        Ok(_) => DoctorCheck {
            name: "knowledge_base",
            status: CheckStatus::Fail,
            details: "knowledge base has no entries".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "knowledge_base",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_datasource(config: &AppConfig) -> DoctorCheck {
    match JsonDataSource::from_path(&config.paths.datasource) {
        Ok(_) => DoctorCheck {
            name: "datasource",
            status: CheckStatus::Pass,
            details: "data source loaded".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "datasource",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_templates(config: &AppConfig) -> DoctorCheck {
    if config.paths.templates_dir.is_dir() {
        DoctorCheck {
            name: "templates",
            status: CheckStatus::Pass,
            details: format!("templates directory `{}` found", config.paths.templates_dir.display()),
        }
    } else {
        // Not fatal: the engine falls back to embedded templates.
        DoctorCheck {
            name: "templates",
            status: CheckStatus::Pass,
            details: "templates directory missing; embedded defaults will be used".to_string(),
        }
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await?;
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await?;
        pool.close().await;
        Ok::<(), sqlx::Error>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: "database reachable".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("  [{marker}] {}: {}", check.name, check.details));
    }
    lines.join("\n")
}
