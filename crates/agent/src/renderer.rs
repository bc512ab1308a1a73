use std::error::Error as _;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tera::{Context, Tera};

use maildesk_core::{RecordFields, RenderError, TemplateRenderer};

/// Reply templates shipped with the engine; used when no templates
/// directory is configured (tests, the offline simulator).
const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    ("faq_reply", include_str!("../../../templates/faq_reply.txt")),
    ("request_info", include_str!("../../../templates/request_info.txt")),
    ("unknown_intent", include_str!("../../../templates/unknown_intent.txt")),
    ("invalid_data", include_str!("../../../templates/invalid_data.txt")),
    ("system_error", include_str!("../../../templates/system_error.txt")),
    ("final_reply", include_str!("../../../templates/final_reply.txt")),
    ("final_order_status", include_str!("../../../templates/final_order_status.txt")),
];

/// Tera-backed renderer. Templates loaded from a directory keep their file
/// extension in the registry, so lookups try the bare name first and fall
/// back to `<name>.txt`. Undefined context variables are render errors,
/// surfaced as missing-variable failures — callers must supply the full
/// enumerated context for a template.
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    pub fn from_dir(dir: &Path) -> Result<Self, tera::Error> {
        let glob = format!("{}/**/*.txt", dir.display());
        let tera = Tera::new(&glob)?;
        Ok(Self { tera })
    }

    pub fn with_embedded_defaults() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(EMBEDDED_TEMPLATES.to_vec())?;
        Ok(Self { tera })
    }

    fn resolve(&self, template: &str) -> Option<String> {
        let mut names = self.tera.get_template_names();
        if names.any(|name| name == template) {
            return Some(template.to_string());
        }
        let with_extension = format!("{template}.txt");
        let mut names = self.tera.get_template_names();
        if names.any(|name| name == with_extension) {
            return Some(with_extension);
        }
        None
    }
}

#[async_trait]
impl TemplateRenderer for TeraRenderer {
    async fn render(&self, template: &str, context: &RecordFields) -> Result<String, RenderError> {
        let Some(resolved) = self.resolve(template) else {
            return Err(RenderError::Failed {
                template: template.to_string(),
                message: "template not registered".to_string(),
            });
        };
        let context = Context::from_serialize(Value::Object(context.clone())).map_err(|error| {
            RenderError::Failed { template: template.to_string(), message: error.to_string() }
        })?;
        self.tera
            .render(&resolved, &context)
            .map(|body| body.trim_end().to_string())
            .map_err(|error| classify_tera_error(template, &error))
    }

    fn has_template(&self, template: &str) -> bool {
        self.resolve(template).is_some()
    }
}

/// Tera reports an undefined variable as a nested "not found in context"
/// error; everything else is a generic render failure.
fn classify_tera_error(template: &str, error: &tera::Error) -> RenderError {
    let mut messages = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        messages.push(inner.to_string());
        source = inner.source();
    }

    for message in &messages {
        if message.contains("not found in context") {
            if let Some(variable) = backticked_fragment(message) {
                return RenderError::MissingVariable {
                    template: template.to_string(),
                    variable,
                };
            }
        }
    }
    RenderError::Failed { template: template.to_string(), message: messages.join(": ") }
}

fn backticked_fragment(message: &str) -> Option<String> {
    let start = message.find('`')? + 1;
    let end = message[start..].find('`')? + start;
    Some(message[start..end].to_string())
}
