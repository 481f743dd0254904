//! Tera template engine wrapper.
//!
//! The launcher script and the property list are rendered from templates
//! compiled into the binary.

use std::sync::Arc;

use tera::{Context, Tera};
use tracing::debug;

use crate::error::AutoupdateError;

/// Property list template name.
pub const AGENT_PLIST: &str = "launchd/agent.plist.tera";

/// Launcher script template name.
pub const UPDATER_SCRIPT: &str = "launchd/updater.sh.tera";

const BUILTIN_TEMPLATES: [(&str, &str); 2] = [
    (
        AGENT_PLIST,
        include_str!("../../templates/launchd/agent.plist.tera"),
    ),
    (
        UPDATER_SCRIPT,
        include_str!("../../templates/launchd/updater.sh.tera"),
    ),
];

/// Template engine for rendering the agent's artifacts.
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<Tera>,
}

impl TemplateEngine {
    /// Create an engine loaded with the built-in templates.
    pub fn new() -> Result<Self, AutoupdateError> {
        let mut tera = Tera::default();
        // Callers escape values for the target format
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(BUILTIN_TEMPLATES)
            .map_err(|e| AutoupdateError::Template {
                message: format!("Failed to load built-in templates: {}", e),
            })?;

        debug!(
            count = tera.get_template_names().count(),
            "Template engine initialized"
        );

        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    /// Render a template with the given context.
    ///
    /// The output always ends with exactly one newline.
    pub fn render(
        &self,
        template_name: &str,
        context: &serde_json::Value,
    ) -> Result<String, AutoupdateError> {
        let tera_context = Context::from_serialize(context).map_err(|e| AutoupdateError::Template {
            message: format!("Invalid template context: {}", e),
        })?;

        let rendered = self
            .tera
            .render(template_name, &tera_context)
            .map_err(|e| AutoupdateError::Template {
                message: format!("Failed to render template '{}': {}", template_name, e),
            })?;

        let mut out = rendered.trim_end().to_string();
        out.push('\n');
        Ok(out)
    }

    /// Check if a template exists.
    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}
