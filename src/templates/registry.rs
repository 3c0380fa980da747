//! Template registry: resolves a sender address to its template.
//!
//! Built once at startup and shared read-only between message tasks.

use std::collections::HashSet;

use tracing::{debug, error, warn};

use crate::config::TemplateConfig;
use crate::templates::model::Template;

/// Ordered set of sender templates.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    /// Compile every configured template.
    ///
    /// Invalid patterns and duplicate senders are reported but never rejected;
    /// duplicates resolve to whichever entry comes first.
    pub fn from_configs(configs: &[TemplateConfig]) -> Self {
        let mut seen = HashSet::new();
        let mut templates = Vec::with_capacity(configs.len());

        for config in configs {
            let template = Template::from_config(config);

            for pattern in template.invalid_patterns() {
                if let Err(e) = pattern.regex() {
                    error!(
                        template = %template.name(),
                        field = %pattern.field(),
                        error = %e,
                        "Template pattern is invalid; messages for this sender will not be parsed"
                    );
                }
            }

            if !seen.insert(template.sender_email().to_lowercase()) {
                warn!(
                    sender = %template.sender_email(),
                    template = %template.name(),
                    "Duplicate sender in template list; the earlier template wins"
                );
            }

            debug!(
                sender = %template.sender_email(),
                template = %template.name(),
                "Template registered"
            );
            templates.push(template);
        }

        Self { templates }
    }

    /// First template whose sender matches, case-insensitively.
    pub fn resolve(&self, sender_email: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.matches_sender(sender_email))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
