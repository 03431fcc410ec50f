//! Minijinja template rendering for release announcements.
//!
//! Templates are arbitrary strings (operators can supply their own through
//! `PITBOT_ANNOUNCEMENT_TEMPLATE`), so a fresh [`minijinja::Environment`] is
//! created per render call.

use crate::traits::NotifyError;

/// HTML announcement posted to the chat room.
pub const DEFAULT_ANNOUNCEMENT_TEMPLATE: &str = "Detected new update for {{ title.name }} \
on update channel {{ channel.name }}. <br>\
<strong>Game:</strong> {{ title.name }} [{{ title.key }}]<br>\
<strong>Channel:</strong> {{ channel.name }} [{{ channel.key }}]<br>\
<strong>Time:</strong> {{ time }}<br>\
<a href='{{ manifest_url }}'>Manifest Link</a>";

/// Context data available to announcement templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnnouncementContext {
    pub title: NamedKey,
    pub channel: NamedKey,
    /// `YYYY-MM-DD HH:MM:SS GMT`.
    pub time: String,
    pub manifest_url: String,
    pub marker: String,
    pub previous_marker: Option<String>,
    pub package_size_kb: Option<u64>,
}

/// A config key with its display name.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NamedKey {
    pub key: String,
    pub name: String,
}

/// Renders announcement templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        // Typos in operator templates should fail loudly, not render blanks.
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// references a variable the context does not provide.
    pub fn render(
        &self,
        template_str: &str,
        ctx: &AnnouncementContext,
    ) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that a template string parses, without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}
