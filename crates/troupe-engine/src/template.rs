//! Template rendering using minijinja.
//!
//! Instructions, agent references and output formats are minijinja templates
//! rendered against a context snapshot:
//!
//! ```text
//! Summarize {{ article }} for {{ audience | default("everyone") }}.
//! {% for point in outline %}- {{ point }}
//! {% endfor %}
//! ```
//!
//! Undefined variables render as empty strings.

use minijinja::{Environment, Value};
use once_cell::sync::Lazy;
use serde_json::Map;

use crate::error::EngineError;

static ENVIRONMENT: Lazy<Environment<'static>> = Lazy::new(Environment::new);

/// Render `template` against `context`.
pub fn render(
  step: &str,
  template: &str,
  context: &Map<String, serde_json::Value>,
) -> Result<String, EngineError> {
  ENVIRONMENT
    .render_str(template, Value::from_serialize(context))
    .map_err(|e| EngineError::Template {
      step: step.to_string(),
      message: e.to_string(),
    })
}
