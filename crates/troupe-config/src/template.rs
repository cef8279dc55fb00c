//! Template strings used throughout a workflow document.
//!
//! Agent instructions, step agent references, output formats and `append_to`
//! formats are all minijinja templates rendered against the run's context
//! variables at the moment they are needed.
//!
//! # Examples
//!
//! ```yaml
//! instruction: "Summarize the following article:\n{{ article }}"
//! agent: "{{ active_agent }}"
//! format: "{{ speaker }}: {{ reply }}"
//! ```
//!
//! A template without any `{{ }}` expression renders to itself, so a literal
//! agent name is simply a template with no placeholders.

/// A template string rendered against the context store at run time.
pub type Template = String;
