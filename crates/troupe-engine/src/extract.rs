//! Coercion of raw model text into structured values.

use once_cell::sync::Lazy;
use regex::Regex;

static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+\.\s*(.*\S)").unwrap());
static BULLETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*-\s*(.*\S)").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
  #[error("failed to parse json object: {message}")]
  Parse { message: String },
}

/// Extract the items of a numbered list, else of a bulleted list.
///
/// Returns `None` when neither kind of list appears in the text.
pub fn extract_list(text: &str) -> Option<Vec<String>> {
  [&*NUMBERED, &*BULLETED].into_iter().find_map(|pattern| {
    let items: Vec<String> = pattern
      .captures_iter(text)
      .filter_map(|c| c.get(1))
      .map(|m| m.as_str().to_string())
      .collect();
    (!items.is_empty()).then_some(items)
  })
}

/// Parse the span from the first `{` to the last `}` as JSON.
pub fn extract_object(text: &str) -> Result<serde_json::Value, ExtractError> {
  let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
    return Err(ExtractError::Parse {
      message: "no json object found".to_string(),
    });
  };
  if end < start {
    return Err(ExtractError::Parse {
      message: "no json object found".to_string(),
    });
  }

  serde_json::from_str(&text[start..=end]).map_err(|e| ExtractError::Parse {
    message: e.to_string(),
  })
}

/// Keep the text before the first occurrence of `stop`.
pub fn truncate_at_stop<'a>(text: &'a str, stop: Option<&str>) -> &'a str {
  match stop.filter(|s| !s.is_empty()) {
    Some(stop) => text.split(stop).next().unwrap_or(text),
    None => text,
  }
}
