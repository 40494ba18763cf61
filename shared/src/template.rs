//! Payload template engine
//!
//! Request payloads may embed `{{ object.config.<path> }}` placeholders that
//! are resolved against the edge object's configuration tree before the
//! payload is parsed. Substitution repeats until no placeholder remains, so
//! a resolved value that itself contains `{{` is expanded again. The total
//! number of substitutions is capped to keep that recursion bounded.

use serde_json::Value;
use thiserror::Error;

use crate::defaults;

pub const OPEN_MARKER: &[u8] = b"{{";
pub const CLOSE_MARKER: &[u8] = b"}}";
pub const CONFIG_PREFIX: &str = "object.config.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("begin found but end not found: placeholder at byte {0} is never closed")]
    Unterminated(usize),

    #[error("template not settled after {0} substitutions")]
    TooManySubstitutions(usize),
}

/// Source of configuration values for placeholders
pub trait ConfigLookup {
    /// Resolve a dotted path; `None` when nothing printable lives there
    fn lookup(&self, path: &str) -> Option<String>;
}

/// Configuration trees are plain JSON objects addressed by dotted path
///
/// Strings resolve as-is, numbers and booleans by their JSON text.
impl ConfigLookup for Value {
    fn lookup(&self, path: &str) -> Option<String> {
        let mut node = self;
        for segment in path.split('.') {
            node = node.as_object()?.get(segment)?;
        }
        match node {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Result of running the template engine over a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub payload: Vec<u8>,
    /// True if at least one placeholder was replaced
    pub changed: bool,
}

/// Resolve every placeholder in `payload` using the default substitution cap
pub fn substitute(
    payload: &[u8],
    config: &impl ConfigLookup,
) -> Result<Substitution, TemplateError> {
    substitute_bounded(payload, config, defaults::MAX_SUBSTITUTIONS)
}

/// Resolve every placeholder in `payload`, failing after `max_substitutions`
pub fn substitute_bounded(
    payload: &[u8],
    config: &impl ConfigLookup,
    max_substitutions: usize,
) -> Result<Substitution, TemplateError> {
    let mut current = payload.to_vec();
    let mut count = 0;

    while let Some(begin) = find(&current, OPEN_MARKER, 0) {
        if count == max_substitutions {
            return Err(TemplateError::TooManySubstitutions(max_substitutions));
        }

        let end = find(&current, CLOSE_MARKER, begin + OPEN_MARKER.len())
            .ok_or(TemplateError::Unterminated(begin))?
            + CLOSE_MARKER.len();

        let resolved = resolve_placeholder(&current[begin..end], config);

        let mut next = Vec::with_capacity(current.len() - (end - begin) + resolved.len());
        next.extend_from_slice(&current[..begin]);
        next.extend_from_slice(resolved.as_bytes());
        next.extend_from_slice(&current[end..]);

        current = next;
        count += 1;
    }

    Ok(Substitution {
        payload: current,
        changed: count > 0,
    })
}

/// Turn a full `{{ ... }}` span into its configured value
fn resolve_placeholder(span: &[u8], config: &impl ConfigLookup) -> String {
    let name = String::from_utf8_lossy(span);
    let name = name
        .trim_matches(|c: char| c.is_whitespace() || c == '{' || c == '}')
        .replace(CONFIG_PREFIX, "");

    config.lookup(&name).unwrap_or_default()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}
