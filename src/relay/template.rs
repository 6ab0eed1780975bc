//! `${name}` placeholder substitution

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

use super::lookup::ValueSource;

/// Text substituted for placeholders the source could not answer
pub const UNRESOLVED: &str = "(???)";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

/// One or more placeholders had no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingVariables {
    /// Unresolved names in order of first appearance
    pub names: Vec<String>,
    /// The template with unresolved placeholders shown as `(???)`
    pub partial: String,
}

/// Placeholder names in order of first appearance, without duplicates
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        if let Some(name) = caps.get(1).map(|m| m.as_str()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Substitute every placeholder in `template` with a value from `source`.
///
/// Each distinct name is looked up once. Substituted text is never scanned
/// again, so values containing `${...}` come through literally.
pub fn render(template: &str, source: &dyn ValueSource) -> Result<String, MissingVariables> {
    let mut values: HashMap<&str, Option<String>> = HashMap::new();
    let mut missing = Vec::new();

    for name in placeholders(template) {
        let value = source.lookup(name);
        if value.is_none() {
            missing.push(name.to_string());
        }
        values.insert(name, value);
    }

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        values
            .get(&caps[1])
            .and_then(|v| v.clone())
            .unwrap_or_else(|| UNRESOLVED.to_string())
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(MissingVariables {
            names: missing,
            partial: rendered.into_owned(),
        })
    }
}
