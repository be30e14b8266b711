use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Field name -> ordered list of human-readable violation messages.
///
/// Backed by a `BTreeMap`, so fields serialize alphabetically rather than
/// in rule-declaration order. Clients key into the map by field name, and
/// the alphabetical order is deterministic across runs, which
/// rule-declaration order would not make any easier to rely on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorMap(pub BTreeMap<String, Vec<String>>);

impl ErrorMap {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut map = Self::default();
        map.push(field, message);
        map
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One constraint in a per-field rule list.
///
/// `Min`/`Max` follow the usual convention: a character-count bound for
/// string fields and a value bound for integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Field must be present and non-empty.
    Required,
    /// Field is optional; remaining rules apply only when the key is sent.
    Sometimes,
    /// Must be a JSON string.
    Str,
    /// Must be a JSON integer.
    Integer,
    Min(i64),
    Max(i64),
    /// Must look like an email address.
    Email,
    /// Must equal the `<field>_confirmation` sibling.
    Confirmed,
    /// Must be one of the listed values.
    In(&'static [&'static str]),
}

/// Per-endpoint rule set: `(field, rules)` pairs.
pub type RuleSet = [(&'static str, &'static [Rule])];

/// Checks a raw JSON body against a declared rule set. Returns the full
/// error map on failure so the caller can reject before touching the store.
pub fn validate(body: &Value, rules: &RuleSet) -> Result<(), ErrorMap> {
    let empty = Map::new();
    let fields = body.as_object().unwrap_or(&empty);
    let mut errors = ErrorMap::default();

    for (field, field_rules) in rules {
        check_field(fields, field, field_rules, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_field(fields: &Map<String, Value>, field: &str, rules: &[Rule], errors: &mut ErrorMap) {
    let sometimes = rules.contains(&Rule::Sometimes);
    let required = rules.contains(&Rule::Required);

    let value = match fields.get(field) {
        Some(v) => v,
        None => {
            // A `sometimes` field that was never sent is skipped entirely.
            if required && !sometimes {
                errors.push(field, format!("The {field} field is required."));
            }
            return;
        }
    };

    // A blank string counts as absent, the way Laravel's TrimStrings and
    // ConvertEmptyStringsToNull middleware treat it.
    if value.is_null() || value.as_str().map(str::trim) == Some("") {
        if required {
            errors.push(field, format!("The {field} field is required."));
        }
        return;
    }

    for rule in rules {
        match rule {
            Rule::Required | Rule::Sometimes => {}
            Rule::Str => {
                if !value.is_string() {
                    errors.push(field, format!("The {field} must be a string."));
                }
            }
            Rule::Integer => {
                if value.as_i64().is_none() {
                    errors.push(field, format!("The {field} must be an integer."));
                }
            }
            Rule::Min(n) => {
                if let Some(s) = value.as_str() {
                    if (s.chars().count() as i64) < *n {
                        errors.push(field, format!("The {field} must be at least {n} characters."));
                    }
                } else if let Some(i) = value.as_i64() {
                    if i < *n {
                        errors.push(field, format!("The {field} must be at least {n}."));
                    }
                }
            }
            Rule::Max(n) => {
                if let Some(s) = value.as_str() {
                    if (s.chars().count() as i64) > *n {
                        errors.push(
                            field,
                            format!("The {field} must not be greater than {n} characters."),
                        );
                    }
                } else if let Some(i) = value.as_i64() {
                    if i > *n {
                        errors.push(field, format!("The {field} must not be greater than {n}."));
                    }
                }
            }
            Rule::Email => {
                let ok = value.as_str().map(|s| EMAIL_RE.is_match(s)).unwrap_or(false);
                if !ok {
                    errors.push(field, format!("The {field} must be a valid email address."));
                }
            }
            Rule::Confirmed => {
                let confirmation = fields.get(&format!("{field}_confirmation"));
                if confirmation != Some(value) {
                    errors.push(field, format!("The {field} confirmation does not match."));
                }
            }
            Rule::In(options) => {
                let ok = value.as_str().map(|s| options.contains(&s)).unwrap_or(false);
                if !ok {
                    errors.push(field, format!("The selected {field} is invalid."));
                }
            }
        }
    }
}

/// Reads a validated string field, trimmed.
pub fn str_field(body: &Value, field: &str) -> Option<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

pub fn int_field(body: &Value, field: &str) -> Option<i64> {
    body.get(field).and_then(Value::as_i64)
}
