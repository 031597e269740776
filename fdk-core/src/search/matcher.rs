//! Recursive scalar-leaf matching over JSON-shaped data

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// How the query is compared against one scalar leaf
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Contains,
    Equals,
    StartsWith,
    EndsWith,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Contains => "contains",
            MatchMode::Equals => "equals",
            MatchMode::StartsWith => "starts_with",
            MatchMode::EndsWith => "ends_with",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "contains" => Ok(MatchMode::Contains),
            "equals" | "exact" => Ok(MatchMode::Equals),
            "starts_with" | "startswith" => Ok(MatchMode::StartsWith),
            "ends_with" | "endswith" => Ok(MatchMode::EndsWith),
            other => Err(format!(
                "Unknown match mode '{}' (valid: contains, equals, starts_with, ends_with)",
                other
            )),
        }
    }
}

/// One matching scalar leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafMatch {
    pub path: String,
    pub value: String,
}

/// A prepared query
#[derive(Debug, Clone)]
pub struct Matcher {
    needle: String,
    mode: MatchMode,
    case_sensitive: bool,
}

impl Matcher {
    pub fn new(query: &str, mode: MatchMode, case_sensitive: bool) -> Self {
        let needle = if case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };
        Self {
            needle,
            mode,
            case_sensitive,
        }
    }

    /// Test a single string
    pub fn is_match(&self, text: &str) -> bool {
        if self.case_sensitive {
            self.compare(text)
        } else {
            self.compare(&text.to_lowercase())
        }
    }

    fn compare(&self, text: &str) -> bool {
        match self.mode {
            MatchMode::Contains => text.contains(&self.needle),
            MatchMode::Equals => text == self.needle,
            MatchMode::StartsWith => text.starts_with(&self.needle),
            MatchMode::EndsWith => text.ends_with(&self.needle),
        }
    }

    /// Depth-first walk of `value`, collecting every matching scalar leaf
    ///
    /// Strings, numbers and booleans are leaves; nulls are skipped.
    pub fn collect(&self, value: &Value, path: &str, out: &mut Vec<LeafMatch>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    self.collect(child, &child_path, out);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    self.collect(child, &format!("{path}[{i}]"), out);
                }
            }
            Value::String(s) => self.push_if_match(s, path, out),
            Value::Number(n) => self.push_if_match(&n.to_string(), path, out),
            Value::Bool(b) => self.push_if_match(if *b { "true" } else { "false" }, path, out),
            Value::Null => {}
        }
    }

    fn push_if_match(&self, text: &str, path: &str, out: &mut Vec<LeafMatch>) {
        if self.is_match(text) {
            out.push(LeafMatch {
                path: path.to_string(),
                value: text.to_string(),
            });
        }
    }
}
