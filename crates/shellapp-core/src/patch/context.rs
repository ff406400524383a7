//! Values and conditions a patch list is evaluated against

use std::collections::{BTreeMap, BTreeSet};

/// Optional features that guards can test for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Condition {
    /// The manifest declares a custom URL scheme
    Scheme,
    /// The private configuration carries crash-reporting credentials
    CrashReporting,
}

/// How interpolated values are escaped for the target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escape {
    #[default]
    None,
    /// XML text and attribute values
    Xml,
    /// Contents of a Java string literal
    JavaString,
}

impl Escape {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Escape::None => value.to_string(),
            Escape::Xml => {
                let mut out = String::with_capacity(value.len());
                for c in value.chars() {
                    match c {
                        '&' => out.push_str("&amp;"),
                        '<' => out.push_str("&lt;"),
                        '>' => out.push_str("&gt;"),
                        '"' => out.push_str("&quot;"),
                        '\'' => out.push_str("&apos;"),
                        c => out.push(c),
                    }
                }
                out
            }
            Escape::JavaString => {
                let mut out = String::with_capacity(value.len());
                for c in value.chars() {
                    match c {
                        '\\' => out.push_str("\\\\"),
                        '"' => out.push_str("\\\""),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out
            }
        }
    }
}

/// Named values plus active conditions for one run
#[derive(Debug, Clone, Default)]
pub struct PatchContext {
    values: BTreeMap<String, String>,
    conditions: BTreeSet<Condition>,
}

impl PatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Insert `value` when present; absent values stay unresolvable.
    pub fn with_optional(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.with_value(key, v),
            None => self,
        }
    }

    pub fn with_condition(mut self, condition: Condition, active: bool) -> Self {
        if active {
            self.conditions.insert(condition);
        } else {
            self.conditions.remove(&condition);
        }
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_active(&self, condition: Condition) -> bool {
        self.conditions.contains(&condition)
    }

    /// Expand `{{key}}` placeholders, escaping each value.
    ///
    /// Returns the offending key when a placeholder has no value.
    pub fn render(&self, template: &str, escape: Escape) -> Result<String, String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(format!("unterminated placeholder in {:?}", template));
            };
            let key = after[..end].trim();
            let value = self.value(key).ok_or_else(|| key.to_string())?;
            out.push_str(&escape.apply(value));
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }
}
