//! # Override rules
//!
//! Overrides rewrite a song's tags between scraping and link naming. Each
//! override is a conjunction of per-tag rules plus a set of operations that
//! run only when every rule matches. Rules come from the configuration file
//! and are compiled once per run; a malformed rule regex is a configuration
//! error, not a per-song one.

use std::fmt;

use log::{info, warn};
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::tags::{resolve_plain, CapturedMatch, Fallbacks, TagMap, TagSet, TagValue};
use crate::template::render;

/// A compiled per-tag rule.
#[derive(Debug, Clone)]
enum Rule {
    /// Matches only when the tag does not resolve at all.
    Missing,
    /// Typed equality: text against text, boolean against boolean.
    Literal(TagValue),
    /// `/.../` in the configuration: a full match against a text value.
    Pattern(Regex),
}

/// How one rule matched; carried into operation templates so they can see
/// what the rule saw.
#[derive(Debug, Clone)]
pub enum RuleMatch {
    Missing,
    Value(TagValue),
    Captures(CapturedMatch),
}

impl RuleMatch {
    fn to_tag_value(&self) -> TagValue {
        match self {
            RuleMatch::Missing => TagValue::None,
            RuleMatch::Value(value) => value.clone(),
            RuleMatch::Captures(m) => TagValue::Match(m.clone()),
        }
    }
}

/// One operation, compiled from its configuration value.
#[derive(Debug, Clone, PartialEq)]
enum OpValue {
    /// Remove the tag (a `null` or empty value in the configuration).
    Remove,
    /// Set the tag to this value directly.
    Set(TagValue),
    /// Render this template at apply time (except for `path_template`,
    /// which is stored verbatim and rendered per song later).
    Render(String),
}

/// A compiled override: all `rules` must match for `operations` to run.
#[derive(Debug, Clone)]
pub struct Override {
    rules: Vec<(String, Rule)>,
    operations: Vec<(String, OpValue)>,
    debug: bool,
}

impl Override {
    /// Compile an override from its configuration maps. The reserved
    /// operation key `debug` turns on per-song match logging instead of
    /// being applied as a tag.
    pub fn compile(rules: &Map<String, Value>, operations: &Map<String, Value>) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|(tag, value)| Ok((tag.clone(), compile_rule(value)?)))
            .collect::<Result<Vec<_>>>()?;
        let mut ops = Vec::with_capacity(operations.len());
        let mut debug = false;
        for (key, value) in operations {
            if key == "debug" {
                debug = value.as_bool().unwrap_or(!value.is_null());
                continue;
            }
            ops.push((key.clone(), compile_operation(value)));
        }
        Ok(Override {
            rules,
            operations: ops,
            debug,
        })
    }

    /// Check every rule against `tags` (alias probe only, no fallbacks).
    ///
    /// Returns the per-tag match results in rule order, or none when any
    /// rule fails.
    pub fn matches(&self, tags: &TagSet, tagmap: &TagMap) -> Option<Vec<(String, RuleMatch)>> {
        let mut matched = Vec::with_capacity(self.rules.len());
        for (tag, rule) in &self.rules {
            let value = resolve_plain(tag, tags, tagmap);
            let result = match (rule, &value) {
                (Rule::Missing, None) => RuleMatch::Missing,
                (Rule::Pattern(re), Some(TagValue::Text(text))) => match re.captures(text) {
                    Some(caps) => RuleMatch::Captures(CapturedMatch::new(&caps, re)),
                    None => return None,
                },
                (Rule::Literal(expected), Some(actual)) if expected == actual => {
                    RuleMatch::Value(actual.clone())
                }
                _ => return None,
            };
            matched.push((tag.clone(), result));
        }
        Some(matched)
    }

    /// Apply the override to `tags`, returning whether it matched.
    ///
    /// Operations run in declaration order against the live tag set, with
    /// the rule-match results overlaid for rendering (so `{TAG/\1/}` in an
    /// operation template reaches the rule's capture groups, and a
    /// matched-absent tag renders as nothing). An operation whose template
    /// fails to render is skipped with a warning; the rest still apply.
    /// A rendered empty value removes the tag.
    pub fn apply(&self, tags: &mut TagSet, tagmap: &TagMap, fallbacks: &Fallbacks) -> bool {
        let Some(matched) = self.matches(tags, tagmap) else {
            return false;
        };

        let song = tags
            .get("abspath")
            .and_then(TagValue::as_text)
            .unwrap_or("<unknown>")
            .to_string();
        if self.debug {
            info!("'{song}' matched override {self}");
        }

        for (key, op) in &self.operations {
            let new_value: Option<TagValue> = match op {
                OpValue::Remove => None,
                OpValue::Set(value) => Some(value.clone()),
                OpValue::Render(template) if key == "path_template" => {
                    Some(TagValue::Text(template.clone()))
                }
                OpValue::Render(template) => {
                    // Rebuilt per key so earlier operations are visible.
                    let mut data = tags.clone();
                    for (tag, m) in &matched {
                        data.insert(tag.clone(), m.to_tag_value());
                    }
                    match render(template, &data, tagmap, Some(fallbacks)) {
                        Ok(text) if text.is_empty() => None,
                        Ok(text) => Some(TagValue::Text(text)),
                        Err(e) => {
                            warn!("not setting tag '{key}' on '{song}': {e}");
                            continue;
                        }
                    }
                }
            };
            match new_value {
                None => {
                    if tags.remove(key).is_some() && self.debug {
                        info!("removed tag '{key}' from '{song}'");
                    }
                }
                Some(value) => {
                    if self.debug {
                        match tags.get(key) {
                            Some(old) => {
                                info!("changed tag '{key}' on '{song}': '{old}' -> '{value}'")
                            }
                            None => info!("set tag '{key}' on '{song}' to '{value}'"),
                        }
                    }
                    tags.insert(key.clone(), value);
                }
            }
        }
        true
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules = self
            .rules
            .iter()
            .map(|(tag, rule)| match rule {
                Rule::Missing => format!("{tag} unset"),
                Rule::Literal(value) => format!("{tag}={value}"),
                Rule::Pattern(re) => format!("{tag}~{}", re.as_str()),
            })
            .collect::<Vec<_>>()
            .join(" & ");
        let operations = self
            .operations
            .iter()
            .map(|(key, op)| match op {
                OpValue::Remove => format!("-{key}"),
                OpValue::Set(value) => format!("{key}:={value}"),
                OpValue::Render(template) => format!("{key}:='{template}'"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({rules} -> {operations})")
    }
}

fn compile_rule(value: &Value) -> Result<Rule> {
    match value {
        Value::Null => Ok(Rule::Missing),
        Value::Bool(b) => Ok(Rule::Literal(TagValue::Bool(*b))),
        Value::String(s) => {
            if s.len() > 2 && s.starts_with('/') && s.ends_with('/') {
                let pattern = &s[1..s.len() - 1];
                let re = Regex::new(&format!("^(?:{pattern})$"))
                    .map_err(|e| Error::Config(format!("bad override rule regex '{s}': {e}")))?;
                Ok(Rule::Pattern(re))
            } else {
                Ok(Rule::Literal(TagValue::Text(s.clone())))
            }
        }
        Value::Number(n) => Ok(Rule::Literal(TagValue::Text(n.to_string()))),
        other => Err(Error::Config(format!(
            "unsupported override rule value: {other}"
        ))),
    }
}

fn compile_operation(value: &Value) -> OpValue {
    match value {
        Value::Null => OpValue::Remove,
        Value::Bool(b) => OpValue::Set(TagValue::Bool(*b)),
        Value::String(s) if s.is_empty() => OpValue::Remove,
        Value::String(s) => OpValue::Render(s.clone()),
        other => OpValue::Render(other.to_string()),
    }
}
