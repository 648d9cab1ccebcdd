//! # Tag values and the tag accessor
//!
//! Everything the pipeline knows about a song lives in a [`TagSet`]: a map
//! from uppercase tag name to a [`TagValue`]. Scraped tags are plain text;
//! overrides can additionally introduce booleans, explicit none entries and
//! captured regex matches.
//!
//! [`resolve`] is the single lookup path used everywhere a tag is read: it
//! probes the configured aliases in order, normalizes `"3/12"`-style track
//! and disc counters, and finally falls back to a configured literal or
//! template.

use std::collections::BTreeMap;
use std::fmt;

use log::error;
use regex::{Captures, Regex};

use crate::error::{Error, Result};
use crate::template;

/// Tags whose text values are `"index/total"` counters; only the index part
/// is ever kept.
const SLASH_NUMBERED_TAGS: [&str; 2] = ["TRACKNUMBER", "DISCNUMBER"];

/// Fallback templates may reference tags that themselves have fallbacks, so
/// resolution can recurse. A chain deeper than this is assumed circular.
const MAX_FALLBACK_DEPTH: usize = 16;

/// A song's tags. Ordered so logs and errors are deterministic.
pub type TagSet = BTreeMap<String, TagValue>;

/// Canonical tag name to the alias names probed for it, in order.
pub type TagMap = BTreeMap<String, Vec<String>>;

/// Tag name to the fallback used when no alias resolves.
pub type Fallbacks = BTreeMap<String, Fallback>;

/// A configured fallback: either used verbatim or rendered as a template
/// against the same tag set (text fallbacks are always templates; a template
/// without fields renders to itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    Template(String),
    Literal(TagValue),
}

/// A single tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Text(String),
    Bool(bool),
    Match(CapturedMatch),
    None,
}

impl TagValue {
    /// Whether the alias probe accepts this value. Empty text and none are
    /// treated as unset; booleans (including `false`) and matches count.
    pub fn is_usable(&self) -> bool {
        match self {
            TagValue::Text(t) => !t.is_empty(),
            TagValue::None => false,
            _ => true,
        }
    }

    /// Loose truthiness for flag tags such as `ignore` and
    /// `preserve_filename`: non-empty text, `true`, or any match.
    pub fn is_truthy(&self) -> bool {
        match self {
            TagValue::Text(t) => !t.is_empty(),
            TagValue::Bool(b) => *b,
            TagValue::Match(_) => true,
            TagValue::None => false,
        }
    }

    /// The textual content, if there is any. Matches yield their whole
    /// matched text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(t) => Some(t),
            TagValue::Match(m) => Some(m.text()),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    /// Rendering into a path component: text verbatim, booleans as
    /// `true`/`false`, matches as their matched text, none as nothing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Text(t) => f.write_str(t),
            TagValue::Bool(b) => write!(f, "{b}"),
            TagValue::Match(m) => f.write_str(m.text()),
            TagValue::None => Ok(()),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Text(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

/// An owned snapshot of a successful regex match, detached from the haystack
/// so it can be stored in a [`TagSet`] and expanded later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedMatch {
    text: String,
    /// Indexed by group number; group 0 is the whole match. `None` marks a
    /// group that did not participate in the match.
    groups: Vec<Option<String>>,
    names: Vec<(String, usize)>,
}

impl CapturedMatch {
    pub fn new(caps: &Captures<'_>, re: &Regex) -> Self {
        let groups: Vec<Option<String>> = (0..caps.len())
            .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
            .collect();
        let names = re
            .capture_names()
            .enumerate()
            .filter_map(|(i, name)| name.map(|n| (n.to_string(), i)))
            .collect();
        let text = caps
            .get(0)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        CapturedMatch { text, groups, names }
    }

    /// The whole matched text (group 0).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Expand `\N` and `\g<name>` references against the captured groups.
    ///
    /// A group that exists in the pattern but did not participate expands to
    /// nothing; a reference to a group the pattern does not have is a
    /// [`Error::Parse`] failure, as is any other malformed escape.
    pub fn expand(&self, template: &str) -> Result<String> {
        let mut out = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('g') => {
                    if chars.next() != Some('<') {
                        return Err(Error::parse(template, "expected '<' after \\g"));
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('>') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(Error::parse(template, "unterminated group name"))
                            }
                        }
                    }
                    let index = match name.parse::<usize>() {
                        Ok(n) => n,
                        Err(_) => self
                            .names
                            .iter()
                            .find(|(n, _)| *n == name)
                            .map(|(_, i)| *i)
                            .ok_or_else(|| {
                                Error::parse(template, format!("unknown group '{name}'"))
                            })?,
                    };
                    out.push_str(self.numbered(index, template)?);
                }
                Some(d) if d.is_ascii_digit() => {
                    let mut number = (d as usize) - ('0' as usize);
                    if let Some(n) = chars.peek().copied().filter(char::is_ascii_digit) {
                        chars.next();
                        number = number * 10 + ((n as usize) - ('0' as usize));
                    }
                    out.push_str(self.numbered(number, template)?);
                }
                Some(other) => {
                    return Err(Error::parse(template, format!("bad escape '\\{other}'")))
                }
                None => return Err(Error::parse(template, "dangling '\\'")),
            }
        }
        Ok(out)
    }

    fn numbered(&self, index: usize, template: &str) -> Result<&str> {
        match self.groups.get(index) {
            Some(Some(text)) => Ok(text),
            Some(None) => Ok(""),
            None => Err(Error::parse(template, format!("no group {index}"))),
        }
    }
}

/// Resolve `tag` against a song's tags.
///
/// The configured aliases (or the tag name itself when it has none) are
/// probed in order and the first usable value wins. When nothing is found
/// and a fallback is configured, the fallback is returned; text fallbacks
/// are rendered as templates against the same tag set, which may recurse
/// into further fallbacks. `TRACKNUMBER`/`DISCNUMBER` values are truncated
/// at the first `/` either way.
///
/// Returns `Ok(None)` when the tag stays unresolved. An unresolvable field
/// inside a fallback template is a [`Error::MissingKey`] failure; a fallback
/// chain that never bottoms out is a [`Error::Parse`] failure.
pub fn resolve(
    tag: &str,
    tags: &TagSet,
    tagmap: &TagMap,
    fallbacks: Option<&Fallbacks>,
) -> Result<Option<TagValue>> {
    resolve_at_depth(tag, tags, tagmap, fallbacks, 0)
}

/// [`resolve`] without fallbacks, which makes it infallible: grouping and
/// override matching both want "what the song actually carries".
pub fn resolve_plain(tag: &str, tags: &TagSet, tagmap: &TagMap) -> Option<TagValue> {
    match resolve_at_depth(tag, tags, tagmap, None, 0) {
        Ok(value) => value,
        // No fallback templates can run, so no error path is reachable.
        Err(_) => None,
    }
}

pub(crate) fn resolve_at_depth(
    tag: &str,
    tags: &TagSet,
    tagmap: &TagMap,
    fallbacks: Option<&Fallbacks>,
    depth: usize,
) -> Result<Option<TagValue>> {
    if depth > MAX_FALLBACK_DEPTH {
        return Err(Error::parse(tag, "fallback recursion limit reached"));
    }

    let found = match tagmap.get(tag).filter(|aliases| !aliases.is_empty()) {
        Some(aliases) => aliases
            .iter()
            .find_map(|key| tags.get(key).filter(|v| v.is_usable())),
        None => tags.get(tag).filter(|v| v.is_usable()),
    };
    if let Some(value) = found {
        return Ok(Some(normalize_numbered(tag, value.clone())));
    }

    let Some(fallback) = fallbacks.and_then(|f| f.get(tag)) else {
        return Ok(None);
    };
    let value = match fallback {
        Fallback::Literal(value) => value.clone(),
        Fallback::Template(tpl) => {
            let rendered = template::render_at_depth(tpl, tags, tagmap, fallbacks, depth + 1)
                .map_err(|e| {
                    if let Error::MissingKey { key } = &e {
                        error!("unknown key '{key}' in fallback '{tpl}' for tag '{tag}'");
                    }
                    e
                })?;
            TagValue::Text(rendered)
        }
    };
    Ok(Some(normalize_numbered(tag, value)))
}

/// Resolve `tag` (without fallbacks) across a whole group of songs and
/// return the value only when it is identical for every one of them.
pub fn resolve_consistent(tag: &str, songs: &[TagSet], tagmap: &TagMap) -> Option<TagValue> {
    let mut values = songs.iter().map(|song| resolve_plain(tag, song, tagmap));
    let first = values.next()?;
    if values.all(|value| value == first) {
        first
    } else {
        None
    }
}

/// True when every item of `iter` compares equal (vacuously true when empty).
pub(crate) fn all_same<T: PartialEq>(mut iter: impl Iterator<Item = T>) -> bool {
    match iter.next() {
        Some(first) => iter.all(|item| item == first),
        None => true,
    }
}

fn normalize_numbered(tag: &str, value: TagValue) -> TagValue {
    if !SLASH_NUMBERED_TAGS.contains(&tag) {
        return value;
    }
    match value {
        TagValue::Text(text) => match text.split_once('/') {
            Some((index, _)) => TagValue::Text(index.to_string()),
            None => TagValue::Text(text),
        },
        other => other,
    }
}
