//! # Path and file-name templates
//!
//! Templates are literal text with brace-delimited replacement fields:
//!
//! - `{NAME}` substitutes the resolved value of `NAME`.
//! - `{NAME:SPEC}` applies a format directive; the supported subset is
//!   `[[fill]align][width][.precision]` with `align` one of `<`, `>`, `^`.
//! - `{NAME:/PATTERN/REPLACEMENT/SPEC}` first rewrites every `PATTERN` match
//!   in the value with `REPLACEMENT` (backreferences `\1` and `\g<name>`
//!   work), then applies `SPEC` as a plain directive. Literal slashes inside
//!   the pattern or replacement are escaped as `\/`.
//! - `{NAME/TEMPLATE/}` expands `TEMPLATE` against the capture groups of a
//!   regex-match value (as produced by override rules).
//! - `{{` and `}}` are literal braces and are also honored inside a field,
//!   so a regex repetition is written `x{{2}}`.
//! - `\/` in literal text is a plain slash that never splits a path template
//!   into components.
//!
//! Field names resolve through the tag accessor (aliases and fallbacks
//! included); a name the accessor cannot resolve but that is present
//! verbatim in the tag set still renders (an explicit none renders as
//! nothing). Anything else is a [`Error::MissingKey`] failure.

use std::iter::Peekable;
use std::str::Chars;

use regex::Regex;

use crate::error::{Error, Result};
use crate::tags::{resolve_at_depth, Fallbacks, TagMap, TagSet, TagValue};

/// A parsed template, reusable across renders.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// One `{...}` replacement field.
#[derive(Debug, Clone)]
struct Field {
    name: String,
    /// `{NAME/TEMPLATE/}`: expand a match value's groups through this.
    expand: Option<String>,
    /// `{NAME:/PATTERN/REPLACEMENT/...}`, compiled.
    subst: Option<Subst>,
    directive: Directive,
}

#[derive(Debug, Clone)]
struct Subst {
    pattern: Regex,
    /// Replacement with backreferences already translated to `$N` form.
    replacement: String,
}

#[derive(Debug, Clone)]
struct Directive {
    fill: char,
    align: Align,
    width: Option<usize>,
    precision: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

impl Template {
    /// Parse `source`, surfacing every syntax problem up front: unbalanced
    /// braces, a missing field terminator, an inline substitution without
    /// its three slashes, an invalid regex, a backreference the pattern
    /// cannot satisfy, or an unsupported format directive.
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(Error::parse(source, "single '}' in literal text")),
                '{' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(parse_field(&mut chars, source)?));
                }
                // An escaped separator survives path splitting; it renders
                // as a plain slash (the character map decides its fate).
                '\\' if chars.peek() == Some(&'/') => {
                    chars.next();
                    literal.push('/');
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Template {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against a song's tags.
    pub fn render(
        &self,
        tags: &TagSet,
        tagmap: &TagMap,
        fallbacks: Option<&Fallbacks>,
    ) -> Result<String> {
        self.render_at_depth(tags, tagmap, fallbacks, 0)
    }

    pub(crate) fn render_at_depth(
        &self,
        tags: &TagSet,
        tagmap: &TagMap,
        fallbacks: Option<&Fallbacks>,
        depth: usize,
    ) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => {
                    out.push_str(&field.render(tags, tagmap, fallbacks, depth)?)
                }
            }
        }
        Ok(out)
    }
}

/// Parse and render in one step.
pub fn render(
    template: &str,
    tags: &TagSet,
    tagmap: &TagMap,
    fallbacks: Option<&Fallbacks>,
) -> Result<String> {
    Template::parse(template)?.render_at_depth(tags, tagmap, fallbacks, 0)
}

pub(crate) fn render_at_depth(
    template: &str,
    tags: &TagSet,
    tagmap: &TagMap,
    fallbacks: Option<&Fallbacks>,
    depth: usize,
) -> Result<String> {
    Template::parse(template)?.render_at_depth(tags, tagmap, fallbacks, depth)
}

impl Field {
    fn render(
        &self,
        tags: &TagSet,
        tagmap: &TagMap,
        fallbacks: Option<&Fallbacks>,
        depth: usize,
    ) -> Result<String> {
        let value = match resolve_at_depth(&self.name, tags, tagmap, fallbacks, depth)? {
            Some(value) => value,
            // The accessor came up empty, but a verbatim entry (even an
            // explicit none) still counts as present.
            None => match tags.get(&self.name) {
                Some(value) => value.clone(),
                None => return Err(Error::missing_key(&self.name)),
            },
        };

        let mut text = match &self.expand {
            Some(template) => match &value {
                TagValue::Match(m) => m.expand(template)?,
                _ => {
                    return Err(Error::FieldRegexExpand {
                        field: self.name.clone(),
                    })
                }
            },
            None => value.to_string(),
        };

        if let Some(subst) = &self.subst {
            text = subst
                .pattern
                .replace_all(&text, subst.replacement.as_str())
                .into_owned();
        }

        Ok(self.directive.apply(&text))
    }
}

fn parse_field(chars: &mut Peekable<Chars<'_>>, source: &str) -> Result<Field> {
    // Collect the raw body up to the closing brace, unescaping doubled
    // braces along the way.
    let mut body = String::new();
    loop {
        match chars.next() {
            None => return Err(Error::parse(source, "unterminated replacement field")),
            Some('{') if chars.peek() == Some(&'{') => {
                chars.next();
                body.push('{');
            }
            Some('}') if chars.peek() == Some(&'}') => {
                chars.next();
                body.push('}');
            }
            Some('{') => return Err(Error::parse(source, "'{' inside replacement field")),
            Some('}') => break,
            Some(c) => body.push(c),
        }
    }

    let (name_part, spec_part) = match body.find(':') {
        Some(i) => (&body[..i], &body[i + 1..]),
        None => (body.as_str(), ""),
    };
    let (name, expand) = split_expand(name_part);

    let (subst, directive_part) = if let Some(rest) = spec_part.strip_prefix('/') {
        let slashes = unescaped_slash_positions(rest);
        if slashes.len() < 2 {
            return Err(Error::parse(
                source,
                "inline substitution needs three unescaped slashes",
            ));
        }
        let (end_pattern, end_replacement) = (slashes[0], slashes[1]);
        let pattern = unescape_slashes(&rest[..end_pattern]);
        let replacement = unescape_slashes(&rest[end_pattern + 1..end_replacement]);
        let regex = Regex::new(&pattern)
            .map_err(|e| Error::parse(source, format!("bad substitution regex: {e}")))?;
        let replacement = translate_replacement(&replacement, &regex, source)?;
        (
            Some(Subst {
                pattern: regex,
                replacement,
            }),
            &rest[end_replacement + 1..],
        )
    } else {
        (None, spec_part)
    };

    Ok(Field {
        name,
        expand,
        subst,
        directive: parse_directive(directive_part, source)?,
    })
}

/// `NAME/TEMPLATE/` becomes `(NAME, Some(TEMPLATE))`; anything else is a
/// plain name. The field must end with an unescaped slash and the template
/// must be non-empty; extra slashes to the left are part of the name.
fn split_expand(name_part: &str) -> (String, Option<String>) {
    let slashes = unescaped_slash_positions(name_part);
    let Some((&close, opens)) = slashes.split_last() else {
        return (name_part.to_string(), None);
    };
    if close + 1 != name_part.len() {
        return (name_part.to_string(), None);
    }
    for &open in opens.iter().rev() {
        if close > open + 1 {
            let name = name_part[..open].to_string();
            let template = unescape_slashes(&name_part[open + 1..close]);
            return (name, Some(template));
        }
    }
    (name_part.to_string(), None)
}

/// Byte offsets of `/` characters not directly preceded by a backslash.
fn unescaped_slash_positions(s: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut prev = None;
    for (i, c) in s.char_indices() {
        if c == '/' && prev != Some('\\') {
            positions.push(i);
        }
        prev = Some(c);
    }
    positions
}

fn unescape_slashes(s: &str) -> String {
    s.replace("\\/", "/")
}

/// Translate `\N` / `\g<name>` backreferences into the `$` syntax
/// [`Regex::replace_all`] understands, checking each reference against the
/// groups `regex` actually has.
fn translate_replacement(replacement: &str, regex: &Regex, source: &str) -> Result<String> {
    let group_count = regex.captures_len();
    let mut out = String::new();
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.next() {
                Some('\\') => out.push('\\'),
                Some('g') => {
                    if chars.next() != Some('<') {
                        return Err(Error::parse(source, "expected '<' after \\g"));
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('>') => break,
                            Some(c) => name.push(c),
                            None => return Err(Error::parse(source, "unterminated group name")),
                        }
                    }
                    if let Ok(number) = name.parse::<usize>() {
                        if number >= group_count {
                            return Err(Error::parse(
                                source,
                                format!("substitution references group {number}, which the pattern does not have"),
                            ));
                        }
                        out.push_str(&format!("${{{number}}}"));
                    } else {
                        if !regex.capture_names().flatten().any(|g| g == name) {
                            return Err(Error::parse(
                                source,
                                format!("substitution references unknown group '{name}'"),
                            ));
                        }
                        out.push_str(&format!("${{{name}}}"));
                    }
                }
                Some(d) if d.is_ascii_digit() => {
                    let mut number = (d as usize) - ('0' as usize);
                    if let Some(n) = chars.peek().copied().filter(char::is_ascii_digit) {
                        chars.next();
                        number = number * 10 + ((n as usize) - ('0' as usize));
                    }
                    if number >= group_count {
                        return Err(Error::parse(
                            source,
                            format!("substitution references group {number}, which the pattern does not have"),
                        ));
                    }
                    out.push_str(&format!("${{{number}}}"));
                }
                Some(other) => {
                    return Err(Error::parse(
                        source,
                        format!("bad escape '\\{other}' in substitution"),
                    ))
                }
                None => return Err(Error::parse(source, "dangling '\\' in substitution")),
            },
            c => out.push(c),
        }
    }
    Ok(out)
}

fn parse_directive(spec: &str, source: &str) -> Result<Directive> {
    let mut directive = Directive {
        fill: ' ',
        align: Align::Left,
        width: None,
        precision: None,
    };
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;

    if chars.len() >= 2 && as_align(chars[1]).is_some() {
        directive.fill = chars[0];
        directive.align = as_align(chars[1]).unwrap_or(Align::Left);
        i = 2;
    } else if let Some(align) = chars.first().copied().and_then(as_align) {
        directive.align = align;
        i = 1;
    }

    let width_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i > width_start {
        directive.width = Some(parse_number(&chars[width_start..i], source)?);
    }

    if i < chars.len() && chars[i] == '.' {
        i += 1;
        let precision_start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if i == precision_start {
            return Err(Error::parse(source, "format precision must be a number"));
        }
        directive.precision = Some(parse_number(&chars[precision_start..i], source)?);
    }

    if i != chars.len() {
        return Err(Error::parse(
            source,
            format!("unsupported format directive '{spec}'"),
        ));
    }
    Ok(directive)
}

fn as_align(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        _ => None,
    }
}

fn parse_number(digits: &[char], source: &str) -> Result<usize> {
    digits
        .iter()
        .collect::<String>()
        .parse()
        .map_err(|_| Error::parse(source, "format number out of range"))
}

impl Directive {
    fn apply(&self, text: &str) -> String {
        let mut out: String = match self.precision {
            Some(p) => text.chars().take(p).collect(),
            None => text.to_string(),
        };
        if let Some(width) = self.width {
            let len = out.chars().count();
            if len < width {
                let pad = width - len;
                match self.align {
                    Align::Left => out.extend(std::iter::repeat(self.fill).take(pad)),
                    Align::Right => {
                        let mut padded: String =
                            std::iter::repeat(self.fill).take(pad).collect();
                        padded.push_str(&out);
                        out = padded;
                    }
                    Align::Center => {
                        let left = pad / 2;
                        let mut padded: String =
                            std::iter::repeat(self.fill).take(left).collect();
                        padded.push_str(&out);
                        padded.extend(std::iter::repeat(self.fill).take(pad - left));
                        out = padded;
                    }
                }
            }
        }
        out
    }
}

/// Split a path template into its directory components.
///
/// A `/` splits only at brace depth zero and when not escaped with a
/// backslash; doubled braces are literal text and do not change the depth,
/// so slashes inside a field body (an inline substitution, say) survive
/// intact. Components are returned raw and rendered individually.
pub fn split_components(template: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut prev = None;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                current.push_str("{{");
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                current.push_str("}}");
            }
            '{' => {
                depth += 1;
                current.push('{');
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push('}');
            }
            '/' if depth == 0 && prev != Some('\\') => {
                components.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
        prev = Some(c);
    }
    components.push(current);
    components
}
