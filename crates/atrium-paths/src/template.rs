//! Path templates.
//!
//! A template mixes literal text with `{placeholders}`:
//!
//! - `{key}` looks up `key` in the data map.
//! - `{key[sub]}` and `{key.sub}` descend into nested objects; a numeric
//!   `[n]` indexes an array.
//! - `{key:spec}` pads the value. Supported specs are fill and alignment
//!   (`0>3`, `_<8`, `^5`), zero padding (`03`) and the `d`/`s` types.
//! - `{{` and `}}` are literal braces.
//!
//! Templates parsed with [`Template::parse`] may also hold optional groups
//! `<...>`. A group whose placeholders cannot all be resolved is dropped
//! from the output; resolved groups lose their markers. Afterwards an
//! accidental `..` (a literal dot followed by an extension that already
//! starts with one) collapses to a single `.`.

use serde_json::{Map, Value};

use crate::error::TemplateError;

type Result<T> = std::result::Result<T, TemplateError>;

// ---------------------------------------------------------------------------
// FormatSpec
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
    Center,
}

/// The part of a placeholder after `:`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatSpec {
    fill: char,
    align: Option<Align>,
    zero: bool,
    width: usize,
    kind: Option<char>,
    raw: String,
}

fn align_of(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        _ => None,
    }
}

impl FormatSpec {
    pub fn parse(key: &str, spec: &str) -> Result<Self> {
        let invalid = || TemplateError::InvalidFormatSpec {
            key: key.to_string(),
            spec: spec.to_string(),
        };
        let chars: Vec<char> = spec.chars().collect();
        let mut out = Self {
            fill: ' ',
            align: None,
            zero: false,
            width: 0,
            kind: None,
            raw: spec.to_string(),
        };

        let mut i = 0;
        if chars.len() >= 2 && align_of(chars[1]).is_some() {
            out.fill = chars[0];
            out.align = align_of(chars[1]);
            i = 2;
        } else if let Some(align) = chars.first().copied().and_then(align_of) {
            out.align = Some(align);
            i = 1;
        }

        if out.align.is_none() && chars.get(i) == Some(&'0') {
            out.zero = true;
            i += 1;
        }

        let digits_start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i > digits_start {
            let digits: String = chars[digits_start..i].iter().collect();
            out.width = digits.parse().map_err(|_| invalid())?;
        }

        match &chars[i..] {
            [] => {}
            [kind @ ('d' | 's')] => out.kind = Some(*kind),
            _ => return Err(invalid()),
        }
        Ok(out)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn apply(&self, key: &str, value: &Value) -> Result<String> {
        let numeric = value.is_number();
        if self.kind == Some('d') && !(value.is_i64() || value.is_u64()) {
            return Err(TemplateError::InvalidFormatSpec {
                key: key.to_string(),
                spec: self.raw.clone(),
            });
        }
        let text = render_scalar(key, value)?;
        let len = text.chars().count();
        if len >= self.width {
            return Ok(text);
        }
        let pad = self.width - len;

        if self.zero && numeric {
            // Sign-aware: -5 with `03` is `-05`.
            return Ok(match text.strip_prefix('-') {
                Some(digits) => format!("-{}{digits}", "0".repeat(pad)),
                None => format!("{}{text}", "0".repeat(pad)),
            });
        }

        let fill = if self.zero { '0' } else { self.fill };
        let align = self
            .align
            .unwrap_or(if numeric { Align::Right } else { Align::Left });
        let fill_n = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
        Ok(match align {
            Align::Left => format!("{text}{}", fill_n(pad)),
            Align::Right => format!("{}{text}", fill_n(pad)),
            Align::Center => format!("{}{text}{}", fill_n(pad / 2), fill_n(pad - pad / 2)),
        })
    }
}

fn render_scalar(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(TemplateError::MissingKey(key.to_string())),
        Value::Array(_) | Value::Object(_) => Err(TemplateError::NotFormattable(key.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
enum Accessor {
    Key(String),
    Index(usize),
}

/// One `{placeholder}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    key: String,
    path: Vec<Accessor>,
    spec: Option<FormatSpec>,
    expr: String,
}

impl Field {
    fn parse(body: &str, template: &str) -> Result<Self> {
        let malformed = |reason: &str| TemplateError::Malformed {
            template: template.to_string(),
            reason: reason.to_string(),
        };
        let (expr, spec) = match body.split_once(':') {
            Some((expr, spec)) => (expr, Some(spec)),
            None => (body, None),
        };
        if expr.contains('!') {
            return Err(malformed("conversions are not supported"));
        }

        let key_end = expr.find(['.', '[']).unwrap_or(expr.len());
        let key = &expr[..key_end];
        if key.is_empty() {
            return Err(malformed("placeholders need a name"));
        }

        let mut path = Vec::new();
        let mut rest = &expr[key_end..];
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                if end == 0 {
                    return Err(malformed("empty attribute name"));
                }
                path.push(Accessor::Key(after[..end].to_string()));
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let end = after.find(']').ok_or_else(|| malformed("unclosed '['"))?;
                let item = &after[..end];
                path.push(match item.parse::<usize>() {
                    Ok(index) => Accessor::Index(index),
                    Err(_) => Accessor::Key(item.to_string()),
                });
                rest = &after[end + 1..];
            } else {
                return Err(malformed("unexpected text after ']'"));
            }
        }

        let spec = spec
            .filter(|s| !s.is_empty())
            .map(|s| FormatSpec::parse(expr, s))
            .transpose()?;

        Ok(Self {
            key: key.to_string(),
            path,
            spec,
            expr: expr.to_string(),
        })
    }

    /// The top-level data key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The full expression, e.g. `project[name]`.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn spec(&self) -> Option<&FormatSpec> {
        self.spec.as_ref()
    }

    fn lookup<'a>(&self, data: &'a Map<String, Value>) -> Result<&'a Value> {
        let missing = || TemplateError::MissingKey(self.expr.clone());
        let mut current = data.get(&self.key).ok_or_else(missing)?;
        for accessor in &self.path {
            current = match (accessor, current) {
                (Accessor::Key(k), Value::Object(map)) => map.get(k),
                (Accessor::Index(i), Value::Array(items)) => items.get(*i),
                (Accessor::Index(i), Value::Object(map)) => map.get(&i.to_string()),
                _ => None,
            }
            .ok_or_else(missing)?;
        }
        Ok(current)
    }

    /// Render this placeholder from `data`.
    pub fn render(&self, data: &Map<String, Value>) -> Result<String> {
        let value = self.lookup(data)?;
        match &self.spec {
            Some(spec) => spec.apply(&self.expr, value),
            None => render_scalar(&self.expr, value),
        }
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Field(Field),
    Optional(Vec<Segment>),
}

/// A parsed template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    optional_groups: bool,
}

impl Template {
    /// Parse with `<...>` optional groups.
    pub fn parse(source: &str) -> Result<Self> {
        Self::build(source, true)
    }

    /// Parse with `<` and `>` as ordinary characters.
    pub fn parse_strict(source: &str) -> Result<Self> {
        Self::build(source, false)
    }

    fn build(source: &str, optional_groups: bool) -> Result<Self> {
        let malformed = |reason: &str| TemplateError::Malformed {
            template: source.to_string(),
            reason: reason.to_string(),
        };

        let mut stack: Vec<Vec<Segment>> = vec![Vec::new()];
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        fn flush(literal: &mut String, stack: &mut [Vec<Segment>]) {
            if !literal.is_empty() {
                if let Some(top) = stack.last_mut() {
                    top.push(Segment::Literal(std::mem::take(literal)));
                }
            }
        }

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
                '{' => {
                    flush(&mut literal, &mut stack);
                    let mut body = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(malformed("nested '{'")),
                            other => body.push(other),
                        }
                    }
                    if !closed {
                        return Err(malformed("unclosed '{'"));
                    }
                    let field = Field::parse(&body, source)?;
                    if let Some(top) = stack.last_mut() {
                        top.push(Segment::Field(field));
                    }
                }
                '}' => return Err(malformed("single '}'")),
                '<' if optional_groups => {
                    flush(&mut literal, &mut stack);
                    stack.push(Vec::new());
                }
                '>' if optional_groups => {
                    flush(&mut literal, &mut stack);
                    // A stray closing marker is dropped like any other marker.
                    if stack.len() > 1 {
                        let group = stack.pop().unwrap_or_default();
                        if let Some(top) = stack.last_mut() {
                            top.push(Segment::Optional(group));
                        }
                    }
                }
                other => literal.push(other),
            }
        }
        flush(&mut literal, &mut stack);

        if stack.len() != 1 {
            return Err(malformed("unclosed '<'"));
        }
        Ok(Self {
            source: source.to_string(),
            segments: stack.pop().unwrap_or_default(),
            optional_groups,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Every placeholder, including those inside optional groups.
    pub fn fields(&self) -> Vec<&Field> {
        fn walk<'a>(segments: &'a [Segment], out: &mut Vec<&'a Field>) {
            for segment in segments {
                match segment {
                    Segment::Field(field) => out.push(field),
                    Segment::Optional(inner) => walk(inner, out),
                    Segment::Literal(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.segments, &mut out);
        out
    }

    /// Give every `{key}` placeholder without a spec the spec `spec`.
    pub fn with_default_spec(mut self, key: &str, spec: &str) -> Result<Self> {
        fn walk(segments: &mut [Segment], key: &str, spec: &FormatSpec) {
            for segment in segments {
                match segment {
                    Segment::Field(field) if field.key == key && field.spec.is_none() => {
                        field.spec = Some(spec.clone());
                    }
                    Segment::Optional(inner) => walk(inner, key, spec),
                    _ => {}
                }
            }
        }
        let spec = FormatSpec::parse(key, spec)?;
        walk(&mut self.segments, key, &spec);
        Ok(self)
    }

    /// Render with `data`.
    pub fn format(&self, data: &Map<String, Value>) -> Result<String> {
        let mut out = String::new();
        render(&self.segments, data, &mut out)?;
        if self.optional_groups {
            Ok(collapse_double_dots(&out))
        } else {
            Ok(out)
        }
    }
}

fn render(segments: &[Segment], data: &Map<String, Value>, out: &mut String) -> Result<()> {
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Field(field) => out.push_str(&field.render(data)?),
            Segment::Optional(inner) => {
                let mut group = String::new();
                match render(inner, data, &mut group) {
                    Ok(()) => out.push_str(&group),
                    Err(TemplateError::MissingKey(_)) => {}
                    Err(other) => return Err(other),
                }
            }
        }
    }
    Ok(())
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Collapse `..` to `.` unless it is a whole `..` path component.
fn collapse_double_dots(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '.' && chars.get(i + 1) == Some(&'.') {
            let starts = i == 0 || is_separator(chars[i - 1]);
            let ends = chars.get(i + 2).map_or(true, |c| is_separator(*c));
            out.push_str(if starts && ends { ".." } else { "." });
            i += 2;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Parse and render `template` with optional groups.
pub fn format(template: &str, data: &Map<String, Value>) -> Result<String> {
    Template::parse(template)?.format(data)
}

/// Parse and render `template` without optional groups.
pub fn format_strict(template: &str, data: &Map<String, Value>) -> Result<String> {
    Template::parse_strict(template)?.format(data)
}
