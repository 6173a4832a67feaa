//! Route-pattern DSL: compilation and typed path matching.
//!
//! A pattern like `/users/:id$/posts/:?day(` is compiled once at
//! registration time into a list of segment descriptors. Matching a concrete
//! path walks the descriptors pairwise against the path segments, coercing
//! parameter text to the declared type.

use std::str::FromStr;

use chrono::NaiveDate;
use fnv::FnvHashMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::PatternError;
use crate::path::tokenize;

/// The declared type of a route parameter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// No marker: the segment text as-is.
    Str,
    /// `$` marker: a base-10 integer.
    Int,
    /// `(` marker: an ISO-8601 calendar date (`YYYY-MM-DD`).
    Date,
    /// `^` marker: `true` or `false`, case-insensitive. No other spellings
    /// are accepted.
    Bool,
}

impl ParamType {
    fn from_marker(marker: char) -> Option<ParamType> {
        match marker {
            '$' => Some(ParamType::Int),
            '(' => Some(ParamType::Date),
            '^' => Some(ParamType::Bool),
            _ => None,
        }
    }

    fn coerce(self, text: &str) -> Option<ParamValue> {
        match self {
            ParamType::Str => Some(ParamValue::Str(text.to_string())),
            ParamType::Int => i64::from_str(text).ok().map(ParamValue::Int),
            ParamType::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(ParamValue::Date),
            ParamType::Bool => {
                if text.eq_ignore_ascii_case("true") {
                    Some(ParamValue::Bool(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Some(ParamValue::Bool(false))
                } else {
                    None
                }
            }
        }
    }
}

/// A coerced route-parameter value.
///
/// `Absent` marks an optional parameter whose segment was missing or failed
/// to coerce; optional parameters never abort a match, they only omit the
/// value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A string parameter.
    Str(String),
    /// An integer parameter.
    Int(i64),
    /// A calendar-date parameter.
    Date(NaiveDate),
    /// A boolean parameter.
    Bool(bool),
    /// An optional parameter without a value.
    Absent,
}

impl ParamValue {
    /// Returns the string value, if this is a string parameter.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer parameter.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the date value, if this is a date parameter.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            ParamValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean parameter.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this is an unset optional parameter.
    pub fn is_absent(&self) -> bool {
        matches!(self, ParamValue::Absent)
    }

    /// JSON rendering of the value; `Absent` becomes `null`, dates become
    /// `YYYY-MM-DD` strings.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Str(s) => Value::String(s.clone()),
            ParamValue::Int(n) => Value::from(*n),
            ParamValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Absent => Value::Null,
        }
    }
}

/// Extracted route parameters, keyed by parameter name.
pub type ParamMap = FnvHashMap<String, ParamValue>;

/// One parameter descriptor of a compiled pattern.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParamSpec {
    /// The parameter name, markers stripped.
    pub name: String,
    /// The declared type.
    pub ty: ParamType,
    /// Whether the parameter was `?`-prefixed.
    pub optional: bool,
}

/// One segment of a compiled pattern.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Segment {
    /// A literal segment that must match exactly.
    Literal(String),
    /// A named, typed parameter segment.
    Param(ParamSpec),
}

impl Segment {
    fn is_optional(&self) -> bool {
        matches!(self, Segment::Param(spec) if spec.optional)
    }
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

fn strip_name(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

impl Pattern {
    /// Compiles a pattern string into a matcher.
    ///
    /// Parameter names must be unique within one pattern; the parse happens
    /// exactly once, at registration time.
    pub fn compile(raw: &str) -> Result<Pattern, PatternError> {
        let mut segments = Vec::new();
        let mut seen = Vec::new();

        for part in tokenize(raw) {
            if let Some(rest) = part.strip_prefix(':') {
                let (optional, rest) = match rest.strip_prefix('?') {
                    Some(rest) => (true, rest),
                    None => (false, rest),
                };
                let (ty, rest) = match rest.chars().last().and_then(ParamType::from_marker) {
                    Some(ty) => (ty, &rest[..rest.len() - 1]),
                    None => (ParamType::Str, rest),
                };
                let name = strip_name(rest);
                if name.is_empty() {
                    return Err(PatternError::EmptyParamName(part.to_string()));
                }
                if seen.contains(&name) {
                    return Err(PatternError::DuplicateParam(name));
                }
                seen.push(name.clone());
                segments.push(Segment::Param(ParamSpec { name, ty, optional }));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Pattern {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The pattern string as given at registration.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The compiled segment descriptors.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The canonical path form with type and optional markers stripped,
    /// e.g. `/users/:id$` renders as `/users/:id`. Used to derive stable
    /// handler identifiers.
    pub fn route_string(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Param(spec) => {
                    out.push(':');
                    out.push_str(&spec.name);
                }
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    /// Matches a concrete path against this pattern.
    ///
    /// Returns the coerced parameter map on success. Literal mismatches,
    /// failed coercion of a required parameter, and segment-count mismatches
    /// (beyond trailing optional parameters) all return `None`. A failed
    /// coercion of an *optional* parameter records the parameter as
    /// [`ParamValue::Absent`] instead of rejecting the path.
    pub fn match_path(&self, path: &str) -> Option<ParamMap> {
        let parts = tokenize(path);

        let required = self
            .segments
            .iter()
            .rposition(|segment| !segment.is_optional())
            .map(|i| i + 1)
            .unwrap_or(0);
        if parts.len() < required || parts.len() > self.segments.len() {
            return None;
        }

        let mut params = ParamMap::default();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => match parts.get(i) {
                    Some(part) if *part == lit => {}
                    _ => return None,
                },
                Segment::Param(spec) => match parts.get(i) {
                    Some(part) => match spec.ty.coerce(part) {
                        Some(value) => {
                            params.insert(spec.name.clone(), value);
                        }
                        None if spec.optional => {
                            params.insert(spec.name.clone(), ParamValue::Absent);
                        }
                        None => return None,
                    },
                    // Trailing optional segment omitted from the path; the
                    // length check above guarantees it is optional.
                    None => {
                        params.insert(spec.name.clone(), ParamValue::Absent);
                    }
                },
            }
        }

        Some(params)
    }
}
