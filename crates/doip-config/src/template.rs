//! Response templates with request mirroring
//!
//! A configured response is usually a plain hex string, but it may embed
//! mirror expressions that splice characters of the incoming request into
//! the response:
//!
//! ```yaml
//! responses:
//!   - "0x620C{request[4:8]}"
//! ```
//!
//! Indices address characters of the request's bare uppercase hex form and
//! follow slice semantics (half-open ranges, negative indices counted from
//! the end, out-of-bounds clamped). An expression that selects nothing
//! renders as `"00"` so the response still decodes as bytes.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::hex;

static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{request\[([^\]]*)\]\}").unwrap());

/// Filler emitted when a mirror expression selects no characters.
const EMPTY_SLICE_FILLER: &str = "00";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("response literal is not valid hex: '{0}'")]
    InvalidHex(String),

    #[error("invalid mirror expression '{0}'")]
    InvalidExpression(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Uppercase hex characters emitted verbatim.
    Literal(String),
    /// `{request[i]}`
    Index(isize),
    /// `{request[a:b]}` with either bound optional.
    Slice {
        start: Option<isize>,
        end: Option<isize>,
    },
}

/// A parsed response template, ready to render against a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTemplate {
    segments: Vec<Segment>,
}

impl ResponseTemplate {
    /// Parse a configured response string. A leading `0x` is stripped;
    /// literal parts must be hex characters.
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let stripped = hex::strip_prefix(raw);
        let mut segments = Vec::new();
        let mut cursor = 0;

        for captures in EXPRESSION.captures_iter(stripped) {
            let whole = captures.get(0).unwrap();
            if whole.start() > cursor {
                segments.push(parse_literal(&stripped[cursor..whole.start()])?);
            }
            segments.push(parse_expression(&captures[1])?);
            cursor = whole.end();
        }
        if cursor < stripped.len() {
            segments.push(parse_literal(&stripped[cursor..])?);
        }

        Ok(Self { segments })
    }

    /// Whether the template contains any mirror expressions.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Render the template against the request's bare uppercase hex form.
    pub fn render(&self, request_hex: &str) -> String {
        let chars: Vec<char> = request_hex.chars().collect();
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Index(i) => match resolve_index(*i, chars.len()) {
                    Some(pos) => out.push(chars[pos]),
                    None => out.push_str(EMPTY_SLICE_FILLER),
                },
                Segment::Slice { start, end } => {
                    let (from, to) = resolve_slice(*start, *end, chars.len());
                    if from < to {
                        out.extend(&chars[from..to]);
                    } else {
                        out.push_str(EMPTY_SLICE_FILLER);
                    }
                }
            }
        }
        out
    }
}

fn parse_literal(text: &str) -> Result<Segment, TemplateError> {
    if !text.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(TemplateError::InvalidHex(text.to_string()));
    }
    Ok(Segment::Literal(text.to_ascii_uppercase()))
}

fn parse_expression(spec: &str) -> Result<Segment, TemplateError> {
    let invalid = || TemplateError::InvalidExpression(spec.to_string());

    if let Some((start, end)) = spec.split_once(':') {
        let parse_bound = |s: &str| -> Result<Option<isize>, TemplateError> {
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<isize>().map(Some).map_err(|_| invalid())
            }
        };
        Ok(Segment::Slice {
            start: parse_bound(start.trim())?,
            end: parse_bound(end.trim())?,
        })
    } else {
        spec.trim()
            .parse::<isize>()
            .map(Segment::Index)
            .map_err(|_| invalid())
    }
}

fn resolve_index(index: isize, len: usize) -> Option<usize> {
    let len = len as isize;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        Some(resolved as usize)
    } else {
        None
    }
}

fn resolve_slice(start: Option<isize>, end: Option<isize>, len: usize) -> (usize, usize) {
    let clamp = |bound: isize| -> usize {
        let resolved = if bound < 0 { bound + len as isize } else { bound };
        resolved.clamp(0, len as isize) as usize
    };
    let from = start.map(clamp).unwrap_or(0);
    let to = end.map(clamp).unwrap_or(len);
    (from, to)
}
