//! Path template compilation and matching
//!
//! A template like `/users/{id:int}` compiles into a [`PathPattern`]: an
//! ordered list of segments where each parameter token carries the
//! transformer resolved for its kind. Matching is segment-wise and
//! case-sensitive; a templated segment consumes exactly one path segment
//! except the `path` kind, which greedily consumes the remainder.
//!
//! Compilation failures are fatal registration-time errors. Match-time
//! transformer rejections are not: they eliminate the candidate and the
//! router moves on to the next route.

use crate::error::RouteDefinitionError;
use crate::transform::{ParamValue, Transformer, TransformerRegistry};
use compact_str::CompactString;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Maximum number of inline path parameters before heap allocation.
pub const INLINE_PARAM_COUNT: usize = 8;

/// Maximum path segments for inline storage.
pub const INLINE_SEGMENT_COUNT: usize = 16;

// ============================================================================
// Segments
// ============================================================================

#[derive(Clone)]
enum Segment {
    Literal(CompactString),
    Param {
        name: CompactString,
        transformer: Arc<dyn Transformer>,
    },
    CatchAll {
        name: CompactString,
        transformer: Arc<dyn Transformer>,
    },
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(lit) => write!(f, "Literal({lit:?})"),
            Segment::Param { name, .. } => write!(f, "Param({name:?})"),
            Segment::CatchAll { name, .. } => write!(f, "CatchAll({name:?})"),
        }
    }
}

/// A parsed `{name}` / `{name:kind}` token.
struct Token<'a> {
    name: &'a str,
    kind: &'a str,
}

fn parse_token<'a>(template: &str, segment: &'a str) -> Result<Option<Token<'a>>, RouteDefinitionError> {
    let malformed = || RouteDefinitionError::MalformedToken {
        template: template.to_string(),
        token: segment.to_string(),
    };

    if !segment.contains(['{', '}']) {
        return Ok(None);
    }

    // Tokens must span the whole segment: `a{b}` is malformed, not literal.
    let inner = segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(malformed)?;
    if inner.contains(['{', '}']) {
        return Err(malformed());
    }

    let (name, kind) = match inner.split_once(':') {
        Some((n, k)) => (n, k),
        None => (inner, "str"),
    };

    let valid_name =
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name || kind.is_empty() {
        return Err(malformed());
    }

    Ok(Some(Token { name, kind }))
}

// ============================================================================
// Extracted parameters
// ============================================================================

/// Ordered parameter values extracted by a successful match.
///
/// Preserves left-to-right template order; each token appears exactly
/// once. Stored inline for typical routes.
#[derive(Debug, Clone, Default)]
pub struct ExtractedParams {
    params: SmallVec<[(CompactString, ParamValue); INLINE_PARAM_COUNT]>,
}

impl ExtractedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<CompactString>, value: ParamValue) {
        self.params.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v))
    }
}

// ============================================================================
// PathPattern
// ============================================================================

/// Compiled representation of a route template.
///
/// Immutable after compilation; matching is read-only and safe to share
/// across concurrent requests.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    segments: SmallVec<[Segment; INLINE_SEGMENT_COUNT]>,
    /// `(name, kind)` pairs in left-to-right template order.
    params: SmallVec<[(CompactString, CompactString); INLINE_PARAM_COUNT]>,
}

impl PathPattern {
    /// Compile a template against a transformer registry.
    ///
    /// Fails when a parameter name is duplicated, a kind is unknown, a
    /// token is malformed, or a `path`-kind token is not the final
    /// segment.
    pub fn compile(
        template: &str,
        registry: &TransformerRegistry,
    ) -> Result<Self, RouteDefinitionError> {
        let raw_segments: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = SmallVec::new();
        let mut params: SmallVec<[(CompactString, CompactString); INLINE_PARAM_COUNT]> =
            SmallVec::new();

        for (index, raw) in raw_segments.iter().enumerate() {
            let Some(token) = parse_token(template, raw)? else {
                segments.push(Segment::Literal(CompactString::new(raw)));
                continue;
            };

            if params.iter().any(|(n, _)| n.as_str() == token.name) {
                return Err(RouteDefinitionError::DuplicateParameter {
                    template: template.to_string(),
                    name: token.name.to_string(),
                });
            }

            let transformer = registry.resolve(token.kind).ok_or_else(|| {
                RouteDefinitionError::UnknownTransformer {
                    template: template.to_string(),
                    kind: token.kind.to_string(),
                }
            })?;

            let name = CompactString::new(token.name);
            params.push((name.clone(), CompactString::new(token.kind)));

            if token.kind == "path" {
                if index != raw_segments.len() - 1 {
                    return Err(RouteDefinitionError::CatchAllNotLast {
                        template: template.to_string(),
                        name: token.name.to_string(),
                    });
                }
                segments.push(Segment::CatchAll { name, transformer });
            } else {
                segments.push(Segment::Param { name, transformer });
            }
        }

        Ok(Self {
            template: template.to_string(),
            segments,
            params,
        })
    }

    /// The original template string.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// `(name, kind)` pairs in template order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, k)| (n.as_str(), k.as_str()))
    }

    /// Check whether a parameter name appears in this template.
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|(n, _)| n.as_str() == name)
    }

    fn has_catch_all(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::CatchAll { .. }))
    }

    /// Match a candidate path, extracting typed parameters.
    ///
    /// Returns `None` on any structural mismatch or transformer
    /// rejection; the caller treats that as "try the next route".
    pub fn match_path(&self, candidate: &str) -> Option<ExtractedParams> {
        let parts: SmallVec<[&str; INLINE_SEGMENT_COUNT]> =
            candidate.split('/').filter(|s| !s.is_empty()).collect();

        if self.has_catch_all() {
            if parts.len() < self.segments.len() - 1 {
                return None;
            }
        } else if parts.len() != self.segments.len() {
            return None;
        }

        let mut extracted = ExtractedParams::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if parts[i] != lit.as_str() {
                        return None;
                    }
                }
                Segment::Param { name, transformer } => {
                    let value = transformer.parse(parts[i]).ok()?;
                    extracted.push(name.clone(), value);
                }
                Segment::CatchAll { name, transformer } => {
                    let rest = parts[i..].join("/");
                    let value = transformer.parse(&rest).ok()?;
                    extracted.push(name.clone(), value);
                    break;
                }
            }
        }

        Some(extracted)
    }

    /// Rebuild a concrete path by substituting typed values for each
    /// token (reverse routing). Returns `None` when a parameter is
    /// missing or its value does not fit the token's transformer.
    pub fn expand(&self, values: &ExtractedParams) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Param { name, transformer }
                | Segment::CatchAll { name, transformer } => {
                    let value = values.get(name)?;
                    out.push_str(&transformer.format(value)?);
                }
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        Some(out)
    }
}
