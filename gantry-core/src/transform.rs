//! Path parameter transformers
//!
//! A transformer is a named bidirectional converter between raw path
//! segments and typed values. The path compiler resolves `{name:kind}`
//! tokens against a [`TransformerRegistry`] at registration time, so a
//! route either compiles with every transformer it needs or fails fast.
//!
//! Parse failures at match time are rejections, not errors: they
//! eliminate one candidate route and the router keeps scanning.

use chrono::{DateTime, FixedOffset};
use compact_str::CompactString;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

// ============================================================================
// Typed values
// ============================================================================

/// A typed path parameter value produced by a transformer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(CompactString),
    Int(i64),
    Float(f64),
    Uuid(Uuid),
    DateTime(DateTime<FixedOffset>),
    /// Greedy catch-all capture; may contain `/`.
    Path(String),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s.as_str()),
            ParamValue::Path(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            ParamValue::Uuid(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            ParamValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }
}

/// Marker for a value a transformer refused to parse.
///
/// Treated as "this candidate route does not match", never surfaced as a
/// request error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseRejection;

// ============================================================================
// Transformer trait and built-ins
// ============================================================================

/// A bidirectional string <-> typed-value converter keyed by a kind name.
///
/// For every built-in kind except `path`, `parse(format(x)) == x` holds
/// for all valid `x`.
pub trait Transformer: Send + Sync {
    fn parse(&self, raw: &str) -> Result<ParamValue, ParseRejection>;
    fn format(&self, value: &ParamValue) -> Option<String>;
}

/// Identity transformer for plain string segments.
pub struct StrTransformer;

impl Transformer for StrTransformer {
    fn parse(&self, raw: &str) -> Result<ParamValue, ParseRejection> {
        Ok(ParamValue::Str(CompactString::new(raw)))
    }

    fn format(&self, value: &ParamValue) -> Option<String> {
        match value {
            ParamValue::Str(s) => Some(s.to_string()),
            _ => None,
        }
    }
}

/// Decimal integer transformer. Accepts an optional leading `-` followed
/// by ASCII digits only; anything else is rejected.
pub struct IntTransformer;

impl Transformer for IntTransformer {
    fn parse(&self, raw: &str) -> Result<ParamValue, ParseRejection> {
        let digits = raw.strip_prefix('-').unwrap_or(raw);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseRejection);
        }
        raw.parse::<i64>()
            .map(ParamValue::Int)
            .map_err(|_| ParseRejection)
    }

    fn format(&self, value: &ParamValue) -> Option<String> {
        value.as_int().map(|v| v.to_string())
    }
}

/// Standard decimal float transformer. NaN and Infinity tokens are
/// rejected: only `[0-9.eE+-]` characters are allowed, and the parsed
/// value must be finite.
pub struct FloatTransformer;

impl Transformer for FloatTransformer {
    fn parse(&self, raw: &str) -> Result<ParamValue, ParseRejection> {
        if raw.is_empty()
            || !raw
                .bytes()
                .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
        {
            return Err(ParseRejection);
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(ParamValue::Float(v)),
            _ => Err(ParseRejection),
        }
    }

    fn format(&self, value: &ParamValue) -> Option<String> {
        value.as_float().map(|v| v.to_string())
    }
}

/// Canonical 8-4-4-4-12 hex UUID transformer. Braced, URN, and
/// undashed forms are rejected.
pub struct UuidTransformer;

impl Transformer for UuidTransformer {
    fn parse(&self, raw: &str) -> Result<ParamValue, ParseRejection> {
        let canonical = raw.len() == 36
            && raw.bytes().enumerate().all(|(i, b)| match i {
                8 | 13 | 18 | 23 => b == b'-',
                _ => b.is_ascii_hexdigit(),
            });
        if !canonical {
            return Err(ParseRejection);
        }
        Uuid::parse_str(raw)
            .map(ParamValue::Uuid)
            .map_err(|_| ParseRejection)
    }

    fn format(&self, value: &ParamValue) -> Option<String> {
        value.as_uuid().map(|v| v.hyphenated().to_string())
    }
}

/// ISO-8601 / RFC 3339 datetime transformer.
pub struct DateTimeTransformer;

impl Transformer for DateTimeTransformer {
    fn parse(&self, raw: &str) -> Result<ParamValue, ParseRejection> {
        DateTime::parse_from_rfc3339(raw)
            .map(ParamValue::DateTime)
            .map_err(|_| ParseRejection)
    }

    fn format(&self, value: &ParamValue) -> Option<String> {
        value.as_datetime().map(|v| v.to_rfc3339())
    }
}

/// Greedy catch-all transformer. No validation; exempt from the
/// round-trip law beyond identity.
pub struct PathTransformer;

impl Transformer for PathTransformer {
    fn parse(&self, raw: &str) -> Result<ParamValue, ParseRejection> {
        Ok(ParamValue::Path(raw.to_string()))
    }

    fn format(&self, value: &ParamValue) -> Option<String> {
        match value {
            ParamValue::Path(s) => Some(s.clone()),
            _ => None,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of transformer kinds available to the path compiler.
///
/// Built-in kinds (`str`, `int`, `float`, `uuid`, `datetime`, `path`)
/// ship pre-registered. Re-registering a kind overwrites the previous
/// entry, last write wins, with a warning.
pub struct TransformerRegistry {
    kinds: HashMap<CompactString, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    /// Create an empty registry with no kinds at all.
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Create a registry with all built-in kinds pre-registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("str", Arc::new(StrTransformer));
        registry.register("int", Arc::new(IntTransformer));
        registry.register("float", Arc::new(FloatTransformer));
        registry.register("uuid", Arc::new(UuidTransformer));
        registry.register("datetime", Arc::new(DateTimeTransformer));
        registry.register("path", Arc::new(PathTransformer));
        registry
    }

    /// Register a transformer under a kind name.
    pub fn register(&mut self, kind: &str, transformer: Arc<dyn Transformer>) {
        if self
            .kinds
            .insert(CompactString::new(kind), transformer)
            .is_some()
        {
            warn!(kind = kind, "transformer kind overwritten; last write wins");
        }
    }

    /// Resolve a transformer by kind name.
    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn Transformer>> {
        self.kinds.get(kind).cloned()
    }

    /// Check whether a kind is registered.
    pub fn has(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_round_trip() {
        let t = IntTransformer;
        for v in [0i64, 42, -7, i64::MAX, i64::MIN] {
            let formatted = t.format(&ParamValue::Int(v)).unwrap();
            assert_eq!(t.parse(&formatted).unwrap(), ParamValue::Int(v));
        }
    }

    #[test]
    fn test_int_rejects_non_digits() {
        let t = IntTransformer;
        for raw in ["abc", "1e3", "+5", " 42", "42 ", "4.2", "", "-"] {
            assert_eq!(t.parse(raw), Err(ParseRejection), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_int_accepts_leading_zeros() {
        let t = IntTransformer;
        assert_eq!(t.parse("007").unwrap(), ParamValue::Int(7));
    }

    #[test]
    fn test_float_round_trip() {
        let t = FloatTransformer;
        for v in [0.0f64, 1.5, -2.25, 1e10, 3.141592653589793] {
            let formatted = t.format(&ParamValue::Float(v)).unwrap();
            assert_eq!(t.parse(&formatted).unwrap(), ParamValue::Float(v));
        }
    }

    #[test]
    fn test_float_rejects_nan_and_infinity() {
        let t = FloatTransformer;
        for raw in ["NaN", "nan", "inf", "Infinity", "-inf", "1.0.0x"] {
            assert_eq!(t.parse(raw), Err(ParseRejection), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_uuid_round_trip() {
        let t = UuidTransformer;
        let id = Uuid::new_v4();
        let formatted = t.format(&ParamValue::Uuid(id)).unwrap();
        assert_eq!(t.parse(&formatted).unwrap(), ParamValue::Uuid(id));
    }

    #[test]
    fn test_uuid_rejects_non_canonical_forms() {
        let t = UuidTransformer;
        let id = Uuid::new_v4();
        let simple = id.simple().to_string();
        let braced = format!("{{{}}}", id.hyphenated());
        for raw in [simple.as_str(), braced.as_str(), "not-a-uuid", ""] {
            assert_eq!(t.parse(raw), Err(ParseRejection), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_datetime_round_trip() {
        let t = DateTimeTransformer;
        let dt = DateTime::parse_from_rfc3339("2024-06-01T12:30:00+02:00").unwrap();
        let formatted = t.format(&ParamValue::DateTime(dt)).unwrap();
        assert_eq!(t.parse(&formatted).unwrap(), ParamValue::DateTime(dt));
    }

    #[test]
    fn test_datetime_rejects_garbage() {
        let t = DateTimeTransformer;
        assert_eq!(t.parse("yesterday"), Err(ParseRejection));
        assert_eq!(t.parse("2024-13-99"), Err(ParseRejection));
    }

    #[test]
    fn test_path_is_identity() {
        let t = PathTransformer;
        let parsed = t.parse("docs/readme.md").unwrap();
        assert_eq!(parsed, ParamValue::Path("docs/readme.md".to_string()));
        assert_eq!(t.format(&parsed).unwrap(), "docs/readme.md");
    }

    #[test]
    fn test_builtins_registered() {
        let registry = TransformerRegistry::with_builtins();
        for kind in ["str", "int", "float", "uuid", "datetime", "path"] {
            assert!(registry.has(kind), "missing builtin {kind}");
        }
        assert!(!registry.has("slug"));
    }

    #[test]
    fn test_overwrite_last_write_wins() {
        let mut registry = TransformerRegistry::with_builtins();
        registry.register("int", Arc::new(StrTransformer));
        let t = registry.resolve("int").unwrap();
        // The replacement accepts what the original rejected.
        assert!(t.parse("abc").is_ok());
    }

    #[test]
    fn test_format_wrong_variant_is_none() {
        assert_eq!(IntTransformer.format(&ParamValue::Str("x".into())), None);
        assert_eq!(UuidTransformer.format(&ParamValue::Int(1)), None);
    }
}
