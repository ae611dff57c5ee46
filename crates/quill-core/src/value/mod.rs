//! The closed runtime value union.
//!
//! Every expression evaluation produces exactly one `Value` (or fails with a
//! structured error). "Absence" is the explicit `Missing` state, never a null
//! reference; type checks are capability checks against the union.

mod number;

pub use number::{ArithOp, ArithmeticEngine, DecimalEngine, IntegerEngine, Number};

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use chrono::NaiveDateTime;
use itertools::Itertools;

use crate::ast::CallableDef;
use crate::blame::Blame;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::output::MarkupOutput;

/// Opaque id of a namespace inside one evaluation's namespace arena.
pub type NamespaceId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A reference that resolved to nothing. Distinct from any "null"
    /// representable inside a container.
    Missing,
    /// The zero value produced by `expr!` with no default: behaves as empty
    /// string, empty sequence and empty hash at the same time.
    Nothing,
    Bool(bool),
    Number(Number),
    String(Arc<str>),
    Date(ValueDate),
    Seq(Arc<Vec<Value>>),
    Range(ValueRange),
    Hash(ValueHash),
    Node(Arc<ValueNode>),
    Namespace(NamespaceId),
    Callable(BoundCallable),
    Method(ValueMethod),
    Directive(ValueDirective),
    Markup(MarkupOutput),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn seq(values: Vec<Value>) -> Value {
        Value::Seq(Arc::new(values))
    }

    pub fn int(v: i64) -> Value {
        Value::Number(Number::Int(v))
    }

    pub fn decimal(v: f64) -> Value {
        Value::Number(Number::Decimal(v))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_) | Value::Nothing)
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Seq(_) | Value::Range(_) | Value::Nothing)
    }

    pub fn is_hash(&self) -> bool {
        matches!(self, Value::Hash(_) | Value::Namespace(_) | Value::Nothing)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// Emptiness ("has content" inverse). Sequences and hashes are empty at
    /// size 0, strings at zero length; other kinds are never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Missing | Value::Nothing => true,
            Value::String(s) => s.is_empty(),
            Value::Markup(mo) => mo.is_empty(),
            Value::Seq(items) => items.is_empty(),
            Value::Range(range) => range.size() == Some(0),
            Value::Hash(hash) => hash.is_empty(),
            _ => false,
        }
    }

    /// Human-readable kind name for diagnostics.
    pub fn type_description(&self) -> &'static str {
        match self {
            Value::Missing => "missing value",
            Value::Nothing => "nothing (a defaulted missing value)",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(date) => date.kind.description(),
            Value::Seq(_) => "sequence",
            Value::Range(_) => "range",
            Value::Hash(_) => "hash",
            Value::Node(_) => "node",
            Value::Namespace(_) => "namespace",
            Value::Callable(callable) => {
                if callable.def.is_function {
                    "function"
                } else {
                    "macro"
                }
            }
            Value::Method(_) => "method",
            Value::Directive(_) => "user-defined directive",
            Value::Markup(_) => "markup output",
        }
    }

    /// String coercion per the configured formats. Booleans map to the
    /// configured true/false strings, numbers and date-likes go through the
    /// configured formats; anything else is a coercion error.
    pub fn coerce_to_string(&self, cfg: &EngineConfig) -> Result<String> {
        match self {
            Value::Nothing => Ok(String::new()),
            Value::String(s) => Ok(s.to_string()),
            Value::Bool(b) => Ok(if *b {
                cfg.boolean_true.clone()
            } else {
                cfg.boolean_false.clone()
            }),
            Value::Number(n) => Ok(crate::format::format_number(*n)),
            Value::Date(date) => crate::format::format_date(date, cfg),
            other => Err(Error::TypeMismatch {
                expected: "string or something automatically convertible to string \
                           (number, date or boolean)"
                    .to_string(),
                actual: other.type_description().to_string(),
                blame: Blame::new("The value can't be converted to a string."),
            }),
        }
    }

    /// Number coercion. Strings are parsed through the active arithmetic
    /// engine.
    pub fn coerce_to_number(&self, cfg: &EngineConfig) -> Result<Number> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::String(s) => cfg.arithmetic.parse(s),
            other => Err(Error::TypeMismatch {
                expected: "number".to_string(),
                actual: other.type_description().to_string(),
                blame: Blame::new("The value can't be used as a number."),
            }),
        }
    }

    /// Indexed access over the sequence capability. Ranges are evaluated
    /// lazily; a right-unbounded range answers any non-negative index.
    pub fn seq_get(&self, index: i64) -> Option<Value> {
        match self {
            Value::Seq(items) => {
                if index < 0 {
                    return None;
                }
                items.get(index as usize).cloned()
            }
            Value::Range(range) => range.get(index).map(Value::int),
            Value::Nothing => None,
            _ => None,
        }
    }

    /// Size of the sequence/hash/string capability; `None` when the value has
    /// no countable capability or the count is unbounded.
    pub fn size(&self) -> Option<usize> {
        match self {
            Value::Seq(items) => Some(items.len()),
            Value::Range(range) => range.size().map(|n| n as usize),
            Value::Hash(hash) => Some(hash.len()),
            Value::Nothing => Some(0),
            _ => None,
        }
    }

    /// Count elements, stopping as soon as `limit` is reached. For unbounded
    /// ranges this returns `limit`, which keeps size-comparisons observably
    /// identical to exact counting.
    pub fn count_up_to(&self, limit: usize) -> Option<usize> {
        match self {
            Value::Range(range) => Some(range.count_up_to(limit)),
            other => other.size().map(|n| n.min(limit)),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "<missing>"),
            Value::Nothing => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(date) => write!(f, "{}", date.stamp),
            Value::Seq(items) => write!(f, "[{}]", items.iter().format(", ")),
            Value::Range(range) => write!(f, "{}", range),
            Value::Hash(hash) => write!(f, "{}", hash),
            Value::Node(node) => write!(f, "<node {}>", node.name),
            Value::Namespace(id) => write!(f, "<namespace #{}>", id),
            Value::Callable(callable) => write!(f, "<callable {}>", callable.def.name),
            Value::Method(method) => write!(f, "<method {}>", method.name),
            Value::Directive(directive) => write!(f, "<directive {}>", directive.name),
            Value::Markup(mo) => write!(f, "{}", mo.markup_string()),
        }
    }
}

/// Sub-kind of a date-like value. `Unknown` means the adapter could not tell;
/// formatting such a value is an error until the template disambiguates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DateKind {
    Date,
    Time,
    DateTime,
    Unknown,
}

impl DateKind {
    pub fn description(self) -> &'static str {
        match self {
            DateKind::Date => "date-like (date)",
            DateKind::Time => "date-like (time)",
            DateKind::DateTime => "date-like (date-time)",
            DateKind::Unknown => "date-like (unknown)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueDate {
    pub kind: DateKind,
    pub stamp: NaiveDateTime,
}

impl ValueDate {
    pub fn new(kind: DateKind, stamp: NaiveDateTime) -> Self {
        Self { kind, stamp }
    }
}

/// Ordered string-keyed mapping. Lookups scan from the newest entry so a
/// legacy-mode hash that carries duplicate keys still resolves to the last
/// write, while iteration exposes whatever the construction mode recorded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueHash {
    entries: Arc<Vec<(Arc<str>, Value)>>,
}

impl ValueHash {
    /// Build with last-write-wins semantics: duplicate keys overwrite in
    /// place.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Arc<str>, Value)>) -> Self {
        let mut entries: Vec<(Arc<str>, Value)> = Vec::new();
        for (key, value) in pairs {
            if let Some(existing) = entries.iter_mut().find(|(k, _)| *k == key) {
                existing.1 = value;
            } else {
                entries.push((key, value));
            }
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Legacy compatibility mode: duplicate keys are all retained in
    /// iteration order, though lookup still returns the last write.
    pub fn from_pairs_keeping_duplicates(
        pairs: impl IntoIterator<Item = (Arc<str>, Value)>,
    ) -> Self {
        Self {
            entries: Arc::new(pairs.into_iter().collect()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Arc<str>> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl Display for ValueHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.iter()
                .format_with(", ", |(key, value), g| g(&format_args!("{}: {}", key, value)))
        )
    }
}

/// Numeric range, bounded or right-unbounded. Unbounded ranges are never
/// materialized; indexed access computes elements on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRange {
    pub start: i64,
    pub limit: RangeLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeLimit {
    /// `a..b`, end included; may descend.
    Inclusive(i64),
    /// `a..<b`, end excluded; may descend.
    Exclusive(i64),
    /// `a..*n`, |n| elements from the start; a negative n counts downward.
    Length(i64),
    /// `a..`, open on the right.
    Unbounded,
}

impl ValueRange {
    pub fn new(start: i64, limit: RangeLimit) -> Self {
        Self { start, limit }
    }

    pub fn size(&self) -> Option<i64> {
        match self.limit {
            RangeLimit::Inclusive(end) => Some((end - self.start).abs() + 1),
            RangeLimit::Exclusive(end) => Some((end - self.start).abs()),
            RangeLimit::Length(n) => Some(n.abs()),
            RangeLimit::Unbounded => None,
        }
    }

    fn step(&self) -> i64 {
        match self.limit {
            RangeLimit::Inclusive(end) | RangeLimit::Exclusive(end) if end < self.start => -1,
            RangeLimit::Length(n) if n < 0 => -1,
            _ => 1,
        }
    }

    pub fn get(&self, index: i64) -> Option<i64> {
        if index < 0 {
            return None;
        }
        if let Some(size) = self.size() {
            if index >= size {
                return None;
            }
        }
        Some(self.start + index * self.step())
    }

    pub fn count_up_to(&self, limit: usize) -> usize {
        match self.size() {
            Some(size) => (size as usize).min(limit),
            None => limit,
        }
    }

    pub fn iter(&self) -> RangeIter {
        RangeIter {
            range: *self,
            next_index: 0,
        }
    }
}

impl Display for ValueRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.limit {
            RangeLimit::Inclusive(end) => write!(f, "{}..{}", self.start, end),
            RangeLimit::Exclusive(end) => write!(f, "{}..<{}", self.start, end),
            RangeLimit::Length(n) => write!(f, "{}..*{}", self.start, n),
            RangeLimit::Unbounded => write!(f, "{}..", self.start),
        }
    }
}

/// Streams range elements; unbounded ranges stream forever, so consumers are
/// expected to bound their own demand.
pub struct RangeIter {
    range: ValueRange,
    next_index: i64,
}

impl Iterator for RangeIter {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let item = self.range.get(self.next_index)?;
        self.next_index += 1;
        Some(item)
    }
}

/// Tree-structured node value, the shape XML/DOM adapters map into.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueNode {
    pub name: Arc<str>,
    pub namespace: Option<Arc<str>>,
    pub kind: NodeKind,
    pub children: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
}

/// A callable definition paired with the namespace/template it was reached
/// through. The definition is parse-time immutable and shared; bound
/// callables are cheap wrappers created on demand.
#[derive(Debug, Clone)]
pub struct BoundCallable {
    pub def: Arc<CallableDef>,
    pub namespace: NamespaceId,
    pub template: Arc<str>,
}

impl PartialEq for BoundCallable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def) && self.namespace == other.namespace
    }
}

/// Host-provided callable. "Extended" methods receive typed values;
/// non-extended ones receive the arguments already coerced to strings.
#[derive(Clone)]
pub struct ValueMethod {
    pub name: Arc<str>,
    pub imp: MethodImpl,
}

#[derive(Clone)]
pub enum MethodImpl {
    Simple(Arc<dyn Fn(&[String]) -> Result<Value> + Send + Sync>),
    Extended(Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>),
}

impl ValueMethod {
    pub fn simple(
        name: impl Into<Arc<str>>,
        f: impl Fn(&[String]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            imp: MethodImpl::Simple(Arc::new(f)),
        }
    }

    pub fn extended(
        name: impl Into<Arc<str>>,
        f: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            imp: MethodImpl::Extended(Arc::new(f)),
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self.imp, MethodImpl::Extended(_))
    }
}

impl fmt::Debug for ValueMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ValueMethod({})", self.name)
    }
}

impl PartialEq for ValueMethod {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && match (&self.imp, &other.imp) {
                (MethodImpl::Simple(a), MethodImpl::Simple(b)) => Arc::ptr_eq(a, b),
                (MethodImpl::Extended(a), MethodImpl::Extended(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

/// Rendering callback for the block passed to a custom directive. The host
/// may call it zero or more times; each call renders against the then-current
/// output stream.
pub trait DirectiveBody {
    fn render(&mut self, loop_vars: &[Value]) -> Result<()>;
}

/// Host-provided directive implementation (transforms, tag libraries, …).
pub trait TemplateDirective: Send + Sync {
    fn execute(
        &self,
        params: &[(Arc<str>, Value)],
        body: Option<&mut dyn DirectiveBody>,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct ValueDirective {
    pub name: Arc<str>,
    pub imp: Arc<dyn TemplateDirective>,
}

impl ValueDirective {
    pub fn new(name: impl Into<Arc<str>>, imp: Arc<dyn TemplateDirective>) -> Self {
        Self {
            name: name.into(),
            imp,
        }
    }
}

impl fmt::Debug for ValueDirective {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ValueDirective({})", self.name)
    }
}

impl PartialEq for ValueDirective {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.imp, &other.imp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn nothing_has_all_three_zero_capabilities() {
        let nothing = Value::Nothing;
        assert!(nothing.is_string());
        assert!(nothing.is_sequence());
        assert!(nothing.is_hash());
        assert_eq!(nothing.size(), Some(0));
        assert_eq!(
            nothing.coerce_to_string(&EngineConfig::default()).unwrap(),
            ""
        );
    }

    #[test]
    fn hash_lookup_returns_last_write_even_with_duplicates() {
        let hash = ValueHash::from_pairs_keeping_duplicates(vec![
            (Arc::from("a"), Value::int(1)),
            (Arc::from("b"), Value::int(2)),
            (Arc::from("a"), Value::int(3)),
        ]);
        assert_eq!(hash.get("a"), Some(&Value::int(3)));
        assert_eq!(hash.keys().count(), 3);

        let modern = ValueHash::from_pairs(vec![
            (Arc::from("a"), Value::int(1)),
            (Arc::from("b"), Value::int(2)),
            (Arc::from("a"), Value::int(3)),
        ]);
        assert_eq!(modern.get("a"), Some(&Value::int(3)));
        assert_eq!(modern.keys().count(), 2);
    }

    #[test]
    fn unbounded_range_supports_indexed_access() {
        let range = ValueRange::new(10, RangeLimit::Unbounded);
        assert_eq!(range.get(0), Some(10));
        assert_eq!(range.get(1_000_000), Some(1_000_010));
        assert_eq!(range.size(), None);
        assert_eq!(range.count_up_to(7), 7);
    }

    #[test]
    fn descending_range_steps_down() {
        let range = ValueRange::new(5, RangeLimit::Inclusive(1));
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![5, 4, 3, 2, 1]);
        let range = ValueRange::new(5, RangeLimit::Exclusive(1));
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![5, 4, 3, 2]);
    }

    #[test]
    fn negative_length_range_descends() {
        let range = ValueRange::new(5, RangeLimit::Length(-3));
        assert_eq!(range.size(), Some(3));
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![5, 4, 3]);
        assert_eq!(ValueRange::new(5, RangeLimit::Length(0)).size(), Some(0));
    }

    #[test]
    fn bool_coercion_uses_configured_strings() {
        let mut cfg = EngineConfig::default();
        cfg.boolean_true = "yes".to_string();
        cfg.boolean_false = "no".to_string();
        assert_eq!(Value::Bool(true).coerce_to_string(&cfg).unwrap(), "yes");
        assert_eq!(Value::Bool(false).coerce_to_string(&cfg).unwrap(), "no");
    }

    #[test]
    fn hash_coercion_to_string_is_an_error() {
        let err = Value::Hash(ValueHash::default())
            .coerce_to_string(&EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
