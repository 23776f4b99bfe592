//! Key-path matching over nested grain/pillar data.
//!
//! An expression such as `abc:bar:*` is ambiguous: it may mean "key `abc`
//! matches `bar:*`" or "key `abc:bar` matches `*`". Every split point is tried,
//! deepest key first. Lists are walked with numeric segments or by looking
//! inside embedded objects.

use crate::{TargetError, ValueMatcher, MAX_PATTERN_LENGTH, MAX_REGEX_PATTERN_LENGTH};
use serde_json::{Map, Value};
use std::borrow::Cow;

const WILDCARD: &str = "*";

/// How the value half of a key-path expression is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    /// fnmatch-style glob.
    Glob,
    /// Regex anchored at the start of the value.
    Regex,
    /// Equality.
    Exact,
}

/// A compiled `key<delim>value` query.
///
/// Comparisons are case-insensitive. Keys are looked up verbatim.
///
/// ```
/// use serde_json::json;
/// use tgt::{SubdictQuery, ValueMode};
///
/// let grains = json!({"abc": "bar:baz", "roles": ["web", "db"]});
/// let grains = grains.as_object().unwrap();
///
/// assert!(SubdictQuery::new("abc:*:*", ':', ValueMode::Glob).unwrap().matches(grains));
/// assert!(SubdictQuery::new("roles:DB", ':', ValueMode::Exact).unwrap().matches(grains));
/// assert!(!SubdictQuery::new("abc", ':', ValueMode::Glob).unwrap().matches(grains));
/// ```
#[derive(Debug, Clone)]
pub struct SubdictQuery {
    segments: Vec<String>,
    /// `suffixes[i]` is `segments[i..]` rejoined with the delimiter.
    suffixes: Vec<String>,
    /// One matcher per suffix; `None` if that suffix does not compile.
    matchers: Vec<Option<ValueMatcher>>,
}

impl SubdictQuery {
    /// Compile a query.
    ///
    /// Each split point yields its own value pattern, and a pattern that does
    /// not compile at one split point may still compile at another. Compilation
    /// only fails when no candidate value pattern is usable.
    ///
    /// # Errors
    ///
    /// [`TargetError::InvalidPattern`] when no value pattern compiles,
    /// [`TargetError::PatternTooLong`] when the expression exceeds the limit
    /// for `mode`.
    pub fn new(expr: &str, delimiter: char, mode: ValueMode) -> Result<Self, TargetError> {
        let max = match mode {
            ValueMode::Regex => MAX_REGEX_PATTERN_LENGTH,
            ValueMode::Glob | ValueMode::Exact => MAX_PATTERN_LENGTH,
        };
        if expr.len() > max {
            return Err(TargetError::PatternTooLong {
                len: expr.len(),
                max,
            });
        }

        let segments: Vec<String> = expr.split(delimiter).map(str::to_owned).collect();
        let delim = delimiter.to_string();
        let suffixes: Vec<String> = (0..segments.len())
            .map(|i| segments[i..].join(&delim))
            .collect();

        let mut first_error = None;
        let mut matchers = Vec::with_capacity(suffixes.len());
        for suffix in &suffixes {
            let compiled = match mode {
                ValueMode::Glob => ValueMatcher::glob(suffix, true),
                ValueMode::Regex => ValueMatcher::regex_match(suffix, true),
                ValueMode::Exact => Ok(ValueMatcher::exact(suffix, true)),
            };
            match compiled {
                Ok(m) => matchers.push(Some(m)),
                Err(e) => {
                    first_error.get_or_insert(e);
                    matchers.push(None);
                }
            }
        }

        // Without a delimiter nothing can match, so there is nothing to reject.
        if segments.len() > 1 && matchers[1..].iter().all(Option::is_none) {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(Self {
            segments,
            suffixes,
            matchers,
        })
    }

    /// Check the query against one minion's grains or pillar.
    #[must_use]
    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        self.subdict(data, 0)
    }

    fn subdict(&self, data: &Map<String, Value>, start: usize) -> bool {
        let n = self.segments.len();
        if n.saturating_sub(start) < 2 {
            return false;
        }

        for idx in (start + 1..n).rev() {
            let key = &self.segments[start..idx];
            let hit = if key.len() == 1 && key[0] == WILDCARD {
                // `*` as the key means the whole object, matched against the full pattern.
                !data.is_empty() && self.dict_match(data, start)
            } else {
                tracing::trace!(
                    key = %key.join(" "),
                    pattern = %self.suffixes[idx],
                    "trying split"
                );
                match traverse(data, key) {
                    None => false,
                    Some(Value::Object(map)) if map.is_empty() => false,
                    Some(Value::Object(map)) => self.dict_match(map, idx),
                    Some(Value::Array(items)) => items.iter().any(|member| {
                        member
                            .as_object()
                            .is_some_and(|map| self.dict_match(map, idx))
                            || self.value_match(member, idx)
                    }),
                    Some(leaf) => self.value_match(leaf, idx),
                }
            };
            if hit {
                return true;
            }
        }
        false
    }

    fn dict_match(&self, target: &Map<String, Value>, start: usize) -> bool {
        let n = self.segments.len();
        let wildcard = n - start >= 2 && self.segments[start] == WILDCARD;
        let at = if wildcard { start + 1 } else { start };
        let pattern = &self.suffixes[at];

        if pattern == WILDCARD || target.contains_key(pattern.as_str()) || self.subdict(target, at) {
            return true;
        }

        wildcard
            && target.values().any(|value| match value {
                Value::Object(map) => self.dict_match(map, at),
                Value::Array(items) => items.iter().any(|item| self.value_match(item, at)),
                leaf => self.value_match(leaf, at),
            })
    }

    fn value_match(&self, value: &Value, idx: usize) -> bool {
        self.matchers[idx]
            .as_ref()
            .is_some_and(|m| m.matches(&stringify(value)))
    }
}

/// Walk `path` from the top-level object.
fn traverse<'a>(data: &'a Map<String, Value>, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut ptr = data.get(first.as_str())?;
    for segment in rest {
        ptr = match ptr {
            Value::Object(map) => map.get(segment.as_str())?,
            Value::Array(items) => match segment.parse::<i64>() {
                Ok(idx) => index(items, idx)?,
                Err(_) => items
                    .iter()
                    .filter_map(Value::as_object)
                    .find_map(|embedded| embedded.get(segment.as_str()))?,
            },
            _ => return None,
        };
    }
    Some(ptr)
}

/// Index a list, counting from the end for negative indices.
fn index(items: &[Value], idx: i64) -> Option<&Value> {
    let len = i64::try_from(items.len()).ok()?;
    let idx = if idx < 0 { len + idx } else { idx };
    usize::try_from(idx).ok().and_then(|i| items.get(i))
}

/// Render a cached value the way patterns see it.
///
/// Strings are used as-is, `null` reads as `None`, and containers are rendered
/// as compact JSON.
pub(crate) fn stringify(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed("None"),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        other => Cow::Owned(other.to_string()),
    }
}
