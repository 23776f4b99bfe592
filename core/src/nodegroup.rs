//! Nodegroup expansion: `N@name` atoms are replaced by the group's parsed definition.
//!
//! Definitions may reference other groups. A cycle or an unknown group leaves
//! the `N@` atom in place, where it evaluates to the empty set.

use crate::{parse_words, Atom, Engine, Expr, NodegroupDef, Target, TargetError, Token, MAX_DEPTH};
use std::collections::BTreeMap;

/// Characters that mark a plain definition word as a regex rather than a minion ID.
const REGEX_CHARS: [char; 8] = ['(', '[', '{', '\\', '?', '}', ']', ')'];

/// Expands nodegroups from a definition table.
///
/// ```
/// use std::collections::BTreeMap;
/// use tgt::{parse_compound, NodegroupDef, Nodegroups};
///
/// let mut defs = BTreeMap::new();
/// defs.insert("web".to_owned(), NodegroupDef::from("web* or N@lb"));
/// defs.insert("lb".to_owned(), NodegroupDef::from("lb1 lb2"));
///
/// let groups = Nodegroups::new(&defs);
/// let expr = groups.resolve(parse_compound("N@web and G@os:Debian").unwrap()).unwrap();
/// assert_eq!(expr.to_string(), "web* or L@lb1,lb2 and G@os:Debian");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Nodegroups<'a> {
    defs: &'a BTreeMap<String, NodegroupDef>,
}

impl<'a> Nodegroups<'a> {
    /// Wrap a definition table.
    #[must_use]
    pub fn new(defs: &'a BTreeMap<String, NodegroupDef>) -> Self {
        Self { defs }
    }

    /// Parse the definition of `name` with nested groups expanded.
    ///
    /// Returns `Ok(None)` when the group is unknown, empty, or (transitively)
    /// refers to itself.
    ///
    /// # Errors
    ///
    /// Parse errors in a definition, or [`TargetError::DepthExceeded`] when
    /// expansion nests deeper than [`MAX_DEPTH`].
    pub fn expand(&self, name: &str) -> Result<Option<Expr>, TargetError> {
        self.expand_at(name, &mut Vec::new())
    }

    /// Replace every `N@` atom of `expr` with its expansion.
    ///
    /// # Errors
    ///
    /// Same as [`expand`](Self::expand).
    pub fn resolve(&self, expr: Expr) -> Result<Expr, TargetError> {
        bounded(self.resolve_at(expr, &mut Vec::new())?)
    }

    fn resolve_at(&self, expr: Expr, stack: &mut Vec<String>) -> Result<Expr, TargetError> {
        expr.try_map_atoms(&mut |atom| match atom {
            Atom::Target(t) if t.engine == Engine::Nodegroup => Ok(self
                .expand_at(&t.pattern, stack)?
                .unwrap_or(Expr::Atom(Atom::Target(t)))),
            other => Ok(Expr::Atom(other)),
        })
    }

    fn expand_at(&self, name: &str, stack: &mut Vec<String>) -> Result<Option<Expr>, TargetError> {
        if stack.iter().any(|n| n == name) {
            tracing::error!(nodegroup = name, chain = ?stack, "illegal nested nodegroup");
            return Ok(None);
        }
        if stack.len() >= MAX_DEPTH {
            return Err(TargetError::DepthExceeded {
                depth: stack.len() + 1,
                max: MAX_DEPTH,
            });
        }
        let Some(def) = self.defs.get(name) else {
            tracing::error!(nodegroup = name, "unknown nodegroup");
            return Ok(None);
        };

        let words = def.words();
        if words.is_empty() {
            tracing::warn!(nodegroup = name, "empty nodegroup definition");
            return Ok(None);
        }
        let expr = match shorthand(&words) {
            Some(word) => {
                tracing::debug!(nodegroup = name, expr = %word, "nodegroup is a plain list");
                Expr::atom(&word)
            }
            None => parse_words(&words)?,
        };

        stack.push(name.to_owned());
        let resolved = self.resolve_at(expr, stack);
        stack.pop();
        bounded(resolved?).map(Some)
    }
}

/// Splicing a group into a tree adds its height to the atom's position.
fn bounded(expr: Expr) -> Result<Expr, TargetError> {
    let depth = expr.depth();
    if depth > MAX_DEPTH {
        return Err(TargetError::DepthExceeded {
            depth,
            max: MAX_DEPTH,
        });
    }
    Ok(expr)
}

/// A definition with no operators, globs or matcher letters is a list of minion IDs,
/// or a regex alternation when any word contains regex metacharacters.
fn shorthand(words: &[String]) -> Option<String> {
    let plain = words.iter().all(|w| {
        !Token::from_word(w).is_operator()
            && !w.contains('*')
            && Target::parse(w).is_some_and(|t| t.engine == Engine::Glob)
    });
    if !plain {
        return None;
    }
    if words.iter().any(|w| w.contains(REGEX_CHARS)) {
        let alternation: Vec<String> = words.iter().map(|w| format!("(?:{w})")).collect();
        Some(format!("E@{}", alternation.join("|")))
    } else {
        Some(format!("L@{}", words.join(",")))
    }
}
