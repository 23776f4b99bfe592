//! Boolean AST over target words.

use crate::{Engine, Target};
use std::fmt;

/// A leaf of the expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Atom {
    /// A recognised matcher reference or bare glob.
    Target(Target),
    /// A word shaped like `X@...` whose letter (or delimiter) is not recognised.
    ///
    /// Evaluates to the empty set.
    Unknown(String),
}

impl Atom {
    /// Classify one word.
    #[must_use]
    pub fn parse(word: &str) -> Self {
        Target::parse(word).map_or_else(|| Self::Unknown(word.to_owned()), Self::Target)
    }

    /// The target, if recognised.
    #[must_use]
    pub fn target(&self) -> Option<&Target> {
        match self {
            Self::Target(t) => Some(t),
            Self::Unknown(_) => None,
        }
    }

    /// Returns `true` for an `N@` reference.
    #[must_use]
    pub fn is_nodegroup(&self) -> bool {
        self.target().is_some_and(|t| t.engine == Engine::Nodegroup)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target(t) => t.fmt(f),
            Self::Unknown(word) => f.write_str(word),
        }
    }
}

/// A parsed target expression.
///
/// Runs of one operator collapse into a single n-ary node. Operators have
/// equal precedence and apply left to right, so `a or b and c` is
/// `And([Or([a, b]), c])`.
///
/// `not` takes its complement against the set accumulated so far, not against
/// the registry: `a or not b` is `a`, and a `not` with nothing to its left
/// matches nothing.
///
/// ```
/// use tgt::{parse_compound, Expr};
///
/// let expr = parse_compound("web* and not ( L@web3 or E@web9 )").unwrap();
/// assert!(matches!(expr, Expr::And(..)));
/// assert_eq!(expr.to_string(), "web* and not ( L@web3 or E@web9 )");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Leaf.
    Atom(Atom),
    /// Intersection, folded left to right.
    And(Vec<Expr>),
    /// Union, folded left to right.
    Or(Vec<Expr>),
    /// Removes the operand from the accumulated set.
    Not(Box<Expr>),
}

impl Expr {
    /// Leaf for one word.
    #[must_use]
    pub fn atom(word: &str) -> Self {
        Self::Atom(Atom::parse(word))
    }

    /// `self and rhs`, extending `self` if it already is an `And`.
    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        match self {
            Self::And(mut terms) => {
                terms.push(rhs);
                Self::And(terms)
            }
            lhs => Self::And(vec![lhs, rhs]),
        }
    }

    /// `self or rhs`, extending `self` if it already is an `Or`.
    #[must_use]
    pub fn or(self, rhs: Self) -> Self {
        match self {
            Self::Or(mut terms) => {
                terms.push(rhs);
                Self::Or(terms)
            }
            lhs => Self::Or(vec![lhs, rhs]),
        }
    }

    /// `not self`
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Height of the tree; a single atom has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Atom(_) => 1,
            Self::And(terms) | Self::Or(terms) => {
                1 + terms.iter().map(Self::depth).max().unwrap_or(0)
            }
            Self::Not(inner) => 1 + inner.depth(),
        }
    }

    /// Leaves in left-to-right order.
    #[must_use]
    pub fn atoms(&self) -> Vec<&Atom> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a Atom>) {
        match self {
            Self::Atom(a) => out.push(a),
            Self::And(terms) | Self::Or(terms) => {
                for t in terms {
                    t.collect_atoms(out);
                }
            }
            Self::Not(inner) => inner.collect_atoms(out),
        }
    }

    /// Rebuild the tree, replacing every leaf with the expression `f` returns for it.
    ///
    /// # Errors
    ///
    /// Stops at the first error returned by `f`.
    pub fn try_map_atoms<E, F>(self, f: &mut F) -> Result<Self, E>
    where
        F: FnMut(Atom) -> Result<Self, E>,
    {
        Ok(match self {
            Self::Atom(a) => f(a)?,
            Self::And(terms) => Self::And(
                terms
                    .into_iter()
                    .map(|t| t.try_map_atoms(f))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Or(terms) => Self::Or(
                terms
                    .into_iter()
                    .map(|t| t.try_map_atoms(f))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Not(inner) => Self::Not(Box::new(inner.try_map_atoms(f)?)),
        })
    }

    fn is_compound(&self) -> bool {
        matches!(self, Self::And(_) | Self::Or(_))
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_compound() {
            write!(f, "( {self} )")
        } else {
            write!(f, "{self}")
        }
    }

    fn fmt_chain(terms: &[Self], op: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in terms.iter().enumerate() {
            if i == 0 {
                // The first operand is where the left-to-right fold starts.
                fmt::Display::fmt(t, f)?;
            } else {
                write!(f, " {op} ")?;
                t.fmt_operand(f)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(a) => a.fmt(f),
            Self::And(terms) => Self::fmt_chain(terms, "and", f),
            Self::Or(terms) => Self::fmt_chain(terms, "or", f),
            Self::Not(inner) => {
                f.write_str("not ")?;
                inner.fmt_operand(f)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_classification() {
        assert!(matches!(Atom::parse("web*"), Atom::Target(_)));
        assert!(matches!(Atom::parse("H@a"), Atom::Unknown(ref w) if w == "H@a"));
        assert!(Atom::parse("N@web").is_nodegroup());
        assert!(!Atom::parse("L@web").is_nodegroup());
    }

    #[test]
    fn runs_collapse_into_one_node() {
        let e = Expr::atom("a").or(Expr::atom("b")).or(Expr::atom("c"));
        assert_eq!(
            e,
            Expr::Or(vec![Expr::atom("a"), Expr::atom("b"), Expr::atom("c")])
        );
        let e = Expr::atom("a").or(Expr::atom("b")).and(Expr::atom("c"));
        assert_eq!(e.depth(), 3);
        let e = Expr::atom("a").and(Expr::atom("b").and(Expr::atom("c")));
        assert_eq!(e.to_string(), "a and ( b and c )");
    }

    #[test]
    fn display_parenthesises_right_operands() {
        let e = Expr::atom("a").and(Expr::atom("b").or(Expr::atom("c")));
        assert_eq!(e.to_string(), "a and ( b or c )");
        let e = Expr::atom("a").and(Expr::atom("b")).or(Expr::atom("c"));
        assert_eq!(e.to_string(), "a and b or c");
        let e = Expr::atom("a").or(Expr::atom("b")).not();
        assert_eq!(e.to_string(), "not ( a or b )");
        let e = Expr::atom("a").not().not();
        assert_eq!(e.to_string(), "not not a");
    }

    #[test]
    fn depth_and_atoms() {
        let e = Expr::atom("a").and(Expr::atom("b").not());
        assert_eq!(e.depth(), 3);
        let words: Vec<String> = e.atoms().iter().map(ToString::to_string).collect();
        assert_eq!(words, vec!["a", "b"]);
    }

    #[test]
    fn map_atoms_rewrites_leaves() {
        let e = Expr::atom("N@g").and(Expr::atom("x"));
        let out: Result<Expr, ()> = e.try_map_atoms(&mut |a| {
            Ok(if a.is_nodegroup() {
                Expr::atom("L@a").or(Expr::atom("L@b"))
            } else {
                Expr::Atom(a)
            })
        });
        assert_eq!(out.unwrap().to_string(), "L@a or L@b and x");
    }

    #[test]
    fn map_atoms_stops_on_error() {
        let e = Expr::atom("a").or(Expr::atom("b"));
        let mut seen = 0;
        let out: Result<Expr, &str> = e.try_map_atoms(&mut |_| {
            seen += 1;
            Err("boom")
        });
        assert!(out.is_err());
        assert_eq!(seen, 1);
    }
}
