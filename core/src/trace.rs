//! Evaluation trace for explaining a target expression.
//!
//! [`ExprTrace`] mirrors the [`Expr`](crate::Expr) tree but records the minion
//! set each node produced. Get one from
//! [`TargetChecker::explain`](crate::TargetChecker::explain).
//!
//! ```text
//! and -> [gamma, iota]
//!   or -> [alpha, beta, gamma, iota]
//!     L@alpha,gamma -> [alpha, gamma]
//!     E@.*ta -> [beta, iota]
//!   not -> [gamma, iota]
//!     G!@abc!bar!* -> [alpha, beta]
//! ```
//!
//! A `not` node shows what was left of the accumulated set after removing
//! its operand.

use crate::MinionId;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Trace of an expression evaluation.
///
/// `And`/`Or` always evaluate every child, so every node has a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ExprTrace {
    /// A single matcher.
    Atom {
        /// The target word.
        target: String,
        /// Minions it matched.
        minions: BTreeSet<MinionId>,
        /// `false` if cancellation cut this matcher short.
        complete: bool,
    },
    /// Intersection of the children.
    And {
        /// Result of this node.
        minions: BTreeSet<MinionId>,
        /// Operands, left to right.
        children: Vec<ExprTrace>,
    },
    /// Union of the children.
    Or {
        /// Result of this node.
        minions: BTreeSet<MinionId>,
        /// Operands, left to right.
        children: Vec<ExprTrace>,
    },
    /// The accumulated set minus the child.
    Not {
        /// Result of this node.
        minions: BTreeSet<MinionId>,
        /// Negated operand.
        inner: Box<ExprTrace>,
    },
}

impl ExprTrace {
    /// The minion set this node produced.
    #[must_use]
    pub fn minions(&self) -> &BTreeSet<MinionId> {
        match self {
            Self::Atom { minions, .. }
            | Self::And { minions, .. }
            | Self::Or { minions, .. }
            | Self::Not { minions, .. } => minions,
        }
    }

    /// `true` unless some matcher below this node was cut short.
    #[must_use]
    pub fn complete(&self) -> bool {
        match self {
            Self::Atom { complete, .. } => *complete,
            Self::And { children, .. } | Self::Or { children, .. } => {
                children.iter().all(Self::complete)
            }
            Self::Not { inner, .. } => inner.complete(),
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::Atom { target, .. } => target,
            Self::And { .. } => "and",
            Self::Or { .. } => "or",
            Self::Not { .. } => "not",
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let ids: Vec<&str> = self.minions().iter().map(String::as_str).collect();
        write!(f, "{:indent$}{} -> [{}]", "", self.label(), ids.join(", "))?;
        if let Self::Atom {
            complete: false, ..
        } = self
        {
            f.write_str(" (incomplete)")?;
        }
        writeln!(f)?;
        match self {
            Self::Atom { .. } => Ok(()),
            Self::And { children, .. } | Self::Or { children, .. } => children
                .iter()
                .try_for_each(|c| c.write_tree(f, indent + 2)),
            Self::Not { inner, .. } => inner.write_tree(f, indent + 2),
        }
    }
}

impl fmt::Display for ExprTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}
