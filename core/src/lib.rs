//! tgt - compound minion targeting
//!
//! Resolves target expressions such as `G@os:RedHat and not L@badhost` or
//! `web* or E@db\d+` against the minions known to a fleet.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! - [`CacheStore`] / [`MinionRegistry`]: injected collaborators, the per-minion
//!   grains/pillar cache and the enumerator of accepted minion IDs
//! - [`Target`]: one `<letter>[<delim>]@<pattern>` word, parsed
//! - [`TargetChecker`]: atomic matchers (glob, list, PCRE, grain, pillar, ipcidr, range)
//! - [`Expr`]: boolean AST (`And`, `Or`, `Not`, `Atom`) built by [`parse_compound`]
//! - [`Nodegroups`]: AST rewrite that substitutes `N@name` with the group's expression
//! - [`TargetChecker::check_minions`]: dispatcher routing a `tgt_type` to the
//!   right matcher or to the compound evaluator
//!
//! # Key invariants
//!
//! 1. **Results are sets.** Every matcher yields a [`BTreeSet`](std::collections::BTreeSet);
//!    boolean composition is set algebra. `not` removes from the set
//!    accumulated to its left.
//!
//! 2. **Under-match on failure.** A cache miss, fetch timeout or cancelled
//!    evaluation never widens a result. `not` over an incomplete operand is empty.
//!
//! 3. **Unknown letters are lenient only inside compound expressions.**
//!    `H@a` inside a compound yields the empty set; an unknown `tgt_type` is an error.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tgt::prelude::*;
//!
//! let registry = MemoryRegistry::from_iter(["alpha", "beta", "gamma", "iota"]);
//! let cache = MemoryCache::new();
//! let checker = TargetChecker::new(Opts::default(), Arc::new(registry), Arc::new(cache));
//!
//! let result = checker.check_minions("*ta", TargetType::Glob).unwrap();
//! assert_eq!(result.minion_list(), vec!["beta", "iota"]);
//!
//! let result = checker
//!     .check_minions("L@alpha,gamma or E@.*ta", TargetType::Compound)
//!     .unwrap();
//! assert_eq!(result.minions.len(), 4);
//! ```

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

mod compound;
mod dispatch;
mod eval;
mod expr;
mod ipcidr;
mod matchers;
mod nodegroup;
mod opts;
mod subdict;
mod target;
mod trace;
mod value_matcher;

pub mod store;

// ═══════════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════════

pub use compound::{parse_compound, parse_words, tokenize, Token};
pub use dispatch::{check_minions, CheckOptions, TargetArg, TargetType};
pub use eval::{CancelToken, MatchResult};
pub use expr::{Atom, Expr};
pub use ipcidr::{IpNetwork, IpTarget};
pub use matchers::TargetChecker;
pub use nodegroup::Nodegroups;
pub use opts::{NodegroupDef, Opts, OptsError};
pub use store::{
    CacheStore, FsCache, MemoryCache, MemoryRegistry, MinionData, MinionId, MinionRegistry,
    PkiRegistry, RangeResolver, StoreError,
};
pub use subdict::{SubdictQuery, ValueMode};
pub use target::{Engine, Target};
pub use trace::ExprTrace;
pub use value_matcher::ValueMatcher;

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Prelude module for convenient imports.
///
/// ```
/// use tgt::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Collaborators
        CacheStore,
        // Evaluation
        CancelToken,
        CheckOptions,
        Engine,
        Expr,
        ExprTrace,
        MatchResult,
        MemoryCache,
        MemoryRegistry,
        MinionData,
        MinionRegistry,
        Opts,
        Target,
        TargetArg,
        TargetChecker,
        // Errors
        TargetError,
        TargetType,
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Default key-path delimiter for grain and pillar targets.
pub const DEFAULT_TARGET_DELIM: char = ':';

/// Maximum nesting of parenthesised groups and nodegroup expansions.
///
/// Evaluation recurses over the AST, so the bound is enforced at parse and
/// expansion time rather than during evaluation.
pub const MAX_DEPTH: usize = 32;

/// Maximum length for glob and literal patterns.
pub const MAX_PATTERN_LENGTH: usize = 8192;

/// Maximum length for regex patterns.
///
/// Shorter than [`MAX_PATTERN_LENGTH`] because regex compilation cost grows
/// faster than glob compilation.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4096;

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors surfaced to the caller of a target check.
///
/// Matching aborts entirely on any of these; there is no partial result.
/// Per-minion cache failures are not errors: they degrade that minion to
/// non-matching and are only logged.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The compound grammar is malformed (unbalanced parens, dangling operator, ...).
    #[error("invalid target expression \"{expr}\": {reason}")]
    Parse {
        /// The expression as given by the caller.
        expr: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A regex, glob or CIDR literal could not be compiled.
    #[error("invalid pattern \"{pattern}\": {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The underlying compiler message.
        reason: String,
    },

    /// The dispatcher was given a `tgt_type` it does not know.
    #[error("unknown target type \"{tgt_type}\", expected one of: {}", .available.join(", "))]
    InvalidTargetType {
        /// The unrecognised type name.
        tgt_type: String,
        /// Type names that are recognised.
        available: Vec<&'static str>,
    },

    /// Parenthesis or nodegroup nesting exceeds [`MAX_DEPTH`].
    #[error("target nesting depth is {depth}, but maximum allowed is {max}")]
    DepthExceeded {
        /// Depth reached.
        depth: usize,
        /// Maximum allowed depth.
        max: usize,
    },

    /// A pattern exceeds [`MAX_PATTERN_LENGTH`] or [`MAX_REGEX_PATTERN_LENGTH`].
    #[error("pattern length is {len}, but maximum allowed is {max}")]
    PatternTooLong {
        /// Actual length of the pattern.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// The minion registry could not be enumerated.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TargetError {
    pub(crate) fn parse(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for grammar and pattern errors.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::InvalidPattern { .. } | Self::PatternTooLong { .. }
        )
    }
}
