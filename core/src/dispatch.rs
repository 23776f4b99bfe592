//! Dispatcher: route a `tgt_type` to an atomic matcher or the compound evaluator.

use crate::eval::{Plan, Session};
use crate::{
    parse_compound, parse_words, Atom, CancelToken, Engine, Expr, ExprTrace, MatchResult,
    Nodegroups, Target, TargetChecker, TargetError, DEFAULT_TARGET_DELIM,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// How the dispatcher interprets a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Shell glob on minion IDs.
    Glob,
    /// Regex search on minion IDs.
    Pcre,
    /// Comma-separated minion IDs.
    List,
    /// Glob on a grain value.
    Grain,
    /// Regex on a grain value.
    GrainPcre,
    /// Glob on a pillar value.
    Pillar,
    /// Regex on a pillar value.
    PillarPcre,
    /// Equality on a pillar value.
    PillarExact,
    /// IP address or CIDR network.
    Ipcidr,
    /// Named nodegroup.
    Nodegroup,
    /// Range-server expression.
    Range,
    /// Boolean expression over matcher words.
    Compound,
    /// Compound expression where `I@` and `J@` compare by equality.
    CompoundPillarExact,
}

impl TargetType {
    /// Every target type, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::Glob,
        Self::Pcre,
        Self::List,
        Self::Grain,
        Self::GrainPcre,
        Self::Pillar,
        Self::PillarPcre,
        Self::PillarExact,
        Self::Ipcidr,
        Self::Nodegroup,
        Self::Range,
        Self::Compound,
        Self::CompoundPillarExact,
    ];

    /// The `tgt_type` name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Glob => "glob",
            Self::Pcre => "pcre",
            Self::List => "list",
            Self::Grain => "grain",
            Self::GrainPcre => "grain_pcre",
            Self::Pillar => "pillar",
            Self::PillarPcre => "pillar_pcre",
            Self::PillarExact => "pillar_exact",
            Self::Ipcidr => "ipcidr",
            Self::Nodegroup => "nodegroup",
            Self::Range => "range",
            Self::Compound => "compound",
            Self::CompoundPillarExact => "compound_pillar_exact",
        }
    }

    /// The atomic engine behind this type, or `None` for nodegroup and compound types.
    #[must_use]
    pub fn engine(self) -> Option<Engine> {
        Some(match self {
            Self::Glob => Engine::Glob,
            Self::Pcre => Engine::Pcre,
            Self::List => Engine::List,
            Self::Grain => Engine::Grain,
            Self::GrainPcre => Engine::GrainPcre,
            Self::Pillar => Engine::Pillar,
            Self::PillarPcre => Engine::PillarPcre,
            Self::PillarExact => Engine::PillarExact,
            Self::Ipcidr => Engine::Ipcidr,
            Self::Range => Engine::Range,
            Self::Nodegroup | Self::Compound | Self::CompoundPillarExact => return None,
        })
    }

    fn accepts_words(self) -> bool {
        matches!(self, Self::List | Self::Compound | Self::CompoundPillarExact)
    }
}

impl FromStr for TargetType {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| TargetError::InvalidTargetType {
                tgt_type: s.to_owned(),
                available: Self::ALL.iter().map(|t| t.name()).collect(),
            })
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A target as given by the caller: one string, or a list of words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetArg {
    /// A single target string.
    Expr(String),
    /// Pre-split words; only `list` and the compound types take this form.
    Words(Vec<String>),
}

impl From<&str> for TargetArg {
    fn from(s: &str) -> Self {
        Self::Expr(s.to_owned())
    }
}

impl From<String> for TargetArg {
    fn from(s: String) -> Self {
        Self::Expr(s)
    }
}

impl From<Vec<String>> for TargetArg {
    fn from(words: Vec<String>) -> Self {
        Self::Words(words)
    }
}

impl fmt::Display for TargetArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(s) => f.write_str(s),
            Self::Words(w) => f.write_str(&w.join(" ")),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Key-path delimiter for atomic grain and pillar types.
    pub delimiter: char,
    /// Match every minion with cached data, not only registered ones.
    pub greedy: bool,
    /// Stop early once cancelled.
    pub cancel: Option<CancelToken>,
    /// Stop early once this instant has passed.
    pub deadline: Option<Instant>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_TARGET_DELIM,
            greedy: true,
            cancel: None,
            deadline: None,
        }
    }
}

impl TargetChecker {
    /// Resolve `target` with default options.
    ///
    /// # Errors
    ///
    /// See [`check_minions_with`](Self::check_minions_with).
    pub fn check_minions(
        &self,
        target: impl Into<TargetArg>,
        tgt_type: TargetType,
    ) -> Result<MatchResult, TargetError> {
        self.check_minions_with(target, tgt_type, &CheckOptions::default())
    }

    /// Resolve `target` as `tgt_type`.
    ///
    /// # Errors
    ///
    /// Parse and pattern errors, depth violations, and registry failures.
    /// Cache failures are never errors.
    pub fn check_minions_with(
        &self,
        target: impl Into<TargetArg>,
        tgt_type: TargetType,
        options: &CheckOptions,
    ) -> Result<MatchResult, TargetError> {
        let target = target.into();
        let Some(plan) = self.plan(&target, tgt_type, options)? else {
            return Ok(MatchResult::default());
        };
        let result = Session::new(self, options).run(&plan)?;
        tracing::debug!(
            expr = %target,
            %tgt_type,
            matched = result.minions.len(),
            missing = result.missing.len(),
            incomplete = result.incomplete,
            "target checked"
        );
        Ok(result)
    }

    /// Resolve `target` and record what every node of the expression matched.
    ///
    /// # Errors
    ///
    /// Same as [`check_minions_with`](Self::check_minions_with).
    pub fn explain(
        &self,
        target: impl Into<TargetArg>,
        tgt_type: TargetType,
        options: &CheckOptions,
    ) -> Result<(MatchResult, ExprTrace), TargetError> {
        let target = target.into();
        match self.plan(&target, tgt_type, options)? {
            Some(plan) => Session::new(self, options).run_traced(&plan),
            None => Ok((
                MatchResult::default(),
                ExprTrace::Atom {
                    target: format!("N@{target}"),
                    minions: BTreeSet::new(),
                    complete: true,
                },
            )),
        }
    }

    /// Build the expression for `target`, or `None` for a nodegroup that expands to nothing.
    fn plan(
        &self,
        target: &TargetArg,
        tgt_type: TargetType,
        options: &CheckOptions,
    ) -> Result<Option<Plan>, TargetError> {
        let expr = match (tgt_type, target) {
            (TargetType::Compound | TargetType::CompoundPillarExact, t) => {
                let expr = match t {
                    TargetArg::Expr(s) => parse_compound(s)?,
                    TargetArg::Words(w) => parse_words(w)?,
                };
                if self.opts().resolve_nodegroups_inline {
                    Nodegroups::new(&self.opts().nodegroups).resolve(expr)?
                } else {
                    expr
                }
            }
            (_, TargetArg::Words(w)) if !tgt_type.accepts_words() => {
                return Err(TargetError::parse(
                    w.join(" "),
                    format!("target type '{tgt_type}' takes a single string"),
                ));
            }
            (TargetType::List, TargetArg::Words(w)) => {
                Expr::Atom(Atom::Target(Target::new(Engine::List, w.join(","))))
            }
            (TargetType::Nodegroup, TargetArg::Expr(name)) => {
                match Nodegroups::new(&self.opts().nodegroups).expand(name)? {
                    Some(expr) => expr,
                    None => return Ok(None),
                }
            }
            (_, TargetArg::Expr(pattern)) => {
                let Some(engine) = tgt_type.engine() else {
                    return Ok(None);
                };
                let target = Target::new(engine, pattern.as_str()).with_delimiter(options.delimiter);
                Expr::Atom(Atom::Target(target))
            }
            (_, TargetArg::Words(_)) => return Ok(None),
        };
        let pillar_exact = tgt_type == TargetType::CompoundPillarExact;
        Plan::compile(&expr, pillar_exact).map(Some)
    }
}

/// Resolve a target given the `tgt_type` by name.
///
/// ```
/// use std::sync::Arc;
/// use tgt::prelude::*;
///
/// let registry = MemoryRegistry::from_iter(["web1", "web2", "db1"]);
/// let checker = TargetChecker::new(Opts::default(), Arc::new(registry), Arc::new(MemoryCache::new()));
///
/// let result = tgt::check_minions(&checker, "web*", "glob", true).unwrap();
/// assert_eq!(result.minion_list(), vec!["web1", "web2"]);
/// assert!(tgt::check_minions(&checker, "web*", "globb", true).is_err());
/// ```
///
/// # Errors
///
/// [`TargetError::InvalidTargetType`] for an unknown `tgt_type`, otherwise as
/// [`TargetChecker::check_minions_with`].
pub fn check_minions(
    checker: &TargetChecker,
    target: &str,
    tgt_type: &str,
    greedy: bool,
) -> Result<MatchResult, TargetError> {
    let tgt_type = tgt_type.parse()?;
    let options = CheckOptions {
        greedy,
        ..CheckOptions::default()
    };
    checker.check_minions_with(target, tgt_type, &options)
}
