//! Expression evaluation.
//!
//! An [`Expr`] is first compiled into a [`Plan`], so every pattern error surfaces
//! before any store is consulted. The plan is then evaluated by a [`Session`],
//! which holds the per-call state: the registry snapshot, the cache candidates,
//! fetched records, collected `missing` IDs and the cancellation budget.
//!
//! `And`/`Or` fold their operands left to right. Each operand sees the set
//! accumulated so far, and a `not` removes its operand from that set. At the
//! start of an expression nothing has been accumulated, so a leading `not`
//! matches nothing; a parenthesised group starts from the set accumulated
//! where it appears.

use crate::matchers::AtomMatcher;
use crate::store::{fetch_minion_data, MinionData, MINIONS_BANK};
use crate::{CheckOptions, Expr, ExprTrace, MinionId, TargetChecker, TargetError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag shared between a caller and running checks.
///
/// ```
/// use tgt::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every check holding this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of a target check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    /// Matched minions, sorted.
    pub minions: BTreeSet<MinionId>,
    /// IDs named by an `L@` list that are not registered.
    pub missing: BTreeSet<MinionId>,
    /// Evaluation was cut short; `minions` may be missing entries but never has extra ones.
    pub incomplete: bool,
}

impl MatchResult {
    /// Matched minion IDs as string slices.
    #[must_use]
    pub fn minion_list(&self) -> Vec<&str> {
        self.minions.iter().map(String::as_str).collect()
    }

    /// Returns `true` if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.minions.is_empty()
    }
}

/// Result of one plan node.
#[derive(Debug, Default)]
pub(crate) struct Matched {
    pub(crate) minions: BTreeSet<MinionId>,
    /// Minions whose data could not be read; never part of a complement.
    pub(crate) unresolved: BTreeSet<MinionId>,
    /// `false` if the node was cut short.
    pub(crate) complete: bool,
}

impl Matched {
    pub(crate) fn complete(minions: BTreeSet<MinionId>) -> Self {
        Self {
            minions,
            unresolved: BTreeSet::new(),
            complete: true,
        }
    }

    pub(crate) fn incomplete(minions: BTreeSet<MinionId>) -> Self {
        Self {
            minions,
            unresolved: BTreeSet::new(),
            complete: false,
        }
    }
}

/// Compiled form of an [`Expr`].
#[derive(Debug)]
pub(crate) enum Plan {
    Atom { label: String, matcher: AtomMatcher },
    And(Vec<Plan>),
    Or(Vec<Plan>),
    Not(Box<Plan>),
}

impl Plan {
    /// Compile every atom. With `pillar_exact`, `I@` and `J@` compare by equality.
    pub(crate) fn compile(expr: &Expr, pillar_exact: bool) -> Result<Self, TargetError> {
        Ok(match expr {
            Expr::Atom(atom) => Self::Atom {
                label: atom.to_string(),
                matcher: AtomMatcher::compile(atom, pillar_exact)?,
            },
            Expr::And(terms) => Self::And(
                terms
                    .iter()
                    .map(|t| Self::compile(t, pillar_exact))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Or(terms) => Self::Or(
                terms
                    .iter()
                    .map(|t| Self::compile(t, pillar_exact))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Not(inner) => Self::Not(Box::new(Self::compile(inner, pillar_exact)?)),
        })
    }
}

/// Per-call evaluation state.
pub(crate) struct Session<'a> {
    checker: &'a TargetChecker,
    greedy: bool,
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
    universe: Option<Rc<BTreeSet<MinionId>>>,
    candidates: Option<Rc<Vec<MinionId>>>,
    records: HashMap<MinionId, Fetched>,
    missing: BTreeSet<MinionId>,
    incomplete: bool,
}

/// A cache lookup, remembered for the rest of the call.
#[derive(Clone)]
pub(crate) enum Fetched {
    Found(Rc<MinionData>),
    Absent,
    Failed,
}

impl<'a> Session<'a> {
    pub(crate) fn new(checker: &'a TargetChecker, options: &CheckOptions) -> Self {
        Self {
            checker,
            greedy: options.greedy,
            cancel: options.cancel.clone(),
            deadline: options.deadline,
            universe: None,
            candidates: None,
            records: HashMap::new(),
            missing: BTreeSet::new(),
            incomplete: false,
        }
    }

    /// Returns `true` once the caller cancelled or the deadline passed.
    pub(crate) fn exhausted(&mut self) -> bool {
        let out = self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d);
        if out {
            self.incomplete = true;
        }
        out
    }

    /// Flag the result as incomplete without stopping evaluation.
    pub(crate) fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }

    /// All registered minions, read once per call.
    pub(crate) fn universe(&mut self) -> Result<Rc<BTreeSet<MinionId>>, TargetError> {
        if let Some(u) = &self.universe {
            return Ok(Rc::clone(u));
        }
        let u = Rc::new(self.checker.registry().minions()?);
        self.universe = Some(Rc::clone(&u));
        Ok(u)
    }

    /// Minions eligible for cache-backed matching, or `None` if the cache
    /// could not be listed.
    ///
    /// Greedy checks take every minion with cached data; otherwise the list is
    /// narrowed to registered minions.
    pub(crate) fn cached_candidates(&mut self) -> Result<Option<Rc<Vec<MinionId>>>, TargetError> {
        if let Some(c) = &self.candidates {
            return Ok(Some(Rc::clone(c)));
        }
        let listed = match self.checker.cache().list(MINIONS_BANK) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list cached minions");
                return Ok(None);
            }
        };
        let ids: Vec<MinionId> = if self.greedy {
            listed
        } else {
            let universe = self.universe()?;
            listed.into_iter().filter(|id| universe.contains(id)).collect()
        };
        let ids = Rc::new(ids);
        self.candidates = Some(Rc::clone(&ids));
        Ok(Some(ids))
    }

    /// The cached record of `id`, fetched at most once per call.
    pub(crate) fn record(&mut self, id: &str) -> Fetched {
        if let Some(f) = self.records.get(id) {
            return f.clone();
        }
        let timeout = self.checker.opts().cache_fetch_timeout();
        let fetched = match fetch_minion_data(self.checker.cache(), id, timeout) {
            Ok(Some(data)) => Fetched::Found(Rc::new(data)),
            Ok(None) => {
                tracing::debug!(minion = id, "no cached data");
                Fetched::Absent
            }
            Err(e) => {
                tracing::warn!(minion = id, error = %e, "cache fetch failed, treating minion as non-matching");
                Fetched::Failed
            }
        };
        self.records.insert(id.to_owned(), fetched.clone());
        fetched
    }

    /// Record IDs named by a list that are not registered.
    pub(crate) fn add_missing(&mut self, ids: impl IntoIterator<Item = MinionId>) {
        self.missing.extend(ids);
    }

    pub(crate) fn run(mut self, plan: &Plan) -> Result<MatchResult, TargetError> {
        let matched = self.eval(plan, &BTreeSet::new(), false)?;
        Ok(self.finish(matched.minions))
    }

    pub(crate) fn run_traced(mut self, plan: &Plan) -> Result<(MatchResult, ExprTrace), TargetError> {
        let (matched, trace) = self.eval_traced(plan, &BTreeSet::new(), false)?;
        Ok((self.finish(matched.minions), trace))
    }

    fn finish(self, minions: BTreeSet<MinionId>) -> MatchResult {
        MatchResult {
            minions,
            missing: self.missing,
            incomplete: self.incomplete,
        }
    }

    fn atom(&mut self, matcher: &AtomMatcher, negated: bool) -> Result<Matched, TargetError> {
        if self.exhausted() {
            return Ok(Matched::incomplete(BTreeSet::new()));
        }
        let checker = self.checker;
        checker.match_atom(self, matcher, negated)
    }

    /// `acc` minus `inner`. Minions `inner` could not resolve are removed too.
    fn negate(acc: &BTreeSet<MinionId>, inner: &Matched) -> Matched {
        if !inner.complete {
            return Matched::incomplete(BTreeSet::new());
        }
        let minions = acc
            .iter()
            .filter(|id| !inner.minions.contains(*id) && !inner.unresolved.contains(*id))
            .cloned()
            .collect();
        Matched {
            minions,
            unresolved: inner.unresolved.clone(),
            complete: true,
        }
    }

    fn eval(&mut self, plan: &Plan, acc: &BTreeSet<MinionId>, negated: bool) -> Result<Matched, TargetError> {
        match plan {
            Plan::Atom { matcher, .. } => self.atom(matcher, negated),
            Plan::And(terms) => self.fold(terms, acc, intersection),
            Plan::Or(terms) => self.fold(terms, acc, union),
            Plan::Not(inner) => {
                let inner = self.eval(inner, acc, true)?;
                Ok(Self::negate(acc, &inner))
            }
        }
    }

    fn fold(&mut self, terms: &[Plan], acc: &BTreeSet<MinionId>, op: SetOp) -> Result<Matched, TargetError> {
        let mut out: Option<Matched> = None;
        for term in terms {
            out = Some(match out.take() {
                None => self.eval(term, acc, false)?,
                Some(so_far) => {
                    let m = self.eval(term, &so_far.minions, false)?;
                    combine(so_far, m, op)
                }
            });
        }
        Ok(out.unwrap_or_else(|| Matched::complete(BTreeSet::new())))
    }

    fn eval_traced(
        &mut self,
        plan: &Plan,
        acc: &BTreeSet<MinionId>,
        negated: bool,
    ) -> Result<(Matched, ExprTrace), TargetError> {
        match plan {
            Plan::Atom { label, matcher } => {
                let m = self.atom(matcher, negated)?;
                let trace = ExprTrace::Atom {
                    target: label.clone(),
                    minions: m.minions.clone(),
                    complete: m.complete,
                };
                Ok((m, trace))
            }
            Plan::And(terms) | Plan::Or(terms) => {
                let is_and = matches!(plan, Plan::And(_));
                let op: SetOp = if is_and { intersection } else { union };
                let mut out: Option<Matched> = None;
                let mut children = Vec::with_capacity(terms.len());
                for term in terms {
                    out = Some(match out.take() {
                        None => {
                            let (m, t) = self.eval_traced(term, acc, false)?;
                            children.push(t);
                            m
                        }
                        Some(so_far) => {
                            let (m, t) = self.eval_traced(term, &so_far.minions, false)?;
                            children.push(t);
                            combine(so_far, m, op)
                        }
                    });
                }
                let m = out.unwrap_or_else(|| Matched::complete(BTreeSet::new()));
                let minions = m.minions.clone();
                let trace = if is_and {
                    ExprTrace::And { minions, children }
                } else {
                    ExprTrace::Or { minions, children }
                };
                Ok((m, trace))
            }
            Plan::Not(inner) => {
                let (im, it) = self.eval_traced(inner, acc, true)?;
                let m = Self::negate(acc, &im);
                let trace = ExprTrace::Not {
                    minions: m.minions.clone(),
                    inner: Box::new(it),
                };
                Ok((m, trace))
            }
        }
    }
}

type SetOp = fn(&BTreeSet<MinionId>, &BTreeSet<MinionId>) -> BTreeSet<MinionId>;

fn intersection(a: &BTreeSet<MinionId>, b: &BTreeSet<MinionId>) -> BTreeSet<MinionId> {
    a.intersection(b).cloned().collect()
}

fn union(a: &BTreeSet<MinionId>, b: &BTreeSet<MinionId>) -> BTreeSet<MinionId> {
    a.union(b).cloned().collect()
}

fn combine(l: Matched, r: Matched, op: SetOp) -> Matched {
    let mut unresolved = l.unresolved;
    unresolved.extend(r.unresolved);
    Matched {
        minions: op(&l.minions, &r.minions),
        unresolved,
        complete: l.complete && r.complete,
    }
}
