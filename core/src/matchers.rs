//! Atomic matchers.
//!
//! | Engine | Source | Rule |
//! |---|---|---|
//! | glob | registry | fnmatch on the ID |
//! | `E` | registry | unanchored regex search on the ID |
//! | `L` | registry | exact membership; unregistered names go to `missing` |
//! | `G` / `P` | cache `grains` | key path, then glob / anchored regex |
//! | `I` / `J` | cache `pillar` | key path, then glob / anchored regex (or equality) |
//! | `S` | cache `grains` | `ipv4` / `ipv6` inside the network or equal to the address |
//! | `N` | | empty unless expanded beforehand |
//! | `R` | range resolver | empty when none is configured |
//!
//! A cache-backed engine that cannot consult the cache (disabled by
//! `minion_data_cache`, or the `minions` bank cannot be listed) matches nothing
//! and marks the result incomplete, so a `not` over it matches nothing either.

use crate::eval::{Fetched, Matched, Session};
use crate::store::{CacheStore, MinionData, MinionRegistry, RangeResolver};
use crate::{
    Atom, Engine, IpTarget, MinionId, Opts, SubdictQuery, TargetError, ValueMatcher, ValueMode,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Resolves targets against a fleet.
///
/// Holds the options and the injected collaborators; every check is
/// independent and read-only, so one checker can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct TargetChecker {
    opts: Opts,
    registry: Arc<dyn MinionRegistry>,
    cache: Arc<dyn CacheStore>,
    range: Option<Arc<dyn RangeResolver>>,
}

impl TargetChecker {
    /// Create a checker.
    pub fn new(
        opts: Opts,
        registry: Arc<dyn MinionRegistry>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            opts,
            registry,
            cache,
            range: None,
        }
    }

    /// Attach a resolver for `R@` targets.
    #[must_use]
    pub fn with_range_resolver(mut self, resolver: Arc<dyn RangeResolver>) -> Self {
        self.range = Some(resolver);
        self
    }

    /// Options in effect.
    #[must_use]
    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// The minion registry.
    #[must_use]
    pub fn registry(&self) -> &dyn MinionRegistry {
        self.registry.as_ref()
    }

    /// The cache store.
    #[must_use]
    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    pub(crate) fn match_atom(
        &self,
        session: &mut Session<'_>,
        matcher: &AtomMatcher,
        negated: bool,
    ) -> Result<Matched, TargetError> {
        match matcher {
            AtomMatcher::Id(m) => {
                let universe = session.universe()?;
                Ok(Matched::complete(
                    universe.iter().filter(|id| m.matches(id)).cloned().collect(),
                ))
            }
            AtomMatcher::List(names) => {
                let universe = session.universe()?;
                let (found, missing): (BTreeSet<MinionId>, BTreeSet<MinionId>) =
                    names.iter().cloned().partition(|id| universe.contains(id));
                // A list right under `not` is an exclusion; absent names are expected.
                if !negated {
                    session.add_missing(missing);
                }
                Ok(Matched::complete(found))
            }
            AtomMatcher::Grains(q) => self.match_cached(session, |d| q.matches(&d.grains)),
            AtomMatcher::Pillar(q) => self.match_cached(session, |d| q.matches(&d.pillar)),
            AtomMatcher::Ip(t) => self.match_cached(session, |d| t.matches_grains(&d.grains)),
            AtomMatcher::Nodegroup(name) => {
                tracing::debug!(nodegroup = %name, "nodegroup not expanded, matching nothing");
                Ok(Matched::complete(BTreeSet::new()))
            }
            AtomMatcher::Range(expr) => Ok(self.match_range(session, expr)),
            AtomMatcher::Unknown(word) => {
                tracing::debug!(word = %word, "unrecognized target engine, matching nothing");
                Ok(Matched::complete(BTreeSet::new()))
            }
        }
    }

    fn match_cached(
        &self,
        session: &mut Session<'_>,
        pred: impl Fn(&MinionData) -> bool,
    ) -> Result<Matched, TargetError> {
        if !self.opts.minion_data_cache {
            tracing::debug!("minion data cache disabled, cache-backed target matches nothing");
            session.mark_incomplete();
            return Ok(Matched::incomplete(BTreeSet::new()));
        }
        let Some(candidates) = session.cached_candidates()? else {
            session.mark_incomplete();
            return Ok(Matched::incomplete(BTreeSet::new()));
        };

        let mut out = Matched::complete(BTreeSet::new());
        for id in candidates.iter() {
            if session.exhausted() {
                out.complete = false;
                break;
            }
            match session.record(id) {
                Fetched::Found(data) => {
                    if pred(data.as_ref()) {
                        out.minions.insert(id.clone());
                    }
                }
                Fetched::Absent => {}
                Fetched::Failed => {
                    out.unresolved.insert(id.clone());
                }
            }
        }
        Ok(out)
    }

    fn match_range(&self, session: &mut Session<'_>, expr: &str) -> Matched {
        let Some(resolver) = &self.range else {
            tracing::debug!(expr, "no range resolver configured, matching nothing");
            return Matched::complete(BTreeSet::new());
        };
        match resolver.expand(expr) {
            Ok(ids) => Matched::complete(ids),
            Err(e) => {
                tracing::warn!(expr, error = %e, "range expansion failed");
                session.mark_incomplete();
                Matched::incomplete(BTreeSet::new())
            }
        }
    }
}

/// A compiled atom.
#[derive(Debug)]
pub(crate) enum AtomMatcher {
    Id(ValueMatcher),
    List(Vec<MinionId>),
    Grains(SubdictQuery),
    Pillar(SubdictQuery),
    Ip(IpTarget),
    Nodegroup(String),
    Range(String),
    Unknown(String),
}

impl AtomMatcher {
    pub(crate) fn compile(atom: &Atom, pillar_exact: bool) -> Result<Self, TargetError> {
        let Atom::Target(t) = atom else {
            return Ok(Self::Unknown(atom.to_string()));
        };
        let p = t.pattern.as_str();
        let d = t.delimiter;
        let pillar_mode = |mode| if pillar_exact { ValueMode::Exact } else { mode };

        Ok(match t.engine {
            Engine::Glob => Self::Id(ValueMatcher::glob(p, false)?),
            Engine::Pcre => Self::Id(ValueMatcher::search(p)?),
            Engine::List => Self::List(
                p.split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect(),
            ),
            Engine::Grain => Self::Grains(SubdictQuery::new(p, d, ValueMode::Glob)?),
            Engine::GrainPcre => Self::Grains(SubdictQuery::new(p, d, ValueMode::Regex)?),
            Engine::Pillar => Self::Pillar(SubdictQuery::new(p, d, pillar_mode(ValueMode::Glob))?),
            Engine::PillarPcre => {
                Self::Pillar(SubdictQuery::new(p, d, pillar_mode(ValueMode::Regex))?)
            }
            Engine::PillarExact => Self::Pillar(SubdictQuery::new(p, d, ValueMode::Exact)?),
            Engine::Ipcidr => Self::Ip(IpTarget::parse(p)?),
            Engine::Nodegroup => Self::Nodegroup(p.to_owned()),
            Engine::Range => Self::Range(p.to_owned()),
        })
    }
}
