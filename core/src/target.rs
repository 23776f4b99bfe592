//! `Target`: one `<letter>[<delim>]@<pattern>` word of a target expression
//!
//! A word either names an engine (`G@os:Ubuntu`, `G#@os#Ubuntu`, `L@a,b`) or is a
//! bare glob against minion IDs (`web*`). Delimiter overrides are only accepted
//! for the key-path engines (`G`, `P`, `I`, `J`).
//!
//! Words that *look* like a matcher reference but carry an unrecognised letter
//! (`H@a`, `K@b`) are reported as [`Atom::Unknown`](crate::Atom::Unknown) so the
//! compound evaluator can degrade them to the empty set.

use crate::DEFAULT_TARGET_DELIM;
use std::fmt;

/// Matcher engine selected by a target word or a dispatcher `tgt_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// Shell glob against minion IDs (no letter).
    Glob,
    /// `G`: glob on a grain value.
    Grain,
    /// `P`: regex on a grain value.
    GrainPcre,
    /// `I`: glob on a pillar value.
    Pillar,
    /// `J`: regex on a pillar value.
    PillarPcre,
    /// Pillar value equality (dispatcher `pillar_exact` only, no letter of its own).
    PillarExact,
    /// `L`: comma-separated list of minion IDs.
    List,
    /// `N`: named nodegroup.
    Nodegroup,
    /// `S`: IP address or CIDR against the `ipv4`/`ipv6` grains.
    Ipcidr,
    /// `E`: regex against minion IDs.
    Pcre,
    /// `R`: range-server expression.
    Range,
}

impl Engine {
    /// Look up the engine for a target letter.
    #[must_use]
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'G' => Some(Self::Grain),
            'P' => Some(Self::GrainPcre),
            'I' => Some(Self::Pillar),
            'J' => Some(Self::PillarPcre),
            'L' => Some(Self::List),
            'N' => Some(Self::Nodegroup),
            'S' => Some(Self::Ipcidr),
            'E' => Some(Self::Pcre),
            'R' => Some(Self::Range),
            _ => None,
        }
    }

    /// The letter used to spell this engine in a compound expression.
    ///
    /// `PillarExact` is spelled `I`; it only exists as a dispatcher mode.
    #[must_use]
    pub fn letter(self) -> Option<char> {
        match self {
            Self::Glob => None,
            Self::Grain => Some('G'),
            Self::GrainPcre => Some('P'),
            Self::Pillar | Self::PillarExact => Some('I'),
            Self::PillarPcre => Some('J'),
            Self::List => Some('L'),
            Self::Nodegroup => Some('N'),
            Self::Ipcidr => Some('S'),
            Self::Pcre => Some('E'),
            Self::Range => Some('R'),
        }
    }

    /// Returns `true` for engines that walk a key path and accept a delimiter override.
    #[must_use]
    pub fn takes_delimiter(self) -> bool {
        matches!(
            self,
            Self::Grain | Self::GrainPcre | Self::Pillar | Self::PillarPcre | Self::PillarExact
        )
    }

    /// Returns `true` for engines whose source of truth is the cache store.
    #[must_use]
    pub fn is_cache_backed(self) -> bool {
        self.takes_delimiter() || self == Self::Ipcidr
    }

    /// Human-readable engine name (matches the dispatcher `tgt_type` spelling).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Glob => "glob",
            Self::Grain => "grain",
            Self::GrainPcre => "grain_pcre",
            Self::Pillar => "pillar",
            Self::PillarPcre => "pillar_pcre",
            Self::PillarExact => "pillar_exact",
            Self::List => "list",
            Self::Nodegroup => "nodegroup",
            Self::Ipcidr => "ipcidr",
            Self::Pcre => "pcre",
            Self::Range => "range",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed matcher reference: engine, key-path delimiter and pattern.
///
/// # Example
///
/// ```
/// use tgt::{Engine, Target};
///
/// let t = Target::parse("G#@os#Ubuntu").unwrap();
/// assert_eq!(t.engine, Engine::Grain);
/// assert_eq!(t.delimiter, '#');
/// assert_eq!(t.pattern, "os#Ubuntu");
///
/// let t = Target::parse("web*").unwrap();
/// assert_eq!(t.engine, Engine::Glob);
///
/// // Unknown letter: not a target, and not a glob either.
/// assert!(Target::parse("H@a").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// Which matcher evaluates the pattern.
    pub engine: Engine,
    /// Key-path delimiter; only meaningful when [`Engine::takes_delimiter`].
    pub delimiter: char,
    /// Everything after the `@` (or the whole word for a bare glob).
    pub pattern: String,
}

impl Target {
    /// Create a target with the default delimiter.
    pub fn new(engine: Engine, pattern: impl Into<String>) -> Self {
        Self {
            engine,
            delimiter: DEFAULT_TARGET_DELIM,
            pattern: pattern.into(),
        }
    }

    /// Create a bare glob target.
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::new(Engine::Glob, pattern)
    }

    /// Override the key-path delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Parse one whitespace-free word.
    ///
    /// Returns `None` when the word has the shape of a matcher reference but
    /// its letter is unknown, its delimiter is not allowed, or its pattern is empty.
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        let mut chars = word.char_indices();
        let Some((_, first)) = chars.next() else {
            return Some(Self::glob(word));
        };
        let second = chars.next();
        let third = chars.next();

        // `X@pattern`
        if let Some((at, '@')) = second {
            if !first.is_ascii_uppercase() {
                return Some(Self::glob(word));
            }
            let engine = Engine::from_letter(first)?;
            let pattern = &word[at + 1..];
            if pattern.is_empty() {
                return None;
            }
            return Some(Self::new(engine, pattern));
        }

        // `X<delim>@pattern`
        if let (Some((_, delimiter)), Some((at, '@'))) = (second, third) {
            if !first.is_ascii_uppercase() {
                return Some(Self::glob(word));
            }
            let engine = Engine::from_letter(first)?;
            let pattern = &word[at + 1..];
            if !engine.takes_delimiter() || pattern.is_empty() {
                return None;
            }
            return Some(Self::new(engine, pattern).with_delimiter(delimiter));
        }

        Some(Self::glob(word))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(letter) = self.engine.letter() else {
            return f.write_str(&self.pattern);
        };
        if self.engine.takes_delimiter() && self.delimiter != DEFAULT_TARGET_DELIM {
            write!(f, "{letter}{}@{}", self.delimiter, self.pattern)
        } else {
            write!(f, "{letter}@{}", self.pattern)
        }
    }
}
