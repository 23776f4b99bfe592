//! `ValueMatcher`: compiled string matching for IDs and cached values
//!
//! Three strategies cover every engine:
//!
//! - **Glob**: fnmatch semantics: `*`, `?`, `[...]`, `[!...]`; `*` crosses `/`
//!   and backslash is a literal character
//! - **Regex**: Rust `regex` crate (linear time, no `ReDoS`), either unanchored
//!   (`search`, used for minion IDs) or anchored at the start (`match`, used for
//!   grain/pillar values)
//! - **Exact**: string equality
//!
//! Grain and pillar comparisons are case-insensitive; minion ID comparisons are not.

use crate::{TargetError, MAX_PATTERN_LENGTH, MAX_REGEX_PATTERN_LENGTH};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use std::fmt;

/// A compiled string matcher.
///
/// # Example
///
/// ```
/// use tgt::ValueMatcher;
///
/// let m = ValueMatcher::glob("web*", false).unwrap();
/// assert!(m.matches("web01"));
/// assert!(!m.matches("db01"));
///
/// // Unanchored search, like minion-ID PCRE targets
/// let m = ValueMatcher::search(r"\d+").unwrap();
/// assert!(m.matches("web01"));
///
/// // Anchored at start, case-insensitive, like grain PCRE targets
/// let m = ValueMatcher::regex_match("ubu", true).unwrap();
/// assert!(m.matches("Ubuntu"));
/// assert!(!m.matches("xubuntu"));
/// ```
#[derive(Clone)]
pub enum ValueMatcher {
    /// fnmatch-style glob.
    Glob {
        /// The pattern as written.
        pattern: String,
        /// Compiled glob.
        matcher: GlobMatcher,
    },
    /// Regular expression.
    Regex(Regex),
    /// String equality.
    Exact {
        /// Expected value, pre-lowercased when `ignore_case`.
        value: String,
        /// Compare case-insensitively.
        ignore_case: bool,
    },
}

impl ValueMatcher {
    /// Compile an fnmatch-style glob.
    ///
    /// Braces are literal and an unclosed `[` matches itself, as in fnmatch.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::InvalidPattern`] for an unparsable glob and
    /// [`TargetError::PatternTooLong`] past [`MAX_PATTERN_LENGTH`].
    pub fn glob(pattern: &str, ignore_case: bool) -> Result<Self, TargetError> {
        check_len(pattern, MAX_PATTERN_LENGTH)?;
        let matcher = GlobBuilder::new(&fnmatch_syntax(pattern))
            .literal_separator(false)
            .backslash_escape(false)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| invalid(pattern, &e))?
            .compile_matcher();
        Ok(Self::Glob {
            pattern: pattern.to_owned(),
            matcher,
        })
    }

    /// Compile an unanchored regex (matches anywhere in the input).
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::InvalidPattern`] if the regex does not compile.
    pub fn search(pattern: &str) -> Result<Self, TargetError> {
        check_len(pattern, MAX_REGEX_PATTERN_LENGTH)?;
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| invalid(pattern, &e))
    }

    /// Compile a regex anchored at the start of the input.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::InvalidPattern`] if the regex does not compile.
    pub fn regex_match(pattern: &str, ignore_case: bool) -> Result<Self, TargetError> {
        check_len(pattern, MAX_REGEX_PATTERN_LENGTH)?;
        // Validate the pattern on its own first so a stray `)` cannot close our group.
        Regex::new(pattern).map_err(|e| invalid(pattern, &e))?;
        let flags = if ignore_case { "(?i)" } else { "" };
        Regex::new(&format!("{flags}^(?:{pattern})"))
            .map(Self::Regex)
            .map_err(|e| invalid(pattern, &e))
    }

    /// Build an equality matcher.
    #[must_use]
    pub fn exact(value: &str, ignore_case: bool) -> Self {
        Self::Exact {
            value: if ignore_case {
                value.to_lowercase()
            } else {
                value.to_owned()
            },
            ignore_case,
        }
    }

    /// Check whether `input` matches.
    #[must_use]
    pub fn matches(&self, input: &str) -> bool {
        match self {
            Self::Glob { matcher, .. } => matcher.is_match(input),
            Self::Regex(re) => re.is_match(input),
            Self::Exact { value, ignore_case } => {
                if *ignore_case {
                    input.to_lowercase() == *value
                } else {
                    input == value
                }
            }
        }
    }
}

impl fmt::Debug for ValueMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glob { pattern, .. } => f.debug_tuple("Glob").field(pattern).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Self::Exact { value, ignore_case } => f
                .debug_struct("Exact")
                .field("value", value)
                .field("ignore_case", ignore_case)
                .finish(),
        }
    }
}

/// Rewrite an fnmatch pattern into globset syntax.
///
/// globset reads `{a,b}` as alternation, rejects an unclosed `[` and negates
/// on a leading `^`; fnmatch does none of these.
fn fnmatch_syntax(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' => out.push_str("[{]"),
            '}' => out.push_str("[}]"),
            '[' => {
                let mut j = i + 1;
                if chars.get(j) == Some(&'!') {
                    j += 1;
                }
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str("[[]");
                } else {
                    let class: String = chars[i + 1..j].iter().collect();
                    match class.strip_prefix('^') {
                        Some("") => out.push('^'),
                        Some(rest) => {
                            out.push('[');
                            out.push_str(rest);
                            out.push_str("^]");
                        }
                        None => {
                            out.push('[');
                            out.push_str(&class);
                            out.push(']');
                        }
                    }
                    i = j;
                }
            }
            c => out.push(c),
        }
        i += 1;
    }
    out
}

fn check_len(pattern: &str, max: usize) -> Result<(), TargetError> {
    if pattern.len() > max {
        return Err(TargetError::PatternTooLong {
            len: pattern.len(),
            max,
        });
    }
    Ok(())
}

fn invalid(pattern: &str, err: &dyn fmt::Display) -> TargetError {
    TargetError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_fnmatch_semantics() {
        let m = ValueMatcher::glob("*ta", false).unwrap();
        assert!(m.matches("beta"));
        assert!(m.matches("iota"));
        assert!(!m.matches("alpha"));

        let m = ValueMatcher::glob("web?", false).unwrap();
        assert!(m.matches("web1"));
        assert!(!m.matches("web12"));

        let m = ValueMatcher::glob("db[0-3]", false).unwrap();
        assert!(m.matches("db2"));
        assert!(!m.matches("db7"));

        let m = ValueMatcher::glob("db[!0-3]", false).unwrap();
        assert!(m.matches("db7"));
        assert!(!m.matches("db2"));
    }

    #[test]
    fn glob_star_crosses_separators() {
        let m = ValueMatcher::glob("*:*", false).unwrap();
        assert!(m.matches("bar:baz"));
        let m = ValueMatcher::glob("a*z", false).unwrap();
        assert!(m.matches("a/b/z"));
    }

    #[test]
    fn glob_case_sensitivity() {
        let m = ValueMatcher::glob("ubuntu", true).unwrap();
        assert!(m.matches("Ubuntu"));
        let m = ValueMatcher::glob("ubuntu", false).unwrap();
        assert!(!m.matches("Ubuntu"));
    }

    #[test]
    fn glob_unclosed_class_is_literal() {
        let m = ValueMatcher::glob("Ubun[tu", false).unwrap();
        assert!(m.matches("Ubun[tu"));
        assert!(!m.matches("Ubuntu"));
        let m = ValueMatcher::glob("web[*", false).unwrap();
        assert!(m.matches("web[1"));
        assert!(!m.matches("web1"));
    }

    #[test]
    fn glob_braces_are_literal() {
        let m = ValueMatcher::glob("alph{a,x}", false).unwrap();
        assert!(!m.matches("alpha"));
        assert!(!m.matches("alphx"));
        assert!(m.matches("alph{a,x}"));
        let m = ValueMatcher::glob("{*}", false).unwrap();
        assert!(m.matches("{web}"));
    }

    #[test]
    fn glob_caret_in_class_is_literal() {
        let m = ValueMatcher::glob("db[^1]", false).unwrap();
        assert!(m.matches("db^"));
        assert!(m.matches("db1"));
        assert!(!m.matches("db2"));
        let m = ValueMatcher::glob("a[]]b", false).unwrap();
        assert!(m.matches("a]b"));
        assert_eq!(fnmatch_syntax("x[^]y"), "x^y");
        assert_eq!(fnmatch_syntax("[!{]"), "[!{]");
    }

    #[test]
    fn search_is_unanchored() {
        let m = ValueMatcher::search(r"\w+t\w+").unwrap();
        assert!(m.matches("beta"));
        assert!(m.matches("iota"));
        assert!(!m.matches("alpha"));
        assert!(!m.matches("gamma"));
    }

    #[test]
    fn regex_match_is_anchored_at_start_only() {
        let m = ValueMatcher::regex_match("ba", false).unwrap();
        assert!(m.matches("bar"));
        assert!(!m.matches("abar"));
        // Not anchored at the end.
        let m = ValueMatcher::regex_match("b", false).unwrap();
        assert!(m.matches("bar"));
    }

    #[test]
    fn regex_match_alternation_stays_anchored() {
        let m = ValueMatcher::regex_match("a|b", false).unwrap();
        assert!(m.matches("bx"));
        assert!(!m.matches("xb"));
    }

    #[test]
    fn regex_match_rejects_group_escape() {
        let err = ValueMatcher::regex_match("a)|(b", false).unwrap_err();
        assert!(matches!(err, TargetError::InvalidPattern { .. }));
    }

    #[test]
    fn invalid_regex_is_error() {
        assert!(ValueMatcher::search("(unclosed").is_err());
        assert!(ValueMatcher::regex_match("[bad", true).is_err());
    }

    #[test]
    fn pattern_length_limits() {
        let long = "a".repeat(MAX_REGEX_PATTERN_LENGTH + 1);
        assert!(matches!(
            ValueMatcher::search(&long).unwrap_err(),
            TargetError::PatternTooLong { .. }
        ));
        assert!(ValueMatcher::glob(&long, false).is_ok());
    }

    #[test]
    fn exact_matching() {
        let m = ValueMatcher::exact("Web", true);
        assert!(m.matches("web"));
        assert!(m.matches("WEB"));
        assert!(!m.matches("web1"));
        let m = ValueMatcher::exact("Web", false);
        assert!(!m.matches("web"));
    }

    #[test]
    fn debug_shows_pattern() {
        let m = ValueMatcher::glob("web*", false).unwrap();
        assert!(format!("{m:?}").contains("web*"));
        let m = ValueMatcher::search("db\\d").unwrap();
        assert!(format!("{m:?}").contains("db"));
    }
}
