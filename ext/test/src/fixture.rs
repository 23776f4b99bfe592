//! Conformance test fixture runner
//!
//! Loads YAML fixtures and runs their cases against a [`Fleet`].
//!
//! ```yaml
//! name: compound
//! description: boolean composition
//! fleet:                # optional, defaults to Fleet::scenario()
//!   minions: { ... }
//! opts: { ... }         # optional Opts
//! cases:
//!   - name: parens
//!     target: "( L@alpha,gamma or E@.*ta ) not G@os:Arch"
//!     expect: [alpha, gamma, iota]
//!   - name: dangling operator
//!     target: "alpha and"
//!     expect_error: parse
//! ```

use crate::Fleet;
use serde::Deserialize;
use std::collections::BTreeSet;
use tgt::{CheckOptions, MatchResult, Opts, TargetArg, TargetError, TargetType};

/// A complete test fixture
#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fleet: Option<Fleet>,
    #[serde(default)]
    pub opts: Opts,
    pub cases: Vec<TestCase>,
}

/// Test case
#[derive(Debug, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub target: TargetArg,
    #[serde(default = "default_tgt_type")]
    pub tgt_type: String,
    #[serde(default = "default_greedy")]
    pub greedy: bool,
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub expect: Option<BTreeSet<String>>,
    #[serde(default)]
    pub expect_missing: Option<BTreeSet<String>>,
    /// Error class: `parse`, `invalid_target_type`, `depth` or `store`.
    #[serde(default)]
    pub expect_error: Option<String>,
}

fn default_tgt_type() -> String {
    "compound".to_owned()
}

fn default_greedy() -> bool {
    true
}

/// Error class of a [`TargetError`], as written in fixtures.
#[must_use]
pub fn error_class(err: &TargetError) -> &'static str {
    match err {
        e if e.is_parse_error() => "parse",
        TargetError::InvalidTargetType { .. } => "invalid_target_type",
        TargetError::DepthExceeded { .. } => "depth",
        _ => "store",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of running a single test case
#[derive(Debug)]
pub struct CaseResult {
    pub case_name: String,
    pub passed: bool,
    pub expected: String,
    pub actual: String,
}

impl TestCase {
    fn run(&self, fleet: &Fleet, opts: &Opts) -> CaseResult {
        let outcome = fleet
            .checker(opts.clone())
            .map_err(TargetError::from)
            .and_then(|checker| {
                let tgt_type: TargetType = self.tgt_type.parse()?;
                let options = CheckOptions {
                    greedy: self.greedy,
                    delimiter: self.delimiter.unwrap_or(tgt::DEFAULT_TARGET_DELIM),
                    ..CheckOptions::default()
                };
                checker.check_minions_with(self.target.clone(), tgt_type, &options)
            });

        let (passed, actual) = match &outcome {
            Ok(result) => (self.accepts(result), format!("{result:?}")),
            Err(e) => (
                self.expect_error.as_deref() == Some(error_class(e)),
                format!("error ({}): {e}", error_class(e)),
            ),
        };
        CaseResult {
            case_name: self.name.clone(),
            passed,
            expected: self.describe(),
            actual,
        }
    }

    fn accepts(&self, result: &MatchResult) -> bool {
        self.expect_error.is_none()
            && self.expect.as_ref().map_or(true, |e| *e == result.minions)
            && self
                .expect_missing
                .as_ref()
                .map_or(true, |m| *m == result.missing)
    }

    fn describe(&self) -> String {
        match &self.expect_error {
            Some(class) => format!("error ({class})"),
            None => format!(
                "minions {:?}, missing {:?}",
                self.expect, self.expect_missing
            ),
        }
    }
}

impl Fixture {
    /// Parse a fixture from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse multiple fixtures from a YAML file with `---` separators
    pub fn from_yaml_multi(yaml: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        let mut fixtures = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            fixtures.push(Self::deserialize(doc)?);
        }
        Ok(fixtures)
    }

    /// Run all test cases and return results
    pub fn run(&self) -> Vec<CaseResult> {
        let fleet = self.fleet.clone().unwrap_or_else(Fleet::scenario);
        self.cases
            .iter()
            .map(|case| case.run(&fleet, &self.opts))
            .collect()
    }

    /// Run all test cases and panic on first failure
    pub fn run_and_assert(&self) {
        let results = self.run();
        for result in results {
            assert!(
                result.passed,
                "Fixture '{}' case '{}' failed: expected {}, got {}",
                self.name, result.case_name, result.expected, result.actual
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_inline_fixture() {
        let fixture = Fixture::from_yaml(
            r#"
name: inline
cases:
  - name: glob
    target: "*ta"
    tgt_type: glob
    expect: [beta, iota]
  - name: word list
    target: [alpha, ghost]
    tgt_type: list
    expect: [alpha]
    expect_missing: [ghost]
  - name: bad type
    target: "*"
    tgt_type: globbing
    expect_error: invalid_target_type
"#,
        )
        .unwrap();
        let results = fixture.run();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.passed), "{results:?}");
    }

    #[test]
    fn mismatch_is_reported() {
        let fixture = Fixture::from_yaml(
            "name: wrong\ncases:\n  - name: c\n    target: alpha\n    expect: [beta]\n",
        )
        .unwrap();
        let results = fixture.run();
        assert!(!results[0].passed);
        assert!(results[0].actual.contains("alpha"));
    }

    #[test]
    fn unexpected_error_fails() {
        let fixture = Fixture::from_yaml(
            "name: e\ncases:\n  - name: c\n    target: 'alpha and'\n    expect: []\n",
        )
        .unwrap();
        assert!(!fixture.run()[0].passed);
    }
}
