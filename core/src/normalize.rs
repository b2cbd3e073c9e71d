use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use crate::{CapturedOutput, Output};

pub const LOCATION_PLACEHOLDER: &str = "[LOC]";

// a bracketed tag at the very start of the text, up to the last `]` of that line
static LOCATION_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[.*\]").unwrap());

/// Replaces the first match of `pattern` with a fixed `replacement`
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    replacement: String,
}

impl Rule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// `[file.wtr:3] ...` -> `[LOC] ...`
    pub fn location_tag() -> Self {
        Self {
            pattern: LOCATION_TAG.clone(),
            replacement: LOCATION_PLACEHOLDER.to_owned(),
        }
    }

    fn apply(&self, text: &str) -> String {
        self.pattern
            .replacen(text, 1, NoExpand(&self.replacement))
            .into_owned()
    }
}

/// Rewrites volatile parts of diagnostics so recorded and live output stay comparable
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<Rule>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(vec![Rule::location_tag()])
    }
}

impl Normalizer {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn normalize_stderr(&self, stderr: &str) -> String {
        self.rules
            .iter()
            .fold(stderr.to_owned(), |text, rule| rule.apply(&text))
    }

    // stdout is passed through untouched
    pub fn normalize(&self, captured: CapturedOutput) -> Output {
        let stderr = self.normalize_stderr(&captured.stderr);
        Output {
            stdout: captured.stdout,
            stderr,
        }
    }
}
