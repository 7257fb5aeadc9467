//! Statistical detection of random-looking tokens.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::detectors::{contains_placeholder, HIGH_ENTROPY};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").expect("valid token pattern"));

/// Shannon entropy of the character distribution divided by `log2` of the
/// number of distinct characters.
///
/// Returns 0.0 for strings with fewer than two distinct characters, and a
/// value in `(0, 1]` otherwise.
pub fn normalized_entropy(text: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in text.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }

    let distinct = counts.len();
    if distinct < 2 {
        return 0.0;
    }

    let total = total as f64;
    let entropy: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();

    entropy / (distinct as f64).log2()
}

/// Flags long, high-entropy tokens as likely secrets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyDetector {
    pub threshold: f64,
    pub min_length: usize,
}

impl EntropyDetector {
    pub fn new(threshold: f64, min_length: usize) -> Self {
        Self { threshold, min_length }
    }

    /// Whether a single whitespace-free token should be redacted.
    pub fn is_suspicious(&self, token: &str) -> bool {
        token.chars().count() >= self.min_length
            && !contains_placeholder(token)
            && normalized_entropy(token) > self.threshold
    }

    /// Replace every suspicious whitespace-delimited token, keeping the
    /// surrounding whitespace intact.
    pub fn redact_tokens<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !text.split_whitespace().any(|token| self.is_suspicious(token)) {
            return Cow::Borrowed(text);
        }

        TOKEN.replace_all(text, |caps: &Captures| {
            let token = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            if self.is_suspicious(token) {
                HIGH_ENTROPY.to_string()
            } else {
                token.to_string()
            }
        })
    }
}

impl Default for EntropyDetector {
    fn default() -> Self {
        Self::new(0.65, 24)
    }
}
