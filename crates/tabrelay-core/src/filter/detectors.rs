//! Key and value detectors used by the filter engine.
//!
//! Key detectors match object keys after normalization (lowercased, with
//! separators removed), so `api_key`, `X-Api-Key` and `apiKey` all hit the
//! same rule. Value detectors are regular expressions applied to string
//! leaves, in table order.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const PASSWORD: &str = "[PASSWORD_REDACTED]";
pub const TOKEN: &str = "[TOKEN_REDACTED]";
pub const API_KEY: &str = "[API_KEY_REDACTED]";
pub const SECRET: &str = "[SECRET_REDACTED]";
pub const COOKIE: &str = "[COOKIE_REDACTED]";
pub const JWT: &str = "[JWT_REDACTED]";
pub const PRIVATE_KEY: &str = "[PRIVATE_KEY_REDACTED]";
pub const SSN: &str = "[SSN_REDACTED]";
pub const CARD: &str = "[CARD_REDACTED]";
pub const HIGH_ENTROPY: &str = "[HIGH_ENTROPY_REDACTED]";
pub const SENSITIVE: &str = "[SENSITIVE_REDACTED]";
pub const REDACTED: &str = "[REDACTED]";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?:[A-Z]+_)*REDACTED\]").expect("valid placeholder pattern"));

/// Whether the text already carries a redaction placeholder.
pub fn contains_placeholder(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}

/// Lowercase and strip everything that is not alphanumeric.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
pub enum KeyMatcher {
    Exact(&'static str),
    Prefix(&'static str),
    Contains(&'static str),
    /// Case-insensitive regex evaluated against the raw key.
    Pattern(Regex),
}

#[derive(Debug, Clone)]
pub struct KeyDetector {
    matcher: KeyMatcher,
    placeholder: &'static str,
}

impl KeyDetector {
    pub const fn new(matcher: KeyMatcher, placeholder: &'static str) -> Self {
        Self { matcher, placeholder }
    }

    /// Build a detector from a user-supplied regex.
    pub fn custom(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("(?i){pattern}"))?;
        Ok(Self::new(KeyMatcher::Pattern(regex), SENSITIVE))
    }

    pub fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn matches(&self, raw: &str, normalized: &str) -> bool {
        match &self.matcher {
            KeyMatcher::Exact(name) => normalized == *name,
            KeyMatcher::Prefix(prefix) => normalized.starts_with(prefix),
            KeyMatcher::Contains(fragment) => normalized.contains(fragment),
            KeyMatcher::Pattern(regex) => regex.is_match(raw),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValueDetector {
    name: &'static str,
    regex: Regex,
    placeholder: &'static str,
    /// Keep capture group 1 in front of the placeholder.
    keep_prefix: bool,
    validate: Option<fn(&str) -> bool>,
}

impl ValueDetector {
    fn builtin(name: &'static str, pattern: &str, placeholder: &'static str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("valid builtin value pattern"),
            placeholder,
            keep_prefix: false,
            validate: None,
        }
    }

    fn keeping_prefix(mut self) -> Self {
        self.keep_prefix = true;
        self
    }

    fn validated_by(mut self, validate: fn(&str) -> bool) -> Self {
        self.validate = Some(validate);
        self
    }

    /// Build a detector from a user-supplied regex.
    pub fn custom(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: "custom",
            regex: Regex::new(pattern)?,
            placeholder: REDACTED,
            keep_prefix: false,
            validate: None,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Replace every match in `text`. Empty matches are left alone.
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !self.regex.is_match(text) {
            return Cow::Borrowed(text);
        }
        self.regex.replace_all(text, |caps: &Captures| self.replacement(caps))
    }

    fn replacement(&self, caps: &Captures) -> String {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        if whole.is_empty() {
            return String::new();
        }
        if let Some(validate) = self.validate {
            if !validate(whole) {
                return self.replace_valid_runs(whole, validate);
            }
        }
        if self.keep_prefix {
            let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            format!("{prefix}{}", self.placeholder)
        } else {
            self.placeholder.to_string()
        }
    }
}

impl ValueDetector {
    /// A greedy match can swallow a neighbouring number and fail validation
    /// as a whole. Redact the longest valid run inside it that starts and
    /// ends on token boundaries, then keep looking on either side.
    fn replace_valid_runs(&self, span: &str, validate: fn(&str) -> bool) -> String {
        let chars: Vec<(usize, char)> = span.char_indices().collect();
        let alnum = |i: usize| chars.get(i).is_some_and(|(_, c)| c.is_ascii_alphanumeric());

        let starts: Vec<usize> = (0..chars.len())
            .filter(|&i| alnum(i) && (i == 0 || !alnum(i - 1)))
            .map(|i| chars[i].0)
            .collect();
        let ends: Vec<usize> = (0..chars.len())
            .filter(|&i| alnum(i) && !alnum(i + 1))
            .map(|i| chars[i].0 + chars[i].1.len_utf8())
            .collect();

        let mut best: Option<(usize, usize)> = None;
        for &start in &starts {
            for &end in ends.iter().filter(|&&end| end > start) {
                if (start, end) == (0, span.len()) || !validate(&span[start..end]) {
                    continue;
                }
                if best.is_none_or(|(s, e)| end - start > e - s) {
                    best = Some((start, end));
                }
            }
        }

        match best {
            Some((start, end)) => format!(
                "{}{}{}",
                self.replace_valid_runs(&span[..start], validate),
                self.placeholder,
                self.replace_valid_runs(&span[end..], validate)
            ),
            None => span.to_string(),
        }
    }
}

/// Apply a detector to the parts of `text` that are not already placeholders.
///
/// Returns `None` when nothing was replaced.
pub fn apply_outside_placeholders(detector: &ValueDetector, text: &str) -> Option<String> {
    if !contains_placeholder(text) {
        return match detector.apply(text) {
            Cow::Owned(replaced) => Some(replaced),
            Cow::Borrowed(_) => None,
        };
    }

    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut last = 0;
    for placeholder in PLACEHOLDER.find_iter(text) {
        push_segment(&mut out, detector, &text[last..placeholder.start()], &mut changed);
        out.push_str(placeholder.as_str());
        last = placeholder.end();
    }
    push_segment(&mut out, detector, &text[last..], &mut changed);

    changed.then_some(out)
}

fn push_segment(out: &mut String, detector: &ValueDetector, segment: &str, changed: &mut bool) {
    if segment.is_empty() {
        return;
    }
    match detector.apply(segment) {
        Cow::Owned(replaced) => {
            *changed = true;
            out.push_str(&replaced);
        }
        Cow::Borrowed(unchanged) => out.push_str(unchanged),
    }
}

/// Luhn checksum over the digits of a candidate card number.
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

pub static BUILTIN_KEY_DETECTORS: LazyLock<Vec<KeyDetector>> = LazyLock::new(|| {
    use KeyMatcher::*;
    vec![
        KeyDetector::new(Contains("password"), PASSWORD),
        KeyDetector::new(Contains("passwd"), PASSWORD),
        KeyDetector::new(Contains("passphrase"), PASSWORD),
        KeyDetector::new(Exact("pwd"), PASSWORD),
        KeyDetector::new(Contains("apikey"), API_KEY),
        KeyDetector::new(Contains("token"), TOKEN),
        KeyDetector::new(Exact("authorization"), TOKEN),
        KeyDetector::new(Exact("proxyauthorization"), TOKEN),
        KeyDetector::new(Contains("cookie"), COOKIE),
        KeyDetector::new(Exact("sessionid"), COOKIE),
        KeyDetector::new(Contains("secret"), SECRET),
        KeyDetector::new(Contains("privatekey"), SECRET),
        KeyDetector::new(Contains("credential"), SECRET),
        KeyDetector::new(Exact("ssn"), SSN),
        KeyDetector::new(Prefix("creditcard"), CARD),
        KeyDetector::new(Exact("cardnumber"), CARD),
        KeyDetector::new(Exact("cvv"), CARD),
        KeyDetector::new(Exact("cvc"), CARD),
    ]
});

pub static BUILTIN_VALUE_DETECTORS: LazyLock<Vec<ValueDetector>> = LazyLock::new(|| {
    vec![
        ValueDetector::builtin(
            "jwt",
            r"\beyJ[A-Za-z0-9_-]+\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]*",
            JWT,
        ),
        ValueDetector::builtin(
            "private_key",
            r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----",
            PRIVATE_KEY,
        ),
        ValueDetector::builtin(
            "api_key",
            concat!(
                r"\b(?:sk|pk|rk)[-_](?:live[-_]|test[-_]|ant[-_])?[A-Za-z0-9_-]{16,}",
                r"|\bAKIA[0-9A-Z]{16}\b",
                r"|\bAIza[0-9A-Za-z_-]{35}",
                r"|\bgh[pousr]_[A-Za-z0-9]{36,}",
                r"|\bxox[baprs]-[A-Za-z0-9-]{10,}",
            ),
            API_KEY,
        ),
        ValueDetector::builtin("bearer", r"(?i)(\bbearer\s+)[A-Za-z0-9._~+/-]{16,}=*", TOKEN)
            .keeping_prefix(),
        ValueDetector::builtin(
            "inline_secret",
            r#"(?i)(\b[A-Za-z0-9_-]*(?:password|passwd|pwd|secret|token|api[-_]?key)["']?\s*[:=]\s*["']?)[^\s"'&,;\[\]]+"#,
            SECRET,
        )
        .keeping_prefix(),
        ValueDetector::builtin("ssn", r"\b\d{3}-\d{2}-\d{4}\b", SSN),
        ValueDetector::builtin("card", r"\b(?:\d[ -]?){12,18}\d\b", CARD).validated_by(luhn_valid),
    ]
});
