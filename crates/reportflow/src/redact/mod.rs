//! PII redaction applied to extracted text before it leaves the process.
//!
//! Rules run in a fixed order, each over the previous rule's output:
//! e-mail addresses, phone numbers, then labelled patient names.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const REDACTION_MARKER: &str = "[REDACTED]";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

/// Starts at a `+` or `(` when present so the prefix is redacted too.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+|\(|\b)\d{1,4}\)?[\s\-.]?\(?\d{2,4}\)?[\s\-.]?\d{2,4}[\s\-.]?\d{2,4}\b")
        .expect("valid phone regex")
});

/// `Name:`, `Patient -`, `Patient Name:` and friends, followed by the name.
/// The value may not start with `[` so redacted output is left alone.
static NAME_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(patient[ \t]+name|patient|name)[ \t]*[:\-][ \t]*[\p{L},.'][\p{L} ,.'\-]*")
        .expect("valid name label regex")
});

/// Which rule produced a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionRule {
    Email,
    Phone,
    NameLabel,
}

/// Per-rule replacement counts from [`redact_with_stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RedactionStats {
    pub emails: usize,
    pub phones: usize,
    pub names: usize,
}

impl RedactionStats {
    pub fn total(&self) -> usize {
        self.emails + self.phones + self.names
    }

    fn bump(&mut self, rule: RedactionRule, n: usize) {
        match rule {
            RedactionRule::Email => self.emails += n,
            RedactionRule::Phone => self.phones += n,
            RedactionRule::NameLabel => self.names += n,
        }
    }
}

/// Removes e-mail addresses, phone numbers and labelled names from `text`.
pub fn redact(text: &str) -> String {
    redact_with_stats(text).0
}

pub fn redact_with_stats(text: &str) -> (String, RedactionStats) {
    let mut stats = RedactionStats::default();
    let mut current = text.to_string();

    for rule in [
        RedactionRule::Email,
        RedactionRule::Phone,
        RedactionRule::NameLabel,
    ] {
        let (next, n) = apply(rule, &current);
        stats.bump(rule, n);
        if let Cow::Owned(next) = next {
            current = next;
        }
    }

    (current, stats)
}

fn apply(rule: RedactionRule, text: &str) -> (Cow<'_, str>, usize) {
    let mut count = 0;
    let out = match rule {
        RedactionRule::Email => EMAIL_RE.replace_all(text, |_: &Captures<'_>| {
            count += 1;
            REDACTION_MARKER
        }),
        RedactionRule::Phone => PHONE_RE.replace_all(text, |_: &Captures<'_>| {
            count += 1;
            REDACTION_MARKER
        }),
        RedactionRule::NameLabel => NAME_LABEL_RE.replace_all(text, |caps: &Captures<'_>| {
            count += 1;
            format!("{}: {}", &caps[1], REDACTION_MARKER)
        }),
    };
    (out, count)
}
