//! Declarative body matchers.

use std::collections::HashSet;

use regex::Regex;

/// An ordered list of body patterns.
///
/// Patterns are compiled once from literals, so a bad pattern is a
/// programming error and panics at first use.
#[derive(Debug)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    pub fn new(patterns: &[&str]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid pattern {p:?}: {e}")))
            .collect();
        Self { patterns }
    }

    /// Any pattern matches.
    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    /// First capture group of every pattern that matches, in pattern order.
    pub fn keys<'t>(&self, text: &'t str) -> impl Iterator<Item = &'t str> {
        self.patterns.iter().filter_map(move |re| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
        })
    }
}

/// Keys observed so far while walking one thread.
#[derive(Debug, Default)]
pub struct SeenKeys {
    seen: HashSet<String>,
}

impl SeenKeys {
    /// Record every key. Returns true if any of them had been seen before.
    pub fn record<'t>(&mut self, keys: impl IntoIterator<Item = &'t str>) -> bool {
        let mut repeated = false;
        for key in keys {
            repeated |= !self.seen.insert(key.to_owned());
        }
        repeated
    }
}
