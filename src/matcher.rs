use std::collections::BTreeMap;

use serde_json::Value;

use crate::crawler::Crawler;

/// The match predicate bound to a rule.
///
/// A crawler matches when its kind tag is one of the accepted kinds and
/// every variable condition holds (AND logic). An empty kind list accepts
/// every kind, and an empty condition set always matches; each condition
/// requires the crawler to expose the variable with a value contained in
/// the allowed list.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    kinds: Vec<String>,
    vars: BTreeMap<String, Vec<Value>>,
}

impl Matcher {
    pub fn new(kinds: Vec<String>, vars: BTreeMap<String, Vec<Value>>) -> Self {
        Self { kinds, vars }
    }

    /// Crawler kinds accepted by this matcher.
    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// Required variable-value memberships.
    pub fn vars(&self) -> &BTreeMap<String, Vec<Value>> {
        &self.vars
    }

    /// Check whether a crawler satisfies this matcher.
    pub fn matches(&self, crawler: &Crawler) -> bool {
        if !self.kinds.is_empty() && !self.kinds.iter().any(|kind| kind == crawler.kind()) {
            return false;
        }

        self.vars.iter().all(|(name, allowed)| {
            match crawler.var(name) {
                Ok(value) => allowed.contains(value),
                Err(_) => false,
            }
        })
    }
}
