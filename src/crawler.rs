use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CrawlerError;

/// Variable carrying the directory a crawler's originating configuration
/// document was loaded from.
pub const CONFIG_PATH_VAR: &str = "configPath";

/// Variable carrying the file name of a crawler's originating configuration
/// document.
pub const CONFIG_NAME_VAR: &str = "configName";

/// A discovered filesystem entry flowing through the pipeline.
///
/// A crawler couples a kind tag (e.g. `"dpxPlate"`), the path it was
/// discovered at, and a set of named variables extracted during discovery
/// (sequence, shot, frame padding, ...). Rules match on the kind tag and the
/// variables, and target-path templates are rendered against them.
///
/// Crawlers compare structurally, so a crawler survives a JSON round-trip
/// as an equal value. The core never branches on a concrete crawler kind;
/// the tag is data supplied by whoever performed the discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crawler {
    kind: String,
    path: Utf8PathBuf,
    #[serde(default)]
    vars: BTreeMap<String, Value>,
}

impl Crawler {
    pub fn new(kind: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
            vars: BTreeMap::new(),
        }
    }

    /// Builder-style variant of [`Crawler::set_var`].
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_var(name, value);
        self
    }

    /// The kind tag this crawler was discovered as.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The path this crawler was discovered at.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Look up a variable by name.
    pub fn var(&self, name: &str) -> Result<&Value, CrawlerError> {
        self.vars
            .get(name)
            .ok_or_else(|| CrawlerError::VarNotFound(name.to_owned()))
    }

    /// Look up a variable expected to hold a string. An existing variable of
    /// a different shape fails with [`CrawlerError::WrongVarType`] rather
    /// than the not-found error.
    pub fn var_str(&self, name: &str) -> Result<&str, CrawlerError> {
        self.var(name)?
            .as_str()
            .ok_or_else(|| CrawlerError::WrongVarType(name.to_owned(), "string"))
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Insert or overwrite a variable.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Variable names in stable (sorted) order.
    pub fn var_names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_lookup_errors_are_distinct() {
        let crawler = Crawler::new("exrPlate", "/footage/a.exr").with_var("frame", 1001);

        assert!(matches!(
            crawler.var("shot"),
            Err(CrawlerError::VarNotFound(_))
        ));
        assert!(matches!(
            crawler.var_str("frame"),
            Err(CrawlerError::WrongVarType(_, "string"))
        ));
        assert_eq!(crawler.var("frame").unwrap(), &Value::from(1001));
    }

    #[test]
    fn test_set_var_overwrites() {
        let mut crawler = Crawler::new("exrPlate", "/footage/a.exr");
        crawler.set_var("shot", "sh010");
        crawler.set_var("shot", "sh020");

        assert_eq!(crawler.var_str("shot").unwrap(), "sh020");
        assert_eq!(crawler.var_names().collect::<Vec<_>>(), vec!["shot"]);
    }

    #[test]
    fn test_json_round_trip() {
        let crawler = Crawler::new("dpxPlate", "/footage/sh010/plate.0001.dpx")
            .with_var("seq", "seq010")
            .with_var("frame", 1);

        let json = crawler.to_json().unwrap();
        let restored = Crawler::from_json(&json).unwrap();

        assert_eq!(restored, crawler);
    }
}
