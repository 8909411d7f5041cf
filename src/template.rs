use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde_json::Value;

use crate::crawler::Crawler;
use crate::error::TemplateError;

/// A target-path template bound to a rule.
///
/// The raw pattern is kept as written in the configuration document and
/// evaluated only once a crawler matches the rule. Evaluation substitutes
/// `{name}` references, resolving against the crawler's variables first and
/// the rule's inherited variables second:
///
/// ```
/// use drover::{Crawler, Template};
///
/// let template = Template::new("{prefix}/{shot}/plate.exr");
/// let crawler = Crawler::new("dpxPlate", "/footage/a.dpx").with_var("shot", "sh010");
/// let vars = [("prefix".to_string(), "/publish".into())].into();
///
/// let path = template.render(&crawler, &vars).unwrap();
/// assert_eq!(path, "/publish/sh010/plate.exr");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pattern: String,
}

impl Template {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// The raw pattern as written in the configuration document.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Evaluate the template against a crawler and a set of inherited
    /// variables, producing the target path.
    pub fn render(
        &self,
        crawler: &Crawler,
        vars: &BTreeMap<String, Value>,
    ) -> Result<Utf8PathBuf, TemplateError> {
        let mut out = String::with_capacity(self.pattern.len());
        let mut rest = self.pattern.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            rest = &rest[open + 1..];

            let close = rest
                .find('}')
                .ok_or_else(|| TemplateError::Malformed(self.pattern.clone()))?;

            out.push_str(&resolve(&rest[..close], crawler, vars)?);
            rest = &rest[close + 1..];
        }

        if rest.contains('}') {
            return Err(TemplateError::Malformed(self.pattern.clone()));
        }

        out.push_str(rest);
        Ok(Utf8PathBuf::from(out))
    }
}

fn resolve(
    name: &str,
    crawler: &Crawler,
    vars: &BTreeMap<String, Value>,
) -> Result<String, TemplateError> {
    let value = match crawler.var(name) {
        Ok(value) => value,
        Err(_) => vars
            .get(name)
            .ok_or_else(|| TemplateError::UnknownVariable(name.to_owned()))?,
    };

    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        _ => Err(TemplateError::Unrenderable(name.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_crawler_vars_take_precedence() {
        let template = Template::new("{prefix}/{shot}.{frame}.exr");
        let crawler = Crawler::new("dpxPlate", "/footage/a.dpx")
            .with_var("shot", "sh010")
            .with_var("frame", 1001);

        let inherited = vars(&[
            ("prefix", "/publish".into()),
            ("shot", "fromConfig".into()),
        ]);

        let path = template.render(&crawler, &inherited).unwrap();
        assert_eq!(path, "/publish/sh010.1001.exr");
    }

    #[test]
    fn test_unknown_variable() {
        let template = Template::new("{prefix}/out.exr");
        let crawler = Crawler::new("dpxPlate", "/footage/a.dpx");

        let err = template.render(&crawler, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownVariable(name) if name == "prefix"));
    }

    #[test]
    fn test_malformed_pattern() {
        let template = Template::new("{prefix/out.exr");
        let crawler = Crawler::new("dpxPlate", "/footage/a.dpx");

        let err = template.render(&crawler, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, TemplateError::Malformed(_)));
    }

    #[test]
    fn test_unrenderable_value() {
        let template = Template::new("{list}/out.exr");
        let crawler =
            Crawler::new("dpxPlate", "/footage/a.dpx").with_var("list", vec!["a", "b"]);

        let err = template.render(&crawler, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, TemplateError::Unrenderable(_)));
    }
}
