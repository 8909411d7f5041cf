use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::crawler::Crawler;
use crate::error::DispatchError;
use crate::rule::Rule;

/// Drive a batch of crawlers through a rule tree, depth first.
///
/// For every rule, the matching crawlers are stamped with the rule's
/// inherited variables, the target-path template is rendered per crawler,
/// and a clone of the rule's task template is populated and executed
/// (through the rule's wrapper when one is attached). The crawlers a task
/// produces are offered to the rule's child rules recursively, so one
/// rule's artifacts feed the next level of the pipeline.
///
/// Returns every crawler produced at any depth, in rule order. Any failure
/// aborts the whole dispatch.
pub fn dispatch(rules: &[Rule], crawlers: &[Crawler]) -> Result<Vec<Crawler>, DispatchError> {
    let total = count_rules(rules);
    eprintln!(
        "Dispatching {} crawlers through {} rules.",
        style(crawlers.len()).cyan(),
        style(total).cyan()
    );

    let bar = ProgressBar::new(total as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("Error setting progress bar template")
            .progress_chars("#>-"),
    );

    let mut produced = Vec::new();
    dispatch_level(rules, crawlers, &bar, &mut produced)?;

    bar.finish_with_message(format!("produced {} crawlers", produced.len()));
    Ok(produced)
}

fn dispatch_level(
    rules: &[Rule],
    crawlers: &[Crawler],
    bar: &ProgressBar,
    produced: &mut Vec<Crawler>,
) -> Result<(), DispatchError> {
    for rule in rules {
        let kind = rule.task().kind();
        bar.set_message(kind.to_string());

        let mut task = rule.task().clone();

        for crawler in crawlers.iter().filter(|c| rule.matcher().matches(c)) {
            // The rule's inherited variables ride along on the crawler, so
            // templates and provenance see the configuration origin.
            let mut crawler = crawler.clone();
            for (name, value) in rule.vars() {
                crawler.set_var(name.clone(), value.clone());
            }

            let target = rule
                .template()
                .render(&crawler, rule.vars())
                .map_err(|source| DispatchError::Template {
                    kind: kind.to_owned(),
                    source,
                })?;

            task.add(crawler, target).map_err(|source| DispatchError::Task {
                kind: kind.to_owned(),
                source,
            })?;
        }

        if task.crawlers().count() == 0 {
            bar.inc(1);
            continue;
        }

        let outputs = match rule.wrapper() {
            Some(wrapper) => wrapper.run(&task).map_err(|source| DispatchError::Wrapper {
                name: wrapper.name().to_owned(),
                source,
            })?,
            None => task
                .run()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| DispatchError::Task {
                    kind: kind.to_owned(),
                    source,
                })?,
        };

        tracing::info!("task {} produced {} crawlers", kind, outputs.len());
        bar.inc(1);

        produced.extend(outputs.iter().cloned());
        dispatch_level(rule.children(), &outputs, bar, produced)?;
    }

    Ok(())
}

fn count_rules(rules: &[Rule]) -> usize {
    rules
        .iter()
        .map(|rule| 1 + count_rules(rule.children()))
        .sum()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Arc;

    use camino::Utf8Path;
    use serde_json::Value;

    use super::*;
    use crate::loader::{ConfigLoader, Registries};
    use crate::matcher::Matcher;
    use crate::task::TaskRegistry;
    use crate::template::Template;

    #[test]
    fn test_copy_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(dir_path.join("plate.0001.dpx"), b"frame data").unwrap();

        let config = r#"{
            "vars": { "stage": "online" },
            "taskHolders": [
                {
                    "task": "copy",
                    "targetTemplate": "{prefix}/{stage}/{name}.dpx",
                    "matchTypes": ["dpxPlate"],
                    "matchVars": { "imageType": ["sequence"] },
                    "taskHolders": [
                        {
                            "task": "copy",
                            "targetTemplate": "{prefix}/review/{name}.dpx",
                            "matchTypes": ["dpxPlate"],
                            "matchVars": {}
                        }
                    ]
                }
            ]
        }"#;

        let mut loader = ConfigLoader::new(Registries::with_builtins());
        loader
            .add_from_json(config, dir_path, "ingest.json")
            .unwrap();

        let crawlers = vec![
            Crawler::new("dpxPlate", dir_path.join("plate.0001.dpx"))
                .with_var("prefix", dir_path.as_str())
                .with_var("name", "plate.0001")
                .with_var("imageType", "sequence"),
            // Wrong kind, never matched.
            Crawler::new("movPlate", dir_path.join("plate.0001.dpx")),
        ];

        let produced = dispatch(loader.rules(), &crawlers).unwrap();

        // Root rule plus its child both fired once.
        assert_eq!(produced.len(), 2);
        assert!(dir_path.join("online/plate.0001.dpx").is_file());
        assert!(dir_path.join("review/plate.0001.dpx").is_file());

        // Produced crawlers carry the inherited variables.
        assert_eq!(produced[0].var("stage").unwrap(), &Value::from("online"));
    }

    #[test]
    fn test_unmatched_rules_produce_nothing() {
        let registry = TaskRegistry::with_builtins();
        let task = registry.create("nothing").unwrap();

        let mut rule = Rule::new(
            task,
            Template::new("/out/{name}"),
            Matcher::new(vec!["exrPlate".into()], BTreeMap::new()),
        );
        rule.set_vars(Arc::new(BTreeMap::new()));

        let crawlers = vec![Crawler::new("dpxPlate", "/footage/a.dpx")];
        let produced = dispatch(&[rule], &crawlers).unwrap();
        assert!(produced.is_empty());
    }

    #[test]
    fn test_template_failure_aborts_dispatch() {
        let registry = TaskRegistry::with_builtins();
        let task = registry.create("nothing").unwrap();
        let rule = Rule::new(task, Template::new("/out/{missing}"), Matcher::default());

        let crawlers = vec![Crawler::new("dpxPlate", "/footage/a.dpx")];
        let err = dispatch(&[rule], &crawlers).unwrap_err();
        assert!(matches!(err, DispatchError::Template { .. }));
    }
}
