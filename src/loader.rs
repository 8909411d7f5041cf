use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};

use crate::crawler::{CONFIG_NAME_VAR, CONFIG_PATH_VAR};
use crate::error::ConfigError;
use crate::matcher::Matcher;
use crate::rule::Rule;
use crate::task::{Task, TaskRegistry};
use crate::template::Template;
use crate::wrapper::WrapperRegistry;

/// The registries a configuration document can reference and extension
/// plugins can mutate.
pub struct Registries {
    pub tasks: TaskRegistry,
    pub wrappers: WrapperRegistry,
}

impl Registries {
    /// Empty registries, useful for isolated tests.
    pub fn new() -> Self {
        Self {
            tasks: TaskRegistry::new(),
            wrappers: WrapperRegistry::new(),
        }
    }

    /// Registries seeded with every built-in task and wrapper type.
    pub fn with_builtins() -> Self {
        Self {
            tasks: TaskRegistry::with_builtins(),
            wrappers: WrapperRegistry::with_builtins(),
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

/// Hook invoked for every extension script file a document resolves.
///
/// How registration code reaches the registries is the host's choice: a
/// static table keyed by file name, a dynamic library, an embedded
/// interpreter. The loader only guarantees that every resolved file is
/// offered here before the rule tree referencing its types is built.
pub type PluginResolver = Box<dyn Fn(&Utf8Path, &mut Registries) -> anyhow::Result<()> + Send + Sync>;

/// Builds rule trees from JSON configuration documents.
///
/// A document's `taskHolders` list becomes a list of root [`Rule`]s whose
/// nesting mirrors the document exactly; repeated loads accumulate roots.
/// Loading is all-or-nothing per document: any structural error, unknown
/// task type, or extension-script failure aborts the load and leaves the
/// accumulated rule set untouched.
pub struct ConfigLoader {
    registries: Registries,
    resolver: Option<PluginResolver>,
    roots: Vec<Rule>,
}

impl ConfigLoader {
    pub fn new(registries: Registries) -> Self {
        Self {
            registries,
            resolver: None,
            roots: Vec::new(),
        }
    }

    /// Attach the hook used to load extension scripts referenced by the
    /// `scripts` field of configuration documents.
    pub fn with_plugin_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Utf8Path, &mut Registries) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn registries_mut(&mut self) -> &mut Registries {
        &mut self.registries
    }

    /// Root rules accumulated so far, in load order.
    pub fn rules(&self) -> &[Rule] {
        &self.roots
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.roots
    }

    /// Load a configuration document from a file.
    pub fn add_from_json_file(&mut self, path: impl AsRef<Utf8Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::InvalidFile(path.to_owned()));
        }

        let contents = fs::read_to_string(path)?;
        let config_path = path.parent().unwrap_or(Utf8Path::new("")).to_owned();
        let config_name = path.file_name().unwrap_or_default().to_owned();

        self.add_from_json(&contents, &config_path, &config_name)
    }

    /// Load every `*.json` document found directly inside a directory.
    pub fn add_from_json_directory(&mut self, dir: impl AsRef<Utf8Path>) -> Result<(), ConfigError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ConfigError::InvalidDirectory(dir.to_owned()));
        }

        for entry in glob::glob(dir.join("*.json").as_str())? {
            let path = Utf8PathBuf::try_from(entry?)?;
            self.add_from_json_file(&path)?;
        }

        Ok(())
    }

    /// Load a configuration document from raw text, with the directory it
    /// was found in and its own file name as origin metadata.
    pub fn add_from_json(
        &mut self,
        contents: &str,
        config_path: &Utf8Path,
        config_name: &str,
    ) -> Result<(), ConfigError> {
        let document: Value = serde_json::from_str(contents)?;
        let root = document
            .as_object()
            .ok_or_else(|| unexpected("expecting an object at the document root"))?;

        self.load_scripts(root, config_path)?;

        let mut vars = match root.get("vars") {
            Some(value) => value
                .as_object()
                .ok_or_else(|| unexpected("expecting an object of vars"))?
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect::<BTreeMap<_, _>>(),
            None => BTreeMap::new(),
        };

        // The implicit origin entries win over same-named user vars.
        vars.insert(CONFIG_PATH_VAR.to_owned(), Value::from(config_path.as_str()));
        vars.insert(CONFIG_NAME_VAR.to_owned(), Value::from(config_name));
        let vars = Arc::new(vars);

        // Build into a scratch vector so a failure at any depth leaves the
        // committed rule set untouched.
        let mut roots = Vec::new();
        self.build_rules(root, &vars, &mut roots)?;

        tracing::info!(
            "loaded {} root rules from {}/{}",
            roots.len(),
            config_path,
            config_name
        );

        self.roots.extend(roots);
        Ok(())
    }

    /// Revive a task serialized with `Task::to_json`.
    ///
    /// When the document carries a configuration origin, that configuration
    /// file is re-loaded first so any dynamically registered types the task
    /// depends on exist again before construction.
    pub fn task_from_json(&mut self, contents: &str) -> Result<Task, ConfigError> {
        let document: Value = serde_json::from_str(contents)?;
        let config_path = document
            .get("configPath")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let config_name = document
            .get("configName")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if !config_path.is_empty() {
            self.add_from_json_file(Utf8Path::new(config_path).join(config_name))?;
        }

        Ok(Task::from_json(contents, &self.registries.tasks)?)
    }

    fn load_scripts(
        &mut self,
        root: &Map<String, Value>,
        config_path: &Utf8Path,
    ) -> Result<(), ConfigError> {
        let Some(scripts) = root.get("scripts") else {
            return Ok(());
        };

        let scripts = scripts
            .as_array()
            .ok_or_else(|| unexpected("expecting a list of script patterns"))?;

        for pattern in scripts {
            let pattern = pattern
                .as_str()
                .ok_or_else(|| unexpected("expecting a script pattern string"))?;

            for entry in glob::glob(config_path.join(pattern).as_str())? {
                let path = Utf8PathBuf::try_from(entry?)?;

                let Some(resolver) = &self.resolver else {
                    return Err(ConfigError::NoResolver(path));
                };

                if let Err(source) = resolver(&path, &mut self.registries) {
                    tracing::error!("error on loading extension script {path}");
                    return Err(ConfigError::Script { path, source });
                }

                tracing::debug!("loaded extension script {path}");
            }
        }

        Ok(())
    }

    /// Build the rules described by `content`'s `taskHolders` list into
    /// `out`, recursing into each entry's own nested list.
    fn build_rules(
        &self,
        content: &Map<String, Value>,
        vars: &Arc<BTreeMap<String, Value>>,
        out: &mut Vec<Rule>,
    ) -> Result<(), ConfigError> {
        let Some(holders) = content.get("taskHolders") else {
            return Ok(());
        };

        let holders = holders
            .as_array()
            .ok_or_else(|| unexpected("expecting a list of task holders"))?;

        for entry in holders {
            let entry = entry
                .as_object()
                .ok_or_else(|| unexpected("expecting an object to describe the task holder"))?;

            let kind = entry
                .get("task")
                .and_then(Value::as_str)
                .ok_or_else(|| unexpected("expecting a task name string"))?;
            let mut task = self.registries.tasks.create(kind)?;

            if let Some(options) = entry.get("taskOptions") {
                let options = options
                    .as_object()
                    .ok_or_else(|| unexpected("expecting an object of task options"))?;
                for (name, value) in options {
                    task.set_option(name.clone(), value.clone());
                }
            }

            let template = entry
                .get("targetTemplate")
                .and_then(Value::as_str)
                .ok_or_else(|| unexpected("expecting a target template string"))?;

            let matcher = Matcher::new(
                parse_match_kinds(entry)?,
                parse_match_vars(entry)?,
            );

            let mut rule = Rule::new(task, Template::new(template), matcher);
            rule.set_vars(vars.clone());

            if let Some(name) = entry.get("taskWrapper") {
                let name = name
                    .as_str()
                    .ok_or_else(|| unexpected("expecting a task wrapper name string"))?;
                let mut wrapper = self.registries.wrappers.create(name)?;

                if let Some(options) = entry.get("taskWrapperOptions") {
                    let options = options
                        .as_object()
                        .ok_or_else(|| unexpected("expecting an object of task wrapper options"))?;
                    for (name, value) in options {
                        wrapper.set_option(name.clone(), value.clone());
                    }
                }

                rule.set_wrapper(wrapper);
            }

            // The entry doubles as the parent content of its own nested
            // task holders.
            self.build_rules(entry, vars, rule.children_mut())?;

            out.push(rule);
        }

        Ok(())
    }
}

fn parse_match_kinds(entry: &Map<String, Value>) -> Result<Vec<String>, ConfigError> {
    entry
        .get("matchTypes")
        .and_then(Value::as_array)
        .ok_or_else(|| unexpected("expecting a list of match types"))?
        .iter()
        .map(|kind| {
            kind.as_str()
                .map(str::to_owned)
                .ok_or_else(|| unexpected("expecting a match type string"))
        })
        .collect()
}

fn parse_match_vars(entry: &Map<String, Value>) -> Result<BTreeMap<String, Vec<Value>>, ConfigError> {
    entry
        .get("matchVars")
        .and_then(Value::as_object)
        .ok_or_else(|| unexpected("expecting an object of match vars"))?
        .iter()
        .map(|(name, allowed)| {
            let allowed = allowed
                .as_array()
                .ok_or_else(|| unexpected("expecting a list of allowed match var values"))?;
            Ok((name.clone(), allowed.to_vec()))
        })
        .collect()
}

fn unexpected(message: &str) -> ConfigError {
    ConfigError::UnexpectedContent(message.to_owned())
}
