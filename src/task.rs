use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crawler::{CONFIG_NAME_VAR, CONFIG_PATH_VAR, Crawler};
use crate::error::TaskError;

/// The lazy output sequence of a perform step.
pub type PerformOutput = Box<dyn Iterator<Item = anyhow::Result<Crawler>> + Send>;

/// The pluggable perform step of a task.
///
/// An implementation receives the configured [`Task`] and yields the
/// crawlers representing its output, typically the very crawlers it was
/// given, meaning "the artifact now exists at its target path". Yielding a
/// crawler that is not part of the task's own set is a contract violation
/// which [`Task::run`] turns into a fatal error, because downstream
/// consumers index results by crawler to find each one's target path.
pub trait Perform: Send + Sync {
    fn perform(&self, task: &Task) -> PerformOutput;
}

/// Copies each crawler's source file to its target path, creating parent
/// directories as needed.
struct CopyFiles;

impl Perform for CopyFiles {
    fn perform(&self, task: &Task) -> PerformOutput {
        let pairs: Vec<(Crawler, Utf8PathBuf)> = task
            .pairs()
            .map(|(crawler, target)| (crawler.clone(), target.to_owned()))
            .collect();

        Box::new(pairs.into_iter().map(|(crawler, target)| {
            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir)?;
            }

            fs::copy(crawler.path(), &target)?;
            tracing::info!("copied {} to {}", crawler.path(), target);

            Ok(crawler)
        }))
    }
}

/// Yields the task's crawlers unchanged without touching the filesystem.
/// Useful for rules that only exist to route crawlers to their children.
struct YieldAll;

impl Perform for YieldAll {
    fn perform(&self, task: &Task) -> PerformOutput {
        let crawlers: Vec<Crawler> = task.crawlers().cloned().collect();
        Box::new(crawlers.into_iter().map(Ok))
    }
}

/// Mapping from task type name to its perform step.
///
/// The registry is an explicit value owned by the host process; tests use
/// disposable instances. Registration replaces silently, last writer wins,
/// so extension plugins may override built-ins. Nothing is ever pruned.
pub struct TaskRegistry {
    map: HashMap<String, Arc<dyn Perform>>,
}

impl TaskRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// A registry seeded with the built-in `copy` and `nothing` task types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("copy", CopyFiles);
        registry.register("nothing", YieldAll);
        registry
    }

    /// Install or replace the perform step for `name`.
    pub fn register(&mut self, name: impl Into<String>, behavior: impl Perform + 'static) {
        self.map.insert(name.into(), Arc::new(behavior));
    }

    /// Construct a fresh task of the registered type `name`.
    pub fn create(&self, name: &str) -> Result<Task, TaskError> {
        let behavior = self
            .map
            .get(name)
            .ok_or_else(|| TaskError::TypeNotFound(name.to_owned()))?;

        Ok(Task::new(name.to_owned(), behavior.clone()))
    }

    /// Currently registered type names, in no particular order.
    pub fn names(&self) -> Vec<&str> {
        self.map.keys().map(String::as_str).collect()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A named operation bound to crawler/target-path pairs and free-form
/// options.
///
/// A task is created through [`TaskRegistry::create`], configured with
/// options, populated with crawler/target pairs, and executed once via
/// [`Task::run`]. Reusing a task means cloning it first; a clone copies the
/// options and pairs by value and is independent of the original's
/// subsequent mutations.
#[derive(Clone)]
pub struct Task {
    kind: String,
    options: BTreeMap<String, Value>,
    pairs: Vec<(Crawler, Utf8PathBuf)>,
    behavior: Arc<dyn Perform>,
}

impl Task {
    fn new(kind: String, behavior: Arc<dyn Perform>) -> Self {
        Self {
            kind,
            options: BTreeMap::new(),
            pairs: Vec::new(),
            behavior,
        }
    }

    /// The registry type name this task was created from.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Read an option. Reading a name that was never set is an error.
    pub fn option(&self, name: &str) -> Result<&Value, TaskError> {
        self.options
            .get(name)
            .ok_or_else(|| TaskError::InvalidOption(name.to_owned()))
    }

    /// Set an option, overwriting any previous value.
    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(name.into(), value.into());
    }

    /// Names of all set options, in stable (sorted) order.
    pub fn option_names(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }

    /// Associate a crawler with the target path the task should produce.
    ///
    /// Re-adding a crawler already present overwrites its target path in
    /// place. The target path must be a non-empty string.
    pub fn add(&mut self, crawler: Crawler, target: impl Into<Utf8PathBuf>) -> Result<(), TaskError> {
        let target = target.into();
        if target.as_str().is_empty() {
            return Err(TaskError::EmptyTargetPath(crawler.path().to_owned()));
        }

        match self.pairs.iter_mut().find(|(c, _)| *c == crawler) {
            Some((_, existing)) => *existing = target,
            None => self.pairs.push((crawler, target)),
        }

        Ok(())
    }

    /// The target path associated with `crawler`.
    pub fn target_path(&self, crawler: &Crawler) -> Result<&Utf8Path, TaskError> {
        self.pairs
            .iter()
            .find(|(c, _)| c == crawler)
            .map(|(_, target)| target.as_path())
            .ok_or_else(|| TaskError::UnknownCrawler(crawler.path().to_owned()))
    }

    /// Crawlers associated with the task, in insertion order.
    pub fn crawlers(&self) -> impl Iterator<Item = &Crawler> {
        self.pairs.iter().map(|(crawler, _)| crawler)
    }

    /// Crawler/target pairs, in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Crawler, &Utf8Path)> {
        self.pairs
            .iter()
            .map(|(crawler, target)| (crawler, target.as_path()))
    }

    /// Execute the task, yielding its output crawlers lazily.
    ///
    /// Every yielded crawler is checked for membership of the task's own
    /// crawler set; an element produced outside of it fails with
    /// [`TaskError::ForeignCrawler`] instead of being skipped, since it
    /// signals a defective perform step.
    pub fn run(&self) -> impl Iterator<Item = Result<Crawler, TaskError>> + '_ {
        self.behavior.perform(self).map(move |item| match item {
            Ok(crawler) => {
                if self.pairs.iter().any(|(c, _)| *c == crawler) {
                    Ok(crawler)
                } else {
                    Err(TaskError::ForeignCrawler {
                        kind: self.kind.clone(),
                        crawler: crawler.path().to_owned(),
                    })
                }
            }
            Err(err) => Err(TaskError::Perform(err)),
        })
    }

    /// Serialize the task so it can be rebuilt elsewhere, possibly in
    /// another process.
    ///
    /// The document records the type name, the options, and every
    /// crawler/target pair with the crawler serialized verbatim. The
    /// `configPath`/`configName` fields are a provenance hint taken from the
    /// first crawler exposing a configuration name variable; all crawlers of
    /// one task are assumed to share the same configuration origin.
    pub fn to_json(&self) -> Result<String, TaskError> {
        let mut config_path = String::new();
        let mut config_name = String::new();

        for (crawler, _) in &self.pairs {
            if crawler.has_var(CONFIG_NAME_VAR) {
                config_path = crawler.var_str(CONFIG_PATH_VAR).unwrap_or_default().to_owned();
                config_name = crawler.var_str(CONFIG_NAME_VAR).unwrap_or_default().to_owned();
                break;
            }
        }

        let document = TaskDocument {
            kind: self.kind.clone(),
            options: self.options.clone(),
            config_path,
            config_name,
            crawler_entries: self
                .pairs
                .iter()
                .map(|(crawler, target)| {
                    Ok(CrawlerEntry {
                        file_path: target.to_string(),
                        serialized_crawler: crawler.to_json()?,
                    })
                })
                .collect::<Result<_, serde_json::Error>>()?,
        };

        Ok(serde_json::to_string(&document)?)
    }

    /// Rebuild a task from its serialized form.
    ///
    /// The referenced type must already be registered; when the document
    /// carries a configuration origin that may first have to be re-loaded,
    /// use `ConfigLoader::task_from_json` instead, which restores any
    /// dynamically registered types before delegating here.
    pub fn from_json(contents: &str, registry: &TaskRegistry) -> Result<Task, TaskError> {
        let document: TaskDocument = serde_json::from_str(contents)?;

        let mut task = registry.create(&document.kind)?;
        for (name, value) in document.options {
            task.set_option(name, value);
        }

        for entry in document.crawler_entries {
            let crawler = Crawler::from_json(&entry.serialized_crawler)?;
            task.add(crawler, entry.file_path)?;
        }

        Ok(task)
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({}, {} crawlers)", self.kind, self.pairs.len())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDocument {
    #[serde(rename = "type")]
    kind: String,
    options: BTreeMap<String, Value>,
    config_path: String,
    config_name: String,
    crawler_entries: Vec<CrawlerEntry>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrawlerEntry {
    file_path: String,
    serialized_crawler: String,
}
