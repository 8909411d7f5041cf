use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::Value;

use crate::crawler::Crawler;
use crate::error::WrapperError;
use crate::task::Task;

/// The execution seam for running a configured task somewhere.
///
/// The built-in `local` wrapper drains [`Task::run`] in-process; hosts
/// register their own implementations to hand tasks off to a subprocess or
/// remote infrastructure, typically by shipping `Task::to_json` across and
/// reviving it on the other side.
pub trait RunTask: Send + Sync {
    fn run(&self, task: &Task, options: &BTreeMap<String, Value>) -> anyhow::Result<Vec<Crawler>>;
}

struct InProcess;

impl RunTask for InProcess {
    fn run(&self, task: &Task, _options: &BTreeMap<String, Value>) -> anyhow::Result<Vec<Crawler>> {
        let crawlers = task.run().collect::<Result<Vec<_>, _>>()?;
        Ok(crawlers)
    }
}

/// A named, configured execution wrapper attached to a rule.
#[derive(Clone)]
pub struct TaskWrapper {
    name: String,
    options: BTreeMap<String, Value>,
    runner: Arc<dyn RunTask>,
}

impl TaskWrapper {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(name.into(), value.into());
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    pub fn option_names(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }

    /// Execute `task` through this wrapper, returning its output crawlers.
    pub fn run(&self, task: &Task) -> anyhow::Result<Vec<Crawler>> {
        self.runner.run(task, &self.options)
    }
}

impl Debug for TaskWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskWrapper({})", self.name)
    }
}

/// Mapping from wrapper type name to its runner, with the same last-wins
/// registration semantics as the task registry.
pub struct WrapperRegistry {
    map: HashMap<String, Arc<dyn RunTask>>,
}

impl WrapperRegistry {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// A registry seeded with the built-in `local` wrapper.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("local", InProcess);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, runner: impl RunTask + 'static) {
        self.map.insert(name.into(), Arc::new(runner));
    }

    pub fn create(&self, name: &str) -> Result<TaskWrapper, WrapperError> {
        let runner = self
            .map
            .get(name)
            .ok_or_else(|| WrapperError::TypeNotFound(name.to_owned()))?;

        Ok(TaskWrapper {
            name: name.to_owned(),
            options: BTreeMap::new(),
            runner: runner.clone(),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.map.keys().map(String::as_str).collect()
    }
}

impl Default for WrapperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskRegistry;

    #[test]
    fn test_unknown_wrapper_type() {
        let registry = WrapperRegistry::with_builtins();
        let err = registry.create("farm").unwrap_err();
        assert!(matches!(err, WrapperError::TypeNotFound(name) if name == "farm"));
    }

    #[test]
    fn test_local_wrapper_runs_in_process() {
        let wrappers = WrapperRegistry::with_builtins();
        let tasks = TaskRegistry::with_builtins();

        let mut wrapper = wrappers.create("local").unwrap();
        wrapper.set_option("nice", 10);
        assert_eq!(wrapper.option_names().collect::<Vec<_>>(), vec!["nice"]);

        let mut task = tasks.create("nothing").unwrap();
        task.add(Crawler::new("exrPlate", "/footage/a.exr"), "/out/a.exr")
            .unwrap();

        let out = wrapper.run(&task).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path(), "/footage/a.exr");
    }
}
