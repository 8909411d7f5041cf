use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::Value;

use crate::matcher::Matcher;
use crate::task::Task;
use crate::template::Template;
use crate::wrapper::TaskWrapper;

/// A bound rule in the tree, coupling a task template with the target-path
/// template and match predicate that decide when and where it runs.
///
/// The task held here is a template: the dispatcher clones it and populates
/// the clone per batch of matching crawlers, so one rule can fire any number
/// of times without state bleeding between executions. A parent exclusively
/// owns its children; the tree mirrors the nesting of the configuration
/// document it was built from.
///
/// The variable snapshot is shared by every rule built from the same
/// document, at every depth. It is attached once during the load and never
/// mutated afterwards.
pub struct Rule {
    task: Task,
    template: Template,
    matcher: Matcher,
    wrapper: Option<TaskWrapper>,
    vars: Arc<BTreeMap<String, Value>>,
    children: Vec<Rule>,
}

impl Rule {
    pub fn new(task: Task, template: Template, matcher: Matcher) -> Self {
        Self {
            task,
            template,
            matcher,
            wrapper: None,
            vars: Arc::new(BTreeMap::new()),
            children: Vec::new(),
        }
    }

    /// The task template cloned for each execution of this rule.
    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn wrapper(&self) -> Option<&TaskWrapper> {
        self.wrapper.as_ref()
    }

    pub fn set_wrapper(&mut self, wrapper: TaskWrapper) {
        self.wrapper = Some(wrapper);
    }

    /// The inherited variable snapshot.
    pub fn vars(&self) -> &BTreeMap<String, Value> {
        &self.vars
    }

    /// Replace the inherited variable snapshot. The loader attaches one
    /// shared snapshot per configuration document.
    pub fn set_vars(&mut self, vars: Arc<BTreeMap<String, Value>>) {
        self.vars = vars;
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn var_names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn children(&self) -> &[Rule] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Rule> {
        &mut self.children
    }

    pub fn add_child(&mut self, rule: Rule) {
        self.children.push(rule);
    }
}

impl Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rule({}, {} children)",
            self.task.kind(),
            self.children.len()
        )
    }
}
