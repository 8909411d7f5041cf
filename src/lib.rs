#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod crawler;
mod dispatch;
mod error;
mod loader;
mod matcher;
mod rule;
mod task;
mod template;
mod wrapper;

pub use crate::crawler::{CONFIG_NAME_VAR, CONFIG_PATH_VAR, Crawler};
pub use crate::dispatch::dispatch;
pub use crate::error::*;
pub use crate::loader::{ConfigLoader, PluginResolver, Registries};
pub use crate::matcher::Matcher;
pub use crate::rule::Rule;
pub use crate::task::{Perform, PerformOutput, Task, TaskRegistry};
pub use crate::template::Template;
pub use crate::wrapper::{RunTask, TaskWrapper, WrapperRegistry};

/// Initialize a `tracing` subscriber reading the filter from the
/// environment. Call this once from the host process; library code only
/// emits events.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
