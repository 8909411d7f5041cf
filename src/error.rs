use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("crawler has no variable named {0:?}")]
    VarNotFound(String),

    #[error("crawler variable {0:?} is not a {1}")]
    WrongVarType(String, &'static str),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task type is not registered: {0:?}")]
    TypeNotFound(String),

    #[error("invalid option name: {0:?}")]
    InvalidOption(String),

    #[error("crawler is not part of the task: {0}")]
    UnknownCrawler(Utf8PathBuf),

    #[error("target path for crawler {0} must be a non-empty string")]
    EmptyTargetPath(Utf8PathBuf),

    #[error("task {kind:?} yielded a crawler outside its own set: {crawler}")]
    ForeignCrawler { kind: String, crawler: Utf8PathBuf },

    #[error("task perform step failed:\n{0}")]
    Perform(#[source] anyhow::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unbalanced braces in template {0:?}")]
    Malformed(String),

    #[error("template references unknown variable {0:?}")]
    UnknownVariable(String),

    #[error("variable {0:?} cannot be rendered into a path segment")]
    Unrenderable(String),
}

#[derive(Debug, Error)]
pub enum WrapperError {
    #[error("task wrapper type is not registered: {0:?}")]
    TypeNotFound(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid file {0:?}")]
    InvalidFile(Utf8PathBuf),

    #[error("invalid directory {0:?}")]
    InvalidDirectory(Utf8PathBuf),

    #[error("unexpected content: {0}")]
    UnexpectedContent(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Wrapper(#[from] WrapperError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("couldn't compile script pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("couldn't read configuration.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("extension script {path}:\n{source}")]
    Script {
        path: Utf8PathBuf,
        source: anyhow::Error,
    },

    #[error("extension script {0} resolved but no plugin resolver is configured")]
    NoResolver(Utf8PathBuf),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("rule for task {kind:?}: couldn't render target path:\n{source}")]
    Template {
        kind: String,
        source: TemplateError,
    },

    #[error("task {kind:?}:\n{source}")]
    Task { kind: String, source: TaskError },

    #[error("task wrapper {name:?}:\n{source}")]
    Wrapper { name: String, source: anyhow::Error },
}

#[derive(Debug, Error)]
pub enum DroverError {
    #[error(transparent)]
    Crawler(#[from] CrawlerError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("error while loading configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("error while dispatching crawlers:\n{0}")]
    Dispatch(#[from] DispatchError),
}
