//! Error types shared by every stage of the pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the script pipeline.
///
/// Nothing is retried automatically: the caller (a build or the dev server)
/// decides whether to request the same script again.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("prepare script: {0}")]
    Prepare(#[from] PrepareError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("module tidy failed:\n{output}")]
    Tidy { output: String },

    #[error("compile failed:\n{output}")]
    Toolchain { output: String },

    #[error(
        "wasm file not generated at {}, build output: {output}, files in build dir: {files:?}",
        path.display()
    )]
    MissingArtifact {
        path: PathBuf,
        output: String,
        files: Vec<String>,
    },

    #[error("install artifact into cache at {}: {source}", path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("runtime glue (wasm_exec.js) not found under {0:?}")]
    GlueNotFound(Option<PathBuf>),

    #[error("manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("page {}: {message}", path.display())]
    Page { path: PathBuf, message: String },

    #[error("watch: {0}")]
    Watch(#[from] notify::Error),

    /// A failure observed by a caller that waited on another caller's build
    /// of the same script.
    #[error(transparent)]
    Shared(Arc<PipelineError>),
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    /// Unwraps a shared error when this caller holds the last reference.
    pub fn from_shared(err: Arc<PipelineError>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(PipelineError::Shared)
    }

    /// The innermost error, looking through shared wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Shared(inner) => inner.root(),
            other => other,
        }
    }
}

/// Failures of the entry-function scan over a script body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrepareError {
    #[error("unterminated {kind} starting at byte {offset}")]
    Unterminated { kind: &'static str, offset: usize },

    #[error("unexpected `{delim}` at byte {offset}")]
    UnbalancedClose { delim: char, offset: usize },

    #[error("{open} unclosed delimiter(s) at end of script")]
    Unclosed { open: usize },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Attaches filesystem context to `std::io::Result`s.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| PipelineError::io(f(), source))
    }
}
