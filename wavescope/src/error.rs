use std::fmt::{Debug, Display};
use std::path::PathBuf;

use thiserror::Error;

use crate::exec::DiagnosticReport;
use crate::simulation::SeriesError;

pub type Result<T> = std::result::Result<T, WavescopeError>;

pub struct WavescopeError {
    pub(crate) source: ErrorSource,
    pub(crate) context: Vec<ErrorContext>,
}

impl WavescopeError {
    pub fn source(&self) -> &ErrorSource {
        &self.source
    }
}

impl std::error::Error for WavescopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl Display for WavescopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Error:\n{}", self.source)?;
        if !self.context.is_empty() {
            writeln!(f, "\nError occurred:")?;
            for item in self.context.iter() {
                writeln!(f, "\twhile {}", item)?;
            }
        }
        Ok(())
    }
}

impl Debug for WavescopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.source)?;
        if !self.context.is_empty() {
            writeln!(f, "\nError occurred:")?;
            for (i, item) in self.context.iter().enumerate() {
                writeln!(f, "\t{}: {:?}", i, item)?;
            }
        }
        Ok(())
    }
}

impl<T> From<T> for WavescopeError
where
    T: Into<ErrorSource>,
{
    fn from(value: T) -> Self {
        Self {
            source: value.into(),
            context: Vec::new(),
        }
    }
}

impl WavescopeError {
    pub fn new(source: impl Into<ErrorSource>) -> Self {
        Self {
            source: source.into(),
            context: Vec::new(),
        }
    }

    pub fn from_context(source: impl Into<ErrorSource>, ctx: impl Into<ErrorContext>) -> Self {
        Self {
            source: source.into(),
            context: vec![ctx.into()],
        }
    }

    pub fn with_context(mut self, ctx: impl Into<ErrorContext>) -> Self {
        self.context.push(ctx.into());
        self
    }

    #[inline]
    pub fn into_inner(self) -> ErrorSource {
        self.source
    }
}

#[inline]
pub fn with_err_context<T, E, C>(result: std::result::Result<T, E>, ctx: C) -> Result<T>
where
    C: FnOnce() -> ErrorContext,
    E: Into<WavescopeError>,
{
    result.map_err(|err| err.into().with_context(ctx()))
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorContext {
    CreateDir(PathBuf),
    CreateFile(PathBuf),
    ReadFile(PathBuf),
    RunTool(String),
    Task(String),
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorContext::*;
        match self {
            CreateDir(path) => write!(f, "creating directory {path:?}"),
            CreateFile(path) => write!(f, "creating file {path:?}"),
            ReadFile(path) => write!(f, "reading file {path:?}"),
            RunTool(program) => write!(f, "running {program}"),
            Task(task) => write!(f, "{task}"),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorSource {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    ToolDiagnostics(DiagnosticReport),

    #[error("run cancelled")]
    Cancelled,

    #[error("tool output is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("error merging data series: {0}")]
    Series(#[from] SeriesError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unexpected error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("unexpected error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
