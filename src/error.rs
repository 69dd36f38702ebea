//! Error types for pineforge operations.
//!
//! Defines error types for all major subsystems:
//! - Directive scanning and cut compilation
//! - Marker-based code injection
//! - Patch chain application
//! - External process invocation
//! - Grid merging, convolution and annotation
//! - Pipeline orchestration

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while scanning launch-template directives or compiling cuts.
///
/// These are configuration/validation failures: they are detected before any
/// file in the generator working tree is mutated.
#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("Unknown cut '{0}': not present in the cut code registry")]
    UnknownCut(String),

    #[error("Value '{value}' for cut '{name}' is neither a boolean literal nor a number")]
    MalformedCutValue { name: String, value: String },

    #[error("User defined tau_min is expected to be a number, got '{0}'")]
    MalformedTauMin(String),

    #[error("Regex error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the marker-based code injector.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("Could not find insertion marker `{marker}` in cut file `{document}`")]
    MarkerNotFound { marker: String, document: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while applying source patches.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Patch '{0}' requested, but does not exist in patches folder")]
    MissingPatch(String),

    #[error("Checked patch application failed with exit code {code}:\n{output}")]
    Failed { code: i32, output: String },

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the process invocation port.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with code {code}; captured output:\n{log}")]
    Failed {
        program: String,
        code: i32,
        log: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the grid merge & results engine.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Expected {what} not found under {path}")]
    MissingOutput { what: String, path: PathBuf },

    #[error("No grid fragments found under {0}")]
    NoFragments(PathBuf),

    #[error("Malformed metadata line '{0}': expected KEY=VALUE")]
    MalformedMetadata(String),

    #[error("Malformed numeric table row '{0}'")]
    MalformedTable(String),

    #[error("No PDF id (`set lhaid <id>`) found in launch template")]
    PdfIdNotFound,

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Regex error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Umbrella error for a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Directive error: {0}")]
    Directive(#[from] DirectiveError),

    #[error("Injection error: {0}")]
    Inject(#[from] InjectError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("'{0}' is not a valid dataset: '-' is only allowed once, to separate dataset name from timestamp")]
    InvalidDataset(String),

    #[error("Runcard directory for dataset '{dataset}' not found at {path}")]
    MissingRuncard { dataset: String, path: PathBuf },

    #[error("Regex error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
