//! pineforge: interpolation-grid prediction pipelines for pQCD observables.
//!
//! A run takes a dataset's runcard directory, renders its templates, drives
//! the external Monte Carlo generator (or structure-function calculator),
//! merges the resulting grid fragments, annotates the grid with metadata and
//! revision provenance, and compresses the final artifact.
//!
//! External binaries are reached exclusively through the
//! [`process::CommandRunner`] port, so the whole pipeline is testable against
//! a scripted fake.

pub mod cli;
pub mod config;
pub mod cuts;
pub mod error;
pub mod grid;
pub mod inject;
pub mod patch;
pub mod pipeline;
pub mod process;
pub mod template;

pub use config::ForgeConfig;
pub use error::{
    DirectiveError, GridError, InjectError, PatchError, PipelineError, ProcessError,
};
