//! The runner seam: one implementation per dataset family.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::config::ForgeConfig;
use crate::error::PipelineError;
use crate::grid::{ConvolutionResult, Grid};
use crate::process::CommandRunner;
use crate::template::VariableTable;

use super::{DatasetKind, GeneratorRunner, RunSpec, StructureFunctionRunner};

/// A dataset-family runner.
///
/// The orchestrator drives every run through this trait; the two
/// implementations differ in how predictions are produced, not in the
/// surrounding merge/annotate/compress flow.
#[async_trait]
pub trait ExternalRunner: Send + Sync {
    /// Destination directory of this run.
    fn dest(&self) -> &Path;

    /// The grid artifact this run produces.
    fn grid(&self) -> &Grid;

    /// Verifies the external tool is invocable before any work starts.
    async fn install(&self) -> Result<(), PipelineError>;

    /// Produces the raw grid fragments (or the grid itself) in `dest`.
    async fn run(&self) -> Result<(), PipelineError>;

    /// Merges, annotates and convolves the grid; returns the canonical
    /// result table, one line per bin.
    async fn generate_artifact(&self) -> Result<Vec<String>, PipelineError>;

    /// Per-bin central values with statistical error and scale envelope.
    async fn results(&self) -> Result<Vec<ConvolutionResult>, PipelineError>;

    /// Revision provenance entries to annotate onto the grid.
    async fn collect_provenance(&self) -> Result<Vec<(String, String)>, PipelineError>;

    /// Runs the optional post-run hook and compresses the grid.
    async fn postprocess(&self) -> Result<(), PipelineError>;
}

/// Builds the runner for `spec`, creating the destination directory.
///
/// The destination is `<data>/<dataset>-<timestamp>`; a resume timestamp
/// reuses an existing directory, otherwise the current UTC time is stamped.
pub fn create_runner(
    config: &ForgeConfig,
    spec: &RunSpec,
    variables: VariableTable,
    port: Arc<dyn CommandRunner>,
) -> Result<Box<dyn ExternalRunner>, PipelineError> {
    let runcard_dir = config.runcard_dir(&spec.dataset);
    if !runcard_dir.is_dir() {
        return Err(PipelineError::MissingRuncard {
            dataset: spec.dataset.clone(),
            path: runcard_dir,
        });
    }

    let timestamp = spec
        .timestamp
        .clone()
        .unwrap_or_else(|| Utc::now().format("%Y%m%d%H%M%S").to_string());
    let dest = config.data.join(format!("{}-{}", spec.dataset, timestamp));
    std::fs::create_dir_all(&dest)?;

    let kind = DatasetKind::classify(&spec.dataset);
    info!(
        "Dataset {} classified as {}, destination {}",
        spec.dataset,
        kind,
        dest.display()
    );

    Ok(match kind {
        DatasetKind::Hadronic => Box::new(GeneratorRunner::new(
            config.clone(),
            spec.clone(),
            runcard_dir,
            dest,
            variables,
            port,
        )),
        DatasetKind::StructureFunction => Box::new(StructureFunctionRunner::new(
            config.clone(),
            spec.clone(),
            runcard_dir,
            dest,
            variables,
            port,
        )),
    })
}

/// Probes an executable through the port; only spawn failure is fatal.
///
/// Tools disagree on version flags, so a non-zero exit is tolerated as long
/// as the binary could be started at all.
pub(super) async fn check_tool(
    port: &dyn CommandRunner,
    exe: &Path,
) -> Result<(), PipelineError> {
    let request = crate::process::ProcessRequest::new(exe, ".").arg("--version");
    let output = port.run(&request).await?;
    let banner = output.stdout.lines().next().unwrap_or("").to_string();
    info!("Tool {} available: {}", exe.display(), banner);
    Ok(())
}
