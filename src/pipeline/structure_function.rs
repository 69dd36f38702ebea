//! Runner for deep-inelastic structure-function datasets.
//!
//! These datasets skip event generation entirely: the calculator reads the
//! runcard directory and writes the interpolation grid plus a sweep table
//! straight into the destination. The surrounding flow (convolution,
//! annotation, compression) is shared with the hadronic family.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ForgeConfig;
use crate::error::{GridError, PipelineError};
use crate::grid::{self, Grid, GridEngine};
use crate::grid::results::{envelope, parse_sweep_table};
use crate::grid::ConvolutionResult;
use crate::process::{CommandRunner, ProcessRequest};
use crate::template::VariableTable;

use super::runner::{check_tool, ExternalRunner};
use super::RunSpec;

pub struct StructureFunctionRunner {
    config: ForgeConfig,
    spec: RunSpec,
    runcard_dir: PathBuf,
    dest: PathBuf,
    grid: Grid,
    #[allow(dead_code)]
    variables: VariableTable,
    port: Arc<dyn CommandRunner>,
}

impl StructureFunctionRunner {
    pub fn new(
        config: ForgeConfig,
        spec: RunSpec,
        runcard_dir: PathBuf,
        dest: PathBuf,
        variables: VariableTable,
        port: Arc<dyn CommandRunner>,
    ) -> Self {
        let grid = Grid::new(&spec.dataset, &dest);
        Self {
            config,
            spec,
            runcard_dir,
            dest,
            grid,
            variables,
            port,
        }
    }

    /// The sweep table written by the calculator next to the grid.
    fn sweep_path(&self) -> PathBuf {
        self.dest.join(format!("{}.sweep", self.spec.dataset))
    }
}

#[async_trait]
impl ExternalRunner for StructureFunctionRunner {
    fn dest(&self) -> &Path {
        &self.dest
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    async fn install(&self) -> Result<(), PipelineError> {
        check_tool(self.port.as_ref(), &self.config.calculator_exe).await?;
        check_tool(self.port.as_ref(), &self.config.grid_exe).await
    }

    async fn run(&self) -> Result<(), PipelineError> {
        info!("Running calculator for {}", self.spec.dataset);
        let request = ProcessRequest::new(&self.config.calculator_exe, &self.dest)
            .arg(self.runcard_dir.display().to_string())
            .arg(self.dest.display().to_string());
        let output = self.port.run(&request).await?;
        std::fs::write(self.dest.join("calculate.log"), output.combined())?;
        output.checked(&request.program_name())?;

        if !self.grid.path.is_file() {
            return Err(PipelineError::Grid(GridError::MissingOutput {
                what: "calculator grid".to_string(),
                path: self.grid.path.clone(),
            }));
        }
        Ok(())
    }

    async fn generate_artifact(&self) -> Result<Vec<String>, PipelineError> {
        let grid_engine = GridEngine::new(self.port.as_ref(), &self.config.grid_exe);
        let table = grid_engine
            .compute_predictions(&self.dest, &self.grid, &self.spec.pdf)
            .await?;
        Ok(table)
    }

    async fn results(&self) -> Result<Vec<ConvolutionResult>, PipelineError> {
        let text = std::fs::read_to_string(self.sweep_path())?;
        let rows = parse_sweep_table(&text)?;
        Ok(envelope(&rows))
    }

    async fn collect_provenance(&self) -> Result<Vec<(String, String)>, PipelineError> {
        // the calculator embeds its own version into the grid
        debug!("No external revision provenance for structure functions");
        Ok(Vec::new())
    }

    async fn postprocess(&self) -> Result<(), PipelineError> {
        let compressed = grid::compress(&self.grid)?;
        info!("Compressed grid at {}", compressed.display());
        Ok(())
    }
}
