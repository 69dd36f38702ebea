//! Runner for hadronic datasets, backed by the Monte Carlo event generator.
//!
//! A run drives the generator twice over a rendered runcard pair: the output
//! card builds the process working tree, the launch card produces the event
//! samples and grid fragments. Between the two invocations the working tree
//! is customized: generic runcard patches, the analysis routine, user cuts
//! injected into the cut file and the checked patch chains.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use crate::config::ForgeConfig;
use crate::cuts::{CutRegistry, DirectiveScanner};
use crate::error::PipelineError;
use crate::grid::{self, engine, Grid, GridEngine};
use crate::grid::{extract_scale_envelope, ConvolutionResult};
use crate::inject::apply_user_cuts;
use crate::patch::{self, PatchApplier, PatchPolicy, PatchSet};
use crate::process::{CommandRunner, ProcessRequest};
use crate::template::{render, VariableTable};

use super::runner::{check_tool, ExternalRunner};
use super::RunSpec;

/// Placeholder analysis name in the fixed-order analysis card.
const ANALYSIS_SLOT: &str = "analysis_HwU_template";

/// Post-run hook file name, looked up in the runcard directory.
const POSTRUN_HOOK: &str = "postrun.sh";

pub struct GeneratorRunner {
    config: ForgeConfig,
    spec: RunSpec,
    runcard_dir: PathBuf,
    dest: PathBuf,
    grid: Grid,
    variables: VariableTable,
    port: Arc<dyn CommandRunner>,
}

impl GeneratorRunner {
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

    /// The generator's process working tree, named after the dataset.
    fn mg5_dir(&self) -> PathBuf {
        self.dest.join(&self.spec.dataset)
    }

    /// Renders a runcard template into the destination and returns the text.
    fn render_card(&self, name: &str) -> Result<String, PipelineError> {
        let template = std::fs::read_to_string(self.runcard_dir.join(name))?;
        let rendered = render(&template, &self.spec.dataset, &self.variables);
        std::fs::write(self.dest.join(name), &rendered)?;
        Ok(rendered)
    }

    /// Runs the generator on a rendered card; the combined output lands in
    /// `log_name` before the exit status is inspected.
    async fn invoke_generator(&self, card: &str, log_name: &str) -> Result<(), PipelineError> {
        info!("Running generator on {card}");
        let request = ProcessRequest::new(&self.config.generator_exe, &self.dest).arg(card);
        let output = self.port.run(&request).await?;
        std::fs::write(self.dest.join(log_name), output.combined())?;
        output.checked(&request.program_name())?;
        Ok(())
    }

    /// Installs the analysis routine into the working tree and points the
    /// fixed-order analysis card at it.
    fn install_analysis(&self) -> Result<(), PipelineError> {
        let mg5_dir = self.mg5_dir();
        std::fs::copy(
            self.runcard_dir.join("analysis.f"),
            mg5_dir
                .join("FixedOrderAnalysis")
                .join(format!("{}.f", self.spec.dataset)),
        )?;

        let card_path = mg5_dir.join("Cards").join("FO_analyse_card.dat");
        let card = std::fs::read_to_string(&card_path)?;
        std::fs::write(&card_path, card.replace(ANALYSIS_SLOT, &self.spec.dataset))?;
        Ok(())
    }

    /// Customizes the working tree from the launch-card directives: user
    /// cuts into the cut file, then the tau-min and enabled patch chains.
    ///
    /// Every directive is compiled and every patch resolved before the first
    /// mutation, so a malformed launch card leaves the tree untouched.
    async fn customize(&self, launch_text: &str) -> Result<(), PipelineError> {
        let scanner = DirectiveScanner::new()?;
        let directives = scanner.parse(launch_text)?;

        let registry = CutRegistry::load(&self.config.cut_variables, &self.config.cut_code)?;
        let rendered = registry.compile(&directives.cuts)?;
        let declarations = registry.declarations_for(&directives.cuts);
        let tau_patch = directives
            .tau_min
            .map(|tau_min| patch::build_tau_min(&self.config.patches, tau_min))
            .transpose()?;
        let enabled = patch::resolve_named(&self.config.patches, &directives.enable_patches)?;

        // always runs: even with zero cuts the body pass inserts its blank
        // line, and a missing anchor must fail the run
        let mg5_dir = self.mg5_dir();
        info!("Injecting {} user cut(s)", rendered.len());
        apply_user_cuts(
            &mg5_dir.join("SubProcesses").join("cuts.f"),
            &declarations,
            &rendered,
        )?;

        let applier = PatchApplier::new(self.port.as_ref(), &self.config.patch_exe);
        if let Some(tau_patch) = tau_patch {
            // keep the substituted patch next to the run logs
            std::fs::write(self.dest.join("set_tau_min.patch"), &tau_patch)?;
            applier
                .apply(&mg5_dir, &tau_patch, PatchPolicy::Checked)
                .await?;
        }
        for (id, text) in &enabled {
            info!("Applying enabled patch {id}");
            applier.apply(&mg5_dir, text, PatchPolicy::Checked).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalRunner for GeneratorRunner {
    fn dest(&self) -> &Path {
        &self.dest
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    async fn install(&self) -> Result<(), PipelineError> {
        check_tool(self.port.as_ref(), &self.config.generator_exe).await?;
        check_tool(self.port.as_ref(), &self.config.grid_exe).await
    }

    async fn run(&self) -> Result<(), PipelineError> {
        self.render_card("output.txt")?;
        self.invoke_generator("output.txt", "output.log").await?;

        let generic = patch::discover_generic(&self.runcard_dir)?
            .into_iter()
            .map(std::fs::read_to_string)
            .collect::<Result<Vec<_>, _>>()?;
        if !generic.is_empty() {
            let applier = PatchApplier::new(self.port.as_ref(), &self.config.patch_exe);
            applier
                .apply_set(&PatchSet::new(generic, PatchPolicy::Unchecked, self.mg5_dir()))
                .await?;
        }

        self.install_analysis()?;

        let launch_text = self.render_card("launch.txt")?;
        self.customize(&launch_text).await?;

        self.invoke_generator("launch.txt", "launch.log").await
    }

    async fn generate_artifact(&self) -> Result<Vec<String>, PipelineError> {
        let mg5_dir = self.mg5_dir();
        let grid_engine = GridEngine::new(self.port.as_ref(), &self.config.grid_exe);

        grid_engine.merge(&self.dest, &self.grid, &mg5_dir).await?;

        let metadata = self.runcard_dir.join("metadata.txt");
        let metadata = metadata.is_file().then_some(metadata);
        let banner = engine::banner(&mg5_dir)?;
        grid_engine
            .attach_metadata(&self.dest, &self.grid, metadata.as_deref(), &banner)
            .await?;

        let launch_text = std::fs::read_to_string(self.dest.join("launch.txt"))?;
        let pdf = engine::pdf_id(&launch_text).map_err(PipelineError::Grid)?;
        let table = grid_engine
            .compute_predictions(&self.dest, &self.grid, &pdf)
            .await?;
        Ok(table)
    }

    async fn results(&self) -> Result<Vec<ConvolutionResult>, PipelineError> {
        let histogram = engine::histogram(&self.mg5_dir())?;
        let text = std::fs::read_to_string(histogram)?;
        Ok(extract_scale_envelope(&text)?)
    }

    async fn collect_provenance(&self) -> Result<Vec<(String, String)>, PipelineError> {
        let Some(repo) = &self.config.generator_repo else {
            warn!("No generator checkout configured; skipping revision provenance");
            return Ok(Vec::new());
        };

        let revno = self
            .port
            .run(&ProcessRequest::new(&self.config.vcs_exe, repo).arg("revno"))
            .await?
            .checked("revno")?;
        let mut entries = vec![(
            "mg5amc_revno".to_string(),
            revno.stdout.trim().to_string(),
        )];

        let vcs_info = self
            .port
            .run(&ProcessRequest::new(&self.config.vcs_exe, repo).arg("info"))
            .await?
            .checked("info")?;
        let pattern = Regex::new(r"\s*parent branch:\s*(.*)")?;
        if let Some(captures) = pattern.captures(&vcs_info.stdout) {
            entries.push((
                "mg5amc_repo".to_string(),
                captures[1].trim().to_string(),
            ));
        }

        Ok(entries)
    }

    async fn postprocess(&self) -> Result<(), PipelineError> {
        let hook = self.runcard_dir.join(POSTRUN_HOOK);
        if is_executable(&hook) {
            std::fs::copy(&hook, self.dest.join(POSTRUN_HOOK))?;
            let request = ProcessRequest::new(format!("./{POSTRUN_HOOK}"), &self.dest)
                .env("GRID", self.grid.path.display().to_string());
            let output = self.port.run(&request).await?;
            std::fs::write(self.dest.join("postrun.log"), output.combined())?;
            if !output.is_success() {
                warn!("Post-run hook exited with code {}", output.exit_code);
            }
        }

        let compressed = grid::compress(&self.grid)?;
        info!("Compressed grid at {}", compressed.display());
        Ok(())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
