//! End-to-end run orchestration.
//!
//! Stage order is fixed: install check, generation (skipped on resume),
//! artifact generation, results extraction, version annotation and
//! postprocessing. Each stage is timed and logged under the dataset name.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::ForgeConfig;
use crate::error::PipelineError;
use crate::grid::GridEngine;
use crate::process::{CommandRunner, ProcessRequest};
use crate::template::VariableTable;

use super::runner::create_runner;
use super::RunSpec;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub dataset: String,
    pub dest: PathBuf,
    /// The compressed grid artifact.
    pub artifact: PathBuf,
    /// Number of observable bins in the result table.
    pub bins: usize,
}

/// Drives a full prediction run for one dataset.
pub struct Orchestrator {
    config: ForgeConfig,
    port: Arc<dyn CommandRunner>,
}

impl Orchestrator {
    pub fn new(config: ForgeConfig, port: Arc<dyn CommandRunner>) -> Self {
        Self { config, port }
    }

    pub async fn run(&self, spec: &RunSpec) -> Result<RunSummary, PipelineError> {
        let variables = VariableTable::from_file(&self.config.variables_file)?;
        let runner = create_runner(&self.config, spec, variables, Arc::clone(&self.port))?;

        let started = Instant::now();
        runner.install().await?;
        info!("[{}] install check passed in {:.2?}", spec.dataset, started.elapsed());

        if spec.is_resume() {
            info!(
                "[{}] resuming existing generation at {}",
                spec.dataset,
                runner.dest().display()
            );
        } else {
            let started = Instant::now();
            runner.run().await?;
            info!("[{}] generation finished in {:.2?}", spec.dataset, started.elapsed());
        }

        let started = Instant::now();
        let table = runner.generate_artifact().await?;
        let mut results_log = table.join("\n");
        results_log.push('\n');
        std::fs::write(runner.dest().join("results.log"), results_log)?;
        info!("[{}] artifact generated in {:.2?}", spec.dataset, started.elapsed());

        let results = runner.results().await?;
        info!("[{}] extracted {} result bin(s)", spec.dataset, results.len());

        let mut entries = vec![(
            "runcard_gitversion".to_string(),
            self.runcards_version().await,
        )];
        entries.extend(runner.collect_provenance().await?);

        let engine = GridEngine::new(self.port.as_ref(), &self.config.grid_exe);
        engine
            .annotate_versions(runner.dest(), runner.grid(), &entries)
            .await?;

        runner.postprocess().await?;

        Ok(RunSummary {
            dataset: spec.dataset.clone(),
            dest: runner.dest().to_path_buf(),
            artifact: runner.grid().compressed_path(),
            bins: results.len(),
        })
    }

    /// Revision of the runcard collection, degrading to `"unknown"` when the
    /// collection is not under version control.
    async fn runcards_version(&self) -> String {
        let request = ProcessRequest::new("git", &self.config.runcards).args([
            "describe", "--tags", "--long", "--always", "--dirty",
        ]);
        match self.port.run(&request).await {
            Ok(output) if output.is_success() => output.stdout.trim().to_string(),
            _ => {
                warn!("Could not determine the runcards revision");
                "unknown".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::process::{CapturedOutput, ScriptedRunner};
    use std::fs;
    use std::path::Path;

    const DATASET: &str = "HERA_NC_318GEV";

    fn scaffold(root: &Path) -> (ForgeConfig, PathBuf) {
        for dir in ["runcards", "patches", "cuts/variables", "cuts/code", "data"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("variables.json"), "{}").unwrap();
        fs::create_dir_all(root.join("runcards").join(DATASET)).unwrap();

        // a previous generation to resume from
        let dest = root.join("data").join(format!("{DATASET}-20260801093000"));
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join(format!("{DATASET}.pineappl")), "grid payload").unwrap();
        fs::write(
            dest.join(format!("{DATASET}.sweep")),
            "1.0 0.1 0.9 1.0 1.1 0.8 1.0 1.2 1.0 1.0 1.0\n\
             2.0 0.2 1.9 2.0 2.1 1.8 2.0 2.2 2.0 2.0 2.0\n",
        )
        .unwrap();

        (ForgeConfig::with_root(root), dest)
    }

    fn scripted(dest: &Path) -> Arc<ScriptedRunner> {
        let port = Arc::new(ScriptedRunner::new());
        port.script(
            "pineappl convolute",
            CapturedOutput::ok("h1\nh2\nbin0\nbin1\nf1\nf2\n"),
        );
        port.script("git describe", CapturedOutput::ok("v1.2-4-gdeadbee\n"));
        port.touch_on("pineappl set", Grid::new(DATASET, dest).tmp_path());
        port
    }

    #[tokio::test]
    async fn test_resume_run_skips_generation() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dest) = scaffold(dir.path());
        let port = scripted(&dest);

        let orchestrator = Orchestrator::new(config, Arc::clone(&port) as Arc<dyn CommandRunner>);
        let spec = RunSpec::parse(&format!("{DATASET}-20260801093000"), "CT18NLO").unwrap();
        let summary = orchestrator.run(&spec).await.unwrap();

        assert_eq!(summary.dataset, DATASET);
        assert_eq!(summary.dest, dest);
        assert_eq!(summary.bins, 2);
        assert!(summary.artifact.ends_with(format!("{DATASET}.pineappl.lz4")));
        assert!(summary.artifact.exists());

        // no calculator invocation on resume
        assert!(port.calls_to("yadism").iter().all(|c| c.args == ["--version"]));

        // the convolute table landed in the results log
        let results_log = fs::read_to_string(dest.join("results.log")).unwrap();
        assert_eq!(results_log, "bin0\nbin1\n");
    }

    #[tokio::test]
    async fn test_annotation_carries_runcard_revision() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dest) = scaffold(dir.path());
        let port = scripted(&dest);

        let orchestrator = Orchestrator::new(config, Arc::clone(&port) as Arc<dyn CommandRunner>);
        let spec = RunSpec::parse(&format!("{DATASET}-20260801093000"), "CT18NLO").unwrap();
        orchestrator.run(&spec).await.unwrap();

        let set_calls: Vec<_> = port
            .calls_to("pineappl")
            .into_iter()
            .filter(|c| c.args[0] == "set")
            .collect();
        assert_eq!(set_calls.len(), 1);
        let joined = set_calls[0].args.join(" ");
        assert!(joined.contains("--entry runcard_gitversion v1.2-4-gdeadbee"));
        assert!(joined.contains("--entry lumi_id_types pdg_mc_ids"));
        assert!(joined.contains("--entry_from_file results"));
    }

    #[tokio::test]
    async fn test_runcards_version_degrades_to_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let (config, dest) = scaffold(dir.path());
        let port = scripted(&dest);
        port.script(
            "git describe",
            CapturedOutput::failed(128, "not a git repository"),
        );

        let orchestrator = Orchestrator::new(config, Arc::clone(&port) as Arc<dyn CommandRunner>);
        let spec = RunSpec::parse(&format!("{DATASET}-20260801093000"), "CT18NLO").unwrap();
        orchestrator.run(&spec).await.unwrap();

        let set_call = port
            .calls_to("pineappl")
            .into_iter()
            .find(|c| c.args[0] == "set")
            .unwrap();
        assert!(set_call
            .args
            .join(" ")
            .contains("--entry runcard_gitversion unknown"));
    }
}
