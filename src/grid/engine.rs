//! Grid merge, metadata and convolution through the external grid tool.
//!
//! Every invocation's output is persisted to a stable path inside the
//! destination directory before the exit status is inspected, so a failed
//! run always leaves its logs behind for postmortem.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::info;
use walkdir::WalkDir;

use crate::error::GridError;
use crate::process::{CommandRunner, ProcessRequest};

use super::Grid;

/// Fixed luminosity-id convention attached to every annotated grid.
const LUMI_ID_TYPES: &str = "pdg_mc_ids";

/// Drives the external grid tool (merge, optimize, set, convolute, orders,
/// pdf_uncertainty) over a destination directory.
pub struct GridEngine<'a> {
    port: &'a dyn CommandRunner,
    grid_exe: PathBuf,
}

impl<'a> GridEngine<'a> {
    /// Creates an engine using the given grid tool executable.
    pub fn new(port: &'a dyn CommandRunner, grid_exe: impl Into<PathBuf>) -> Self {
        Self {
            port,
            grid_exe: grid_exe.into(),
        }
    }

    async fn invoke(
        &self,
        dest: &Path,
        log_name: &str,
        args: Vec<String>,
    ) -> Result<String, GridError> {
        let request = ProcessRequest::new(&self.grid_exe, dest).args(args);
        let output = self.port.run(&request).await?;
        std::fs::write(dest.join(log_name), output.combined())?;
        let output = output.checked(&request.program_name())?;
        Ok(output.stdout)
    }

    /// Merges the generator's grid fragments into `grid`, then optimizes it
    /// through a temporary path swapped in atomically.
    pub async fn merge(&self, dest: &Path, grid: &Grid, mg5_dir: &Path) -> Result<(), GridError> {
        let fragments = fragments(mg5_dir)?;
        info!("Merging {} grid fragment(s)", fragments.len());

        let mut args = vec!["merge".to_string(), grid.path.display().to_string()];
        args.extend(fragments.iter().map(|p| p.display().to_string()));
        self.invoke(dest, "merge.log", args).await?;

        let args = vec![
            "optimize".to_string(),
            grid.path.display().to_string(),
            grid.tmp_path().display().to_string(),
        ];
        self.invoke(dest, "optimize.log", args).await?;
        grid.promote_tmp()
    }

    /// Attaches `KEY=VALUE` entries from the optional metadata document plus
    /// the whole generator run banner, through a single `set` invocation.
    pub async fn attach_metadata(
        &self,
        dest: &Path,
        grid: &Grid,
        metadata_file: Option<&Path>,
        banner: &Path,
    ) -> Result<(), GridError> {
        let mut args = vec![
            "set".to_string(),
            grid.path.display().to_string(),
            grid.tmp_path().display().to_string(),
        ];

        if let Some(metadata_file) = metadata_file {
            for (key, value) in parse_metadata(&std::fs::read_to_string(metadata_file)?)? {
                args.extend(["--entry".to_string(), key, value]);
            }
        }
        args.extend([
            "--entry_from_file".to_string(),
            "runcard".to_string(),
            banner.display().to_string(),
        ]);

        self.invoke(dest, "metadata.log", args).await?;
        grid.promote_tmp()
    }

    /// Convolves the grid against `pdf` and persists the three prediction
    /// tables. Returns the canonical convolute table with its fixed 2-line
    /// header and 2-line footer stripped.
    pub async fn compute_predictions(
        &self,
        dest: &Path,
        grid: &Grid,
        pdf: &str,
    ) -> Result<Vec<String>, GridError> {
        let grid_path = grid.path.display().to_string();

        let convolute = self
            .invoke_to_file(
                dest,
                "pineappl.convolute",
                vec![
                    "convolute".to_string(),
                    grid_path.clone(),
                    pdf.to_string(),
                    "--scales".to_string(),
                    "9".to_string(),
                    "--absolute".to_string(),
                    "--integrated".to_string(),
                ],
            )
            .await?;

        self.invoke_to_file(
            dest,
            "pineappl.orders",
            vec![
                "orders".to_string(),
                grid_path.clone(),
                pdf.to_string(),
                "--absolute".to_string(),
            ],
        )
        .await?;

        self.invoke_to_file(
            dest,
            "pineappl.pdf_uncertainty",
            vec![
                "pdf_uncertainty".to_string(),
                "--threads=1".to_string(),
                grid_path,
                pdf.to_string(),
            ],
        )
        .await?;

        strip_convolute_table(&convolute)
    }

    /// Attaches revision provenance entries plus the fixed luminosity-id
    /// convention and the run's results log, in one `set` invocation.
    pub async fn annotate_versions(
        &self,
        dest: &Path,
        grid: &Grid,
        entries: &[(String, String)],
    ) -> Result<(), GridError> {
        let mut args = vec![
            "set".to_string(),
            grid.path.display().to_string(),
            grid.tmp_path().display().to_string(),
            "--entry_from_file".to_string(),
            "results".to_string(),
            dest.join("results.log").display().to_string(),
        ];
        for (key, value) in entries {
            args.extend(["--entry".to_string(), key.clone(), value.clone()]);
        }
        args.extend([
            "--entry".to_string(),
            "lumi_id_types".to_string(),
            LUMI_ID_TYPES.to_string(),
        ]);

        self.invoke(dest, "annotate.log", args).await?;
        grid.promote_tmp()
    }

    /// Like `invoke`, but the stdout IS the artifact: it is written to
    /// `file_name` before the exit status is inspected.
    async fn invoke_to_file(
        &self,
        dest: &Path,
        file_name: &str,
        args: Vec<String>,
    ) -> Result<String, GridError> {
        let request = ProcessRequest::new(&self.grid_exe, dest).args(args);
        let output = self.port.run(&request).await?;
        std::fs::write(dest.join(file_name), &output.stdout)?;
        let output = output.checked(&request.program_name())?;
        Ok(output.stdout)
    }
}

/// PDF-set identifier used to generate the predictions, extracted from the
/// rendered launch template.
pub fn pdf_id(launch_text: &str) -> Result<String, GridError> {
    let pattern = Regex::new(r"set lhaid (\d+)")?;
    pattern
        .captures(launch_text)
        .map(|captures| captures[1].to_string())
        .ok_or(GridError::PdfIdNotFound)
}

/// Grid fragments produced by the generator launch run, lexically sorted.
pub fn fragments(mg5_dir: &Path) -> Result<Vec<PathBuf>, GridError> {
    let mut fragments: Vec<PathBuf> = event_files(mg5_dir, |name| {
        name.starts_with("amcblast_obs_") && name.ends_with(".pineappl")
    });
    if fragments.is_empty() {
        return Err(GridError::NoFragments(mg5_dir.join("Events")));
    }
    fragments.sort();
    Ok(fragments)
}

/// The generator run banner, used as whole-document runcard provenance.
pub fn banner(mg5_dir: &Path) -> Result<PathBuf, GridError> {
    event_files(mg5_dir, |name| {
        name.starts_with("run_01") && name.ends_with("_tag_1_banner.txt")
    })
    .into_iter()
    .next()
    .ok_or_else(|| GridError::MissingOutput {
        what: "run banner".to_string(),
        path: mg5_dir.join("Events"),
    })
}

/// The generator's native histogram document.
pub fn histogram(mg5_dir: &Path) -> Result<PathBuf, GridError> {
    event_files(mg5_dir, |name| name == "MADatNLO.HwU")
        .into_iter()
        .next()
        .ok_or_else(|| GridError::MissingOutput {
            what: "native histogram MADatNLO.HwU".to_string(),
            path: mg5_dir.join("Events"),
        })
}

/// Files under `Events/run_01*/` whose names satisfy `predicate`.
fn event_files(mg5_dir: &Path, predicate: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    WalkDir::new(mg5_dir.join("Events"))
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            let in_run_dir = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("run_01"));
            in_run_dir && entry.file_type().is_file()
        })
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| predicate(name))
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Parses a `KEY=VALUE` metadata document, one entry per line.
fn parse_metadata(text: &str) -> Result<Vec<(String, String)>, GridError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| GridError::MalformedMetadata(line.to_string()))
        })
        .collect()
}

/// Strips the fixed 2-line header and 2-line footer from the convolute
/// output, yielding the canonical result table.
fn strip_convolute_table(text: &str) -> Result<Vec<String>, GridError> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 4 {
        return Err(GridError::MalformedTable(
            "convolute output shorter than its fixed header and footer".to_string(),
        ));
    }
    Ok(lines[2..lines.len() - 2]
        .iter()
        .map(|l| l.to_string())
        .collect())
}
