//! Ordered source patches over the generator output tree.
//!
//! Patches are unified diffs handed to the external patch tool on stdin,
//! with strip level 1 and the generator output tree as working directory.
//! Two application policies exist:
//!
//! - `Unchecked`: the exit status is ignored. Used for `*.patch` files
//!   discovered in the runcard directory; they are enumerated in filesystem
//!   order, which is not guaranteed sorted.
//! - `Checked`: a non-zero exit aborts the pipeline, carrying the tool's
//!   captured output. Used for the tau-min patch and for explicitly enabled
//!   named patches, applied in their declared order.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::PatchError;
use crate::process::{CapturedOutput, CommandRunner, ProcessRequest};

/// Placeholder substituted with the formatted tau-min value.
const TAU_MIN_SLOT: &str = "@TAU_MIN@";

/// Application policy for a patch chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchPolicy {
    /// Exit status failure is fatal.
    Checked,
    /// Exit status is ignored.
    Unchecked,
}

/// An ordered list of patch documents bound to a working directory and a
/// single application policy.
#[derive(Debug, Clone)]
pub struct PatchSet {
    pub texts: Vec<String>,
    pub policy: PatchPolicy,
    pub workdir: PathBuf,
}

impl PatchSet {
    /// Creates a patch set over `workdir`.
    pub fn new(texts: Vec<String>, policy: PatchPolicy, workdir: impl Into<PathBuf>) -> Self {
        Self {
            texts,
            policy,
            workdir: workdir.into(),
        }
    }
}

/// Applies patch chains through the process port.
pub struct PatchApplier<'a> {
    port: &'a dyn CommandRunner,
    patch_exe: PathBuf,
}

impl<'a> PatchApplier<'a> {
    /// Creates an applier using the given patch tool.
    pub fn new(port: &'a dyn CommandRunner, patch_exe: impl Into<PathBuf>) -> Self {
        Self {
            port,
            patch_exe: patch_exe.into(),
        }
    }

    /// Applies a single patch document to `workdir` under `policy`.
    pub async fn apply(
        &self,
        workdir: &Path,
        patch_text: &str,
        policy: PatchPolicy,
    ) -> Result<CapturedOutput, PatchError> {
        let request = ProcessRequest::new(&self.patch_exe, workdir)
            .arg("-p1")
            .stdin_text(patch_text);
        let output = self.port.run(&request).await?;

        match policy {
            PatchPolicy::Checked if !output.is_success() => Err(PatchError::Failed {
                code: output.exit_code,
                output: output.combined(),
            }),
            PatchPolicy::Unchecked if !output.is_success() => {
                warn!(
                    "Unchecked patch exited with code {}; continuing",
                    output.exit_code
                );
                Ok(output)
            }
            _ => Ok(output),
        }
    }

    /// Applies every document of a patch set, in order.
    pub async fn apply_set(&self, set: &PatchSet) -> Result<(), PatchError> {
        for text in &set.texts {
            self.apply(&set.workdir, text, set.policy).await?;
        }
        Ok(())
    }
}

/// `*.patch` files in `runcard_dir`, in filesystem enumeration order.
pub fn discover_generic(runcard_dir: &Path) -> Result<Vec<PathBuf>, PatchError> {
    let mut patches = Vec::new();
    for entry in std::fs::read_dir(runcard_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "patch") {
            patches.push(path);
        }
    }
    if !patches.is_empty() {
        info!("Discovered {} generic patch(es)", patches.len());
    }
    Ok(patches)
}

/// Resolves enabled patch identifiers to `(identifier, content)` pairs.
///
/// All identifiers are resolved before anything is returned: a missing
/// `<identifier>.patch` file fails the whole chain before any patch is
/// applied.
pub fn resolve_named(
    patches_dir: &Path,
    identifiers: &[String],
) -> Result<Vec<(String, String)>, PatchError> {
    let paths: Vec<(String, PathBuf)> = identifiers
        .iter()
        .map(|id| (id.clone(), patches_dir.join(format!("{id}.patch"))))
        .collect();

    if let Some((id, _)) = paths.iter().find(|(_, path)| !path.is_file()) {
        return Err(PatchError::MissingPatch(id.clone()));
    }

    paths
        .into_iter()
        .map(|(id, path)| Ok((id, std::fs::read_to_string(path)?)))
        .collect()
}

/// Builds the tau-min patch by substituting the formatted value into the
/// fixed `set_tau_min.patch` template.
pub fn build_tau_min(patches_dir: &Path, tau_min: f64) -> Result<String, PatchError> {
    let template = std::fs::read_to_string(patches_dir.join("set_tau_min.patch"))?;
    Ok(template.replace(TAU_MIN_SLOT, &format!("{tau_min}d0")))
}
