//! Resolved locations for runcards, patches, cut templates and external tools.
//!
//! Every component receives this configuration object explicitly; there is no
//! ambient global path state. The object is constructed once (from the
//! environment or a builder) and passed down to the orchestrator, the runner
//! variants and the grid engine.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while building or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configured value is invalid.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration documents.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The variable table document could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for a pineforge run.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    // Source trees
    /// Directory holding one runcard directory per dataset.
    pub runcards: PathBuf,
    /// Directory holding named patches (`set_tau_min.patch`, `<id>.patch`).
    pub patches: PathBuf,
    /// Directory of cut variable-declaration snippets, file stem = cut-name prefix.
    pub cut_variables: PathBuf,
    /// Directory of cut body templates, file stem = exact cut name.
    pub cut_code: PathBuf,
    /// Destination root; each run writes to `<data>/<dataset>-<timestamp>`.
    pub data: PathBuf,
    /// JSON document providing the `@NAME@` substitution table.
    pub variables_file: PathBuf,

    // External tools
    /// Monte Carlo generator executable.
    pub generator_exe: PathBuf,
    /// Structure-function calculator executable.
    pub calculator_exe: PathBuf,
    /// Interpolation-grid tool executable.
    pub grid_exe: PathBuf,
    /// Unified-diff patch tool executable.
    pub patch_exe: PathBuf,
    /// Version-control tool used for generator provenance.
    pub vcs_exe: PathBuf,

    /// Checkout of the generator, queried for revision provenance.
    pub generator_repo: Option<PathBuf>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self::with_root(".")
    }
}

impl ForgeConfig {
    /// Creates a configuration rooted at `root`, with the conventional layout
    /// `runcards/`, `patches/`, `cuts/variables/`, `cuts/code/`, `data/` and
    /// `variables.json` underneath it.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            runcards: root.join("runcards"),
            patches: root.join("patches"),
            cut_variables: root.join("cuts").join("variables"),
            cut_code: root.join("cuts").join("code"),
            data: root.join("data"),
            variables_file: root.join("variables.json"),
            generator_exe: PathBuf::from("mg5_aMC"),
            calculator_exe: PathBuf::from("yadism"),
            grid_exe: PathBuf::from("pineappl"),
            patch_exe: PathBuf::from("patch"),
            vcs_exe: PathBuf::from("brz"),
            generator_repo: None,
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PINEFORGE_ROOT`: layout root (default: current directory)
    /// - `PINEFORGE_RUNCARDS`, `PINEFORGE_PATCHES`, `PINEFORGE_CUT_VARIABLES`,
    ///   `PINEFORGE_CUT_CODE`, `PINEFORGE_DATA`, `PINEFORGE_VARIABLES`:
    ///   individual layout overrides
    /// - `PINEFORGE_GENERATOR_EXE`, `PINEFORGE_CALCULATOR_EXE`,
    ///   `PINEFORGE_GRID_EXE`, `PINEFORGE_PATCH_EXE`, `PINEFORGE_VCS_EXE`:
    ///   tool executables
    /// - `PINEFORGE_GENERATOR_REPO`: generator checkout for provenance lookup
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation of the resolved layout fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        let root = std::env::var("PINEFORGE_ROOT").unwrap_or_else(|_| ".".to_string());
        let mut config = Self::with_root(root);

        let overrides: [(&str, &mut PathBuf); 11] = [
            ("PINEFORGE_RUNCARDS", &mut config.runcards),
            ("PINEFORGE_PATCHES", &mut config.patches),
            ("PINEFORGE_CUT_VARIABLES", &mut config.cut_variables),
            ("PINEFORGE_CUT_CODE", &mut config.cut_code),
            ("PINEFORGE_DATA", &mut config.data),
            ("PINEFORGE_VARIABLES", &mut config.variables_file),
            ("PINEFORGE_GENERATOR_EXE", &mut config.generator_exe),
            ("PINEFORGE_CALCULATOR_EXE", &mut config.calculator_exe),
            ("PINEFORGE_GRID_EXE", &mut config.grid_exe),
            ("PINEFORGE_PATCH_EXE", &mut config.patch_exe),
            ("PINEFORGE_VCS_EXE", &mut config.vcs_exe),
        ];
        for (key, slot) in overrides {
            if let Ok(val) = std::env::var(key) {
                *slot = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("PINEFORGE_GENERATOR_REPO") {
            config.generator_repo = Some(PathBuf::from(val));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved layout.
    ///
    /// Tool executables are resolved through `PATH` at invocation time, so
    /// only the on-disk layout is checked here.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if a required directory or
    /// document is missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (what, path) in [
            ("runcards directory", &self.runcards),
            ("patches directory", &self.patches),
            ("cut variables directory", &self.cut_variables),
            ("cut code directory", &self.cut_code),
        ] {
            if !path.is_dir() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} not found at {}",
                    what,
                    path.display()
                )));
            }
        }

        if !self.variables_file.is_file() {
            return Err(ConfigError::ValidationFailed(format!(
                "variable table not found at {}",
                self.variables_file.display()
            )));
        }

        Ok(())
    }

    /// Builder method to set the runcards directory.
    pub fn with_runcards(mut self, path: impl Into<PathBuf>) -> Self {
        self.runcards = path.into();
        self
    }

    /// Builder method to set the patches directory.
    pub fn with_patches(mut self, path: impl Into<PathBuf>) -> Self {
        self.patches = path.into();
        self
    }

    /// Builder method to set the destination root.
    pub fn with_data(mut self, path: impl Into<PathBuf>) -> Self {
        self.data = path.into();
        self
    }

    /// Builder method to set the variable table document.
    pub fn with_variables_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.variables_file = path.into();
        self
    }

    /// Builder method to set the generator executable.
    pub fn with_generator_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.generator_exe = exe.into();
        self
    }

    /// Builder method to set the structure-function calculator executable.
    pub fn with_calculator_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.calculator_exe = exe.into();
        self
    }

    /// Builder method to set the grid tool executable.
    pub fn with_grid_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.grid_exe = exe.into();
        self
    }

    /// Builder method to set the patch tool executable.
    pub fn with_patch_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.patch_exe = exe.into();
        self
    }

    /// Builder method to set the generator checkout used for provenance.
    pub fn with_generator_repo(mut self, path: impl Into<PathBuf>) -> Self {
        self.generator_repo = Some(path.into());
        self
    }

    /// Returns the runcard directory for a dataset.
    pub fn runcard_dir(&self, dataset: &str) -> PathBuf {
        self.runcards.join(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scaffold_layout(root: &Path) {
        for dir in ["runcards", "patches", "cuts/variables", "cuts/code", "data"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("variables.json"), "{}").unwrap();
    }

    #[test]
    fn test_default_layout() {
        let config = ForgeConfig::with_root("/base");
        assert_eq!(config.runcards, PathBuf::from("/base/runcards"));
        assert_eq!(config.cut_code, PathBuf::from("/base/cuts/code"));
        assert_eq!(config.variables_file, PathBuf::from("/base/variables.json"));
        assert_eq!(config.grid_exe, PathBuf::from("pineappl"));
        assert_eq!(config.patch_exe, PathBuf::from("patch"));
        assert!(config.generator_repo.is_none());
    }

    #[test]
    fn test_validate_complete_layout() {
        let dir = tempfile::tempdir().unwrap();
        scaffold_layout(dir.path());

        let config = ForgeConfig::with_root(dir.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_runcards() {
        let dir = tempfile::tempdir().unwrap();
        scaffold_layout(dir.path());
        fs::remove_dir(dir.path().join("runcards")).unwrap();

        let config = ForgeConfig::with_root(dir.path());
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("runcards"));
    }

    #[test]
    fn test_validate_missing_variable_table() {
        let dir = tempfile::tempdir().unwrap();
        scaffold_layout(dir.path());
        fs::remove_file(dir.path().join("variables.json")).unwrap();

        let config = ForgeConfig::with_root(dir.path());
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("variable table"));
    }

    #[test]
    fn test_builders() {
        let config = ForgeConfig::default()
            .with_runcards("/r")
            .with_patches("/p")
            .with_data("/d")
            .with_grid_exe("/usr/bin/pineappl")
            .with_generator_repo("/mg5");

        assert_eq!(config.runcards, PathBuf::from("/r"));
        assert_eq!(config.patches, PathBuf::from("/p"));
        assert_eq!(config.data, PathBuf::from("/d"));
        assert_eq!(config.grid_exe, PathBuf::from("/usr/bin/pineappl"));
        assert_eq!(config.generator_repo, Some(PathBuf::from("/mg5")));
    }

    #[test]
    fn test_runcard_dir() {
        let config = ForgeConfig::with_root("/base");
        assert_eq!(
            config.runcard_dir("LHCB_WP_8TEV"),
            PathBuf::from("/base/runcards/LHCB_WP_8TEV")
        );
    }
}
