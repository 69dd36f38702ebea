//! Pipeline orchestration: dataset classification, run stages and the
//! per-family runners.

pub mod generator;
pub mod orchestrator;
pub mod runner;
pub mod structure_function;

pub use generator::GeneratorRunner;
pub use orchestrator::{Orchestrator, RunSummary};
pub use runner::{create_runner, ExternalRunner};
pub use structure_function::StructureFunctionRunner;

use std::fmt;

use crate::error::PipelineError;

/// Dataset name prefixes routed to the structure-function calculator instead
/// of the event generator.
pub const STRUCTURE_FUNCTION_PREFIXES: [&str; 7] =
    ["HERA", "NMC", "SLAC", "BCDMS", "CHORUS", "NUTEV", "EMC"];

/// A requested run: dataset name, PDF set and an optional timestamp that
/// resumes a previous generation directory instead of generating anew.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub dataset: String,
    pub pdf: String,
    pub timestamp: Option<String>,
}

impl RunSpec {
    /// Parses a dataset argument. A leading path component is stripped, so
    /// shell completion against the runcard collection works
    /// (`runcards/LHCB_X` means `LHCB_X`). A single `-` separates the
    /// dataset name from a resume timestamp; more than one is rejected.
    pub fn parse(dataset: &str, pdf: impl Into<String>) -> Result<Self, PipelineError> {
        let name = std::path::Path::new(dataset)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(dataset);
        let parts: Vec<&str> = name.split('-').collect();
        match parts.as_slice() {
            [name] => Ok(Self {
                dataset: (*name).to_string(),
                pdf: pdf.into(),
                timestamp: None,
            }),
            [name, timestamp] => Ok(Self {
                dataset: (*name).to_string(),
                pdf: pdf.into(),
                timestamp: Some((*timestamp).to_string()),
            }),
            _ => Err(PipelineError::InvalidDataset(dataset.to_string())),
        }
    }

    /// True when this run resumes an existing generation directory.
    pub fn is_resume(&self) -> bool {
        self.timestamp.is_some()
    }
}

/// The two dataset families, each served by its own runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Hadronic observables produced by the event generator.
    Hadronic,
    /// Deep-inelastic structure functions produced by the calculator.
    StructureFunction,
}

impl DatasetKind {
    /// Classifies a dataset by name prefix.
    pub fn classify(dataset: &str) -> Self {
        if STRUCTURE_FUNCTION_PREFIXES
            .iter()
            .any(|prefix| dataset.starts_with(prefix))
        {
            DatasetKind::StructureFunction
        } else {
            DatasetKind::Hadronic
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Hadronic => write!(f, "hadronic"),
            DatasetKind::StructureFunction => write!(f, "structure function"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_dataset() {
        let spec = RunSpec::parse("LHCB_DY_8TEV", "NNPDF31_nlo_as_0118_luxqed").unwrap();
        assert_eq!(spec.dataset, "LHCB_DY_8TEV");
        assert!(spec.timestamp.is_none());
        assert!(!spec.is_resume());
    }

    #[test]
    fn test_parse_dataset_with_timestamp_resumes() {
        let spec = RunSpec::parse("LHCB_DY_8TEV-20260823120000", "CT18NLO").unwrap();
        assert_eq!(spec.dataset, "LHCB_DY_8TEV");
        assert_eq!(spec.timestamp.as_deref(), Some("20260823120000"));
        assert!(spec.is_resume());
    }

    #[test]
    fn test_parse_strips_leading_path_components() {
        let spec = RunSpec::parse("runcards/LHCB_DY_8TEV", "CT18NLO").unwrap();
        assert_eq!(spec.dataset, "LHCB_DY_8TEV");
        assert!(!spec.is_resume());

        let spec =
            RunSpec::parse("./runcards/LHCB_DY_8TEV-20260823120000", "CT18NLO").unwrap();
        assert_eq!(spec.dataset, "LHCB_DY_8TEV");
        assert_eq!(spec.timestamp.as_deref(), Some("20260823120000"));
    }

    #[test]
    fn test_parse_rejects_multiple_dashes() {
        let result = RunSpec::parse("LHCB-DY-8TEV", "CT18NLO");
        assert!(matches!(result, Err(PipelineError::InvalidDataset(_))));
    }

    #[test]
    fn test_classification_by_prefix() {
        assert_eq!(
            DatasetKind::classify("HERA_NC_318GEV"),
            DatasetKind::StructureFunction
        );
        assert_eq!(
            DatasetKind::classify("CHORUS_CC_NU"),
            DatasetKind::StructureFunction
        );
        assert_eq!(DatasetKind::classify("LHCB_DY_8TEV"), DatasetKind::Hadronic);
        assert_eq!(DatasetKind::classify("ATLAS_WP_JET"), DatasetKind::Hadronic);
    }
}
