//! Cut code-template repository.
//!
//! Two on-disk collections drive cut injection:
//!
//! - body templates, one file per cut name, each carrying a single `{}`
//!   format slot for the cut value;
//! - variable-declaration snippets, one file per cut-name prefix, inserted
//!   once at the function entry when any requested cut matches the prefix.
//!
//! The set of body-template files IS the fixed registry of valid cut names:
//! an unknown name fails compilation before anything is written to disk.

use std::collections::HashMap;
use std::path::Path;

use crate::error::DirectiveError;

use super::CutSpec;

/// A cut compiled to its injectable Fortran block.
#[derive(Debug, Clone)]
pub struct RenderedCut {
    pub name: String,
    pub body: String,
}

/// In-memory view of the cut template repository.
#[derive(Debug, Clone, Default)]
pub struct CutRegistry {
    /// `(prefix, snippet)` pairs, sorted by prefix for a stable pass order.
    declarations: Vec<(String, String)>,
    /// Body templates keyed by exact cut name.
    code: HashMap<String, String>,
}

impl CutRegistry {
    /// Loads the registry from the declaration-snippet and body-template
    /// directories.
    pub fn load(variables_dir: &Path, code_dir: &Path) -> Result<Self, DirectiveError> {
        let mut declarations = Vec::new();
        for entry in std::fs::read_dir(variables_dir)? {
            let path = entry?.path();
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                declarations.push((stem.to_string(), std::fs::read_to_string(&path)?));
            }
        }
        declarations.sort_by(|a, b| a.0.cmp(&b.0));

        let mut code = HashMap::new();
        for entry in std::fs::read_dir(code_dir)? {
            let path = entry?.path();
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                code.insert(stem.to_string(), std::fs::read_to_string(&path)?);
            }
        }

        Ok(Self { declarations, code })
    }

    /// True if `name` belongs to the fixed cut registry.
    pub fn contains(&self, name: &str) -> bool {
        self.code.contains_key(name)
    }

    /// Compiles cut specs to injectable blocks, in declaration order.
    ///
    /// Fail-closed: every name and value is validated before the first block
    /// is rendered, so a bad directive can never leave a partially-mutated
    /// working tree behind.
    pub fn compile(&self, cuts: &[CutSpec]) -> Result<Vec<RenderedCut>, DirectiveError> {
        for cut in cuts {
            if !self.contains(&cut.name) {
                return Err(DirectiveError::UnknownCut(cut.name.clone()));
            }
            render_value(&cut.name, &cut.value)?;
        }

        cuts.iter()
            .map(|cut| {
                let value = render_value(&cut.name, &cut.value)?;
                let template = &self.code[&cut.name];
                Ok(RenderedCut {
                    name: cut.name.clone(),
                    body: template.replace("{}", &value),
                })
            })
            .collect()
    }

    /// Declaration snippets needed by `cuts`: one snippet per distinct
    /// prefix matched by at least one cut name, in prefix order.
    pub fn declarations_for(&self, cuts: &[CutSpec]) -> Vec<String> {
        self.declarations
            .iter()
            .filter(|(prefix, _)| cuts.iter().any(|cut| cut.name.starts_with(prefix.as_str())))
            .map(|(_, snippet)| snippet.clone())
            .collect()
    }
}

/// Maps a raw directive value to Fortran syntax: boolean literals become
/// logical literals, numeric literals get the double-precision suffix.
fn render_value(name: &str, raw: &str) -> Result<String, DirectiveError> {
    match raw {
        "True" => Ok(".true.".to_string()),
        "False" => Ok(".false.".to_string()),
        _ => {
            if raw.parse::<f64>().is_ok() {
                Ok(format!("{raw}d0"))
            } else {
                Err(DirectiveError::MalformedCutValue {
                    name: name.to_string(),
                    value: raw.to_string(),
                })
            }
        }
    }
}
