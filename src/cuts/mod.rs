//! User-defined cut directives.
//!
//! The rendered launch template may carry three directive kinds, one per
//! full line:
//!
//! - `#user_defined_cut set <name> = <value>`: a kinematic selection cut
//! - `#user_defined_tau_min <value>`: minimum tau for the generator grid
//! - `#enable_patch <identifier>`: a named patch to apply (checked)
//!
//! Scanning is one grammar rule per directive kind feeding a shared
//! line-classification pass; the resulting token stream is then validated
//! structurally. Cut names and values are validated against the
//! [`registry::CutRegistry`] before any file in the working tree is touched.

pub mod registry;

pub use registry::{CutRegistry, RenderedCut};

use regex::Regex;

use crate::error::DirectiveError;

/// A single user-defined cut directive.
///
/// `index` is the declaration index: the order in which cut directives
/// appear in the rendered launch template. Injection preserves this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutSpec {
    pub name: String,
    pub value: String,
    pub index: usize,
}

/// One classified directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    Cut { name: String, value: String },
    TauMin(String),
    EnablePatch(String),
}

/// Structured result of scanning a rendered launch template.
#[derive(Debug, Clone, Default)]
pub struct ParsedDirectives {
    /// Cuts in declaration order.
    pub cuts: Vec<CutSpec>,
    /// Minimum tau, if declared. A later declaration overrides an earlier one.
    pub tau_min: Option<f64>,
    /// Identifiers of patches to enable, in declaration order.
    pub enable_patches: Vec<String>,
}

/// Line classifier for the three directive grammars.
pub struct DirectiveScanner {
    cut: Regex,
    tau_min: Regex,
    enable_patch: Regex,
}

impl DirectiveScanner {
    /// Compiles the directive grammars.
    pub fn new() -> Result<Self, DirectiveError> {
        Ok(Self {
            cut: Regex::new(
                r"^#user_defined_cut set (\w+)\s+=\s+([+-]?\d+(?:\.\d+)?|True|False)$",
            )?,
            // each directive kind owns its grammar rule
            tau_min: Regex::new(r"^#user_defined_tau_min (.*)$")?,
            enable_patch: Regex::new(r"^#enable_patch (.*)$")?,
        })
    }

    /// Classifies a single line, yielding a directive token if it matches
    /// any grammar rule.
    fn classify(&self, line: &str) -> Option<Directive> {
        if let Some(captures) = self.cut.captures(line) {
            return Some(Directive::Cut {
                name: captures[1].to_string(),
                value: captures[2].to_string(),
            });
        }
        if let Some(captures) = self.tau_min.captures(line) {
            return Some(Directive::TauMin(captures[1].to_string()));
        }
        if let Some(captures) = self.enable_patch.captures(line) {
            return Some(Directive::EnablePatch(captures[1].to_string()));
        }
        None
    }

    /// Scans a rendered launch template and validates the directive stream.
    ///
    /// # Errors
    ///
    /// Returns `DirectiveError::MalformedTauMin` if a tau-min value does not
    /// parse as a floating-point number.
    pub fn parse(&self, text: &str) -> Result<ParsedDirectives, DirectiveError> {
        let tokens: Vec<Directive> = text.lines().filter_map(|l| self.classify(l)).collect();

        let mut parsed = ParsedDirectives::default();
        for token in tokens {
            match token {
                Directive::Cut { name, value } => {
                    let index = parsed.cuts.len();
                    parsed.cuts.push(CutSpec { name, value, index });
                }
                Directive::TauMin(raw) => {
                    let value: f64 = raw
                        .trim()
                        .parse()
                        .map_err(|_| DirectiveError::MalformedTauMin(raw.clone()))?;
                    parsed.tau_min = Some(value);
                }
                Directive::EnablePatch(identifier) => {
                    parsed.enable_patches.push(identifier);
                }
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> DirectiveScanner {
        DirectiveScanner::new().unwrap()
    }

    #[test]
    fn test_parse_cut_directives_in_declaration_order() {
        let text = "launch\n\
                    #user_defined_cut set ptl1min = 25.0\n\
                    set ebeam1 4000\n\
                    #user_defined_cut set mmllmax = 120\n\
                    #user_defined_cut set yll = True\n";
        let parsed = scanner().parse(text).unwrap();

        assert_eq!(parsed.cuts.len(), 3);
        assert_eq!(parsed.cuts[0].name, "ptl1min");
        assert_eq!(parsed.cuts[0].value, "25.0");
        assert_eq!(parsed.cuts[0].index, 0);
        assert_eq!(parsed.cuts[1].name, "mmllmax");
        assert_eq!(parsed.cuts[1].index, 1);
        assert_eq!(parsed.cuts[2].value, "True");
        assert_eq!(parsed.cuts[2].index, 2);
    }

    #[test]
    fn test_cut_grammar_is_full_line() {
        // trailing text breaks the full-line match
        let parsed = scanner()
            .parse("#user_defined_cut set ptl1min = 25.0 # comment\n")
            .unwrap();
        assert!(parsed.cuts.is_empty());
    }

    #[test]
    fn test_cut_grammar_rejects_arbitrary_values() {
        let parsed = scanner()
            .parse("#user_defined_cut set ptl1min = banana\n")
            .unwrap();
        assert!(parsed.cuts.is_empty());
    }

    #[test]
    fn test_signed_numeric_values_accepted() {
        let parsed = scanner()
            .parse("#user_defined_cut set yll = -2.5\n#user_defined_cut set ptzmin = +10\n")
            .unwrap();
        assert_eq!(parsed.cuts[0].value, "-2.5");
        assert_eq!(parsed.cuts[1].value, "+10");
    }

    #[test]
    fn test_parse_tau_min() {
        let parsed = scanner().parse("#user_defined_tau_min 0.01\n").unwrap();
        assert_eq!(parsed.tau_min, Some(0.01));
    }

    #[test]
    fn test_last_tau_min_wins() {
        let parsed = scanner()
            .parse("#user_defined_tau_min 0.01\n#user_defined_tau_min 0.02\n")
            .unwrap();
        assert_eq!(parsed.tau_min, Some(0.02));
    }

    #[test]
    fn test_malformed_tau_min_is_fatal() {
        let result = scanner().parse("#user_defined_tau_min abc\n");
        assert!(matches!(result, Err(DirectiveError::MalformedTauMin(_))));
    }

    #[test]
    fn test_enable_patch_uses_its_own_grammar() {
        let parsed = scanner()
            .parse("#enable_patch fix_scale\n#enable_patch photon_iso\n")
            .unwrap();
        assert_eq!(parsed.enable_patches, vec!["fix_scale", "photon_iso"]);
    }

    #[test]
    fn test_no_directives() {
        let parsed = scanner().parse("output LHCB_Z\nlaunch\n").unwrap();
        assert!(parsed.cuts.is_empty());
        assert!(parsed.tau_min.is_none());
        assert!(parsed.enable_patches.is_empty());
    }
}
