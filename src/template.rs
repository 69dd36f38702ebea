//! Placeholder substitution for textual runcard templates.
//!
//! Templates use `@NAME@` tokens. `@OUTPUT@` always resolves to the dataset
//! name; every other token is looked up in the [`VariableTable`] loaded from
//! the fixed configuration document. Unresolved placeholders are left
//! verbatim: a template may legitimately carry tokens consumed by a later
//! tool, so substitution is lenient by design of the runcard format.

use std::path::Path;

use crate::config::ConfigError;

/// Ordered `name -> value` substitution table.
///
/// Order matters: entries are applied in document order, so an earlier value
/// may itself introduce text rewritten by a later entry.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    entries: Vec<(String, String)>,
}

impl VariableTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the table from a JSON object document, preserving key order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the document is not a JSON object of strings.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses the table from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;

        let mut entries = Vec::with_capacity(object.len());
        for (name, value) in object {
            let value = value
                .as_str()
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: name.clone(),
                    message: "variable values must be strings".to_string(),
                })?
                .to_string();
            entries.push((name, value));
        }

        Ok(Self { entries })
    }

    /// Adds an entry, keeping insertion order.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Iterates over `(name, value)` pairs in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Renders a template: every `@OUTPUT@` becomes the dataset name, then each
/// table entry `name` replaces every `@name@` occurrence, in table order.
/// Unresolved placeholders are left verbatim.
pub fn render(template: &str, output: &str, variables: &VariableTable) -> String {
    let mut text = template.replace("@OUTPUT@", output);
    for (name, value) in variables.iter() {
        text = text.replace(&format!("@{name}@"), value);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_output_placeholder() {
        let variables = VariableTable::new();
        let rendered = render("output @OUTPUT@\nlaunch @OUTPUT@\n", "LHCB_Z", &variables);
        assert_eq!(rendered, "output LHCB_Z\nlaunch LHCB_Z\n");
    }

    #[test]
    fn test_render_table_entries_in_order() {
        let mut variables = VariableTable::new();
        variables.insert("EBEAM1", "4000");
        variables.insert("EBEAM2", "4000");
        let rendered = render(
            "set ebeam1 = @EBEAM1@\nset ebeam2 = @EBEAM2@\n",
            "x",
            &variables,
        );
        assert_eq!(rendered, "set ebeam1 = 4000\nset ebeam2 = 4000\n");
    }

    #[test]
    fn test_render_leaves_unresolved_placeholders() {
        let variables = VariableTable::new();
        let rendered = render("set pdlabel @PDLABEL@\n", "x", &variables);
        assert_eq!(rendered, "set pdlabel @PDLABEL@\n");
    }

    #[test]
    fn test_from_json_preserves_order() {
        let table = VariableTable::from_json(r#"{"B": "2", "A": "1", "C": "3"}"#).unwrap();
        let names: Vec<&str> = table.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_from_json_rejects_non_string_values() {
        let result = VariableTable::from_json(r#"{"A": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(VariableTable::from_json("[1, 2]").is_err());
    }
}
