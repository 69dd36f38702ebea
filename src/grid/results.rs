//! Prediction tables and the nine-point scale-variation envelope.

use crate::error::GridError;

/// The 3x3 sweep of (xiR, xiF) renormalization/factorization scale ratios.
pub const NINE_POINTS: [(f64, f64); 9] = [
    (0.5, 0.5),
    (0.5, 1.0),
    (0.5, 2.0),
    (1.0, 0.5),
    (1.0, 1.0),
    (1.0, 2.0),
    (2.0, 0.5),
    (2.0, 1.0),
    (2.0, 2.0),
];

/// One result row: central value, statistical error and the scale-variation
/// envelope bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvolutionResult {
    pub result: f64,
    pub error: f64,
    pub sv_min: f64,
    pub sv_max: f64,
}

/// One row of a structure-function sweep table: central value, error and the
/// nine sweep results, one per [`NINE_POINTS`] entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub result: f64,
    pub error: f64,
    pub sweep: [f64; 9],
}

/// Extracts the per-bin result table from the generator's native histogram.
///
/// Data rows begin with a sign character after exactly two leading spaces.
/// Columns are renumbered starting at 1; the named fields are result=col3,
/// error=col4, sv_min=col6 and sv_max=col7.
pub fn extract_scale_envelope(histogram: &str) -> Result<Vec<ConvolutionResult>, GridError> {
    histogram
        .lines()
        .filter(|line| line.starts_with("  +") || line.starts_with("  -"))
        .map(parse_histogram_row)
        .collect()
}

fn parse_histogram_row(line: &str) -> Result<ConvolutionResult, GridError> {
    let columns: Vec<f64> = line
        .split_whitespace()
        .map(|field| field.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| GridError::MalformedTable(line.to_string()))?;

    // columns are 1-based in the histogram convention
    let column = |index: usize| {
        columns
            .get(index - 1)
            .copied()
            .ok_or_else(|| GridError::MalformedTable(line.to_string()))
    };

    Ok(ConvolutionResult {
        result: column(3)?,
        error: column(4)?,
        sv_min: column(6)?,
        sv_max: column(7)?,
    })
}

/// Parses a structure-function sweep table: one row per bin, columns are
/// `result error s1 .. s9` with the nine sweep results ordered as
/// [`NINE_POINTS`]. Lines starting with `#` are comments.
pub fn parse_sweep_table(text: &str) -> Result<Vec<SweepRow>, GridError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_sweep_row)
        .collect()
}

fn parse_sweep_row(line: &str) -> Result<SweepRow, GridError> {
    let columns: Vec<f64> = line
        .split_whitespace()
        .map(|field| field.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| GridError::MalformedTable(line.to_string()))?;

    if columns.len() < 2 + NINE_POINTS.len() {
        return Err(GridError::MalformedTable(line.to_string()));
    }

    let mut sweep = [0.0; 9];
    sweep.copy_from_slice(&columns[2..11]);
    Ok(SweepRow {
        result: columns[0],
        error: columns[1],
        sweep,
    })
}

/// Computes the scale-variation envelope: per bin, sv_min/sv_max are the
/// componentwise min/max over exactly the nine sweep results. The error
/// column never participates.
pub fn envelope(rows: &[SweepRow]) -> Vec<ConvolutionResult> {
    rows.iter()
        .map(|row| ConvolutionResult {
            result: row.result,
            error: row.error,
            sv_min: row.sweep.iter().copied().fold(f64::INFINITY, f64::min),
            sv_max: row.sweep.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
        .collect()
}
