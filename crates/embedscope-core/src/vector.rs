//! Textual vector parsing.
//!
//! Postgres renders a `vector` column cast to text as a bracketed,
//! comma-separated list: `[0.1,-0.25,3e-05]`. This module turns that form
//! into numbers and stacks the per-row vectors into a matrix.

use ndarray::Array2;

/// Error type for vector parsing and stacking.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseVectorError {
    #[error("vector has no components")]
    Empty,
    #[error("invalid number {token:?} at position {index}")]
    InvalidToken { index: usize, token: String },
    #[error("non-finite value at position {index}")]
    NonFinite { index: usize },
    #[error("row {row} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Parse the textual form of a stored vector.
pub fn parse_vector(text: &str) -> Result<Vec<f64>, ParseVectorError> {
    let inner = text
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();

    if inner.is_empty() {
        return Err(ParseVectorError::Empty);
    }

    inner
        .split(',')
        .enumerate()
        .map(|(index, raw)| {
            let token = raw.trim();
            let value: f64 = token.parse().map_err(|_| ParseVectorError::InvalidToken {
                index,
                token: token.to_string(),
            })?;
            if !value.is_finite() {
                return Err(ParseVectorError::NonFinite { index });
            }
            Ok(value)
        })
        .collect()
}

/// Render a vector in the same bracketed form `parse_vector` accepts.
pub fn format_vector(values: &[f64]) -> String {
    let body = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", body)
}

/// Stack parsed vectors into an `N x D` matrix.
///
/// The first row fixes `D`; any other length is rejected.
pub fn stack_vectors(rows: &[Vec<f64>]) -> Result<Array2<f64>, ParseVectorError> {
    let Some(first) = rows.first() else {
        return Ok(Array2::zeros((0, 0)));
    };
    let dims = first.len();

    for (row, values) in rows.iter().enumerate() {
        if values.len() != dims {
            return Err(ParseVectorError::DimensionMismatch {
                row,
                expected: dims,
                found: values.len(),
            });
        }
    }

    Ok(Array2::from_shape_fn((rows.len(), dims), |(i, j)| rows[i][j]))
}
