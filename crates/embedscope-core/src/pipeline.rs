//! The fetch, parse, reduce and render pipeline.
//!
//! Every stage takes its inputs as arguments and hands its result to the
//! next; nothing outlives a single [`run`].

use std::path::PathBuf;

use ndarray::Array2;
use tracing::info;

use crate::error::{Error, Result};
use crate::pca::Pca;
use crate::render::{FigureStyle, render_scatter, truncate_title};
use crate::source::{EmbeddingRow, EmbeddingSource};
use crate::vector::{parse_vector, stack_vectors};

/// Default output image, relative to the working directory.
pub const DEFAULT_OUTPUT: &str = "embeddings_visualization.png";

/// Fewest rows a projection can be fitted on.
pub const MIN_SAMPLES: usize = 2;

/// Where and how to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub output: PathBuf,
    pub style: FigureStyle,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            style: FigureStyle::default(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The figure was written.
    Saved {
        path: PathBuf,
        samples: usize,
        dimensions: usize,
        explained_variance_ratio: [f64; 2],
    },
    /// Too few rows to reduce; nothing was written.
    InsufficientData { found: usize },
}

/// Fetch every row from `source` and visualise it.
pub async fn run<S>(source: &mut S, options: &PipelineOptions) -> Result<Outcome>
where
    S: EmbeddingSource + ?Sized,
{
    let rows = source.fetch().await?;
    visualize(&rows, options)
}

/// Parse, reduce and render rows that are already in memory.
pub fn visualize(rows: &[EmbeddingRow], options: &PipelineOptions) -> Result<Outcome> {
    if rows.len() < MIN_SAMPLES {
        info!(found = rows.len(), "Not enough embeddings to reduce");
        return Ok(Outcome::InsufficientData { found: rows.len() });
    }

    let matrix = parse_rows(rows)?;
    let (samples, dimensions) = matrix.dim();
    info!(samples, dimensions, "Reducing embeddings");

    let (pca, projected) = Pca::fit_transform(&matrix)?;
    let ratio = pca.explained_variance_ratio();

    let points: Vec<[f64; 2]> = projected.rows().into_iter().map(|r| [r[0], r[1]]).collect();
    let labels: Vec<String> = rows
        .iter()
        .map(|row| truncate_title(&row.title, options.style.label_chars))
        .collect();

    render_scatter(&points, &labels, ratio, &options.style, &options.output)?;
    info!(
        path = %options.output.display(),
        pc1 = ratio[0],
        pc2 = ratio[1],
        "Saved figure"
    );

    Ok(Outcome::Saved {
        path: options.output.clone(),
        samples,
        dimensions,
        explained_variance_ratio: ratio,
    })
}

/// Parse every row's vector text and stack the results.
pub fn parse_rows(rows: &[EmbeddingRow]) -> Result<Array2<f64>> {
    let vectors = rows
        .iter()
        .map(|row| {
            parse_vector(&row.embedding).map_err(|source| Error::Parse {
                title: row.title.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    stack_vectors(&vectors).map_err(Error::Dimension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use crate::vector::ParseVectorError;

    fn options_in(dir: &std::path::Path) -> PipelineOptions {
        PipelineOptions {
            output: dir.join(DEFAULT_OUTPUT),
            style: FigureStyle {
                width_in: 4.0,
                height_in: 3.0,
                dpi: 40,
                ..Default::default()
            },
        }
    }

    fn rows() -> Vec<EmbeddingRow> {
        vec![
            EmbeddingRow::new("Summarise a meeting transcript", "[0.1,0.9,0.3,0.0]"),
            EmbeddingRow::new("Write a haiku", "[0.8,0.1,0.2,0.5]"),
            EmbeddingRow::new("Refactor this function", "[0.4,0.4,0.9,0.1]"),
        ]
    }

    #[tokio::test]
    async fn test_run_saves_figure() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(dir.path());
        let mut source = InMemorySource::new(rows());

        let outcome = run(&mut source, &options).await.unwrap();

        match outcome {
            Outcome::Saved {
                path,
                samples,
                dimensions,
                explained_variance_ratio,
            } => {
                assert_eq!(path, options.output);
                assert_eq!(samples, 3);
                assert_eq!(dimensions, 4);
                assert!(explained_variance_ratio[0] + explained_variance_ratio[1] <= 1.0 + 1e-12);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(options.output.exists());
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_run_single_row_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(dir.path());
        let mut source = InMemorySource::new(vec![EmbeddingRow::new("only", "[1,2,3]")]);

        let outcome = run(&mut source, &options).await.unwrap();

        assert_eq!(outcome, Outcome::InsufficientData { found: 1 });
        assert!(!options.output.exists());
    }

    #[test]
    fn test_insufficient_data_skips_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(dir.path());
        // Unparseable, but never looked at.
        let rows = vec![EmbeddingRow::new("bad", "[oops]")];

        let outcome = visualize(&rows, &options).unwrap();
        assert_eq!(outcome, Outcome::InsufficientData { found: 1 });
    }

    #[test]
    fn test_parse_error_names_row() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(dir.path());
        let mut rows = rows();
        rows[1].embedding = "[0.1,zero,0.3,0.4]".to_string();

        let err = visualize(&rows, &options).unwrap_err();
        match err {
            Error::Parse { title, source } => {
                assert_eq!(title, "Write a haiku");
                assert!(matches!(source, ParseVectorError::InvalidToken { index: 1, .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!options.output.exists());
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(dir.path());
        let mut rows = rows();
        rows[2].embedding = "[0.4,0.4,0.9]".to_string();

        let err = visualize(&rows, &options).unwrap_err();
        assert!(matches!(
            err,
            Error::Dimension(ParseVectorError::DimensionMismatch {
                row: 2,
                expected: 4,
                found: 3
            })
        ));
        assert!(!options.output.exists());
    }
}
