//! embedscope-core: Prompt embedding visualisation
//!
//! This crate provides the pieces of the embedscope pipeline:
//! - Fetching `(title, embedding)` rows from PostgreSQL
//! - Parsing the textual vector form into a matrix
//! - Two-component principal component analysis
//! - Rendering the labelled scatter plot to PNG

pub mod error;
pub mod font;
pub mod pca;
pub mod pipeline;
pub mod render;
pub mod source;
pub mod vector;

pub use error::{Error, Result};
pub use pca::{N_COMPONENTS, Pca, PcaError};
pub use pipeline::{DEFAULT_OUTPUT, MIN_SAMPLES, Outcome, PipelineOptions, run, visualize};
pub use render::{
    DEFAULT_LABEL_CHARS, DEFAULT_TITLE, FigureStyle, RenderError, axis_label, render_scatter,
    truncate_title,
};
pub use source::{
    EmbeddingRow, EmbeddingSource, FETCH_QUERY, InMemorySource, PgEmbeddingSource, SourceError,
};
pub use vector::{ParseVectorError, format_vector, parse_vector, stack_vectors};
