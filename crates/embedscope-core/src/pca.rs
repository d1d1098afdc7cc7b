//! Principal component analysis onto two axes.
//!
//! The fit eigen-decomposes whichever of the Gram matrix (`N x N`) or the
//! scatter matrix (`D x D`) is smaller. Embeddings are usually wide (D in the
//! hundreds or thousands) with few rows, so the Gram route is the common one.
//! Only the top two eigenpairs are needed; they come from a seeded subspace
//! iteration with a Rayleigh-Ritz step per round.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of retained components.
pub const N_COMPONENTS: usize = 2;

const MAX_ITERATIONS: usize = 1000;
const RESIDUAL_TOLERANCE: f64 = 1e-10;
/// Eigenvalues below this fraction of the total scatter count as zero.
const RANK_TOLERANCE: f64 = 1e-10;
const SEED: u64 = 0x5eed_0f_9ca;

/// Error type for PCA fitting and projection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PcaError {
    #[error("PCA needs at least 2 samples, got {0}")]
    TooFewSamples(usize),
    #[error("PCA needs at least 2 features, got {0}")]
    TooFewFeatures(usize),
    #[error("expected {expected} features, got {found}")]
    FeatureMismatch { expected: usize, found: usize },
}

/// A fitted two-component projection.
#[derive(Debug, Clone)]
pub struct Pca {
    mean: Array1<f64>,
    /// Component rows, `2 x D`, orthonormal.
    components: Array2<f64>,
    explained_variance: [f64; N_COMPONENTS],
    explained_variance_ratio: [f64; N_COMPONENTS],
    n_samples: usize,
}

impl Pca {
    /// Fit the projection on an `N x D` matrix.
    pub fn fit(data: &Array2<f64>) -> Result<Self, PcaError> {
        let (n, d) = data.dim();
        if n < 2 {
            return Err(PcaError::TooFewSamples(n));
        }
        if d < 2 {
            return Err(PcaError::TooFewFeatures(d));
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or(PcaError::TooFewSamples(n))?;
        let centered = data - &mean;
        let total_scatter: f64 = centered.iter().map(|v| v * v).sum();
        let dof = (n - 1) as f64;

        if total_scatter <= degenerate_floor(data) {
            tracing::debug!(n, d, "all samples coincide, variance is zero");
            return Ok(Self {
                mean,
                components: identity_components(d),
                explained_variance: [0.0; N_COMPONENTS],
                explained_variance_ratio: [0.0; N_COMPONENTS],
                n_samples: n,
            });
        }

        let (eigenvalues, mut components) = if n <= d {
            let gram = centered.dot(&centered.t());
            let (values, vectors) = top_eigenpairs(&gram);
            let mut components = Array2::zeros((N_COMPONENTS, d));
            for k in 0..N_COMPONENTS {
                if values[k] > total_scatter * RANK_TOLERANCE {
                    let v = centered.t().dot(&vectors.column(k)) / values[k].sqrt();
                    components.row_mut(k).assign(&v);
                } else {
                    let filler = orthogonal_complement(components.row(0));
                    components.row_mut(k).assign(&filler);
                }
            }
            (values, components)
        } else {
            let scatter = centered.t().dot(&centered);
            let (values, vectors) = top_eigenpairs(&scatter);
            (values, vectors.t().to_owned())
        };

        for mut row in components.rows_mut() {
            let pivot = row
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            if pivot < 0.0 {
                row.mapv_inplace(|v| -v);
            }
        }

        let mut explained_variance = [0.0; N_COMPONENTS];
        let mut explained_variance_ratio = [0.0; N_COMPONENTS];
        for k in 0..N_COMPONENTS {
            let value = if eigenvalues[k] > total_scatter * RANK_TOLERANCE {
                eigenvalues[k]
            } else {
                0.0
            };
            explained_variance[k] = value / dof;
            explained_variance_ratio[k] = (value / total_scatter).clamp(0.0, 1.0);
        }

        tracing::debug!(
            n,
            d,
            ratio_pc1 = explained_variance_ratio[0],
            ratio_pc2 = explained_variance_ratio[1],
            "fitted PCA"
        );

        Ok(Self {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
            n_samples: n,
        })
    }

    /// Fit on `data` and project it in one step.
    pub fn fit_transform(data: &Array2<f64>) -> Result<(Self, Array2<f64>), PcaError> {
        let pca = Self::fit(data)?;
        let projected = pca.transform(data.view())?;
        Ok((pca, projected))
    }

    /// Project rows onto the fitted components, giving an `N x 2` matrix.
    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, PcaError> {
        if data.ncols() != self.mean.len() {
            return Err(PcaError::FeatureMismatch {
                expected: self.mean.len(),
                found: data.ncols(),
            });
        }
        let centered = &data - &self.mean;
        Ok(centered.dot(&self.components.t()))
    }

    /// Per-feature mean removed before projecting.
    pub fn mean(&self) -> ArrayView1<'_, f64> {
        self.mean.view()
    }

    /// Component rows (`2 x D`).
    pub fn components(&self) -> ArrayView2<'_, f64> {
        self.components.view()
    }

    /// Variance along each component (sample variance, `N - 1` denominator).
    pub fn explained_variance(&self) -> [f64; N_COMPONENTS] {
        self.explained_variance
    }

    /// Fraction of the total variance captured by each component.
    pub fn explained_variance_ratio(&self) -> [f64; N_COMPONENTS] {
        self.explained_variance_ratio
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

/// Scatter at or below this is rounding noise from averaging identical rows.
fn degenerate_floor(data: &Array2<f64>) -> f64 {
    let magnitude = data.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    (magnitude * 1e-12).powi(2) * data.len() as f64
}

fn identity_components(d: usize) -> Array2<f64> {
    let mut components = Array2::zeros((N_COMPONENTS, d));
    for k in 0..N_COMPONENTS {
        components[[k, k]] = 1.0;
    }
    components
}

/// Top two eigenpairs of a symmetric positive semi-definite matrix.
///
/// Returns eigenvalues in descending order and the matching eigenvectors as
/// the columns of an `m x 2` matrix.
fn top_eigenpairs(a: &Array2<f64>) -> ([f64; N_COMPONENTS], Array2<f64>) {
    let m = a.nrows();
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut q = Array2::from_shape_fn((m, N_COMPONENTS), |_| rng.random_range(-1.0_f64..1.0));
    orthonormalize(&mut q);
    let (mut values, rotated) = rayleigh_ritz(a, &q);
    q = rotated;

    for iteration in 0..MAX_ITERATIONS {
        let mut z = a.dot(&q);

        let scale = values[0].abs().max(f64::MIN_POSITIVE);
        let converged = (0..N_COMPONENTS).all(|k| {
            let residual = &z.column(k) - &(&q.column(k) * values[k]);
            residual.dot(&residual).sqrt() <= RESIDUAL_TOLERANCE * scale
        });
        if converged {
            tracing::trace!(iteration, "subspace iteration converged");
            return (values, q);
        }

        orthonormalize(&mut z);
        let (next_values, rotated) = rayleigh_ritz(a, &z);
        values = next_values;
        q = rotated;
    }

    tracing::debug!(
        max_iterations = MAX_ITERATIONS,
        "subspace iteration hit the iteration cap"
    );
    (values, q)
}

/// Diagonalise `a` restricted to span(q) and rotate `q` onto the Ritz vectors.
fn rayleigh_ritz(a: &Array2<f64>, q: &Array2<f64>) -> ([f64; N_COMPONENTS], Array2<f64>) {
    let t = q.t().dot(&a.dot(q));
    let (p, r, c) = (t[[0, 0]], 0.5 * (t[[0, 1]] + t[[1, 0]]), t[[1, 1]]);

    let mid = 0.5 * (p + c);
    let radius = (0.25 * (p - c).powi(2) + r * r).sqrt();
    let theta = 0.5 * (2.0 * r).atan2(p - c);
    let (sin, cos) = theta.sin_cos();

    let rotation = ndarray::arr2(&[[cos, -sin], [sin, cos]]);
    ([mid + radius, mid - radius], q.dot(&rotation))
}

/// Gram-Schmidt on the two columns of `q`, replacing a collapsed second
/// column with an arbitrary orthogonal unit vector.
fn orthonormalize(q: &mut Array2<f64>) {
    let n0 = q.column(0).dot(&q.column(0)).sqrt();
    if n0 <= f64::MIN_POSITIVE {
        q.column_mut(0).fill(0.0);
        q[[0, 0]] = 1.0;
    } else {
        q.column_mut(0).mapv_inplace(|v| v / n0);
    }

    let first = q.column(0).to_owned();
    let overlap = first.dot(&q.column(1));
    q.column_mut(1).scaled_add(-overlap, &first);

    let n1 = q.column(1).dot(&q.column(1)).sqrt();
    if n1 <= 1e-12 * n0.max(1.0) {
        let filler = orthogonal_complement(first.view());
        q.column_mut(1).assign(&filler);
    } else {
        q.column_mut(1).mapv_inplace(|v| v / n1);
    }
}

/// A unit vector orthogonal to the unit vector `v`.
fn orthogonal_complement(v: ArrayView1<'_, f64>) -> Array1<f64> {
    let (pivot, _) = v
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best, min), (i, x)| {
            if x.abs() < min { (i, x.abs()) } else { (best, min) }
        });

    let mut out = Array1::zeros(v.len());
    out[pivot] = 1.0;
    out.scaled_add(-v[pivot], &v);
    let norm = out.dot(&out).sqrt();
    out / norm
}
