//! Truncated SVD of the document-term matrix.
//!
//! The factorization follows the randomized range-finder scheme: a Gaussian
//! sketch is refined by a few power iterations, the matrix is compressed onto
//! that basis, and the small problem is solved exactly through the
//! eigen-decomposition of `B·Bᵀ`. The sketch lives on the shorter side of the
//! document-term matrix.

use crate::config::ProjectionConfig;
use crate::error::{Result, ScoutError};
use crate::linalg::{dot64, normalize, orthonormalize, symmetric_eigen, SparseVector};
use half::f16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    n_features: usize,
    dim: usize,
    /// Feature-major loadings: `loadings[f * dim + r]` is feature `f`'s weight on component `r`.
    loadings: Vec<f32>,
    singular_values: Vec<f32>,
    explained_variance: Vec<f32>,
    explained_variance_ratio: Vec<f32>,
    seed: u64,
}

/// On-disk form; loadings are kept in half precision.
#[derive(Serialize, Deserialize)]
pub struct ProjectionFile {
    pub n_features: usize,
    pub dim: usize,
    pub loadings_f16: Vec<u16>,
    pub singular_values: Vec<f32>,
    pub explained_variance: Vec<f32>,
    pub explained_variance_ratio: Vec<f32>,
    pub seed: u64,
}

impl Projection {
    /// Fit at most `latent_dim` components.
    ///
    /// The range finder runs on whichever side of the matrix is smaller, so
    /// working memory follows `min(n_docs, n_features)` rather than the
    /// vocabulary size. Only the loadings themselves span every feature.
    pub fn fit(rows: &[SparseVector], n_features: usize, config: &ProjectionConfig) -> Self {
        let n_docs = rows.len();
        let k = config.latent_dim.min(n_features).min(n_docs);
        if k == 0 {
            return Self { n_features, seed: config.seed, ..Default::default() };
        }
        let l = (k + config.oversamples).min(n_features).min(n_docs);

        let mut loadings = vec![0.0f32; n_features * k];
        let singular_values = if n_docs < n_features {
            sketch_documents(rows, n_features, k, l, config, &mut loadings)
        } else {
            sketch_features(rows, n_features, k, l, config, &mut loadings)
        };

        let mut projection = Self {
            n_features,
            dim: k,
            loadings,
            singular_values,
            explained_variance: Vec::new(),
            explained_variance_ratio: Vec::new(),
            seed: config.seed,
        };
        projection.fill_explained_variance(rows);
        tracing::info!(latent_dim = k, n_features, num_docs = n_docs, "fitted latent projection");
        projection
    }

    fn fill_explained_variance(&mut self, rows: &[SparseVector]) {
        let n = rows.len().max(1) as f64;
        let mut sum = vec![0.0f64; self.dim];
        let mut sum_sq = vec![0.0f64; self.dim];
        for row in rows {
            let t = self.raw_transform(row);
            for r in 0..self.dim {
                sum[r] += t[r] as f64;
                sum_sq[r] += (t[r] as f64) * (t[r] as f64);
            }
        }
        self.explained_variance = (0..self.dim).map(|r| (sum_sq[r] / n - (sum[r] / n).powi(2)) as f32).collect();

        let mut feat_sum = vec![0.0f64; self.n_features];
        let mut feat_sq = vec![0.0f64; self.n_features];
        for row in rows {
            for (f, v) in row.iter() {
                feat_sum[f as usize] += v as f64;
                feat_sq[f as usize] += (v as f64) * (v as f64);
            }
        }
        let total: f64 = feat_sum.iter().zip(&feat_sq).map(|(s, q)| q / n - (s / n).powi(2)).sum();
        self.explained_variance_ratio = self
            .explained_variance
            .iter()
            .map(|v| if total > 0.0 { (*v as f64 / total) as f32 } else { 0.0 })
            .collect();
    }

    fn raw_transform(&self, v: &SparseVector) -> Vec<f32> {
        let mut out = vec![0.0f32; self.dim];
        for (f, w) in v.iter() {
            let start = f as usize * self.dim;
            if let Some(row) = self.loadings.get(start..start + self.dim) {
                for (o, l) in out.iter_mut().zip(row) {
                    *o += w * l;
                }
            }
        }
        out
    }

    /// Project a lexical vector and L2-normalize it. A zero projection is
    /// returned as-is.
    pub fn transform(&self, v: &SparseVector) -> Result<Vec<f32>> {
        if let Some(max) = v.max_index() {
            if max as usize >= self.n_features {
                return Err(ScoutError::UnexpectedScoringFailure(format!(
                    "lexical vector column {max} outside projection input of {} features",
                    self.n_features
                )));
            }
        }
        let mut out = self.raw_transform(v);
        normalize(&mut out);
        Ok(out)
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn n_features(&self) -> usize { self.n_features }

    pub fn singular_values(&self) -> &[f32] { &self.singular_values }

    pub fn explained_variance_ratio(&self) -> &[f32] { &self.explained_variance_ratio }

    /// Loadings rounded through storage precision.
    pub fn quantized(&self) -> Self {
        Self::from_file(self.to_file())
    }

    pub fn to_file(&self) -> ProjectionFile {
        ProjectionFile {
            n_features: self.n_features,
            dim: self.dim,
            loadings_f16: self.loadings.iter().map(|v| f16::from_f32(*v).to_bits()).collect(),
            singular_values: self.singular_values.clone(),
            explained_variance: self.explained_variance.clone(),
            explained_variance_ratio: self.explained_variance_ratio.clone(),
            seed: self.seed,
        }
    }

    pub fn from_file(f: ProjectionFile) -> Self {
        Self {
            n_features: f.n_features,
            dim: f.dim,
            loadings: f.loadings_f16.iter().map(|b| f16::from_bits(*b).to_f32()).collect(),
            singular_values: f.singular_values,
            explained_variance: f.explained_variance,
            explained_variance_ratio: f.explained_variance_ratio,
            seed: f.seed,
        }
    }
}

/// Range finder over feature space, for corpora with at least as many
/// documents as features. Writes loadings and returns singular values.
fn sketch_features(
    rows: &[SparseVector],
    n_features: usize,
    k: usize,
    l: usize,
    config: &ProjectionConfig,
    loadings: &mut [f32],
) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let omega: Vec<Vec<f64>> = (0..l)
        .map(|_| (0..n_features).map(|_| rng.sample::<f64, _>(StandardNormal)).collect())
        .collect();

    let mut q = orthonormalize(times(rows, &omega));
    for _ in 0..config.power_iterations {
        let z = orthonormalize(transpose_times(rows, &q, n_features));
        q = orthonormalize(times(rows, &z));
    }

    // B = Qᵀ A, one row per basis vector.
    let b = transpose_times(rows, &q, n_features);
    let gram: Vec<Vec<f64>> = b
        .iter()
        .map(|bi| b.iter().map(|bj| bi.iter().zip(bj).map(|(x, y)| x * y).sum()).collect())
        .collect();
    let (eigenvalues, eigenvectors) = symmetric_eigen(gram);

    let mut singular_values = Vec::with_capacity(k);
    let mut component = vec![0.0f64; n_features];
    for r in 0..k {
        let sigma = eigenvalues[r].max(0.0).sqrt();
        singular_values.push(sigma as f32);
        if sigma <= 1e-12 {
            continue;
        }
        component.iter_mut().for_each(|c| *c = 0.0);
        for (a, bi) in b.iter().enumerate() {
            let w = eigenvectors[r][a];
            if w == 0.0 {
                continue;
            }
            for (c, x) in component.iter_mut().zip(bi) {
                *c += w * x;
            }
        }
        write_component(loadings, k, r, &component, sigma);
    }
    singular_values
}

/// Range finder over document space, for vocabularies wider than the corpus.
/// Only `A·Aᵀ` products are formed, through one reusable feature-length
/// buffer, so the sketch, its basis and `B·Bᵀ` are all `n_docs` wide.
fn sketch_documents(
    rows: &[SparseVector],
    n_features: usize,
    k: usize,
    l: usize,
    config: &ProjectionConfig,
    loadings: &mut [f32],
) -> Vec<f32> {
    let n_docs = rows.len();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let omega: Vec<Vec<f64>> = (0..l)
        .map(|_| (0..n_docs).map(|_| rng.sample::<f64, _>(StandardNormal)).collect())
        .collect();

    let mut scratch = vec![0.0f64; n_features];
    let mut q = orthonormalize(omega.iter().map(|col| gram_times(rows, col, &mut scratch)).collect());
    for _ in 0..config.power_iterations {
        q = orthonormalize(q.iter().map(|col| gram_times(rows, col, &mut scratch)).collect());
    }

    // B·Bᵀ = Qᵀ (A·Aᵀ) Q, symmetrized against rounding.
    let gq: Vec<Vec<f64>> = q.iter().map(|col| gram_times(rows, col, &mut scratch)).collect();
    let mut gram = vec![vec![0.0f64; l]; l];
    for i in 0..l {
        for j in i..l {
            let x = 0.5 * (dot64(&q[i], &gq[j]) + dot64(&q[j], &gq[i]));
            gram[i][j] = x;
            gram[j][i] = x;
        }
    }
    let (eigenvalues, eigenvectors) = symmetric_eigen(gram);

    let mut singular_values = Vec::with_capacity(k);
    let mut component = vec![0.0f64; n_features];
    for r in 0..k {
        let sigma = eigenvalues[r].max(0.0).sqrt();
        singular_values.push(sigma as f32);
        if sigma <= 1e-12 {
            continue;
        }
        // Bᵀ u = Aᵀ (Q u)
        let mut coef = vec![0.0f64; n_docs];
        for (a, qa) in q.iter().enumerate() {
            let w = eigenvectors[r][a];
            if w == 0.0 {
                continue;
            }
            for (c, x) in coef.iter_mut().zip(qa) {
                *c += w * x;
            }
        }
        component.iter_mut().for_each(|c| *c = 0.0);
        for (row, c) in rows.iter().zip(&coef) {
            if *c == 0.0 {
                continue;
            }
            for (f, v) in row.iter() {
                component[f as usize] += v as f64 * c;
            }
        }
        write_component(loadings, k, r, &component, sigma);
    }
    singular_values
}

/// Store `component / sigma` as column `r`, with the largest-magnitude loading positive.
fn write_component(loadings: &mut [f32], k: usize, r: usize, component: &[f64], sigma: f64) {
    let pivot = component.iter().copied().fold(0.0f64, |m, x| if x.abs() > m.abs() { x } else { m });
    let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
    for (f, c) in component.iter().enumerate() {
        loadings[f * k + r] = (sign * c / sigma) as f32;
    }
}

/// `A · Aᵀ · x` for a document-length `x`. `scratch` must hold zeros on entry
/// and is left zeroed.
fn gram_times(rows: &[SparseVector], x: &[f64], scratch: &mut [f64]) -> Vec<f64> {
    for (row, coef) in rows.iter().zip(x) {
        if *coef == 0.0 {
            continue;
        }
        for (f, v) in row.iter() {
            scratch[f as usize] += v as f64 * coef;
        }
    }
    let out = rows
        .iter()
        .map(|row| row.iter().map(|(f, v)| v as f64 * scratch[f as usize]).sum())
        .collect();
    for (row, coef) in rows.iter().zip(x) {
        if *coef != 0.0 {
            for (f, _) in row.iter() {
                scratch[f as usize] = 0.0;
            }
        }
    }
    out
}

/// `A · M` for sparse rows `A` and columns `M` of length `n_features`.
fn times(rows: &[SparseVector], cols: &[Vec<f64>]) -> Vec<Vec<f64>> {
    cols.iter()
        .map(|col| {
            rows.iter()
                .map(|row| row.iter().map(|(f, v)| v as f64 * col[f as usize]).sum())
                .collect()
        })
        .collect()
}

/// `Aᵀ · Q` for sparse rows `A` and columns `Q` of length `rows.len()`.
fn transpose_times(rows: &[SparseVector], q: &[Vec<f64>], n_features: usize) -> Vec<Vec<f64>> {
    q.iter()
        .map(|col| {
            let mut out = vec![0.0f64; n_features];
            for (row, coef) in rows.iter().zip(col) {
                if *coef == 0.0 {
                    continue;
                }
                for (f, v) in row.iter() {
                    out[f as usize] += v as f64 * coef;
                }
            }
            out
        })
        .collect()
}
