//! Small numeric helpers shared by the vectorizer, projector and scorer.

use half::f16;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sparse row with strictly increasing column indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Build from unsorted `(column, weight)` pairs; duplicate columns are summed.
    pub fn from_pairs(mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_by_key(|(i, _)| *i);
        let mut out = Self::default();
        for (idx, w) in pairs {
            if out.indices.last() == Some(&idx) {
                if let Some(last) = out.values.last_mut() {
                    *last += w;
                }
            } else {
                out.indices.push(idx);
                out.values.push(w);
            }
        }
        out
    }

    pub fn nnz(&self) -> usize { self.indices.len() }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn normalize(&mut self) {
        let n = self.norm();
        if n > 0.0 {
            for v in self.values.iter_mut() { *v /= n; }
        }
    }

    /// Merge-join dot product.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j, mut acc) = (0usize, 0usize, 0.0f32);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    acc += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }

    pub fn max_index(&self) -> Option<u32> { self.indices.last().copied() }
}

/// Row-major matrix of `rows × dim` f32 values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenseMatrix {
    dim: usize,
    rows: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    pub fn new(dim: usize) -> Self { Self { dim, rows: 0, data: Vec::new() } }

    pub fn from_rows(dim: usize, rows: Vec<Vec<f32>>) -> Self {
        let mut m = Self::new(dim);
        for r in rows { m.push_row(&r); }
        m
    }

    pub fn push_row(&mut self, row: &[f32]) {
        debug_assert_eq!(row.len(), self.dim);
        self.data.extend_from_slice(row);
        self.rows += 1;
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn rows(&self) -> usize { self.rows }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.rows { return None; }
        self.data.get(i * self.dim..(i + 1) * self.dim)
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.rows).map(move |i| &self.data[i * self.dim..(i + 1) * self.dim])
    }

    /// Values as IEEE half-precision bit patterns, row-major.
    pub fn to_f16_bits(&self) -> Vec<u16> {
        self.data.iter().map(|v| f16::from_f32(*v).to_bits()).collect()
    }

    /// Rebuild `rows` rows from half-precision bits and re-normalize every nonzero row.
    /// `None` unless there are exactly `dim * rows` values.
    pub fn from_f16_bits(dim: usize, rows: usize, bits: &[u16]) -> Option<Self> {
        if dim.checked_mul(rows)? != bits.len() {
            return None;
        }
        Some(Self::decode_f16(dim, rows, bits))
    }

    fn decode_f16(dim: usize, rows: usize, bits: &[u16]) -> Self {
        let data = bits.iter().map(|b| f16::from_bits(*b).to_f32()).collect();
        let mut m = Self { dim, rows, data };
        m.normalize_rows();
        m
    }

    /// Round every value through storage precision.
    pub fn quantized(&self) -> Self {
        Self::decode_f16(self.dim, self.rows, &self.to_f16_bits())
    }

    pub fn normalize_rows(&mut self) {
        if self.dim == 0 { return; }
        for row in self.data.chunks_exact_mut(self.dim) {
            normalize(row);
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f32]) -> f32 { dot(a, a).sqrt() }

/// L2-normalize in place; zero vectors are left untouched.
pub fn normalize(a: &mut [f32]) {
    let n = norm(a);
    if n > 0.0 {
        for v in a.iter_mut() { *v /= n; }
    }
}

/// Cosine similarity; 0 when either side has no magnitude.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot(a, b) / (na * nb) }
}

pub(crate) fn dot64(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Modified Gram-Schmidt with one re-orthogonalization pass. Columns that
/// collapse numerically are zeroed so callers can treat them as absent.
pub fn orthonormalize(mut cols: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    for j in 0..cols.len() {
        let (done, rest) = cols.split_at_mut(j);
        let col = &mut rest[0];
        let before = dot64(col, col).sqrt();
        for _ in 0..2 {
            for q in done.iter() {
                let proj = dot64(col, q);
                if proj != 0.0 {
                    for (c, qv) in col.iter_mut().zip(q) { *c -= proj * qv; }
                }
            }
        }
        let n = dot64(col, col).sqrt();
        if n <= 1e-10 * before.max(1e-300) || n == 0.0 {
            col.iter_mut().for_each(|c| *c = 0.0);
        } else {
            col.iter_mut().for_each(|c| *c /= n);
        }
    }
    cols
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
/// Returns eigenvalues in descending order and the matching eigenvectors,
/// `vectors[r]` being the r-th eigenvector.
pub fn symmetric_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();
    let scale: f64 = a.iter().flatten().map(|x| x * x).sum::<f64>().sqrt().max(f64::MIN_POSITIVE);

    for _sweep in 0..100 {
        let off: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum::<f64>()
            .sqrt();
        if off <= 1e-14 * scale { break; }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p][q];
                if apq.abs() <= f64::MIN_POSITIVE { continue; }
                let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for row in a.iter_mut() {
                    let (akp, akq) = (row[p], row[q]);
                    row[p] = c * akp - s * akq;
                    row[q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                a[p][q] = 0.0;
                a[q][p] = 0.0;
                for row in v.iter_mut() {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[j][j].total_cmp(&a[i][i]));
    let values = order.iter().map(|&i| a[i][i]).collect();
    let vectors = order.iter().map(|&i| (0..n).map(|k| v[k][i]).collect()).collect();
    (values, vectors)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub id: u32,
    pub score: f32,
}

impl Scored {
    /// Higher score first, then lower id.
    fn ranks_before(&self, other: &Scored) -> bool {
        match self.score.total_cmp(&other.score) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.id < other.id,
        }
    }
}

/// Bounded selection of the best `k` entries, ties broken by ascending id.
#[derive(Debug)]
pub struct TopK {
    k: usize,
    items: Vec<Scored>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self { k, items: Vec::with_capacity(k + 1) }
    }

    pub fn push(&mut self, id: u32, score: f32) {
        if self.k == 0 { return; }
        let cand = Scored { id, score };
        if self.items.len() == self.k {
            match self.items.last() {
                Some(worst) if !cand.ranks_before(worst) => return,
                _ => {}
            }
        }
        let pos = self.items.partition_point(|s| s.ranks_before(&cand));
        self.items.insert(pos, cand);
        self.items.truncate(self.k);
    }

    pub fn into_sorted(self) -> Vec<Scored> { self.items }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_dot_merges_columns() {
        let a = SparseVector::from_pairs(vec![(3, 1.0), (1, 2.0), (3, 1.0)]);
        assert_eq!(a.indices, vec![1, 3]);
        assert_eq!(a.values, vec![2.0, 2.0]);
        let b = SparseVector::from_pairs(vec![(3, 0.5), (7, 9.0)]);
        assert_eq!(a.dot(&b), 1.0);
    }

    #[test]
    fn eigen_of_known_matrix() {
        let (vals, vecs) = symmetric_eigen(vec![vec![2.0, 1.0], vec![1.0, 2.0]]);
        assert!((vals[0] - 3.0).abs() < 1e-10);
        assert!((vals[1] - 1.0).abs() < 1e-10);
        let v0 = &vecs[0];
        assert!((v0[0].abs() - v0[1].abs()).abs() < 1e-10);
        assert!((v0[0] * v0[1]) > 0.0);
    }

    #[test]
    fn orthonormalize_zeroes_dependent_columns() {
        let q = orthonormalize(vec![vec![1.0, 1.0, 0.0], vec![2.0, 2.0, 0.0], vec![0.0, 1.0, 1.0]]);
        assert!((dot64(&q[0], &q[0]) - 1.0).abs() < 1e-12);
        assert!(q[1].iter().all(|x| *x == 0.0));
        assert!(dot64(&q[0], &q[2]).abs() < 1e-12);
        assert!((dot64(&q[2], &q[2]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn top_k_breaks_ties_by_id() {
        let mut top = TopK::new(3);
        for (id, s) in [(5, 0.5), (2, 0.9), (4, 0.5), (1, 0.1), (3, 0.5)] {
            top.push(id, s);
        }
        let ids: Vec<u32> = top.into_sorted().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn quantized_rows_stay_unit_length() {
        let m = DenseMatrix::from_rows(3, vec![vec![0.6, 0.8, 0.0], vec![0.0, 0.0, 0.0]]).quantized();
        assert!((norm(m.row(0).unwrap()) - 1.0).abs() < 1e-6);
        assert_eq!(m.row(1).unwrap(), &[0.0, 0.0, 0.0]);
        assert!(m.row(2).is_none());
    }

    #[test]
    fn f16_bits_must_cover_every_row() {
        let m = DenseMatrix::from_rows(2, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let bits = m.to_f16_bits();
        assert_eq!(DenseMatrix::from_f16_bits(2, 2, &bits), Some(m.clone()));
        assert!(DenseMatrix::from_f16_bits(2, 3, &bits).is_none());
        assert!(DenseMatrix::from_f16_bits(2, 1, &bits).is_none());
        assert!(DenseMatrix::from_f16_bits(usize::MAX, 2, &bits).is_none());
    }
}
