use crate::corpus::{Corpus, DocId, Document};
use crate::linalg::{dot, DenseMatrix, TopK};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const SNIPPET_CHARS: usize = 200;

/// One precomputed neighbor. Display fields are a snapshot taken at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub id: DocId,
    /// `1 - cosine_distance` in latent space.
    pub score: f32,
    pub title: String,
    pub description: String,
    pub salary_range: String,
    pub experience_level: String,
}

impl NeighborEntry {
    fn snapshot(doc: &Document, score: f32) -> Self {
        Self {
            id: doc.id,
            score,
            title: doc.title.clone(),
            description: snippet(&doc.description),
            salary_range: doc.salary_range(),
            experience_level: doc.experience_level.clone(),
        }
    }
}

fn snippet(text: &str) -> String {
    if text.chars().count() > SNIPPET_CHARS {
        let head: String = text.chars().take(SNIPPET_CHARS).collect();
        format!("{head} …")
    } else {
        text.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborGraph {
    rows: Vec<Vec<NeighborEntry>>,
}

impl NeighborGraph {
    /// Exact all-pairs search: for every document, the `k` most cosine-similar
    /// other documents, ties broken by ascending id.
    ///
    /// Rows must already be unit length (or zero); the score is their dot product.
    pub fn build(vectors: &DenseMatrix, corpus: &Corpus, k: usize) -> Self {
        let n = vectors.rows().min(corpus.len());
        let rows = (0..n)
            .into_par_iter()
            .map(|i| {
                let Some(anchor) = vectors.row(i) else { return Vec::new() };
                let mut top = TopK::new(k);
                for (j, other) in vectors.iter_rows().enumerate().take(n) {
                    if j != i {
                        top.push(j as DocId, dot(anchor, other));
                    }
                }
                top.into_sorted()
                    .into_iter()
                    .filter_map(|s| corpus.get(s.id).map(|doc| NeighborEntry::snapshot(doc, s.score)))
                    .collect()
            })
            .collect();
        tracing::info!(num_docs = n, k, "built neighbor graph");
        Self { rows }
    }

    pub fn row(&self, id: DocId) -> &[NeighborEntry] {
        self.rows.get(id as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::RawDocument;

    fn corpus(n: usize) -> Corpus {
        Corpus::new(
            (0..n)
                .map(|i| RawDocument {
                    title: format!("Job {i}"),
                    description: "x".repeat(250),
                    skills: None,
                    salary_min: Some(1000),
                    salary_max: None,
                    experience_level: None,
                    company: None,
                    location: None,
                })
                .collect(),
        )
    }

    #[test]
    fn rows_exclude_self_and_are_sorted() {
        let vectors = DenseMatrix::from_rows(
            2,
            vec![vec![1.0, 0.0], vec![0.8, 0.6], vec![0.6, 0.8], vec![0.0, 1.0], vec![1.0, 0.0]],
        );
        let graph = NeighborGraph::build(&vectors, &corpus(5), 3);
        for id in 0..5u32 {
            let row = graph.row(id);
            assert_eq!(row.len(), 3);
            assert!(row.iter().all(|e| e.id != id));
            assert!(row.windows(2).all(|w| w[0].score >= w[1].score));
        }
        assert_eq!(graph.row(0)[0].id, 4);
        assert!((graph.row(0)[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn scores_are_dot_products_of_unit_rows() {
        let vectors = DenseMatrix::from_rows(2, vec![vec![1.0, 0.0], vec![0.8, 0.6], vec![0.0, 1.0]]);
        let graph = NeighborGraph::build(&vectors, &corpus(3), 2);
        let row: Vec<(DocId, f32)> = graph.row(1).iter().map(|e| (e.id, e.score)).collect();
        assert_eq!(row[0].0, 0);
        assert!((row[0].1 - 0.8).abs() < 1e-6);
        assert_eq!(row[1].0, 2);
        assert!((row[1].1 - 0.6).abs() < 1e-6);
        assert!(graph.row(0)[1].score.abs() < 1e-6);
    }

    #[test]
    fn ties_resolve_to_lower_id() {
        let vectors = DenseMatrix::from_rows(2, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 1.0], vec![0.0, 1.0]]);
        let graph = NeighborGraph::build(&vectors, &corpus(4), 2);
        let ids: Vec<DocId> = graph.row(0).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn snapshot_truncates_descriptions() {
        let vectors = DenseMatrix::from_rows(2, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let graph = NeighborGraph::build(&vectors, &corpus(2), 15);
        let entry = &graph.row(0)[0];
        assert_eq!(graph.row(0).len(), 1);
        assert!(entry.description.ends_with(" …"));
        assert_eq!(entry.description.chars().count(), SNIPPET_CHARS + 2);
        assert_eq!(entry.salary_range, "$1,000 - $0");
        assert!(graph.row(9).is_empty());
    }
}
