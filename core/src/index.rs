use crate::cache::{self, ArtifactStore, Artifacts, CacheOutcome};
use crate::config::EngineConfig;
use crate::corpus::{Corpus, DocId, Document};
use crate::linalg::{DenseMatrix, SparseVector};
use crate::neighbors::NeighborGraph;
use crate::projection::Projection;
use crate::vectorizer::Vectorizer;
use anyhow::{bail, Result};
use std::time::Instant;

/// Immutable search state for one corpus snapshot. Built or loaded once,
/// then shared read-only by every request.
pub struct SearchIndex {
    corpus: Corpus,
    config: EngineConfig,
    content_hash: String,
    vectorizer: Vectorizer,
    sparse: Vec<SparseVector>,
    projection: Projection,
    dense: DenseMatrix,
    neighbors: NeighborGraph,
}

impl SearchIndex {
    /// Run the full precompute: vocabulary, projection, dense vectors, neighbor graph.
    pub fn build(corpus: Corpus, config: EngineConfig) -> Self {
        let start = Instant::now();
        let content_hash = corpus.content_hash();
        let (vectorizer, sparse) = Vectorizer::fit(&corpus.blobs(), &config.vectorizer);
        let fitted = Projection::fit(&sparse, vectorizer.n_features(), &config.projection);

        let mut dense = DenseMatrix::new(fitted.dim());
        for row in &sparse {
            // Columns come from this vectorizer, so the projection accepts them.
            let v = fitted.transform(row).unwrap_or_else(|_| vec![0.0; fitted.dim()]);
            dense.push_row(&v);
        }
        // Serve exactly what the cache will hand back on the next start.
        let projection = fitted.quantized();
        let dense = dense.quantized();
        let neighbors = NeighborGraph::build(&dense, &corpus, config.neighbors);

        tracing::info!(
            num_docs = corpus.len(),
            vocabulary_size = vectorizer.n_features(),
            latent_dim = projection.dim(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "precompute finished"
        );
        Self { corpus, config, content_hash, vectorizer, sparse, projection, dense, neighbors }
    }

    /// Assemble from persisted artifacts, rejecting any that do not fit the corpus.
    pub fn from_artifacts(corpus: Corpus, config: EngineConfig, artifacts: Artifacts) -> Result<Self> {
        let n = corpus.len();
        let Artifacts { vectorizer, sparse, projection, dense, neighbors } = artifacts;
        if sparse.len() != n || dense.rows() != n || neighbors.len() != n {
            bail!(
                "artifact row counts ({}, {}, {}) do not match corpus of {n}",
                sparse.len(),
                dense.rows(),
                neighbors.len()
            );
        }
        if projection.n_features() != vectorizer.n_features() || dense.dim() != projection.dim() {
            bail!("projection shape does not match vocabulary or dense vectors");
        }
        let content_hash = corpus.content_hash();
        Ok(Self { corpus, config, content_hash, vectorizer, sparse, projection, dense, neighbors })
    }

    /// Reuse cached artifacts when they describe this corpus, otherwise rebuild
    /// and try to persist. Persistence failures are logged, not fatal.
    pub fn load_or_build(corpus: Corpus, store: &dyn ArtifactStore, config: EngineConfig) -> (Self, CacheOutcome) {
        let hash = corpus.content_hash();
        let reason = match cache::check_manifest(store, &hash) {
            Ok(_) => match cache::load_artifacts(store) {
                Ok(artifacts) => match Self::from_artifacts(corpus.clone(), config.clone(), artifacts) {
                    Ok(index) => {
                        tracing::info!(num_docs = index.len(), content_hash = %hash, "using precomputed artifacts");
                        return (index, CacheOutcome::Loaded);
                    }
                    Err(err) => format!("inconsistent artifacts: {err:#}"),
                },
                Err(err) => format!("unreadable artifacts: {err:#}"),
            },
            Err(err) => err.to_string(),
        };
        tracing::warn!(%reason, "recomputing artifacts");

        let index = Self::build(corpus, config);
        let persisted = match cache::save_index(&index, store) {
            Ok(_) => true,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to persist artifacts");
                false
            }
        };
        (index, CacheOutcome::Rebuilt { reason, persisted })
    }

    pub fn corpus(&self) -> &Corpus { &self.corpus }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn content_hash(&self) -> &str { &self.content_hash }

    pub fn vectorizer(&self) -> &Vectorizer { &self.vectorizer }

    pub fn sparse_rows(&self) -> &[SparseVector] { &self.sparse }

    pub fn projection(&self) -> &Projection { &self.projection }

    pub fn dense(&self) -> &DenseMatrix { &self.dense }

    pub fn neighbors(&self) -> &NeighborGraph { &self.neighbors }

    pub fn len(&self) -> usize { self.corpus.len() }

    pub fn is_empty(&self) -> bool { self.corpus.is_empty() }

    pub fn document(&self, id: DocId) -> Option<&Document> { self.corpus.get(id) }
}
