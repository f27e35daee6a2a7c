use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    /// Terms present in more than this fraction of documents are dropped.
    pub max_df: f64,
    pub min_df: u32,
    /// Longest n-gram collected (1 = unigrams only).
    pub max_ngram: usize,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self { max_df: 0.7, min_df: 1, max_ngram: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub latent_dim: usize,
    pub oversamples: usize,
    pub power_iterations: usize,
    pub seed: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self { latent_dim: 100, oversamples: 10, power_iterations: 5, seed: 42 }
    }
}

/// Every tunable of the engine. Defaults reproduce the production ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub vectorizer: VectorizerConfig,
    pub projection: ProjectionConfig,
    /// Neighbors kept per document in the precomputed graph.
    pub neighbors: usize,
    /// Lexical top-K admitted to latent refinement.
    pub candidate_pool: usize,
    /// Weight of the lexical score in the combined score; latent gets the rest.
    pub lexical_weight: f32,
    pub result_limit: usize,
    /// Ranked results considered when picking a map center from free text.
    pub map_candidates: usize,
    pub keyword_fallback_limit: usize,
    pub related_limit: usize,
    /// Maximum attenuation applied to low-salary postings.
    pub salary_penalty: f32,
    pub selected_score: f32,
    pub backfill_score: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vectorizer: VectorizerConfig::default(),
            projection: ProjectionConfig::default(),
            neighbors: 15,
            candidate_pool: 50,
            lexical_weight: 0.8,
            result_limit: 7,
            map_candidates: 5,
            keyword_fallback_limit: 5,
            related_limit: 15,
            salary_penalty: 0.2,
            selected_score: 0.95,
            backfill_score: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_overrides_keep_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"neighbors": 5, "projection": {"latent_dim": 32}}"#).unwrap();
        assert_eq!(config.neighbors, 5);
        assert_eq!(config.projection.latent_dim, 32);
        assert_eq!(config.projection.seed, 42);
        assert_eq!(config.result_limit, 7);
        assert_eq!(config.vectorizer.max_df, 0.7);
    }
}
