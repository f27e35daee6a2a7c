use crate::config::VectorizerConfig;
use crate::linalg::SparseVector;
use crate::tokenizer::ngrams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TermId = u32;

/// Fitted term → column mapping with smoothed IDF weights. Columns follow
/// lexicographic term order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "VocabularyFile", into = "VocabularyFile")]
pub struct Vocabulary {
    terms: Vec<String>,
    idf: Vec<f32>,
    lookup: HashMap<String, TermId>,
}

#[derive(Serialize, Deserialize)]
struct VocabularyFile {
    terms: Vec<String>,
    idf: Vec<f32>,
}

impl From<VocabularyFile> for Vocabulary {
    fn from(f: VocabularyFile) -> Self { Vocabulary::new(f.terms, f.idf) }
}

impl From<Vocabulary> for VocabularyFile {
    fn from(v: Vocabulary) -> Self { VocabularyFile { terms: v.terms, idf: v.idf } }
}

impl Vocabulary {
    fn new(terms: Vec<String>, idf: Vec<f32>) -> Self {
        let lookup = terms.iter().enumerate().map(|(i, t)| (t.clone(), i as TermId)).collect();
        Self { terms, idf, lookup }
    }

    pub fn len(&self) -> usize { self.terms.len() }

    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    pub fn get(&self, term: &str) -> Option<TermId> { self.lookup.get(term).copied() }

    pub fn term(&self, id: TermId) -> Option<&str> { self.terms.get(id as usize).map(String::as_str) }

    pub fn idf(&self, id: TermId) -> Option<f32> { self.idf.get(id as usize).copied() }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vectorizer {
    vocabulary: Vocabulary,
    max_ngram: usize,
}

impl Vectorizer {
    /// Fit a vocabulary over `blobs` and return the vectorizer together with
    /// the L2-normalized tf-idf row of every blob.
    pub fn fit(blobs: &[String], config: &VectorizerConfig) -> (Self, Vec<SparseVector>) {
        let n_docs = blobs.len();
        let counts: Vec<HashMap<String, u32>> = blobs
            .iter()
            .map(|text| {
                let mut tf: HashMap<String, u32> = HashMap::new();
                for gram in ngrams(text, config.max_ngram) {
                    *tf.entry(gram).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        let mut df: HashMap<&str, u32> = HashMap::new();
        for tf in &counts {
            for term in tf.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let ceiling = max_doc_count(config.max_df, n_docs);
        let mut kept: Vec<(&str, u32)> = df
            .into_iter()
            .filter(|(_, d)| *d >= config.min_df && *d <= ceiling)
            .collect();
        kept.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let n = n_docs as f32;
        let idf: Vec<f32> = kept.iter().map(|(_, d)| ((1.0 + n) / (1.0 + *d as f32)).ln() + 1.0).collect();
        let terms: Vec<String> = kept.into_iter().map(|(t, _)| t.to_string()).collect();
        let vectorizer = Self { vocabulary: Vocabulary::new(terms, idf), max_ngram: config.max_ngram };

        let rows = counts.iter().map(|tf| vectorizer.weigh(tf)).collect();
        tracing::info!(num_docs = n_docs, vocabulary_size = vectorizer.vocabulary.len(), "fitted vocabulary");
        (vectorizer, rows)
    }

    /// Weighted, L2-normalized vector for arbitrary text. Out-of-vocabulary
    /// n-grams contribute nothing.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut tf: HashMap<String, u32> = HashMap::new();
        for gram in ngrams(text, self.max_ngram) {
            if self.vocabulary.lookup.contains_key(&gram) {
                *tf.entry(gram).or_insert(0) += 1;
            }
        }
        self.weigh(&tf)
    }

    fn weigh(&self, tf: &HashMap<String, u32>) -> SparseVector {
        let pairs: Vec<(TermId, f32)> = tf
            .iter()
            .filter_map(|(term, count)| {
                let id = self.vocabulary.get(term)?;
                let idf = self.vocabulary.idf(id)?;
                Some((id, *count as f32 * idf))
            })
            .collect();
        let mut v = SparseVector::from_pairs(pairs);
        v.normalize();
        v
    }

    pub fn vocabulary(&self) -> &Vocabulary { &self.vocabulary }

    pub fn n_features(&self) -> usize { self.vocabulary.len() }
}

/// Largest document frequency a kept term may have. The product is snapped
/// to the nearest integer first so `0.7 * 10` admits exactly 7 documents.
fn max_doc_count(max_df: f64, n_docs: usize) -> u32 {
    let limit = max_df.max(0.0) * n_docs as f64;
    let nearest = limit.round();
    let limit = if (limit - nearest).abs() <= 1e-9 * limit.max(1.0) { nearest } else { limit.floor() };
    limit.min(u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn drops_near_universal_terms() {
        let docs = blobs(&["rust engineer", "rust developer", "rust analyst", "python analyst"]);
        let (v, _) = Vectorizer::fit(&docs, &VectorizerConfig::default());
        // "rust" is in 3/4 = 75% of documents.
        assert!(v.vocabulary().get("rust").is_none());
        assert!(v.vocabulary().get("analyst").is_some());
        assert!(v.vocabulary().get("rust analyst").is_some());
    }

    #[test]
    fn keeps_terms_at_exactly_the_document_ceiling() {
        let mut texts = vec!["shared common"; 7];
        texts.extend(["alpha", "beta", "gamma"]);
        let (v, rows) = Vectorizer::fit(&blobs(&texts), &VectorizerConfig::default());
        // 7/10 is not more than 70%.
        assert!(v.vocabulary().get("shared").is_some());
        assert!(v.vocabulary().get("shared common").is_some());
        assert!(!rows[0].is_empty());
    }

    #[test]
    fn document_ceiling_snaps_to_whole_counts() {
        assert_eq!(max_doc_count(0.7, 10), 7);
        assert_eq!(max_doc_count(0.7, 30), 21);
        assert_eq!(max_doc_count(0.7, 1000), 700);
        assert_eq!(max_doc_count(0.7, 4), 2);
        assert_eq!(max_doc_count(1.0, 3), 3);
        assert_eq!(max_doc_count(0.0, 3), 0);
    }

    #[test]
    fn uses_smoothed_idf_and_sorted_columns() {
        let docs = blobs(&["alpha beta", "gamma", "delta"]);
        let config = VectorizerConfig { max_df: 1.0, ..Default::default() };
        let (v, rows) = Vectorizer::fit(&docs, &config);
        assert_eq!(v.vocabulary().term(0), Some("alpha"));
        let id = v.vocabulary().get("gamma").unwrap();
        let expected = (4.0f32 / 2.0).ln() + 1.0;
        assert!((v.vocabulary().idf(id).unwrap() - expected).abs() < 1e-6);
        for row in &rows {
            assert!((row.norm() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn transform_is_deterministic_and_ignores_unknown_terms() {
        let docs = blobs(&["data scientist python", "data analyst excel", "chef kitchen"]);
        let (v, rows) = Vectorizer::fit(&docs, &VectorizerConfig::default());
        let a = v.transform("Data Scientist quantum");
        let b = v.transform("Data Scientist quantum");
        assert_eq!(a, b);
        assert!(a.dot(&rows[0]) > a.dot(&rows[1]));
        assert!(v.transform("quantum blockchain").is_empty());
    }

    #[test]
    fn survives_round_trip_through_bincode() {
        let docs = blobs(&["data scientist", "chef"]);
        let (v, _) = Vectorizer::fit(&docs, &VectorizerConfig { max_df: 1.0, ..Default::default() });
        let bytes = bincode::serialize(&v).unwrap();
        let back: Vectorizer = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.transform("chef"), v.transform("chef"));
    }
}
