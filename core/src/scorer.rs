//! Free-text ranking: exact-title shortcut, lexical candidate narrowing,
//! latent refinement and salary attenuation.

use crate::corpus::{DocId, Document};
use crate::error::{Result, ScoutError};
use crate::index::SearchIndex;
use crate::linalg::{dot, TopK};

const BOOST_SLOPE: f64 = 0.2979;
const BOOST_OFFSET: f64 = -1.2902;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Hit<'a> {
    #[serde(flatten)]
    pub document: &'a Document,
    /// Absent for keyword-fallback matches, which are not ranked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// A candidate with every intermediate signal kept for inspection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked {
    pub id: DocId,
    pub lexical: f32,
    pub latent: f32,
    pub combined: f32,
    pub score: f32,
}

/// Saturating desirability of a salary in (0, 1).
pub fn salary_boost(median_salary: f64) -> f64 {
    let x = BOOST_SLOPE * (median_salary.max(0.0) / 1000.0 + 1.0).ln() + BOOST_OFFSET;
    1.0 / (1.0 + (-x).exp())
}

/// Attenuate `combined` for postings whose boost sits below its midpoint.
/// Never raises a score, whatever its sign.
pub fn attenuate(combined: f32, boost: f64, penalty: f32) -> f32 {
    let p = penalty as f64 * (0.5 - boost).max(0.0) * 2.0;
    (combined as f64 - (combined as f64).abs() * p) as f32
}

impl SearchIndex {
    /// Rank documents for a free-text query.
    ///
    /// An exact (case-insensitive) title match short-circuits to that single
    /// document with score 1.0. Queries without any known term fall back to an
    /// unscored substring scan.
    pub fn search(&self, query: &str) -> Result<Vec<Hit<'_>>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(doc) = self.corpus().find_title_ignore_case(query).and_then(|id| self.document(id)) {
            return Ok(vec![Hit { document: doc, score: Some(1.0) }]);
        }
        match self.rank(query, self.config().result_limit) {
            Ok(ranked) => {
                let hits = ranked
                    .into_iter()
                    .filter_map(|r| self.document(r.id).map(|d| Hit { document: d, score: Some(r.score) }))
                    .collect::<Vec<_>>();
                tracing::debug!(query, hits = hits.len(), "search ranked");
                Ok(hits)
            }
            Err(ScoutError::NoLexicalSignal) => {
                tracing::debug!(query, "no lexical signal, scanning text");
                Ok(self.keyword_scan(query, self.config().keyword_fallback_limit))
            }
            Err(err) => Err(err),
        }
    }

    /// First `limit` documents whose title, description or skills contain
    /// `query`, in corpus order.
    pub fn keyword_scan(&self, query: &str, limit: usize) -> Vec<Hit<'_>> {
        let needle = query.to_lowercase();
        self.corpus()
            .iter()
            .filter(|d| d.contains_text(&needle))
            .take(limit)
            .map(|d| Hit { document: d, score: None })
            .collect()
    }

    /// Hybrid ranking: lexical top-K, latent refinement, salary attenuation.
    /// Returns `NoLexicalSignal` when the query shares no term with the vocabulary.
    pub fn rank(&self, query: &str, limit: usize) -> Result<Vec<Ranked>> {
        let config = self.config();
        let q_lex = self.vectorizer().transform(query);
        if q_lex.is_empty() {
            return Err(ScoutError::NoLexicalSignal);
        }

        let mut top = TopK::new(config.candidate_pool);
        for (id, row) in self.sparse_rows().iter().enumerate() {
            let s = q_lex.dot(row);
            if s > 0.0 {
                top.push(id as DocId, s);
            }
        }

        let q_latent = self.projection().transform(&q_lex)?;
        let alpha = config.lexical_weight;
        let mut ranked = Vec::new();
        for cand in top.into_sorted() {
            let dense = self.dense().row(cand.id as usize).ok_or_else(|| {
                ScoutError::UnexpectedScoringFailure(format!("no dense vector for document {}", cand.id))
            })?;
            if dense.len() != q_latent.len() {
                return Err(ScoutError::UnexpectedScoringFailure(format!(
                    "latent dimension mismatch: query {} vs document {}",
                    q_latent.len(),
                    dense.len()
                )));
            }
            let doc = self.document(cand.id).ok_or_else(|| {
                ScoutError::UnexpectedScoringFailure(format!("document {} missing from corpus", cand.id))
            })?;
            let latent = dot(&q_latent, dense);
            let combined = alpha * cand.score + (1.0 - alpha) * latent;
            let score = attenuate(combined, salary_boost(doc.median_salary()), config.salary_penalty);
            ranked.push(Ranked { id: cand.id, lexical: cand.score, latent, combined, score });
        }

        // Stable: equal scores keep candidate order.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(limit);
        Ok(ranked)
    }
}
