//! Center-plus-related views over the neighbor graph, and reinforcement of a
//! view from a set of user-selected jobs.

use crate::corpus::{DocId, Document};
use crate::error::{Result, ScoutError};
use crate::index::SearchIndex;
use crate::neighbors::NeighborEntry;
use rand::seq::index;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;

const FALLBACK_FLOOR: f32 = 0.3;
const FALLBACK_STEP: f32 = 0.05;

/// One job as drawn on the map. `id` is the position within the view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapNode {
    pub id: usize,
    pub original_id: Option<DocId>,
    pub title: String,
    pub description: String,
    pub salary_min: u64,
    pub salary_max: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary_range: Option<String>,
    pub experience_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    pub score: f32,
}

impl MapNode {
    fn from_document(position: usize, doc: &Document, score: f32, with_skills: bool) -> Self {
        Self {
            id: position,
            original_id: Some(doc.id),
            title: doc.title.clone(),
            description: doc.description.clone(),
            salary_min: doc.salary_min.unwrap_or(0),
            salary_max: doc.salary_max.unwrap_or(0),
            salary_range: None,
            experience_level: doc.experience_level.clone(),
            skills: with_skills.then(|| doc.skills.clone()),
            score,
        }
    }

    /// Neighbor snapshot with salary and skills taken from the live document.
    fn from_neighbor(position: usize, entry: &NeighborEntry, live: Option<&Document>) -> Self {
        Self {
            id: position,
            original_id: Some(entry.id),
            title: entry.title.clone(),
            description: entry.description.clone(),
            salary_min: live.and_then(|d| d.salary_min).unwrap_or(0),
            salary_max: live.and_then(|d| d.salary_max).unwrap_or(0),
            salary_range: Some(entry.salary_range.clone()),
            experience_level: entry.experience_level.clone(),
            skills: live.map(|d| d.skills.clone()),
            score: entry.score,
        }
    }

    fn center(doc: &Document) -> Self { Self::from_document(0, doc, 1.0, true) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapView {
    pub center: Option<MapNode>,
    pub related: Vec<MapNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MapView {
    pub fn empty() -> Self { Self::default() }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool { self.center.is_none() && self.related.is_empty() }

    /// Document ids present in the view, center first.
    pub fn original_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.center.iter().chain(&self.related).filter_map(|n| n.original_id)
    }
}

impl SearchIndex {
    fn checked_id(&self, raw: i64) -> Result<DocId> {
        match DocId::try_from(raw) {
            Ok(id) if (id as usize) < self.len() => Ok(id),
            _ => Err(ScoutError::InvalidIdentifier(raw)),
        }
    }

    fn neighbor_view(&self, center: &Document) -> MapView {
        let related = self
            .neighbors()
            .row(center.id)
            .iter()
            .enumerate()
            .map(|(i, entry)| MapNode::from_neighbor(i + 1, entry, self.document(entry.id)))
            .collect();
        MapView { center: Some(MapNode::center(center)), related, error: None }
    }

    /// The view around a known job: the job itself plus its precomputed neighbors.
    pub fn map_for_job(&self, job_id: i64) -> Result<MapView> {
        let id = self.checked_id(job_id)?;
        let doc = self.document(id).ok_or(ScoutError::InvalidIdentifier(job_id))?;
        Ok(self.neighbor_view(doc))
    }

    /// The view around the best match for free text.
    ///
    /// An exact title wins outright. Otherwise the top hybrid-ranked job is the
    /// center; if an earlier job shares its title the neighbor row cannot be
    /// trusted, so the remaining ranked jobs are shown with synthetic scores.
    pub fn map_for_query(&self, query: &str) -> Result<MapView> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(MapView::empty());
        }
        if let Some(id) = self.corpus().find_title_ignore_case(query) {
            return self.map_for_job(id as i64);
        }

        let ranked = match self.rank(query, self.config().map_candidates) {
            Ok(ranked) => ranked,
            Err(ScoutError::NoLexicalSignal) => {
                tracing::debug!(query, "no lexical signal for map view");
                return Ok(MapView::empty());
            }
            Err(err) => return Err(err),
        };
        let Some(first) = ranked.first() else { return Ok(MapView::empty()) };
        let center = self
            .document(first.id)
            .ok_or_else(|| ScoutError::UnexpectedScoringFailure(format!("ranked unknown document {}", first.id)))?;

        if self.corpus().find_title(&center.title) == Some(center.id) {
            return Ok(self.neighbor_view(center));
        }

        tracing::debug!(title = %center.title, "center title is shadowed, using ranked results");
        let related = ranked[1..]
            .iter()
            .filter_map(|r| self.document(r.id))
            .enumerate()
            .map(|(i, doc)| {
                let rank = i + 1;
                let score = (1.0 - FALLBACK_STEP * rank as f32).max(FALLBACK_FLOOR);
                MapNode { original_id: None, ..MapNode::from_document(rank, doc, score, false) }
            })
            .collect();
        Ok(MapView { center: Some(MapNode::center(center)), related, error: None })
    }

    /// Rebuild the related list around `center_id` from the jobs a user picked.
    ///
    /// Selected jobs come first, then the union of their neighbors by stored
    /// score, then random unused jobs until the view is full.
    pub fn reinforce<R: Rng + ?Sized>(&self, center_id: i64, selected_ids: &[i64], rng: &mut R) -> Result<MapView> {
        if selected_ids.is_empty() {
            return Err(ScoutError::InvalidRequest("no jobs selected".into()));
        }
        let center_id = self.checked_id(center_id)?;
        let mut chosen = HashSet::new();
        let mut selected = Vec::with_capacity(selected_ids.len());
        for raw in selected_ids {
            let id = self.checked_id(*raw)?;
            if chosen.insert(id) {
                selected.push(id);
            }
        }
        let mut seen = chosen;
        seen.insert(center_id);

        let mut merged: Vec<&NeighborEntry> = Vec::new();
        for id in &selected {
            for entry in self.neighbors().row(*id) {
                if seen.insert(entry.id) {
                    merged.push(entry);
                }
            }
        }
        merged.sort_by(|a, b| b.score.total_cmp(&a.score));

        let config = self.config();
        let limit = config.related_limit;
        let mut related: Vec<MapNode> = Vec::with_capacity(limit.max(selected.len()));
        let mut used: HashSet<DocId> = HashSet::from([center_id]);
        for id in &selected {
            let doc = self.document(*id).ok_or(ScoutError::InvalidIdentifier(*id as i64))?;
            related.push(MapNode::from_document(related.len() + 1, doc, config.selected_score, false));
            used.insert(*id);
        }
        for entry in merged {
            if related.len() >= limit {
                break;
            }
            let doc = self.document(entry.id).ok_or_else(|| {
                ScoutError::UnexpectedScoringFailure(format!("neighbor {} missing from corpus", entry.id))
            })?;
            related.push(MapNode::from_document(related.len() + 1, doc, entry.score, false));
            used.insert(entry.id);
        }

        if related.len() < limit {
            let pool: Vec<DocId> = (0..self.len() as DocId).filter(|id| !used.contains(id)).collect();
            let wanted = (limit - related.len()).min(pool.len());
            for i in index::sample(rng, pool.len(), wanted) {
                if let Some(doc) = self.document(pool[i]) {
                    related.push(MapNode::from_document(related.len() + 1, doc, config.backfill_score, false));
                }
            }
            tracing::debug!(backfilled = wanted, "reinforcement backfill");
        }

        let center = self.document(center_id).ok_or(ScoutError::InvalidIdentifier(center_id as i64))?;
        Ok(MapView { center: Some(MapNode::center(center)), related, error: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::corpus::{Corpus, RawDocument};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn job(title: &str, description: &str, salary: Option<(u64, u64)>) -> RawDocument {
        RawDocument {
            title: title.into(),
            description: description.into(),
            skills: Some(vec!["teamwork".into()]),
            salary_min: salary.map(|s| s.0),
            salary_max: salary.map(|s| s.1),
            experience_level: None,
            company: None,
            location: None,
        }
    }

    fn index_with(config: EngineConfig) -> SearchIndex {
        SearchIndex::build(
            Corpus::new(vec![
                job("Rust Engineer", "systems programming in rust", Some((140_000, 170_000))),
                job("Backend Engineer", "rust services and apis", Some((120_000, 150_000))),
                job("Data Scientist", "python statistics models", Some((100_000, 130_000))),
                job("Data Analyst", "sql statistics dashboards", Some((60_000, 75_000))),
                job("Pastry Chef", "kitchen desserts baking", None),
                job("Line Cook", "kitchen grill prep", Some((30_000, 35_000))),
                job("Rust Engineer", "embedded firmware in rust", Some((130_000, 160_000))),
                job("Nurse", "patient care ward shifts", Some((70_000, 90_000))),
            ]),
            config,
        )
    }

    fn index() -> SearchIndex { index_with(EngineConfig::default()) }

    #[test]
    fn job_view_uses_neighbor_row() {
        let idx = index();
        let view = idx.map_for_job(2).unwrap();
        let center = view.center.as_ref().unwrap();
        assert_eq!(center.original_id, Some(2));
        assert_eq!(center.score, 1.0);
        assert_eq!(center.skills.as_deref(), Some(&["teamwork".to_string()][..]));
        assert_eq!(view.related.len(), 7);
        for (i, node) in view.related.iter().enumerate() {
            assert_eq!(node.id, i + 1);
            assert_ne!(node.original_id, Some(2));
        }
        assert!(view.related.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn job_view_rejects_bad_ids() {
        let idx = index();
        assert!(matches!(idx.map_for_job(-1), Err(ScoutError::InvalidIdentifier(-1))));
        assert!(matches!(idx.map_for_job(8), Err(ScoutError::InvalidIdentifier(8))));
    }

    #[test]
    fn query_view_prefers_exact_title() {
        let idx = index();
        let view = idx.map_for_query("data analyst").unwrap();
        assert_eq!(view.center.unwrap().original_id, Some(3));
    }

    #[test]
    fn query_view_without_signal_is_empty() {
        let idx = index();
        assert!(idx.map_for_query("qqqq").unwrap().is_empty());
        assert!(idx.map_for_query("").unwrap().is_empty());
    }

    #[test]
    fn shadowed_title_falls_back_to_ranked_results() {
        let idx = index();
        // Job 6 is the best match, but job 0 carries the same title.
        let view = idx.map_for_query("embedded firmware rust").unwrap();
        let center = view.center.unwrap();
        assert_eq!(center.original_id, Some(6));
        assert_eq!(view.related.len(), 2);
        for (i, node) in view.related.iter().enumerate() {
            assert_eq!(node.original_id, None);
            assert!((node.score - (1.0 - 0.05 * (i + 1) as f32).max(0.3)).abs() < 1e-6);
        }
    }

    #[test]
    fn reinforce_orders_selected_then_neighbors_then_backfill() {
        let idx = index();
        let mut rng = StdRng::seed_from_u64(7);
        let view = idx.reinforce(0, &[3, 5, 3], &mut rng).unwrap();
        assert_eq!(view.center.as_ref().unwrap().original_id, Some(0));
        assert_eq!(view.related[0].original_id, Some(3));
        assert_eq!(view.related[1].original_id, Some(5));
        assert_eq!(view.related[0].score, 0.95);
        assert_eq!(view.related[1].score, 0.95);

        // Every other document fits in the view exactly once.
        assert_eq!(view.related.len(), 7);
        let ids: HashSet<DocId> = view.original_ids().collect();
        assert_eq!(ids.len(), 8);

        let computed: Vec<f32> = view.related[2..].iter().map(|n| n.score).collect();
        assert!(computed.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn backfill_fills_with_fixed_score_without_duplicates() {
        let config = EngineConfig { neighbors: 1, ..EngineConfig::default() };
        let idx = index_with(config);
        let mut rng = StdRng::seed_from_u64(42);
        let view = idx.reinforce(0, &[1], &mut rng).unwrap();
        assert_eq!(view.related.len(), 7);
        assert_eq!(view.related[0].score, 0.95);
        let backfilled = view.related.iter().filter(|n| n.score == 0.5).count();
        assert!(backfilled >= 5);
        let ids: HashSet<DocId> = view.original_ids().collect();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn reinforce_validates_input() {
        let idx = index();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(idx.reinforce(0, &[], &mut rng), Err(ScoutError::InvalidRequest(_))));
        assert!(matches!(idx.reinforce(0, &[99], &mut rng), Err(ScoutError::InvalidIdentifier(99))));
        assert!(matches!(idx.reinforce(-3, &[1], &mut rng), Err(ScoutError::InvalidIdentifier(-3))));
    }
}
