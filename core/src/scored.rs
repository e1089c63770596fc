use crate::index::EntityId;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hit {
    pub id: EntityId,
    pub score: f64,
}

/// Identifier → score mapping whose iteration order is rank order (score descending).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScoredResults {
    hits: Vec<Hit>,
}

impl ScoredResults {
    /// Wrap hits that are already ranked. Panics in debug builds if scores increase.
    pub(crate) fn from_ranked(hits: Vec<Hit>) -> Self {
        debug_assert!(hits.windows(2).all(|w| w[0].score >= w[1].score), "hits must be ranked");
        Self { hits }
    }

    pub fn len(&self) -> usize { self.hits.len() }
    pub fn is_empty(&self) -> bool { self.hits.is_empty() }
    pub fn hits(&self) -> &[Hit] { &self.hits }
    pub fn iter(&self) -> std::slice::Iter<'_, Hit> { self.hits.iter() }
    pub fn get_index(&self, rank: usize) -> Option<Hit> { self.hits.get(rank).copied() }

    pub fn ids(&self) -> Vec<EntityId> {
        self.hits.iter().map(|h| h.id).collect()
    }

    pub fn score_of(&self, id: EntityId) -> Option<f64> {
        self.hits.iter().find(|h| h.id == id).map(|h| h.score)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.score_of(id).is_some()
    }

    /// Keep the hits whose identifier is in `ids`, preserving rank order.
    pub fn semi_join(&self, ids: &HashSet<EntityId>) -> ScoredResults {
        let hits = self.hits.iter().filter(|h| ids.contains(&h.id)).copied().collect();
        ScoredResults { hits }
    }
}

impl<'a> IntoIterator for &'a ScoredResults {
    type Item = &'a Hit;
    type IntoIter = std::slice::Iter<'a, Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked() -> ScoredResults {
        ScoredResults::from_ranked(vec![Hit { id: 2, score: 3.0 }, Hit { id: 3, score: 2.0 }, Hit { id: 1, score: 2.0 }])
    }

    #[test]
    fn semi_join_keeps_order() {
        let ids: HashSet<EntityId> = [1, 2, 9].into_iter().collect();
        let joined = ranked().semi_join(&ids);
        assert_eq!(joined.ids(), vec![2, 1]);
        assert_eq!(joined.score_of(1), Some(2.0));
        assert!(!joined.contains(3));
    }

    #[test]
    fn serializes_as_list() {
        let json = serde_json::to_value(ranked()).unwrap();
        assert_eq!(json[0]["id"], 2);
        assert_eq!(json.as_array().unwrap().len(), 3);
    }
}
