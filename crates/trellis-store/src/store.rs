//! Immutable, indexed collection of triples

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use trellis_core::Triple;

/// Index chosen for a lookup, most to least selective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexChoice {
    /// Subject and predicate both bound
    SubjectPredicate,
    /// Subject bound
    Subject,
    /// Predicate bound
    Predicate,
    /// Object bound
    Object,
    /// Nothing bound, every triple is a candidate
    FullScan,
}

impl IndexChoice {
    /// Pick the most selective index for a pattern
    pub fn for_pattern(subject: Option<&str>, predicate: Option<&str>, object: Option<&str>) -> Self {
        match (subject, predicate, object) {
            (Some(_), Some(_), _) => IndexChoice::SubjectPredicate,
            (Some(_), None, _) => IndexChoice::Subject,
            (None, Some(_), _) => IndexChoice::Predicate,
            (None, None, Some(_)) => IndexChoice::Object,
            (None, None, None) => IndexChoice::FullScan,
        }
    }
}

/// Fact store statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub triple_count: usize,
    pub subject_count: usize,
    pub predicate_count: usize,
    pub object_count: usize,
}

/// An immutable fact store.
///
/// Built once and never mutated, so it can be shared read-only across
/// threads behind an `Arc` without locking.
#[derive(Debug, Default)]
pub struct FactStore {
    /// All triples, addressed by position
    triples: Vec<Triple>,

    /// subject -> triple positions
    by_subject: HashMap<String, Vec<usize>>,

    /// predicate -> triple positions
    by_predicate: HashMap<String, Vec<usize>>,

    /// object -> triple positions
    by_object: HashMap<String, Vec<usize>>,

    /// subject -> predicate -> triple positions
    by_subject_predicate: HashMap<String, HashMap<String, Vec<usize>>>,
}

impl FactStore {
    /// Build a store and all of its indexes
    pub fn build<I>(triples: I) -> Self
    where
        I: IntoIterator<Item = Triple>,
    {
        let triples: Vec<Triple> = triples.into_iter().collect();
        let mut store = Self::default();

        for (pos, triple) in triples.iter().enumerate() {
            store
                .by_subject
                .entry(triple.subject.clone())
                .or_default()
                .push(pos);
            store
                .by_predicate
                .entry(triple.predicate.clone())
                .or_default()
                .push(pos);
            store
                .by_object
                .entry(triple.object.clone())
                .or_default()
                .push(pos);
            store
                .by_subject_predicate
                .entry(triple.subject.clone())
                .or_default()
                .entry(triple.predicate.clone())
                .or_default()
                .push(pos);
        }
        store.triples = triples;

        debug!(
            "Built fact store with {} triples ({} subjects, {} predicates)",
            store.triples.len(),
            store.by_subject.len(),
            store.by_predicate.len()
        );
        store
    }

    /// Number of triples
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Returns true if the store holds no triples
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// All triples in load order
    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    /// Triples matching a pattern; `None` is a wildcard.
    ///
    /// The most selective index supplies candidates; fields the index does
    /// not cover (an object bound together with a subject, for example) are
    /// checked against each candidate.
    pub fn match_pattern(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Vec<&Triple> {
        let candidates: Box<dyn Iterator<Item = &Triple>> =
            match self.candidates(subject, predicate, object) {
                Some(positions) => Box::new(positions.iter().map(|&pos| &self.triples[pos])),
                None => Box::new(self.triples.iter()),
            };
        candidates
            .filter(|t| t.matches(subject, predicate, object))
            .collect()
    }

    /// Triple positions from the most selective index; `None` means scan
    /// everything, a missing key yields an empty slice
    fn candidates(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Option<&[usize]> {
        let positions = match IndexChoice::for_pattern(subject, predicate, object) {
            IndexChoice::SubjectPredicate => self
                .by_subject_predicate
                .get(subject?)
                .and_then(|by_predicate| by_predicate.get(predicate?)),
            IndexChoice::Subject => self.by_subject.get(subject?),
            IndexChoice::Predicate => self.by_predicate.get(predicate?),
            IndexChoice::Object => self.by_object.get(object?),
            IndexChoice::FullScan => return None,
        };
        Some(positions.map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Store statistics
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            triple_count: self.triples.len(),
            subject_count: self.by_subject.len(),
            predicate_count: self.by_predicate.len(),
            object_count: self.by_object.len(),
        }
    }
}

impl FromIterator<Triple> for FactStore {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Self::build(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_store() -> FactStore {
        FactStore::build(vec![
            Triple::new("ex:alice", "ex:knows", "ex:bob"),
            Triple::new("ex:alice", "ex:age", "\"30\""),
            Triple::new("ex:bob", "ex:knows", "ex:carol"),
            Triple::new("ex:carol", "ex:age", "\"25\""),
        ])
    }

    #[test]
    fn test_build_and_len() {
        let store = sample_store();
        assert_eq!(store.len(), 4);
        assert!(!store.is_empty());
        assert!(FactStore::default().is_empty());
    }

    #[test]
    fn test_index_choice() {
        assert_eq!(IndexChoice::for_pattern(Some("s"), Some("p"), Some("o")), IndexChoice::SubjectPredicate);
        assert_eq!(IndexChoice::for_pattern(Some("s"), None, Some("o")), IndexChoice::Subject);
        assert_eq!(IndexChoice::for_pattern(None, Some("p"), Some("o")), IndexChoice::Predicate);
        assert_eq!(IndexChoice::for_pattern(None, None, Some("o")), IndexChoice::Object);
        assert_eq!(IndexChoice::for_pattern(None, None, None), IndexChoice::FullScan);
    }

    #[test]
    fn test_match_by_subject_predicate() {
        let store = sample_store();
        let matches = store.match_pattern(Some("ex:alice"), Some("ex:knows"), None);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].object, "ex:bob");
    }

    #[test]
    fn test_match_by_single_field() {
        let store = sample_store();
        assert_eq!(store.match_pattern(Some("ex:alice"), None, None).len(), 2);
        assert_eq!(store.match_pattern(None, Some("ex:knows"), None).len(), 2);
        assert_eq!(store.match_pattern(None, None, Some("ex:carol")).len(), 1);
        assert_eq!(store.match_pattern(None, None, None).len(), 4);
    }

    #[test]
    fn test_match_checks_uncovered_fields() {
        let store = sample_store();
        let matches = store.match_pattern(Some("ex:alice"), None, Some("\"30\""));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].predicate, "ex:age");
        assert!(store.match_pattern(Some("ex:alice"), Some("ex:knows"), Some("ex:carol")).is_empty());
    }

    #[test]
    fn test_match_missing_key() {
        let store = sample_store();
        assert!(store.match_pattern(Some("ex:dave"), None, None).is_empty());
        assert!(store.match_pattern(Some("ex:alice"), Some("ex:likes"), None).is_empty());
        assert!(FactStore::default().match_pattern(None, None, None).is_empty());
    }

    #[test]
    fn test_stats() {
        let stats = sample_store().stats();
        assert_eq!(stats.triple_count, 4);
        assert_eq!(stats.subject_count, 3);
        assert_eq!(stats.predicate_count, 2);
        assert_eq!(stats.object_count, 4);
    }

    #[test]
    fn test_shared_across_threads() {
        let store = std::sync::Arc::new(sample_store());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.match_pattern(None, Some("ex:age"), None).len())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
    }

    fn small_term() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c"]).prop_map(String::from)
    }

    proptest! {
        #[test]
        fn prop_index_agrees_with_scan(
            facts in prop::collection::vec((small_term(), small_term(), small_term()), 0..30),
            s in prop::option::of(small_term()),
            p in prop::option::of(small_term()),
            o in prop::option::of(small_term()),
        ) {
            let store = FactStore::build(facts.iter().map(|(s, p, o)| Triple::new(s, p, o)));
            let mut indexed = store.match_pattern(s.as_deref(), p.as_deref(), o.as_deref());
            let mut scanned: Vec<&Triple> = store
                .triples()
                .iter()
                .filter(|t| t.matches(s.as_deref(), p.as_deref(), o.as_deref()))
                .collect();
            indexed.sort_by_key(|t| t.to_string());
            scanned.sort_by_key(|t| t.to_string());
            prop_assert_eq!(indexed, scanned);
        }
    }
}
