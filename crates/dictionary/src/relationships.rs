//! Entity relationship bookkeeping and join-path enumeration.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};

use crate::model::EntityRelationship;

/// Relationships keyed by `fqn -> foreign_fqn`, recorded in both directions.
#[derive(Debug, Default, Clone)]
pub struct RelationshipIndex {
    by_entity: IndexMap<String, IndexMap<String, EntityRelationship>>,
}

impl RelationshipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record each relationship and its pivot, merging foreign keys for pairs
    /// that were already seen (one row arrives per key column).
    pub fn ingest(&mut self, relationships: Vec<EntityRelationship>) {
        for relationship in relationships {
            let pivot = relationship.pivot();
            self.record(relationship);
            self.record(pivot);
        }
    }

    fn record(&mut self, relationship: EntityRelationship) {
        let foreign_keys = relationship.foreign_keys.clone();
        let targets = self.by_entity.entry(relationship.fqn()).or_default();
        let existing = targets
            .entry(relationship.foreign_fqn())
            .or_insert(relationship);
        for fk in foreign_keys {
            existing.add_foreign_key(fk);
        }
    }

    /// Relationships originating at `fqn`, in discovery order.
    pub fn for_entity(&self, fqn: &str) -> Vec<EntityRelationship> {
        self.by_entity
            .get(fqn)
            .map(|targets| targets.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_entity.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_entity.iter().flat_map(|(fqn, targets)| {
            targets.keys().map(move |foreign| (fqn.as_str(), foreign.as_str()))
        })
    }
}

/// Directed graph over entity FQNs.
#[derive(Debug, Default, Clone)]
pub struct RelationshipGraph {
    outgoing: IndexMap<String, IndexSet<String>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_index(index: &RelationshipIndex) -> Self {
        let mut graph = Self::new();
        for (fqn, foreign) in index.pairs() {
            graph.add_edge(fqn, foreign);
        }
        graph
    }

    pub fn add_edge(&mut self, source: &str, target: &str) {
        self.outgoing
            .entry(source.to_string())
            .or_default()
            .insert(target.to_string());
        self.outgoing.entry(target.to_string()).or_default();
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.outgoing.contains_key(fqn)
    }

    pub fn node_count(&self) -> usize {
        self.outgoing.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(IndexSet::len).sum()
    }

    /// Every maximal simple join path starting at `entity`, rendered as
    /// `"a -> b -> c"`. A self-join on the start entity is reported once as
    /// `"a -> a"` and not followed further.
    pub fn paths_from(&self, entity: &str) -> Vec<String> {
        if !self.contains(entity) {
            return Vec::new();
        }
        let mut result = Vec::new();
        self.walk(entity, vec![entity.to_string()], &mut result, HashSet::new());
        result
    }

    fn walk(
        &self,
        entity: &str,
        path: Vec<String>,
        result: &mut Vec<String>,
        mut visited: HashSet<String>,
    ) {
        visited.insert(entity.to_string());

        let Some(successors) = self.outgoing.get(entity) else {
            return;
        };
        let unvisited: Vec<&String> = successors
            .iter()
            .filter(|s| !visited.contains(s.as_str()))
            .collect();

        if path.len() == 1 && successors.contains(entity) {
            result.push(format!("{entity} -> {entity}"));
        }

        if unvisited.is_empty() && path.len() > 1 {
            result.push(path.join(" -> "));
            return;
        }

        for successor in unvisited {
            let mut next = path.clone();
            next.push(successor.clone());
            self.walk(successor, next, result, visited.clone());
        }
    }
}
