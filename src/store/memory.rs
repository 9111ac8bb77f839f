use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    path::Path,
    sync::Arc,
};
use tracing::debug;

use crate::{
    error::{Result, TreeError},
    types::{AnnotationFilter, AnnotationRecord, NodeId, RawNode, UserId},
};

use super::{AnnotationSnapshot, AnnotationStore, Seed};

#[derive(Debug, Default, Clone)]
struct Population {
    records: BTreeMap<NodeId, AnnotationRecord>,
    /// parent id -> ids of its direct children
    children: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Population {
    fn children_of(&self, parent_id: NodeId) -> impl Iterator<Item = &AnnotationRecord> {
        self.children
            .get(&parent_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
    }
}

/// In-process annotation store.
///
/// The population is shared copy-on-write: a snapshot pins the current version,
/// and writers install a new version without disturbing snapshots already handed out.
#[derive(Debug, Default)]
pub struct MemoryStore {
    population: RwLock<Arc<Population>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = AnnotationRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Builds a store from a JSON array of annotation records
    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: Vec<AnnotationRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Inserts or replaces a record, moving it under its new parent if the parent changed
    pub fn insert(&self, record: AnnotationRecord) {
        let mut guard = self.population.write();
        let population = Arc::make_mut(&mut *guard);

        let previous_parent = population
            .records
            .get(&record.id)
            .and_then(|existing| existing.parent_id);
        if let Some(parent_id) = previous_parent {
            if let Some(siblings) = population.children.get_mut(&parent_id) {
                siblings.remove(&record.id);
            }
        }
        if let Some(parent_id) = record.parent_id {
            population
                .children
                .entry(parent_id)
                .or_default()
                .insert(record.id);
        }
        population.records.insert(record.id, record);
    }

    pub fn len(&self) -> usize {
        self.population.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.population.read().records.is_empty()
    }

    /// Pins the current version of the population
    pub fn pin(&self) -> MemorySnapshot {
        MemorySnapshot {
            population: self.population.read().clone(),
        }
    }
}

#[async_trait]
impl AnnotationStore for MemoryStore {
    async fn snapshot(&self) -> Result<Box<dyn AnnotationSnapshot + '_>> {
        Ok(Box::new(self.pin()))
    }

    async fn annotations_for_document(
        &self,
        document_id: NodeId,
        filter: &AnnotationFilter,
        user: Option<UserId>,
    ) -> Result<Vec<AnnotationRecord>> {
        let population = self.population.read().clone();
        Ok(population
            .records
            .values()
            .filter(|record| record.document_id == Some(document_id))
            .filter(|record| filter.matches(record) && record.visible_to(user))
            .cloned()
            .collect())
    }
}

/// One pinned version of a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    population: Arc<Population>,
}

#[async_trait]
impl AnnotationSnapshot for MemorySnapshot {
    async fn fetch_node(&self, id: NodeId) -> Result<Option<RawNode>> {
        Ok(self.population.records.get(&id).map(AnnotationRecord::to_raw))
    }

    async fn fetch_children(&self, parent_ids: &[NodeId]) -> Result<Vec<RawNode>> {
        Ok(parent_ids
            .iter()
            .flat_map(|parent_id| self.population.children_of(*parent_id))
            .map(AnnotationRecord::to_raw)
            .collect())
    }

    async fn recursive_fetch(&self, seed: Seed) -> Result<Vec<RawNode>> {
        let population = &self.population;
        let mut seen = HashSet::from([seed.node_id()]);
        let mut fetched = Vec::new();

        if let Seed::Node(id) = seed {
            match population.records.get(&id) {
                Some(record) => fetched.push(record.to_raw()),
                None => return Ok(fetched),
            }
        }

        let mut frontier = vec![seed.node_id()];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for parent_id in frontier {
                for child in population.children_of(parent_id) {
                    if !seen.insert(child.id) {
                        return Err(TreeError::CycleDetected { node_id: child.id });
                    }
                    next.push(child.id);
                    fetched.push(child.to_raw());
                }
            }
            frontier = next;
        }

        debug!(seed = ?seed, rows = fetched.len(), "Recursive fetch complete");
        Ok(fetched)
    }
}
