use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use annotation_tree::{
    codec,
    resolver::{ANALYSIS_TAG, CORPUS_TAG, NO_ANALYSIS},
    types::{AnnotationFilter, AnnotationRecord, UserId},
    AnnotationResolver, AnnotationSnapshot, AnnotationStore, Config, MemorySnapshot, MemoryStore,
    NodeId, RawNode, Result, Seed, TraversalMode, TreeError,
};
use async_trait::async_trait;

fn sample_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::from_records([
        AnnotationRecord::new(1, None, "root"),
        AnnotationRecord::new(2, Some(1), "a"),
        AnnotationRecord::new(3, Some(1), "b"),
        AnnotationRecord::new(4, Some(2), "c"),
    ]))
}

fn enc(id: NodeId) -> String {
    codec::encode("Annotation", id)
}

/// Knows every node but fails any downward expansion
struct BrokenStore(Arc<MemoryStore>);

struct BrokenSnapshot(MemorySnapshot);

#[async_trait]
impl AnnotationSnapshot for BrokenSnapshot {
    async fn fetch_node(&self, id: NodeId) -> Result<Option<RawNode>> {
        self.0.fetch_node(id).await
    }

    async fn fetch_children(&self, _parent_ids: &[NodeId]) -> Result<Vec<RawNode>> {
        Err(TreeError::StorageError("connection reset".to_string()))
    }

    async fn recursive_fetch(&self, _seed: Seed) -> Result<Vec<RawNode>> {
        Err(TreeError::StorageError("connection reset".to_string()))
    }
}

#[async_trait]
impl AnnotationStore for BrokenStore {
    async fn snapshot(&self) -> Result<Box<dyn AnnotationSnapshot + '_>> {
        Ok(Box::new(BrokenSnapshot(self.0.pin())))
    }

    async fn annotations_for_document(
        &self,
        _document_id: NodeId,
        _filter: &AnnotationFilter,
        _user: Option<UserId>,
    ) -> Result<Vec<AnnotationRecord>> {
        Err(TreeError::StorageError("connection reset".to_string()))
    }
}

/// Answers correctly, but only after a delay
struct SlowStore(Arc<MemoryStore>, Duration);

struct SlowSnapshot(MemorySnapshot, Duration);

#[async_trait]
impl AnnotationSnapshot for SlowSnapshot {
    async fn fetch_node(&self, id: NodeId) -> Result<Option<RawNode>> {
        tokio::time::sleep(self.1).await;
        self.0.fetch_node(id).await
    }

    async fn fetch_children(&self, parent_ids: &[NodeId]) -> Result<Vec<RawNode>> {
        self.0.fetch_children(parent_ids).await
    }
}

#[async_trait]
impl AnnotationStore for SlowStore {
    async fn snapshot(&self) -> Result<Box<dyn AnnotationSnapshot + '_>> {
        Ok(Box::new(SlowSnapshot(self.0.pin(), self.1)))
    }

    async fn annotations_for_document(
        &self,
        document_id: NodeId,
        filter: &AnnotationFilter,
        user: Option<UserId>,
    ) -> Result<Vec<AnnotationRecord>> {
        self.0.annotations_for_document(document_id, filter, user).await
    }
}

/// Moves node 2 under node 3 in the live store right after the third node lookup,
/// while a traversal is still running
struct ReparentingStore(Arc<MemoryStore>);

struct ReparentingSnapshot {
    pinned: MemorySnapshot,
    live: Arc<MemoryStore>,
    lookups: AtomicUsize,
}

#[async_trait]
impl AnnotationSnapshot for ReparentingSnapshot {
    async fn fetch_node(&self, id: NodeId) -> Result<Option<RawNode>> {
        let node = self.pinned.fetch_node(id).await;
        if self.lookups.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
            self.live.insert(AnnotationRecord::new(2, Some(3), "moved"));
        }
        node
    }

    async fn fetch_children(&self, parent_ids: &[NodeId]) -> Result<Vec<RawNode>> {
        self.pinned.fetch_children(parent_ids).await
    }

    async fn recursive_fetch(&self, seed: Seed) -> Result<Vec<RawNode>> {
        self.pinned.recursive_fetch(seed).await
    }
}

#[async_trait]
impl AnnotationStore for ReparentingStore {
    async fn snapshot(&self) -> Result<Box<dyn AnnotationSnapshot + '_>> {
        Ok(Box::new(ReparentingSnapshot {
            pinned: self.0.pin(),
            live: self.0.clone(),
            lookups: AtomicUsize::new(0),
        }))
    }

    async fn annotations_for_document(
        &self,
        document_id: NodeId,
        filter: &AnnotationFilter,
        user: Option<UserId>,
    ) -> Result<Vec<AnnotationRecord>> {
        self.0.annotations_for_document(document_id, filter, user).await
    }
}

/// Counts single-node lookups made through its snapshots
struct CountingStore(Arc<MemoryStore>, Arc<AtomicUsize>);

struct CountingSnapshot(MemorySnapshot, Arc<AtomicUsize>);

#[async_trait]
impl AnnotationSnapshot for CountingSnapshot {
    async fn fetch_node(&self, id: NodeId) -> Result<Option<RawNode>> {
        self.1.fetch_add(1, Ordering::SeqCst);
        self.0.fetch_node(id).await
    }

    async fn fetch_children(&self, parent_ids: &[NodeId]) -> Result<Vec<RawNode>> {
        self.0.fetch_children(parent_ids).await
    }

    async fn recursive_fetch(&self, seed: Seed) -> Result<Vec<RawNode>> {
        self.0.recursive_fetch(seed).await
    }
}

#[async_trait]
impl AnnotationStore for CountingStore {
    async fn snapshot(&self) -> Result<Box<dyn AnnotationSnapshot + '_>> {
        Ok(Box::new(CountingSnapshot(self.0.pin(), self.1.clone())))
    }

    async fn annotations_for_document(
        &self,
        document_id: NodeId,
        filter: &AnnotationFilter,
        user: Option<UserId>,
    ) -> Result<Vec<AnnotationRecord>> {
        self.0.annotations_for_document(document_id, filter, user).await
    }
}

#[tokio::test]
async fn call_sites_flatten_each_mode() {
    let store = sample_store();
    let resolver = AnnotationResolver::new(store.clone(), Config::default());
    let node_two = store.pin().fetch_node(2).await.unwrap().unwrap();

    let descendants = resolver.descendants_tree(&node_two).await.unwrap();
    assert_eq!(descendants.len(), 1);
    assert_eq!(descendants[0].id, enc(4));

    let full = resolver.full_tree(&node_two).await.unwrap();
    assert_eq!(full.len(), 4);
    assert_eq!(full[0].children, vec![enc(2), enc(3)]);

    let subtree = resolver.subtree(&node_two).await.unwrap();
    let subtree_ids: Vec<&str> = subtree.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(subtree_ids, vec![enc(1), enc(2), enc(4)]);
}

#[tokio::test]
async fn resolves_by_external_id() {
    let resolver = AnnotationResolver::new(sample_store(), Config::default());

    let tree = resolver
        .resolve_tree(&enc(1), TraversalMode::Descendants)
        .await
        .unwrap();
    assert_eq!(tree.len(), 3);

    let wrong_type = codec::encode(CORPUS_TAG, 1);
    assert!(matches!(
        resolver.resolve_tree(&wrong_type, TraversalMode::Subtree).await,
        Err(TreeError::MalformedIdentifier(_))
    ));
    assert!(matches!(
        resolver.resolve_tree("%%%", TraversalMode::Subtree).await,
        Err(TreeError::MalformedIdentifier(_))
    ));
}

#[tokio::test]
async fn configured_tag_is_used_for_output() {
    let config = Config {
        type_tag: "AnnotationType".to_string(),
        query_timeout: None,
    };
    let resolver = AnnotationResolver::new(sample_store(), config);

    let tree = resolver.resolve(2, TraversalMode::Descendants).await.unwrap();
    assert_eq!(tree[0].id, codec::encode("AnnotationType", 4));
}

#[tokio::test]
async fn not_found_reaches_the_caller() {
    let resolver = AnnotationResolver::new(sample_store(), Config::default());
    assert!(matches!(
        resolver.resolve(999, TraversalMode::Descendants).await,
        Err(TreeError::NodeNotFound(999))
    ));
}

#[tokio::test]
async fn storage_failure_degrades_to_empty() {
    let resolver = AnnotationResolver::new(Arc::new(BrokenStore(sample_store())), Config::default());

    for mode in [
        TraversalMode::Descendants,
        TraversalMode::FullTree,
        TraversalMode::Subtree,
    ] {
        assert!(resolver.resolve(1, mode).await.unwrap().is_empty());
    }

    // Existence is still checked before expansion.
    assert!(matches!(
        resolver.resolve(999, TraversalMode::FullTree).await,
        Err(TreeError::NodeNotFound(999))
    ));
}

#[tokio::test]
async fn cyclic_data_degrades_to_empty() {
    let store = Arc::new(MemoryStore::from_records([
        AnnotationRecord::new(1, Some(2), "x"),
        AnnotationRecord::new(2, Some(1), "y"),
    ]));
    let resolver = AnnotationResolver::new(store, Config::default());

    assert!(resolver
        .resolve(1, TraversalMode::FullTree)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn dangling_parent_degrades_to_empty() {
    let store = Arc::new(MemoryStore::from_records([
        AnnotationRecord::new(3, Some(100), "orphan"),
        AnnotationRecord::new(4, Some(3), "child"),
    ]));
    let resolver = AnnotationResolver::new(store, Config::default());

    for mode in [TraversalMode::FullTree, TraversalMode::Subtree] {
        assert!(resolver.resolve(3, mode).await.unwrap().is_empty());
    }
    // Nothing above the node is needed here.
    assert_eq!(
        resolver.resolve(3, TraversalMode::Descendants).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn concurrent_reparenting_cannot_tear_a_tree() {
    let live = Arc::new(MemoryStore::from_records([
        AnnotationRecord::new(1, None, "root"),
        AnnotationRecord::new(2, Some(1), "a"),
        AnnotationRecord::new(3, None, "other root"),
        AnnotationRecord::new(4, Some(2), "leaf"),
    ]));
    let resolver = AnnotationResolver::new(Arc::new(ReparentingStore(live.clone())), Config::default());

    let tree = resolver.resolve(4, TraversalMode::FullTree).await.unwrap();
    let tree_ids: Vec<&str> = tree.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(tree_ids, vec![enc(1), enc(2), enc(4)]);
    assert_eq!(tree[0].children, vec![enc(2)]);

    // The write did land; the traversal just never saw it.
    let moved = live.pin().fetch_node(2).await.unwrap().unwrap();
    assert_eq!(moved.parent_id, Some(3));
    let after = resolver.resolve(4, TraversalMode::FullTree).await.unwrap();
    let after_ids: Vec<&str> = after.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(after_ids, vec![enc(2), enc(3), enc(4)]);
}

#[tokio::test]
async fn call_sites_reuse_the_loaded_annotation() {
    let lookups = Arc::new(AtomicUsize::new(0));
    let store = CountingStore(sample_store(), lookups.clone());
    let node_two = RawNode::new(2, Some(1), "a");
    let resolver = AnnotationResolver::new(Arc::new(store), Config::default());

    resolver.descendants_tree(&node_two).await.unwrap();
    assert_eq!(lookups.load(Ordering::SeqCst), 0);

    // Only the parent is looked up on the way to the root.
    let subtree = resolver.subtree(&node_two).await.unwrap();
    assert_eq!(subtree.len(), 3);
    assert_eq!(lookups.load(Ordering::SeqCst), 1);

    resolver.resolve(2, TraversalMode::Descendants).await.unwrap();
    assert_eq!(lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn slow_store_times_out_to_empty() {
    let store = SlowStore(sample_store(), Duration::from_secs(10));
    let config = Config {
        query_timeout: Some(Duration::from_millis(20)),
        ..Config::default()
    };
    let resolver = AnnotationResolver::new(Arc::new(store), config);

    assert!(resolver
        .resolve(1, TraversalMode::Descendants)
        .await
        .unwrap()
        .is_empty());
}

fn document_store() -> Arc<MemoryStore> {
    let mut records = Vec::new();
    for (id, analysis, structural) in [(10, None, true), (11, Some(7), false), (12, None, false)] {
        let mut record = AnnotationRecord::new(id, None, format!("annotation {}", id));
        record.document_id = Some(5);
        record.corpus_id = Some(1);
        record.analysis_id = analysis;
        record.structural = structural;
        records.push(record);
    }
    Arc::new(MemoryStore::from_records(records))
}

fn record_ids(records: &[AnnotationRecord]) -> Vec<NodeId> {
    records.iter().map(|r| r.id).collect()
}

#[tokio::test]
async fn lists_document_annotations_with_filters() {
    let resolver = AnnotationResolver::new(document_store(), Config::default());
    let corpus = codec::encode(CORPUS_TAG, 1);
    let analysis = codec::encode(ANALYSIS_TAG, 7);

    let all = resolver.all_annotations(5, &corpus, None, None, None).await;
    assert_eq!(record_ids(&all), vec![10, 11, 12]);

    let manual = resolver
        .all_annotations(5, &corpus, Some(NO_ANALYSIS), None, None)
        .await;
    assert_eq!(record_ids(&manual), vec![10, 12]);

    let by_analysis = resolver
        .all_annotations(5, &corpus, Some(analysis.as_str()), None, None)
        .await;
    assert_eq!(record_ids(&by_analysis), vec![11]);

    let structural = resolver
        .all_annotations(5, &corpus, None, Some(true), None)
        .await;
    assert_eq!(record_ids(&structural), vec![10]);

    let other_corpus = codec::encode(CORPUS_TAG, 2);
    assert!(resolver
        .all_annotations(5, &other_corpus, None, None, None)
        .await
        .is_empty());
}

#[tokio::test]
async fn listing_swallows_bad_input_and_store_errors() {
    let resolver = AnnotationResolver::new(document_store(), Config::default());
    assert!(resolver
        .all_annotations(5, "garbage", None, None, None)
        .await
        .is_empty());

    let broken = AnnotationResolver::new(Arc::new(BrokenStore(document_store())), Config::default());
    let corpus = codec::encode(CORPUS_TAG, 1);
    assert!(broken
        .all_annotations(5, &corpus, None, None, None)
        .await
        .is_empty());
}
