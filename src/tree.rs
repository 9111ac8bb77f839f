//! Flattening of traversal results.
//!
//! A traversal hands back a set of raw rows. This module turns that set into the
//! client-facing shape, where every node lists the external ids of its direct children.

use std::collections::{HashMap, HashSet};

use crate::{
    codec,
    types::{AnnotationNode, NodeId, RawNode},
};

/// Flattens a set of raw nodes into annotation records, keeping the input order.
///
/// Children are computed only from `nodes` itself: a child that exists in the store
/// but is absent from the input never shows up in its parent's `children`.
///
/// # Arguments
/// * `nodes` - Rows produced by a traversal
/// * `type_tag` - Tag used when encoding external ids
///
/// # Returns
/// * `Vec<AnnotationNode>` - One record per input row, in input order
pub fn flatten(nodes: &[RawNode], type_tag: &str) -> Vec<AnnotationNode> {
    let present: HashSet<NodeId> = nodes.iter().map(|node| node.id).collect();

    let mut id_to_children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in nodes {
        if let Some(parent_id) = node.parent_id.filter(|p| present.contains(p)) {
            id_to_children.entry(parent_id).or_default().push(node.id);
        }
    }

    nodes
        .iter()
        .map(|node| AnnotationNode {
            id: codec::encode(type_tag, node.id),
            raw_text: node.raw_text.clone(),
            children: id_to_children
                .get(&node.id)
                .map(|children| {
                    children
                        .iter()
                        .map(|child_id| codec::encode(type_tag, *child_id))
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(id: NodeId) -> String {
        codec::encode("Annotation", id)
    }

    #[test]
    fn lists_only_children_in_result_set() {
        // Node 3 is a real child of 1 but is not part of this result.
        let nodes = vec![
            RawNode::new(1, None, "root"),
            RawNode::new(2, Some(1), "a"),
            RawNode::new(4, Some(2), "c"),
        ];

        let flat = flatten(&nodes, "Annotation");

        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].id, enc(1));
        assert_eq!(flat[0].children, vec![enc(2)]);
        assert_eq!(flat[1].children, vec![enc(4)]);
        assert!(flat[2].children.is_empty());
    }

    #[test]
    fn keeps_input_order_and_text() {
        let nodes = vec![
            RawNode::new(7, Some(1), "seven"),
            RawNode::new(3, Some(1), "three"),
            RawNode::new(1, None, "one"),
        ];

        let flat = flatten(&nodes, "Annotation");

        let texts: Vec<&str> = flat.iter().map(|n| n.raw_text.as_str()).collect();
        assert_eq!(texts, vec!["seven", "three", "one"]);
        assert_eq!(flat[2].children, vec![enc(7), enc(3)]);
    }

    #[test]
    fn empty_input_flattens_to_nothing() {
        assert!(flatten(&[], "Annotation").is_empty());
    }
}
