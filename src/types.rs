//! Core type definitions for annotation hierarchies.
//!
//! This module contains the raw rows handed out by a store, the flattened
//! records handed back to clients, and the request/filter types that sit
//! between them.

use core::fmt;
use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Primary key used by the store to address an annotation
pub type NodeId = u64;

/// Primary key of a user, used for visibility checks
pub type UserId = u64;

/// A single annotation row as fetched from the store.
/// Only the columns the traversal needs are carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNode {
    /// Internal identifier of the annotation
    pub id: NodeId,
    /// Internal identifier of the parent annotation, `None` for a root
    pub parent_id: Option<NodeId>,
    /// Text payload of the annotation
    pub raw_text: String,
}

impl RawNode {
    pub fn new(id: NodeId, parent_id: Option<NodeId>, raw_text: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            raw_text: raw_text.into(),
        }
    }
}

/// Client-facing view of an annotation inside a flattened tree.
/// Each node references its immediate children by external id instead of embedding them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationNode {
    /// External identifier of the annotation
    pub id: String,
    /// Text payload, passed through verbatim
    pub raw_text: String,
    /// External identifiers of the children present in the same result set
    pub children: Vec<String>,
}

/// Which slice of the hierarchy a traversal returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    /// Everything below the node, excluding the node itself
    Descendants,
    /// The whole tree the node belongs to, starting at its true root
    FullTree,
    /// The path from the true root down to the node, plus everything below it
    Subtree,
}

impl Display for TraversalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalMode::Descendants => write!(f, "descendants"),
            TraversalMode::FullTree => write!(f, "full_tree"),
            TraversalMode::Subtree => write!(f, "subtree"),
        }
    }
}

impl FromStr for TraversalMode {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "descendants" | "descendants_tree" => Ok(TraversalMode::Descendants),
            "full_tree" | "full-tree" => Ok(TraversalMode::FullTree),
            "subtree" => Ok(TraversalMode::Subtree),
            other => Err(TreeError::InvalidEnvVar(format!(
                "unknown traversal mode '{}', expected descendants, full_tree or subtree",
                other
            ))),
        }
    }
}

/// A traversal to run against a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalRequest {
    /// Node the traversal starts from
    pub root: NodeId,
    pub mode: TraversalMode,
}

/// Full annotation row as kept by a store.
/// Carries the document/corpus/analysis columns used for listings and visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: NodeId,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub document_id: Option<NodeId>,
    #[serde(default)]
    pub corpus_id: Option<NodeId>,
    #[serde(default)]
    pub analysis_id: Option<NodeId>,
    #[serde(default)]
    pub structural: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub creator_id: Option<UserId>,
}

impl AnnotationRecord {
    /// Creates a public record with only the hierarchy columns set
    pub fn new(id: NodeId, parent_id: Option<NodeId>, raw_text: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            raw_text: raw_text.into(),
            document_id: None,
            corpus_id: None,
            analysis_id: None,
            structural: false,
            is_public: true,
            creator_id: None,
        }
    }

    pub fn to_raw(&self) -> RawNode {
        RawNode {
            id: self.id,
            parent_id: self.parent_id,
            raw_text: self.raw_text.clone(),
        }
    }

    /// Whether `user` may see this record. Anonymous callers only see public records.
    pub fn visible_to(&self, user: Option<UserId>) -> bool {
        self.is_public || (user.is_some() && self.creator_id == user)
    }
}

/// Restriction on the analysis that produced an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisFilter {
    /// No restriction
    #[default]
    Any,
    /// Only annotations created outside of any analysis
    Unset,
    /// Only annotations created by this analysis
    Id(NodeId),
}

/// Filter applied when listing the annotations of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationFilter {
    pub corpus_id: NodeId,
    pub analysis: AnalysisFilter,
    pub structural: Option<bool>,
}

impl AnnotationFilter {
    pub fn matches(&self, record: &AnnotationRecord) -> bool {
        if record.corpus_id != Some(self.corpus_id) {
            return false;
        }
        let analysis_ok = match self.analysis {
            AnalysisFilter::Any => true,
            AnalysisFilter::Unset => record.analysis_id.is_none(),
            AnalysisFilter::Id(id) => record.analysis_id == Some(id),
        };
        analysis_ok && self.structural.map_or(true, |s| record.structural == s)
    }
}
