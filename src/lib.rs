pub mod codec;
pub mod config;
pub mod error;
pub mod resolver;
pub mod store;
pub mod traversal;
pub mod tree;
pub mod types;

pub use config::Config;
pub use error::{Result, TreeError};
pub use resolver::AnnotationResolver;
pub use store::{AnnotationSnapshot, AnnotationStore, MemorySnapshot, MemoryStore, Seed};
pub use traversal::TraversalEngine;
pub use types::{AnnotationNode, NodeId, RawNode, TraversalMode, TraversalRequest};
