use dotenv::dotenv;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use annotation_tree::{
    config::required_var, AnnotationResolver, Config, MemoryStore, NodeId, TraversalMode,
    TreeError,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;

    let annotations_file = required_var("ANNOTATIONS_FILE")?;
    let root_id = required_var("ROOT_ID")?
        .trim()
        .parse::<NodeId>()
        .map_err(|_| TreeError::InvalidEnvVar("ROOT_ID must be a non-negative integer".to_string()))?;
    let mode = dotenv::var("TREE_MODE")
        .unwrap_or_else(|_| "subtree".to_string())
        .parse::<TraversalMode>()?;

    let store = Arc::new(MemoryStore::from_json_file(&annotations_file)?);
    info!(
        file = %annotations_file,
        records = store.len(),
        "Loaded annotations"
    );
    if store.is_empty() {
        warn!(file = %annotations_file, "Annotation file holds no records");
    }

    let resolver = AnnotationResolver::new(store, config);
    let tree = resolver.resolve(root_id, mode).await?;
    info!(root_id, mode = %mode, nodes = tree.len(), "Resolved tree");

    println!("{}", serde_json::to_string_pretty(&tree)?);

    Ok(())
}

/// Logs go to stderr so stdout carries only the resolved tree.
/// Set `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = dotenv::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
