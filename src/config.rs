use std::time::Duration;

use crate::error::{Result, TreeError};

/// Tag used for annotation ids when none is configured
pub const DEFAULT_TYPE_TAG: &str = "Annotation";

/// Configuration for tree resolution loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Type tag embedded in every external annotation id
    pub type_tag: String,
    /// Upper bound on a single store-backed traversal, if any
    pub query_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            type_tag: DEFAULT_TYPE_TAG.to_string(),
            query_timeout: None,
        }
    }
}

impl Config {
    /// Creates a new Config instance by loading values from environment variables.
    /// This should be called only once during startup.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds a Config from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let type_tag = lookup("ANNOTATION_TYPE_TAG")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_TYPE_TAG.to_string());
        if type_tag.is_empty() {
            return Err(TreeError::InvalidEnvVar(
                "ANNOTATION_TYPE_TAG must not be blank".to_string(),
            ));
        }

        let query_timeout = lookup("QUERY_TIMEOUT")
            .map(|v| {
                humantime::parse_duration(v.trim()).map_err(|e| {
                    TreeError::InvalidEnvVar(format!(
                        "QUERY_TIMEOUT must be a duration such as '5s': {}",
                        e
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            type_tag,
            query_timeout,
        })
    }
}

/// Reads a variable that has no sensible default.
pub fn required_var(name: &str) -> Result<String> {
    dotenv::dotenv().ok();
    dotenv::var(name).map_err(|_| TreeError::EnvVarNotFound(name.to_string()))
}
