//! Definitions file loading.
//!
//! The file is a JSON object with a `datasets` list of dataset definitions:
//!
//! ```json
//! {
//!   "datasets": [
//!     {
//!       "name": "people",
//!       "source": { "path": "data/people", "file_pattern": "*.jsonl" },
//!       "outgoing": { "properties": [{ "property": "id", "is_identity": true }] }
//!     }
//!   ]
//! }
//! ```
//!
//! Relative source paths are resolved against the file's directory.

use datalayer_core::{DatasetDefinition, DatasetRegistry, LayerError, TransformRegistry};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading the definitions file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The file is not a valid definitions document.
    #[error("invalid definitions file {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A definition was rejected.
    #[error(transparent)]
    Dataset(#[from] LayerError),
}

#[derive(Debug, Deserialize)]
struct DefinitionsFile {
    #[serde(default)]
    datasets: Vec<DatasetDefinition>,
}

/// Reads the definitions in `path`.
pub fn load_definitions(path: &Path) -> Result<Vec<DatasetDefinition>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: DefinitionsFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let definitions = file
        .datasets
        .into_iter()
        .map(|mut definition| {
            let source = &mut definition.source;
            if !source.path.as_os_str().is_empty() && source.path.is_relative() {
                source.path = base.join(&source.path);
            }
            definition
        })
        .collect::<Vec<_>>();
    debug!(path = %path.display(), datasets = definitions.len(), "loaded definitions");
    Ok(definitions)
}

/// Builds a registry holding the datasets defined in `path`.
pub fn load_registry(path: &Path) -> Result<DatasetRegistry, ConfigError> {
    let definitions = load_definitions(path)?;
    let registry = DatasetRegistry::new();
    datalayer_sources::configure_registry(&registry, &definitions, &TransformRegistry::new())?;
    Ok(registry)
}
