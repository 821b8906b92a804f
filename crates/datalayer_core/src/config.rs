//! Dataset definitions.
//!
//! Definitions are plain data, deserialized from the host's configuration
//! (the CLI reads a JSON list of them) or assembled with the builder methods.

use crate::mapping::MappingConfig;
use crate::source::{ChangeDetection, UnitErrorPolicy};
use datalayer_codec::CodecConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how a dataset's units are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory holding the units; empty for in-memory sources.
    pub path: PathBuf,
    /// Pattern unit names must match (`*` and `?` wildcards).
    pub file_pattern: String,
    /// Item stream format.
    pub codec: CodecConfig,
    /// How changes are detected.
    pub change_detection: ChangeDetection,
    /// What to do with unreadable units.
    pub on_unit_error: UnitErrorPolicy,
    /// Name prefix for units created by writes.
    pub file_prefix: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            file_pattern: "*".to_string(),
            codec: CodecConfig::default(),
            change_detection: ChangeDetection::UnitMarker,
            on_unit_error: UnitErrorPolicy::FailFast,
            file_prefix: String::new(),
        }
    }
}

impl SourceConfig {
    /// Source rooted at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets the unit name pattern.
    #[must_use]
    pub fn file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    /// Sets the codec.
    #[must_use]
    pub fn codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Sets change detection.
    #[must_use]
    pub fn change_detection(mut self, detection: ChangeDetection) -> Self {
        self.change_detection = detection;
        self
    }

    /// Sets the unit error policy.
    #[must_use]
    pub const fn on_unit_error(mut self, policy: UnitErrorPolicy) -> Self {
        self.on_unit_error = policy;
        self
    }

    /// Sets the prefix of written unit names.
    #[must_use]
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }
}

/// One dataset: its source and the mappings for each direction.
///
/// A dataset without `outgoing` mapping cannot be read; one without
/// `incoming` mapping rejects entity writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetDefinition {
    /// Dataset name.
    pub name: String,
    /// Storage settings.
    #[serde(default)]
    pub source: SourceConfig,
    /// Item to entity mapping, used by reads.
    #[serde(default)]
    pub outgoing: Option<MappingConfig>,
    /// Entity to item mapping, used by writes.
    #[serde(default)]
    pub incoming: Option<MappingConfig>,
}

impl DatasetDefinition {
    /// Definition named `name` with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the source.
    #[must_use]
    pub fn source(mut self, source: SourceConfig) -> Self {
        self.source = source;
        self
    }

    /// Sets the outgoing mapping.
    #[must_use]
    pub fn outgoing(mut self, mapping: MappingConfig) -> Self {
        self.outgoing = Some(mapping);
        self
    }

    /// Sets the incoming mapping.
    #[must_use]
    pub fn incoming(mut self, mapping: MappingConfig) -> Self {
        self.incoming = Some(mapping);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalayer_codec::Format;

    #[test]
    fn defaults() {
        let source = SourceConfig::default();
        assert_eq!(source.file_pattern, "*");
        assert_eq!(source.change_detection, ChangeDetection::UnitMarker);
        assert_eq!(source.on_unit_error, UnitErrorPolicy::FailFast);
        assert_eq!(source.codec.format, Format::Json);
    }

    #[test]
    fn deserializes_partial_definitions() {
        let defs: Vec<DatasetDefinition> = serde_json::from_str(
            r#"[
                {
                    "name": "people",
                    "source": {
                        "path": "/data/people",
                        "file_pattern": "people-*.cbor",
                        "codec": {"format": "cbor"},
                        "change_detection": {"data_property": "updated"},
                        "on_unit_error": "skip"
                    },
                    "outgoing": {"properties": [{"property": "id", "is_identity": true}]}
                },
                {"name": "scratch"}
            ]"#,
        )
        .unwrap();

        assert_eq!(defs[0].source.path, PathBuf::from("/data/people"));
        assert_eq!(defs[0].source.codec.format, Format::Cbor);
        assert_eq!(
            defs[0].source.change_detection,
            ChangeDetection::DataProperty("updated".into())
        );
        assert_eq!(defs[0].source.on_unit_error, UnitErrorPolicy::Skip);
        assert!(defs[0].outgoing.is_some());
        assert!(defs[0].incoming.is_none());

        assert_eq!(defs[1].source, SourceConfig::default());
    }

    #[test]
    fn builder() {
        let def = DatasetDefinition::new("x")
            .source(SourceConfig::new("/tmp/x").file_prefix("out-"))
            .incoming(MappingConfig::new());
        assert_eq!(def.source.file_prefix, "out-");
        assert!(def.incoming.is_some());
    }
}
