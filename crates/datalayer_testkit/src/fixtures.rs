//! Test fixtures: scratch directories with unit files, sample mappings.

use chrono::{DateTime, TimeZone, Utc};
use datalayer_codec::{new_item_writer, CodecConfig, Format};
use datalayer_core::{
    DatasetDefinition, Item, MappingConfig, PropertyMapping, SourceConfig, UnitErrorPolicy,
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

/// A temporary dataset directory with automatic cleanup.
pub struct TempDataDir {
    dir: TempDir,
    format: Format,
}

impl TempDataDir {
    /// Creates an empty JSON Lines directory.
    pub fn new() -> Self {
        Self::with_format(Format::Json)
    }

    /// Creates an empty directory whose units use `format`.
    pub fn with_format(format: Format) -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            format,
        }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Codec configuration matching the directory's format.
    pub fn codec(&self) -> CodecConfig {
        CodecConfig::new(self.format)
    }

    /// Writes `items` to unit `name` and sets its modification time.
    pub fn write_unit(&self, name: &str, items: &[Item], modified: DateTime<Utc>) -> PathBuf {
        let path = self.dir.path().join(name);
        let file = File::create(&path).expect("Failed to create unit file");
        let mut writer = new_item_writer(&self.codec(), Box::new(file));
        for item in items {
            writer.write(item.record()).expect("Failed to write item");
        }
        writer.finish().expect("Failed to finish unit");
        set_modified(&path, modified);
        path
    }

    /// Writes raw bytes to unit `name` and sets its modification time.
    pub fn write_raw(&self, name: &str, bytes: &[u8], modified: DateTime<Utc>) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, bytes).expect("Failed to write unit file");
        set_modified(&path, modified);
        path
    }

    /// Names of the visible (non-hidden) files, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.dir.path())
            .expect("Failed to list directory")
            .map(|e| e.expect("Failed to read entry").file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    /// Number of hidden files (staging leftovers).
    pub fn hidden_count(&self) -> usize {
        fs::read_dir(self.dir.path())
            .expect("Failed to list directory")
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().starts_with('.'))
                    .unwrap_or(false)
            })
            .count()
    }

    /// Definition of a dataset over this directory using [`people_mapping`].
    pub fn definition(&self, name: &str, pattern: &str) -> DatasetDefinition {
        DatasetDefinition::new(name)
            .source(
                SourceConfig::new(self.dir.path())
                    .file_pattern(pattern)
                    .codec(self.codec())
                    .on_unit_error(UnitErrorPolicy::FailFast),
            )
            .outgoing(people_mapping())
            .incoming(people_mapping())
    }
}

impl Default for TempDataDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Sets the modification time of `path`.
pub fn set_modified(path: &Path, modified: DateTime<Utc>) {
    let file = File::options()
        .write(true)
        .open(path)
        .expect("Failed to open file for mtime update");
    file.set_modified(SystemTime::from(modified))
        .expect("Failed to set modification time");
}

/// A fixed UTC time, `minutes` after 2024-01-01T00:00:00Z.
pub fn at_minute(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
        + chrono::Duration::minutes(minutes)
}

/// RFC 3339 rendering of [`at_minute`].
pub fn rfc3339_at_minute(minutes: i64) -> String {
    at_minute(minutes).to_rfc3339()
}

/// Mapping for [`person`] items: `id` is the identity, `name` and `age` are
/// copied, `employer` is a reference.
pub fn people_mapping() -> MappingConfig {
    MappingConfig::new()
        .with_property(PropertyMapping::identity("id"))
        .with_property(PropertyMapping::field("name", ""))
        .with_property(PropertyMapping::field("age", ""))
        .with_property(PropertyMapping::field("employer", "").reference())
}

/// A person item.
pub fn person(id: &str, name: &str, age: i64) -> Item {
    Item::new().with("id", id).with("name", name).with("age", age)
}

/// `count` person items with ids `{prefix}0`, `{prefix}1`, ...
pub fn people(prefix: &str, count: usize) -> Vec<Item> {
    (0..count)
        .map(|i| person(&format!("{prefix}{i}"), &format!("Person {i}"), 20 + i as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_unit_sets_mtime() {
        let dir = TempDataDir::new();
        let path = dir.write_unit("a.jsonl", &people("p", 2), at_minute(5));
        let modified: DateTime<Utc> = fs::metadata(&path).unwrap().modified().unwrap().into();
        assert_eq!(modified, at_minute(5));
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
        assert_eq!(dir.file_names(), ["a.jsonl"]);
    }
}
