//! Directory-backed dataset.
//!
//! Every regular file in the dataset directory whose name matches the
//! configured pattern is one source unit; its modification time is the unit
//! marker. Hidden files (leading `.`) are never units, which is how writes
//! keep partially written data invisible: they go to a hidden file first and
//! are renamed into place when complete.
//!
//! # Writes
//!
//! - outside a full sync every write becomes a new one-item unit
//! - during a full sync writes are staged into a hidden file; completing the
//!   sync publishes it as a unit and removes all previous units, cancelling
//!   deletes it; a previous unit that cannot be removed is logged and left
//!   in place
//!
//! # Example
//!
//! ```no_run
//! use datalayer_core::{
//!     collect_entities, Dataset, DatasetDefinition, MappingConfig, PropertyMapping, SourceConfig,
//!     TransformRegistry,
//! };
//! use datalayer_sources::FileSystemDataset;
//!
//! let definition = DatasetDefinition::new("people")
//!     .source(SourceConfig::new("/var/data/people").file_pattern("*.jsonl"))
//!     .outgoing(MappingConfig::new().with_property(PropertyMapping::identity("id")));
//! let dataset = FileSystemDataset::new(&definition, &TransformRegistry::new()).unwrap();
//!
//! let mut changes = dataset.changes("2024-01-01T00:00:00Z", 100, false).unwrap();
//! let (entities, token) = collect_entities(&mut *changes).unwrap();
//! ```

use crate::mappings::Mappings;
use crate::pattern::NamePattern;
use chrono::{DateTime, Utc};
use datalayer_codec::{new_item_reader, new_item_writer, CodecConfig, ItemWriter};
use datalayer_core::{
    marker_from_time, Dataset, DatasetDefinition, DatasetDescription, Entity, EntityIterator,
    Item, ItemIterator, LayerError, LayerResult, ReadRequest, ReaderItemIterator, SourceConfig,
    SourceUnit, TransformRegistry, UnitOpener, Value,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A full sync in progress.
struct Staging {
    path: PathBuf,
    writer: Box<dyn ItemWriter>,
    items: u64,
}

/// A dataset stored as item files in one directory.
pub struct FileSystemDataset {
    name: String,
    source: SourceConfig,
    pattern: NamePattern,
    mappings: Mappings,
    opener: Arc<FileUnitOpener>,
    staging: Mutex<Option<Staging>>,
}

impl FileSystemDataset {
    /// Builds the dataset. The directory is not touched until first use.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Configuration`] when the definition has no
    /// path, an invalid file pattern, or an invalid mapping.
    pub fn new(
        definition: &DatasetDefinition,
        transforms: &TransformRegistry,
    ) -> LayerResult<Self> {
        let source = definition.source.clone();
        if source.path.as_os_str().is_empty() {
            return Err(LayerError::configuration(format!(
                "dataset {:?} has no source path",
                definition.name
            )));
        }
        Ok(Self {
            name: definition.name.clone(),
            pattern: NamePattern::new(&source.file_pattern)?,
            mappings: Mappings::new(definition, transforms)?,
            opener: Arc::new(FileUnitOpener {
                root: source.path.clone(),
                codec: source.codec.clone(),
            }),
            source,
            staging: Mutex::new(None),
        })
    }

    /// Dataset directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.source.path
    }

    /// Enumerates the units currently visible, in read order.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::SourceUnavailable`] when the directory cannot
    /// be listed.
    pub fn units(&self) -> LayerResult<Vec<SourceUnit>> {
        let unavailable = |e: io::Error| {
            LayerError::source_unavailable(format!(
                "cannot list {}: {e}",
                self.source.path.display()
            ))
        };
        let mut units = Vec::new();
        for entry in fs::read_dir(&self.source.path).map_err(unavailable)? {
            let entry = entry.map_err(unavailable)?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "ignoring file with non UTF-8 name");
                continue;
            };
            if name.starts_with('.') || !self.pattern.matches(&name) {
                continue;
            }
            let metadata = entry.metadata().map_err(unavailable)?;
            if !metadata.is_file() {
                continue;
            }
            let modified: DateTime<Utc> = metadata.modified().map_err(unavailable)?.into();
            units.push(SourceUnit::new(name, marker_from_time(modified)));
        }
        units.sort();
        debug!(dataset = %self.name, units = units.len(), "discovered source units");
        Ok(units)
    }

    fn read(&self, request: ReadRequest) -> LayerResult<Box<dyn EntityIterator>> {
        let mapper = self.mappings.outgoing()?;
        let units = self.units()?;
        request.open(units, self.opener.clone(), mapper)
    }

    /// Name for a new unit: prefix, UTC timestamp, random suffix, extension.
    fn new_unit_name(&self) -> LayerResult<String> {
        let name = format!(
            "{}{}-{}.{}",
            self.source.file_prefix,
            Utc::now().format("%Y%m%dT%H%M%S%.9fZ"),
            Uuid::new_v4().simple(),
            self.source.codec.format.extension()
        );
        if !self.pattern.matches(&name) {
            return Err(LayerError::write_rejected(format!(
                "generated unit name {name:?} does not match file pattern {:?}; adjust file_prefix",
                self.pattern.as_str()
            )));
        }
        Ok(name)
    }

    fn create_hidden(&self, label: &str) -> LayerResult<(PathBuf, Box<dyn ItemWriter>)> {
        fs::create_dir_all(&self.source.path)?;
        let path = self
            .source
            .path
            .join(format!(".{label}-{}.partial", Uuid::new_v4().simple()));
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let writer = new_item_writer(&self.source.codec, Box::new(BufWriter::new(file)));
        Ok((path, writer))
    }

    /// Writes `item` as a new single-item unit.
    fn append_unit(&self, item: &Item) -> LayerResult<()> {
        let name = self.new_unit_name()?;
        let (hidden, mut writer) = self.create_hidden("write")?;
        let written = writer
            .write(item.record())
            .and_then(|()| writer.finish())
            .map_err(LayerError::from)
            .and_then(|()| {
                fs::rename(&hidden, self.source.path.join(&name)).map_err(LayerError::from)
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&hidden);
            return Err(e);
        }
        debug!(dataset = %self.name, unit = %name, "wrote unit");
        Ok(())
    }
}

impl Dataset for FileSystemDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> DatasetDescription {
        DatasetDescription {
            name: self.name.clone(),
            kind: "filesystem".to_string(),
            change_detection: self.source.change_detection.clone(),
            readable: self.mappings.readable(),
            writable: true,
        }
    }

    fn metadata(&self) -> BTreeMap<String, Value> {
        let mut metadata = BTreeMap::from([
            (
                "path".to_string(),
                Value::Text(self.source.path.display().to_string()),
            ),
            (
                "file_pattern".to_string(),
                Value::Text(self.pattern.to_string()),
            ),
            (
                "format".to_string(),
                Value::Text(self.source.codec.format.to_string()),
            ),
        ]);
        if let Ok(units) = self.units() {
            metadata.insert("units".to_string(), Value::Integer(units.len() as i64));
        }
        metadata
    }

    fn changes(
        &self,
        since: &str,
        limit: usize,
        latest_only: bool,
    ) -> LayerResult<Box<dyn EntityIterator>> {
        let request = ReadRequest::changes(
            since,
            limit,
            latest_only,
            self.source.change_detection.clone(),
            self.source.on_unit_error,
        )?;
        self.read(request)
    }

    fn entities(&self, from: &str, limit: usize) -> LayerResult<Box<dyn EntityIterator>> {
        self.read(ReadRequest::entities(from, limit, self.source.on_unit_error)?)
    }

    fn begin_full_sync(&self) -> LayerResult<()> {
        let mut staging = self.staging.lock();
        if staging.is_some() {
            return Err(LayerError::full_sync(format!(
                "dataset {:?} already has a full sync in progress",
                self.name
            )));
        }
        self.new_unit_name()?;
        let (path, writer) = self.create_hidden("fullsync")?;
        info!(dataset = %self.name, staging = %path.display(), "full sync started");
        *staging = Some(Staging {
            path,
            writer,
            items: 0,
        });
        Ok(())
    }

    fn complete_full_sync(&self) -> LayerResult<()> {
        let mut guard = self.staging.lock();
        let Some(mut staging) = guard.take() else {
            return Err(LayerError::full_sync(format!(
                "dataset {:?} has no full sync in progress",
                self.name
            )));
        };

        let prepared = staging
            .writer
            .finish()
            .map_err(LayerError::from)
            .and_then(|()| self.new_unit_name())
            .and_then(|name| Ok((name, self.units()?)));
        let (name, previous) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                let _ = fs::remove_file(&staging.path);
                return Err(e);
            }
        };

        // Publish first, then retire the old units: readers never see an
        // empty dataset.
        fs::rename(&staging.path, self.source.path.join(&name))?;
        let leftover = retire_units(&self.source.path, &previous);
        info!(
            dataset = %self.name,
            unit = %name,
            items = staging.items,
            retired = previous.len() - leftover.len(),
            leftover = leftover.len(),
            "full sync completed"
        );
        Ok(())
    }

    fn cancel_full_sync(&self) -> LayerResult<()> {
        let Some(mut staging) = self.staging.lock().take() else {
            return Err(LayerError::full_sync(format!(
                "dataset {:?} has no full sync in progress",
                self.name
            )));
        };
        let _ = staging.writer.finish();
        fs::remove_file(&staging.path)?;
        info!(dataset = %self.name, discarded = staging.items, "full sync cancelled");
        Ok(())
    }

    fn write(&self, item: Item) -> LayerResult<()> {
        let mut staging = self.staging.lock();
        match staging.as_mut() {
            Some(staging) => {
                staging.writer.write(item.record())?;
                staging.items += 1;
                Ok(())
            }
            None => self.append_unit(&item),
        }
    }

    fn write_entity(&self, entity: &Entity) -> LayerResult<()> {
        let item = self.mappings.incoming()?.entity_to_item(entity)?;
        self.write(item)
    }
}

impl Drop for FileSystemDataset {
    fn drop(&mut self) {
        if let Some(mut staging) = self.staging.get_mut().take() {
            let _ = staging.writer.finish();
            let _ = fs::remove_file(&staging.path);
        }
    }
}

/// Opens unit files with the dataset's codec.
#[derive(Debug, Clone)]
pub struct FileUnitOpener {
    root: PathBuf,
    codec: CodecConfig,
}

impl FileUnitOpener {
    /// Opener for units under `root`.
    pub fn new(root: impl Into<PathBuf>, codec: CodecConfig) -> Self {
        Self {
            root: root.into(),
            codec,
        }
    }
}

impl UnitOpener for FileUnitOpener {
    fn open(&self, unit: &SourceUnit) -> LayerResult<Box<dyn ItemIterator>> {
        let path = self.root.join(&unit.name);
        let file = File::open(&path).map_err(|e| {
            LayerError::unit_read(&unit.name, format!("cannot open {}: {e}", path.display()), None)
        })?;
        let reader = new_item_reader(&self.codec, Box::new(BufReader::new(file)));
        Ok(Box::new(ReaderItemIterator::new(unit.name.clone(), reader)))
    }
}

/// Removes the files of `units` from `dir`, returning the names that could
/// not be removed.
///
/// Once the replacement unit is published a failed removal no longer undoes
/// the sync; the file is left behind and reported.
fn retire_units(dir: &Path, units: &[SourceUnit]) -> Vec<String> {
    let mut leftover = Vec::new();
    for unit in units {
        match fs::remove_file(dir.join(&unit.name)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(unit = %unit.name, error = %e, "failed to remove replaced unit");
                leftover.push(unit.name.clone());
            }
        }
    }
    leftover
}
