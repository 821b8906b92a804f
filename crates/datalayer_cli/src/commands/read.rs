//! Changes and entities command implementation.

use datalayer_core::{ContinuationToken, Dataset, EntityIterator, LayerError};
use std::io::Write;
use tracing::{info, warn};

/// What to read from a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadMode {
    /// Entities changed after `since`.
    Changes {
        /// Since value: empty, timestamp, marker or token.
        since: String,
        /// Maximum number of entities, 0 for no limit.
        limit: usize,
        /// Keep only the last version of each entity.
        latest_only: bool,
    },
    /// All entities, optionally resuming from a token.
    Entities {
        /// Token to resume from, or empty.
        from: String,
        /// Maximum number of entities, 0 for no limit.
        limit: usize,
    },
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSummary {
    /// Entities printed.
    pub entities: u64,
    /// Items skipped because they failed to map.
    pub skipped: u64,
    /// Token to continue from.
    pub token: Option<ContinuationToken>,
}

/// Reads `dataset` and prints each entity as one JSON line to `out`.
pub fn run(
    dataset: &dyn Dataset,
    mode: &ReadMode,
    out: &mut dyn Write,
) -> Result<ReadSummary, Box<dyn std::error::Error>> {
    let mut iter = match mode {
        ReadMode::Changes {
            since,
            limit,
            latest_only,
        } => dataset.changes(since, *limit, *latest_only)?,
        ReadMode::Entities { from, limit } => dataset.entities(from, *limit)?,
    };

    let mut entities = 0;
    let printed = print_entities(&mut *iter, out, &mut entities);
    let summary = ReadSummary {
        entities,
        skipped: iter.skipped(),
        token: iter.token(),
    };
    iter.close()?;
    if let Err(e) = printed {
        let last = e
            .downcast_ref::<LayerError>()
            .and_then(LayerError::last_token);
        if let Some(token) = last {
            warn!(
                dataset = dataset.name(),
                token = %token.encode(),
                "read failed, resume from token"
            );
        }
        return Err(e);
    }

    info!(
        dataset = dataset.name(),
        entities = summary.entities,
        skipped = summary.skipped,
        token = %summary.token.as_ref().map(ContinuationToken::encode).unwrap_or_default(),
        "read complete"
    );
    Ok(summary)
}

fn print_entities(
    iter: &mut dyn EntityIterator,
    out: &mut dyn Write,
    count: &mut u64,
) -> Result<(), Box<dyn std::error::Error>> {
    while let Some(entity) = iter.next_entity()? {
        serde_json::to_writer(&mut *out, &entity)?;
        writeln!(out)?;
        *count += 1;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalayer_core::TransformRegistry;
    use datalayer_sources::FileSystemDataset;
    use datalayer_testkit::prelude::*;

    fn dataset(dir: &TempDataDir) -> FileSystemDataset {
        FileSystemDataset::new(&dir.definition("people", "*.jsonl"), &TransformRegistry::new())
            .unwrap()
    }

    fn printed_ids(out: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(out)
            .lines()
            .map(|line| {
                let entity: serde_json::Value = serde_json::from_str(line).unwrap();
                entity["id"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn prints_json_lines_and_returns_token() {
        let dir = TempDataDir::new();
        dir.write_unit("a.jsonl", &people("a", 3), at_minute(1));
        let ds = dataset(&dir);

        let mut out = Vec::new();
        let mode = ReadMode::Changes {
            since: String::new(),
            limit: 2,
            latest_only: false,
        };
        let summary = run(&ds, &mode, &mut out).unwrap();
        assert_eq!(printed_ids(&out), ["a0", "a1"]);
        assert_eq!(summary.entities, 2);

        let mut out = Vec::new();
        let mode = ReadMode::Entities {
            from: summary.token.unwrap().encode(),
            limit: 0,
        };
        run(&ds, &mode, &mut out).unwrap();
        assert_eq!(printed_ids(&out), ["a2"]);
    }

    #[test]
    fn read_errors_propagate() {
        let dir = TempDataDir::new();
        dir.write_raw("a.jsonl", b"oops\n", at_minute(1));
        let ds = dataset(&dir);

        let mode = ReadMode::Entities {
            from: String::new(),
            limit: 0,
        };
        assert!(run(&ds, &mode, &mut Vec::new()).is_err());

        let mode = ReadMode::Changes {
            since: "yesterday".into(),
            limit: 0,
            latest_only: false,
        };
        assert!(run(&ds, &mode, &mut Vec::new()).is_err());
    }
}
