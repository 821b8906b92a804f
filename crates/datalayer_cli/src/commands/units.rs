//! Units command implementation.

use datalayer_core::{DatasetDescription, DatasetRegistry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// One dataset in the listing.
#[derive(Debug, Serialize)]
pub struct DatasetReport {
    /// Dataset summary.
    #[serde(flatten)]
    pub description: DatasetDescription,
    /// Adapter metadata (path, pattern, unit count, ...).
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Runs the units command for `dataset`, or every dataset when `None`.
pub fn run(
    registry: &DatasetRegistry,
    dataset: Option<&str>,
    format: &str,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let names = match dataset {
        Some(name) => vec![name.to_string()],
        None => registry.names(),
    };

    let mut reports = Vec::with_capacity(names.len());
    for name in names {
        let dataset = registry.dataset(&name)?;
        reports.push(DatasetReport {
            description: dataset.description(),
            metadata: dataset
                .metadata()
                .iter()
                .map(|(k, v)| (k.clone(), v.into()))
                .collect(),
        });
    }

    match format {
        "json" => writeln!(out, "{}", serde_json::to_string_pretty(&reports)?)?,
        _ => print_text(&reports, out)?,
    }
    Ok(())
}

fn print_text(reports: &[DatasetReport], out: &mut dyn Write) -> std::io::Result<()> {
    for report in reports {
        let d = &report.description;
        writeln!(out, "{} ({})", d.name, d.kind)?;
        writeln!(out, "  readable: {}, writable: {}", d.readable, d.writable)?;
        writeln!(out, "  change detection: {:?}", d.change_detection)?;
        for (key, value) in &report.metadata {
            writeln!(out, "  {key}: {value}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalayer_core::TransformRegistry;
    use datalayer_sources::configure_registry;
    use datalayer_testkit::prelude::*;

    #[test]
    fn lists_unit_counts() {
        let dir = TempDataDir::new();
        dir.write_unit("a.jsonl", &people("a", 2), at_minute(1));
        dir.write_unit("b.jsonl", &people("b", 1), at_minute(2));
        let registry = DatasetRegistry::new();
        configure_registry(
            &registry,
            &[dir.definition("people", "*.jsonl")],
            &TransformRegistry::new(),
        )
        .unwrap();

        let mut out = Vec::new();
        run(&registry, None, "json", &mut out).unwrap();
        let reports: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(reports[0]["name"], "people");
        assert_eq!(reports[0]["kind"], "filesystem");
        assert_eq!(reports[0]["metadata"]["units"], 2);

        let mut out = Vec::new();
        run(&registry, Some("people"), "text", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("people (filesystem)\n"));
        assert!(text.contains("  units: 2\n"));

        assert!(run(&registry, Some("orders"), "text", &mut Vec::new()).is_err());
    }
}
