//! JSON record files.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value};

/// Read a JSON array of flat objects.
pub fn read_records(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let Value::Array(items) = value else {
        bail!("{} must contain a JSON array of records", path.display());
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(object) => Ok(object),
            other => Err(anyhow!("{}: record {i} is not an object: {other}", path.display())),
        })
        .collect()
}

/// Write records as a pretty-printed JSON array, creating parent directories.
pub fn write_records(path: &Path, records: Vec<Map<String, Value>>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let array = Value::Array(records.into_iter().map(Value::Object).collect());
    std::fs::write(path, serde_json::to_string_pretty(&array)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
