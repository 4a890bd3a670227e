//! Canonical JSON writer.
//!
//! Every output byte must be a pure function of the seed and the input, so
//! all JSON goes through this module: object keys sorted, two-space indent,
//! LF line endings with a trailing LF, and floats rounded to four decimals.
//! JSONL lines are compact with sorted keys.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::ExportError;

/// Decimal places kept for floats.
pub const FLOAT_DECIMALS: i32 = 4;

/// Converts `value` to a JSON tree with sorted keys and rounded floats.
pub fn to_canonical_value<T: Serialize>(value: &T) -> Result<Value, ExportError> {
    let value = serde_json::to_value(value)?;
    Ok(canonicalize(value))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .and_then(|f| Number::from_f64(round_float(f)))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        other => other,
    }
}

/// Rounds to [`FLOAT_DECIMALS`] places; `-0.0` becomes `0.0`.
pub fn round_float(value: f64) -> f64 {
    let scale = 10f64.powi(FLOAT_DECIMALS);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Pretty canonical JSON document with a trailing newline.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ExportError> {
    let value = to_canonical_value(value)?;
    let mut bytes = serde_json::to_vec_pretty(&value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// One compact canonical JSON object per line.
pub fn to_canonical_jsonl<T: Serialize>(items: &[T]) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    for item in items {
        let value = to_canonical_value(item)?;
        serde_json::to_writer(&mut bytes, &value)?;
        bytes.push(b'\n');
    }
    Ok(bytes)
}

/// Parses JSONL bytes, skipping blank lines.
pub fn from_jsonl<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, ExportError> {
    let text =
        std::str::from_utf8(bytes).map_err(|e| ExportError::Serialization(e.to_string()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(ExportError::from))
        .collect()
}

/// Writes `bytes` to `path`, creating parent directories.
pub async fn write_bytes(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), ExportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Writes every `relative path -> bytes` entry under `out_dir`.
pub async fn write_outputs(
    out_dir: impl AsRef<Path>,
    outputs: &std::collections::BTreeMap<String, Vec<u8>>,
) -> Result<(), ExportError> {
    let out_dir = out_dir.as_ref();
    for (name, bytes) in outputs {
        write_bytes(out_dir.join(name), bytes).await?;
    }
    Ok(())
}

/// Reads and parses a JSON file.
pub async fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ExportError> {
    let path = path.as_ref();
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExportError::MissingArtifact(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}
