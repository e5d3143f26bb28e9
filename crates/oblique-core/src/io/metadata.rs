use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ObliqueError, Result};

/// Parse sidecar metadata text of `key: value` lines into a map.
///
/// Keys and values are trimmed and the value is everything after the first
/// `": "`. Whitespace-only lines are skipped and a repeated key keeps its last
/// value. Any other line without the separator fails the whole parse.
pub fn parse_metadata(text: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) =
            line.split_once(": ")
                .ok_or_else(|| ObliqueError::MalformedMetadata {
                    line_number: index + 1,
                    line: line.to_string(),
                })?;
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

/// Read and parse a metadata file.
pub fn load_metadata(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path)?;
    parse_metadata(&text)
}
