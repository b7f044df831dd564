// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON cache files in the plugin data directory.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ParseError, Result};

/// Loads a JSON file.
///
/// Returns `None` if the file does not exist or cannot be parsed; the
/// failure is logged and the caller starts from an empty value.
#[must_use]
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No cache file");
        return None;
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => {
                tracing::debug!(path = %path.display(), "Loaded cache file");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt cache file");
                None
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read cache file");
            None
        }
    }
}

/// Writes a value as pretty-printed JSON, replacing the file.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized or the file cannot
/// be written.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(value).map_err(ParseError::from)?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Vec<u32>> = load_json(&dir.path().join("absent.json"));
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let loaded: Option<Vec<u32>> = load_json(&path);
        assert!(loaded.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("map.json");
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1u32);

        save_json(&path, &map).unwrap();
        let loaded: BTreeMap<String, u32> = load_json(&path).unwrap();
        assert_eq!(loaded, map);
    }
}
