// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Messages published to the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value or metadata entry for one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    /// Host path.
    pub path: String,
    /// Value, or metadata object.
    pub value: Value,
}

impl PathValue {
    /// Creates an entry.
    #[must_use]
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// One update block of a delta.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Update {
    /// Current values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<PathValue>,
    /// Descriptive metadata.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<PathValue>,
}

/// A delta message: `{"updates": [{"values": [...]}]}` or
/// `{"updates": [{"meta": [...]}]}`.
///
/// # Examples
///
/// ```
/// use ewelink_bridge::state::{Delta, PathValue};
/// use serde_json::json;
///
/// let delta = Delta::values(vec![PathValue::new("electrical.switches.deck.state", 1)]);
/// assert_eq!(
///     serde_json::to_value(&delta).unwrap(),
///     json!({ "updates": [{ "values": [{ "path": "electrical.switches.deck.state", "value": 1 }] }] })
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Delta {
    /// Update blocks.
    pub updates: Vec<Update>,
}

impl Delta {
    /// Creates a value delta.
    #[must_use]
    pub fn values(values: Vec<PathValue>) -> Self {
        Self {
            updates: vec![Update {
                values,
                meta: Vec::new(),
            }],
        }
    }

    /// Creates a metadata delta.
    #[must_use]
    pub fn meta(meta: Vec<PathValue>) -> Self {
        Self {
            updates: vec![Update {
                values: Vec::new(),
                meta,
            }],
        }
    }

    /// Returns true if the delta carries only metadata.
    #[must_use]
    pub fn is_meta(&self) -> bool {
        self.updates
            .iter()
            .all(|u| u.values.is_empty() && !u.meta.is_empty())
    }

    /// Iterates over all value entries.
    pub fn iter_values(&self) -> impl Iterator<Item = &PathValue> {
        self.updates.iter().flat_map(|u| u.values.iter())
    }

    /// Iterates over all metadata entries.
    pub fn iter_meta(&self) -> impl Iterator<Item = &PathValue> {
        self.updates.iter().flat_map(|u| u.meta.iter())
    }

    /// Returns the value published for a path, if any.
    #[must_use]
    pub fn value_of(&self, path: &str) -> Option<&Value> {
        self.iter_values().find(|v| v.path == path).map(|v| &v.value)
    }
}
