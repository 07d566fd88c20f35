//! Immutable build environment record
//!
//! The only process-wide setting the pipeline changes is the executable search
//! path. Instead of mutating it, each step receives a `BuildEnvironment` and the
//! dependency manager step derives a new record with the install directory
//! prepended. Later steps and the launched container inherit that record as-is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PATH_VAR: &str = "PATH";

/// Search path of the Debian/Alpine base images when the image declares none
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildEnvironment {
    vars: BTreeMap<String, String>,
}

impl BuildEnvironment {
    /// Seeds the record from an image config's `KEY=value` list.
    pub fn from_image_env(entries: &[String]) -> Self {
        let mut vars = BTreeMap::new();
        for entry in entries {
            match entry.split_once('=') {
                Some((key, value)) => {
                    vars.insert(key.to_string(), value.to_string());
                }
                None => {
                    vars.insert(entry.clone(), String::new());
                }
            }
        }
        vars.entry(PATH_VAR.to_string())
            .or_insert_with(|| DEFAULT_PATH.to_string());
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn path(&self) -> &str {
        self.get(PATH_VAR).unwrap_or(DEFAULT_PATH)
    }

    /// Returns a new record whose PATH starts with `dir`.
    ///
    /// Prepending a directory that already leads the path is a no-op.
    pub fn with_path_prepended(&self, dir: &str) -> Self {
        let current = self.path();
        let path = if current.split(':').next() == Some(dir) {
            current.to_string()
        } else if current.is_empty() {
            dir.to_string()
        } else {
            format!("{}:{}", dir, current)
        };
        let mut vars = self.vars.clone();
        vars.insert(PATH_VAR.to_string(), path);
        Self { vars }
    }

    /// `KEY=value` entries in key order, as expected by container configs.
    pub fn to_env_list(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
