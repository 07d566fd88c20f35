//! Container image references (`registry/repository[:tag][@digest]`)

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Tag that always floats to the newest upstream build
pub const FLOATING_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("Image reference cannot be empty")]
    Empty,

    #[error("Invalid repository '{0}'")]
    InvalidRepository(String),

    #[error("Invalid tag '{0}'")]
    InvalidTag(String),

    #[error("Invalid digest '{0}' (expected sha256:<64 hex chars>)")]
    InvalidDigest(String),
}

/// A parsed image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

fn repository_regex() -> &'static Regex {
    static REPOSITORY_REGEX: OnceLock<Regex> = OnceLock::new();
    REPOSITORY_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9._\-/:]*[a-z0-9])?$").expect("Invalid repository regex")
    })
}

fn tag_regex() -> &'static Regex {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    TAG_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]{0,127}$").expect("Invalid tag regex")
    })
}

fn digest_regex() -> &'static Regex {
    static DIGEST_REGEX: OnceLock<Regex> = OnceLock::new();
    DIGEST_REGEX.get_or_init(|| Regex::new(r"^sha256:[a-f0-9]{64}$").expect("Invalid digest regex"))
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: Some(tag.into()),
            digest: None,
        }
    }

    /// A reference is pinned when it names a digest or an explicit, non-floating tag.
    pub fn is_pinned(&self) -> bool {
        if self.digest.is_some() {
            return true;
        }
        match self.tag.as_deref() {
            Some(tag) => !tag.is_empty() && tag != FLOATING_TAG,
            None => false,
        }
    }

    /// The value passed as the `tag` of a pull request: the digest wins over the tag.
    pub fn pull_tag(&self) -> String {
        self.digest
            .clone()
            .or_else(|| self.tag.clone())
            .unwrap_or_else(|| FLOATING_TAG.to_string())
    }
}

impl FromStr for ImageReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (name, digest) = match s.split_once('@') {
            Some((name, digest)) => {
                if !digest_regex().is_match(digest) {
                    return Err(ReferenceError::InvalidDigest(digest.to_string()));
                }
                (name, Some(digest.to_string()))
            }
            None => (s, None),
        };

        // A colon after the last slash separates the tag; earlier colons belong to a registry port.
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };

        if !repository_regex().is_match(repository) {
            return Err(ReferenceError::InvalidRepository(repository.to_string()));
        }
        if let Some(ref tag) = tag {
            if !tag_regex().is_match(tag) {
                return Err(ReferenceError::InvalidTag(tag.clone()));
            }
        }

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
