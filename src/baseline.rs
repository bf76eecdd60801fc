//! Stored query texts referenced by `baseline:<name>` directives.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, TagbooruError};

pub trait Baselines: Send + Sync {
    /// Raw text of the baseline query called `name`.
    fn read(&self, name: &str) -> Result<String>;
}

/// One file per baseline, named after it, in a single directory.
#[derive(Debug, Clone)]
pub struct BaselineDirectory {
    root: PathBuf,
}

impl BaselineDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(TagbooruError::Baseline(format!("invalid baseline name {name:?}")));
    }
    Ok(())
}

impl Baselines for BaselineDirectory {
    fn read(&self, name: &str) -> Result<String> {
        validate_name(name)?;
        match std::fs::read_to_string(self.root.join(name)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(TagbooruError::BaselineNotFound(name.to_string()))
            }
            Err(e) => Err(TagbooruError::Baseline(format!("{name}: {e}"))),
        }
    }
}
