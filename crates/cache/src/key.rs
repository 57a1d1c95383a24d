//! Preview keys: which rendering of which task.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which rendering of a task's output is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewVariant {
    /// The uploaded source document.
    Original,
    /// Translated-only output.
    Mono,
    /// Bilingual output, source and translation interleaved.
    Dual,
}

impl PreviewVariant {
    /// Every variant, in display order.
    pub const ALL: [PreviewVariant; 3] =
        [PreviewVariant::Original, PreviewVariant::Mono, PreviewVariant::Dual];

    /// Value used in the result endpoint's `mode` parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            PreviewVariant::Original => "original",
            PreviewVariant::Mono => "mono",
            PreviewVariant::Dual => "dual",
        }
    }
}

impl fmt::Display for PreviewVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from parsing a `task:variant` key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("unknown preview variant: {0}")]
    UnknownVariant(String),
    #[error("preview key must look like <task>:<variant>, got {0:?}")]
    Malformed(String),
}

impl FromStr for PreviewVariant {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" | "source" => Ok(PreviewVariant::Original),
            "mono" | "translated" => Ok(PreviewVariant::Mono),
            "dual" => Ok(PreviewVariant::Dual),
            other => Err(KeyParseError::UnknownVariant(other.to_string())),
        }
    }
}

/// Cache key: document identity plus rendering variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewKey {
    pub task_id: String,
    pub variant: PreviewVariant,
}

impl PreviewKey {
    /// Create a key for `task_id` in `variant`.
    pub fn new(task_id: impl Into<String>, variant: PreviewVariant) -> Self {
        Self { task_id: task_id.into(), variant }
    }
}

impl fmt::Display for PreviewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.task_id, self.variant)
    }
}

impl FromStr for PreviewKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (task_id, variant) =
            s.rsplit_once(':').ok_or_else(|| KeyParseError::Malformed(s.to_string()))?;
        if task_id.is_empty() {
            return Err(KeyParseError::Malformed(s.to_string()));
        }
        Ok(Self::new(task_id, variant.parse()?))
    }
}
