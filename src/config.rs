//! Analyzer options
//!
//! Every option has a default, so a JSON file only needs the fields it
//! changes:
//!
//! ```json
//! { "max_block_visits": 2, "worklist": "bfs", "checkers": ["unix.Malloc"] }
//! ```
//!
//! Options are checked by [`AnalyzerOptions::validate`] before an analysis
//! starts.

use crate::checkers::BUILTIN_CHECKERS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value {value} for option '{field}': {hint}")]
    Range {
        field: &'static str,
        value: String,
        hint: &'static str,
    },

    #[error("Unknown checker '{0}'")]
    UnknownChecker(String),
}

/// What happens to a path that reaches a block too many times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopExhaustion {
    /// Stop the path
    Sink,
    /// Forget what the loop may have changed and take one more pass
    Widen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkListKind {
    Dfs,
    Bfs,
}

/// How much control flow a path diagnostic spells out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathScheme {
    Minimal,
    Extensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Region,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerOptions {
    /// Times one path may enter the same block
    pub max_block_visits: u32,
    /// Exploded graph nodes per top-level function
    pub max_nodes: usize,
    /// Wall-clock budget per top-level function
    pub timeout_ms: Option<u64>,
    pub loop_exhaustion: LoopExhaustion,
    pub worklist: WorkListKind,
    pub path_scheme: PathScheme,
    pub inline_calls: bool,
    /// Deepest inlined frame, counting the top-level frame as zero
    pub max_inline_depth: u32,
    pub store: StoreKind,
    pub invalidate_globals_on_call: bool,
    /// Analyze top-level functions on the rayon thread pool
    pub parallel: bool,
    pub checkers: Vec<String>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            max_block_visits: 4,
            max_nodes: 150_000,
            timeout_ms: None,
            loop_exhaustion: LoopExhaustion::Widen,
            worklist: WorkListKind::Dfs,
            path_scheme: PathScheme::Extensive,
            inline_calls: true,
            max_inline_depth: 4,
            store: StoreKind::Region,
            invalidate_globals_on_call: true,
            parallel: false,
            checkers: BUILTIN_CHECKERS.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl AnalyzerOptions {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: AnalyzerOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_block_visits == 0 {
            return Err(ConfigError::Range {
                field: "max_block_visits",
                value: self.max_block_visits.to_string(),
                hint: "every block must be enterable at least once",
            });
        }
        if self.max_nodes == 0 {
            return Err(ConfigError::Range {
                field: "max_nodes",
                value: self.max_nodes.to_string(),
                hint: "the node budget must be positive",
            });
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Range {
                field: "timeout_ms",
                value: "0".to_string(),
                hint: "omit the option for no timeout",
            });
        }
        if self.max_inline_depth > 64 {
            return Err(ConfigError::Range {
                field: "max_inline_depth",
                value: self.max_inline_depth.to_string(),
                hint: "at most 64 nested frames",
            });
        }
        if let Some(unknown) = self.checkers.iter().find(|name| !BUILTIN_CHECKERS.contains(&name.as_str())) {
            return Err(ConfigError::UnknownChecker(unknown.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = AnalyzerOptions::from_json_str(r#"{ "max_block_visits": 2, "worklist": "bfs" }"#).unwrap();
        assert_eq!(options.max_block_visits, 2);
        assert_eq!(options.worklist, WorkListKind::Bfs);
        assert_eq!(options.max_nodes, 150_000);
        assert_eq!(options.loop_exhaustion, LoopExhaustion::Widen);
        assert_eq!(options.checkers.len(), BUILTIN_CHECKERS.len());
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        assert!(matches!(
            AnalyzerOptions::from_json_str(r#"{ "max_block_visits": 0 }"#),
            Err(ConfigError::Range { field: "max_block_visits", .. })
        ));
        assert!(matches!(
            AnalyzerOptions::from_json_str(r#"{ "checkers": ["core.Nope"] }"#),
            Err(ConfigError::UnknownChecker(name)) if name == "core.Nope"
        ));
        assert!(matches!(
            AnalyzerOptions::from_json_str(r#"{ "store": "sparse" }"#),
            Err(ConfigError::Json(_))
        ));
    }
}
