//! Tunables for the editing-tree core.
//!
//! Attribute names and marker values are fixed (see [`crate::types`]); this
//! only carries the knobs that vary between hosts and rendering environments.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::Result;
use crate::text::WhitespacePolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Pixel slack when comparing caret tops/bottoms against the first/last line.
    pub caret_tolerance: f64,
    /// Hard cap on geometric search probes.
    pub max_locate_iterations: usize,
    /// Delay before a scheduled highlight refresh fires.
    pub refresh_delay_ms: u64,
    /// Whitespace handling for the extracted stream.
    pub whitespace: WhitespacePolicy,
    /// Inline wrappers a selection anchor hops out of when sitting on their edge.
    pub inline_formatting_tags: Vec<SmolStr>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            caret_tolerance: 2.0,
            max_locate_iterations: 20,
            refresh_delay_ms: 250,
            whitespace: WhitespacePolicy::Preserve,
            inline_formatting_tags: [
                "b", "strong", "i", "em", "u", "s", "strike", "del", "sub", "sup", "code", "a",
            ]
            .into_iter()
            .map(SmolStr::new_static)
            .collect(),
        }
    }
}

impl OverlayConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn is_inline_formatting(&self, tag: &str) -> bool {
        self.inline_formatting_tags
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OverlayError;

    #[test]
    fn test_defaults() {
        let config = OverlayConfig::default();
        assert_eq!(config.max_locate_iterations, 20);
        assert_eq!(config.refresh_delay(), Duration::from_millis(250));
        assert!(config.is_inline_formatting("STRONG"));
        assert!(!config.is_inline_formatting("div"));
    }

    #[test]
    fn test_partial_json() {
        let config =
            OverlayConfig::from_json(r#"{ "caret_tolerance": 0.5, "whitespace": "normalize" }"#)
                .unwrap();
        assert_eq!(config.caret_tolerance, 0.5);
        assert_eq!(config.whitespace, WhitespacePolicy::Normalize);
        assert_eq!(config.max_locate_iterations, 20);
    }

    #[test]
    fn test_bad_json() {
        let err = OverlayConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, OverlayError::Config(_)));
        assert!(!err.is_recoverable());
    }
}
