use serde::{Deserialize, Serialize};

use crate::model::response::MinimumContentPolicy;

/// Read-only payload for one unit, supplied by the content collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitContent {
    pub title: String,
    pub prompt: String,
    pub reference: String,
    pub media_uri: Option<String>,
    pub key_points: Vec<String>,
    pub response_policy: MinimumContentPolicy,
}

impl UnitContent {
    /// Built-in stand-in used when the content collaborator cannot supply a unit.
    #[must_use]
    pub fn placeholder(unit_index: usize, response_policy: MinimumContentPolicy) -> Self {
        let number = unit_index + 1;
        Self {
            title: format!("Practice unit {number}"),
            prompt: format!("Explain the main idea of unit {number} in your own words."),
            reference: "Reference material is unavailable offline. Review your notes.".into(),
            media_uri: None,
            key_points: Vec::new(),
            response_policy,
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.media_uri.is_none() && self.key_points.is_empty()
    }
}
