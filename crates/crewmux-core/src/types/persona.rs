use serde::{Deserialize, Serialize};

/// Optional persona attached to an agent: capability tags plus the file
/// patterns the agent prefers to work in. Used only for scoring bonuses;
/// an agent without a profile still receives work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PersonaProfile {
    pub name: String,
    /// Capability tags, e.g. "testing", "architecture", "bugs".
    #[serde(default)]
    pub tags: Vec<String>,
    /// Glob patterns for files this persona focuses on, e.g. "src/**/*.rs".
    #[serde(default)]
    pub focus_patterns: Vec<String>,
}

impl PersonaProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            focus_patterns: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_focus_patterns(mut self, patterns: &[&str]) -> Self {
        self.focus_patterns = patterns.iter().map(|s| s.to_string()).collect();
        self
    }
}
