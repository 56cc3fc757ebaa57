use regex::Regex;

use crate::config::TopicsConfig;
use crate::error::{HubError, Result};

/// Validates topic identifiers against the configured pattern.
/// Called before every registry lookup/creation and before every emission;
/// has no side effects.
#[derive(Debug)]
pub struct TopicValidator {
    pattern: Regex,
}

impl TopicValidator {
    /// Create a validator, compiling the configured pattern once
    pub fn new(config: &TopicsConfig) -> Result<Self> {
        let pattern = Regex::new(&config.pattern).map_err(|e| {
            HubError::internal(format!("Invalid topic pattern '{}': {e}", config.pattern))
        })?;
        Ok(Self { pattern })
    }

    /// Validate a topic identifier
    pub fn validate(&self, topic: &str) -> Result<()> {
        if topic.trim().is_empty() {
            return Err(HubError::invalid_topic(
                topic,
                "Topic must not be blank",
            ));
        }
        if !self.pattern.is_match(topic) {
            return Err(HubError::invalid_topic(
                topic,
                format!(
                    "Topic contains illegal characters; allowed pattern: {}",
                    self.pattern.as_str()
                ),
            ));
        }
        Ok(())
    }
}
