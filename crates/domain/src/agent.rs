use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::memory::Memory;

/// Per-session LLM configuration record plus the role-keyed memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// role name ("planner", "execution") → conversation memory.
    #[serde(default)]
    pub memories: HashMap<String, Memory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(model_name: impl Into<String>, temperature: f32, max_tokens: u32) -> Result<Self> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(Error::bad_input(format!(
                "temperature must be between 0 and 1, got {temperature}"
            )));
        }
        if max_tokens == 0 {
            return Err(Error::bad_input("max_tokens must be positive"));
        }
        let now = Utc::now();
        Ok(Self {
            id: crate::short_id(),
            model_name: model_name.into(),
            temperature,
            max_tokens,
            memories: HashMap::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(AgentRecord::new("m", 1.5, 100).is_err());
        assert!(AgentRecord::new("m", -0.1, 100).is_err());
        assert!(AgentRecord::new("m", 0.7, 100).is_ok());
    }

    #[test]
    fn rejects_zero_max_tokens() {
        assert!(AgentRecord::new("m", 0.5, 0).is_err());
    }
}
