//! Agent store.
//!
//! Persists agent configuration records and their role-keyed memories
//! in `agents.json`. `save_memory` is a full replace, atomic with
//! respect to readers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use fm_domain::agent::AgentRecord;
use fm_domain::memory::Memory;
use fm_domain::{Error, Result};

pub struct AgentStore {
    agents_path: PathBuf,
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl AgentStore {
    /// Load or create the agent store at `state_path/agents.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;

        let agents_path = state_path.join("agents.json");
        let agents = if agents_path.exists() {
            let raw = std::fs::read_to_string(&agents_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            agents = agents.len(),
            path = %agents_path.display(),
            "agent store loaded"
        );

        Ok(Self {
            agents_path,
            agents: RwLock::new(agents),
        })
    }

    pub fn save(&self, agent: AgentRecord) {
        self.agents.write().insert(agent.id.clone(), agent);
    }

    pub fn find(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.read().get(agent_id).cloned()
    }

    /// The memory for `(agent_id, role_name)`, empty if none exists yet.
    pub fn get_memory(&self, agent_id: &str, role_name: &str) -> Memory {
        self.agents
            .read()
            .get(agent_id)
            .and_then(|a| a.memories.get(role_name))
            .cloned()
            .unwrap_or_default()
    }

    /// Full-replace the memory for `(agent_id, role_name)`.
    pub fn save_memory(&self, agent_id: &str, role_name: &str, memory: Memory) -> Result<()> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| Error::not_found(format!("agent not found: {agent_id}")))?;
        agent.memories.insert(role_name.to_string(), memory);
        agent.updated_at = Utc::now();
        Ok(())
    }

    pub fn delete(&self, agent_id: &str) -> bool {
        self.agents.write().remove(agent_id).is_some()
    }

    /// Snapshot the current state to disk.
    pub fn flush(&self) -> Result<()> {
        let agents = self.agents.read();
        let json = serde_json::to_string_pretty(&*agents)
            .map_err(|e| Error::Other(format!("serializing agents: {e}")))?;
        std::fs::write(&self.agents_path, json).map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fm_domain::message::ChatMessage;

    fn store() -> (tempfile::TempDir, AgentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_memory_is_empty() {
        let (_dir, store) = store();
        let agent = AgentRecord::new("model", 0.7, 2000).unwrap();
        let agent_id = agent.id.clone();
        store.save(agent);

        assert!(store.get_memory(&agent_id, "planner").is_empty());
        assert!(store.get_memory("ghost", "planner").is_empty());
    }

    #[test]
    fn save_memory_is_full_replace() {
        let (_dir, store) = store();
        let agent = AgentRecord::new("model", 0.7, 2000).unwrap();
        let agent_id = agent.id.clone();
        store.save(agent);

        let mut first = Memory::default();
        first.add_message(ChatMessage::system("prompt"));
        first.add_message(ChatMessage::user("one"));
        store.save_memory(&agent_id, "planner", first).unwrap();

        let mut second = Memory::default();
        second.add_message(ChatMessage::user("two"));
        store.save_memory(&agent_id, "planner", second).unwrap();

        let loaded = store.get_memory(&agent_id, "planner");
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].text(), "two");
    }

    #[test]
    fn memories_are_keyed_by_role() {
        let (_dir, store) = store();
        let agent = AgentRecord::new("model", 0.7, 2000).unwrap();
        let agent_id = agent.id.clone();
        store.save(agent);

        let mut planner = Memory::default();
        planner.add_message(ChatMessage::user("plan"));
        store.save_memory(&agent_id, "planner", planner).unwrap();

        assert!(store.get_memory(&agent_id, "execution").is_empty());
        assert_eq!(store.get_memory(&agent_id, "planner").messages.len(), 1);
    }

    #[test]
    fn save_memory_for_missing_agent_fails() {
        let (_dir, store) = store();
        let err = store
            .save_memory("ghost", "planner", Memory::default())
            .unwrap_err();
        assert_eq!(err.kind(), fm_domain::ErrorKind::NotFound);
    }

    #[test]
    fn flush_and_reload_preserves_memories() {
        let dir = tempfile::tempdir().unwrap();
        let agent_id = {
            let store = AgentStore::new(dir.path()).unwrap();
            let agent = AgentRecord::new("model", 0.5, 1000).unwrap();
            let agent_id = agent.id.clone();
            store.save(agent);
            let mut memory = Memory::default();
            memory.add_message(ChatMessage::assistant("kept"));
            store.save_memory(&agent_id, "execution", memory).unwrap();
            store.flush().unwrap();
            agent_id
        };

        let reloaded = AgentStore::new(dir.path()).unwrap();
        let memory = reloaded.get_memory(&agent_id, "execution");
        assert_eq!(memory.messages[0].text(), "kept");
    }
}
