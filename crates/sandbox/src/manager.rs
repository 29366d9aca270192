//! Session-indexed sandbox handle cache.
//!
//! Handles are exclusive to a session: `get` returns the same handle
//! for a given id until `destroy` invalidates it. Provisioning proper
//! (container creation) is an external collaborator; in fixed-address
//! mode the manager hands out connections to a long-lived sandbox.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use fm_domain::config::SandboxConfig;
use fm_domain::{Error, Result};

use crate::{HttpSandbox, Sandbox};

pub struct SandboxManager {
    config: SandboxConfig,
    handles: RwLock<HashMap<String, Arc<dyn Sandbox>>>,
}

impl SandboxManager {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Acquire a fresh sandbox for a session.
    pub async fn create(&self) -> Result<Arc<dyn Sandbox>> {
        let address = self.config.address.as_deref().ok_or_else(|| {
            Error::Sandbox(
                "no SANDBOX_ADDRESS configured; sandbox provisioning is \
                 delegated to the deployment"
                    .into(),
            )
        })?;

        let prefix = self.config.name_prefix.as_deref().unwrap_or("sandbox");
        let id = format!("{prefix}-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let handle: Arc<dyn Sandbox> = Arc::new(HttpSandbox::connect(address, id.clone())?);

        self.handles.write().insert(id.clone(), handle.clone());
        tracing::info!(sandbox_id = %id, address, "sandbox acquired");
        Ok(handle)
    }

    /// Look up a cached handle, reconnecting in fixed-address mode when
    /// the process restarted since the session last ran.
    pub async fn get(&self, sandbox_id: &str) -> Result<Arc<dyn Sandbox>> {
        if let Some(handle) = self.handles.read().get(sandbox_id) {
            return Ok(handle.clone());
        }

        let address = self
            .config
            .address
            .as_deref()
            .ok_or_else(|| Error::not_found(format!("sandbox not found: {sandbox_id}")))?;
        let handle: Arc<dyn Sandbox> = Arc::new(HttpSandbox::connect(address, sandbox_id)?);
        self.handles
            .write()
            .insert(sandbox_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Tear down one sandbox and invalidate its cache entry. Idempotent.
    pub async fn destroy(&self, sandbox_id: &str) -> Result<()> {
        let handle = self.handles.write().remove(sandbox_id);
        if let Some(handle) = handle {
            handle.destroy().await?;
            tracing::info!(sandbox_id, "sandbox destroyed");
        }
        Ok(())
    }

    /// Tear down every cached sandbox (process shutdown).
    pub async fn destroy_all(&self) {
        let handles: Vec<Arc<dyn Sandbox>> = {
            let mut map = self.handles.write();
            map.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            if let Err(e) = handle.destroy().await {
                tracing::warn!(sandbox_id = %handle.id(), error = %e, "sandbox teardown failed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_address_config() -> SandboxConfig {
        SandboxConfig {
            address: Some("127.0.0.1".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_requires_an_address() {
        let manager = SandboxManager::new(SandboxConfig::default());
        let err = match manager.create().await {
            Err(err) => err,
            Ok(_) => panic!("expected create to fail"),
        };
        assert!(matches!(err, Error::Sandbox(_)));
    }

    #[tokio::test]
    async fn get_returns_same_handle_within_lifetime() {
        let manager = SandboxManager::new(fixed_address_config());
        let created = manager.create().await.unwrap();
        let fetched = manager.get(created.id()).await.unwrap();
        assert!(Arc::ptr_eq(&created, &fetched));
    }

    #[tokio::test]
    async fn destroy_invalidates_the_cache() {
        let manager = SandboxManager::new(fixed_address_config());
        let created = manager.create().await.unwrap();
        let id = created.id().to_string();

        manager.destroy(&id).await.unwrap();
        assert!(manager.is_empty());

        // Fixed-address mode reconnects; the handle is a new one.
        let again = manager.get(&id).await.unwrap();
        assert!(!Arc::ptr_eq(&created, &again));

        // Destroy is idempotent.
        manager.destroy(&id).await.unwrap();
        manager.destroy(&id).await.unwrap();
    }

    #[tokio::test]
    async fn get_unknown_without_address_is_not_found() {
        let manager = SandboxManager::new(SandboxConfig::default());
        let err = match manager.get("ghost").await {
            Err(err) => err,
            Ok(_) => panic!("expected get to fail"),
        };
        assert_eq!(err.kind(), fm_domain::ErrorKind::NotFound);
    }
}
