//! In-memory repository for server configurations.

use crate::tool_server::{
    domain::{ServerConfig, ServerId, TemplateId},
    ports::{ServerConfigRepository, ServerConfigRepositoryError, ServerConfigRepositoryResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory server configuration repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServerConfigRepository {
    state: Arc<RwLock<RepositoryState>>,
}

#[derive(Debug, Default)]
struct RepositoryState {
    servers: HashMap<ServerId, ServerConfig>,
    template_index: HashMap<TemplateId, ServerId>,
}

impl InMemoryServerConfigRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl std::fmt::Display) -> ServerConfigRepositoryError {
    ServerConfigRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl ServerConfigRepository for InMemoryServerConfigRepository {
    async fn insert(&self, config: &ServerConfig) -> ServerConfigRepositoryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;

        if state.servers.contains_key(&config.id()) {
            return Err(ServerConfigRepositoryError::DuplicateServer(config.id()));
        }
        if let Some(template_id) = config.template_id() {
            if state.template_index.contains_key(template_id) {
                return Err(ServerConfigRepositoryError::DuplicateTemplate(
                    template_id.clone(),
                ));
            }
            state.template_index.insert(template_id.clone(), config.id());
        }

        state.servers.insert(config.id(), config.clone());
        Ok(())
    }

    async fn update(&self, config: &ServerConfig) -> ServerConfigRepositoryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;

        let stored_template = state
            .servers
            .get(&config.id())
            .ok_or(ServerConfigRepositoryError::NotFound(config.id()))?
            .template_id()
            .cloned();

        if stored_template.as_ref() != config.template_id() {
            if let Some(template_id) = config.template_id()
                && let Some(&indexed) = state.template_index.get(template_id)
                && indexed != config.id()
            {
                return Err(ServerConfigRepositoryError::DuplicateTemplate(
                    template_id.clone(),
                ));
            }
            if let Some(previous) = stored_template {
                state.template_index.remove(&previous);
            }
            if let Some(template_id) = config.template_id() {
                state.template_index.insert(template_id.clone(), config.id());
            }
        }

        state.servers.insert(config.id(), config.clone());
        Ok(())
    }

    async fn remove(&self, server_id: ServerId) -> ServerConfigRepositoryResult<bool> {
        let mut state = self.state.write().map_err(lock_error)?;
        let Some(removed) = state.servers.remove(&server_id) else {
            return Ok(false);
        };
        if let Some(template_id) = removed.template_id() {
            state.template_index.remove(template_id);
        }
        Ok(true)
    }

    async fn find_by_id(
        &self,
        server_id: ServerId,
    ) -> ServerConfigRepositoryResult<Option<ServerConfig>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.servers.get(&server_id).cloned())
    }

    async fn find_by_template(
        &self,
        template_id: &TemplateId,
    ) -> ServerConfigRepositoryResult<Option<ServerConfig>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state
            .template_index
            .get(template_id)
            .and_then(|server_id| state.servers.get(server_id))
            .cloned())
    }

    async fn list_all(&self) -> ServerConfigRepositoryResult<Vec<ServerConfig>> {
        let state = self.state.read().map_err(lock_error)?;
        let mut configs: Vec<ServerConfig> = state.servers.values().cloned().collect();
        configs.sort_by_key(ServerConfig::created_at);
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_server::domain::{ServerName, TransportConfig};
    use mockable::DefaultClock;
    use rstest::{fixture, rstest};

    #[fixture]
    fn repository() -> InMemoryServerConfigRepository {
        InMemoryServerConfigRepository::new()
    }

    fn config(name: &str, template: Option<&str>) -> ServerConfig {
        let base = ServerConfig::new(
            ServerName::new(name).expect("valid name"),
            TransportConfig::process("tool-server").expect("valid transport"),
            &DefaultClock,
        );
        match template {
            Some(id) => base.with_template(TemplateId::new(id).expect("valid template id")),
            None => base,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn insert_then_find(repository: InMemoryServerConfigRepository) {
        let stored = config("files", None);
        repository.insert(&stored).await.expect("insert");

        let found = repository
            .find_by_id(stored.id())
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(found, stored);
    }

    #[rstest]
    #[tokio::test]
    async fn second_install_of_template_is_rejected(repository: InMemoryServerConfigRepository) {
        repository
            .insert(&config("first", Some("github")))
            .await
            .expect("first insert");

        let result = repository.insert(&config("second", Some("github"))).await;

        assert!(matches!(
            result,
            Err(ServerConfigRepositoryError::DuplicateTemplate(ref id)) if id.as_str() == "github"
        ));
        assert_eq!(repository.list_all().await.expect("list").len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn remove_releases_template(repository: InMemoryServerConfigRepository) {
        let first = config("first", Some("github"));
        repository.insert(&first).await.expect("insert");

        assert!(repository.remove(first.id()).await.expect("remove"));
        assert!(!repository.remove(first.id()).await.expect("second remove"));
        repository
            .insert(&config("again", Some("github")))
            .await
            .expect("template free again");
    }

    #[rstest]
    #[tokio::test]
    async fn update_of_unknown_server_fails(repository: InMemoryServerConfigRepository) {
        let result = repository.update(&config("ghost", None)).await;
        assert!(matches!(result, Err(ServerConfigRepositoryError::NotFound(_))));
    }
}
