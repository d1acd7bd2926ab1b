//! Model registry.
//!
//! Holds the fast/full client pair and rebuilds both when the client pushes
//! new credentials via `auth_sync`, so the next call is bound to the fresh
//! token. Tool bindings survive a rebuild.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use voco_domain::config::LlmConfig;
use voco_domain::error::Result;
use voco_domain::model::ModelTag;
use voco_domain::tool::ToolDefinition;

use crate::anthropic::AnthropicModel;
use crate::traits::{ChatModel, ModelSource};

pub struct ModelRegistry {
    config: LlmConfig,
    clients: RwLock<HashMap<ModelTag, Arc<AnthropicModel>>>,
    tools: RwLock<Vec<ToolDefinition>>,
}

impl ModelRegistry {
    /// Build the fast/full pair from the configured env key.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(
                env = %config.api_key_env,
                "LLM key not set — model calls will fail until auth_sync arrives"
            );
        }
        let registry = Self {
            config: config.clone(),
            clients: RwLock::new(HashMap::new()),
            tools: RwLock::new(Vec::new()),
        };
        registry.rebuild(api_key)?;
        Ok(registry)
    }

    /// The client for a routing tag.
    pub fn get(&self, tag: ModelTag) -> Arc<dyn ChatModel> {
        let clients = self.clients.read();
        // Both tags are always present after `rebuild`.
        clients
            .get(&tag)
            .or_else(|| clients.get(&ModelTag::Full))
            .expect("model registry initialized")
            .clone()
    }

    /// Bind the tool catalog; applies to current and future clients.
    pub fn rebind_tools(&self, tools: Vec<ToolDefinition>) {
        for client in self.clients.read().values() {
            client.rebind_tools(tools.clone());
        }
        *self.tools.write() = tools;
    }

    /// Invalidate cached clients so the next call uses the new credentials.
    pub fn rebind_auth(&self, api_key: &str) -> Result<()> {
        tracing::info!("rebinding model clients to new credentials");
        self.rebuild(api_key.to_string())
    }

    fn rebuild(&self, api_key: String) -> Result<()> {
        let mut fresh = HashMap::new();
        for (tag, model) in [
            (ModelTag::Fast, self.config.fast_model.clone()),
            (ModelTag::Full, self.config.full_model.clone()),
        ] {
            let client = AnthropicModel::new(
                &self.config.base_url,
                api_key.clone(),
                model,
                self.config.max_output_tokens,
                self.config.request_timeout_secs,
            )?;
            client.rebind_tools(self.tools.read().clone());
            fresh.insert(tag, Arc::new(client));
        }
        *self.clients.write() = fresh;
        Ok(())
    }
}

impl ModelSource for ModelRegistry {
    fn get(&self, tag: ModelTag) -> Arc<dyn ChatModel> {
        ModelRegistry::get(self, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        ModelRegistry::from_config(&LlmConfig::default()).unwrap()
    }

    #[test]
    fn both_tags_resolve() {
        let reg = registry();
        assert_eq!(reg.get(ModelTag::Fast).model_id(), "claude-haiku-4-5");
        assert_eq!(reg.get(ModelTag::Full).model_id(), "claude-sonnet-4-5");
    }

    #[test]
    fn rebind_auth_replaces_clients() {
        let reg = registry();
        let before = Arc::as_ptr(&reg.clients.read()[&ModelTag::Full]);
        reg.rebind_auth("fresh-token").unwrap();
        let after = Arc::as_ptr(&reg.clients.read()[&ModelTag::Full]);
        assert_ne!(before, after);
    }

    #[test]
    fn tools_survive_auth_rebind() {
        let reg = registry();
        reg.rebind_tools(vec![ToolDefinition {
            name: "search_codebase".into(),
            description: "search".into(),
            parameters: serde_json::json!({}),
        }]);
        reg.rebind_auth("fresh-token").unwrap();
        assert_eq!(reg.tools.read().len(), 1);
    }
}
