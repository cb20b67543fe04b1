//! Namespaced tool registry
//!
//! Flattens the catalogs of all usable connections into `backend.tool`
//! names. A registry is immutable once built; the orchestrator publishes a
//! fresh one after every status change.

use std::collections::HashMap;
use std::sync::Arc;

use super::connection::BackendConnection;
use super::types::{BackendStatus, ToolSchema, ToolSpec, NAMESPACE_SEPARATOR};
use crate::error::ToolError;

/// A tool reachable through the registry
#[derive(Debug, Clone)]
pub struct NamespacedTool {
    pub qualified_name: String,
    pub spec: ToolSpec,
    pub connection: Arc<BackendConnection>,
}

impl NamespacedTool {
    pub fn local_name(&self) -> &str {
        &self.spec.local_name
    }
}

/// One connection's state as captured for a rebuild
pub struct ConnectionSnapshot {
    pub connection: Arc<BackendConnection>,
    pub status: BackendStatus,
    pub tools: Vec<ToolSpec>,
}

impl ConnectionSnapshot {
    pub async fn capture(connection: &Arc<BackendConnection>) -> Self {
        let (status, tools) = connection.snapshot().await;
        Self {
            connection: connection.clone(),
            status,
            tools,
        }
    }
}

pub fn qualified_name(backend: &str, local_name: &str) -> String {
    format!("{}{}{}", backend, NAMESPACE_SEPARATOR, local_name)
}

/// Split a qualified name into backend and local name at the first separator
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    name.split_once(NAMESPACE_SEPARATOR)
}

/// Lookup table from qualified name to owning connection
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<NamespacedTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from connection snapshots, keeping only usable connections.
    ///
    /// Order is snapshot order, then discovery order within a backend.
    pub fn rebuild(snapshots: Vec<ConnectionSnapshot>) -> Self {
        let mut registry = Self::default();

        for snapshot in snapshots {
            if !snapshot.status.is_usable() {
                continue;
            }
            let backend = snapshot.connection.name().to_string();
            for spec in snapshot.tools {
                let name = qualified_name(&backend, &spec.local_name);
                if registry.index.contains_key(&name) {
                    tracing::warn!("Duplicate tool '{}' ignored", name);
                    continue;
                }
                registry.index.insert(name.clone(), registry.tools.len());
                registry.tools.push(NamespacedTool {
                    qualified_name: name,
                    spec,
                    connection: snapshot.connection.clone(),
                });
            }
        }

        registry
    }

    /// Find the owner of a model-chosen tool name
    pub fn resolve(&self, qualified_name: &str) -> Result<&NamespacedTool, ToolError> {
        self.index
            .get(qualified_name)
            .and_then(|&i| self.tools.get(i))
            .ok_or_else(|| ToolError::Unknown {
                name: qualified_name.to_string(),
            })
    }

    /// Flattened tool schema for the model
    pub fn describe_all(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|tool| ToolSchema {
                name: tool.qualified_name.clone(),
                description: tool.spec.description.clone(),
                input_schema: tool.spec.input_schema.clone(),
            })
            .collect()
    }

    /// Whether every connection this registry routes to is still usable
    pub async fn is_current(&self) -> bool {
        let mut checked: Vec<&Arc<BackendConnection>> = Vec::new();
        for tool in &self.tools {
            if checked.iter().any(|c| Arc::ptr_eq(c, &tool.connection)) {
                continue;
            }
            if !tool.connection.status().await.is_usable() {
                return false;
            }
            checked.push(&tool.connection);
        }
        true
    }

    pub fn qualified_names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.qualified_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
