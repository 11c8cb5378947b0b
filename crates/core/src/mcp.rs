//! Tool providers backed by MCP servers.
//!
//! A [`ProviderRegistry`] is read from the usual `mcpServers` JSON file. The
//! [`McpConnector`] spawns the named server as a child process and talks to it
//! over stdio through `rmcp`.

use crate::provider::{ToolDescriptor, ToolProvider, ToolProviderConnector};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use rmcp::{
    ServiceExt,
    model::{CallToolRequestParam, CallToolResult},
    service::{Peer, RoleClient, RunningService},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Arc,
};
use tokio::{process::Command, sync::Mutex};
use tracing::{debug, info};

/// How to launch one MCP server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpServerSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderRegistry {
    #[serde(rename = "mcpServers", default)]
    servers: BTreeMap<String, McpServerSpec>,
}

impl ProviderRegistry {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid provider registry")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read provider registry {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn get(&self, id: &str) -> Option<&McpServerSpec> {
        self.servers.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }
}

pub struct McpConnector {
    registry: ProviderRegistry,
}

impl McpConnector {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }
}

#[async_trait]
impl ToolProviderConnector for McpConnector {
    async fn connect(&self, provider_id: &str) -> Result<Arc<dyn ToolProvider>> {
        let spec = self
            .registry
            .get(provider_id)
            .with_context(|| format!("unknown tool provider '{provider_id}'"))?;

        info!(provider = %provider_id, command = %spec.command, "Starting MCP server");
        let transport = TokioChildProcess::new(Command::new(&spec.command).configure(|cmd| {
            cmd.args(&spec.args).envs(&spec.env);
        }))
        .with_context(|| format!("failed to spawn '{}'", spec.command))?;

        let service = ()
            .serve(transport)
            .await
            .with_context(|| format!("MCP handshake with '{provider_id}' failed"))?;

        Ok(Arc::new(McpToolProvider::new(provider_id, service)))
    }
}

/// One running MCP client session.
pub struct McpToolProvider {
    id: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpToolProvider {
    pub fn new(id: impl Into<String>, service: RunningService<RoleClient, ()>) -> Self {
        Self {
            id: id.into(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn discover_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = self.peer.list_all_tools().await?;
        debug!(provider = %self.id, count = tools.len(), "Listed MCP tools");

        Ok(tools
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool.name.into_owned(),
                description: tool.description.map(|d| d.into_owned()).unwrap_or_default(),
                parameters: Value::Object(tool.input_schema.as_ref().clone()),
            })
            .collect())
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        let result = self
            .peer
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: args.as_object().cloned(),
            })
            .await?;
        tool_result_to_value(&result)
    }

    async fn close(&self) -> Result<()> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        let reason = service.cancel().await?;
        info!(provider = %self.id, ?reason, "MCP session closed");
        Ok(())
    }
}

/// Flattens a tool result into a response object. Error results become
/// `Err` carrying the tool's text.
fn tool_result_to_value(result: &CallToolResult) -> Result<Value> {
    let value = serde_json::to_value(result)?;

    let text = value
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if value.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        if text.is_empty() {
            bail!("tool reported an error");
        }
        bail!(text);
    }

    match value.get("structuredContent").filter(|v| !v.is_null()) {
        Some(structured) => Ok(json!({ "result": structured })),
        None => Ok(json!({ "result": text })),
    }
}
