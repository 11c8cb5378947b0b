//! The contract between the orchestrator and a tool provider.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A tool as advertised by a provider, before translation into a function
/// declaration. `parameters` is the provider's JSON schema, untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

/// A live connection to one tool provider.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// The registry id this connection was made for.
    fn id(&self) -> &str;

    async fn discover_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invokes a tool and returns the object to place in the function
    /// response. An `Err` is reported back to the model as that call's error.
    async fn invoke(&self, name: &str, args: Value) -> Result<Value>;

    /// Shuts the connection down. Resolves once the underlying transport has
    /// been released.
    async fn close(&self) -> Result<()>;
}

/// Opens provider connections by id.
#[async_trait]
pub trait ToolProviderConnector: Send + Sync {
    async fn connect(&self, provider_id: &str) -> Result<Arc<dyn ToolProvider>>;
}
