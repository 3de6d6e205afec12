//! Tool registration and dispatch.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::types::{McpError, McpResult, RequestId, ToolDefinition, ToolResponse};

use super::schema::validate_arguments;

/// Error type tool handlers return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type ErasedHandler =
    Arc<dyn Fn(Value, ToolContext) -> BoxFuture<McpResult<ToolResponse>> + Send + Sync>;

/// Execution context of one tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    request_id: Option<RequestId>,
    cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(request_id: Option<RequestId>, cancellation: CancellationToken) -> Self {
        Self {
            request_id,
            cancellation,
        }
    }

    /// A context nobody will cancel.
    pub fn detached() -> Self {
        Self::new(None, CancellationToken::new())
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// A named, schema-described handler.
#[derive(Clone)]
pub struct Tool {
    definition: ToolDefinition,
    handler: ErasedHandler,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl Tool {
    /// A tool taking raw JSON arguments described by `input_schema`.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResponse, BoxError>> + Send + 'static,
    {
        let name = name.into();
        let tool_name = name.clone();
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(
            move |args: Value, ctx: ToolContext| -> BoxFuture<McpResult<ToolResponse>> {
                let handler = handler.clone();
                let tool_name = tool_name.clone();
                Box::pin(async move {
                    handler(args, ctx).await.map_err(|e| McpError::ToolFailed {
                        tool: tool_name,
                        message: e.to_string(),
                    })
                })
            },
        );

        Self {
            definition: ToolDefinition {
                name,
                description: Some(description.into()),
                input_schema,
            },
            handler: erased,
        }
    }

    /// A tool whose arguments deserialize into `A`. The advertised input
    /// schema is derived from `A`.
    pub fn typed<A, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> McpResult<Self>
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(A, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResponse, BoxError>> + Send + 'static,
    {
        let mut schema = serde_json::to_value(schemars::schema_for!(A))
            .map_err(|e| McpError::Internal(format!("schema derivation failed: {e}")))?;
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("$schema");
        }

        let name = name.into();
        let tool_name = name.clone();
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(
            move |args: Value, ctx: ToolContext| -> BoxFuture<McpResult<ToolResponse>> {
                let handler = handler.clone();
                let tool_name = tool_name.clone();
                Box::pin(async move {
                    let args: A = serde_json::from_value(args)
                        .map_err(|e| McpError::InvalidArguments(format!("{tool_name}: {e}")))?;
                    handler(args, ctx).await.map_err(|e| McpError::ToolFailed {
                        tool: tool_name,
                        message: e.to_string(),
                    })
                })
            },
        );

        Ok(Self {
            definition: ToolDefinition {
                name,
                description: Some(description.into()),
                input_schema: schema,
            },
            handler: erased,
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }
}

/// Name -> tool bindings. Names are unique; registering a taken name is
/// rejected rather than overwriting the existing binding.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Tool) -> McpResult<()> {
        if tool.name().is_empty() {
            return Err(McpError::InvalidRequest(
                "Tool name must not be empty".to_string(),
            ));
        }

        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.contains_key(tool.name()) {
            return Err(McpError::DuplicateName(tool.name().to_string()));
        }
        tracing::debug!("Registered tool {}", tool.name());
        tools.insert(tool.name().to_string(), tool);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Definitions of every registered tool, ordered by name.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.read().values().map(|t| t.definition.clone()).collect()
    }

    /// Resolve `name`, validate `arguments` against its schema, and run
    /// the handler. Handler failures come back as `ToolFailed`.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<Value>,
        ctx: ToolContext,
    ) -> McpResult<ToolResponse> {
        let tool = self
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::UnknownMethod(name.to_string()))?;

        let args = arguments.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        validate_arguments(&tool.definition.input_schema, &args)
            .map_err(|e| McpError::InvalidArguments(format!("{name}: {e}")))?;

        tracing::debug!("Dispatching tool {name}");
        let result = (tool.handler)(args, ctx).await;
        if let Err(e) = &result {
            tracing::info!("Tool {name} failed: {e}");
        }
        result
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Tool>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }
}
