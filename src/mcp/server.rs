//! MCP Server Implementation
//!
//! This module provides the tool-hosting runtime: tool registration, the
//! newline-delimited stdio transport, and request routing.

use crate::mcp::errors::{ErrorHandler, McpError};
use crate::mcp::protocol::*;
use crate::mcp::validation::ArgumentValidator;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Registered tools
    pub tools: Arc<RwLock<HashMap<String, RegisteredTool>>>,
    /// Connection state
    pub connection_state: Arc<RwLock<ConnectionState>>,
    started_at: Instant,
}

/// A tool definition together with everything needed to call it
pub struct RegisteredTool {
    pub definition: Tool,
    validator: ArgumentValidator,
    handler: Box<dyn ToolHandler>,
}

/// Connection state tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// Message handler for processing incoming messages
pub struct MessageHandler {
    server: Arc<McpServer>,
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        let server_info = Implementation { name, version };

        let capabilities = ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        Self {
            server_info,
            capabilities,
            tools: Arc::new(RwLock::new(HashMap::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
            started_at: Instant::now(),
        }
    }

    /// Register a tool with the server, replacing any tool of the same name
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H) -> Result<()>
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();
        let validator = ArgumentValidator::for_tool(&tool)?;

        let previous = self.tools.write().await.insert(
            tool_name.clone(),
            RegisteredTool {
                definition: tool,
                validator,
                handler: Box::new(handler),
            },
        );

        if previous.is_some() {
            warn!("Replaced existing tool registration: {}", tool_name);
        }
        debug!("Registered tool: {}", tool_name);
        Ok(())
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC messages until the reader reaches EOF
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error reading from input: {}", e);
                    break;
                }
            }

            let line = match std::str::from_utf8(&buffer) {
                Ok(line) => line.trim(),
                Err(e) => {
                    let error = McpError::ParseError {
                        message: format!("Message is not valid UTF-8: {}", e),
                    };
                    error.log();
                    self.send_message(&mut writer, &error.to_error_response(None))
                        .await?;
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let raw_value: Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(e) => {
                    let error = McpError::from(e);
                    error.log();
                    self.send_message(&mut writer, &error.to_error_response(None))
                        .await?;
                    continue;
                }
            };

            let id = request_id_of(&raw_value);
            match parse_message(raw_value) {
                Ok(message) => {
                    let handler = MessageHandler::new(Arc::clone(&self));
                    handler.process_message(message, &mut writer).await?;
                }
                Err(error) => {
                    error.log();
                    self.send_message(&mut writer, &error.to_error_response(id))
                        .await?;
                }
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;

        info!("MCP server stopped");
        Ok(())
    }

    /// Send a message to the client
    async fn send_message<W>(&self, writer: &mut W, message: &JsonRpcMessage) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let json = serde_json::to_string(message)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection_state.read().await.clone()
    }

    /// Snapshot of the server's liveness information
    #[inline]
    pub async fn health_status(&self) -> ServerHealthStatus {
        ServerHealthStatus {
            connection_state: self.connection_state().await,
            tools_registered: self.tools.read().await.len(),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Identity, capabilities, and the sorted list of registered tool names
    #[inline]
    pub async fn server_statistics(&self) -> ServerStatistics {
        let mut registered_tools: Vec<String> = self.tools.read().await.keys().cloned().collect();
        registered_tools.sort_unstable();

        ServerStatistics {
            server_info: self.server_info.clone(),
            capabilities: self.capabilities.clone(),
            connection_state: self.connection_state().await,
            registered_tools,
        }
    }
}

/// The request id of a raw message, when it is one JSON-RPC allows
fn request_id_of(value: &Value) -> Option<RequestId> {
    value
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}

/// Decode a raw JSON value into a JSON-RPC 2.0 message
fn parse_message(value: Value) -> Result<JsonRpcMessage, McpError> {
    // Notifications never carry an id; one that does had an unusable id
    let has_id = value.get("id").is_some();

    let message: JsonRpcMessage =
        serde_json::from_value(value).map_err(|e| McpError::InvalidRequest {
            message: format!("Invalid Request: {}", e),
        })?;

    if has_id && matches!(message, JsonRpcMessage::Notification(_)) {
        return Err(McpError::InvalidRequest {
            message: "Invalid Request: id must be a string or an integer".to_string(),
        });
    }

    if message.jsonrpc() != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest {
            message: format!(
                "Invalid Request: unsupported jsonrpc version '{}'",
                message.jsonrpc()
            ),
        });
    }

    Ok(message)
}

impl MessageHandler {
    /// Create a new message handler
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Process an incoming message, writing a reply for requests
    #[inline]
    pub async fn process_message<W>(&self, message: JsonRpcMessage, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match message {
            JsonRpcMessage::Request(request) => {
                let reply = self.handle_request(request).await;
                self.server.send_message(writer, &reply).await
            }
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                Ok(())
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                Ok(())
            }
        }
    }

    /// Handle a JSON-RPC request and build the reply message
    #[inline]
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request: {}", request.method);

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(Self::handle_ping()),
            method => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }
            .into()),
        };

        match response {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => ErrorHandler::handle_error(&e, Some(request.id)),
        }
    }

    /// Handle a JSON-RPC notification
    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => self.handle_initialized().await,
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    /// Handle initialize request
    #[inline]
    pub async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| McpError::InvalidParameters {
                message: format!("Invalid initialize parameters: {}", e),
            })?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Initialize request missing parameters".to_string(),
                }
                .into());
            }
        };

        if !is_protocol_version_supported(&params.protocol_version) {
            warn!(
                "Client requested unsupported protocol version {}, offering {}",
                params.protocol_version, MCP_VERSION
            );
        }

        *self.server.connection_state.write().await = ConnectionState::Initializing;

        let result = InitializeResult {
            protocol_version: negotiate_protocol_version(&params.protocol_version).to_string(),
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
            instructions: None,
        };

        info!(
            "Client initialized: {} {}",
            params.client_info.name, params.client_info.version
        );
        Ok(serde_json::to_value(result)?)
    }

    /// Handle initialized notification
    async fn handle_initialized(&self) {
        *self.server.connection_state.write().await = ConnectionState::Ready;

        info!("Server ready to handle requests");
    }

    /// Handle list tools request
    #[inline]
    pub async fn handle_list_tools(&self) -> Result<Value> {
        let tools = self.server.tools.read().await;
        let mut tools_vec: Vec<Tool> = tools.values().map(|t| t.definition.clone()).collect();
        tools_vec.sort_unstable_by(|a, b| a.name.cmp(&b.name));

        let result = ListToolsResult { tools: tools_vec };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request
    #[inline]
    pub async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| McpError::InvalidParameters {
                message: format!("Invalid tool call parameters: {}", e),
            })?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Tool call request missing parameters".to_string(),
                }
                .into());
            }
        };

        let tools = self.server.tools.read().await;
        let tool = tools.get(&params.name).ok_or_else(|| McpError::ToolNotFound {
            name: params.name.clone(),
        })?;

        tool.validator.validate(params.arguments.as_ref())?;

        let tool_name = params.name.clone();
        let result = tool.handler.handle(params).await.map_err(|e| {
            // Handlers may already speak in MCP terms; keep their classification
            match e.downcast::<McpError>() {
                Ok(mcp_error) => mcp_error,
                Err(other) => McpError::ToolExecutionFailed {
                    tool: tool_name,
                    message: other.to_string(),
                },
            }
        })?;

        Ok(serde_json::to_value(result)?)
    }

    /// Handle ping request
    #[inline]
    pub fn handle_ping() -> Value {
        serde_json::json!({})
    }
}
